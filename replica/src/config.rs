//! Replication configuration.

use wire::Limits;

/// When a known object's sync data is re-sent to a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum UpdatePolicy {
    /// Every pass carries an Update for every known object with sync data.
    /// A dropped update is masked by the next pass.
    #[default]
    EveryPass,
    /// An Update is sent only when the object's sync revision differs from
    /// the last one sent to that connection.
    OnChange,
}

/// Per-pass caps on the records emitted to one connection.
///
/// Creates and deletes over the cap stay pending for a later pass. The
/// Update that accompanies a Create is part of the creation and is not
/// counted against `max_updates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionBudget {
    pub max_creates: usize,
    pub max_updates: usize,
    pub max_deletes: usize,
}

impl Default for ConnectionBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl ConnectionBudget {
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_creates: usize::MAX,
            max_updates: usize::MAX,
            max_deletes: usize::MAX,
        }
    }

    /// Small caps that force deferral in tests.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_creates: 2,
            max_updates: 4,
            max_deletes: 2,
        }
    }
}

/// Registry and receiver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicaConfig {
    /// Wire limits for encoding and decoding replication messages.
    pub limits: Limits,
    pub policy: UpdatePolicy,
    /// Budget given to newly created connections.
    pub budget: ConnectionBudget,
}

impl ReplicaConfig {
    /// Creates a configuration with small limits and no budget caps.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            limits: Limits::for_testing(),
            policy: UpdatePolicy::EveryPass,
            budget: ConnectionBudget::unlimited(),
        }
    }

    /// Creates a configuration with no restrictions.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            limits: Limits::unlimited(),
            policy: UpdatePolicy::EveryPass,
            budget: ConnectionBudget::unlimited(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_budget(mut self, budget: ConnectionBudget) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}
