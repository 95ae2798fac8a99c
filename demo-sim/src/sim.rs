//! Server and clients stepped together in one process.

use replica::{ReplicaConfig, ReplicaResult, UpdatePolicy};
use serde::Serialize;
use tracing::{debug, info};

use crate::client::ClientSim;
use crate::rng::Rng;
use crate::server::{ServerSim, ServerTick};

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub clients: u32,
    pub ticks: u32,
    pub seed: u64,
    /// Every this many ticks one client leaves and a new one joins.
    pub churn_every: Option<u32>,
    pub policy: UpdatePolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clients: 4,
            ticks: 300,
            seed: 1,
            churn_every: None,
            policy: UpdatePolicy::EveryPass,
        }
    }
}

/// Aggregate results written to `summary.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub clients: u32,
    pub ticks: u32,
    pub seed: u64,
    pub churn_every: Option<u32>,
    pub policy: UpdatePolicy,
    pub joins: u64,
    pub leaves: u64,
    pub messages: u64,
    pub bytes_total: u64,
    pub avg_bytes_per_tick: u64,
    pub p95_message_bytes: u64,
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
    pub deferred: u64,
    pub received_records: u64,
    pub ignored_records: u64,
    pub rejected_messages: u64,
    /// Client object ticks that kept the last good state.
    pub stale_objects: u64,
    pub final_objects: usize,
    pub consistent: bool,
    pub mismatches: Vec<String>,
    #[serde(skip)]
    message_sizes: Vec<u64>,
}

impl Summary {
    fn new(config: &SimConfig) -> Self {
        Self {
            clients: config.clients,
            ticks: config.ticks,
            seed: config.seed,
            churn_every: config.churn_every,
            policy: config.policy,
            ..Self::default()
        }
    }

    fn push_tick(&mut self, tick: &ServerTick) {
        self.joins += tick.joined as u64;
        self.leaves += tick.left as u64;
        self.creates += tick.send.creates as u64;
        self.updates += tick.send.updates as u64;
        self.deletes += tick.send.deletes as u64;
        self.deferred += tick.send.deferred as u64;
        for message in &tick.messages {
            self.messages += 1;
            self.bytes_total += message.bytes.len() as u64;
            self.message_sizes.push(message.bytes.len() as u64);
        }
    }

    fn finalize(&mut self) {
        if self.ticks > 0 {
            self.avg_bytes_per_tick = self.bytes_total / u64::from(self.ticks);
        }
        if !self.message_sizes.is_empty() {
            self.message_sizes.sort_unstable();
            let idx = ((self.message_sizes.len() as f64) * 0.95).ceil() as usize;
            let idx = idx.saturating_sub(1).min(self.message_sizes.len() - 1);
            self.p95_message_bytes = self.message_sizes[idx];
        }
    }
}

/// A server plus its connected clients.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    server: ServerSim,
    clients: Vec<ClientSim>,
    rng: Rng,
    tick: u32,
    summary: Summary,
}

impl Simulation {
    pub fn new(config: SimConfig) -> ReplicaResult<Self> {
        let replica = ReplicaConfig::default().with_policy(config.policy);
        let mut server = ServerSim::new(replica, config.seed)?;
        let clients = (0..config.clients)
            .map(|_| server.connect_client())
            .collect();
        Ok(Self {
            rng: Rng::new(config.seed.rotate_left(17) ^ 0x5eed),
            summary: Summary::new(&config),
            config,
            server,
            clients,
            tick: 0,
        })
    }

    #[must_use]
    pub const fn server(&self) -> &ServerSim {
        &self.server
    }

    #[must_use]
    pub fn clients(&self) -> &[ClientSim] {
        &self.clients
    }

    #[must_use]
    pub const fn tick(&self) -> u32 {
        self.tick
    }

    /// Advances one tick: churn, server frame, then every client frame.
    pub fn step(&mut self) -> ReplicaResult<ServerTick> {
        self.tick += 1;
        if self.churn_due() {
            self.churn();
        }

        let report = self.server.tick()?;
        self.summary.push_tick(&report);

        for client in &mut self.clients {
            let received = client.tick();
            self.summary.received_records += received.records.applied() as u64;
            self.summary.ignored_records += received.records.ignored as u64;
            self.summary.rejected_messages += received.rejected as u64;
            self.summary.stale_objects += received.stale as u64;
        }
        debug!(
            tick = self.tick,
            messages = report.messages.len(),
            objects = self.server.objects().len(),
            "tick complete"
        );
        Ok(report)
    }

    fn churn_due(&self) -> bool {
        self.config
            .churn_every
            .is_some_and(|every| every > 0 && self.tick % every == 0)
    }

    fn churn(&mut self) {
        if self.clients.is_empty() {
            return;
        }
        let idx = self.rng.next_u32() as usize % self.clients.len();
        let leaving = self.clients.swap_remove(idx);
        self.server.disconnect_client(leaving.peer_id());
        let joining = self.server.connect_client();
        info!(
            tick = self.tick,
            left = %leaving.peer_id(),
            joined = %joining.peer_id(),
            "client churn"
        );
        self.clients.push(joining);
    }

    /// Lists every way a client's view differs from the server's live set.
    #[must_use]
    pub fn mismatches(&self) -> Vec<String> {
        let registry = self.server.registry();
        let mut out = Vec::new();
        for client in &self.clients {
            let peer = client.peer_id();
            let replica = client.replica();
            let expected: Vec<_> = registry.objects().map(|o| o.id()).collect();
            let mirrored: Vec<_> = replica.objects().map(|o| o.id()).collect();
            if expected != mirrored {
                out.push(format!(
                    "{peer}: object set {mirrored:?}, server has {expected:?}"
                ));
                continue;
            }
            for object in registry.objects() {
                let Some(stand_in) = replica.object(object.id()) else {
                    continue;
                };
                if stand_in.sync_data() != object.sync_data() {
                    out.push(format!("{peer}: sync data differs for {}", object.id()));
                }
                if !client.objects().contains_key(&object.id()) {
                    out.push(format!("{peer}: no game object for {}", object.id()));
                }
            }
        }
        out
    }

    /// Runs the consistency check and returns the summary.
    #[must_use]
    pub fn finish(self) -> Summary {
        let mismatches = self.mismatches();
        let final_objects = self.server.objects().len();
        let mut summary = self.summary;
        summary.consistent = mismatches.is_empty();
        summary.mismatches = mismatches;
        summary.final_objects = final_objects;
        summary.finalize();
        summary
    }
}

/// Runs a whole simulation without capturing messages.
pub fn run(config: SimConfig) -> ReplicaResult<Summary> {
    let mut sim = Simulation::new(config)?;
    for _ in 0..sim.config.ticks {
        sim.step()?;
    }
    Ok(sim.finish())
}
