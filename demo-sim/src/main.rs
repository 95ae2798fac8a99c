use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use demo_sim::{SentMessage, SimConfig, Simulation, Summary};
use replica::{Limits, UpdatePolicy};
use tools::decode_message_json;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic replication demo with churning clients"
)]
struct Cli {
    /// Number of connected clients.
    #[arg(long, default_value_t = 4)]
    clients: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Replace one client every N ticks.
    #[arg(long)]
    churn_every: Option<u32>,
    /// When known objects are re-sent.
    #[arg(long, value_enum, default_value_t = PolicyArg::EveryPass)]
    policy: PolicyArg,
    /// Write every replication message here, one file per message.
    #[arg(long)]
    capture_dir: Option<PathBuf>,
    /// Output directory for the summary.
    #[arg(long, default_value = "captures")]
    out_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    EveryPass,
    OnChange,
}

impl From<PolicyArg> for UpdatePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::EveryPass => Self::EveryPass,
            PolicyArg::OnChange => Self::OnChange,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let limits = Limits::default();

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;
    if let Some(dir) = &cli.capture_dir {
        fs::create_dir_all(dir).with_context(|| format!("create capture dir {}", dir.display()))?;
    }

    let config = SimConfig {
        clients: cli.clients,
        ticks: cli.ticks,
        seed: cli.seed,
        churn_every: cli.churn_every,
        policy: cli.policy.into(),
    };
    let mut sim = Simulation::new(config).context("start simulation")?;
    for _ in 0..cli.ticks {
        let report = sim.step().with_context(|| format!("tick {}", sim.tick()))?;
        if let Some(dir) = &cli.capture_dir {
            for message in &report.messages {
                let name = format!("tick_{:06}_peer_{:03}.bin", sim.tick(), message.peer.0);
                let path = dir.join(name);
                write_message(&path, &message.bytes)?;
                validate_message(&limits, message)?;
            }
        }
    }

    let summary = sim.finish();
    write_summary_json(&cli.out_dir, &summary)?;
    info!(
        messages = summary.messages,
        bytes = summary.bytes_total,
        p95 = summary.p95_message_bytes,
        objects = summary.final_objects,
        "simulation complete"
    );
    if !summary.consistent {
        anyhow::bail!(
            "clients diverged from server: {}",
            summary.mismatches.join("; ")
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn write_message(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_summary_json(out_dir: &Path, summary: &Summary) -> Result<()> {
    let path = out_dir.join("summary.json");
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn validate_message(limits: &Limits, message: &SentMessage) -> Result<()> {
    let decoded = decode_message_json(&message.bytes, limits).context("tools decode")?;
    if decoded.records.len() != decoded.record_count as usize {
        anyhow::bail!(
            "message to {} declares {} records, decoded {}",
            message.peer,
            decoded.record_count,
            decoded.records.len()
        );
    }
    Ok(())
}
