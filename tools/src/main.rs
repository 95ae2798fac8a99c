use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tools::{
    decode_message_json, format_decode_pretty, inspect_message, InspectReport, KindSummary,
};
use wire::Limits;

#[derive(Parser)]
#[command(
    name = "replica-tools",
    version,
    about = "Look inside captured replication messages"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize record counts and byte usage.
    Inspect(InspectArgs),
    /// List every record with its id and payload.
    Decode(DecodeArgs),
}

#[derive(Args)]
struct InspectArgs {
    /// A capture file, or a directory of them.
    path: PathBuf,
    /// File name pattern applied inside a directory.
    #[arg(long = "glob", default_value = "*")]
    pattern: String,
    /// Order captures before printing.
    #[arg(long, value_enum)]
    sort: Option<CaptureOrder>,
    /// Print at most this many captures.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct DecodeArgs {
    /// The capture file.
    path: PathBuf,
    #[arg(long, value_enum, default_value_t = DecodeFormat::Json)]
    format: DecodeFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CaptureOrder {
    /// Largest first.
    Size,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecodeFormat {
    Json,
    Pretty,
}

/// One capture file found in a directory.
struct Capture {
    path: PathBuf,
    len: u64,
}

fn main() -> Result<()> {
    let limits = Limits::default();
    match Cli::parse().command {
        Command::Inspect(args) => inspect(&args, &limits),
        Command::Decode(args) => decode(&args, &limits),
    }
}

fn inspect(args: &InspectArgs, limits: &Limits) -> Result<()> {
    if !args.path.is_dir() {
        let report = inspect_file(&args.path, limits)?;
        print_report(&report);
        return Ok(());
    }

    let mut captures = find_captures(&args.path, &args.pattern)?;
    if let Some(CaptureOrder::Size) = args.sort {
        captures.sort_by(|a, b| b.len.cmp(&a.len).then_with(|| a.path.cmp(&b.path)));
    }
    if let Some(limit) = args.limit {
        captures.truncate(limit);
    }

    let mut total_bytes = 0;
    for capture in &captures {
        let report = inspect_file(&capture.path, limits)?;
        println!("-- {} --", capture.path.display());
        print_report(&report);
        total_bytes += capture.len;
    }
    println!("{} messages, {total_bytes} bytes", captures.len());
    Ok(())
}

fn decode(args: &DecodeArgs, limits: &Limits) -> Result<()> {
    let bytes = read_capture(&args.path)?;
    let decoded = decode_message_json(&bytes, limits)
        .with_context(|| format!("decode {}", args.path.display()))?;
    match args.format {
        DecodeFormat::Json => {
            let json = serde_json::to_string_pretty(&decoded).context("render json")?;
            println!("{json}");
        }
        DecodeFormat::Pretty => print!("{}", format_decode_pretty(&decoded)),
    }
    Ok(())
}

fn read_capture(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read capture {}", path.display()))
}

fn inspect_file(path: &Path, limits: &Limits) -> Result<InspectReport> {
    let bytes = read_capture(path)?;
    inspect_message(&bytes, limits).with_context(|| format!("inspect {}", path.display()))
}

/// Regular files in `dir` whose names match `pattern`, sorted by path.
fn find_captures(dir: &Path, pattern: &str) -> Result<Vec<Capture>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = Path::new(&escaped).join(pattern);
    let paths = glob::glob(&full.to_string_lossy())
        .with_context(|| format!("bad pattern {pattern:?}"))?;

    let mut captures = Vec::new();
    for path in paths {
        let path = path.context("list captures")?;
        let meta = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        if meta.is_file() {
            captures.push(Capture {
                path,
                len: meta.len(),
            });
        }
    }
    captures.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(captures)
}

fn print_report(report: &InspectReport) {
    let header = report.header;
    println!(
        "v{} flags=0x{:04x} {} records, {} bytes ({} framing)",
        header.version,
        header.flags,
        header.record_count,
        report.byte_len,
        report.overhead_bytes()
    );
    for (label, kind) in [
        ("create", report.creates),
        ("update", report.updates),
        ("delete", report.deletes),
    ] {
        print_kind(label, kind);
    }
}

fn print_kind(label: &str, kind: KindSummary) {
    if kind.count > 0 {
        println!("  {label:<6} {:>5}  {:>8} payload bytes", kind.count, kind.payload_bytes);
    }
}
