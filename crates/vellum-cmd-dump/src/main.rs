#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "vellum-cmd-dump",
    about = "Decode recorded composition channel batches and print one line per packet."
)]
struct Args {
    /// Recorded batch files (one or more command streams back to back)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Report malformed packets inline and continue with the next batch
    #[arg(long, action = clap::ArgAction::SetTrue)]
    keep_going: bool,

    /// Print packet counts per opcode after each file
    #[arg(long, action = clap::ArgAction::SetTrue)]
    summary: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for path in &args.inputs {
        let buf = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = buf.len(), "dumping");
        writeln!(out, "{}:", path.display())?;

        let summary = vellum_cmd_dump::dump(&buf, &mut out, args.keep_going)
            .with_context(|| format!("decode {}", path.display()))?;
        if args.summary {
            summary.write_to(&mut out)?;
        }
    }
    Ok(())
}
