mod config;
mod sim;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::sim::SimReport;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML file with [scheduler] and [simulation] tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated duration in seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Start with the socket disconnected
    #[arg(long)]
    start_disconnected: bool,

    /// Probability that an API fetch fails
    #[arg(long)]
    failure_rate: Option<f64>,

    /// Probability that a connected socket silently stops delivering
    #[arg(long)]
    stall_rate: Option<f64>,

    /// Run against the wall clock instead of virtual time
    #[arg(long)]
    realtime: bool,

    /// Number of feed entries to print
    #[arg(long, default_value_t = 20)]
    show: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(secs) = self.duration {
            config.simulation.duration_ms = secs.saturating_mul(1000);
        }
        if self.start_disconnected {
            config.simulation.start_connected = false;
        }
        if let Some(rate) = self.failure_rate {
            config.simulation.failure_rate = rate;
        }
        if let Some(rate) = self.stall_rate {
            config.simulation.stall_rate = rate;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet, args.json)?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    if !args.realtime {
        // Timers auto-advance whenever every task is idle.
        tokio::time::pause();
    }

    let report = sim::run(config).await?;
    info!("Simulation finished after {:?} ({:?})", report.elapsed, report.outcome);
    print_report(&report, args.show);
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

fn print_report(report: &SimReport, show: usize) {
    println!("Activities created:   {}", report.created);
    println!("Delivered by socket:  {}", report.pushed);
    println!("API fetches:          {} ({} failed)", report.fetches, report.failures);
    if let Some(state) = &report.snapshot {
        println!(
            "Scheduler:            {:?}, {} polls, {} collapsed requests",
            state.mode, state.completed_polls, state.collapsed_requests
        );
    }
    println!(
        "Feed:                 {} entries ({} pending, {} not yet seen)",
        report.feed.len(),
        report.pending(),
        report.missing()
    );
    println!();

    for entry in report.feed.iter().take(show) {
        println!(
            "{:>10}ms  {}  {:<8} {:>6}  {}",
            entry.timestamp,
            entry.id,
            format!("{:?}", entry.payload.kind).to_lowercase(),
            entry.payload.amount,
            if entry.is_pending { "pending" } else { "confirmed" }
        );
    }
    if report.feed.len() > show {
        println!("... {} more", report.feed.len() - show);
    }
}
