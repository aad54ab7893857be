use std::path::PathBuf;

use aerium::{logging, AppConfig, Pipeline};
use aerium_core::Source;
use aerium_types::{current_timestamp_ms, Event};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "aerium")]
#[command(about = "Live CO2 telemetry pipeline and analytics")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the broadcast loop and print each notification as a JSON line
    Run {
        /// Stop after this many cycles instead of waiting for Ctrl-C
        #[arg(short = 'n', long)]
        cycles: Option<u32>,

        /// Uniform random readings instead of the realistic walk
        #[arg(long)]
        random: bool,

        /// Seconds between cycles
        #[arg(short, long)]
        speed: Option<u64>,
    },

    /// Simulate a reading history and print every analysis as JSON
    Report {
        /// Hours of minute readings to generate
        #[arg(long, default_value = "48")]
        hours: u32,

        /// Source tag for the generated readings (live, simulator, import)
        #[arg(long, default_value = "simulator")]
        source: Source,

        /// Seed for a reproducible history
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    logging::init(&config.logging.level)?;

    match args.command {
        Command::Run { cycles, random, speed } => {
            if random {
                config.settings.realistic_mode = Some(false);
            }
            if speed.is_some() {
                config.settings.update_speed = speed;
            }
            run(config, cycles).await
        }
        Command::Report { hours, source, seed } => {
            if seed.is_some() {
                config.generator.seed = seed;
            }
            report(config, hours, source).await
        }
    }
}

async fn run(config: AppConfig, cycles: Option<u32>) -> Result<()> {
    let pipeline = Pipeline::new(config).await?;
    let mut events = pipeline
        .notifier
        .subscribe()
        .context("no broadcast output configured")?;
    let retention = pipeline.spawn_retention();

    match cycles {
        Some(cycles) => {
            for cycle in 0..cycles {
                if cycle > 0 {
                    let period = pipeline.active_settings().await?.update_period();
                    tokio::time::sleep(period).await;
                }
                pipeline.scheduler.run_cycle().await;
                drain(&mut events)?;
            }
        }
        None => {
            pipeline.scheduler.start();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(event) => print_event(&event)?,
                        Err(RecvError::Lagged(skipped)) => warn!(skipped, "Output lagging behind"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            pipeline.scheduler.shutdown().await;
            drain(&mut events)?;
        }
    }

    retention.abort();
    Ok(())
}

async fn report(config: AppConfig, hours: u32, source: Source) -> Result<()> {
    let pipeline = Pipeline::new(config).await?;
    let now = current_timestamp_ms();

    pipeline.backfill(hours, source, now).await?;
    let report = pipeline.report(source, now).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn drain(events: &mut Receiver<Event>) -> Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event)?,
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Output lagging behind"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}

fn print_event(event: &Event) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
