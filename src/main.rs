use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;

use regime_allocator::backtest::PortfolioEngine;
use regime_allocator::config::{Config, LoggingConfig};
use regime_allocator::data::JsonFileSource;
use regime_allocator::input::{parse_command, CliCommand, USAGE};
use regime_allocator::runtime::{SessionEvent, SessionRegistry};

const EVENT_BUFFER: usize = 256;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize result")?;
    println!("{}", out);
    Ok(())
}

async fn replay(engine: PortfolioEngine, max_ticks: Option<usize>) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let mut registry = SessionRegistry::new();
    let pipeline = engine.build_pipeline(true)?;
    let session = registry.create(pipeline, engine.settings(), Some(tx))?;
    registry.start(session.id())?;

    let idle = engine.settings().realtime.tick_interval * 4 + Duration::from_secs(1);
    let mut ticks = 0usize;
    if max_ticks == Some(0) {
        session.stop()?;
    }
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => {
                println!("{}", serde_json::to_string(&event)?);
                match event {
                    SessionEvent::Ticked { .. } => {
                        ticks += 1;
                        if max_ticks.is_some_and(|m| ticks >= m) {
                            session.stop()?;
                        }
                    }
                    SessionEvent::Stopped { .. } | SessionEvent::Completed { .. } => break,
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(_) => {
                if !session.is_running()? {
                    break;
                }
            }
        }
    }

    session.join().await?;
    print_json(&session.snapshot()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(CliCommand::Help) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(2);
        }
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set RA_CONFIG_PATH or run from a directory containing config/default.toml");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);
    let settings = config.engine_settings()?;

    match command {
        CliCommand::Backtest { data } => {
            let engine = PortfolioEngine::prepare(settings, &JsonFileSource::new(data))?;
            print_json(&engine.run_comparison()?)?;
        }
        CliCommand::Stress {
            data,
            kind,
            days,
            at_end,
        } => {
            let engine = PortfolioEngine::prepare(settings, &JsonFileSource::new(data))?;
            let generator = engine.stress_generator(kind, days, at_end);
            print_json(&engine.run_stress_test(&generator)?)?;
        }
        CliCommand::WalkForward { data } => {
            let engine = PortfolioEngine::prepare(settings, &JsonFileSource::new(data))?;
            print_json(&engine.walk_forward()?)?;
        }
        CliCommand::Replay { data, max_ticks } => {
            let engine = PortfolioEngine::prepare(settings, &JsonFileSource::new(data))?;
            replay(engine, max_ticks).await?;
        }
        CliCommand::Help => println!("{}", USAGE),
    }
    Ok(())
}
