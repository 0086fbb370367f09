use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::stress::ScenarioKind;

pub const USAGE: &str = "usage:
  regime-allocator backtest <data.json>
  regime-allocator stress <data.json> [shock|vol|corr] [days] [start|end]
  regime-allocator walk-forward <data.json>
  regime-allocator replay <data.json> [max_ticks]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Backtest {
        data: PathBuf,
    },
    Stress {
        data: PathBuf,
        kind: ScenarioKind,
        days: Option<usize>,
        at_end: bool,
    },
    WalkForward {
        data: PathBuf,
    },
    Replay {
        data: PathBuf,
        max_ticks: Option<usize>,
    },
    Help,
}

/// Parse arguments after the program name.
pub fn parse_command(args: &[String]) -> Result<CliCommand> {
    let Some(name) = args.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = &args[1..];
    match name.trim().to_ascii_lowercase().as_str() {
        "help" | "-h" | "--help" => Ok(CliCommand::Help),
        "backtest" => {
            expect_at_most(name, rest, 1)?;
            Ok(CliCommand::Backtest {
                data: data_path(name, rest)?,
            })
        }
        "walk-forward" | "walkforward" => {
            expect_at_most(name, rest, 1)?;
            Ok(CliCommand::WalkForward {
                data: data_path(name, rest)?,
            })
        }
        "stress" => {
            expect_at_most(name, rest, 4)?;
            let data = data_path(name, rest)?;
            let kind = match rest.get(1) {
                Some(s) => s.parse::<ScenarioKind>()?,
                None => ScenarioKind::Shock,
            };
            let days = rest.get(2).map(|s| parse_count("days", s)).transpose()?;
            let at_end = match rest.get(3).map(|s| s.trim().to_ascii_lowercase()) {
                None => false,
                Some(side) if side == "start" => false,
                Some(side) if side == "end" => true,
                Some(side) => bail!("invalid window side '{}': expected start or end", side),
            };
            Ok(CliCommand::Stress {
                data,
                kind,
                days,
                at_end,
            })
        }
        "replay" => {
            expect_at_most(name, rest, 2)?;
            let data = data_path(name, rest)?;
            let max_ticks = rest
                .get(1)
                .map(|s| parse_count("max_ticks", s))
                .transpose()?;
            Ok(CliCommand::Replay { data, max_ticks })
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

fn data_path(command: &str, rest: &[String]) -> Result<PathBuf> {
    match rest.first() {
        Some(p) if !p.trim().is_empty() => Ok(PathBuf::from(p)),
        _ => bail!("'{}' requires a data file\n{}", command, USAGE),
    }
}

fn expect_at_most(command: &str, rest: &[String], n: usize) -> Result<()> {
    if rest.len() > n {
        bail!("too many arguments for '{}'\n{}", command, USAGE);
    }
    Ok(())
}

fn parse_count(name: &str, s: &str) -> Result<usize> {
    s.trim()
        .parse::<usize>()
        .with_context(|| format!("invalid {} '{}': expected a non-negative integer", name, s))
}
