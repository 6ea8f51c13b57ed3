//! CLI argument parsing for wr

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wr")]
#[command(author, version, about = "Dashboard widget data-fetch runner", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print each widget's request body
    Show {
        /// View definition (YAML)
        #[arg(required = true)]
        view: PathBuf,

        /// Only this widget (cardId)
        #[arg(short, long)]
        widget: Option<String>,
    },

    /// Mount widgets, replay page events, and print their final state
    Fetch {
        /// View definition (YAML)
        #[arg(required = true)]
        view: PathBuf,

        /// Only this widget (cardId)
        #[arg(short, long)]
        widget: Option<String>,

        /// Emit after-set-extremes with the given range (epoch ms)
        #[arg(short, long, value_name = "MIN,MAX", value_parser = parse_extremes)]
        extremes: Option<(i64, i64)>,

        /// Emit update-timeseries with the given tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },
}

/// Parse `MIN,MAX` in epoch milliseconds
pub fn parse_extremes(s: &str) -> Result<(i64, i64), String> {
    let (min, max) = s
        .split_once(',')
        .ok_or_else(|| format!("expected MIN,MAX, got '{}'", s))?;
    let min = min
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid MIN '{}': {}", min.trim(), e))?;
    let max = max
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid MAX '{}': {}", max.trim(), e))?;
    if min > max {
        return Err(format!("MIN {} is greater than MAX {}", min, max));
    }
    Ok((min, max))
}
