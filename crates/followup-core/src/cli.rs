use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::access::Role;
use crate::event::EventId;
use crate::view::{CalendarView, Direction};

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "followup",
    version,
    about = "Follow-up scheduling, overdue sweeps and calendar views for contact leads"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Evaluate against this instant (RFC 3339) instead of the system clock.
    #[arg(long = "now", value_parser = parse_now, global = true)]
    pub now: Option<DateTime<Utc>>,

    /// Act as these roles instead of the configured `access.roles`.
    #[arg(
        long = "role",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Role>()),
        action = ArgAction::Append,
        global = true
    )]
    pub roles: Vec<Role>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Follow-ups due now or later, soonest first.
    Upcoming,
    /// Open follow-ups already past due, oldest first.
    Overdue,
    /// Flag past-due follow-ups as overdue and persist the change.
    Sweep,
    /// Mark one follow-up as completed.
    Complete {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<EventId>()))]
        id: EventId,
    },
    Month {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Week {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Day {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the reference date one period back or forward.
    Navigate {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<CalendarView>()))]
        view: CalendarView,
        date: NaiveDate,
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Direction>()))]
        direction: Direction,
    },
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
