use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use time::{Duration, PrimitiveDateTime};
use tracker_core::model::{TaskId, TaskStatus, parse_timestamp};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Snapshot file to read and write
    #[arg(long, value_name = "PATH", global = true)]
    pub store: Option<PathBuf>,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage standalone tasks
    ///
    /// Example: tracker task add "Buy milk" --start "2025-06-02 09:00" --duration 30
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },
    /// Manage epics
    ///
    /// Example: tracker epic add "Move house"
    Epic {
        #[command(subcommand)]
        action: EpicCommand,
    },
    /// Manage subtasks of an epic
    ///
    /// Example: tracker subtask add "Pack books" --epic 2
    Subtask {
        #[command(subcommand)]
        action: SubtaskCommand,
    },
    /// Show items fetched by id, oldest first
    ///
    /// Example: tracker history
    History,
    /// Show scheduled tasks and subtasks, earliest first
    ///
    /// Example: tracker prioritized
    Prioritized,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// List all tasks
    List,
    /// Show details of a task
    ///
    /// Example: tracker task show 1
    Show { id: TaskId },
    /// Add a new task
    Add(NewItem),
    /// Change fields of an existing task
    ///
    /// Example: tracker task update 1 --status done
    Update {
        id: TaskId,
        #[command(flatten)]
        changes: ItemChanges,
    },
    /// Delete a task
    Delete { id: TaskId },
    /// Delete every task
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum EpicCommand {
    /// List all epics
    List,
    /// Show details of an epic
    Show { id: TaskId },
    /// List the subtasks of an epic
    ///
    /// Example: tracker epic subtasks 2
    Subtasks { id: TaskId },
    /// Add a new epic
    Add {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Rename or describe an epic; status and timing follow its subtasks
    Update {
        id: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete an epic together with its subtasks
    Delete { id: TaskId },
    /// Delete every epic and subtask
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum SubtaskCommand {
    /// List all subtasks
    List,
    /// Show details of a subtask
    Show { id: TaskId },
    /// Add a subtask to an existing epic
    Add {
        /// Owning epic
        #[arg(long)]
        epic: TaskId,
        #[command(flatten)]
        item: NewItem,
    },
    /// Change fields of an existing subtask; its epic cannot change
    Update {
        id: TaskId,
        #[command(flatten)]
        changes: ItemChanges,
    },
    /// Delete a subtask
    Delete { id: TaskId },
    /// Delete every subtask
    Clear,
}

#[derive(Args, Debug, Clone)]
pub struct NewItem {
    pub title: String,
    #[arg(short, long, default_value = "")]
    pub description: String,
    /// new, in_progress or done
    #[arg(short, long, default_value = "new", value_parser = parse_status)]
    pub status: TaskStatus,
    /// Start time, e.g. "2025-06-02 09:00"
    #[arg(long, value_parser = parse_start)]
    pub start: Option<PrimitiveDateTime>,
    /// Duration in minutes
    #[arg(long, value_parser = parse_minutes)]
    pub duration: Option<Duration>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ItemChanges {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(short, long, value_parser = parse_status)]
    pub status: Option<TaskStatus>,
    #[arg(long, value_parser = parse_start)]
    pub start: Option<PrimitiveDateTime>,
    /// Duration in minutes
    #[arg(long, value_parser = parse_minutes)]
    pub duration: Option<Duration>,
    /// Drop the start time and duration
    #[arg(long, conflicts_with_all = ["start", "duration"])]
    pub unschedule: bool,
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    raw.parse().map_err(|_| {
        format!("unknown status '{raw}' (expected new, in_progress or done)")
    })
}

fn parse_start(raw: &str) -> Result<PrimitiveDateTime, String> {
    parse_timestamp(raw).map_err(|_| {
        format!("invalid start time '{raw}' (expected YYYY-MM-DD HH:MM[:SS])")
    })
}

fn parse_minutes(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|minutes| *minutes >= 0)
        .and_then(|minutes| minutes.checked_mul(60))
        .map(Duration::seconds)
        .ok_or_else(|| format!("invalid duration '{raw}' (expected whole minutes)"))
}

/// Flag name used to identify config override arguments by the runtime.
pub const CONFIG_OVERRIDE_FLAG: &str = "--config-override";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    StorePath(PathBuf),
    HistoryLimit(Option<usize>),
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ConfigOverrideTarget, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;
    let value = value_raw.trim();

    let field =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    match field.as_str() {
        "store_path" | "store" => {
            if value.is_empty() {
                Err("store_path override cannot be empty".to_string())
            } else {
                Ok(ConfigOverrideTarget::StorePath(PathBuf::from(value)))
            }
        }
        "history_limit" => {
            if value.eq_ignore_ascii_case("none") {
                return Ok(ConfigOverrideTarget::HistoryLimit(None));
            }
            value
                .parse::<usize>()
                .map(|limit| ConfigOverrideTarget::HistoryLimit(Some(limit)))
                .map_err(|_| format!("history_limit must be a number or 'none', got '{value}'"))
        }
        other => Err(format!("unknown config field '{other}'")),
    }
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
