use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use serde_json::{Value, json};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::PrimitiveDateTime;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracker_cli::cli::{
    CONFIG_OVERRIDE_FLAG, Cli, Command, ConfigOverrideTarget, EpicCommand, ItemChanges, NewItem,
    SubtaskCommand, TaskCommand, parse_config_override,
};
use tracker_core::config::{self, ConfigOverrides};
use tracker_core::error::AppError;
use tracker_core::manager::{FileBackedManager, TaskManager};
use tracker_core::model::{Entity, EntityKind, Epic, Subtask, Task, TaskId, format_timestamp};
use tracker_core::storage;

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "ID")]
    id: TaskId,
    #[tabled(rename = "TYPE")]
    kind: &'static str,
    #[tabled(rename = "TITLE")]
    title: String,
    #[tabled(rename = "STATUS")]
    status: &'static str,
    #[tabled(rename = "EPIC")]
    epic: String,
    #[tabled(rename = "START")]
    start: String,
    #[tabled(rename = "END")]
    end: String,
}

fn init_tracing() {
    // Off unless RUST_LOG asks for it; logs go to stderr so stdout stays parseable.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn timestamp_label(value: Option<PrimitiveDateTime>) -> Result<String, AppError> {
    match value {
        Some(value) => format_timestamp(value),
        None => Ok("-".to_string()),
    }
}

fn timestamp_json(value: Option<PrimitiveDateTime>) -> Result<Value, AppError> {
    match value {
        Some(value) => Ok(Value::String(format_timestamp(value)?)),
        None => Ok(Value::Null),
    }
}

fn item_row(entity: &Entity) -> Result<ItemRow, AppError> {
    Ok(ItemRow {
        id: entity.id(),
        kind: entity.kind().label(),
        title: entity.title().to_string(),
        status: entity.status().as_str(),
        epic: entity
            .epic_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        start: timestamp_label(entity.start_time())?,
        end: timestamp_label(entity.end_time())?,
    })
}

fn entity_json(entity: &Entity) -> Result<Value, AppError> {
    let base = entity.base();
    let mut value = json!({
        "id": base.id,
        "type": entity.kind().label(),
        "title": base.title,
        "description": base.description,
        "status": base.status.as_str(),
        "start_time": timestamp_json(entity.start_time())?,
        "duration_minutes": base.duration.map(|duration| duration.whole_minutes()),
        "end_time": timestamp_json(entity.end_time())?,
    });
    match entity {
        Entity::Epic(epic) => value["subtask_ids"] = json!(epic.subtask_ids()),
        Entity::Subtask(subtask) => value["epic_id"] = json!(subtask.epic_id()),
        Entity::Task(_) => {}
    }
    Ok(value)
}

fn print_items(items: &[Entity], json: bool) -> Result<(), AppError> {
    if json {
        let payload = items
            .iter()
            .map(entity_json)
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", Value::Array(payload));
        return Ok(());
    }

    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    let rows = items.iter().map(item_row).collect::<Result<Vec<_>, _>>()?;
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
    Ok(())
}

fn print_item(entity: &Entity, json: bool) -> Result<(), AppError> {
    if json {
        println!("{}", entity_json(entity)?);
        return Ok(());
    }

    let base = entity.base();
    println!("id: {}", base.id);
    println!("type: {}", entity.kind());
    println!("title: {}", base.title);
    println!("description: {}", base.description);
    println!("status: {}", base.status);
    println!("start: {}", timestamp_label(entity.start_time())?);
    match base.duration {
        Some(duration) => println!("duration: {} min", duration.whole_minutes()),
        None => println!("duration: -"),
    }
    println!("end: {}", timestamp_label(entity.end_time())?);
    match entity {
        Entity::Epic(epic) => {
            let ids: Vec<String> = epic.subtask_ids().iter().map(ToString::to_string).collect();
            println!("subtasks: {}", ids.join(", "));
        }
        Entity::Subtask(subtask) => println!("epic: {}", subtask.epic_id()),
        Entity::Task(_) => {}
    }
    Ok(())
}

fn report_change<M: TaskManager>(
    manager: &M,
    verb: &str,
    id: TaskId,
    json: bool,
) -> Result<(), AppError> {
    let entity = manager
        .peek(id)
        .ok_or_else(|| AppError::not_found(format!("item {id} not found")))?;
    if json {
        println!("{}", entity_json(&entity)?);
    } else {
        println!("{verb} {} {}: {}", entity.kind(), id, entity.title());
    }
    Ok(())
}

fn report_removal(entity: &Entity, json: bool) {
    if json {
        println!(
            "{}",
            json!({ "deleted": entity.id(), "type": entity.kind().label() })
        );
    } else {
        println!("Deleted {} {}: {}", entity.kind(), entity.id(), entity.title());
    }
}

fn report_clear(what: &str, json: bool) {
    if json {
        println!("{}", json!({ "cleared": what }));
    } else {
        println!("Deleted all {what}");
    }
}

fn not_found(kind: EntityKind, id: TaskId) -> AppError {
    AppError::not_found(format!("{kind} {id} not found"))
}

/// Fetches `id` without touching history, requiring it to be of `kind`.
fn peek_kind<M: TaskManager>(manager: &M, kind: EntityKind, id: TaskId) -> Result<Entity, AppError> {
    manager
        .peek(id)
        .filter(|entity| entity.kind() == kind)
        .ok_or_else(|| not_found(kind, id))
}

fn require_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }
    Ok(())
}

fn build_base(item: NewItem) -> Result<Task, AppError> {
    require_title(&item.title)?;
    let mut task = Task::new(item.title, item.description, item.status);
    task.start_time = item.start;
    task.duration = item.duration;
    Ok(task)
}

fn apply_changes(base: &mut Task, changes: ItemChanges) -> Result<(), AppError> {
    if let Some(title) = changes.title {
        require_title(&title)?;
        base.title = title;
    }
    if let Some(description) = changes.description {
        base.description = description;
    }
    if let Some(status) = changes.status {
        base.status = status;
    }
    if changes.unschedule {
        base.start_time = None;
        base.duration = None;
    }
    if let Some(start) = changes.start {
        base.start_time = Some(start);
    }
    if let Some(duration) = changes.duration {
        base.duration = Some(duration);
    }
    Ok(())
}

fn run_task_command<M: TaskManager>(
    manager: &mut M,
    action: TaskCommand,
    json: bool,
) -> Result<(), AppError> {
    match action {
        TaskCommand::List => {
            let items: Vec<Entity> = manager.list_tasks().into_iter().map(Entity::Task).collect();
            print_items(&items, json)?;
        }
        TaskCommand::Show { id } => {
            let task = manager
                .get_task_by_id(id)
                .ok_or_else(|| not_found(EntityKind::Task, id))?;
            print_item(&Entity::Task(task), json)?;
        }
        TaskCommand::Add(item) => {
            let id = manager.create_task(build_base(item)?)?;
            report_change(manager, "Added", id, json)?;
        }
        TaskCommand::Update { id, changes } => {
            let Entity::Task(mut task) = peek_kind(manager, EntityKind::Task, id)? else {
                return Err(not_found(EntityKind::Task, id));
            };
            apply_changes(&mut task, changes)?;
            if !manager.update_task(task)? {
                return Err(not_found(EntityKind::Task, id));
            }
            report_change(manager, "Updated", id, json)?;
        }
        TaskCommand::Delete { id } => {
            let entity = peek_kind(manager, EntityKind::Task, id)?;
            if !manager.delete_task_by_id(id)? {
                return Err(not_found(EntityKind::Task, id));
            }
            report_removal(&entity, json);
        }
        TaskCommand::Clear => {
            manager.delete_all_tasks()?;
            report_clear("tasks", json);
        }
    }
    Ok(())
}

fn run_epic_command<M: TaskManager>(
    manager: &mut M,
    action: EpicCommand,
    json: bool,
) -> Result<(), AppError> {
    match action {
        EpicCommand::List => {
            let items: Vec<Entity> = manager.list_epics().into_iter().map(Entity::Epic).collect();
            print_items(&items, json)?;
        }
        EpicCommand::Show { id } => {
            let epic = manager
                .get_epic_by_id(id)
                .ok_or_else(|| not_found(EntityKind::Epic, id))?;
            print_item(&Entity::Epic(epic), json)?;
        }
        EpicCommand::Subtasks { id } => {
            let subtasks = manager
                .get_subtasks_of_epic(id)
                .ok_or_else(|| not_found(EntityKind::Epic, id))?;
            let items: Vec<Entity> = subtasks.into_iter().map(Entity::Subtask).collect();
            print_items(&items, json)?;
        }
        EpicCommand::Add { title, description } => {
            require_title(&title)?;
            let id = manager.create_epic(Epic::new(title, description))?;
            report_change(manager, "Added", id, json)?;
        }
        EpicCommand::Update {
            id,
            title,
            description,
        } => {
            let Entity::Epic(mut epic) = peek_kind(manager, EntityKind::Epic, id)? else {
                return Err(not_found(EntityKind::Epic, id));
            };
            if let Some(title) = title {
                require_title(&title)?;
                epic.base.title = title;
            }
            if let Some(description) = description {
                epic.base.description = description;
            }
            if !manager.update_epic(epic)? {
                return Err(not_found(EntityKind::Epic, id));
            }
            report_change(manager, "Updated", id, json)?;
        }
        EpicCommand::Delete { id } => {
            let entity = peek_kind(manager, EntityKind::Epic, id)?;
            if !manager.delete_epic_by_id(id)? {
                return Err(not_found(EntityKind::Epic, id));
            }
            report_removal(&entity, json);
        }
        EpicCommand::Clear => {
            manager.delete_all_epics()?;
            report_clear("epics", json);
        }
    }
    Ok(())
}

fn run_subtask_command<M: TaskManager>(
    manager: &mut M,
    action: SubtaskCommand,
    json: bool,
) -> Result<(), AppError> {
    match action {
        SubtaskCommand::List => {
            let items: Vec<Entity> = manager
                .list_subtasks()
                .into_iter()
                .map(Entity::Subtask)
                .collect();
            print_items(&items, json)?;
        }
        SubtaskCommand::Show { id } => {
            let subtask = manager
                .get_subtask_by_id(id)
                .ok_or_else(|| not_found(EntityKind::Subtask, id))?;
            print_item(&Entity::Subtask(subtask), json)?;
        }
        SubtaskCommand::Add { epic, item } => {
            let base = build_base(item)?;
            let mut subtask = Subtask::new(base.title, base.description, base.status, epic);
            subtask.base.start_time = base.start_time;
            subtask.base.duration = base.duration;
            let id = manager.create_subtask(subtask)?;
            report_change(manager, "Added", id, json)?;
        }
        SubtaskCommand::Update { id, changes } => {
            let Entity::Subtask(mut subtask) = peek_kind(manager, EntityKind::Subtask, id)? else {
                return Err(not_found(EntityKind::Subtask, id));
            };
            apply_changes(&mut subtask.base, changes)?;
            if !manager.update_subtask(subtask)? {
                return Err(not_found(EntityKind::Subtask, id));
            }
            report_change(manager, "Updated", id, json)?;
        }
        SubtaskCommand::Delete { id } => {
            let entity = peek_kind(manager, EntityKind::Subtask, id)?;
            if !manager.delete_subtask_by_id(id)? {
                return Err(not_found(EntityKind::Subtask, id));
            }
            report_removal(&entity, json);
        }
        SubtaskCommand::Clear => {
            manager.delete_all_subtasks()?;
            report_clear("subtasks", json);
        }
    }
    Ok(())
}

fn run_command<M: TaskManager>(
    manager: &mut M,
    command: Command,
    json: bool,
) -> Result<(), AppError> {
    match command {
        Command::Task { action } => run_task_command(manager, action, json),
        Command::Epic { action } => run_epic_command(manager, action, json),
        Command::Subtask { action } => run_subtask_command(manager, action, json),
        Command::History => print_items(&manager.history(), json),
        Command::Prioritized => print_items(&manager.prioritized_tasks(), json),
    }
}

fn collect_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        match parse_config_override(entry).map_err(AppError::invalid_input)? {
            ConfigOverrideTarget::StorePath(path) => overrides.store_path = Some(path),
            ConfigOverrideTarget::HistoryLimit(limit) => overrides.history_limit = Some(limit),
        }
    }
    Ok(overrides)
}

fn open_manager(
    store: Option<PathBuf>,
    raw_overrides: &[String],
) -> Result<FileBackedManager, AppError> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = loaded.error.as_ref() {
        warn!(error = %err, "config ignored");
        eprintln!("WARNING: config ignored: {err}");
    }
    let config = config::merge_overrides(&loaded.config, &collect_overrides(raw_overrides)?);

    let path = match store {
        Some(path) => path,
        None => storage::store_path(config.store_path.as_deref())?,
    };
    debug!(path = %path.display(), history_limit = ?config.history_limit, "opening store");
    Ok(FileBackedManager::open(path)?.with_history_limit(config.history_limit))
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

/// Reads commands from stdin against one manager, so view history spans the session.
fn run_interactive() -> Result<(), AppError> {
    let mut manager = open_manager(None, &[])?;
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::io(err.to_string()))?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("tracker".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if cli.store.is_some() || !cli.config_override.is_empty() {
            let err = AppError::invalid_input(format!(
                "--store and {CONFIG_OVERRIDE_FLAG} are only accepted at startup"
            ));
            eprintln!("ERROR: {}", err);
            continue;
        }

        if let Err(err) = run_command(&mut manager, cli.command, cli.json) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn main() {
    init_tracing();

    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive() {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let Cli {
        command,
        json,
        store,
        config_override,
    } = cli;
    let result = open_manager(store, &config_override)
        .and_then(|mut manager| run_command(&mut manager, command, json));

    if let Err(err) = result {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
