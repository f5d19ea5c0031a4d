//! Line-oriented snapshot of every stored item.
//!
//! ```text
//! id,type,name,status,description,epic,startTime,duration
//! 1,TASK,Buy bread,NEW,rye,2025-06-02T09:00:00,30
//! 2,EPIC,Dinner,NEW,for two
//! 3,SUBTASK,Boil water,DONE,,2,null,null
//! ```
//!
//! Epic rows carry no status or time columns worth trusting; both are
//! recomputed from subtask rows on load. Text fields escape `\`, `,`, and line
//! breaks with a backslash.

use crate::error::AppError;
use crate::model::{
    Entity, EntityKind, Epic, Subtask, Task, TaskId, TaskStatus, format_timestamp, parse_timestamp,
};
use std::path::{Path, PathBuf};
use time::{Duration, PrimitiveDateTime};
use tracing::info;

pub const HEADER: &str = "id,type,name,status,description,epic,startTime,duration";
const NULL: &str = "null";

pub fn encode<I>(entities: I) -> Result<String, AppError>
where
    I: IntoIterator<Item = Entity>,
{
    let mut content = String::from(HEADER);
    content.push('\n');
    for entity in entities {
        content.push_str(&encode_row(&entity)?);
        content.push('\n');
    }
    Ok(content)
}

pub fn encode_row(entity: &Entity) -> Result<String, AppError> {
    let base = entity.base();
    let mut fields = vec![
        base.id.to_string(),
        entity.kind().tag().to_string(),
        escape_field(&base.title),
        base.status.as_str().to_string(),
        escape_field(&base.description),
    ];

    match entity {
        Entity::Task(task) => {
            fields.push(encode_start(task.start_time)?);
            fields.push(encode_duration(task.duration));
        }
        Entity::Epic(_) => {}
        Entity::Subtask(subtask) => {
            fields.push(subtask.epic_id().to_string());
            fields.push(encode_start(subtask.base.start_time)?);
            fields.push(encode_duration(subtask.base.duration));
        }
    }

    Ok(fields.join(","))
}

/// Parses snapshot text into rows in file order. Blank lines are skipped.
pub fn decode(content: &str) -> Result<Vec<Entity>, AppError> {
    let mut lines = content.lines().enumerate();
    let Some((_, header)) = lines.next() else {
        return Ok(Vec::new());
    };
    if header.trim_end() != HEADER {
        return Err(AppError::invalid_data(format!(
            "line 1: expected header '{HEADER}'"
        )));
    }

    let mut rows = Vec::new();
    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let row = decode_row(line)
            .map_err(|err| AppError::invalid_data(format!("line {}: {}", index + 1, detail(&err))))?;
        rows.push(row);
    }
    Ok(rows)
}

fn decode_row(line: &str) -> Result<Entity, AppError> {
    let fields = split_fields(line);
    let tag = fields
        .get(1)
        .ok_or_else(|| AppError::invalid_data("missing type column"))?;
    let kind = EntityKind::from_tag(tag)
        .ok_or_else(|| AppError::invalid_data(format!("unknown entity type '{tag}'")))?;

    let expected = match kind {
        EntityKind::Task => 7,
        EntityKind::Epic => 5,
        EntityKind::Subtask => 8,
    };
    if fields.len() != expected {
        return Err(AppError::invalid_data(format!(
            "{} row needs {expected} columns, found {}",
            kind.tag(),
            fields.len()
        )));
    }

    let id = parse_id(&fields[0])?;
    let title = fields[2].clone();
    let status: TaskStatus = fields[3]
        .parse()
        .map_err(|_| AppError::invalid_data(format!("unknown status '{}'", fields[3])))?;
    let description = fields[4].clone();

    let entity = match kind {
        EntityKind::Task => {
            let mut task = Task::with_id(id, title, description, status);
            task.start_time = decode_start(&fields[5])?;
            task.duration = decode_duration(&fields[6])?;
            Entity::Task(task)
        }
        EntityKind::Epic => Entity::Epic(Epic::with_id(id, title, description)),
        EntityKind::Subtask => {
            let epic_id = parse_id(&fields[5])?;
            let mut subtask = Subtask::with_id(id, title, description, status, epic_id);
            subtask.base.start_time = decode_start(&fields[6])?;
            subtask.base.duration = decode_duration(&fields[7])?;
            Entity::Subtask(subtask)
        }
    };
    Ok(entity)
}

pub fn read_snapshot(path: &Path) -> Result<Vec<Entity>, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let rows = decode(&content)?;
    info!(path = %path.display(), rows = rows.len(), "snapshot loaded");
    Ok(rows)
}

/// Replaces the file at `path` with the encoded entities.
pub fn write_snapshot<I>(path: &Path, entities: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = Entity>,
{
    let content = encode(entities)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| AppError::io(format!("{}: {}", parent.display(), err)))?;
    }

    let staging = staging_path(path);
    std::fs::write(&staging, &content)
        .map_err(|err| AppError::io(format!("{}: {}", staging.display(), err)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        if let Err(err) = std::fs::set_permissions(&staging, permissions) {
            std::fs::remove_file(&staging).ok();
            return Err(AppError::io(format!("{}: {}", staging.display(), err)));
        }
    }

    if let Err(err) = std::fs::rename(&staging, path) {
        std::fs::remove_file(&staging).ok();
        return Err(AppError::io(format!("{}: {}", path.display(), err)));
    }

    info!(
        path = %path.display(),
        rows = content.lines().count().saturating_sub(1),
        "snapshot written"
    );
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

fn detail(err: &AppError) -> String {
    match err {
        AppError::InvalidData(message) | AppError::InvalidInput(message) => message.clone(),
        other => other.to_string(),
    }
}

fn parse_id(raw: &str) -> Result<TaskId, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::invalid_data(format!("invalid id '{raw}'")))
}

fn encode_start(value: Option<PrimitiveDateTime>) -> Result<String, AppError> {
    match value {
        Some(start) => format_timestamp(start),
        None => Ok(NULL.to_string()),
    }
}

fn encode_duration(value: Option<Duration>) -> String {
    match value {
        Some(duration) => duration.whole_minutes().to_string(),
        None => NULL.to_string(),
    }
}

fn decode_start(raw: &str) -> Result<Option<PrimitiveDateTime>, AppError> {
    if raw == NULL {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(Some)
        .map_err(|_| AppError::invalid_data(format!("invalid start time '{raw}'")))
}

fn decode_duration(raw: &str) -> Result<Option<Duration>, AppError> {
    if raw == NULL {
        return Ok(None);
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|minutes| *minutes >= 0)
        .and_then(|minutes| minutes.checked_mul(60))
        .map(|seconds| Some(Duration::seconds(seconds)))
        .ok_or_else(|| AppError::invalid_data(format!("invalid duration '{raw}'")))
}

fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            ',' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}
