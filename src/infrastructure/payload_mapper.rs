//! Wire shapes of the task-management service and their mapping into domain
//! types. Every field is optional on the wire; absent, `null` or mistyped
//! values map to defaults instead of failing the whole payload.

use crate::domain::models::{CalendarEvent, Chunk, Project, Schedule, Task, Workspace, UNTITLED_EVENT};
use crate::domain::palette::CALENDAR_COLOR_ID;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceDto {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectDto {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleDto {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub start: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub end: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub timeless: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskDto {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub workspace_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub workspace: Option<WorkspaceDto>,
    #[serde(deserialize_with = "lenient")]
    pub project_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub project: Option<ProjectDto>,
    pub duration: Value,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub chunk_ids: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub completed: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub completed_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkDto {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub parent_task_id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub workspace_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub schedule: Option<ScheduleDto>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub scheduled_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchEventDto {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub color_id: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub start: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub end: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub is_all_day: bool,
    #[serde(deserialize_with = "lenient")]
    pub transparency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduledEntityDto {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub schedule: Option<ScheduleDto>,
}

/// Entries of a models map keyed by id, in server order. Entries that do not
/// decode are skipped with a warning; a missing map yields nothing.
pub fn decode_model_map<T>(models: &Value, key: &str) -> Vec<(String, T)>
where
    T: for<'de> Deserialize<'de>,
{
    let Some(entries) = models.get(key) else {
        warn!(map = key, "batch response has no model map, treating as empty");
        return Vec::new();
    };
    let Some(entries) = entries.as_object() else {
        warn!(map = key, "model map is not an object, treating as empty");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|(id, raw)| match T::deserialize(raw) {
            Ok(dto) => Some((id.clone(), dto)),
            Err(error) => {
                warn!(map = key, id = %id, error = %error, "skipping undecodable model");
                None
            }
        })
        .collect()
}

pub fn decode_list<T>(items: Vec<Value>, what: &str) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    items
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<T>(raw) {
            Ok(dto) => Some(dto),
            Err(error) => {
                warn!(kind = what, error = %error, "skipping undecodable item");
                None
            }
        })
        .collect()
}

pub fn map_workspace(dto: WorkspaceDto) -> Workspace {
    Workspace {
        id: dto.id,
        name: dto.name,
    }
}

pub fn map_project(dto: ProjectDto) -> Project {
    Project {
        id: dto.id,
        name: dto.name,
        description: dto.description.unwrap_or_default(),
        workspace_id: dto.workspace_id,
    }
}

pub fn map_schedule(dto: ScheduleDto) -> Schedule {
    Schedule {
        start: dto.start,
        end: dto.end,
        timeless: dto.timeless,
    }
}

/// `workspace_names` resolves a bare `workspaceId` to a display name; the id
/// itself is used when the name is unknown.
pub fn map_task(dto: TaskDto, workspace_names: &HashMap<String, String>) -> Task {
    let workspace = match dto.workspace {
        Some(workspace) if !workspace.id.is_empty() => map_workspace(workspace),
        _ => {
            let id = dto.workspace_id.unwrap_or_default();
            let name = workspace_names.get(&id).cloned().unwrap_or_else(|| id.clone());
            Workspace { id, name }
        }
    };
    let project_id = dto
        .project_id
        .or_else(|| dto.project.map(|project| project.id))
        .filter(|id| !id.is_empty());

    Task {
        id: dto.id,
        name: dto.name,
        workspace,
        project_id,
        duration_minutes: duration_minutes(&dto.duration),
        scheduled_start: dto.scheduled_start,
        scheduled_end: dto.scheduled_end,
        chunk_ids: dto.chunk_ids,
        completed: dto.completed.unwrap_or(dto.completed_time.is_some()),
    }
}

pub fn map_chunk(dto: ChunkDto) -> Chunk {
    let schedule = dto.schedule.map(map_schedule).unwrap_or(Schedule {
        start: dto.scheduled_start,
        end: dto.scheduled_end,
        timeless: false,
    });
    Chunk {
        id: dto.id,
        parent_task_id: dto.parent_task_id,
        name: dto.name,
        workspace_id: dto.workspace_id,
        schedule,
    }
}

pub fn map_batch_event(dto: BatchEventDto) -> CalendarEvent {
    CalendarEvent {
        id: dto.id,
        summary: dto
            .title
            .or(dto.summary)
            .filter(|summary| !summary.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
        color_id: dto
            .color_id
            .filter(|color_id| !color_id.is_empty())
            .unwrap_or_else(|| CALENDAR_COLOR_ID.to_string()),
        start: dto.start,
        end: dto.end,
        all_day: dto.is_all_day,
        transparent: dto.transparency.as_deref() == Some("transparent"),
    }
}

/// Durations arrive as minutes (a number or a numeric string), or as a
/// marker string (`"NONE"`, `"REMINDER"`) meaning no time is booked.
pub fn duration_minutes(value: &Value) -> i64 {
    let minutes = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|minutes| minutes.round() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|minutes| minutes.is_finite())
                    .map(|minutes| minutes.round() as i64)
            })
        }
        _ => None,
    };
    minutes.unwrap_or(0).max(0)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value.trim()) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(error) => {
            warn!(value, error = %error, "unparseable timestamp, ignoring");
            None
        }
    }
}

/// Decodes a field, falling back to its default when the value is `null` or
/// of the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(raw).unwrap_or_else(|error| {
        warn!(error = %error, "mistyped field, using default");
        T::default()
    }))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::String(value) if !value.trim().is_empty() => parse_timestamp(&value),
        Value::String(_) | Value::Null => None,
        other => {
            warn!(value = %other, "timestamp is not a string, ignoring");
            None
        }
    })
}
