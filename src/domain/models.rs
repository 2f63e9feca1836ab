use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NO_PROJECT_NAME: &str = "No project";
pub const UNTITLED_EVENT: &str = "[No title]";

/// Bearer credential as issued by the token endpoint.
///
/// The expiry is read from the JWT payload without verifying the signature.
/// A credential is never edited; a refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct CredentialClaims {
    exp: Option<f64>,
}

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let mut segments = self.raw.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return None;
        };

        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let claims = serde_json::from_slice::<CredentialClaims>(&decoded).ok()?;
        let exp = claims.exp.filter(|value| value.is_finite())?;
        DateTime::from_timestamp(exp.floor() as i64, 0)
    }

    /// Valid iff the decoded `exp` lies strictly after `now`; undecodable
    /// credentials are simply invalid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at(), Some(expires_at) if now < expires_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub workspace_id: Option<String>,
}

impl Project {
    /// Color name embedded in the description as `[GoogleColor=<Name>]`.
    pub fn color_tag(&self) -> Option<&str> {
        const OPEN: &str = "[GoogleColor=";
        let start = self.description.find(OPEN)? + OPEN.len();
        let rest = &self.description[start..];
        let end = rest.find(']')?;
        let name = rest[..end].trim();
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Schedule {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub timeless: bool,
}

impl Schedule {
    pub fn timed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            timeless: false,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        if self.timeless {
            return 0;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => (end - start).num_minutes(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub workspace: Workspace,
    pub project_id: Option<String>,
    pub duration_minutes: i64,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub chunk_ids: Vec<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub parent_task_id: String,
    pub name: Option<String>,
    pub workspace_id: Option<String>,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub color_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub transparent: bool,
}

impl CalendarEvent {
    pub fn duration_minutes(&self) -> i64 {
        if self.all_day {
            return 0;
        }
        Schedule {
            start: self.start,
            end: self.end,
            timeless: false,
        }
        .duration_minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorEntry {
    pub id: String,
    pub name: String,
    pub background_hex: String,
    pub foreground_hex: String,
}

/// Task joined with its project, as produced by the entity resolver.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedTask {
    pub task: Task,
    pub project: Option<Project>,
    pub schedule: Schedule,
    pub scheduled_duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedChunk {
    pub chunk: Chunk,
    pub scheduled_duration_minutes: i64,
}

/// Canonical record of a task whose time is accounted through its in-window
/// chunks. `task.chunk_ids` only holds the in-window ids.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChunkedTask {
    pub task: Task,
    pub project: Option<Project>,
    pub chunks: Vec<ResolvedChunk>,
}

impl ChunkedTask {
    pub fn contributed_duration_minutes(&self) -> i64 {
        self.chunks
            .iter()
            .map(|chunk| chunk.scheduled_duration_minutes)
            .sum()
    }

    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.chunks
            .iter()
            .filter_map(|chunk| chunk.chunk.schedule.start)
            .min()
            .or(self.task.scheduled_start)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Task,
    Chunk,
    Event,
    Other,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "item", rename_all = "snake_case")]
pub enum ScheduledItem {
    Task(ResolvedTask),
    Chunk(ResolvedChunk),
    Event(CalendarEvent),
    /// Any other scheduled kind (blocking timeslots and the like), by its tag.
    Other(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScheduledEntity {
    pub id: String,
    pub schedule: Schedule,
    pub scheduled_duration_minutes: i64,
    pub item: ScheduledItem,
}

impl ScheduledEntity {
    pub fn kind(&self) -> EntityKind {
        match self.item {
            ScheduledItem::Task(_) => EntityKind::Task,
            ScheduledItem::Chunk(_) => EntityKind::Chunk,
            ScheduledItem::Event(_) => EntityKind::Event,
            ScheduledItem::Other(_) => EntityKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ResolvedEntities {
    pub regular_tasks: Vec<ResolvedTask>,
    pub chunked_tasks: Vec<ChunkedTask>,
    pub chunks: Vec<ResolvedChunk>,
    pub calendar_events: Vec<CalendarEvent>,
    pub all_scheduled_entities: Vec<ScheduledEntity>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn validate(&self) -> Result<(), String> {
        if self.end <= self.start {
            return Err("window.end must be after window.start".to_string());
        }
        Ok(())
    }
}
