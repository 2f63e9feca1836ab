use crate::domain::models::{
    CalendarEvent, ChunkedTask, Project, ResolvedChunk, ResolvedEntities, ResolvedTask, Schedule,
    ScheduledEntity, ScheduledItem, TimeWindow,
};
use crate::infrastructure::payload_mapper::{
    BatchEventDto, ChunkDto, ProjectDto, ScheduledEntityDto, TaskDto, WorkspaceDto,
    decode_model_map, map_batch_event, map_chunk, map_project, map_schedule, map_task,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

const KIND_TASK: &str = "TASK";
const KIND_CHUNK: &str = "CHUNK";
const KIND_EVENT: &str = "EVENT";

/// One scheduled-entities response, decoded but not yet joined.
#[derive(Debug, Clone, Default)]
pub struct ScheduledBatch {
    pub window: Option<TimeWindow>,
    pub scheduled_entities: Vec<(String, ScheduledEntityDto)>,
    pub tasks: Vec<(String, TaskDto)>,
    pub chunks: Vec<(String, ChunkDto)>,
    pub calendar_events: Vec<(String, BatchEventDto)>,
    pub projects: Vec<(String, ProjectDto)>,
    pub workspaces: Vec<(String, WorkspaceDto)>,
}

impl ScheduledBatch {
    pub fn from_response(response: &Value, window: Option<TimeWindow>) -> Self {
        let empty = Value::Object(serde_json::Map::new());
        let models = response.get("models").unwrap_or_else(|| {
            warn!("scheduled entities response has no models, treating as empty");
            &empty
        });

        Self {
            window,
            scheduled_entities: decode_model_map(models, "scheduledEntities"),
            tasks: decode_model_map(models, "tasks"),
            chunks: decode_model_map(models, "chunks"),
            calendar_events: decode_model_map(models, "calendarEvents"),
            projects: decode_model_map(models, "projects"),
            workspaces: optional_map(models, "workspaces"),
        }
    }
}

fn optional_map<T>(models: &Value, key: &str) -> Vec<(String, T)>
where
    T: for<'de> serde::Deserialize<'de>,
{
    if models.get(key).is_none() {
        return Vec::new();
    }
    decode_model_map(models, key)
}

/// Joins a [`ScheduledBatch`] into typed collections.
///
/// A task whose chunk list intersects the chunks scheduled in the batch
/// becomes a chunked task: its record keeps only the in-window chunk ids and
/// collects those chunks, and it never appears among the regular tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntityResolver;

impl EntityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, batch: &ScheduledBatch) -> ResolvedEntities {
        let workspace_names: HashMap<String, String> = batch
            .workspaces
            .iter()
            .map(|(key, workspace)| (entity_id(key, &workspace.id), workspace.name.clone()))
            .collect();
        let projects: HashMap<String, Project> = batch
            .projects
            .iter()
            .map(|(key, project)| (entity_id(key, &project.id), map_project(project.clone())))
            .map(|(id, project)| (id.clone(), Project { id, ..project }))
            .collect();
        let tasks: HashMap<String, &TaskDto> = batch
            .tasks
            .iter()
            .map(|(key, task)| (entity_id(key, &task.id), task))
            .collect();
        let chunks: HashMap<String, &ChunkDto> = batch
            .chunks
            .iter()
            .map(|(key, chunk)| (entity_id(key, &chunk.id), chunk))
            .collect();
        let events: HashMap<String, &BatchEventDto> = batch
            .calendar_events
            .iter()
            .map(|(key, event)| (entity_id(key, &event.id), event))
            .collect();

        let in_window_chunks: HashSet<String> = batch
            .scheduled_entities
            .iter()
            .filter(|(_, entity)| entity.kind.eq_ignore_ascii_case(KIND_CHUNK))
            .map(|(key, entity)| entity_id(key, &entity.id))
            .collect();

        let mut resolved = ResolvedEntities::default();
        let mut chunked_index: HashMap<String, usize> = HashMap::new();
        let mut parent_of_chunk: HashMap<String, usize> = HashMap::new();

        for (key, dto) in &batch.tasks {
            if dto.chunk_ids.is_empty() {
                continue;
            }
            let retained: Vec<String> = dto
                .chunk_ids
                .iter()
                .filter(|chunk_id| in_window_chunks.contains(*chunk_id))
                .cloned()
                .collect();
            if retained.is_empty() {
                continue;
            }

            let mut task = map_task(dto.clone(), &workspace_names);
            task.id = entity_id(key, &task.id);
            task.chunk_ids = retained.clone();
            let project = lookup_project(&projects, task.project_id.as_deref());
            let index = resolved.chunked_tasks.len();
            for chunk_id in &retained {
                parent_of_chunk.entry(chunk_id.clone()).or_insert(index);
            }
            chunked_index.insert(task.id.clone(), index);
            resolved.chunked_tasks.push(ChunkedTask {
                task,
                project,
                chunks: Vec::new(),
            });
        }

        for (key, entity) in &batch.scheduled_entities {
            let id = entity_id(key, &entity.id);
            let schedule = entity.schedule.map(map_schedule).unwrap_or_default();
            let scheduled_duration_minutes = schedule.duration_minutes();

            let item = if entity.kind.eq_ignore_ascii_case(KIND_TASK) {
                let dto = tasks.get(&id).map(|dto| (*dto).clone());
                if dto.is_none() {
                    warn!(id = %id, "scheduled task has no task model, listing only");
                }
                let has_model = dto.is_some();
                let mut task = map_task(dto.unwrap_or_default(), &workspace_names);
                task.id = id.clone();
                let project = lookup_project(&projects, task.project_id.as_deref());
                let resolved_task = ResolvedTask {
                    task,
                    project,
                    schedule,
                    scheduled_duration_minutes,
                };
                if has_model && !chunked_index.contains_key(&id) {
                    resolved.regular_tasks.push(resolved_task.clone());
                }
                ScheduledItem::Task(resolved_task)
            } else if entity.kind.eq_ignore_ascii_case(KIND_CHUNK) {
                let dto = chunks.get(&id).map(|dto| (*dto).clone()).unwrap_or_else(|| {
                    warn!(id = %id, "scheduled chunk has no chunk model");
                    ChunkDto::default()
                });
                let mut chunk = map_chunk(dto);
                chunk.id = id.clone();
                if entity.schedule.is_some() {
                    chunk.schedule = schedule;
                }
                if chunk.parent_task_id.is_empty() {
                    if let Some(index) = parent_of_chunk.get(&id) {
                        let parent = &resolved.chunked_tasks[*index].task;
                        chunk.parent_task_id = parent.id.clone();
                        if chunk.workspace_id.is_none() && !parent.workspace.id.is_empty() {
                            chunk.workspace_id = Some(parent.workspace.id.clone());
                        }
                    }
                }
                let resolved_chunk = ResolvedChunk {
                    chunk,
                    scheduled_duration_minutes,
                };
                match chunked_index.get(&resolved_chunk.chunk.parent_task_id) {
                    Some(index) => resolved.chunked_tasks[*index]
                        .chunks
                        .push(resolved_chunk.clone()),
                    None => debug!(
                        id = %id,
                        parent = %resolved_chunk.chunk.parent_task_id,
                        "chunk parent is not in this batch"
                    ),
                }
                resolved.chunks.push(resolved_chunk.clone());
                ScheduledItem::Chunk(resolved_chunk)
            } else if entity.kind.eq_ignore_ascii_case(KIND_EVENT) {
                let event = merge_event(&id, events.get(&id).copied(), &schedule);
                resolved.calendar_events.push(event.clone());
                ScheduledItem::Event(event)
            } else {
                debug!(id = %id, kind = %entity.kind, "scheduled entity of other kind is listed only");
                ScheduledItem::Other(entity.kind.clone())
            };

            resolved.all_scheduled_entities.push(ScheduledEntity {
                id,
                schedule,
                scheduled_duration_minutes,
                item,
            });
        }

        resolved
    }
}

fn entity_id(key: &str, id: &str) -> String {
    if id.is_empty() {
        key.to_string()
    } else {
        id.to_string()
    }
}

fn lookup_project(projects: &HashMap<String, Project>, project_id: Option<&str>) -> Option<Project> {
    project_id.and_then(|id| projects.get(id)).cloned()
}

fn merge_event(id: &str, dto: Option<&BatchEventDto>, schedule: &Schedule) -> CalendarEvent {
    let mut event = map_batch_event(dto.cloned().unwrap_or_default());
    event.id = id.to_string();
    if event.start.is_none() {
        event.start = schedule.start;
    }
    if event.end.is_none() {
        event.end = schedule.end;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EntityKind;
    use serde_json::json;

    fn batch(response: Value) -> ScheduledBatch {
        ScheduledBatch::from_response(&response, None)
    }

    #[test]
    fn task_with_one_in_window_chunk_is_chunked_and_not_regular() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "c1": {
                        "id": "c1",
                        "type": "CHUNK",
                        "schedule": {
                            "start": "2026-02-16T09:00:00Z",
                            "end": "2026-02-16T09:30:00Z",
                            "timeless": false
                        }
                    }
                },
                "tasks": {
                    "t1": {
                        "id": "t1",
                        "name": "Thesis chapter",
                        "workspaceId": "w1",
                        "duration": 120,
                        "chunkIds": ["c1", "c2"]
                    }
                },
                "chunks": {
                    "c1": {"id": "c1", "parentTaskId": "t1", "workspaceId": "w1"},
                    "c2": {"id": "c2", "parentTaskId": "t1", "workspaceId": "w1"}
                }
            }
        })));

        assert!(resolved.regular_tasks.is_empty());
        assert_eq!(resolved.chunked_tasks.len(), 1);
        let chunked = &resolved.chunked_tasks[0];
        assert_eq!(chunked.task.chunk_ids, vec!["c1".to_string()]);
        assert_eq!(chunked.contributed_duration_minutes(), 30);
        assert_eq!(chunked.chunks.len(), 1);
        assert_eq!(chunked.chunks[0].chunk.id, "c1");
        assert_eq!(resolved.chunks.len(), 1);
        assert_eq!(resolved.all_scheduled_entities.len(), 1);
        assert_eq!(resolved.all_scheduled_entities[0].kind(), EntityKind::Chunk);
    }

    #[test]
    fn task_whose_chunks_are_all_outside_window_stays_regular() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "t1": {
                        "id": "t1",
                        "type": "TASK",
                        "schedule": {
                            "start": "2026-02-16T09:00:00Z",
                            "end": "2026-02-16T10:00:00Z"
                        }
                    }
                },
                "tasks": {
                    "t1": {"id": "t1", "name": "Plan", "duration": 60, "chunkIds": ["c9"], "projectId": "p1"}
                },
                "projects": {
                    "p1": {"id": "p1", "name": "Planning", "description": "[GoogleColor=Sage]"}
                }
            }
        })));

        assert!(resolved.chunked_tasks.is_empty());
        assert_eq!(resolved.regular_tasks.len(), 1);
        let task = &resolved.regular_tasks[0];
        assert_eq!(task.scheduled_duration_minutes, 60);
        assert_eq!(task.project.as_ref().map(|p| p.name.as_str()), Some("Planning"));
    }

    #[test]
    fn missing_model_maps_resolve_to_empty_collections() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "t1": {"id": "t1", "type": "TASK"},
                    "e1": {"id": "e1", "type": "EVENT", "schedule": {
                        "start": "2026-02-16T12:00:00Z",
                        "end": "2026-02-16T12:45:00Z"
                    }}
                }
            }
        })));

        // A scheduled task without its task model is listed but not counted.
        assert!(resolved.regular_tasks.is_empty());
        assert_eq!(resolved.calendar_events.len(), 1);
        assert_eq!(resolved.calendar_events[0].duration_minutes(), 45);
        assert_eq!(resolved.all_scheduled_entities.len(), 2);

        let empty = EntityResolver::new().resolve(&batch(json!({})));
        assert_eq!(empty, ResolvedEntities::default());
    }

    #[test]
    fn timeless_schedules_contribute_nothing() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "c1": {"id": "c1", "type": "CHUNK", "schedule": {
                        "start": "2026-02-16T09:00:00Z",
                        "end": "2026-02-16T11:00:00Z",
                        "timeless": true
                    }}
                },
                "tasks": {"t1": {"id": "t1", "chunkIds": ["c1"]}},
                "chunks": {"c1": {"id": "c1", "parentTaskId": "t1"}}
            }
        })));

        assert_eq!(resolved.chunked_tasks.len(), 1);
        assert_eq!(resolved.chunked_tasks[0].contributed_duration_minutes(), 0);
        assert_eq!(resolved.all_scheduled_entities[0].scheduled_duration_minutes, 0);
    }

    #[test]
    fn other_entity_kinds_are_listed_but_not_resolved() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "b1": {"id": "b1", "type": "BLOCKING_TIMESLOT"}
                }
            }
        })));
        assert!(resolved.regular_tasks.is_empty());
        assert!(resolved.chunks.is_empty());
        assert!(resolved.calendar_events.is_empty());
        assert_eq!(resolved.all_scheduled_entities.len(), 1);
        assert_eq!(resolved.all_scheduled_entities[0].kind(), EntityKind::Other);
        assert_eq!(
            resolved.all_scheduled_entities[0].item,
            ScheduledItem::Other("BLOCKING_TIMESLOT".to_string())
        );
    }

    #[test]
    fn null_fields_keep_task_and_project_in_the_batch() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "T": {"id": "T", "type": "TASK", "schedule": {
                        "start": "2026-02-17T09:00:00Z",
                        "end": "2026-02-17T09:45:00Z",
                        "timeless": null
                    }}
                },
                "tasks": {"T": {
                    "id": "T",
                    "name": "Essay",
                    "workspaceId": "w1",
                    "projectId": "P",
                    "duration": 45,
                    "chunkIds": null
                }},
                "projects": {"P": {"id": "P", "name": null, "description": "[GoogleColor=Basil]"}},
                "workspaces": {"w1": {"id": "w1", "name": "Personal"}}
            }
        })));

        assert_eq!(resolved.regular_tasks.len(), 1);
        let task = &resolved.regular_tasks[0];
        assert_eq!(task.task.workspace.id, "w1");
        assert_eq!(task.task.workspace.name, "Personal");
        assert_eq!(task.task.duration_minutes, 45);
        assert_eq!(task.scheduled_duration_minutes, 45);
        let project = task.project.as_ref().expect("project survives a null name");
        assert_eq!(project.id, "P");
        assert_eq!(project.color_tag(), Some("Basil"));
    }

    #[test]
    fn chunks_without_models_attach_through_parent_chunk_ids() {
        let resolved = EntityResolver::new().resolve(&batch(json!({
            "models": {
                "scheduledEntities": {
                    "c1": {"id": "c1", "type": "CHUNK", "schedule": {
                        "start": "2026-02-16T09:00:00Z",
                        "end": "2026-02-16T09:30:00Z"
                    }},
                    "c2": {"id": "c2", "type": "CHUNK", "schedule": {
                        "start": "2026-02-17T09:00:00Z",
                        "end": "2026-02-17T09:20:00Z"
                    }}
                },
                "tasks": {"t1": {
                    "id": "t1",
                    "workspaceId": "w1",
                    "duration": 240,
                    "chunkIds": ["c1", "c2"]
                }}
            }
        })));

        assert_eq!(resolved.chunked_tasks.len(), 1);
        let chunked = &resolved.chunked_tasks[0];
        assert_eq!(chunked.chunks.len(), 2);
        assert_eq!(chunked.contributed_duration_minutes(), 50);
        for chunk in &resolved.chunks {
            assert_eq!(chunk.chunk.parent_task_id, "t1");
            assert_eq!(chunk.chunk.workspace_id.as_deref(), Some("w1"));
        }
    }
}
