//! Folds resolved entities and calendar events into the two report views:
//! a workspace → project → item tree and a color-keyed bucket list.
//!
//! The views are independent. Their totals are summed into one grand total
//! that all percentages are relative to.

use crate::domain::models::{
    CalendarEvent, EntityKind, NO_PROJECT_NAME, Project, ResolvedEntities, Workspace,
};
use crate::domain::palette::ColorPalette;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_transparent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectNode {
    pub id: Option<String>,
    pub name: String,
    pub color_hex: String,
    pub total_minutes: i64,
    pub percentage: f64,
    pub items: Vec<ReportItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceNode {
    pub id: String,
    pub name: String,
    pub total_minutes: i64,
    pub percentage: f64,
    pub projects: Vec<ProjectNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorBucket {
    pub color_id: String,
    pub color_name: String,
    pub background_hex: String,
    pub total_minutes: i64,
    pub percentage: f64,
    pub events: Vec<ReportItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeReport {
    pub workspaces: Vec<WorkspaceNode>,
    pub color_buckets: Vec<ColorBucket>,
    pub workspace_total_minutes: i64,
    pub color_total_minutes: i64,
    pub grand_total_minutes: i64,
}

impl TimeReport {
    pub fn workspace(&self, id: &str) -> Option<&WorkspaceNode> {
        self.workspaces.iter().find(|workspace| workspace.id == id)
    }

    pub fn color_bucket(&self, color_id: &str) -> Option<&ColorBucket> {
        self.color_buckets
            .iter()
            .find(|bucket| bucket.color_id == color_id)
    }
}

impl WorkspaceNode {
    pub fn project(&self, id: Option<&str>) -> Option<&ProjectNode> {
        self.projects
            .iter()
            .find(|project| project.id.as_deref() == id)
    }
}

/// Workspace tree under construction; insertion order is kept.
#[derive(Default)]
struct TreeBuilder {
    workspaces: Vec<WorkspaceNode>,
    workspace_index: HashMap<String, usize>,
    project_index: HashMap<(String, Option<String>), usize>,
}

impl TreeBuilder {
    fn workspace_mut(&mut self, workspace: &Workspace) -> &mut WorkspaceNode {
        let index = *self
            .workspace_index
            .entry(workspace.id.clone())
            .or_insert_with(|| {
                self.workspaces.push(WorkspaceNode {
                    id: workspace.id.clone(),
                    name: workspace.name.clone(),
                    total_minutes: 0,
                    percentage: 0.0,
                    projects: Vec::new(),
                });
                self.workspaces.len() - 1
            });
        &mut self.workspaces[index]
    }

    fn add(
        &mut self,
        workspace: &Workspace,
        project: Option<&Project>,
        palette: &ColorPalette,
        item: ReportItem,
    ) {
        let project_id = project.map(|project| project.id.clone());
        let key = (workspace.id.clone(), project_id.clone());
        let existing = self.project_index.get(&key).copied();
        let node = self.workspace_mut(workspace);

        let index = match existing {
            Some(index) => index,
            None => {
                node.projects.push(ProjectNode {
                    id: project_id,
                    name: project
                        .map(|project| project.name.clone())
                        .unwrap_or_else(|| NO_PROJECT_NAME.to_string()),
                    color_hex: palette.resolve_name(project.and_then(Project::color_tag)),
                    total_minutes: 0,
                    percentage: 0.0,
                    items: Vec::new(),
                });
                node.projects.len() - 1
            }
        };
        node.total_minutes += item.duration_minutes;
        let project_node = &mut node.projects[index];
        project_node.total_minutes += item.duration_minutes;
        project_node.items.push(item);
        self.project_index.insert(key, index);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn build_report(
        &self,
        entities: &ResolvedEntities,
        events: &[CalendarEvent],
        palette: &ColorPalette,
        options: ReportOptions,
    ) -> TimeReport {
        let mut tree = TreeBuilder::default();
        let mut visited_chunks: HashMap<String, HashSet<String>> = HashMap::new();

        for chunked in &entities.chunked_tasks {
            let workspace = &chunked.task.workspace;
            visited_chunks
                .entry(workspace.id.clone())
                .or_default()
                .extend(chunked.chunks.iter().map(|chunk| chunk.chunk.id.clone()));

            let end = chunked
                .chunks
                .iter()
                .filter_map(|chunk| chunk.chunk.schedule.end)
                .max()
                .or(chunked.task.scheduled_end);
            tree.add(
                workspace,
                chunked.project.as_ref(),
                palette,
                ReportItem {
                    id: chunked.task.id.clone(),
                    name: chunked.task.name.clone(),
                    kind: EntityKind::Task,
                    start: chunked.earliest_start(),
                    end,
                    duration_minutes: chunked.contributed_duration_minutes(),
                    chunk_ids: chunked.task.chunk_ids.clone(),
                },
            );
        }

        for resolved in &entities.regular_tasks {
            let workspace = &resolved.task.workspace;
            if is_visited(&visited_chunks, &workspace.id, &resolved.task.id) {
                continue;
            }
            tree.add(
                workspace,
                resolved.project.as_ref(),
                palette,
                ReportItem {
                    id: resolved.task.id.clone(),
                    name: resolved.task.name.clone(),
                    kind: EntityKind::Task,
                    start: resolved.schedule.start.or(resolved.task.scheduled_start),
                    end: resolved.schedule.end.or(resolved.task.scheduled_end),
                    duration_minutes: resolved.task.duration_minutes,
                    chunk_ids: Vec::new(),
                },
            );
        }

        let chunked_parents: HashSet<&str> = entities
            .chunked_tasks
            .iter()
            .map(|chunked| chunked.task.id.as_str())
            .collect();
        for resolved in &entities.chunks {
            let chunk = &resolved.chunk;
            let Some(workspace_id) = chunk.workspace_id.as_deref().filter(|id| !id.is_empty())
            else {
                continue;
            };
            if chunked_parents.contains(chunk.parent_task_id.as_str())
                || is_visited(&visited_chunks, workspace_id, &chunk.id)
            {
                continue;
            }
            visited_chunks
                .entry(workspace_id.to_string())
                .or_default()
                .insert(chunk.id.clone());

            let workspace = tree
                .workspaces
                .iter()
                .find(|node| node.id == workspace_id)
                .map(|node| Workspace {
                    id: node.id.clone(),
                    name: node.name.clone(),
                })
                .unwrap_or_else(|| Workspace {
                    id: workspace_id.to_string(),
                    name: workspace_id.to_string(),
                });
            tree.add(
                &workspace,
                None,
                palette,
                ReportItem {
                    id: chunk.id.clone(),
                    name: chunk.name.clone().unwrap_or_else(|| chunk.id.clone()),
                    kind: EntityKind::Chunk,
                    start: chunk.schedule.start,
                    end: chunk.schedule.end,
                    duration_minutes: resolved.scheduled_duration_minutes,
                    chunk_ids: Vec::new(),
                },
            );
        }

        let color_buckets = bucket_events(events, palette, options);

        let mut workspaces = tree.workspaces;
        let workspace_total_minutes: i64 = workspaces.iter().map(|node| node.total_minutes).sum();
        let color_total_minutes: i64 = color_buckets.iter().map(|bucket| bucket.total_minutes).sum();
        let grand_total_minutes = workspace_total_minutes + color_total_minutes;

        for workspace in &mut workspaces {
            workspace.percentage = percentage(workspace.total_minutes, grand_total_minutes);
            for project in &mut workspace.projects {
                project.percentage = percentage(project.total_minutes, grand_total_minutes);
                sort_by_start(&mut project.items);
            }
        }
        let color_buckets = color_buckets
            .into_iter()
            .map(|mut bucket| {
                bucket.percentage = percentage(bucket.total_minutes, grand_total_minutes);
                sort_by_start(&mut bucket.events);
                bucket
            })
            .collect();

        TimeReport {
            workspaces,
            color_buckets,
            workspace_total_minutes,
            color_total_minutes,
            grand_total_minutes,
        }
    }
}

fn bucket_events(
    events: &[CalendarEvent],
    palette: &ColorPalette,
    options: ReportOptions,
) -> Vec<ColorBucket> {
    let mut buckets: Vec<ColorBucket> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for event in events {
        if event.transparent && !options.include_transparent {
            continue;
        }
        let position = *index.entry(event.color_id.as_str()).or_insert_with(|| {
            let (color_name, background_hex) = match palette.by_id(&event.color_id) {
                Some(entry) => (entry.name.clone(), entry.background_hex.clone()),
                None => (event.color_id.clone(), palette.default_hex().to_string()),
            };
            buckets.push(ColorBucket {
                color_id: event.color_id.clone(),
                color_name,
                background_hex,
                total_minutes: 0,
                percentage: 0.0,
                events: Vec::new(),
            });
            buckets.len() - 1
        });

        let bucket = &mut buckets[position];
        let duration_minutes = event.duration_minutes();
        bucket.total_minutes += duration_minutes;
        bucket.events.push(ReportItem {
            id: event.id.clone(),
            name: event.summary.clone(),
            kind: EntityKind::Event,
            start: event.start,
            end: event.end,
            duration_minutes,
            chunk_ids: Vec::new(),
        });
    }

    buckets
}

fn is_visited(visited: &HashMap<String, HashSet<String>>, workspace_id: &str, id: &str) -> bool {
    visited
        .get(workspace_id)
        .is_some_and(|chunks| chunks.contains(id))
}

fn percentage(minutes: i64, grand_total: i64) -> f64 {
    if grand_total == 0 {
        return 0.0;
    }
    minutes as f64 / grand_total as f64 * 100.0
}

/// Ascending by start; undated items keep their relative order at the end.
fn sort_by_start(items: &mut [ReportItem]) {
    items.sort_by_key(|item| (item.start.is_none(), item.start));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Chunk, ChunkedTask, ResolvedChunk, ResolvedTask, Schedule, Task,
    };

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2026-02-16T{hour:02}:{minute:02}:00Z"))
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn workspace() -> Workspace {
        Workspace {
            id: "w1".to_string(),
            name: "University".to_string(),
        }
    }

    fn task(id: &str, duration: i64, project_id: Option<&str>) -> Task {
        Task {
            id: id.to_string(),
            name: format!("Task {id}"),
            workspace: workspace(),
            project_id: project_id.map(str::to_string),
            duration_minutes: duration,
            scheduled_start: None,
            scheduled_end: None,
            chunk_ids: Vec::new(),
            completed: false,
        }
    }

    fn project(id: &str, description: &str) -> Project {
        Project {
            id: id.to_string(),
            name: format!("Project {id}"),
            description: description.to_string(),
            workspace_id: Some("w1".to_string()),
        }
    }

    fn regular(task: Task, project: Option<Project>, start: Option<DateTime<Utc>>) -> ResolvedTask {
        let schedule = Schedule {
            start,
            end: start.map(|start| start + chrono::Duration::minutes(task.duration_minutes)),
            timeless: false,
        };
        ResolvedTask {
            scheduled_duration_minutes: schedule.duration_minutes(),
            task,
            project,
            schedule,
        }
    }

    fn resolved_chunk(id: &str, parent: &str, start: DateTime<Utc>, minutes: i64) -> ResolvedChunk {
        ResolvedChunk {
            chunk: Chunk {
                id: id.to_string(),
                parent_task_id: parent.to_string(),
                name: None,
                workspace_id: Some("w1".to_string()),
                schedule: Schedule::timed(start, start + chrono::Duration::minutes(minutes)),
            },
            scheduled_duration_minutes: minutes,
        }
    }

    fn event(id: &str, color_id: &str, start: DateTime<Utc>, minutes: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: format!("Event {id}"),
            color_id: color_id.to_string(),
            start: Some(start),
            end: Some(start + chrono::Duration::minutes(minutes)),
            all_day: false,
            transparent: false,
        }
    }

    #[test]
    fn task_is_placed_under_its_project_with_resolved_color() {
        let entities = ResolvedEntities {
            regular_tasks: vec![regular(
                task("T", 45, Some("P")),
                Some(project("P", "notes [GoogleColor=Basil]")),
                Some(at(9, 0)),
            )],
            ..ResolvedEntities::default()
        };

        let report = AggregationEngine::new().build_report(
            &entities,
            &[],
            &ColorPalette::builtin(),
            ReportOptions::default(),
        );

        let workspace = report.workspace("w1").expect("workspace node");
        let project = workspace.project(Some("P")).expect("project node");
        assert_eq!(project.total_minutes, 45);
        assert_eq!(project.color_hex, "#0b8043");
        assert_eq!(workspace.total_minutes, 45);
        assert_eq!(report.grand_total_minutes, 45);
        assert!((project.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn chunked_task_contributes_chunk_durations_only_once() {
        let mut parent = task("T", 240, Some("P"));
        parent.chunk_ids = vec!["c1".to_string()];
        let c1 = resolved_chunk("c1", "T", at(10, 0), 30);
        let entities = ResolvedEntities {
            chunked_tasks: vec![ChunkedTask {
                task: parent,
                project: Some(project("P", "")),
                chunks: vec![c1.clone()],
            }],
            chunks: vec![c1],
            ..ResolvedEntities::default()
        };

        let report = AggregationEngine::new().build_report(
            &entities,
            &[],
            &ColorPalette::builtin(),
            ReportOptions::default(),
        );

        let workspace = report.workspace("w1").expect("workspace node");
        assert_eq!(workspace.total_minutes, 30);
        assert_eq!(workspace.projects.len(), 1);
        let project = &workspace.projects[0];
        assert_eq!(project.items.len(), 1);
        assert_eq!(project.items[0].id, "T");
        assert_eq!(project.items[0].chunk_ids, vec!["c1".to_string()]);
        assert_eq!(project.color_hex, "#616161");
    }

    #[test]
    fn orphan_chunk_with_workspace_is_surfaced_standalone() {
        let orphan = resolved_chunk("c7", "gone", at(8, 0), 25);
        let entities = ResolvedEntities {
            chunks: vec![orphan],
            ..ResolvedEntities::default()
        };

        let report = AggregationEngine::new().build_report(
            &entities,
            &[],
            &ColorPalette::builtin(),
            ReportOptions::default(),
        );

        let workspace = report.workspace("w1").expect("workspace node");
        let project = workspace.project(None).expect("no project node");
        assert_eq!(project.name, NO_PROJECT_NAME);
        assert_eq!(project.items[0].kind, EntityKind::Chunk);
        assert_eq!(project.total_minutes, 25);
    }

    #[test]
    fn events_are_bucketed_by_color_and_transparent_ones_skipped() {
        let mut free = event("e3", "10", at(7, 0), 60);
        free.transparent = true;
        let events = vec![
            event("e2", "10", at(11, 0), 30),
            event("e1", "10", at(9, 0), 30),
            event("e4", "0", at(12, 0), 60),
            free,
        ];

        let report = AggregationEngine::new().build_report(
            &ResolvedEntities::default(),
            &events,
            &ColorPalette::builtin(),
            ReportOptions::default(),
        );

        let basil = report.color_bucket("10").expect("basil bucket");
        assert_eq!(basil.total_minutes, 60);
        assert_eq!(basil.background_hex, "#0b8043");
        let ids: Vec<_> = basil.events.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(report.grand_total_minutes, 120);
        assert!((basil.percentage - 50.0).abs() < 1e-9);

        let with_transparent = AggregationEngine::new().build_report(
            &ResolvedEntities::default(),
            &events,
            &ColorPalette::builtin(),
            ReportOptions {
                include_transparent: true,
            },
        );
        assert_eq!(
            with_transparent.color_bucket("10").expect("basil").total_minutes,
            120
        );
    }

    #[test]
    fn items_without_start_sort_last_and_tasks_without_project_are_grouped() {
        let entities = ResolvedEntities {
            regular_tasks: vec![
                regular(task("late", 10, None), None, Some(at(15, 0))),
                regular(task("undated-a", 10, None), None, None),
                regular(task("early", 10, None), None, Some(at(8, 0))),
                regular(task("undated-b", 10, None), None, None),
            ],
            ..ResolvedEntities::default()
        };

        let report = AggregationEngine::new().build_report(
            &entities,
            &[],
            &ColorPalette::builtin(),
            ReportOptions::default(),
        );

        let project = report
            .workspace("w1")
            .and_then(|workspace| workspace.project(None))
            .expect("no project node");
        let ids: Vec<_> = project.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "undated-a", "undated-b"]);
        assert_eq!(project.total_minutes, 40);
    }

    #[test]
    fn empty_input_yields_zero_percentages() {
        let report = AggregationEngine::new().build_report(
            &ResolvedEntities::default(),
            &[],
            &ColorPalette::builtin(),
            ReportOptions::default(),
        );
        assert_eq!(report, TimeReport::default());
    }
}
