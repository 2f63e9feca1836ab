//! Typed operations of the task-management service on top of the paginated
//! client.

use crate::application::entity_resolver::ScheduledBatch;
use crate::application::paginated_client::{PaginatedClient, RequestOptions};
use crate::domain::models::{Project, Task, TimeWindow, Workspace};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::http_gateway::ApiRequest;
use crate::infrastructure::payload_mapper::{
    ProjectDto, TaskDto, WorkspaceDto, decode_list, map_project, map_task, map_workspace,
};
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const CHUNK_MINIMUM_DURATION_MINUTES: i64 = 45;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub workspace_id: Option<String>,
    pub project_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
}

impl TaskQuery {
    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        let filters = [
            ("workspaceId", &self.workspace_id),
            ("projectId", &self.project_id),
            ("name", &self.name),
            ("status", &self.status),
        ];
        for (key, value) in filters {
            if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
                request.set_query(key, value);
            }
        }
        request
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpdate {
    pub task_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingOutcome {
    pub workspace_id: String,
    pub project_id: String,
    pub examined: usize,
    pub updated: Vec<String>,
    pub failed: Vec<FailedUpdate>,
}

pub struct TaskService {
    client: Arc<PaginatedClient>,
}

impl TaskService {
    pub fn new(client: Arc<PaginatedClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<PaginatedClient> {
        &self.client
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, InfraError> {
        let items = self
            .client
            .request(ApiRequest::get("/workspaces"), self.client.options())
            .await?
            .into_list();
        Ok(decode_list::<WorkspaceDto>(items, "workspace")
            .into_iter()
            .map(map_workspace)
            .collect())
    }

    pub async fn find_workspace_id(&self, name: &str) -> Result<Option<String>, InfraError> {
        let workspaces = self.list_workspaces().await?;
        Ok(find_by_name(workspaces, name, |workspace| &workspace.name).map(|workspace| workspace.id))
    }

    pub async fn list_projects(&self, workspace_id: &str) -> Result<Vec<Project>, InfraError> {
        let request = ApiRequest::get("/projects").query("workspaceId", workspace_id);
        let items = self
            .client
            .request(request, self.client.options())
            .await?
            .into_list();
        Ok(decode_list::<ProjectDto>(items, "project")
            .into_iter()
            .map(map_project)
            .collect())
    }

    pub async fn find_project_id(
        &self,
        workspace_id: &str,
        name: &str,
    ) -> Result<Option<String>, InfraError> {
        let projects = self.list_projects(workspace_id).await?;
        Ok(find_by_name(projects, name, |project| &project.name).map(|project| project.id))
    }

    pub async fn list_tasks(
        &self,
        query: &TaskQuery,
        page_limit: Option<usize>,
    ) -> Result<Vec<Task>, InfraError> {
        let request = query.apply(ApiRequest::get("/tasks"));
        let items = self
            .client
            .request(request, self.client.options().with_limit(page_limit))
            .await?
            .into_list();
        let no_names = HashMap::new();
        Ok(decode_list::<TaskDto>(items, "task")
            .into_iter()
            .map(|dto| map_task(dto, &no_names))
            .collect())
    }

    pub async fn tasks_in_project(&self, project_id: &str) -> Result<Vec<Task>, InfraError> {
        self.list_tasks(&TaskQuery::default().in_project(project_id), None)
            .await
    }

    pub async fn list_schedules(&self) -> Result<Vec<Value>, InfraError> {
        Ok(self
            .client
            .request(ApiRequest::get("/schedules"), self.client.options().direct_list())
            .await?
            .into_list())
    }

    pub async fn fetch_scheduled_entities(
        &self,
        window: TimeWindow,
    ) -> Result<ScheduledBatch, InfraError> {
        window.validate().map_err(InfraError::InvalidRequest)?;
        let body = json!({
            "include": ["task", "blockingTimeslot", "event"],
            "filters": {
                "completed": "include",
                "myCalendarsOnly": true,
                "scheduled": {
                    "from": window.start.to_rfc3339_opts(SecondsFormat::Millis, true),
                    "to": window.end.to_rfc3339_opts(SecondsFormat::Millis, true),
                },
                "calendarsOptions": {},
            },
        });
        let request = ApiRequest::post("/v2/scheduled-entities")
            .internal()
            .body(body);
        let response = self
            .client
            .request(request, self.client.options())
            .await?
            .into_object();
        Ok(ScheduledBatch::from_response(&response, Some(window)))
    }

    /// Creates a task. The workspace comes from `workspace_id` or from the
    /// `workspaceId` field; fields supplied by the caller take precedence in
    /// the merged body.
    pub async fn create_task(
        &self,
        fields: Map<String, Value>,
        workspace_id: Option<&str>,
    ) -> Result<Value, InfraError> {
        let workspace_id = workspace_id
            .map(str::to_string)
            .or_else(|| {
                fields
                    .get("workspaceId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                InfraError::InvalidRequest("workspace id is required to create a task".to_string())
            })?;

        let request = ApiRequest::post("/tasks").body(merge_workspace(&workspace_id, fields));
        Ok(self
            .client
            .request(request, self.client.options())
            .await?
            .into_object())
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, InfraError> {
        let request = ApiRequest::patch(format!("/tasks/{task_id}")).body(Value::Object(fields));
        Ok(self
            .client
            .request(request, self.client.options())
            .await?
            .into_object())
    }

    pub async fn update_task_v2(
        &self,
        task_id: &str,
        workspace_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, InfraError> {
        let request = ApiRequest::patch(format!("/v2/tasks/{task_id}"))
            .internal()
            .body(merge_workspace(workspace_id, fields));
        Ok(self
            .client
            .request(request, self.client.options())
            .await?
            .into_object())
    }

    pub async fn set_blocking_tasks(
        &self,
        task_id: &str,
        workspace_id: &str,
        blocked_ids: &[String],
    ) -> Result<Value, InfraError> {
        let blocking: Vec<Value> = blocked_ids
            .iter()
            .map(|blocked_id| json!({ "blockedId": blocked_id }))
            .collect();
        let mut fields = Map::new();
        fields.insert("blockingTasks".to_string(), Value::Array(blocking));
        self.update_task_v2(task_id, workspace_id, fields).await
    }

    /// Marks every task of the named project whose duration is strictly over
    /// `duration_limit` minutes as auto-chunkable. Per-task failures are
    /// collected, not propagated.
    pub async fn flag_long_tasks_for_chunking(
        &self,
        workspace_name: &str,
        project_name: &str,
        duration_limit: i64,
    ) -> Result<ChunkingOutcome, InfraError> {
        let workspace_id = self
            .find_workspace_id(workspace_name)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("workspace '{workspace_name}'")))?;
        let project_id = self
            .find_project_id(&workspace_id, project_name)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("project '{project_name}'")))?;

        let tasks = self.tasks_in_project(&project_id).await?;
        let mut outcome = ChunkingOutcome {
            workspace_id: workspace_id.clone(),
            project_id,
            examined: tasks.len(),
            ..ChunkingOutcome::default()
        };

        for task in tasks.iter().filter(|task| task.duration_minutes > duration_limit) {
            let mut fields = Map::new();
            fields.insert("isChunkedTask".to_string(), Value::Bool(true));
            fields.insert(
                "minimumDuration".to_string(),
                Value::from(CHUNK_MINIMUM_DURATION_MINUTES),
            );
            match self.update_task_v2(&task.id, &workspace_id, fields).await {
                Ok(_) => {
                    info!(task_id = %task.id, duration = task.duration_minutes, "task flagged for chunking");
                    outcome.updated.push(task.id.clone());
                }
                Err(error) => {
                    warn!(task_id = %task.id, error = %error, "failed to flag task for chunking");
                    outcome.failed.push(FailedUpdate {
                        task_id: task.id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }
}

fn merge_workspace(workspace_id: &str, fields: Map<String, Value>) -> Value {
    let mut body = Map::new();
    body.insert(
        "workspaceId".to_string(),
        Value::String(workspace_id.to_string()),
    );
    body.extend(fields);
    Value::Object(body)
}

fn find_by_name<T>(items: Vec<T>, name: &str, name_of: impl Fn(&T) -> &String) -> Option<T> {
    let wanted = name.trim().to_lowercase();
    items
        .into_iter()
        .find(|item| name_of(item).trim().to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::http_gateway::{ApiScope, ApiTransport, GatewayResponse};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use reqwest::Method;
    use std::sync::Mutex;

    /// Answers by method and path; records every request.
    struct RoutedTransport {
        routes: Vec<(Method, String, Result<Value, u16>)>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl RoutedTransport {
        fn new(routes: Vec<(Method, &str, Result<Value, u16>)>) -> Self {
            Self {
                routes: routes
                    .into_iter()
                    .map(|(method, path, response)| (method, path.to_string(), response))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().expect("requests mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl ApiTransport for RoutedTransport {
        async fn execute(&self, request: &ApiRequest) -> Result<GatewayResponse, InfraError> {
            self.requests
                .lock()
                .expect("requests mutex poisoned")
                .push(request.clone());
            let route = self
                .routes
                .iter()
                .find(|(method, path, _)| *method == request.method && *path == request.path);
            match route.map(|(_, _, response)| response.clone()) {
                Some(Ok(body)) => Ok(GatewayResponse::Success(body)),
                Some(Err(status)) => Err(InfraError::Http {
                    method: request.method.to_string(),
                    endpoint: request.path.clone(),
                    status,
                    body: String::new(),
                }),
                None => Err(InfraError::Http {
                    method: request.method.to_string(),
                    endpoint: request.path.clone(),
                    status: 404,
                    body: "no route".to_string(),
                }),
            }
        }
    }

    fn service(transport: Arc<RoutedTransport>) -> TaskService {
        let clock = Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-02-16T00:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
        ));
        TaskService::new(Arc::new(PaginatedClient::new(transport).with_clock(clock)))
    }

    fn workspaces_route() -> (Method, &'static str, Result<Value, u16>) {
        (
            Method::GET,
            "/workspaces",
            Ok(json!({"workspaces": [
                {"id": "w1", "name": "Personal"},
                {"id": "w2", "name": "University"}
            ], "meta": {}})),
        )
    }

    fn projects_route() -> (Method, &'static str, Result<Value, u16>) {
        (
            Method::GET,
            "/projects",
            Ok(json!({"projects": [
                {"id": "p1", "name": "Thesis", "description": "[GoogleColor=Grape]"}
            ], "meta": {}})),
        )
    }

    #[tokio::test]
    async fn names_are_matched_case_insensitively() {
        let transport = Arc::new(RoutedTransport::new(vec![workspaces_route(), projects_route()]));
        let service = service(Arc::clone(&transport));

        assert_eq!(
            service.find_workspace_id("university").await.expect("lookup"),
            Some("w2".to_string())
        );
        assert_eq!(service.find_workspace_id("Work").await.expect("lookup"), None);
        assert_eq!(
            service.find_project_id("w2", "THESIS").await.expect("lookup"),
            Some("p1".to_string())
        );
        let project_request = transport
            .requests()
            .into_iter()
            .find(|request| request.path == "/projects")
            .expect("projects request");
        assert_eq!(project_request.query_value("workspaceId"), Some("w2"));
    }

    #[tokio::test]
    async fn create_task_requires_a_workspace_and_merges_it_into_the_body() {
        let transport = Arc::new(RoutedTransport::new(vec![(
            Method::POST,
            "/tasks",
            Ok(json!({"id": "t-new"})),
        )]));
        let service = service(Arc::clone(&transport));

        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("Read chapter 3"));
        let missing = service.create_task(fields.clone(), None).await;
        assert!(matches!(missing, Err(InfraError::InvalidRequest(_))));
        assert!(transport.requests().is_empty());

        let created = service
            .create_task(fields, Some("w1"))
            .await
            .expect("create task");
        assert_eq!(created, json!({"id": "t-new"}));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].body,
            Some(json!({"workspaceId": "w1", "name": "Read chapter 3"}))
        );
        assert_eq!(requests[0].scope, ApiScope::Public);
    }

    #[tokio::test]
    async fn scheduled_entities_request_targets_internal_v2_endpoint() {
        let transport = Arc::new(RoutedTransport::new(vec![(
            Method::POST,
            "/v2/scheduled-entities",
            Ok(json!({"models": {"scheduledEntities": {}}})),
        )]));
        let service = service(Arc::clone(&transport));
        let start = DateTime::parse_from_rfc3339("2026-02-16T00:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let window = TimeWindow {
            start,
            end: start + chrono::Duration::days(7),
        };

        let batch = service
            .fetch_scheduled_entities(window)
            .await
            .expect("fetch batch");
        assert!(batch.scheduled_entities.is_empty());
        assert_eq!(batch.window, Some(window));

        let request = &transport.requests()[0];
        assert_eq!(request.scope, ApiScope::Internal);
        let body = request.body.as_ref().expect("request body");
        assert_eq!(body["include"], json!(["task", "blockingTimeslot", "event"]));
        assert_eq!(body["filters"]["completed"], json!("include"));
        assert_eq!(body["filters"]["myCalendarsOnly"], json!(true));
        assert_eq!(
            body["filters"]["scheduled"]["from"],
            json!("2026-02-16T00:00:00.000Z")
        );

        let inverted = TimeWindow {
            start: window.end,
            end: window.start,
        };
        assert!(matches!(
            service.fetch_scheduled_entities(inverted).await,
            Err(InfraError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn long_tasks_are_flagged_with_strict_threshold_and_failures_collected() {
        let transport = Arc::new(RoutedTransport::new(vec![
            workspaces_route(),
            projects_route(),
            (
                Method::GET,
                "/tasks",
                Ok(json!({"tasks": [
                    {"id": "short", "duration": 60},
                    {"id": "exact", "duration": 90},
                    {"id": "long", "duration": 120},
                    {"id": "broken", "duration": 240},
                    {"id": "reminder", "duration": "REMINDER"}
                ], "meta": {}})),
            ),
            (Method::PATCH, "/v2/tasks/long", Ok(json!({"id": "long"}))),
            (Method::PATCH, "/v2/tasks/broken", Err(500)),
        ]));
        let service = service(Arc::clone(&transport));

        let outcome = service
            .flag_long_tasks_for_chunking("University", "Thesis", 90)
            .await
            .expect("flag tasks");

        assert_eq!(outcome.workspace_id, "w2");
        assert_eq!(outcome.project_id, "p1");
        assert_eq!(outcome.examined, 5);
        assert_eq!(outcome.updated, vec!["long".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].task_id, "broken");

        let patch = transport
            .requests()
            .into_iter()
            .find(|request| request.path == "/v2/tasks/long")
            .expect("patch request");
        assert_eq!(patch.scope, ApiScope::Internal);
        assert_eq!(
            patch.body,
            Some(json!({"workspaceId": "w2", "isChunkedTask": true, "minimumDuration": 45}))
        );
        let task_request = transport
            .requests()
            .into_iter()
            .find(|request| request.path == "/tasks")
            .expect("tasks request");
        assert_eq!(task_request.query_value("projectId"), Some("p1"));
    }

    #[tokio::test]
    async fn unknown_workspace_is_not_found() {
        let transport = Arc::new(RoutedTransport::new(vec![workspaces_route()]));
        let service = service(transport);

        let result = service
            .flag_long_tasks_for_chunking("Nowhere", "Thesis", 90)
            .await;
        assert!(matches!(result, Err(InfraError::NotFound(_))));
    }

    #[tokio::test]
    async fn blocking_tasks_are_sent_as_blocked_ids() {
        let transport = Arc::new(RoutedTransport::new(vec![(
            Method::PATCH,
            "/v2/tasks/t1",
            Ok(Value::Null),
        )]));
        let service = service(Arc::clone(&transport));

        service
            .set_blocking_tasks("t1", "w1", &["t2".to_string(), "t3".to_string()])
            .await
            .expect("set blocking");

        assert_eq!(
            transport.requests()[0].body,
            Some(json!({
                "workspaceId": "w1",
                "blockingTasks": [{"blockedId": "t2"}, {"blockedId": "t3"}]
            }))
        );
    }

    #[tokio::test]
    async fn update_task_patches_public_endpoint_with_fields_only() {
        let transport = Arc::new(RoutedTransport::new(vec![(
            Method::PATCH,
            "/tasks/t9",
            Ok(json!({"id": "t9", "name": "Renamed"})),
        )]));
        let service = service(Arc::clone(&transport));

        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("Renamed"));
        fields.insert("priority".to_string(), json!("HIGH"));
        let updated = service.update_task("t9", fields).await.expect("update task");

        assert_eq!(updated["name"], "Renamed");
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].scope, ApiScope::Public);
        assert_eq!(
            requests[0].body,
            Some(json!({"name": "Renamed", "priority": "HIGH"}))
        );
    }
}
