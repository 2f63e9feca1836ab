use crate::application::aggregation::ReportOptions;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::paginated_client::PaginatedClient;
use crate::application::task_service::{ChunkingOutcome, TaskService};
use crate::application::token_store::{TokenConfig, TokenStore};
use crate::application::weekly_report::{WeeklyReport, WeeklyReportService};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::config::{AppConfig, Secrets, TokenStorage, load_secrets_from_env};
use crate::infrastructure::credential_store::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use crate::infrastructure::http_gateway::{GatewayConfig, HttpGateway};
use crate::infrastructure::rate_limiter::RateLimiter;
use crate::infrastructure::token_client::ReqwestTokenIssuer;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything one invocation needs, wired from the workspace config and the
/// environment.
pub struct AppState {
    workspace_root: PathBuf,
    config: AppConfig,
    time_zone: Tz,
    tasks: Arc<TaskService>,
    reports: WeeklyReportService,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let secrets = load_secrets_from_env()?;
        Self::with_secrets(workspace_root, secrets, Arc::new(SystemClock))
    }

    pub fn with_secrets(
        workspace_root: PathBuf,
        secrets: Secrets,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = bootstrap.config;
        let time_zone = config.time_zone()?;

        let credential_store: Arc<dyn CredentialStore> = match config.token_storage {
            TokenStorage::File => Arc::new(FileCredentialStore::new(&bootstrap.token_path)),
            TokenStorage::Keyring => Arc::new(KeyringCredentialStore::default()),
        };
        let token_store = TokenStore::new(
            TokenConfig::new(secrets.token_url.clone(), secrets.token_key.clone()),
            credential_store,
            Arc::new(ReqwestTokenIssuer::new()),
        )
        .with_clock(Arc::clone(&clock));

        let rate_limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.period(),
            Arc::clone(&clock),
        )
        .with_poll_interval(config.rate_limit.poll_interval());

        let gateway = HttpGateway::new(
            GatewayConfig::new(secrets.api_key.clone())
                .with_base_urls(&config.public_base_url, &config.internal_base_url)
                .with_default_retry_after(config.default_retry_after()),
            Arc::new(rate_limiter),
            Arc::new(token_store),
        );
        let client = PaginatedClient::new(Arc::new(gateway))
            .with_clock(Arc::clone(&clock))
            .with_default_max_retries(config.retry.max_retries);
        let tasks = Arc::new(TaskService::new(Arc::new(client)));

        let mut reports = WeeklyReportService::new(Arc::clone(&tasks), time_zone);
        match secrets.google_access_token.as_deref() {
            Some(access_token) => {
                let calendar = ReqwestGoogleCalendarClient::new(access_token)
                    .with_base_url(&config.calendar.base_url)
                    .with_calendar_id(&config.calendar.calendar_id);
                reports = reports.with_calendar(Arc::new(calendar));
            }
            None => debug!("no calendar access token configured, using scheduled batch events"),
        }

        info!(root = %workspace_root.display(), timezone = %time_zone.name(), "workspace ready");
        Ok(Self {
            workspace_root,
            config,
            time_zone,
            tasks,
            reports,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Today's date in the configured zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.time_zone).date_naive()
    }
}

pub async fn weekly_report_impl(
    state: &AppState,
    date: Option<String>,
    include_transparent: bool,
) -> Result<WeeklyReport, InfraError> {
    let reference_date = match date.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|error| {
            InfraError::InvalidRequest(format!("invalid date '{value}': {error}"))
        })?,
        None => state.today(),
    };
    let options = ReportOptions {
        include_transparent: include_transparent || state.config.calendar.include_transparent,
    };
    state.reports.build(reference_date, options).await
}

pub async fn flag_chunking_impl(
    state: &AppState,
    workspace_name: &str,
    project_name: &str,
    duration_limit: i64,
) -> Result<ChunkingOutcome, InfraError> {
    if duration_limit < 0 {
        return Err(InfraError::InvalidRequest(
            "duration limit must not be negative".to_string(),
        ));
    }
    state
        .tasks
        .flag_long_tasks_for_chunking(workspace_name, project_name, duration_limit)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use chrono::DateTime;

    fn secrets() -> Secrets {
        Secrets {
            api_key: "api-key".to_string(),
            token_url: "http://127.0.0.1:9/".to_string(),
            token_key: None,
            google_access_token: None,
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2026-02-16T00:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
        ))
    }

    #[test]
    fn app_state_bootstraps_workspace() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state = AppState::with_secrets(dir.path().to_path_buf(), secrets(), clock())
            .expect("app state");

        assert_eq!(state.workspace_root(), dir.path());
        assert_eq!(state.config().rate_limit.max_requests, 12);
        assert!(dir.path().join("config").join("app.json").exists());
    }

    #[tokio::test]
    async fn invalid_report_date_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state = AppState::with_secrets(dir.path().to_path_buf(), secrets(), clock())
            .expect("app state");

        let result = weekly_report_impl(&state, Some("16/02/2026".to_string()), false).await;
        assert!(matches!(result, Err(InfraError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn negative_duration_limit_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let state = AppState::with_secrets(dir.path().to_path_buf(), secrets(), clock())
            .expect("app state");

        let result = flag_chunking_impl(&state, "Personal", "Thesis", -1).await;
        assert!(matches!(result, Err(InfraError::InvalidRequest(_))));
    }
}
