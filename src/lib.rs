pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::aggregation::{AggregationEngine, ReportOptions, TimeReport};
pub use application::entity_resolver::{EntityResolver, ScheduledBatch};
pub use application::paginated_client::{ApiResult, PaginatedClient, RequestOptions};
pub use application::task_service::{ChunkingOutcome, TaskQuery, TaskService};
pub use application::token_store::{TokenConfig, TokenStore};
pub use application::weekly_report::{WeeklyReport, WeeklyReportService, week_window};
pub use domain::models::{Credential, ResolvedEntities, TimeWindow};
pub use domain::palette::ColorPalette;
pub use infrastructure::clock::{Clock, ManualClock, SystemClock};
pub use infrastructure::error::InfraError;
pub use infrastructure::http_gateway::{ApiRequest, GatewayConfig, GatewayResponse, HttpGateway};
pub use infrastructure::rate_limiter::RateLimiter;
