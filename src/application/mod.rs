pub mod aggregation;
pub mod bootstrap;
pub mod commands;
pub mod entity_resolver;
pub mod paginated_client;
pub mod task_service;
pub mod token_store;
pub mod weekly_report;
