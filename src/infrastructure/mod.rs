pub mod clock;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod google_calendar_client;
pub mod http_gateway;
pub mod payload_mapper;
pub mod rate_limiter;
pub mod token_client;
