// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod http_query_runner;
pub mod time_range;
