// Application layer - Use cases over the domain
pub mod aggregator;
pub mod explorer_service;
pub mod metrics_loader;
pub mod query_runner;
