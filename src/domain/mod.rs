// Domain layer - Pure models and algorithms, no I/O
pub mod entity;
pub mod filter;
pub mod filter_pipeline;
pub mod labels;
pub mod metrics;
pub mod normalizer;
pub mod response;
pub mod series;
