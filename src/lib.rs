pub mod config;
pub mod engine;
pub mod metrics;
pub mod replay;
pub mod tournament;
pub mod worker_pool;
