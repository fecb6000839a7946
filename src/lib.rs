pub mod bot;
pub mod config;
pub mod constants;
pub mod db;
pub mod discord;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod rate_limiter;
pub mod search;
pub mod spider;
pub mod storage;
pub mod types;

// Ports and their adapters
pub mod app;
pub mod infra;
