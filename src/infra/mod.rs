pub mod browserless;
pub mod http_client;
pub mod log_notifier;
