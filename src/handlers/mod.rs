pub mod health;
pub mod logs_api;
pub mod metrics_handler;
pub mod otlp;
pub mod syslog_drain;
