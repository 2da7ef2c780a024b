//! Command implementations for the CLI
//!
//! - start: Start the log server
//! - stop: Stop a running instance
//! - config: Configuration display and validation
//! - db: Database statistics and maintenance

pub mod config;
pub mod db;
pub mod start;
pub mod stop;
