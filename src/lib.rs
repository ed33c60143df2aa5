// Library module for dirsum
// Re-exports modules for use in integration tests and external crates

pub mod config;
pub mod hash;
pub mod logging;
