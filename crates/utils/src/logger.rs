//! Logger setup for optimization processes

use std::env;

use log::LevelFilter;

/// Default level when RUST_LOG is unset. Worker and assigner logs are chatty
/// at debug; info keeps continuation chains readable.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Initialize env_logger for a worker, coordinator, or harness process.
///
/// RUST_LOG overrides the default level. Driver crates are pinned to warn so
/// placement and chaining logs stay legible under RUST_LOG=debug.
pub fn init_logger() {
    let level = env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(DEFAULT_LEVEL);

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .filter_module("sqlx", LevelFilter::Warn)
        .filter_module("redis", LevelFilter::Warn)
        .format_timestamp_millis()
        .format_target(false)
        .init();
}
