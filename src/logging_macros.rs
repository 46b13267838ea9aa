#![warn(clippy::all, rust_2018_idioms)]

/// Logging macros that stamp every message with `[file:module:line]`.
///
/// They go through the `log` facade and reach the tracing subscriber via the
/// `tracing_log::LogTracer` bridge installed by the binary.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*))
    };
}

/*
Log level guidelines:

TRACE: per-item details inside loads (skipped descriptor types, individual inserts)
DEBUG: state transitions, skipped loads, cancellation, preload per-category results
INFO:  load start, refresh, preload fan-out start and summary, search start, CLI actions
WARN:  provider failures (with error category), panicked preload tasks
ERROR: failures that end a CLI command

Never log per-node lines while rendering a tree; rendering can walk thousands of nodes.
*/
