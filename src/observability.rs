//! Logging infrastructure for coordinator observability.
//!
//! The crate uses `tracing` for structured logging. All events use target
//! "quiver" and include an `event` field for filtering.
//!
//! ## Library Integration
//!
//! The trigger never initializes a global subscriber. Applications configure
//! tracing via `tracing_subscriber` or similar.
//!
//! ## Conventions
//!
//! - `event`: snake_case event name (required)
//! - `component`: subsystem (e.g., "trigger", "planner", "sizing")
//! - Use `%` for Display, `?` for Debug formatting
//! - Avoid high-cardinality fields without sampling

/// Target for all coordinator log events.
pub(crate) const COORD_TARGET: &str = "quiver";

/// Macro for info-level log events.
///
/// # Example
/// ```ignore
/// log_info!(
///     component = "trigger",
///     event = "signal_enqueued",
///     signal_id = signal.id,
///     collection_id = signal.collection_id,
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::COORD_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::COORD_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::COORD_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
#[allow(unused_macros)]
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::COORD_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
#[allow(unused_imports)]
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
