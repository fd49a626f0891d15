//! `tracing` macros used across tablelake.
//!
//! Every event is emitted under the `tablelake` target with a `component`
//! (`catalog`, `write`, `maintenance`, `delta`, `memory`) and a snake_case
//! `event` name. Table-scoped events add `table`; engine-level events add the
//! table `location`. Catalog changes and merge fallbacks log at info, per-write
//! and per-engine commits at debug.

/// Target for all tablelake log events.
pub(crate) const LAKE_TARGET: &str = "tablelake";

/// Macro for info-level log events.
///
/// # Example
/// ```ignore
/// log_info!(
///     component = "catalog",
///     event = "table_created",
///     table = %name,
///     primary_key = %key,
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::LAKE_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::LAKE_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::LAKE_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::LAKE_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
