//! Logging for the conversion pipeline.
//!
//! Events go through `tracing` with target `"ssfiletable"` and always carry a
//! `component` and an `event` field. The library never installs a subscriber;
//! binaries and tests decide where the events end up.
//!
//! Conventions
//! -----------------
//! * `event`: snake_case name of what happened
//! * `component`: `converter`, `indexer`, `sidecar`, `server`, `opened_table`, ...
//! * `%` for Display, `?` for Debug

/// Target for all log events of this crate.
pub(crate) const LOG_TARGET: &str = "ssfiletable";

macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
