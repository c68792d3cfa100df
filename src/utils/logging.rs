//! Conditional logging macros that check a module-level `ENABLE_LOGS` flag.
//!
//! The capture loop, the frame bridge and the gaze collector run once per
//! frame or per estimator tick, so each of them can be silenced on its own.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("captured {} frames", count);
//! ```

/// Info-level log gated on the caller's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level log gated on the caller's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level log gated on the caller's `ENABLE_LOGS` const.
///
/// Errors on the sink and estimator boundaries are always reported through
/// this macro rather than returned, so turning `ENABLE_LOGS` off in those
/// modules hides them completely. Leave it on in production builds.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
