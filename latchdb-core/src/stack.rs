//! Logging of panics that escape a pooled operation.

use std::{any::Any, backtrace::Backtrace};
use tracing::error;

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Logs a panic payload together with the current call stack.
///
/// Called by the pool right before the panic resumes, so the session involved has
/// already been handed back.
pub fn report_panic(payload: &(dyn Any + Send)) {
    let backtrace = Backtrace::force_capture();

    error!(
        panic = panic_message(payload),
        backtrace = %backtrace,
        "pooled operation panicked"
    );
}
