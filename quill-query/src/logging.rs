//! Logging setup for Quill.
//!
//! Quill emits `tracing` events for every statement it sends. Nothing is
//! printed unless a subscriber is installed, either by the application or
//! by [`init`] when the `tracing-subscriber` feature is enabled.
//!
//! # Environment Variables
//!
//! - `QUILL_DEBUG=true|1|yes` - Enable debug logging
//! - `QUILL_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific log level
//! - `QUILL_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! ```rust,no_run
//! use quill_query::logging;
//!
//! // Call once at startup.
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `QUILL_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("QUILL_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level.
///
/// `QUILL_LOG_LEVEL` wins when it names a valid level; otherwise "debug" if
/// `QUILL_DEBUG` is enabled, else "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("QUILL_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `QUILL_LOG_FORMAT`. Defaults to "json".
pub fn get_log_format() -> &'static str {
    env::var("QUILL_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the Quill logging system.
///
/// Subsequent calls are no-ops. Without the `tracing-subscriber` feature this
/// only records that initialization happened; the application is expected to
/// install its own subscriber.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("QUILL_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!("quill={},quill_query={}", level, level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match get_log_format() {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level = level, format = get_log_format(), "Quill logging initialized");
            }
        }
    });
}

/// Debug log that only fires when `QUILL_DEBUG` is enabled at runtime.
#[macro_export]
macro_rules! quill_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}
