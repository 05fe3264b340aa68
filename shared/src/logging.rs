//! Shared logging utilities for consistent tracing across the harness

use crate::types::MemberId;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Default filter for harness binaries at the given base level
pub fn default_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("harness={base_level},shared={base_level},sqlx=warn")
}

/// Initialize tracing subscriber with an optional log level
///
/// `RUST_LOG` takes precedence over the computed filter when it is set.
pub fn init_tracing_with_level(log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Initialize tracing subscriber at info level
pub fn init_tracing() {
    init_tracing_with_level(None);
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for member-aware info logging
#[macro_export]
macro_rules! member_info {
    ($member:expr, $($arg:tt)*) => {
        tracing::info!(
            member = %$member,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for member-aware warning logging
#[macro_export]
macro_rules! member_warn {
    ($member:expr, $($arg:tt)*) => {
        tracing::warn!(
            member = %$member,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for member-aware error logging
#[macro_export]
macro_rules! member_error {
    ($member:expr, $($arg:tt)*) => {
        tracing::error!(
            member = %$member,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for member-aware debug logging
#[macro_export]
macro_rules! member_debug {
    ($member:expr, $($arg:tt)*) => {
        tracing::debug!(
            member = %$member,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for scenario startup
pub fn log_startup(details: &str) {
    info!(timestamp = format_timestamp(), "🚀 Starting {}", details);
}

/// Contextual logging helper for teardown
pub fn log_shutdown(reason: &str) {
    info!(timestamp = format_timestamp(), "🛑 Shutting down: {}", reason);
}

/// Contextual logging helper for error conditions on a member
pub fn log_error(member: &MemberId, context: &str, error: &dyn std::fmt::Display) {
    error!(
        member = %member,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Emit a multi-line diagnostic bundle as a single error event
pub fn log_diagnostics(title: &str, body: &str) {
    error!(timestamp = format_timestamp(), "🔍 {}\n{}", title, body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(None), "harness=info,shared=info,sqlx=warn");
        assert_eq!(default_filter(Some("debug")), "harness=debug,shared=debug,sqlx=warn");
    }

    #[test]
    fn test_timestamp_format() {
        let stamp = format_timestamp();
        // HH:MM:SS.mmm
        assert_eq!(stamp.len(), 12);
        assert_eq!(&stamp[2..3], ":");
        assert_eq!(&stamp[8..9], ".");
    }
}
