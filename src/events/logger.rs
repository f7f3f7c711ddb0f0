// Severity-classified error logging through tracing

use serde::Serialize;

use crate::core::errors::{AuthError, Severity};

/// Structured log payload attached to error-path events.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub level: &'static str,
    pub message: String,
    pub error_detail: String,
    pub source: &'static str,
}

/// Install a JSON subscriber honoring `RUST_LOG`. For binaries and test
/// harnesses; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Classify the error and emit one tracing event at the matching level.
///
/// This is the default error-path hook for command execution: full detail
/// goes to the log, never to the caller.
pub fn log_by_severity(source: &'static str, context: &str, error: &AuthError) {
    let event = LogEvent {
        level: error.severity().as_str(),
        message: context.to_string(),
        error_detail: error.to_string(),
        source,
    };
    match error.severity() {
        Severity::Debug => {
            tracing::debug!(source = event.source, detail = %event.error_detail, "{}", event.message)
        }
        Severity::Info => {
            tracing::info!(source = event.source, detail = %event.error_detail, "{}", event.message)
        }
        Severity::Warning => {
            tracing::warn!(source = event.source, detail = %event.error_detail, "{}", event.message)
        }
        Severity::Error => {
            tracing::error!(source = event.source, detail = %event.error_detail, "{}", event.message)
        }
        Severity::Fatal => {
            tracing::error!(source = event.source, detail = %event.error_detail, fatal = true, "{}", event.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::StoreError;

    #[test]
    fn test_log_event_serializes() {
        let err = AuthError::Store(StoreError::Cancelled);
        let event = LogEvent {
            level: err.severity().as_str(),
            message: "ctx".to_string(),
            error_detail: err.to_string(),
            source: "test",
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Warning"));
        assert!(json.contains("cancelled"));
    }

    #[test]
    fn test_log_by_severity_does_not_panic() {
        for err in [
            AuthError::Store(StoreError::Cancelled),
            AuthError::Store(StoreError::UniqueViolation { field: "email" }),
            AuthError::TokenSigning("bad key".to_string()),
            AuthError::Publish("broker".to_string()),
        ] {
            log_by_severity("test", "context", &err);
        }
    }
}
