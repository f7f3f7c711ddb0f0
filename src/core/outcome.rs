// Uniform outcome envelope returned by every orchestrated write operation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result envelope for command execution.
///
/// Carries a success flag, an optional human message, parallel lists of
/// machine error codes and human error messages, and an optional payload.
/// A failed outcome never carries a payload; `has_error()` holds iff either
/// error list is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome<T = ()> {
    success: bool,
    message: Option<String>,
    error_codes: Vec<String>,
    errors: Vec<String>,
    value: Option<T>,
}

impl<T> Outcome<T> {
    /// Successful outcome carrying a payload.
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            message: None,
            error_codes: Vec::new(),
            errors: Vec::new(),
            value: Some(value),
        }
    }

    /// Successful outcome with payload and human message.
    pub fn ok_with(value: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(value)
        }
    }

    /// Failed outcome with a human message only.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error_codes: Vec::new(),
            errors: Vec::new(),
            value: None,
        }
    }

    /// Failed outcome with a single (code, error) pair.
    pub fn fail_coded(
        message: impl Into<String>,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::fail(message);
        outcome.add_error_coded(error, code);
        outcome
    }

    /// Failed outcome with parallel code/error lists.
    ///
    /// Both lists are kept in full; codes are never dropped relative to
    /// their messages.
    pub fn fail_with(message: impl Into<String>, error_codes: Vec<String>, errors: Vec<String>) -> Self {
        let mut outcome = Self::fail(message);
        outcome.error_codes = error_codes;
        outcome.errors = errors;
        outcome
    }

    /// Append a human error message without a code.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Append a (message, code) pair together.
    pub fn add_error_coded(&mut self, error: impl Into<String>, code: impl Into<String>) {
        self.errors.push(error.into());
        self.error_codes.push(code.into());
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn has_error(&self) -> bool {
        !self.error_codes.is_empty() || !self.errors.is_empty()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error_codes(&self) -> &[String] {
        &self.error_codes
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

/// Payload for write flows that produce no domain value.
///
/// Mirrors the command-response shape used by the transport layer: a fresh
/// response id, the caller's correlation id, and processing timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReceipt {
    pub response_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub response_date: DateTime<Utc>,
    pub created_date: DateTime<Utc>,
    pub location: Option<String>,
}

impl CommandReceipt {
    pub fn new(created_date: DateTime<Utc>, location: Option<String>, correlation_id: Option<Uuid>) -> Self {
        Self {
            response_id: Uuid::new_v4(),
            correlation_id,
            response_date: Utc::now(),
            created_date,
            location,
        }
    }
}
