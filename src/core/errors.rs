// Domain error types - secure error handling with no information disclosure

use thiserror::Error;

/// Errors raised by the persistence layer (stores, unit of work, session).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Operation observed a fired cancellation token before issuing I/O
    #[error("Operation cancelled")]
    Cancelled,

    /// Commit or rollback requested with no transaction active
    #[error("No active transaction")]
    NoActiveTransaction,

    /// Unit of work was closed while a transaction was still open
    #[error("Transaction still active at disposal")]
    TransactionStillActive,

    /// `get_single` matched more than one record
    #[error("Filter matched more than one record")]
    MultipleMatches,

    /// Save rejected: no active transaction (SaveGuard::RequireTransaction)
    #[error("Save requires an active transaction")]
    SaveOutsideTransaction,

    /// Save rejected: transaction active (SaveGuard::LegacyRejectInTransaction)
    #[error("Save rejected while a transaction is active")]
    SaveInsideTransaction,

    /// Flush-time uniqueness constraint violation
    #[error("Unique constraint violated on {field}")]
    UniqueViolation { field: &'static str },

    /// Entity kind was never registered with the backing database
    #[error("No table registered for {type_name}")]
    TableNotRegistered { type_name: &'static str },

    /// Operation attempted on a closed session
    #[error("Persistence session already closed")]
    SessionClosed,
}

/// Main error type for the auth orchestration layer.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Access token could not be signed
    #[error("Token signing failed: {0}")]
    TokenSigning(String),

    /// Outbound event publish failed and was awaited inline
    #[error("Event publish failed: {0}")]
    Publish(String),

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Log severity buckets for the error-classification hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "Debug",
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        }
    }
}

impl AuthError {
    /// Classify this error for the logging hook.
    ///
    /// Cancellations and publish failures are transient (warning); guard
    /// violations are caller bugs (error); everything else in the store is
    /// infrastructure (fatal).
    pub fn severity(&self) -> Severity {
        match self {
            AuthError::Store(StoreError::Cancelled) => Severity::Warning,
            AuthError::Publish(_) => Severity::Warning,
            AuthError::Store(StoreError::NoActiveTransaction)
            | AuthError::Store(StoreError::SaveOutsideTransaction)
            | AuthError::Store(StoreError::SaveInsideTransaction)
            | AuthError::Store(StoreError::MultipleMatches)
            | AuthError::Store(StoreError::TransactionStillActive) => Severity::Error,
            AuthError::Store(_) => Severity::Fatal,
            AuthError::TokenSigning(_) | AuthError::Hashing(_) => Severity::Error,
        }
    }

    /// Caller-facing message; internal detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        "An unexpected error occurred while processing the command."
    }
}

/// Machine error codes surfaced in outcome envelopes.
pub mod codes {
    pub const EMAIL_ALREADY_EXISTS: &str = "email_already_exists";
    pub const USERNAME_ALREADY_EXISTS: &str = "username_already_exists";
    pub const PHONE_ALREADY_EXISTS: &str = "phone_already_exists";

    pub const USER_NOT_FOUND: &str = "user_not_found";

    pub const EMAIL_VERIFICATION_TOKEN_EXPIRED: &str = "email_verification_token_expired";
    pub const PHONE_VERIFICATION_TOKEN_EXPIRED: &str = "phone_verification_token_expired";
    pub const PASSWORD_RESET_TOKEN_EXPIRED: &str = "password_reset_token_expired";

    pub const EMAIL_ALREADY_VERIFIED: &str = "email_already_verified";

    pub const PASSWORD_MISMATCH: &str = "password_mismatch";
}

/// Human error messages paired with the codes above.
pub mod messages {
    pub const EMAIL_ALREADY_EXISTS: &str = "Email already exists";
    pub const USERNAME_ALREADY_EXISTS: &str = "Username already exists";
    pub const PHONE_ALREADY_EXISTS: &str = "Phone already exists";

    pub const USER_NOT_FOUND: &str = "User not found";

    pub const EMAIL_VERIFICATION_TOKEN_EXPIRED: &str = "Email verification token expired";
    pub const PASSWORD_RESET_TOKEN_EXPIRED: &str = "Password reset token expired";

    pub const EMAIL_ALREADY_VERIFIED: &str = "Email already verified";

    pub const PASSWORD_MISMATCH: &str = "Passwords do not match";

    pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::NoActiveTransaction;
        let auth_err: AuthError = store_err.into();
        match auth_err {
            AuthError::Store(StoreError::NoActiveTransaction) => (),
            other => panic!("Expected Store(NoActiveTransaction), got {other:?}"),
        }
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            AuthError::Store(StoreError::Cancelled).severity(),
            Severity::Warning
        );
        assert_eq!(
            AuthError::Publish("broker down".into()).severity(),
            Severity::Warning
        );
        assert_eq!(
            AuthError::Store(StoreError::NoActiveTransaction).severity(),
            Severity::Error
        );
        assert_eq!(
            AuthError::Store(StoreError::UniqueViolation { field: "email" }).severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn test_user_message_no_internal_detail() {
        let err = AuthError::TokenSigning("HMAC key /etc/secrets/jwt.key unreadable".into());
        let msg = err.user_message();
        assert!(!msg.contains("/etc/secrets"));
        assert_eq!(msg, "An unexpected error occurred while processing the command.");
    }
}
