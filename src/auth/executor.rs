// Command executor: begin / act / commit-or-rollback / observe skeleton

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::core::errors::AuthError;
use crate::core::outcome::Outcome;
use crate::events::logger::log_by_severity;
use crate::store::unit_of_work::UnitOfWork;

/// Observer invoked after the failure or success path settles.
pub type OutcomeHook<'h, C, T> =
    Box<dyn for<'a> Fn(&'a C, &'a Outcome<T>) -> BoxFuture<'a, ()> + Send + Sync + 'h>;

/// Error-path hook. Returning `Some(outcome)` replaces the generic failure
/// the caller would otherwise receive; this is how flush-time constraint
/// violations are mapped back onto the same error codes as pre-checks.
pub type ErrorHook<'h, C, T> =
    Box<dyn for<'a> Fn(&'a C, &'a AuthError) -> BoxFuture<'a, Option<Outcome<T>>> + Send + Sync + 'h>;

/// Optional per-command observers. All default to absent.
pub struct Hooks<'h, C, T> {
    pub on_failure: Option<OutcomeHook<'h, C, T>>,
    pub on_success: Option<OutcomeHook<'h, C, T>>,
    pub on_error: Option<ErrorHook<'h, C, T>>,
}

impl<C, T> Hooks<'_, C, T> {
    pub fn none() -> Self {
        Self {
            on_failure: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl<C, T> Default for Hooks<'_, C, T> {
    fn default() -> Self {
        Self::none()
    }
}

/// Reusable orchestration skeleton shared by every write-path flow.
///
/// Exactly one of the success, failure, or error paths executes per
/// invocation; the transaction is never left open on any exit, and hooks
/// never run more than once.
pub struct CommandExecutor {
    uow: Arc<UnitOfWork>,
}

impl CommandExecutor {
    pub fn new(uow: Arc<UnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn execute<C, T, F, Fut>(
        &self,
        command: &C,
        action: F,
        hooks: Hooks<'_, C, T>,
        ct: &CancellationToken,
    ) -> Outcome<T>
    where
        C: Sync,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Outcome<T>, AuthError>>,
    {
        match self.run(action, ct).await {
            Ok(outcome) if outcome.is_success() => {
                if let Some(on_success) = &hooks.on_success {
                    on_success(command, &outcome).await;
                }
                outcome
            }
            Ok(outcome) => {
                if let Some(on_failure) = &hooks.on_failure {
                    on_failure(command, &outcome).await;
                }
                outcome
            }
            Err(err) => {
                // Roll back with a fresh token: a cancelled caller must not
                // leave the transaction open.
                let rollback_ct = CancellationToken::new();
                if let Err(rollback_err) = self.uow.safe_rollback(&rollback_ct).await {
                    log_by_severity(
                        "gatehouse::executor",
                        "rollback failed after command error",
                        &AuthError::from(rollback_err),
                    );
                }

                if let Some(on_error) = &hooks.on_error {
                    if let Some(mapped) = on_error(command, &err).await {
                        return mapped;
                    }
                }
                log_by_severity(
                    "gatehouse::executor",
                    &format!(
                        "Error executing command of type {}: {}",
                        std::any::type_name::<C>(),
                        err
                    ),
                    &err,
                );
                Outcome::fail(err.user_message())
            }
        }
    }

    async fn run<T, F, Fut>(&self, action: F, ct: &CancellationToken) -> Result<Outcome<T>, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Outcome<T>, AuthError>>,
    {
        self.uow.begin_transaction(ct).await?;

        let outcome = action().await?;

        if !outcome.is_success() {
            self.uow.safe_rollback(ct).await?;
            return Ok(outcome);
        }

        self.uow.save_changes(ct).await?;
        self.uow.commit_transaction(ct).await?;
        Ok(outcome)
    }
}
