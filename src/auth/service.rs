// Auth orchestration: login, registration, email verification, password reset

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth::commands::{
    LoginCommand, PasswordResetCommand, RegisterCommand, RequestPasswordResetCommand,
    SendVerificationCommand, VerifyEmailCommand,
};
use crate::auth::executor::{CommandExecutor, ErrorHook, Hooks};
use crate::auth::tokens::{generate_opaque_token, PasswordHasher, TokenMinter};
use crate::config::AuthConfig;
use crate::core::errors::{codes, messages, AuthError, StoreError};
use crate::core::models::{LoginHistory, RefreshToken, Role, TokenResponse, User};
use crate::core::outcome::{CommandReceipt, Outcome};
use crate::events::logger::log_by_severity;
use crate::events::{EmailFactory, EmailKind, EventPublisher};
use crate::store::entity::EntityStore;
use crate::store::memory::{unique_constraint, MemoryDb, MemoryStore};
use crate::store::unit_of_work::UnitOfWork;

const LOG_SOURCE: &str = "gatehouse::auth";

/// Register the identity tables and their flush-time uniqueness rules.
///
/// Email, username, and phone are unique among active accounts only;
/// deactivated accounts release their identifiers.
pub fn register_identity_tables(db: &Arc<MemoryDb>) {
    db.register_with::<User>(vec![
        unique_constraint(
            "email",
            |u: &User| Some(u.email_lower.clone()),
            |u: &User| u.is_active,
        ),
        unique_constraint(
            "username",
            |u: &User| Some(u.username_lower.clone()),
            |u: &User| u.is_active,
        ),
        unique_constraint("phone", |u: &User| u.phone.clone(), |u: &User| u.is_active),
    ]);
    db.register_with::<RefreshToken>(vec![unique_constraint(
        "refresh_token",
        |t: &RefreshToken| Some(t.token.clone()),
        |_: &RefreshToken| true,
    )]);
    db.register::<LoginHistory>();
}

/// User store with the lookups the auth flows need.
pub struct UserStore {
    inner: MemoryStore<User>,
}

impl UserStore {
    pub async fn active_by_email(
        &self,
        email: &str,
        ct: &CancellationToken,
    ) -> Result<Option<User>, StoreError> {
        let email_lower = email.to_lowercase();
        self.inner
            .get_single(
                |u: &User| u.is_active && u.email_lower == email_lower,
                false,
                ct,
            )
            .await
    }

    pub async fn by_verification_token(
        &self,
        token: &str,
        ct: &CancellationToken,
    ) -> Result<Option<User>, StoreError> {
        self.inner
            .get_single(
                |u: &User| u.email_verification_token.as_deref() == Some(token),
                false,
                ct,
            )
            .await
    }

    pub async fn by_reset_token(
        &self,
        token: &str,
        ct: &CancellationToken,
    ) -> Result<Option<User>, StoreError> {
        self.inner
            .get_single(
                |u: &User| u.password_reset_token.as_deref() == Some(token),
                false,
                ct,
            )
            .await
    }
}

impl Deref for UserStore {
    type Target = MemoryStore<User>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Orchestrates the auth flows over one unit of work.
///
/// One instance per logical request. The login path manages its transaction
/// by hand; every other write flow goes through the command executor.
pub struct AuthService {
    uow: Arc<UnitOfWork>,
    executor: CommandExecutor,
    users: UserStore,
    refresh_tokens: MemoryStore<RefreshToken>,
    login_history: MemoryStore<LoginHistory>,
    minter: TokenMinter,
    hasher: Arc<dyn PasswordHasher>,
    factory: Arc<dyn EmailFactory>,
    publisher: Arc<dyn EventPublisher>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        db: &Arc<MemoryDb>,
        config: AuthConfig,
        hasher: Arc<dyn PasswordHasher>,
        factory: Arc<dyn EmailFactory>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let uow = Arc::new(UnitOfWork::new(db));
        let executor = CommandExecutor::new(Arc::clone(&uow));
        let users = UserStore { inner: uow.store() };
        let refresh_tokens = uow.store();
        let login_history = uow.store();
        let minter = TokenMinter::new(config.jwt.clone());
        Self {
            uow,
            executor,
            users,
            refresh_tokens,
            login_history,
            minter,
            hasher,
            factory,
            publisher,
            config,
        }
    }

    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.uow
    }

    /// Authenticate and mint a token pair.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    /// Every attempt against a known account writes exactly one history row,
    /// committed even when the password check fails. The signed access token
    /// is minted after commit so a signing failure cannot strand the
    /// transaction.
    pub async fn login(&self, command: &LoginCommand, ct: &CancellationToken) -> Outcome<TokenResponse> {
        let user = match self.users.active_by_email(&command.email, ct).await {
            Ok(Some(user)) => user,
            Ok(None) => return Outcome::fail(messages::INVALID_CREDENTIALS),
            Err(err) => {
                let err = AuthError::from(err);
                log_by_severity(LOG_SOURCE, "login lookup failed", &err);
                return Outcome::fail("Unexpected error occurred during login.");
            }
        };

        let password_ok = self.hasher.verify(&command.password, &user.hashed_password);

        match self.login_tx(&user, password_ok, command, ct).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let rollback_ct = CancellationToken::new();
                if let Err(rollback_err) = self.uow.safe_rollback(&rollback_ct).await {
                    log_by_severity(
                        LOG_SOURCE,
                        "rollback failed after login error",
                        &AuthError::from(rollback_err),
                    );
                }
                log_by_severity(LOG_SOURCE, "Unexpected error occurred during login", &err);
                Outcome::fail("Unexpected error occurred during login.")
            }
        }
    }

    async fn login_tx(
        &self,
        user: &User,
        password_ok: bool,
        command: &LoginCommand,
        ct: &CancellationToken,
    ) -> Result<Outcome<TokenResponse>, AuthError> {
        self.uow.begin_transaction(ct).await?;

        self.login_history
            .add(
                LoginHistory::create(
                    user.id,
                    password_ok,
                    command.ip_address.clone(),
                    command.user_agent.clone(),
                ),
                ct,
            )
            .await?;

        if !password_ok {
            self.uow.save_changes(ct).await?;
            self.uow.commit_transaction(ct).await?;
            return Ok(Outcome::fail(messages::INVALID_CREDENTIALS));
        }

        let now = Utc::now();
        let refresh = RefreshToken::create(
            user.id,
            generate_opaque_token(),
            now + Duration::days(self.config.jwt.refresh_ttl_days),
            command.ip_address.clone(),
        );
        self.refresh_tokens.add(refresh.clone(), ct).await?;

        // The user row itself is left untouched by login; only the audit
        // row and the refresh token are written.
        self.uow.save_changes(ct).await?;
        self.uow.commit_transaction(ct).await?;

        let response = self.minter.mint(
            user.id,
            &user.email,
            &user.username,
            user.role,
            user.is_two_factor_enabled,
            Some(refresh.token),
            Some(refresh.expires_at),
        )?;
        Ok(Outcome::ok(response))
    }

    /// Create an account. All uniqueness conflicts are reported together in
    /// one failed outcome, not first-conflict-wins.
    pub async fn register(
        &self,
        command: &RegisterCommand,
        ct: &CancellationToken,
    ) -> Outcome<CommandReceipt> {
        let hooks = Hooks {
            on_failure: None,
            on_success: None,
            on_error: Some(Self::map_unique_violation()),
        };
        self.executor
            .execute(command, || self.register_action(command, ct), hooks, ct)
            .await
    }

    /// Two concurrent registrations can both pass the advisory pre-checks;
    /// the flush-time constraint catches the loser and this hook maps it
    /// onto the same code the pre-check would have produced.
    fn map_unique_violation<C: Sync>() -> ErrorHook<'static, C, CommandReceipt> {
        Box::new(|_, err| {
            let mapped = match err {
                AuthError::Store(StoreError::UniqueViolation { field }) => match *field {
                    "email" => Some((codes::EMAIL_ALREADY_EXISTS, messages::EMAIL_ALREADY_EXISTS)),
                    "username" => Some((
                        codes::USERNAME_ALREADY_EXISTS,
                        messages::USERNAME_ALREADY_EXISTS,
                    )),
                    "phone" => Some((codes::PHONE_ALREADY_EXISTS, messages::PHONE_ALREADY_EXISTS)),
                    _ => None,
                },
                _ => None,
            }
            .map(|(code, message)| Outcome::fail_coded("Registration failed", code, message));
            Box::pin(async move { mapped })
        })
    }

    async fn register_action(
        &self,
        command: &RegisterCommand,
        ct: &CancellationToken,
    ) -> Result<Outcome<CommandReceipt>, AuthError> {
        if command.password != command.password_confirmation {
            return Ok(Outcome::fail_coded(
                "Registration failed",
                codes::PASSWORD_MISMATCH,
                messages::PASSWORD_MISMATCH,
            ));
        }
        let Some(role) = Role::parse(&command.role) else {
            return Ok(Outcome::fail(format!("Unknown role: {}", command.role)));
        };

        let email_lower = command.email.to_lowercase();
        let username_lower = command.username.to_lowercase();

        let mut failure: Outcome<CommandReceipt> = Outcome::fail("Registration failed");
        if self
            .users
            .any(|u: &User| u.is_active && u.email_lower == email_lower, ct)
            .await?
        {
            failure.add_error_coded(messages::EMAIL_ALREADY_EXISTS, codes::EMAIL_ALREADY_EXISTS);
        }
        if self
            .users
            .any(
                |u: &User| u.is_active && u.username_lower == username_lower,
                ct,
            )
            .await?
        {
            failure.add_error_coded(
                messages::USERNAME_ALREADY_EXISTS,
                codes::USERNAME_ALREADY_EXISTS,
            );
        }
        if let Some(phone) = &command.phone {
            if self
                .users
                .any(
                    |u: &User| u.is_active && u.phone.as_deref() == Some(phone.as_str()),
                    ct,
                )
                .await?
            {
                failure.add_error_coded(messages::PHONE_ALREADY_EXISTS, codes::PHONE_ALREADY_EXISTS);
            }
        }
        if failure.has_error() {
            return Ok(failure);
        }

        let hashed = self.hasher.hash(&command.password)?;
        let user = User::create(
            &command.name,
            &command.username,
            &command.email,
            hashed,
            command.phone.clone(),
            role,
            command.utc_offset,
        );
        let created_at = user.created_at;
        self.users.add(user, ct).await?;

        Ok(Outcome::ok(CommandReceipt::new(created_at, None, None)))
    }

    /// Issue a fresh email-verification token and publish the email inline.
    /// A publish failure rolls the token slot back with the transaction.
    pub async fn send_verification(
        &self,
        command: &SendVerificationCommand,
        ct: &CancellationToken,
    ) -> Outcome<CommandReceipt> {
        self.executor
            .execute(
                command,
                || async {
                    let Some(mut user) = self.users.find_by_id(command.user_id, ct).await? else {
                        return Ok(Outcome::fail_coded(
                            messages::USER_NOT_FOUND,
                            codes::USER_NOT_FOUND,
                            messages::USER_NOT_FOUND,
                        ));
                    };
                    if user.is_verified {
                        return Ok(Outcome::fail_coded(
                            messages::EMAIL_ALREADY_VERIFIED,
                            codes::EMAIL_ALREADY_VERIFIED,
                            messages::EMAIL_ALREADY_VERIFIED,
                        ));
                    }

                    let token = generate_opaque_token();
                    let now = Utc::now();
                    user.email_verification_token = Some(token.clone());
                    user.email_verification_token_expires_at =
                        Some(now + Duration::hours(self.config.verification_ttl_hours));
                    user.updated_at = now;

                    let to = user.email.clone();
                    let name = user.name.clone();
                    self.users.update(user, ct).await?;

                    let mut metadata = HashMap::new();
                    metadata.insert("name".to_string(), name);
                    metadata.insert("token".to_string(), token);
                    let event = self.factory.create(EmailKind::Verification, &to, metadata)?;
                    self.publisher.publish(event, ct).await?;

                    Ok(Outcome::ok(CommandReceipt::new(now, None, None)))
                },
                Hooks::none(),
                ct,
            )
            .await
    }

    /// Consume a verification token. Strict expiry: a token is dead the
    /// instant `now` passes its expiry. The slot is cleared on success, so a
    /// replayed token no longer resolves to an account.
    pub async fn verify_email(
        &self,
        command: &VerifyEmailCommand,
        ct: &CancellationToken,
    ) -> Outcome<CommandReceipt> {
        self.executor
            .execute(
                command,
                || async {
                    let Some(mut user) =
                        self.users.by_verification_token(&command.token, ct).await?
                    else {
                        return Ok(Outcome::fail_coded(
                            messages::USER_NOT_FOUND,
                            codes::USER_NOT_FOUND,
                            messages::USER_NOT_FOUND,
                        ));
                    };
                    if user.is_verified {
                        return Ok(Outcome::fail_coded(
                            messages::EMAIL_ALREADY_VERIFIED,
                            codes::EMAIL_ALREADY_VERIFIED,
                            messages::EMAIL_ALREADY_VERIFIED,
                        ));
                    }

                    let now = Utc::now();
                    if user
                        .email_verification_token_expires_at
                        .map_or(true, |expires| now > expires)
                    {
                        return Ok(Outcome::fail_coded(
                            messages::EMAIL_VERIFICATION_TOKEN_EXPIRED,
                            codes::EMAIL_VERIFICATION_TOKEN_EXPIRED,
                            messages::EMAIL_VERIFICATION_TOKEN_EXPIRED,
                        ));
                    }

                    user.is_verified = true;
                    user.email_verification_token = None;
                    user.email_verification_token_expires_at = None;
                    user.updated_at = now;
                    self.users.update(user, ct).await?;

                    Ok(Outcome::ok(CommandReceipt::new(now, None, None)))
                },
                Hooks::none(),
                ct,
            )
            .await
    }

    /// Start a password reset. Succeeds whether or not the email matches an
    /// account, so the endpoint cannot be used to probe for registrations.
    pub async fn request_password_reset(
        &self,
        command: &RequestPasswordResetCommand,
        ct: &CancellationToken,
    ) -> Outcome<CommandReceipt> {
        self.executor
            .execute(
                command,
                || async {
                    let now = Utc::now();
                    let Some(mut user) = self.users.active_by_email(&command.email, ct).await?
                    else {
                        return Ok(Outcome::ok(CommandReceipt::new(now, None, None)));
                    };

                    let token = generate_opaque_token();
                    user.password_reset_token = Some(token.clone());
                    user.password_reset_token_expires_at =
                        Some(now + Duration::hours(self.config.password_reset_ttl_hours));
                    user.updated_at = now;

                    let to = user.email.clone();
                    self.users.update(user, ct).await?;

                    let mut metadata = HashMap::new();
                    metadata.insert("token".to_string(), token);
                    let event = self
                        .factory
                        .create(EmailKind::PasswordReset, &to, metadata)?;
                    self.publisher.publish(event, ct).await?;

                    Ok(Outcome::ok(CommandReceipt::new(now, None, None)))
                },
                Hooks::none(),
                ct,
            )
            .await
    }

    /// Consume a reset token and install the new password.
    pub async fn reset_password(
        &self,
        command: &PasswordResetCommand,
        ct: &CancellationToken,
    ) -> Outcome<CommandReceipt> {
        self.executor
            .execute(
                command,
                || async {
                    if command.new_password != command.confirm_password {
                        return Ok(Outcome::fail_coded(
                            "Password reset failed",
                            codes::PASSWORD_MISMATCH,
                            messages::PASSWORD_MISMATCH,
                        ));
                    }

                    let Some(mut user) = self.users.by_reset_token(&command.token, ct).await?
                    else {
                        return Ok(Outcome::fail_coded(
                            messages::USER_NOT_FOUND,
                            codes::USER_NOT_FOUND,
                            messages::USER_NOT_FOUND,
                        ));
                    };

                    let now = Utc::now();
                    if user
                        .password_reset_token_expires_at
                        .map_or(true, |expires| now > expires)
                    {
                        return Ok(Outcome::fail_coded(
                            messages::PASSWORD_RESET_TOKEN_EXPIRED,
                            codes::PASSWORD_RESET_TOKEN_EXPIRED,
                            messages::PASSWORD_RESET_TOKEN_EXPIRED,
                        ));
                    }

                    user.hashed_password = self.hasher.hash(&command.new_password)?;
                    user.password_reset_token = None;
                    user.password_reset_token_expires_at = None;
                    user.updated_at = now;
                    self.users.update(user, ct).await?;

                    Ok(Outcome::ok(CommandReceipt::new(now, None, None)))
                },
                Hooks::none(),
                ct,
            )
            .await
    }
}
