// Auth layer: commands in, outcomes out

pub mod commands;
pub mod executor;
pub mod service;
pub mod tokens;

pub use commands::{
    LoginCommand, PasswordResetCommand, RegisterCommand, RequestPasswordResetCommand,
    SendVerificationCommand, VerifyEmailCommand,
};
pub use executor::{CommandExecutor, Hooks};
pub use service::{register_identity_tables, AuthService, UserStore};
pub use tokens::{generate_opaque_token, PasswordHasher, Sha256Hasher, TokenMinter};
