//! Transactional command-execution core for a user-identity backend.
//!
//! Everything that mutates state flows through one skeleton: a unit of work
//! opens a transaction, the command's action runs against generic entity
//! stores, and the skeleton commits on success or rolls back on failure,
//! returning a uniform outcome envelope either way. On top of that sit the
//! auth flows: login with audit history and refresh tokens, registration
//! with combined uniqueness reporting, and single-use email-verification and
//! password-reset tokens, with signed access tokens minted at the edge.

pub mod auth;
pub mod config;
pub mod core;
pub mod events;
pub mod store;

pub use crate::auth::{AuthService, CommandExecutor, Hooks};
pub use crate::config::{AuthConfig, JwtConfig};
pub use crate::core::errors::{AuthError, Severity, StoreError};
pub use crate::core::models::{LoginHistory, RefreshToken, Role, TokenResponse, User};
pub use crate::core::outcome::{CommandReceipt, Outcome};
pub use crate::store::{Entity, EntityStore, MemoryDb, MemoryStore, SaveGuard, UnitOfWork};
