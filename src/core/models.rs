// Domain entities: user accounts, refresh tokens, login audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::entity::Entity;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Standard,
    Premium,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "Standard",
            Role::Premium => "Premium",
            Role::Admin => "Admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Standard" => Some(Role::Standard),
            "Premium" => Some(Role::Premium),
            "Admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// A user account.
///
/// `username_lower` and `email_lower` are lowercase shadows maintained for
/// case-insensitive uniqueness; the token slot pairs are independent and
/// single-use, each checked against its expiry at consumption time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    pub name: String,
    pub username: String,
    pub username_lower: String,
    pub email: String,
    pub email_lower: String,
    pub phone: Option<String>,
    pub hashed_password: String,
    pub role: Role,
    pub utc_offset: i32,
    pub is_verified: bool,
    pub is_active: bool,
    pub is_two_factor_enabled: bool,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,

    pub password_reset_token: Option<String>,
    pub password_reset_token_expires_at: Option<DateTime<Utc>>,

    pub email_verification_token: Option<String>,
    pub email_verification_token_expires_at: Option<DateTime<Utc>>,

    pub otp_code: Option<String>,
    pub otp_code_expires_at: Option<DateTime<Utc>>,
}

impl User {
    /// Build a fresh account with normalized shadows and default flags.
    pub fn create(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        hashed_password: impl Into<String>,
        phone: Option<String>,
        role: Role,
        utc_offset: i32,
    ) -> Self {
        let username = username.into();
        let email = email.into();
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            username_lower: username.to_lowercase(),
            username,
            email_lower: email.to_lowercase(),
            email,
            phone,
            hashed_password: hashed_password.into(),
            role,
            utc_offset,
            is_verified: false,
            is_active: true,
            is_two_factor_enabled: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            refresh_token: None,
            refresh_token_expires_at: None,
            password_reset_token: None,
            password_reset_token_expires_at: None,
            email_verification_token: None,
            email_verification_token_expires_at: None,
            otp_code: None,
            otp_code_expires_at: None,
        }
    }
}

impl Entity for User {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// A session-continuation credential minted on successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub is_revoked: bool,
    pub created_by_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn create(
        user_id: Uuid,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
        created_by_ip: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            token: token.into(),
            expires_at,
            is_used: false,
            is_revoked: false,
            created_by_ip,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for RefreshToken {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Immutable audit record, written exactly once per login attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub login_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_successful: bool,
}

impl LoginHistory {
    pub fn create(
        user_id: Uuid,
        is_successful: bool,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            login_at: Utc::now(),
            ip_address,
            user_agent,
            is_successful,
        }
    }
}

impl Entity for LoginHistory {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Signed access token plus optional refresh-token pair, returned by login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires: Option<DateTime<Utc>>,
    pub is_two_factor_enabled: bool,
    pub token_type: Option<String>,
}
