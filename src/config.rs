// Environment-driven configuration for token minting and auth flows

use std::env;

/// JWT signing settings.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

/// Settings for the auth orchestration layer.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub verification_ttl_hours: i64,
    pub password_reset_ttl_hours: i64,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            jwt: JwtConfig {
                secret: env::var("GATEHOUSE_JWT_SECRET")
                    .unwrap_or_else(|_| "dev-only-secret-change-me".to_string()),
                issuer: env::var("GATEHOUSE_JWT_ISSUER").unwrap_or_else(|_| "gatehouse".to_string()),
                audience: env::var("GATEHOUSE_JWT_AUDIENCE")
                    .unwrap_or_else(|_| "gatehouse-clients".to_string()),
                access_ttl_minutes: parse_env("GATEHOUSE_ACCESS_TTL_MINUTES", 15),
                refresh_ttl_days: parse_env("GATEHOUSE_REFRESH_TTL_DAYS", 7),
            },
            verification_ttl_hours: parse_env("GATEHOUSE_VERIFICATION_TTL_HOURS", 24),
            password_reset_ttl_hours: parse_env("GATEHOUSE_RESET_TTL_HOURS", 2),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt: JwtConfig {
                secret: "dev-only-secret-change-me".to_string(),
                issuer: "gatehouse".to_string(),
                audience: "gatehouse-clients".to_string(),
                access_ttl_minutes: 15,
                refresh_ttl_days: 7,
            },
            verification_ttl_hours: 24,
            password_reset_ttl_hours: 2,
        }
    }
}

fn parse_env(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
