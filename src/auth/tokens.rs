// Token minting: signed access tokens and opaque refresh-token material

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::core::errors::AuthError;
use crate::core::models::{Role, TokenResponse};

/// Claims embedded in the signed access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Stateless boundary turning a verified identity into a signed credential.
///
/// Deterministic given its inputs apart from the issue time and signature;
/// key management lives outside this crate.
pub struct TokenMinter {
    config: JwtConfig,
}

impl TokenMinter {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    pub fn refresh_ttl_days(&self) -> i64 {
        self.config.refresh_ttl_days
    }

    pub fn mint(
        &self,
        user_id: Uuid,
        email: &str,
        username: &str,
        role: Role,
        is_two_factor_enabled: bool,
        refresh_token: Option<String>,
        refresh_token_expires: Option<DateTime<Utc>>,
    ) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let expires = now + Duration::minutes(self.config.access_ttl_minutes);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            name: username.to_string(),
            role: role.as_str().to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenSigning(e.to_string()))?;

        Ok(TokenResponse {
            token,
            expires,
            refresh_token,
            refresh_token_expires,
            is_two_factor_enabled,
            token_type: Some("Bearer".to_string()),
        })
    }
}

/// 64 random bytes, base64-encoded. Used for refresh, verification, and
/// reset tokens.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Pluggable password verify/hash boundary.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;
    fn verify(&self, plaintext: &str, hashed: &str) -> bool;
}

/// Salted SHA-256 hasher for development and tests. Production deployments
/// plug in a real KDF behind the same trait.
pub struct Sha256Hasher;

impl Sha256Hasher {
    fn digest(salt: &str, plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(plaintext.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PasswordHasher for Sha256Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex::encode(salt_bytes);
        Ok(format!("{salt}${}", Self::digest(&salt, plaintext)))
    }

    fn verify(&self, plaintext: &str, hashed: &str) -> bool {
        let Some((salt, digest)) = hashed.split_once('$') else {
            return false;
        };
        Self::digest(salt, plaintext) == digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn minter() -> TokenMinter {
        TokenMinter::new(AuthConfig::default().jwt)
    }

    #[test]
    fn test_minted_token_carries_identity_claims() {
        let config = AuthConfig::default().jwt;
        let user_id = Uuid::now_v7();
        let response = minter()
            .mint(
                user_id,
                "ada@example.com",
                "ada",
                Role::Premium,
                false,
                None,
                None,
            )
            .unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.clone()]);
        validation.set_issuer(&[config.issuer.clone()]);
        let data = decode::<Claims>(
            &response.token,
            &DecodingKey::from_secret(config.secret.as_bytes()),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims.sub, user_id.to_string());
        assert_eq!(data.claims.email, "ada@example.com");
        assert_eq!(data.claims.name, "ada");
        assert_eq!(data.claims.role, "Premium");
    }

    #[test]
    fn test_expiry_is_now_plus_configured_ttl() {
        let before = Utc::now();
        let response = minter()
            .mint(Uuid::now_v7(), "a@x.com", "a", Role::Standard, false, None, None)
            .unwrap();
        let ttl = response.expires - before;
        assert!(ttl >= Duration::minutes(14) && ttl <= Duration::minutes(16));
    }

    #[test]
    fn test_refresh_pair_passed_through() {
        let expires = Utc::now() + Duration::days(7);
        let response = minter()
            .mint(
                Uuid::now_v7(),
                "a@x.com",
                "a",
                Role::Standard,
                false,
                Some("opaque".to_string()),
                Some(expires),
            )
            .unwrap();
        assert_eq!(response.refresh_token.as_deref(), Some("opaque"));
        assert_eq!(response.refresh_token_expires, Some(expires));
    }

    #[test]
    fn test_two_factor_flag_passes_through() {
        for flag in [false, true] {
            let response = minter()
                .mint(Uuid::now_v7(), "a@x.com", "a", Role::Standard, flag, None, None)
                .unwrap();
            assert_eq!(response.is_two_factor_enabled, flag);
        }
    }

    #[test]
    fn test_opaque_tokens_unique_and_long() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_ne!(a, b);
        // 64 bytes -> 88 base64 chars
        assert_eq!(a.len(), 88);
    }

    #[test]
    fn test_hasher_round_trip_and_salting() {
        let hasher = Sha256Hasher;
        let h1 = hasher.hash("hunter2").unwrap();
        let h2 = hasher.hash("hunter2").unwrap();
        assert_ne!(h1, h2, "salts must differ");
        assert!(hasher.verify("hunter2", &h1));
        assert!(hasher.verify("hunter2", &h2));
        assert!(!hasher.verify("hunter3", &h1));
        assert!(!hasher.verify("hunter2", "garbage"));
    }
}
