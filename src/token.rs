//! Signed, short-lived access tokens.
//!
//! Access tokens are HS256 JWTs carrying a snapshot of the user's identity. They are
//! never stored: validity is decided by signature and expiry alone.

use crate::config::AuthConfig;
use crate::error::app_error::AppError;
use crate::models::user::{User, UserRole};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const INVALID_TOKEN: &str = "Invalid or expired token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::unauthenticated(INVALID_TOKEN))
    }
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig, profile: &str) -> Result<Self, String> {
        let secret = config.signing_secret(profile)?;
        Ok(Self::new(&secret, Duration::seconds(config.access_token_ttl_seconds)))
    }

    pub fn issue_access_token(&self, user: &User) -> Result<IssuedAccessToken, AppError> {
        self.issue_access_token_at(user, Utc::now())
    }

    pub fn issue_access_token_at(&self, user: &User, issued_at: DateTime<Utc>) -> Result<IssuedAccessToken, AppError> {
        let expires_at = issued_at + self.ttl;
        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| AppError::token("Failed to sign access token", e))?;

        Ok(IssuedAccessToken { token, expires_at })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "access token rejected");
                AppError::unauthenticated(INVALID_TOKEN)
            })
    }
}
