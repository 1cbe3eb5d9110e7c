use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// Persisted refresh token. Only the SHA-256 of the token is stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_info: String,
    pub ip_address: String,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// Values for a new refresh token row.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_info: String,
    pub ip_address: String,
    pub expires_at: DateTime<Utc>,
}

/// Plain refresh token handed to the client exactly once.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    /// Expiry of the refresh token.
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub access_token_expires_at: DateTime<Utc>,
    /// Present when the presented refresh token was rotated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub device: String,
    pub ip: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct RevokedSessionsResponse {
    pub revoked: u64,
}

#[derive(Serialize, Debug, Clone, Copy, JsonSchema)]
pub struct SweepResponse {
    pub deleted: u64,
}

impl From<&RefreshToken> for SessionResponse {
    fn from(token: &RefreshToken) -> Self {
        Self {
            id: token.id,
            device: token.device_info.clone(),
            ip: token.ip_address.clone(),
            issued_at: token.created_at,
            expires_at: token.expires_at,
        }
    }
}
