use crate::config::AuthConfig;
use crate::database::refresh_token::{RefreshTokenRepository, generate_refresh_token, hash_refresh_token};
use crate::database::user::UserDirectory;
use crate::error::app_error::AppError;
use crate::models::session::{IssuedRefreshToken, LoginResponse, NewRefreshToken, RefreshResponse, SessionResponse};
use crate::models::user::User;
use crate::token::TokenCodec;
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

pub const TOKEN_TYPE: &str = "Bearer";

/// Client metadata recorded with each refresh token.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub device_info: String,
    pub ip_address: String,
}

impl DeviceContext {
    pub fn new(device_info: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            device_info: device_info.filter(|d| !d.trim().is_empty()).unwrap_or_else(|| "unknown".to_string()),
            ip_address: ip_address.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

pub struct SessionService<'a, R, U> {
    tokens: &'a R,
    users: &'a U,
    codec: &'a TokenCodec,
    config: &'a AuthConfig,
}

impl<'a, R, U> SessionService<'a, R, U>
where
    R: RefreshTokenRepository,
    U: UserDirectory,
{
    pub fn new(tokens: &'a R, users: &'a U, codec: &'a TokenCodec, config: &'a AuthConfig) -> Self {
        SessionService { tokens, users, codec, config }
    }

    pub async fn login(&self, email: &str, password: &str, device: &DeviceContext) -> Result<LoginResponse, AppError> {
        let user = self.users.verify_credentials(email, password).await?;
        ensure_active(&user)?;

        let access = self.codec.issue_access_token(&user)?;
        let refresh = self.issue_refresh_token(&user.id, device).await?;

        info!(user_id = %user.id, device = %device.device_info, ip = %device.ip_address, "user logged in");

        Ok(LoginResponse {
            access_token: access.token,
            token_type: TOKEN_TYPE,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.token,
            expires_at: refresh.expires_at,
        })
    }

    pub async fn refresh(&self, presented: &str) -> Result<RefreshResponse, AppError> {
        let token_hash = hash_refresh_token(presented);
        let stored = self.tokens.find_refresh_token(&token_hash).await?.ok_or(AppError::InvalidRefreshToken)?;

        if !stored.is_usable_at(Utc::now()) {
            warn!(user_id = %stored.user_id, session_id = %stored.id, revoked = stored.revoked, "refresh with dead token");
            return Err(AppError::InvalidRefreshToken);
        }

        let user = self.users.find_user_by_id(&stored.user_id).await?.ok_or(AppError::InvalidRefreshToken)?;
        ensure_active(&user)?;

        let rotated = if self.config.rotate_refresh_tokens {
            let device = DeviceContext {
                device_info: stored.device_info.clone(),
                ip_address: stored.ip_address.clone(),
            };
            let (token, replacement) = self.new_refresh_token(&user.id, &device);

            // None means another request already consumed the token
            let row = self
                .tokens
                .rotate_refresh_token(&token_hash, &replacement)
                .await?
                .ok_or(AppError::InvalidRefreshToken)?;

            Some(IssuedRefreshToken {
                token,
                expires_at: row.expires_at,
            })
        } else {
            None
        };

        let access = self.codec.issue_access_token(&user)?;

        info!(user_id = %user.id, session_id = %stored.id, rotated = rotated.is_some(), "access token refreshed");

        Ok(RefreshResponse {
            access_token: access.token,
            token_type: TOKEN_TYPE,
            access_token_expires_at: access.expires_at,
            expires_at: rotated.as_ref().map(|r| r.expires_at),
            refresh_token: rotated.map(|r| r.token),
        })
    }

    pub async fn logout(&self, presented: &str) -> Result<(), AppError> {
        if self.tokens.revoke_refresh_token(&hash_refresh_token(presented)).await? {
            info!("session logged out");
        }
        Ok(())
    }

    pub async fn logout_all(&self, user_id: &Uuid) -> Result<u64, AppError> {
        let revoked = self.tokens.revoke_all_refresh_tokens_for_user(user_id).await?;
        info!(user_id = %user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    pub async fn list_sessions(&self, user_id: &Uuid) -> Result<Vec<SessionResponse>, AppError> {
        let sessions = self.tokens.list_active_refresh_tokens(user_id).await?;
        Ok(sessions.iter().map(SessionResponse::from).collect())
    }

    pub async fn revoke_session(&self, user_id: &Uuid, session_id: &Uuid) -> Result<(), AppError> {
        if self.tokens.revoke_refresh_token_by_id(user_id, session_id).await? {
            info!(user_id = %user_id, session_id = %session_id, "session revoked");
            Ok(())
        } else {
            Err(AppError::NotFound("Session not found".to_string()))
        }
    }

    fn new_refresh_token(&self, user_id: &Uuid, device: &DeviceContext) -> (String, NewRefreshToken) {
        let (token, token_hash) = generate_refresh_token();
        let row = NewRefreshToken {
            user_id: *user_id,
            token_hash,
            device_info: device.device_info.clone(),
            ip_address: device.ip_address.clone(),
            expires_at: Utc::now() + Duration::days(self.config.refresh_token_ttl_days),
        };
        (token, row)
    }

    async fn issue_refresh_token(&self, user_id: &Uuid, device: &DeviceContext) -> Result<IssuedRefreshToken, AppError> {
        let (token, new_row) = self.new_refresh_token(user_id, device);
        let row = self.tokens.create_refresh_token(&new_row).await?;

        Ok(IssuedRefreshToken {
            token,
            expires_at: row.expires_at,
        })
    }
}

/// Deletes every refresh token that is expired or revoked.
pub async fn sweep_refresh_tokens<R: RefreshTokenRepository>(tokens: &R) -> Result<u64, AppError> {
    let deleted = tokens.delete_expired_or_revoked_refresh_tokens().await?;
    info!(deleted, "refresh token sweep finished");
    Ok(deleted)
}

fn ensure_active(user: &User) -> Result<(), AppError> {
    if user.is_active {
        Ok(())
    } else {
        Err(AppError::forbidden("Account disabled"))
    }
}
