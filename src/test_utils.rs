use crate::database::refresh_token::RefreshTokenRepository;
use crate::database::user::{UserDirectory, password_hash};
use crate::error::app_error::AppError;
use crate::models::session::{NewRefreshToken, RefreshToken};
use crate::models::user::{User, UserRole};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

pub fn sample_user(role: UserRole) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        name: "Sample User".to_string(),
        email: format!("user-{}@example.com", id.simple()),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$placeholder".to_string(),
        role,
        is_active: true,
        created_at: Utc::now(),
    }
}

pub fn sample_user_with_password(role: UserRole, password: &str) -> User {
    User {
        password_hash: password_hash(password).expect("hash test password"),
        ..sample_user(role)
    }
}

/// In-memory stand-in for Postgres, keyed by token hash.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
    unavailable: Arc<AtomicBool>,
    failing_inserts: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn set_user_active(&self, id: &Uuid, is_active: bool) {
        if let Some(user) = self.users.write().await.get_mut(id) {
            user.is_active = is_active;
        }
    }

    /// Moves the token's expiry into the past without touching the revoked flag.
    pub async fn expire_token(&self, token_hash: &str) {
        if let Some(token) = self.tokens.write().await.get_mut(token_hash) {
            token.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn tokens_snapshot(&self) -> Vec<RefreshToken> {
        self.tokens.read().await.values().cloned().collect()
    }

    /// Makes every repository call fail like an unreachable database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes only refresh token inserts fail; reads and revocations keep working.
    pub fn set_failing_inserts(&self, failing: bool) {
        self.failing_inserts.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::db("Database unavailable", sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_insert(&self, tokens: &HashMap<String, RefreshToken>, token: &NewRefreshToken) -> Result<(), AppError> {
        if self.failing_inserts.load(Ordering::SeqCst) {
            return Err(AppError::db("Failed to store refresh token", sqlx::Error::PoolTimedOut));
        }
        if tokens.contains_key(&token.token_hash) {
            return Err(AppError::db("Failed to store refresh token", sqlx::Error::Protocol("duplicate token_hash".to_string())));
        }
        Ok(())
    }
}

fn stored_row(token: &NewRefreshToken) -> RefreshToken {
    let now = Utc::now();
    RefreshToken {
        id: Uuid::new_v4(),
        user_id: token.user_id,
        token_hash: token.token_hash.clone(),
        device_info: token.device_info.clone(),
        ip_address: token.ip_address.clone(),
        revoked: false,
        expires_at: token.expires_at,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryRepository {
    async fn find_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        self.check_available()?;
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.check_available()?;
        Ok(self.users.read().await.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepository for MemoryRepository {
    async fn create_refresh_token(&self, token: &NewRefreshToken) -> Result<RefreshToken, AppError> {
        self.check_available()?;
        let mut tokens = self.tokens.write().await;
        self.check_insert(&tokens, token)?;

        let row = stored_row(token);
        tokens.insert(row.token_hash.clone(), row.clone());
        Ok(row)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError> {
        self.check_available()?;
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, AppError> {
        self.check_available()?;
        match self.tokens.write().await.get_mut(token_hash) {
            Some(token) if !token.revoked => {
                token.revoked = true;
                token.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate_refresh_token(&self, presented_hash: &str, replacement: &NewRefreshToken) -> Result<Option<RefreshToken>, AppError> {
        self.check_available()?;
        let mut tokens = self.tokens.write().await;
        if !tokens.get(presented_hash).is_some_and(|t| !t.revoked) {
            return Ok(None);
        }
        self.check_insert(&tokens, replacement)?;

        let now = Utc::now();
        if let Some(presented) = tokens.get_mut(presented_hash) {
            presented.revoked = true;
            presented.updated_at = now;
        }
        let row = stored_row(replacement);
        tokens.insert(row.token_hash.clone(), row.clone());
        Ok(Some(row))
    }

    async fn revoke_refresh_token_by_id(&self, user_id: &Uuid, id: &Uuid) -> Result<bool, AppError> {
        self.check_available()?;
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        match tokens.values_mut().find(|t| t.id == *id && t.user_id == *user_id && t.is_usable_at(now)) {
            Some(token) => {
                token.revoked = true;
                token.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens_for_user(&self, user_id: &Uuid) -> Result<u64, AppError> {
        self.check_available()?;
        let now = Utc::now();
        let mut revoked = 0;
        for token in self.tokens.write().await.values_mut() {
            if token.user_id == *user_id && !token.revoked {
                token.revoked = true;
                token.updated_at = now;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn list_active_refresh_tokens(&self, user_id: &Uuid) -> Result<Vec<RefreshToken>, AppError> {
        self.check_available()?;
        let now = Utc::now();
        let mut active: Vec<RefreshToken> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.user_id == *user_id && t.is_usable_at(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn delete_expired_or_revoked_refresh_tokens(&self) -> Result<u64, AppError> {
        self.check_available()?;
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.is_usable_at(now));
        Ok((before - tokens.len()) as u64)
    }
}
