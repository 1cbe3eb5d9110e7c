use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{NewRefreshToken, RefreshToken};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Size of the random part of a refresh token, before hex encoding.
pub const REFRESH_TOKEN_BYTES: usize = 40;

/// Generate a refresh token.
/// Returns: (plain_token, token_hash)
pub fn generate_refresh_token() -> (String, String) {
    let mut token_bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    let token = hex::encode(token_bytes);
    let token_hash = hash_refresh_token(&token);

    (token, token_hash)
}

pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait::async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn create_refresh_token(&self, token: &NewRefreshToken) -> Result<RefreshToken, AppError>;
    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError>;
    /// Idempotent: unknown or already revoked tokens are left alone.
    /// Returns `true` only for the call that actually flipped the flag.
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, AppError>;
    /// Revokes `presented_hash` and stores `replacement` as one unit of work.
    /// Returns `None` when the presented token was already revoked; nothing is stored then.
    async fn rotate_refresh_token(&self, presented_hash: &str, replacement: &NewRefreshToken) -> Result<Option<RefreshToken>, AppError>;
    async fn revoke_refresh_token_by_id(&self, user_id: &Uuid, id: &Uuid) -> Result<bool, AppError>;
    async fn revoke_all_refresh_tokens_for_user(&self, user_id: &Uuid) -> Result<u64, AppError>;
    async fn list_active_refresh_tokens(&self, user_id: &Uuid) -> Result<Vec<RefreshToken>, AppError>;
    async fn delete_expired_or_revoked_refresh_tokens(&self) -> Result<u64, AppError>;
}

#[async_trait::async_trait]
impl RefreshTokenRepository for PostgresRepository {
    async fn create_refresh_token(&self, token: &NewRefreshToken) -> Result<RefreshToken, AppError> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, device_info, ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token_hash, device_info, ip_address, revoked, expires_at, created_at, updated_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.device_info)
        .bind(&token.ip_address)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::db("Failed to store refresh token", e))?;

        Ok(row)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, device_info, ip_address, revoked, expires_at, created_at, updated_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, updated_at = now()
            WHERE token_hash = $1
              AND revoked = FALSE
            "#,
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate_refresh_token(&self, presented_hash: &str, replacement: &NewRefreshToken) -> Result<Option<RefreshToken>, AppError> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, updated_at = now()
            WHERE token_hash = $1
              AND revoked = FALSE
            "#,
        )
        .bind(presented_hash)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, device_info, ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token_hash, device_info, ip_address, revoked, expires_at, created_at, updated_at
            "#,
        )
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(&replacement.device_info)
        .bind(&replacement.ip_address)
        .bind(replacement.expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::db("Failed to store refresh token", e))?;

        tx.commit().await?;

        Ok(Some(row))
    }

    async fn revoke_refresh_token_by_id(&self, user_id: &Uuid, id: &Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, updated_at = now()
            WHERE id = $1
              AND user_id = $2
              AND revoked = FALSE
              AND expires_at > now()
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_refresh_tokens_for_user(&self, user_id: &Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, updated_at = now()
            WHERE user_id = $1
              AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_active_refresh_tokens(&self, user_id: &Uuid) -> Result<Vec<RefreshToken>, AppError> {
        let rows = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, device_info, ip_address, revoked, expires_at, created_at, updated_at
            FROM refresh_tokens
            WHERE user_id = $1
              AND revoked = FALSE
              AND expires_at > now()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_expired_or_revoked_refresh_tokens(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE expires_at <= now()
               OR revoked = TRUE
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_token_is_80_hex_chars() {
        let (token, hash) = generate_refresh_token();
        assert_eq!(token.len(), REFRESH_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_refresh_token(&token));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn generated_tokens_differ() {
        let (a, _) = generate_refresh_token();
        let (b, _) = generate_refresh_token();
        assert_ne!(a, b);
    }

    mod postgres {
        use super::*;
        use crate::db::MIGRATOR;
        use chrono::{Duration, Utc};
        use sqlx::PgPool;
        use std::sync::LazyLock;
        use tokio::sync::{Mutex, MutexGuard};

        // The sweep is table-wide, so these tests must not interleave
        static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

        async fn serial() -> MutexGuard<'static, ()> {
            SERIAL.lock().await
        }

        async fn repository() -> PostgresRepository {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
            let pool = PgPool::connect(&url).await.expect("connect to test database");
            MIGRATOR.run(&pool).await.expect("run migrations");
            PostgresRepository { pool }
        }

        async fn create_user_id(repo: &PostgresRepository) -> Uuid {
            let email = format!("sessions-{}@example.com", Uuid::new_v4().simple());
            repo.create_user("Session Test", &email, "correct-horse-battery").await.expect("create user").id
        }

        fn new_token(user_id: Uuid, expires_in: Duration) -> (String, NewRefreshToken) {
            let (token, token_hash) = generate_refresh_token();
            let row = NewRefreshToken {
                user_id,
                token_hash,
                device_info: "Chrome/Mac".to_string(),
                ip_address: "203.0.113.7".to_string(),
                expires_at: Utc::now() + expires_in,
            };
            (token, row)
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn test_create_find_and_revoke() {
            let _guard = serial().await;
            let repo = repository().await;
            let user_id = create_user_id(&repo).await;
            let (_, new_row) = new_token(user_id, Duration::days(30));

            let created = repo.create_refresh_token(&new_row).await.unwrap();
            assert!(!created.revoked);

            let found = repo.find_refresh_token(&new_row.token_hash).await.unwrap().expect("stored row");
            assert_eq!(found.id, created.id);
            assert_eq!(found.device_info, "Chrome/Mac");

            assert!(repo.revoke_refresh_token(&new_row.token_hash).await.unwrap());
            assert!(!repo.revoke_refresh_token(&new_row.token_hash).await.unwrap());
            assert!(!repo.revoke_refresh_token("unknown-hash").await.unwrap());
            assert!(repo.find_refresh_token(&new_row.token_hash).await.unwrap().unwrap().revoked);
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn test_rotate_is_single_use() {
            let _guard = serial().await;
            let repo = repository().await;
            let user_id = create_user_id(&repo).await;
            let (_, presented) = new_token(user_id, Duration::days(30));
            repo.create_refresh_token(&presented).await.unwrap();

            let (_, first) = new_token(user_id, Duration::days(30));
            assert!(repo.rotate_refresh_token(&presented.token_hash, &first).await.unwrap().is_some());

            let (_, second) = new_token(user_id, Duration::days(30));
            assert!(repo.rotate_refresh_token(&presented.token_hash, &second).await.unwrap().is_none());
            assert!(repo.find_refresh_token(&second.token_hash).await.unwrap().is_none());
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn test_rotate_rolls_back_when_insert_fails() {
            let _guard = serial().await;
            let repo = repository().await;
            let user_id = create_user_id(&repo).await;
            let (_, presented) = new_token(user_id, Duration::days(30));
            repo.create_refresh_token(&presented).await.unwrap();

            // Reusing the presented hash violates the unique index
            let duplicate = NewRefreshToken {
                token_hash: presented.token_hash.clone(),
                ..new_token(user_id, Duration::days(30)).1
            };
            assert!(matches!(
                repo.rotate_refresh_token(&presented.token_hash, &duplicate).await,
                Err(AppError::Db { .. })
            ));
            assert!(!repo.find_refresh_token(&presented.token_hash).await.unwrap().unwrap().revoked);
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn test_list_and_revoke_only_live_sessions() {
            let _guard = serial().await;
            let repo = repository().await;
            let user_id = create_user_id(&repo).await;
            let other_user = create_user_id(&repo).await;

            let (_, older) = new_token(user_id, Duration::days(30));
            let (_, newer) = new_token(user_id, Duration::days(30));
            let (_, expired) = new_token(user_id, -Duration::seconds(1));
            let older = repo.create_refresh_token(&older).await.unwrap();
            let newer = repo.create_refresh_token(&newer).await.unwrap();
            let expired = repo.create_refresh_token(&expired).await.unwrap();

            let active = repo.list_active_refresh_tokens(&user_id).await.unwrap();
            assert_eq!(active.iter().map(|t| t.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

            assert!(!repo.revoke_refresh_token_by_id(&user_id, &expired.id).await.unwrap());
            assert!(!repo.revoke_refresh_token_by_id(&other_user, &older.id).await.unwrap());
            assert!(repo.revoke_refresh_token_by_id(&user_id, &older.id).await.unwrap());

            assert_eq!(repo.revoke_all_refresh_tokens_for_user(&user_id).await.unwrap(), 2);
            assert!(repo.list_active_refresh_tokens(&user_id).await.unwrap().is_empty());
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn test_sweep_deletes_expired_or_revoked() {
            let _guard = serial().await;
            let repo = repository().await;
            let user_id = create_user_id(&repo).await;

            let (_, live) = new_token(user_id, Duration::days(30));
            let (_, revoked) = new_token(user_id, Duration::days(30));
            let (_, expired) = new_token(user_id, -Duration::seconds(1));
            for row in [&live, &revoked, &expired] {
                repo.create_refresh_token(row).await.unwrap();
            }
            repo.revoke_refresh_token(&revoked.token_hash).await.unwrap();

            assert!(repo.delete_expired_or_revoked_refresh_tokens().await.unwrap() >= 2);
            assert_eq!(repo.delete_expired_or_revoked_refresh_tokens().await.unwrap(), 0);

            assert!(repo.find_refresh_token(&live.token_hash).await.unwrap().is_some());
            assert!(repo.find_refresh_token(&revoked.token_hash).await.unwrap().is_none());
            assert!(repo.find_refresh_token(&expired.token_hash).await.unwrap().is_none());
        }
    }

    proptest! {
        #[test]
        fn hash_is_stable_and_never_the_token(token in "[0-9a-f]{80}") {
            let hash = hash_refresh_token(&token);
            prop_assert_eq!(&hash, &hash_refresh_token(&token));
            prop_assert_ne!(hash, token);
        }
    }
}
