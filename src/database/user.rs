use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::user::User;
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::sync::LazyLock;
use uuid::Uuid;

/// A real Argon2 hash generated once at startup, used as a timing decoy
/// so that login requests for non-existent users take the same time as
/// requests for existing users.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| password_hash("dummy-never-matches").ok());

/// Read-only view of user accounts used by the session core.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Returns the user when the password matches, `InvalidCredentials` otherwise.
    /// The same error is used for unknown emails.
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, AppError> {
        match self.find_user_by_email(email).await? {
            Some(user) => {
                verify_password(&user, password)?;
                Ok(user)
            }
            None => {
                dummy_verify(password);
                Err(AppError::InvalidCredentials)
            }
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for PostgresRepository {
    async fn find_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, role, is_active, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, role, is_active, created_at
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

impl PostgresRepository {
    /// Registers a customer account. Admins are promoted out of band.
    pub async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let hash = password_hash(password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT ((lower(email))) DO NOTHING
            RETURNING id, name, email, password_hash, role, is_active, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(&hash)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or_else(|| AppError::UserAlreadyExists(email.to_string()))
    }
}

pub fn verify_password(user: &User, password: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(&user.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::InvalidCredentials)
}

/// Perform a throwaway Argon2 verification to equalize response timing
/// regardless of whether the target account exists.
pub fn dummy_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref()
        && let Ok(parsed) = PasswordHash::new(hash)
    {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

pub(crate) fn password_hash(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;

    Ok(hash.to_string())
}
