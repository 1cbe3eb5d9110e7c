use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::ClientDevice;
use crate::models::session::{LoginResponse, RefreshResponse, RefreshTokenRequest, RevokedSessionsResponse, SessionResponse};
use crate::models::user::LoginRequest;
use crate::service::session::{DeviceContext, SessionService};
use crate::token::TokenCodec;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Exchange credentials for an access token and a refresh token
#[openapi(tag = "Auth")]
#[post("/login", data = "<payload>")]
pub async fn login(
    pool: &State<PgPool>,
    config: &State<Config>,
    codec: &State<TokenCodec>,
    device: ClientDevice,
    payload: Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = SessionService::new(&repo, &repo, codec.inner(), &config.auth);

    let ClientDevice(detected) = device;
    let device = match &payload.device_info {
        Some(label) => DeviceContext::new(Some(label.clone()), Some(detected.ip_address)),
        None => detected,
    };

    Ok(Json(service.login(&payload.email, &payload.password, &device).await?))
}

/// Mint a new access token from a refresh token
#[openapi(tag = "Auth")]
#[post("/refresh-token", data = "<payload>")]
pub async fn refresh_token(
    pool: &State<PgPool>,
    config: &State<Config>,
    codec: &State<TokenCodec>,
    payload: Json<RefreshTokenRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = SessionService::new(&repo, &repo, codec.inner(), &config.auth);

    Ok(Json(service.refresh(&payload.refresh_token).await?))
}

/// Revoke the presented refresh token
#[openapi(tag = "Auth")]
#[post("/logout", data = "<payload>")]
pub async fn logout(pool: &State<PgPool>, config: &State<Config>, codec: &State<TokenCodec>, payload: Json<RefreshTokenRequest>) -> Result<Status, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = SessionService::new(&repo, &repo, codec.inner(), &config.auth);
    service.logout(&payload.refresh_token).await?;

    Ok(Status::NoContent)
}

/// List the caller's active sessions
#[openapi(tag = "Auth")]
#[get("/sessions")]
pub async fn list_sessions(
    pool: &State<PgPool>,
    config: &State<Config>,
    codec: &State<TokenCodec>,
    current_user: CurrentUser,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = SessionService::new(&repo, &repo, codec.inner(), &config.auth);

    Ok(Json(service.list_sessions(&current_user.id).await?))
}

/// Revoke one of the caller's sessions
#[openapi(tag = "Auth")]
#[delete("/sessions/<id>")]
pub async fn revoke_session(
    pool: &State<PgPool>,
    config: &State<Config>,
    codec: &State<TokenCodec>,
    current_user: CurrentUser,
    id: &str,
) -> Result<Status, AppError> {
    let session_id = Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid session id", e))?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = SessionService::new(&repo, &repo, codec.inner(), &config.auth);
    service.revoke_session(&current_user.id, &session_id).await?;

    Ok(Status::NoContent)
}

/// Revoke every session of the caller (logout on all devices)
#[openapi(tag = "Auth")]
#[delete("/sessions")]
pub async fn revoke_all_sessions(
    pool: &State<PgPool>,
    config: &State<Config>,
    codec: &State<TokenCodec>,
    current_user: CurrentUser,
) -> Result<Json<RevokedSessionsResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = SessionService::new(&repo, &repo, codec.inner(), &config.auth);
    let revoked = service.logout_all(&current_user.id).await?;

    Ok(Json(RevokedSessionsResponse { revoked }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![login, refresh_token, logout, list_sessions, revoke_session, revoke_all_sessions]
}
