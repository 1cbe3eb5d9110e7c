use crate::auth::{AdminUser, CurrentUser};
use crate::database::postgres_repository::PostgresRepository;
use crate::database::user::UserDirectory;
use crate::error::app_error::AppError;
use crate::models::user::{UserRequest, UserResponse};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Register a customer account
#[openapi(tag = "Users")]
#[post("/", data = "<payload>")]
pub async fn post_user(pool: &State<PgPool>, payload: Json<UserRequest>) -> Result<(Status, Json<UserResponse>), AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = repo.create_user(&payload.name, &payload.email, &payload.password).await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((Status::Created, Json(UserResponse::from(&user))))
}

/// Profile of the authenticated user
#[openapi(tag = "Users")]
#[get("/me")]
pub async fn get_me(pool: &State<PgPool>, current_user: CurrentUser) -> Result<Json<UserResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = repo
        .find_user_by_id(&current_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(&user)))
}

/// Look up any user (admin only)
#[openapi(tag = "Users")]
#[get("/<id>")]
pub async fn get_user(pool: &State<PgPool>, _admin: AdminUser, id: &str) -> Result<Json<UserResponse>, AppError> {
    let user_id = Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid user id", e))?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = repo
        .find_user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(&user)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![post_user, get_me, get_user]
}
