use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::SweepResponse;
use crate::service::session::sweep_refresh_tokens;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::openapi;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use sqlx::PgPool;

pub(crate) struct CronAuth;

pub(crate) fn check_cron_token(configured: &str, incoming: Option<&str>) -> Result<(), AppError> {
    if configured.is_empty() {
        return Err(AppError::BadRequest("Cron auth token is not configured".to_string()));
    }

    match incoming {
        Some(token) if token == configured => Ok(()),
        _ => Err(AppError::forbidden("Invalid cron token")),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            let err = AppError::MissingState("Config");
            return Outcome::Error((Status::from(&err), err));
        };

        match check_cron_token(&config.cron.auth_token, req.headers().get_one("x-cron-token")) {
            Ok(()) => Outcome::Success(CronAuth),
            Err(err) => Outcome::Error((Status::from(&err), err)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for CronAuth {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// Delete every expired or revoked refresh token
#[openapi(tag = "Cron")]
#[post("/sweep-sessions")]
pub async fn sweep_sessions(pool: &State<PgPool>, _cron_auth: CronAuth) -> Result<Json<SweepResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let deleted = sweep_refresh_tokens(&repo).await?;
    Ok(Json(SweepResponse { deleted }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![sweep_sessions]
}
