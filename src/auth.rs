use crate::database::postgres_repository::PostgresRepository;
use crate::database::user::UserDirectory;
use crate::error::app_error::AppError;
use crate::models::user::{User, UserRole};
use crate::token::TokenCodec;
use rocket::http::Status;
use rocket::outcome::{Outcome, try_outcome};
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

const MALFORMED_HEADER: &str = "Missing or malformed Authorization header";

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Reason a guard rejected the request, kept for the 401/403 catchers.
#[derive(Debug, Clone)]
pub struct AuthRejection(pub String);

fn reject<T>(req: &Request<'_>, err: AppError) -> RequestOutcome<T, AppError> {
    let reason = err.to_string();
    tracing::warn!(method = %req.method(), uri = %req.uri(), reason = %reason, "authentication rejected");
    req.local_cache(|| Some(AuthRejection(reason)));
    Outcome::Error((Status::from(&err), err))
}

/// A `CurrentUser` whose role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

pub(crate) fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }

    Some(token)
}

/// Resolves an `Authorization` header value to an active user.
pub async fn authenticate<U: UserDirectory>(codec: &TokenCodec, users: &U, header: Option<&str>) -> Result<User, AppError> {
    let token = header.and_then(parse_bearer_token).ok_or_else(|| AppError::unauthenticated(MALFORMED_HEADER))?;
    let claims = codec.verify_access_token(token)?;
    let user_id = claims.user_id()?;

    let user = users
        .find_user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::unauthenticated("User not found"))?;

    if !user.is_active {
        return Err(AppError::forbidden("Account disabled"));
    }

    Ok(user)
}

pub fn require_admin(user: &CurrentUser) -> Result<(), AppError> {
    match user.role {
        UserRole::Admin => Ok(()),
        UserRole::Customer => Err(AppError::forbidden("Admin access required")),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let (Some(codec), Some(pool)) = (req.rocket().state::<TokenCodec>(), req.rocket().state::<PgPool>()) else {
            let err = AppError::MissingState("TokenCodec and PgPool");
            tracing::error!(error = ?err, "authentication guard has no managed state");
            return Outcome::Error((Status::from(&err), err));
        };

        let repo = PostgresRepository { pool: pool.clone() };
        let header = req.headers().get_one("Authorization");

        match authenticate(codec, &repo, header).await {
            Ok(user) => {
                let current_user = CurrentUser::from(&user);
                req.local_cache(|| Some(current_user.clone()));
                Outcome::Success(current_user)
            }
            Err(err) => reject(req, err),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let current_user = try_outcome!(req.guard::<CurrentUser>().await);

        match require_admin(&current_user) {
            Ok(()) => Outcome::Success(AdminUser(current_user)),
            Err(err) => reject(req, err),
        }
    }
}

fn bearer_security_input() -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some("Bearer access token. Obtain one via POST /api/auth/login or POST /api/auth/refresh-token.".to_string()),
        data: SecuritySchemeData::Http {
            scheme: "bearer".to_string(),
            bearer_format: Some("JWT".to_string()),
        },
        extensions: Object::default(),
    };

    let mut security_req = SecurityRequirement::new();
    security_req.insert("bearerAuth".to_string(), Vec::new());

    RequestHeaderInput::Security("bearerAuth".to_string(), security_scheme, security_req)
}

fn auth_responses() -> Responses {
    use rocket_okapi::okapi::openapi3::{RefOr, Response};
    let mut responses = Responses::default();
    responses.responses.insert(
        "401".to_string(),
        RefOr::Object(Response {
            description: "Unauthorized - Authentication required".to_string(),
            ..Default::default()
        }),
    );
    responses.responses.insert(
        "403".to_string(),
        RefOr::Object(Response {
            description: "Forbidden - Account disabled or insufficient role".to_string(),
            ..Default::default()
        }),
    );
    responses
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security_input())
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(auth_responses())
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security_input())
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(auth_responses())
    }
}
