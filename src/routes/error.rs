use crate::auth::AuthRejection;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

fn error(message: &str) -> Json<Error> {
    Json(Error {
        message: message.to_string(),
    })
}

fn rejection_or(req: &Request, fallback: &str) -> Json<Error> {
    match req.local_cache(|| None::<AuthRejection>) {
        Some(AuthRejection(reason)) => error(reason),
        None => error(fallback),
    }
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Json<Error> {
    rejection_or(req, "Unauthorized")
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Json<Error> {
    rejection_or(req, "Forbidden")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    error("Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    error("Conflict")
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> Json<Error> {
    error("Malformed request body")
}
