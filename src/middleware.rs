use crate::service::session::DeviceContext;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::{Data, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tracing::{info, warn};
use uuid::Uuid;

/// Longest User-Agent we keep as a device descriptor.
const MAX_DEVICE_INFO_LEN: usize = 255;

/// Request ID that is attached to every request for tracking
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Fairing that adds request ID to all requests and logs request/response information
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::new();

        request.local_cache(|| Some(request_id.clone()));

        info!(
            request_id = %request_id.0,
            method = %request.method(),
            uri = %request.uri(),
            "incoming request"
        );
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = request
            .local_cache(|| None::<RequestId>)
            .as_ref()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let status = response.status();

        response.set_header(Header::new("X-Request-Id", request_id.clone()));
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("X-Frame-Options", "DENY"));
        // Token responses must never be cached
        response.set_header(Header::new("Cache-Control", "no-store"));

        if status.class().is_server_error() || status.class().is_client_error() {
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                status = %status.code,
                "request completed with error"
            );
        } else {
            info!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                status = %status.code,
                "request completed"
            );
        }
    }
}

/// Device descriptor and origin IP of the caller, recorded with refresh tokens.
pub struct ClientDevice(pub DeviceContext);

pub(crate) fn truncate_device_info(raw: &str) -> String {
    raw.trim().chars().take(MAX_DEVICE_INFO_LEN).collect()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientDevice {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, ()> {
        let device_info = req.headers().get_one("User-Agent").map(truncate_device_info);
        let ip = req.client_ip().map(|ip| ip.to_string());
        Outcome::Success(ClientDevice(DeviceContext::new(device_info, ip)))
    }
}

impl<'a> OpenApiFromRequest<'a> for ClientDevice {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
