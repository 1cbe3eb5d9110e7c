mod auth;
mod config;
mod cron_tasks;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;
mod token;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use cron_tasks::{SweepResult, sweep_sessions};

use crate::cron_tasks::stage_session_sweeper;
use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use crate::token::TokenCodec;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use tracing_subscriber::EnvFilter;

pub fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g.
    //   RUST_LOG=storefront::service=debug,info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // A subscriber may already be installed when several rockets are built in one process
    let _ = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
}

fn rocket_profile() -> String {
    let default = if cfg!(debug_assertions) { "debug" } else { "release" };
    std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| default.to_string())
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Delete, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Authorization", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let mut push_unique = |path: String| {
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    };

    push_unique(normalize_base_path(&api_config.base_path));
    for extra in &api_config.additional_base_paths {
        push_unique(normalize_base_path(extra));
    }

    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (session_routes, session_openapi) = app_routes::session::routes();
    let (user_routes, user_openapi) = app_routes::user::routes();
    let (health_routes, health_openapi) = app_routes::health::routes();
    let (cron_routes, cron_openapi) = app_routes::cron::routes();

    vec![
        RouteSpec {
            path: "/auth",
            routes: session_routes,
            openapi: session_openapi,
        },
        RouteSpec {
            path: "/users",
            routes: user_routes,
            openapi: user_openapi,
        },
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
        RouteSpec {
            path: "/cron",
            routes: cron_routes,
            openapi: cron_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if !enable_swagger {
        for spec in route_specs {
            rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        }
        return rocket;
    }

    let mut openapi_list = Vec::new();
    for spec in route_specs {
        rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        openapi_list.push((spec.path, spec.openapi));
    }

    let openapi_docs = match marge_spec_list(&openapi_list) {
        Ok(docs) => docs,
        Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
    };

    let settings = rocket_okapi::settings::OpenApiSettings::default();
    rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

    let openapi_url = join_base_path(base_path, "openapi.json");
    rocket.mount(
        join_base_path(base_path, "docs"),
        make_swagger_ui(&SwaggerUIConfig {
            url: openapi_url,
            ..Default::default()
        }),
    )
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);

    let profile = rocket_profile();
    let codec = TokenCodec::from_config(&config.auth, &profile).unwrap_or_else(|err| panic!("{}", err));

    let cors = build_cors(&config.cors).to_cors().expect("Failed to create CORS fairing");
    let base_paths = collect_base_paths(&config.api);

    let figment = rocket::Config::figment()
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port));

    let mut rocket = rocket::custom(figment)
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database.clone()))
        .attach(stage_session_sweeper(config.cleanup.clone()))
        .manage(codec);

    for base_path in &base_paths {
        rocket = mount_api_routes(rocket, base_path, config.api.enable_swagger);
        rocket = rocket.register(
            base_path.as_str(),
            catchers![
                app_routes::error::unauthorized,
                app_routes::error::forbidden,
                app_routes::error::not_found,
                app_routes::error::conflict,
                app_routes::error::unprocessable_entity
            ],
        );
    }

    rocket.manage(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_path_adds_leading_and_strips_trailing_slash() {
        assert_eq!(normalize_base_path("api/"), "/api");
        assert_eq!(normalize_base_path("/v1//"), "/v1");
        assert_eq!(normalize_base_path("  "), config::DEFAULT_API_BASE_PATH);
        assert_eq!(normalize_base_path("/"), "/");
    }

    #[test]
    fn join_base_path_handles_slashes() {
        assert_eq!(join_base_path("/api", "/auth"), "/api/auth");
        assert_eq!(join_base_path("/api/", "docs"), "/api/docs");
        assert_eq!(join_base_path("/", "health"), "/health");
    }

    #[test]
    fn collect_base_paths_deduplicates() {
        let api = config::ApiConfig {
            base_path: "/api".to_string(),
            additional_base_paths: vec!["api/".to_string(), "/v1".to_string()],
            enable_swagger: false,
        };
        assert_eq!(collect_base_paths(&api), vec!["/api".to_string(), "/v1".to_string()]);
    }

    #[test]
    #[should_panic(expected = "Cannot use wildcard origins")]
    fn wildcard_cors_with_credentials_is_rejected() {
        build_cors(&config::CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        });
    }
}
