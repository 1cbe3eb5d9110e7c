use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_PATH: &str = "/api";

/// Signing key used when no secret is configured. Only accepted under the `debug` profile.
pub const INSECURE_DEV_JWT_SECRET: &str = "storefront-insecure-development-secret-do-not-use";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub cleanup: CleanupConfig,
    pub cron: CronConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub additional_base_paths: Vec<String>,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens. Empty means "use the development fallback".
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_days: i64,
    /// Replace the refresh token on every successful refresh.
    pub rotate_refresh_tokens: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CronConfig {
    pub auth_token: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/storefront".to_string(),
            max_connections: 16,
            min_connections: 4,
            acquire_timeout: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            additional_base_paths: Vec::new(),
            enable_swagger: true,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_seconds: 60 * 60,
            refresh_token_ttl_days: 30,
            rotate_refresh_tokens: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60 * 60,
        }
    }
}

impl AuthConfig {
    /// Returns the configured signing secret, falling back to the development key
    /// only when running under the `debug` profile.
    pub fn signing_secret(&self, profile: &str) -> Result<String, String> {
        if !self.jwt_secret.trim().is_empty() {
            return Ok(self.jwt_secret.clone());
        }

        if profile == "debug" {
            tracing::warn!("auth.jwt_secret is not set; using the insecure development signing key");
            return Ok(INSECURE_DEV_JWT_SECRET.to_string());
        }

        Err(format!(
            "auth.jwt_secret is required for profile '{}'. Set STOREFRONT_AUTH_JWT_SECRET or JWT_SECRET",
            profile
        ))
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Storefront.toml (base configuration file)
    /// 2. Environment variables (prefixed with STOREFRONT_)
    /// 3. DATABASE_URL and JWT_SECRET environment variables
    pub fn load() -> Result<Self, figment::Error> {
        let defaults = toml::to_string(&Config::default()).map_err(|e| figment::Error::from(e.to_string()))?;

        let figment = Figment::new()
            .merge(Toml::string(&defaults))
            .merge(Toml::file("Storefront.toml"))
            // Double underscore separates sections so keys like jwt_secret survive
            .merge(Env::prefixed("STOREFRONT_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .merge(Env::raw().only(&["JWT_SECRET"]).map(|_| "auth.jwt_secret".into()));

        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_lifetimes() {
        let config = Config::default();
        assert_eq!(config.auth.access_token_ttl_seconds, 3600);
        assert_eq!(config.auth.refresh_token_ttl_days, 30);
        assert!(config.auth.rotate_refresh_tokens);
        assert_eq!(config.api.base_path, DEFAULT_API_BASE_PATH);
    }

    #[test]
    fn signing_secret_prefers_configured_value() {
        let auth = AuthConfig {
            jwt_secret: "configured".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(auth.signing_secret("release").unwrap(), "configured");
    }

    #[test]
    fn signing_secret_falls_back_only_in_debug() {
        let auth = AuthConfig::default();
        assert_eq!(auth.signing_secret("debug").unwrap(), INSECURE_DEV_JWT_SECRET);
        assert!(auth.signing_secret("release").is_err());
    }

    #[test]
    fn load_without_file_or_env_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load()?;
            let defaults = Config::default();
            assert_eq!(config.auth.access_token_ttl_seconds, defaults.auth.access_token_ttl_seconds);
            assert_eq!(config.auth.refresh_token_ttl_days, defaults.auth.refresh_token_ttl_days);
            assert!(config.auth.rotate_refresh_tokens);
            assert_eq!(config.server.port, defaults.server.port);
            assert_eq!(config.api.base_path, DEFAULT_API_BASE_PATH);
            assert_eq!(config.cleanup.interval_seconds, defaults.cleanup.interval_seconds);
            Ok(())
        });
    }

    #[test]
    fn load_reads_toml_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Storefront.toml",
                r#"
                [auth]
                refresh_token_ttl_days = 14
                "#,
            )?;
            jail.set_env("STOREFRONT_AUTH__ROTATE_REFRESH_TOKENS", "false");
            jail.set_env("JWT_SECRET", "from-env");

            let config = Config::load()?;
            assert_eq!(config.auth.refresh_token_ttl_days, 14);
            assert!(!config.auth.rotate_refresh_tokens);
            assert_eq!(config.auth.jwt_secret, "from-env");
            assert_eq!(config.auth.access_token_ttl_seconds, 3600);
            Ok(())
        });
    }
}
