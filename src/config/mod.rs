use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Prefix for `links.self` and pagination links, e.g. `https://api.example.com`
    pub base_url: String,
    /// Top-level key the primary data is rendered under
    pub body_key: String,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL; the in-memory store is used when absent
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// YAML file of resource definitions
    pub definitions_path: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };
        Self::preset(environment).with_env_overrides()
    }

    /// Defaults per environment; `JSONAPI_*` variables are applied on top
    fn preset(environment: Environment) -> Self {
        let (base_url, body_limit_mb, max_entries, max_connections, cors_origins, definitions_path) =
            match environment {
                Environment::Development => (
                    "http://localhost:8000",
                    10,
                    10_000,
                    10,
                    vec!["http://localhost:3000", "http://localhost:5173"],
                    Some("resources.yaml"),
                ),
                Environment::Staging => (
                    "https://staging.example.com",
                    5,
                    50_000,
                    20,
                    vec!["https://staging.example.com"],
                    None,
                ),
                Environment::Production => {
                    ("https://api.example.com", 2, 100_000, 50, vec!["https://app.example.com"], None)
                }
            };

        Self {
            environment,
            api: ApiConfig {
                base_url: base_url.to_string(),
                body_key: "data".to_string(),
                max_request_size_bytes: body_limit_mb * 1024 * 1024,
            },
            cache: CacheConfig { enabled: true, ttl_secs: 60, max_entries },
            server: ServerConfig {
                port: 8000,
                enable_cors: true,
                cors_origins: cors_origins.into_iter().map(str::to_string).collect(),
            },
            database: DatabaseConfig { url: None, max_connections },
            resources: ResourcesConfig { definitions_path: definitions_path.map(str::to_string) },
        }
    }

    fn with_env_overrides(mut self) -> Self {
        let parsed = |name: &str| env::var(name).ok();

        if let Some(v) = parsed("JSONAPI_BASE_URL") {
            self.api.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = parsed("JSONAPI_BODY_KEY") {
            self.api.body_key = v;
        }
        if let Some(v) = parsed("JSONAPI_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        if let Some(v) = parsed("JSONAPI_CACHE_ENABLED") {
            self.cache.enabled = v.parse().unwrap_or(self.cache.enabled);
        }
        if let Some(v) = parsed("JSONAPI_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v.parse().unwrap_or(self.cache.ttl_secs);
        }
        if let Some(v) = parsed("JSONAPI_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = v.parse().unwrap_or(self.cache.max_entries);
        }

        if let Some(v) = parsed("JSONAPI_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = parsed("JSONAPI_ENABLE_CORS") {
            self.server.enable_cors = v.parse().unwrap_or(self.server.enable_cors);
        }
        if let Some(v) = parsed("JSONAPI_CORS_ORIGINS") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Some(v) = parsed("DATABASE_URL") {
            self.database.url = Some(v).filter(|url| !url.is_empty());
        }
        if let Some(v) = parsed("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }

        if let Some(v) = parsed("JSONAPI_RESOURCES") {
            self.resources.definitions_path = Some(v).filter(|path| !path.is_empty());
        }

        self
    }
}

/// Failure loading a YAML file referenced by the config
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid resource definition: {0}")]
    InvalidDefinition(String),
}

/// Read once, on first access
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
