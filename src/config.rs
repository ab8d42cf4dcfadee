use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which store answers searches. One per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    Postgres,
    Elasticsearch,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Elasticsearch => "elasticsearch",
            BackendKind::Memory => "memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "sql" => Ok(BackendKind::Postgres),
            "elasticsearch" | "es" => Ok(BackendKind::Elasticsearch),
            "memory" => Ok(BackendKind::Memory),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexAuth {
    None,
    ApiKey(String),
    Basic { username: String, password: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    pub url: String,
    pub index: String,
    pub auth: IndexAuth,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl IndexConfig {
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            auth: IndexAuth::None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    pub backend: BackendKind,
    pub database: Option<DatabaseConfig>,
    pub index: IndexConfig,
    pub catalog_path: Option<PathBuf>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }
}

impl Config {
    /// Read settings through `lookup`, normally `std::env::var` after `.env`
    /// has been loaded.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Lookup(lookup);

        let backend = match vars.get("SEARCH_BACKEND") {
            None => BackendKind::Postgres,
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "SEARCH_BACKEND",
                value,
            })?,
        };

        let database = match vars.get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: vars.parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
                acquire_timeout: Duration::from_secs(
                    vars.parse_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?,
                ),
            }),
            None => None,
        };
        if backend == BackendKind::Postgres && database.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let auth = match (
            vars.get("ES_API_KEY"),
            vars.get("ELASTICSEARCH_USERNAME"),
            vars.get("ELASTICSEARCH_PASSWORD"),
        ) {
            (Some(key), _, _) => IndexAuth::ApiKey(key),
            (None, Some(username), Some(password)) => IndexAuth::Basic { username, password },
            _ => IndexAuth::None,
        };
        let index = IndexConfig {
            url: vars.get_or_default("ELASTICSEARCH_URL", "http://localhost:9200"),
            index: vars.get_or_default("ELASTICSEARCH_INDEX", "products"),
            auth,
            timeout: Duration::from_secs(vars.parse_or("ELASTICSEARCH_TIMEOUT_SECS", 10)?),
            max_retries: vars.parse_or("ELASTICSEARCH_MAX_RETRIES", 3)?,
        };

        let catalog_path = vars.get("CATALOG_FIXTURE").map(PathBuf::from);
        if backend == BackendKind::Memory && catalog_path.is_none() {
            return Err(ConfigError::Missing("CATALOG_FIXTURE"));
        }

        let mut cors_origins: Vec<String> = vars
            .get("CORS_ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(domain) = vars.get("PROD_WEB_DOMAIN") {
            cors_origins.push(format!("https://{domain}"));
            cors_origins.push(format!("https://www.{domain}"));
        }

        Ok(Config {
            bind_addr: vars.get_or_default("BIND_ADDR", "0.0.0.0:8000"),
            backend,
            database,
            index,
            catalog_path,
            cors_origins,
        })
    }
}
