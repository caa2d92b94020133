//! Server configuration read from the environment

use lemmario_lib::cache::DEFAULT_CACHE_CAPACITY;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Holds `lemmi.json` and the GeoJSON boundary files.
    pub data_dir: PathBuf,
    pub api_keys: Vec<String>,
    /// Bearer token for the admin routes. Admin access is refused when unset.
    pub admin_token: Option<String>,
    /// Allowed CORS origins; `None` allows any origin.
    pub allowed_origins: Option<Vec<String>>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub upload_limit_per_hour: u32,
    pub max_upload_bytes: usize,
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            data_dir: PathBuf::from("data"),
            api_keys: vec!["default_dev_key".to_string()],
            admin_token: None,
            allowed_origins: Some(vec!["http://localhost:3000".to_string(), "http://localhost:9000".to_string()]),
            rate_limit_per_second: 10,
            rate_limit_burst: 50,
            upload_limit_per_hour: 5,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    let value = std::env::var(name).ok()?;
    let items: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let allowed_origins = match env_list("ALLOWED_ORIGINS") {
            Some(origins) if origins.iter().any(|o| o == "*") => None,
            Some(origins) => Some(origins),
            None => defaults.allowed_origins,
        };

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port),
            data_dir: std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            api_keys: env_list("FRONTEND_API_KEYS").unwrap_or(defaults.api_keys),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            allowed_origins,
            rate_limit_per_second: env_parse("RATE_LIMIT_PER_SECOND", defaults.rate_limit_per_second),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            upload_limit_per_hour: env_parse("UPLOAD_LIMIT_PER_HOUR", defaults.upload_limit_per_hour),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            cache_capacity: env_parse("CACHE_CAPACITY", defaults.cache_capacity),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn lemmi_path(&self) -> PathBuf {
        self.data_dir.join("lemmi.json")
    }

    pub fn geojson_path(&self) -> PathBuf {
        self.data_dir.join("geojson.json")
    }

    pub fn regions_path(&self) -> PathBuf {
        self.data_dir.join("limits_IT_regions.geojson")
    }
}
