use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result, anyhow};
use axum::http::HeaderValue;
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<HeaderValue>,
    pub token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub jwt_secret: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let cors_origins: String = try_load("CORS_ORIGINS", "http://localhost:3000")?;

        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            database_url: try_load("DATABASE_URL", "sqlite://raffle.db?mode=rwc")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            upload_dir: try_load("UPLOAD_DIR", "uploads")?,
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "5242880")?,
            cors_origins: parse_origins(&cors_origins)?,
            token_ttl_secs: try_load("TOKEN_TTL_SECS", "7200")?,
            bcrypt_cost: try_load("BCRYPT_COST", "10")?,
            jwt_secret: read_secret("JWT_SECRET")?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(upload_dir: &std::path::Path) -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            upload_dir: upload_dir.display().to_string(),
            max_upload_bytes: 1024 * 1024,
            cors_origins: Vec::new(),
            token_ttl_secs: 7200,
            bcrypt_cost: 4,
            jwt_secret: "test-secret".to_string(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("Environment misconfigured: {key}")
        })
}

/// Environment first, then the docker secret file.
fn read_secret(secret_name: &str) -> Result<String> {
    if let Some(value) = var(secret_name).filter(|v| !v.trim().is_empty()) {
        info!("{secret_name}: (loaded from environment)");
        return Ok(value);
    }

    let path = format!("/run/secrets/{secret_name}");

    let secret = read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
        .with_context(|| format!("Secrets misconfigured: {secret_name}"))?;

    info!("{secret_name}: (loaded from {path})");
    Ok(secret)
}

fn parse_origins(raw: &str) -> Result<Vec<HeaderValue>> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect()
}
