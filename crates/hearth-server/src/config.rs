//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_URL` (a `sqlite://` or `sqlite:` prefix is accepted)
    /// Default: `./hearth.db`
    pub database_path: PathBuf,

    /// Root directory of the object store; buckets are sub-directories.
    /// Env: `OBJECT_STORE_PATH`
    /// Default: `./objects`
    pub object_store_path: PathBuf,

    /// Bucket that receives avatar uploads.
    /// Env: `STORAGE_BUCKET`
    /// Default: `files`
    pub bucket: String,

    /// Path segment under which the CDN publishes the bucket.
    /// Env: `CDN_BUCKET_PATH`
    /// Default: `bucket`
    pub cdn_bucket_path: String,

    /// Storage account identifier embedded in public URLs.
    /// Env: `STORAGE_ACCOUNT_ID`, falling back to `AWS_ACCESS_KEY_ID`
    /// Default: `local`
    pub storage_account: String,

    /// Public CDN origin that serves the bucket.
    /// Env: `CDN_ORIGIN`
    /// Default: `https://cdn.poehali.dev`
    pub cdn_origin: String,

    /// Maximum decoded avatar size in bytes (10 MiB).
    /// Env: `MAX_AVATAR_SIZE`
    pub max_avatar_size: usize,

    /// Maximum request body size in bytes (16 MiB), enough for a
    /// base64-encoded avatar at `max_avatar_size`.
    /// Env: `MAX_REQUEST_BODY`
    pub max_request_body: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./hearth.db"),
            object_store_path: PathBuf::from("./objects"),
            bucket: "files".to_string(),
            cdn_bucket_path: "bucket".to_string(),
            storage_account: "local".to_string(),
            cdn_origin: "https://cdn.poehali.dev".to_string(),
            max_avatar_size: 10 * 1024 * 1024,  // 10 MiB
            max_request_body: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(url) = var("DATABASE_URL") {
            config.database_path = database_path_from_url(&url);
        }

        if let Some(path) = var("OBJECT_STORE_PATH") {
            config.object_store_path = PathBuf::from(path);
        }

        if let Some(bucket) = non_empty(var("STORAGE_BUCKET")) {
            config.bucket = bucket;
        }

        if let Some(path) = non_empty(var("CDN_BUCKET_PATH")) {
            config.cdn_bucket_path = path.trim_matches('/').to_string();
        }

        if let Some(account) =
            non_empty(var("STORAGE_ACCOUNT_ID")).or_else(|| non_empty(var("AWS_ACCESS_KEY_ID")))
        {
            config.storage_account = account;
        }

        if let Some(origin) = non_empty(var("CDN_ORIGIN")) {
            config.cdn_origin = origin.trim_end_matches('/').to_string();
        }

        if let Some(val) = var("MAX_AVATAR_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_avatar_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_AVATAR_SIZE, using default"),
            }
        }

        if let Some(val) = var("MAX_REQUEST_BODY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_request_body = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_REQUEST_BODY, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accept either a bare path or a `sqlite:` URL.
fn database_path_from_url(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}
