use std::{env, path::PathBuf};

use anyhow::Context;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub media: MediaConfig,
}

/// Where uploaded product media lives and how it is post-processed.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub public_url: String,
    pub max_upload_bytes: usize,
    pub thumbnail_max_edge: u32,
    pub thumbnail_quality: u8,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./media"),
            public_url: "http://127.0.0.1:3000/media".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            thumbnail_max_edge: 800,
            thumbnail_quality: 80,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let defaults = MediaConfig::default();
        let media = MediaConfig {
            root: env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            public_url: env::var("MEDIA_PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}/media")),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            thumbnail_max_edge: parse_or("THUMBNAIL_MAX_EDGE", defaults.thumbnail_max_edge)?,
            thumbnail_quality: parse_or("THUMBNAIL_JPEG_QUALITY", defaults.thumbnail_quality)?,
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            media,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {key} value: {raw}")),
        Err(_) => Ok(default),
    }
}
