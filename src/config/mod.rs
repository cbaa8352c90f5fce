//! Configuration module for the store directory.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file (also holds sessions)
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Directory resized store photos are written to and served from
    pub uploads_dir: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Public base URL, used in password reset links and to decide cookie security
    pub base_url: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("STORES_DB_PATH")
            .unwrap_or_else(|_| "./data/stores.sqlite".to_string())
            .into();

        let index_path = env::var("STORES_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let uploads_dir = env::var("STORES_UPLOADS_DIR")
            .unwrap_or_else(|_| "./public/uploads".to_string())
            .into();

        let raw_addr =
            env::var("STORES_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:7777".to_string());
        let bind_addr = raw_addr.parse().map_err(|e| {
            AppError::Internal(format!("Invalid STORES_BIND_ADDR {:?}: {}", raw_addr, e))
        })?;

        let base_url = env::var("STORES_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:7777".to_string())
            .trim_end_matches('/')
            .to_string();

        let log_level = env::var("STORES_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            db_path,
            index_path,
            uploads_dir,
            bind_addr,
            base_url,
            log_level,
        })
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("STORES_DB_PATH");
        env::remove_var("STORES_INDEX_PATH");
        env::remove_var("STORES_UPLOADS_DIR");
        env::remove_var("STORES_BIND_ADDR");
        env::remove_var("STORES_BASE_URL");
        env::remove_var("STORES_LOG_LEVEL");

        let config = Config::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/stores.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.uploads_dir, PathBuf::from("./public/uploads"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:7777");
        assert_eq!(config.base_url, "http://localhost:7777");
        assert_eq!(config.log_level, "info");
        assert!(!config.secure_cookies());
    }
}
