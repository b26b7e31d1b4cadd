//! Process configuration.
//!
//! Loaded once at startup from the process environment. Mirrors the naming
//! used by the system this API was modelled on (`MONGODB_URI`,
//! `MONGODB_DB_NAME`) even though persistence here is sqlite-backed: the
//! env var carries the database file path instead of a connection string.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub database_path: String,
    pub database_namespace: String,
    pub allowed_origins: Vec<String>,
    pub csv_chunk_size: usize,
    pub port: u16,
}

impl Config {
    /// Read configuration from the environment. Call once at startup, after
    /// `dotenv::dotenv()` has had a chance to populate `std::env`.
    pub fn from_env() -> Self {
        Self {
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "Stock Backtest API".to_string()),
            database_path: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "./data/stockbacktest.db".to_string()),
            database_namespace: env::var("MONGODB_DB_NAME")
                .unwrap_or_else(|_| "stockbacktest".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            csv_chunk_size: env::var("CSV_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&v| v > 0)
                .unwrap_or(10_000),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let cfg = Config {
            app_name: "x".into(),
            database_path: "y".into(),
            database_namespace: "z".into(),
            allowed_origins: vec![],
            csv_chunk_size: 10_000,
            port: 8080,
        };
        assert_eq!(cfg.csv_chunk_size, 10_000);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn parses_allowed_origins() {
        let raw = "https://a.example, https://b.example,,";
        let parsed: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        assert_eq!(parsed, vec!["https://a.example", "https://b.example"]);
    }
}
