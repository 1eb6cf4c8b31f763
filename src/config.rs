//! Configuration module for the PRTG sync service.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "prtg-sync.db")
    pub db_path: String,
    /// Path of the append-only chart failure log (default: "prtg-charts.log")
    pub chart_log_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "prtg-sync.db".to_string(),
            chart_log_path: "prtg-charts.log".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PRTG_SYNC_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PRTG_SYNC_DB_PATH`: Database file path (default: "prtg-sync.db")
    /// - `PRTG_SYNC_CHART_LOG_PATH`: Chart failure log path (default: "prtg-charts.log")
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("PRTG_SYNC_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("PRTG_SYNC_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(log_path) = env::var("PRTG_SYNC_CHART_LOG_PATH") {
            cfg.chart_log_path = log_path;
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "prtg-sync.db");
        assert_eq!(cfg.chart_log_path, "prtg-charts.log");
    }
}
