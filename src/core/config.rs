use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration. Precedence: CLI flag > environment > default.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub http_enabled: bool,
    pub http_host: String,
    pub http_port: u16,

    pub max_indices: usize,
    pub refresh_interval: Duration,
    pub shutdown_timeout: Duration,

    // Writer tuning
    pub writer_buffer_docs: usize,
    pub writer_max_segment_size: usize,
    pub wal_sync_bytes: u64,

    // Request limits
    pub max_document_size: usize,
    pub max_search_size: usize,
    pub max_bulk_size: usize,
    pub request_timeout: Duration,

    pub query_cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            http_enabled: true,
            http_host: "0.0.0.0".to_string(),
            http_port: 9200,

            max_indices: 1000,
            refresh_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),

            writer_buffer_docs: 10_000,
            writer_max_segment_size: 256 * 1024 * 1024,
            wal_sync_bytes: 1024 * 1024,

            max_document_size: 10 * 1024 * 1024,
            max_search_size: 10 * 1024 * 1024,
            max_bulk_size: 500 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),

            query_cache_entries: 256,
        }
    }
}

impl Config {
    /// Apply TIGERDB_* environment overrides on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("TIGERDB_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(enabled) = std::env::var("TIGERDB_ES_ENABLED") {
            self.http_enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
        if let Ok(host) = std::env::var("TIGERDB_ES_HOST") {
            if !host.is_empty() {
                self.http_host = host;
            }
        }
        if let Ok(port) = std::env::var("TIGERDB_ES_PORT") {
            if let Ok(port) = port.parse() {
                self.http_port = port;
            }
        }
    }

    /// Apply `--key=value` style CLI flags. Flags win over environment.
    pub fn apply_args<I: IntoIterator<Item = String>>(&mut self, args: I) {
        for arg in args {
            let Some((key, value)) = arg.strip_prefix("--").and_then(|a| a.split_once('=')) else {
                continue;
            };
            match key {
                "data-dir" => self.data_dir = PathBuf::from(value),
                "host" => self.http_host = value.to_string(),
                "port" => {
                    if let Ok(port) = value.parse() {
                        self.http_port = port;
                    }
                }
                _ => {}
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override() {
        let mut config = Config::default();
        config.apply_args(vec![
            "--data-dir=/tmp/tiger".to_string(),
            "--port=9201".to_string(),
            "ignored".to_string(),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tiger"));
        assert_eq!(config.http_port, 9201);
        assert_eq!(config.http_host, "0.0.0.0");
    }
}
