use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `LOGVAULT__AUTH__TOKEN`
pub const ENV_PREFIX: &str = "LOGVAULT";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub syslog_drain: SyslogDrainConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bearer token required on every API route
    #[serde(default = "default_token")]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyslogDrainConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Queue length that triggers an inline flush
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_body_limit_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_token() -> String {
    "changeme".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/logvault.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_page_size() -> u32 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for SyslogDrainConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}

impl SyslogDrainConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Load configuration from `path` (optional) overlaid by `LOGVAULT__*` env vars
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.auth.token.is_empty() {
        anyhow::bail!("auth.token cannot be empty");
    }

    if cfg.server.port == 0 {
        anyhow::bail!("server.port must be greater than 0");
    }

    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!(
            "server.log_format must be 'text' or 'json', got '{}'",
            cfg.server.log_format
        );
    }

    if cfg.database.path.as_os_str().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be greater than 0");
    }

    if cfg.syslog_drain.max_queue_size == 0 {
        anyhow::bail!("syslog_drain.max_queue_size must be greater than 0");
    }

    if cfg.syslog_drain.flush_interval_ms == 0 {
        anyhow::bail!("syslog_drain.flush_interval_ms must be greater than 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = create_test_config();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.syslog_drain.flush_interval(), Duration::from_secs(5));
        assert_eq!(cfg.query.default_page_size, 30);
    }

    #[test]
    fn test_validate_config_requires_token() {
        let mut cfg = create_test_config();
        cfg.auth.token.clear();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("auth.token cannot be empty"));
    }

    #[test]
    fn test_validate_config_rejects_unknown_log_format() {
        let mut cfg = create_test_config();
        cfg.server.log_format = "xml".to_string();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log_format"));
    }

    #[test]
    fn test_validate_config_rejects_zero_limits() {
        let mut cfg = create_test_config();
        cfg.syslog_drain.max_queue_size = 0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = create_test_config();
        cfg.syslog_drain.flush_interval_ms = 0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = create_test_config();
        cfg.database.max_connections = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090
log_format = "json"

[auth]
token = "s3cret"

[syslog_drain]
max_queue_size = 50
"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.log_format, "json");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.auth.token, "s3cret");
        assert_eq!(cfg.syslog_drain.max_queue_size, 50);
        assert_eq!(cfg.syslog_drain.flush_interval_ms, 5000);
        assert_eq!(cfg.database.path, PathBuf::from("./data/logvault.db"));
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.auth.token, "changeme");
        assert_eq!(cfg.database.max_connections, 5);
    }

    fn create_test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                ..Default::default()
            },
            auth: AuthConfig {
                token: "test-token".to_string(),
            },
            ..Default::default()
        }
    }
}
