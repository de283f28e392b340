//! Configuration file
//!
//! A single JSON object. Every field except the primary and the login has
//! a default; command line flags override the file.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::args::CommonArgs;
use super::errors::{CliError, CliResult};
use crate::gateway::{Credentials, Secret};
use crate::observability::LogFormat;
use crate::switchover::{ReplicationLogin, SwitchoverSettings, TieBreak};
use crate::topology::{DiscoveryMode, NodeAddress, DEFAULT_PORT};

/// Default config file, used when present and no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "./replwatch.json";

/// Health responder settings
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address (default "0.0.0.0:8000")
    #[serde(default = "default_health_listen")]
    pub listen: String,

    /// Node to check (default "127.0.0.1:3306")
    #[serde(default = "default_health_target")]
    pub target: String,

    /// Highest acceptable delay in seconds (default 5)
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            listen: default_health_listen(),
            target: default_health_target(),
            max_delay_secs: default_max_delay(),
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Primary address, host[:port] (required, may come from --primary)
    #[serde(default)]
    pub primary: Option<String>,

    /// Login used for probes and admin statements
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: Secret,

    /// Login the replicas use against the new primary (default: `user`)
    #[serde(default)]
    pub replication_user: Option<String>,

    #[serde(default)]
    pub replication_password: Option<Secret>,

    /// "auto" (processlist) or "static" (default "auto")
    #[serde(default = "default_discovery")]
    pub discovery: String,

    /// Replica list for static discovery
    #[serde(default)]
    pub replicas: Vec<String>,

    /// Port used when an address has none (default 3306)
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Snapshot refresh interval in the monitor (default 3)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Minimum age of a write that blocks a switchover (default 10)
    #[serde(default = "default_long_write_threshold")]
    pub long_write_threshold_secs: u64,

    /// Candidate catch-up bound during promotion (default 30)
    #[serde(default = "default_catchup_timeout")]
    pub catchup_timeout_secs: u64,

    /// Connection timeout per node (default 5)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// "first_seen" or "lowest_address" (default "first_seen")
    #[serde(default)]
    pub tie_break: TieBreak,

    /// Make the old primary read-only before re-pointing it (default true)
    #[serde(default = "default_true")]
    pub demote_read_only: bool,

    #[serde(default)]
    pub health: HealthConfig,

    /// "text" or "json" (default "text")
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_health_listen() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_health_target() -> String {
    "127.0.0.1:3306".to_string()
}
fn default_max_delay() -> u64 {
    5
}
fn default_discovery() -> String {
    "auto".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_refresh_interval() -> u64 {
    3
}
fn default_long_write_threshold() -> u64 {
    10
}
fn default_catchup_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        // Same values as an empty JSON object.
        Self {
            primary: None,
            user: String::new(),
            password: Secret::default(),
            replication_user: None,
            replication_password: None,
            discovery: default_discovery(),
            replicas: Vec::new(),
            default_port: default_port(),
            refresh_interval_secs: default_refresh_interval(),
            long_write_threshold_secs: default_long_write_threshold(),
            catchup_timeout_secs: default_catchup_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            tie_break: TieBreak::default(),
            demote_read_only: true,
            health: HealthConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))
    }

    /// Load the file named by `--config`, else the default file when it
    /// exists, else defaults; then apply flag overrides and validate.
    pub fn resolve(args: &CommonArgs) -> CliResult<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides.
    pub fn apply_overrides(&mut self, args: &CommonArgs) {
        if let Some(primary) = &args.primary {
            self.primary = Some(primary.clone());
        }
        if !args.replicas.is_empty() {
            self.discovery = "static".to_string();
            self.replicas = args.replicas.clone();
        }
        if let Some(pair) = &args.user {
            let creds = Credentials::from_pair(pair);
            self.user = creds.user;
            self.password = creds.password;
        }
        if let Some(pair) = &args.rpluser {
            let creds = Credentials::from_pair(pair);
            self.replication_user = Some(creds.user);
            self.replication_password = Some(creds.password);
        }
    }

    /// Validate configuration
    ///
    /// The primary is optional here: the health responder does not need it.
    /// Commands that do fail on `primary_address()`.
    pub fn validate(&self) -> CliResult<()> {
        if self.primary.is_some() {
            self.primary_address()?;
        }

        if self.user.is_empty() {
            return Err(CliError::config_error(
                "user is required (config 'user' or --user)",
            ));
        }

        if self.default_port == 0 {
            return Err(CliError::config_error("default_port must be > 0"));
        }

        match self.discovery.as_str() {
            "auto" => {}
            "static" => {
                if self.replicas.is_empty() {
                    return Err(CliError::config_error(
                        "static discovery requires a non-empty replicas list",
                    ));
                }
            }
            other => {
                return Err(CliError::config_error(format!(
                    "Invalid discovery: '{}'. Use 'auto' or 'static'.",
                    other
                )))
            }
        }
        self.discovery_mode()?;

        for (name, value) in [
            ("refresh_interval_secs", self.refresh_interval_secs),
            ("catchup_timeout_secs", self.catchup_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ] {
            if value == 0 {
                return Err(CliError::config_error(format!("{} must be > 0", name)));
            }
        }

        self.health_listen()?;
        self.health_target()?;
        Ok(())
    }

    /// Declared primary.
    pub fn primary_address(&self) -> CliResult<NodeAddress> {
        let raw = self.primary.as_deref().ok_or_else(|| {
            CliError::config_error("primary is required (config 'primary' or --primary)")
        })?;
        self.parse_address(raw)
    }

    fn parse_address(&self, raw: &str) -> CliResult<NodeAddress> {
        NodeAddress::parse(raw, self.default_port)
            .map_err(|e| CliError::config_error(format!("Invalid address '{}': {}", raw, e)))
    }

    /// How replicas are found.
    pub fn discovery_mode(&self) -> CliResult<DiscoveryMode> {
        if self.discovery != "static" {
            return Ok(DiscoveryMode::Auto);
        }
        let replicas = self
            .replicas
            .iter()
            .map(|r| self.parse_address(r))
            .collect::<CliResult<Vec<_>>>()?;
        Ok(DiscoveryMode::Static(replicas))
    }

    /// Admin login.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    /// Replication login, falling back to the admin login.
    pub fn replication_login(&self) -> ReplicationLogin {
        ReplicationLogin {
            user: self
                .replication_user
                .clone()
                .unwrap_or_else(|| self.user.clone()),
            password: self
                .replication_password
                .clone()
                .unwrap_or_else(|| self.password.clone()),
        }
    }

    /// Switchover tunables.
    pub fn switchover_settings(&self) -> SwitchoverSettings {
        SwitchoverSettings {
            long_write_threshold: Duration::from_secs(self.long_write_threshold_secs),
            catchup_timeout: Duration::from_secs(self.catchup_timeout_secs),
            tie_break: self.tie_break,
            demote_read_only: self.demote_read_only,
            replication: self.replication_login(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Health responder listen address.
    pub fn health_listen(&self) -> CliResult<SocketAddr> {
        self.health.listen.parse().map_err(|e| {
            CliError::config_error(format!(
                "Invalid health.listen '{}': {}",
                self.health.listen, e
            ))
        })
    }

    /// Node checked by the health responder.
    pub fn health_target(&self) -> CliResult<NodeAddress> {
        self.parse_address(&self.health.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_applied() {
        let file = write_config(r#"{"primary": "10.0.0.1", "user": "admin"}"#);
        let config = Config::load(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.primary_address().unwrap(), NodeAddress::new("10.0.0.1", 3306));
        assert_eq!(config.discovery_mode().unwrap(), DiscoveryMode::Auto);
        assert_eq!(config.refresh_interval(), Duration::from_secs(3));
        assert_eq!(config.long_write_threshold_secs, 10);
        assert_eq!(config.tie_break, TieBreak::FirstSeen);
        assert!(config.demote_read_only);
        assert_eq!(config.health.max_delay_secs, 5);
        assert_eq!(config.health_listen().unwrap().port(), 8000);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_full_config() {
        let file = write_config(
            r#"{
                "primary": "db1:3307",
                "user": "admin",
                "password": "secret",
                "replication_user": "repl",
                "replication_password": "rpw",
                "discovery": "static",
                "replicas": ["db2", "db3:3308"],
                "tie_break": "lowest_address",
                "demote_read_only": false,
                "health": {"listen": "127.0.0.1:9000", "max_delay_secs": 2},
                "log_format": "json"
            }"#,
        );
        let config = Config::load(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.discovery_mode().unwrap(),
            DiscoveryMode::Static(vec![
                NodeAddress::new("db2", 3306),
                NodeAddress::new("db3", 3308)
            ])
        );
        let settings = config.switchover_settings();
        assert_eq!(settings.tie_break, TieBreak::LowestAddress);
        assert!(!settings.demote_read_only);
        assert_eq!(settings.replication.user, "repl");
        assert_eq!(settings.replication.password.expose(), "rpw");
        assert_eq!(config.health.target, "127.0.0.1:3306");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_primary_rejected_on_use() {
        let file = write_config(r#"{"user": "admin"}"#);
        let config = Config::load(file.path()).unwrap();
        config.validate().unwrap();
        let err = config.primary_address().unwrap_err();
        assert!(err.message().contains("primary"));
    }

    #[test]
    fn test_invalid_primary_rejected() {
        let file = write_config(r#"{"primary": "db1:notaport", "user": "admin"}"#);
        assert!(Config::load(file.path()).unwrap().validate().is_err());
    }

    #[test]
    fn test_static_without_replicas_rejected() {
        let file = write_config(r#"{"primary": "db1", "user": "a", "discovery": "static"}"#);
        assert!(Config::load(file.path()).unwrap().validate().is_err());
    }

    #[test]
    fn test_unknown_discovery_rejected() {
        let file = write_config(r#"{"primary": "db1", "user": "a", "discovery": "dns"}"#);
        assert!(Config::load(file.path()).unwrap().validate().is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let file = write_config("{not json");
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.message().contains("Invalid config JSON"));
    }

    #[test]
    fn test_flag_overrides() {
        let mut config = Config::default();
        let args = CommonArgs {
            primary: Some("10.0.0.1:3310".to_string()),
            replicas: vec!["10.0.0.2".to_string()],
            user: Some("admin:pw".to_string()),
            ..CommonArgs::default()
        };
        config.apply_overrides(&args);
        config.validate().unwrap();

        assert_eq!(config.primary_address().unwrap().port, 3310);
        assert_eq!(config.discovery, "static");
        assert_eq!(config.credentials().password.expose(), "pw");
        // replication login falls back to the admin login
        assert_eq!(config.replication_login().user, "admin");
    }

    #[test]
    fn test_resolve_with_explicit_path() {
        let file = write_config(r#"{"primary": "db1", "user": "admin"}"#);
        let args = CommonArgs {
            config: Some(file.path().to_path_buf()),
            ..CommonArgs::default()
        };
        let config = Config::resolve(&args).unwrap();
        assert_eq!(config.primary.as_deref(), Some("db1"));
    }
}
