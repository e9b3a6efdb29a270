//! Configuration for the job tracker, read from `jobtrack.toml`.
//!
//! Layered: file → environment → CLI flags. Every field has a default, so
//! an empty or missing file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3150
//! dev_mode = false
//!
//! [database]
//! path = ".jobtrack/jobtrack.db"
//! in_memory = false
//!
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [journal]
//! undo_capacity = 100
//!
//! [[users]]
//! id = "admin"
//! name = "Administrator"
//! role = "admin"
//!
//! [[users]]
//! id = "u-drill"
//! name = "Ravi"
//! role = "employee"
//! department = "Drilling"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::logging::LogFormat;
use crate::tracker::catalog::PROCESS_NAMES;
use crate::tracker::models::User;
use crate::tracker::server::ServerConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "jobtrack.toml";

pub const ENV_PORT: &str = "JOBTRACK_PORT";
pub const ENV_DB_PATH: &str = "JOBTRACK_DB_PATH";
pub const ENV_LOG: &str = "JOBTRACK_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a separately served front-end
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3150
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Keep everything in memory; nothing survives a restart
    #[serde(default)]
    pub in_memory: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".jobtrack/jobtrack.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Level or `EnvFilter` directive string
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSection {
    /// Number of mutations that can be undone; 0 disables undo
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,
}

fn default_undo_capacity() -> usize {
    100
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            undo_capacity: default_undo_capacity(),
        }
    }
}

/// Root of `jobtrack.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub journal: JournalSection,
    /// Users seeded into the store at startup
    #[serde(default)]
    pub users: Vec<User>,
}

impl TrackerToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse jobtrack.toml")
    }

    /// Load `path`, or the defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize jobtrack.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `JOBTRACK_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_PORT, port))?;
        }
        if let Some(path) = get(ENV_DB_PATH) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(level) = get(ENV_LOG) {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; an ephemeral port will be chosen".to_string());
        }
        if self.journal.undo_capacity == 0 {
            warnings.push("journal.undo_capacity is 0; undo is disabled".to_string());
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if !seen.insert(user.id.as_str()) {
                warnings.push(format!("Duplicate user id '{}'", user.id));
            }
            if let Some(department) = &user.department
                && !PROCESS_NAMES
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(department.trim()))
            {
                warnings.push(format!(
                    "User '{}' has department '{}', which names no process",
                    user.id, department
                ));
            }
        }

        warnings
    }

    /// Server settings derived from this configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.database.path.clone(),
            in_memory: self.database.in_memory,
            dev_mode: self.server.dev_mode,
            undo_capacity: self.journal.undo_capacity,
            users: self.users.clone(),
        }
    }
}

/// Starter config written by `jobtrack init`.
pub fn starter_config() -> TrackerToml {
    use crate::tracker::models::Role;

    TrackerToml {
        users: vec![User {
            id: "admin".to_string(),
            name: "Administrator".to_string(),
            role: Role::Admin,
            department: None,
        }],
        ..TrackerToml::default()
    }
}
