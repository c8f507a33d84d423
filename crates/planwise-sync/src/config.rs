//! # Application Configuration
//!
//! Configuration for storage, backup sync and sign-in.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PLANWISE_DB_PATH=/data/planwise.db                                 │
//! │     PLANWISE_DEBOUNCE_SECS=30                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/planwise/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/app.planwise.planwise/sync.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     10 s debounce, backup.json in appDataFolder                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [storage]
//! database_path = "/home/alex/.local/share/planwise/planwise.db"
//!
//! [sync]
//! debounce_secs = 10
//! backup_name = "backup.json"
//! backup_folder = "appDataFolder"
//! mime_type = "application/json"
//!
//! [auth]
//! scopes = [
//!     "https://www.googleapis.com/auth/drive.appdata",
//!     "https://www.googleapis.com/auth/drive.appfolder",
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use planwise_db::DbConfig;

use crate::error::{SyncError, SyncResult};

/// Scopes requested when the config names none.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.appdata",
    "https://www.googleapis.com/auth/drive.appfolder",
];

/// File name of the database inside the platform data directory.
const DATABASE_FILE: &str = "planwise.db";

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the local dataset lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Explicit database file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Backup sync behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Quiet period after the last local change before a backup starts.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Name of the backup object in the remote store.
    #[serde(default = "default_backup_name")]
    pub backup_name: String,

    /// Folder scope the backup object lives in.
    #[serde(default = "default_backup_folder")]
    pub backup_folder: String,

    /// MIME type sent with a newly created backup object.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_debounce_secs() -> u64 {
    10
}

fn default_backup_name() -> String {
    "backup.json".to_string()
}

fn default_backup_folder() -> String {
    "appDataFolder".to_string()
}

fn default_mime_type() -> String {
    "application/json".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            debounce_secs: default_debounce_secs(),
            backup_name: default_backup_name(),
            backup_folder: default_backup_folder(),
            mime_type: default_mime_type(),
        }
    }
}

impl SyncSettings {
    /// Returns the debounce delay.
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

// =============================================================================
// Auth Settings
// =============================================================================

/// Sign-in settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Scopes requested on interactive sign-in.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            scopes: default_scopes(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Backup sync settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Sign-in settings.
    #[serde(default)]
    pub auth: AuthSettings,
}

impl AppConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.debounce_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "debounce_secs must be greater than 0".into(),
            ));
        }

        if self.sync.backup_name.trim().is_empty() {
            return Err(SyncError::InvalidConfig("backup_name must not be empty".into()));
        }

        if self.sync.backup_folder.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "backup_folder must not be empty".into(),
            ));
        }

        if self.auth.scopes.is_empty() {
            return Err(SyncError::InvalidConfig(
                "at least one auth scope is required".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PLANWISE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(secs) = lookup("PLANWISE_DEBOUNCE_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.sync.debounce_secs = secs,
                Err(_) => warn!(value = %secs, "Ignoring invalid PLANWISE_DEBOUNCE_SECS"),
            }
        }

        if let Some(name) = lookup("PLANWISE_BACKUP_NAME") {
            self.sync.backup_name = name;
        }

        if let Some(folder) = lookup("PLANWISE_BACKUP_FOLDER") {
            self.sync.backup_folder = folder;
        }

        // Space or comma separated
        if let Some(scopes) = lookup("PLANWISE_AUTH_SCOPES") {
            self.auth.scopes = scopes
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("app", "planwise", "planwise")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolves the database file: explicit path, then the platform data
    /// directory, then the working directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.database_path {
            return path.clone();
        }

        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
    }

    /// Returns the database configuration for [`database_path`](Self::database_path).
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
    }
}
