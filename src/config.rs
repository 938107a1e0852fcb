//! Application-level configuration loading, including the challenge catalog.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::event::{ChallengeConfig, ChallengeDefinition, ChallengeKind, ReleaseStatus};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WISE_OLD_PEA_CONFIG_PATH";

/// A challenge template from the catalog; instantiated per event with a
/// fresh identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogChallenge {
    /// Slug used in participant commands.
    pub name: String,
    /// Human readable name.
    pub display_name: String,
    /// Strategy selector.
    pub kind: ChallengeKind,
    /// Strategy-specific configuration.
    #[serde(default)]
    pub config: ChallengeConfig,
    /// Explicit release offset from event start, in seconds.
    #[serde(default)]
    pub release_offset_secs: Option<u64>,
}

impl CatalogChallenge {
    /// Instantiate a pending challenge definition for a new event.
    pub fn instantiate(&self) -> ChallengeDefinition {
        ChallengeDefinition {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            kind: self.kind,
            config: self.config.clone(),
            release_offset_secs: self.release_offset_secs,
            status: ReleaseStatus::Pending,
            released_at: None,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Where the snapshot store persists state.
    pub snapshot_path: PathBuf,
    /// Where the audit trail is appended.
    pub audit_path: PathBuf,
    /// Base URL of the stats API, when metric-based scoring is wanted.
    pub stats_base_url: Option<String>,
    /// Challenge templates available to new events, in release order.
    pub catalog: Vec<CatalogChallenge>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        challenges = config.catalog.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Catalog template by slug name.
    pub fn challenge_template(&self, name: &str) -> Option<&CatalogChallenge> {
        self.catalog.iter().find(|template| template.name == name)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/snapshot.json"),
            audit_path: PathBuf::from("data/audit.jsonl"),
            stats_base_url: None,
            catalog: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file.
struct RawConfig {
    #[serde(default)]
    snapshot_path: Option<PathBuf>,
    #[serde(default)]
    audit_path: Option<PathBuf>,
    #[serde(default)]
    stats_base_url: Option<String>,
    #[serde(default)]
    challenges: Vec<CatalogChallenge>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            snapshot_path: raw.snapshot_path.unwrap_or(defaults.snapshot_path),
            audit_path: raw.audit_path.unwrap_or(defaults.audit_path),
            stats_base_url: raw.stats_base_url,
            catalog: raw.challenges,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
