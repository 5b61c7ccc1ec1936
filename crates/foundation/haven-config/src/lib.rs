//! # Haven Config
//!
//! YAML configuration with environment overrides.
//!
//! Lookup order: explicit path, then `<config_dir>/haven/config.yaml`, then
//! built-in defaults. `HAVEN_*` environment variables are applied last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which document store backs the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store, optionally persisted to a JSON snapshot
    Memory { snapshot: Option<PathBuf> },
    /// Hosted MongoDB database
    Mongo {
        uri: String,
        database: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory {
            snapshot: dirs::data_dir().map(|d| d.join("haven").join("store.json")),
        }
    }
}

/// Page sizes per feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub posts_per_page: usize,
    pub resources_per_page: usize,
    pub moderation_per_page: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            posts_per_page: 10,
            resources_per_page: 12,
            moderation_per_page: 20,
        }
    }
}

/// Collection names in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub posts: String,
    pub resources: String,
    pub bookings: String,
    /// One document per administrator, keyed by member uid
    pub admins: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            posts: "forum_posts".to_string(),
            resources: "resources".to_string(),
            bookings: "bookings".to_string(),
            admins: "admin_users".to_string(),
        }
    }
}

/// Counter behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterSettings {
    /// Ignore a repeat like/report while the previous one is unsettled
    pub suppress_in_flight: bool,
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HavenConfig {
    pub store: StoreConfig,
    pub feeds: FeedSettings,
    pub collections: Collections,
    pub counters: CounterSettings,
}

impl HavenConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("haven").join("config.yaml"))
    }

    /// Load from `path` (which must exist) or the default location, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::info!("No config file, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply `HAVEN_*` overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("HAVEN_MONGO_URI") {
            let database = lookup("HAVEN_MONGO_DB").unwrap_or_else(|| match &self.store {
                StoreConfig::Mongo { database, .. } => database.clone(),
                StoreConfig::Memory { .. } => "haven".to_string(),
            });
            let timeout_ms = match &self.store {
                StoreConfig::Mongo { timeout_ms, .. } => *timeout_ms,
                StoreConfig::Memory { .. } => default_timeout_ms(),
            };
            self.store = StoreConfig::Mongo {
                uri,
                database,
                timeout_ms,
            };
        }

        if let Some(path) = lookup("HAVEN_SNAPSHOT") {
            match &mut self.store {
                StoreConfig::Memory { snapshot } => *snapshot = Some(PathBuf::from(path)),
                StoreConfig::Mongo { .. } => {
                    tracing::warn!("HAVEN_SNAPSHOT ignored: store backend is mongo")
                }
            }
        }

        override_parsed(&lookup, "HAVEN_POSTS_PER_PAGE", &mut self.feeds.posts_per_page);
        override_parsed(
            &lookup,
            "HAVEN_RESOURCES_PER_PAGE",
            &mut self.feeds.resources_per_page,
        );

        if let Some(value) = lookup("HAVEN_SUPPRESS_REPEATS") {
            self.counters.suppress_in_flight = value != "false" && value != "0";
        }
    }

    /// Reject settings the feeds cannot run with
    pub fn validate(&self) -> Result<()> {
        let pages = [
            ("posts_per_page", self.feeds.posts_per_page),
            ("resources_per_page", self.feeds.resources_per_page),
            ("moderation_per_page", self.feeds.moderation_per_page),
        ];
        for (name, size) in pages {
            if size == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }

        if let StoreConfig::Mongo { uri, database, .. } = &self.store {
            if uri.is_empty() || database.is_empty() {
                return Err(ConfigError::Invalid("mongo uri and database are required".into()));
            }
        }

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Invalid {} value '{}', keeping current", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = HavenConfig::from_yaml(
            "feeds:\n  posts_per_page: 5\nstore:\n  backend: memory\n  snapshot: /tmp/h.json\n",
        )
        .unwrap();

        assert_eq!(config.feeds.posts_per_page, 5);
        assert_eq!(config.feeds.resources_per_page, 12);
        assert_eq!(config.collections.posts, "forum_posts");
        assert_eq!(config.collections.admins, "admin_users");
        assert_eq!(
            config.store,
            StoreConfig::Memory {
                snapshot: Some(PathBuf::from("/tmp/h.json"))
            }
        );
    }

    #[test]
    fn test_mongo_backend_yaml() {
        let config = HavenConfig::from_yaml(
            "store:\n  backend: mongo\n  uri: mongodb://localhost\n  database: haven\n",
        )
        .unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Mongo {
                uri: "mongodb://localhost".into(),
                database: "haven".into(),
                timeout_ms: 5_000,
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HavenConfig::default();
        config.apply_overrides(env(&[
            ("HAVEN_MONGO_URI", "mongodb://db:27017"),
            ("HAVEN_POSTS_PER_PAGE", "25"),
            ("HAVEN_RESOURCES_PER_PAGE", "many"),
            ("HAVEN_SUPPRESS_REPEATS", "1"),
        ]));

        assert!(matches!(
            &config.store,
            StoreConfig::Mongo { uri, database, .. } if uri == "mongodb://db:27017" && database == "haven"
        ));
        assert_eq!(config.feeds.posts_per_page, 25);
        assert_eq!(config.feeds.resources_per_page, 12);
        assert!(config.counters.suppress_in_flight);
    }

    #[test]
    fn test_zero_page_size_invalid() {
        let mut config = HavenConfig::default();
        config.feeds.moderation_per_page = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_explicit_missing_path_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(
            HavenConfig::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = HavenConfig::default();
        config.collections.posts = "posts".into();
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

        assert_eq!(HavenConfig::from_file(&path).unwrap(), config);
    }
}
