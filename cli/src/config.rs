use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Contents of `config.toml`. Every field is optional; command-line flags
/// and `CHAINSWEEP_*` variables take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory of the JSON record store.
    pub store: Option<PathBuf>,
    pub namespace: Option<String>,
    /// Objects deleted concurrently when a tool descriptor gives no value.
    pub delete_concurrency: Option<usize>,
}

impl Config {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("io", "chainsweep", "chainsweep")
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads `path`, or the default location when `path` is `None`. A missing
    /// default file yields an empty config; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.delete_concurrency == Some(0) {
            anyhow::bail!("delete_concurrency must be at least 1");
        }
        Ok(config)
    }
}

/// Effective settings after merging flags, environment and config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store: PathBuf,
    pub namespace: String,
    pub delete_concurrency: Option<usize>,
}

impl Settings {
    pub fn resolve(cli: &crate::Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Self::merge(cli.store.clone(), cli.namespace.clone(), config)
    }

    fn merge(store: Option<PathBuf>, namespace: Option<String>, config: Config) -> Result<Self> {
        let store = store
            .or(config.store)
            .or_else(|| Config::project_dirs().map(|dirs| dirs.data_dir().join("records")))
            .context("Record store path required (--store or CHAINSWEEP_STORE)")?;

        Ok(Self {
            store,
            namespace: namespace
                .or(config.namespace)
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            delete_concurrency: config.delete_concurrency,
        })
    }
}
