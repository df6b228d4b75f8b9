//! On-disk layout and `config.toml` settings.
//!
//! ```text
//! $CADENCE_DATA_DIR (or ~/.cadence)/
//! ├── cadence.db
//! └── config.toml   (optional)
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};

use cadence_core::{DEFAULT_DUE_LIMIT, SchedulingStrategy};

use crate::error::Result;
use crate::store::Store;

pub const DATA_DIR_ENV: &str = "CADENCE_DATA_DIR";
pub const DB_FILE: &str = "cadence.db";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub strategy: SchedulingStrategy,
    /// Default cap on due-queue length.
    pub due_limit: usize,
    /// Default calendar window, in days from today.
    pub calendar_days: i64,
    /// Extra attempts after a version conflict before giving up.
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::Additive,
            due_limit: DEFAULT_DUE_LIMIT,
            calendar_days: 7,
            max_retries: 3,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read `config.toml` under `base`. A missing file yields the defaults;
    /// a malformed one is an error.
    pub fn load(base: &Path) -> Result<Self> {
        let path = base.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let config = Self::from_toml(&content)?;
                tracing::debug!(path = %path.display(), ?config, "loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// `$CADENCE_DATA_DIR`, else `~/.cadence`.
pub fn default_base_dir() -> PathBuf {
    env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| dirs_home().join(".cadence"))
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// A store and its settings, opened from one base directory.
pub struct Workspace {
    pub base: PathBuf,
    pub config: Config,
    pub store: Store,
}

impl Workspace {
    /// Open (creating directories as needed) under `base_dir`, or the default base.
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        fs::create_dir_all(&base)?;

        let config = Config::load(&base)?;
        let store = Store::open(&base.join(DB_FILE))?;
        tracing::info!(base = %base.display(), strategy = %config.strategy, "opened cadence store");

        Ok(Self {
            base,
            config,
            store,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.base.join(DB_FILE)
    }
}
