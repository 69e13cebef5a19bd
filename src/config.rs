// Configuration file and default layering

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::command::Args;
use crate::error::Error;
use crate::resolve::Defaults;
use crate::store::KdfMode;

pub const DEFAULT_USES: u32 = 5;
pub const DEFAULT_DURATION: &str = "1h";
pub const DEFAULT_SERVER: &str = "127.0.0.1:8080";
pub const DEFAULT_STORE_FILE: &str = ".secrets.db";

/// Optional per-user defaults. Command-line flags override every key here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: Option<PathBuf>,
    pub server: Option<String>,
    pub ca: Option<String>,
    pub user: Option<String>,
    pub uses: Option<u32>,
    pub duration: Option<String>,
    pub labels: Option<String>,
    pub owners: Option<String>,
    pub interactive: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        Self::load_from(&Self::config_path())
    }

    /// A missing file is not an error: every key has a built-in default.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using built-in defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::ConfigParse(e.to_string()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join(".config"));
        config_dir.join("delegate").join("config.toml")
    }

    pub fn store_path(&self, args: &Args) -> PathBuf {
        args.store
            .clone()
            .or_else(|| self.store.clone())
            .unwrap_or_else(|| home_dir().join(DEFAULT_STORE_FILE))
    }

    pub fn kdf_mode(&self, args: &Args) -> KdfMode {
        let interactive = if args.interactive {
            true
        } else if args.standard {
            false
        } else {
            self.interactive.unwrap_or(false)
        };
        if interactive {
            KdfMode::Interactive
        } else {
            KdfMode::Standard
        }
    }

    /// Merge flags over config over built-ins into resolver fallbacks.
    pub fn defaults(&self, args: &Args) -> Defaults {
        let pick = |flag: &Option<String>, file: &Option<String>, builtin: &str| {
            flag.clone()
                .or_else(|| file.clone())
                .unwrap_or_else(|| builtin.to_string())
        };

        Defaults {
            user: pick(&args.user, &self.user, ""),
            server: pick(&args.server, &self.server, DEFAULT_SERVER),
            ca_file: pick(&args.ca, &self.ca, ""),
            labels_raw: pick(&args.labels, &self.labels, ""),
            owners_raw: pick(&args.owners, &self.owners, ""),
            uses: args.count.or(self.uses).unwrap_or(DEFAULT_USES),
            duration: pick(&args.duration, &self.duration, DEFAULT_DURATION),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default()
}
