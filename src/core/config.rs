// src/core/config.rs

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILENAME, FALLBACK_SHELL, PREFERRED_SHELL, STRICT_PREFIX};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};
use thiserror::Error;

lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<Arc<Config>> = RwLock::new(Arc::new(Config::detect()));
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// How commands are run: which shell, what goes in front of every command, and
/// whether commands and their output are echoed.
///
/// An [`Executor`](crate::system::executor::Executor) captures one of these when it is
/// built. The process-wide default is detected once and can be swapped with
/// [`Config::set_global`]; promises already created keep the config they started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub shell: PathBuf,
    pub prefix: String,
    pub verbose: bool,
}

impl Config {
    /// Locates `bash` on `PATH`. With bash, every command runs in strict mode
    /// (`errexit`, `nounset`, `pipefail`); without it, `/bin/sh` runs commands as-is.
    pub fn detect() -> Self {
        match which::which(PREFERRED_SHELL) {
            Ok(shell) => {
                log::debug!("Using shell '{}'", shell.display());
                Self {
                    shell,
                    prefix: STRICT_PREFIX.to_string(),
                    verbose: true,
                }
            }
            Err(e) => {
                log::warn!("{PREFERRED_SHELL} not found ({e}); falling back to {FALLBACK_SHELL}");
                Self {
                    shell: PathBuf::from(FALLBACK_SHELL),
                    prefix: String::new(),
                    verbose: true,
                }
            }
        }
    }

    /// The current process-wide default.
    pub fn global() -> Arc<Self> {
        GLOBAL_CONFIG
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the process-wide default used by `sh!`, `tx!` and `retry!`.
    pub fn set_global(config: Self) {
        *GLOBAL_CONFIG.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Overlays the keys present in a config file.
    pub fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(shell) = file.shell {
            self.shell = shell;
        }
        if let Some(prefix) = file.prefix {
            self.prefix = prefix;
        }
        if let Some(verbose) = file.verbose {
            self.verbose = verbose;
        }
        self
    }

    /// The full line handed to the shell's `-c`.
    pub fn script_for(&self, command: &str) -> String {
        format!("{}{}", self.prefix, command)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::detect()
    }
}

/// The optional user configuration file. Every key is optional.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub shell: Option<PathBuf>,
    pub prefix: Option<String>,
    pub verbose: Option<bool>,
}

/// Returns the path of the user config file (`~/.config/tx/config.toml`).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
}

/// Loads a config file. A missing file is not an error.
pub fn load_config_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    if !path.exists() {
        log::debug!("No config file at '{}'", path.display());
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let file = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(file))
}
