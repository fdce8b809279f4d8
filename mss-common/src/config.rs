//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MSS_ROOT_FOLDER`, then `MSS_ROOT`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: a warning is logged
//! and defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "mss.db";

/// Default listen address for the intake service
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5790";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub bind_addr: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

/// `[logging]` section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[intake]` section of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Overrides the `intake_bind_addr` database setting
    #[serde(default)]
    pub bind_addr: Option<String>,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
}

/// Resolves the root folder holding `mss.db`
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_config: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_config: None,
        }
    }

    /// Supply the `--root-folder` argument, if one was given
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Use an already loaded TOML config instead of reading the default file
    pub fn with_toml_config(mut self, config: TomlConfig) -> Self {
        self.toml_config = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        // Priority 2: Environment variables
        for var in ["MSS_ROOT_FOLDER", "MSS_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    debug!(module = %self.module_name, var, "Root folder from environment");
                    return PathBuf::from(path);
                }
            }
        }

        // Priority 3: TOML config file
        let toml_root = match &self.toml_config {
            Some(config) => config.root_folder.clone(),
            None => load_default_toml_config().root_folder,
        };
        if let Some(path) = toml_root {
            debug!(module = %self.module_name, "Root folder from TOML config");
            return path;
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder).map_err(|e| {
            Error::Config(format!(
                "Failed to create root folder {}: {}",
                self.root_folder.display(),
                e
            ))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Platform config file location, if one exists
///
/// Linux checks `~/.config/mss/config.toml` then `/etc/mss/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mss").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mss/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the platform config file, falling back to defaults
pub fn load_default_toml_config() -> TomlConfig {
    let Some(path) = config_file_path() else {
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring config file: {}", e);
            TomlConfig::default()
        }
    }
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/mss (or /var/lib/mss for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("mss"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mss"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mss"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mss"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mss"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mss"))
    } else {
        PathBuf::from("./mss_data")
    }
}
