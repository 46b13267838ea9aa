//! Explorer configuration.
//!
//! Loaded from `config.toml` in the platform config directory
//! (`directories::ProjectDirs`), every field falling back to its default.
//!
//! ```toml
//! preload_categories = true
//! max_concurrent_preloads = 8
//! streaming_loads = false
//! log_filter = "cloudtree=debug"
//!
//! [[categories]]
//! label = "Key Vaults"
//! resource_type = "Microsoft.KeyVault/vaults"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// One category node created under every resource group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub label: String,
    pub resource_type: String,
}

impl CategoryConfig {
    pub fn new(label: &str, resource_type: &str) -> Self {
        Self {
            label: label.to_string(),
            resource_type: resource_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Load a resource group's categories in the background once it is expanded
    pub preload_categories: bool,
    /// Upper bound on category loads running at once inside one fan-out
    pub max_concurrent_preloads: usize,
    /// Insert children one by one as they arrive instead of sort-then-append
    pub streaming_loads: bool,
    pub log_filter: String,
    /// Must stay the last field: serialized as TOML tables
    pub categories: Vec<CategoryConfig>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            preload_categories: true,
            max_concurrent_preloads: 8,
            streaming_loads: false,
            log_filter: "cloudtree=info".to_string(),
            categories: default_categories(),
        }
    }
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::new("Virtual Machines", "Microsoft.Compute/virtualMachines"),
        CategoryConfig::new("Storage Accounts", "Microsoft.Storage/storageAccounts"),
        CategoryConfig::new("Web Apps", "Microsoft.Web/sites"),
        CategoryConfig::new("Key Vaults", "Microsoft.KeyVault/vaults"),
        CategoryConfig::new("SQL Servers", "Microsoft.Sql/servers"),
        CategoryConfig::new("Virtual Networks", "Microsoft.Network/virtualNetworks"),
    ]
}

impl ExplorerConfig {
    /// Default location of the config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "", "cloudtree")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, or defaults when no file exists.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ExplorerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        log_info!("Loaded config from {}", path.display());
        Ok(config.normalized())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    fn normalized(mut self) -> Self {
        if self.max_concurrent_preloads == 0 {
            self.max_concurrent_preloads = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "streaming_loads = true\nmax_concurrent_preloads = 0\n").unwrap();

        let config = ExplorerConfig::load_from_path(&path).unwrap();
        assert!(config.streaming_loads);
        assert!(config.preload_categories);
        assert_eq!(config.max_concurrent_preloads, 1);
        assert_eq!(config.categories, default_categories());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ExplorerConfig {
            categories: vec![CategoryConfig::new("Vaults", "Microsoft.KeyVault/vaults")],
            log_filter: "cloudtree=debug".to_string(),
            ..Default::default()
        };

        config.save_to_path(&path).unwrap();
        assert_eq!(ExplorerConfig::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "preload_categories = \"maybe\"").unwrap();

        let err = ExplorerConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
