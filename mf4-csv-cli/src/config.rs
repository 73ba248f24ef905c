//! Configuration loading and parsing

use anyhow::{Context, Result};
use mf4_csv_core::{ConverterConfig, ProfileRule, ProfileTable, TimestampLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Replaces the built-in profile table when present
    #[serde(default)]
    pub profiles: Option<Vec<ProfileRule>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PathsConfig {
    pub input_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_corruption_window")]
    pub corruption_window_secs: i64,
    #[serde(default = "default_retention_window")]
    pub retention_window_secs: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            corruption_window_secs: default_corruption_window(),
            retention_window_secs: default_retention_window(),
        }
    }
}

fn default_corruption_window() -> i64 {
    86_400
}

fn default_retention_window() -> i64 {
    20 * 86_400
}

impl AppConfig {
    /// Build the library configuration
    pub fn converter_config(&self) -> Result<ConverterConfig> {
        let limits = TimestampLimits::from_secs(
            self.limits.corruption_window_secs,
            self.limits.retention_window_secs,
        )
        .context("Invalid [limits] section")?;

        let profiles = match &self.profiles {
            Some(rules) => rules.iter().fold(ProfileTable::new(), |table, rule| {
                table.with_rule(rule.fragment.clone(), rule.cadence, rule.strategy)
            }),
            None => ProfileTable::default(),
        };

        Ok(ConverterConfig::new()
            .with_profiles(profiles)
            .with_limits(limits))
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if matches!(&config.profiles, Some(rules) if rules.is_empty()) {
        anyhow::bail!("Config file {:?} defines an empty profile table", path);
    }

    Ok(config)
}
