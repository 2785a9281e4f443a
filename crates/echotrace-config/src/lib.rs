// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://echotrace.db".to_string(),
            pool_max_size: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// What a scan does after a song matched an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Stop comparing the song after its first match.
    #[default]
    FirstMatch,
    /// Compare the song against every indexed song.
    AllMatches,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Minimum score for a pair to be reported as duplicates.
    pub match_threshold: f64,
    /// Minimum score for a pair to be stored as a similarity edge.
    pub store_threshold: f64,
    /// Offset window (frames) for library scans.
    pub scan_max_offset: u32,
    /// Offset window (frames) for ad hoc comparisons.
    pub compare_max_offset: u32,
    /// Number of stored edges between store commits.
    pub commit_every: usize,
    pub match_policy: MatchPolicy,
    /// Align each song against the index on the rayon pool.
    pub parallel: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.8,
            store_threshold: 0.55,
            scan_max_offset: 60,
            compare_max_offset: 120,
            commit_every: 1,
            match_policy: MatchPolicy::FirstMatch,
            parallel: false,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("match_threshold", self.match_threshold),
            ("store_threshold", self.store_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("similarity.{name} must be within [0, 1], got {value}");
            }
        }
        if self.scan_max_offset == 0 || self.compare_max_offset == 0 {
            bail!("similarity offset windows must be at least 1 frame");
        }
        if self.commit_every == 0 {
            bail!("similarity.commit_every must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    pub similarity: SimilarityConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: ECHOTRACE_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("ECHOTRACE_").split("__"));

    let config: AppConfig = figment.extract()?;
    config.similarity.validate()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}
