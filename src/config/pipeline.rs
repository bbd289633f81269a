// src/config/pipeline.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_TICK_INTERVAL_SECS: &str = "TICK_INTERVAL_SECS";

fn default_tick_interval_secs() -> u64 {
    600
}
fn default_classify_batch() -> usize {
    50
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_rules_path() -> PathBuf {
    PathBuf::from("config/rules.json")
}
fn default_oracle_path() -> PathBuf {
    PathBuf::from(crate::config::oracle::DEFAULT_ORACLE_CONFIG_PATH)
}

/// Tick-level knobs. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Most recent raw items considered for classification per tick.
    #[serde(default = "default_classify_batch")]
    pub classify_batch: usize,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    #[serde(default = "default_oracle_path")]
    pub oracle_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            classify_batch: default_classify_batch(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            rules_path: default_rules_path(),
            oracle_path: default_oracle_path(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&s)
    }

    /// $PIPELINE_CONFIG_PATH, else config/pipeline.toml, else defaults;
    /// then $TICK_INTERVAL_SECS overrides the interval.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_PIPELINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH));
        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        if let Some(secs) = std::env::var(ENV_TICK_INTERVAL_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            cfg.tick_interval_secs = secs;
        }
        Ok(cfg.sanitized())
    }

    fn sanitized(mut self) -> Self {
        self.tick_interval_secs = self.tick_interval_secs.max(1);
        self.classify_batch = self.classify_batch.max(1);
        if self.fetch_timeout_ms == 0 {
            self.fetch_timeout_ms = default_fetch_timeout_ms();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.tick_interval_secs, 600);
        assert_eq!(cfg.classify_batch, 50);
    }

    #[test]
    fn zero_values_are_sanitized() {
        let cfg =
            PipelineConfig::from_toml_str("tick_interval_secs = 0\nclassify_batch = 0").unwrap();
        assert_eq!(cfg.tick_interval_secs, 1);
        assert_eq!(cfg.classify_batch, 1);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_interval() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("pipeline.toml");
        std::fs::write(&p, "tick_interval_secs = 900\nclassify_batch = 10").unwrap();
        env::set_var(ENV_PIPELINE_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_TICK_INTERVAL_SECS, "30");
        let cfg = PipelineConfig::load_default().unwrap();
        env::remove_var(ENV_PIPELINE_CONFIG_PATH);
        env::remove_var(ENV_TICK_INTERVAL_SECS);
        assert_eq!(cfg.tick_interval_secs, 30);
        assert_eq!(cfg.classify_batch, 10);
    }
}
