// src/config/oracle.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_ORACLE_CONFIG_PATH: &str = "config/oracle.json";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_timeout_ms() -> u64 {
    8_000
}
fn default_daily_limit() -> u32 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openai" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// "ENV" means: read from ORACLE_API_KEY
    #[serde(default)]
    pub api_key: String,
    /// Per-call deadline; the classifier falls back to rules past it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
            daily_limit: default_daily_limit(),
        }
    }
}

impl OracleConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: OracleConfig = serde_json::from_str(&data)?;

        // Normalize provider
        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = env::var("ORACLE_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing ORACLE_API_KEY env var"))?;
        }

        // Sanitize timeout: zero would fail every call, unbounded is not allowed
        if cfg.timeout_ms == 0 || cfg.timeout_ms > 60_000 {
            cfg.timeout_ms = default_timeout_ms();
        }

        Ok(cfg)
    }

    /// Like `load_from_file` but a missing or broken file yields the disabled default.
    pub fn load_or_disabled<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::debug!(target: "pipeline", error = %e, "oracle config unavailable, rules only");
                Self::default()
            }
        }
    }
}
