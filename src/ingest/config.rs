// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::SourceKind;

const ENV_PATH: &str = "PIPELINE_SOURCES_PATH";

/// A source as declared in the registry file, before registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub kind: SourceKind,
    pub address: String,
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(default)]
    name: String,
    kind: String,
    #[serde(default)]
    address: String,
}

/// Load sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load sources using env var + fallbacks:
/// 1) $PIPELINE_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<Vec<SourceSpec>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("PIPELINE_SOURCES_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSpec>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<SourceSpec>> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<RawSpec>,
    }
    let v: TomlSources = toml::from_str(s)?;
    clean_list(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceSpec>> {
    let v: Vec<RawSpec> = serde_json::from_str(s)?;
    clean_list(v)
}

/// Drop entries without an address, collapse duplicate addresses (first wins),
/// default the name to the address.
fn clean_list(items: Vec<RawSpec>) -> Result<Vec<SourceSpec>> {
    let mut out: Vec<SourceSpec> = Vec::new();
    for it in items {
        let address = it.address.trim();
        if address.is_empty() || out.iter().any(|s| s.address == address) {
            continue;
        }
        let kind = SourceKind::parse(&it.kind)
            .ok_or_else(|| anyhow!("unknown source kind {:?} for {address}", it.kind))?;
        let name = match it.name.trim() {
            "" => address.to_string(),
            n => n.to_string(),
        };
        out.push(SourceSpec {
            name,
            kind,
            address: address.to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn dedup_trim_and_formats_work() {
        let toml = r#"
[[sources]]
name = " Fed "
kind = "official"
address = "https://fed.test/rss"

[[sources]]
kind = "rss"
address = ""

[[sources]]
name = "Fed again"
kind = "official"
address = "https://fed.test/rss"
"#;
        let json = r#"[{"name": "Wire", "kind": "RSS", "address": " https://wire.test/feed "}]"#;
        let toml_out = parse_toml(toml).unwrap();
        assert_eq!(
            toml_out,
            vec![SourceSpec {
                name: "Fed".into(),
                kind: SourceKind::Official,
                address: "https://fed.test/rss".into(),
            }]
        );
        let json_out = parse_json(json).unwrap();
        assert_eq!(json_out[0].kind, SourceKind::Rss);
        assert_eq!(json_out[0].address, "https://wire.test/feed");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"[{"kind": "carrier-pigeon", "address": "https://x.test"}]"#;
        assert!(parse_json(json).is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);

        let v = load_sources_default().unwrap();
        assert!(v.is_empty());

        let p_json = tmp.path().join("sources.json");
        fs::write(&p_json, r#"[{"kind": "web", "address": "https://w.test"}]"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let v2 = load_sources_default().unwrap();
        assert_eq!(v2.len(), 1);
        assert_eq!(v2[0].name, "https://w.test");
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
