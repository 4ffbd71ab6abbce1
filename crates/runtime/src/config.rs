//! Engine configuration (SPEC_FULL.md "Configuration").
//!
//! Loaded from an optional `ria.toml` next to the host application, with
//! field-by-field environment overrides. Defaults match the constants the
//! HTTP built-ins need regardless of whether a config file exists at all.

use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str = "ria-runtime/0.1";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub http_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub temp_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl EngineConfig {
    /// Load `ria.toml` if present at `path`, then apply `RIA_*` environment
    /// overrides on top. Never fails on a missing file; a malformed one is
    /// an error, since the host asked for it explicitly.
    pub fn load(path: &Path) -> Result<Self, String> {
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
            toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))?
        } else {
            EngineConfig::default()
        };
        cfg.apply_env_overrides();
        cfg.normalise();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RIA_HTTP_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.http_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("RIA_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse() {
                self.max_body_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("RIA_USER_AGENT") {
            self.user_agent = v;
        }
        if let Ok(v) = std::env::var("RIA_TEMP_DIR") {
            self.temp_dir = PathBuf::from(v);
        }
    }

    /// `init(tempdir)`'s trailing path separator is normalised in (spec §6).
    fn normalise(&mut self) {
        let s = self.temp_dir.to_string_lossy().trim_end_matches(['/', '\\']).to_string();
        self.temp_dir = PathBuf::from(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_http_builtin_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/ria.toml")).unwrap();
        assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
    }
}
