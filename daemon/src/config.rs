//! Daemon configuration file.

use anyhow::Context;
use cpt_engine::EngineConfig;
use cpt_types::UserId;
use cpt_utils::LogFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bearer tokens accepted by the API and the user each one names.
    #[serde(default)]
    pub tokens: BTreeMap<String, UserId>,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7077))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            tokens: BTreeMap::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.bind.port(), 7077);
    }

    #[test]
    fn file_sets_tokens_and_engine_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind = "0.0.0.0:9000"
log_format = "json"

[tokens]
t-alice = "alice"

[engine]
report_threshold = 3
"#
        )
        .unwrap();

        let config = DaemonConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.tokens.get("t-alice"), Some(&UserId::new("alice")));
        assert_eq!(config.engine.report_threshold, 3);
        assert_eq!(config.engine.winner_share_bps, 7_500);
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        let err = DaemonConfig::from_toml_str("[engine]\nwinner_share_bps = 20000\n");
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = DaemonConfig::from_toml_file(Path::new("/nonexistent/cpt.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cpt.toml"));
    }

    #[test]
    fn printed_config_reads_back() {
        let mut config = DaemonConfig::default();
        config.tokens.insert("t-bob".into(), UserId::new("bob"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(DaemonConfig::from_toml_str(&text).unwrap(), config);
    }
}
