use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub http_bind: String,
    pub majsoul_source_ws: Option<String>,
    pub reconnect_backoff_secs: u64,
    pub round_end_pause_ms: u64,
    pub analysis_retained_generations: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            http_bind: "127.0.0.1:12121".to_owned(),
            majsoul_source_ws: Some("ws://127.0.0.1:12122/majsoul".to_owned()),
            reconnect_backoff_secs: 5,
            round_end_pause_ms: 1000,
            analysis_retained_generations: 8,
        }
    }
}

impl CompanionConfig {
    pub fn load_or_create() -> Result<(Self, PathBuf)> {
        let config_dir = dirs::config_dir()
            .context("unable to locate OS config directory")?
            .join("tile-companion");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed creating config dir at {}", config_dir.display()))?;

        let config_path = config_dir.join("config.json");
        let config = Self::load_or_create_at(&config_path)?;
        Ok((config, config_path))
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default = Self::default();
            default.save(path)?;
            return Ok(default);
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        serde_json::from_str::<Self>(&text)
            .with_context(|| format!("invalid json in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).context("failed serializing config")?;
        fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        self.http_bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid http_bind {:?}", self.http_bind))
    }

    pub fn majsoul_source(&self) -> Option<&str> {
        self.majsoul_source_ws
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::CompanionConfig;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let raw = r#"{ "http_bind": "0.0.0.0:9000", "round_end_pause_ms": 0 }"#;
        let parsed: CompanionConfig = serde_json::from_str(raw).expect("config should parse");
        assert_eq!(parsed.http_bind, "0.0.0.0:9000");
        assert_eq!(parsed.round_end_pause_ms, 0);
        assert_eq!(parsed.reconnect_backoff_secs, 5);
        assert_eq!(parsed.analysis_retained_generations, 8);
        assert_eq!(parsed.majsoul_source(), Some("ws://127.0.0.1:12122/majsoul"));
    }

    #[test]
    fn blank_or_null_source_disables_the_bridge() {
        let parsed: CompanionConfig =
            serde_json::from_str(r#"{ "majsoul_source_ws": null }"#).expect("config should parse");
        assert_eq!(parsed.majsoul_source(), None);

        let parsed: CompanionConfig =
            serde_json::from_str(r#"{ "majsoul_source_ws": "  " }"#).expect("config should parse");
        assert_eq!(parsed.majsoul_source(), None);
    }

    #[test]
    fn rejects_invalid_http_bind() {
        let config = CompanionConfig {
            http_bind: "localhost".to_owned(),
            ..CompanionConfig::default()
        };
        assert!(config.http_addr().is_err());
        assert!(CompanionConfig::default().http_addr().is_ok());
    }

    #[test]
    fn creates_default_file_then_reads_it_back() {
        let dir = std::env::temp_dir().join(format!("tile-companion-config-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.json");
        let _ = fs::remove_file(&path);

        let created = CompanionConfig::load_or_create_at(&path).expect("default config");
        assert!(path.exists());

        let mut edited = created.clone();
        edited.reconnect_backoff_secs = 11;
        edited.save(&path).expect("save config");
        let reloaded = CompanionConfig::load_or_create_at(&path).expect("reload config");
        assert_eq!(reloaded.reconnect_backoff_secs, 11);
        assert_eq!(reloaded.http_bind, created.http_bind);

        let _ = fs::remove_dir_all(&dir);
    }
}
