use serde::{Deserialize, Serialize};
use spaceloop_core::SessionSettings;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub synth_url: String,
    /// Handshake timeout, and how long a bounce waits for its clips.
    pub synth_timeout_ms: u64,
    pub control_rate_hz: u32,
    pub session: SessionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            synth_url: "ws://127.0.0.1:9876".to_string(),
            synth_timeout_ms: 5000,
            control_rate_hz: 60,
            session: SessionSettings::default(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("spaceloop").join("config.toml"))
    }

    /// Read the config at `path`. A missing or malformed file yields the
    /// defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                log::warn!("ignoring malformed config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        if let Ok(contents) = toml::to_string_pretty(self) {
            let _ = fs::write(path, contents);
        }
    }

    pub fn synth_timeout(&self) -> Duration {
        Duration::from_millis(self.synth_timeout_ms)
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.control_rate_hz.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaceloop_core::ImportTempo;

    #[test]
    fn test_session_table() {
        let config = Config::parse(
            r#"
            synth_url = "ws://synth.local:9000"

            [session]
            participant_id = "P21"
            import_tempo = "from_document"
            "#,
        )
        .unwrap();
        assert_eq!(config.synth_url, "ws://synth.local:9000");
        assert_eq!(config.control_rate_hz, 60);
        assert_eq!(config.session.participant_id, "P21");
        assert_eq!(config.session.import_tempo, ImportTempo::FromDocument);
        assert_eq!(config.session.initial_track_count, 2);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.control_rate_hz = 120;
        config.session.snapping = false;

        config.save(&path);
        assert_eq!(Config::load(&path), config);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "control_rate_hz = \"fast\"").unwrap();
        assert_eq!(Config::load(&path), Config::default());
        assert_eq!(Config::load(&dir.path().join("missing.toml")), Config::default());
    }
}
