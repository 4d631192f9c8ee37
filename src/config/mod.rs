use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lyrics::{LyricsMode, ResolverOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub lyrics: LyricsConfig,
    pub providers: ProvidersConfig,
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LyricsFontSize {
    Light,
    #[default]
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    /// Show synchronized lyrics by default
    pub synchronized: bool,
    pub font_size: LyricsFontSize,
    /// Language code translations are requested in (e.g. "en")
    pub target_language: String,
    /// Added to the playback position before picking the active line
    pub lookahead_ms: u64,
    pub cursor_tick_ms: u64,
    pub duration_poll_ms: u64,
    /// How long a synchronized fetch waits for the track duration
    pub duration_wait_secs: u64,
    pub translation_cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub lrclib_base_url: String,
    pub translate_base_url: String,
    pub request_timeout_secs: u64,
    /// Use yt-dlp `--cookies-from-browser` (e.g. "chrome", "firefox").
    pub cookies_from_browser: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// mpv audio device name (see `mpv --audio-device=help`)
    pub audio_device: Option<String>,
    /// Volume level (0-100)
    pub volume: u8,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("lyricsync"));
        Self { data_dir }
    }
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            synchronized: false,
            font_size: LyricsFontSize::default(),
            target_language: "en".to_string(),
            lookahead_ms: 50,
            cursor_tick_ms: 50,
            duration_poll_ms: 100,
            duration_wait_secs: 10,
            translation_cache_size: 512,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            lrclib_base_url: crate::lyrics::LrclibClient::DEFAULT_BASE_URL.to_string(),
            translate_base_url: crate::lyrics::GoogleTranslator::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            cookies_from_browser: None,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_device: None,
            volume: 80,
        }
    }
}

impl LyricsConfig {
    pub fn default_mode(&self) -> LyricsMode {
        LyricsMode::from_synced_flag(self.synchronized)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            duration_poll: Duration::from_millis(self.duration_poll_ms.max(1)),
            duration_wait: Duration::from_secs(self.duration_wait_secs),
        }
    }

    pub fn cursor_tick(&self) -> Duration {
        Duration::from_millis(self.cursor_tick_ms.max(1))
    }
}

impl ProvidersConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        self.paths.data_dir.join("lyrics.sqlite3")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "lyricsync", "lyricsync")
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = project_dirs().context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

/// Load the config, writing defaults to disk on first run.
pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = Config::default();
        save(&cfg, &path)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

pub fn save(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[lyrics]
synchronized = true
font_size = "Heavy"

[player]
volume = 40
"#,
        )
        .unwrap();
        assert_eq!(cfg.lyrics.default_mode(), LyricsMode::Synchronized);
        assert_eq!(cfg.lyrics.font_size, LyricsFontSize::Heavy);
        assert_eq!(cfg.lyrics.lookahead_ms, 50);
        assert_eq!(cfg.lyrics.target_language, "en");
        assert_eq!(cfg.player.volume, 40);
        assert_eq!(cfg.providers.request_timeout_secs, 10);
    }

    #[test]
    fn test_resolver_options_from_config() {
        let lyrics = LyricsConfig {
            duration_poll_ms: 0,
            duration_wait_secs: 3,
            ..LyricsConfig::default()
        };
        let options = lyrics.resolver_options();
        assert_eq!(options.duration_poll, Duration::from_millis(1));
        assert_eq!(options.duration_wait, Duration::from_secs(3));
    }

    #[test]
    fn test_load_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let first = load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(first.lyrics.translation_cache_size, 512);

        let mut edited = first.clone();
        edited.lyrics.target_language = "de".into();
        edited.paths.data_dir = dir.path().to_path_buf();
        save(&edited, &path).unwrap();

        let second = load(Some(&path)).unwrap();
        assert_eq!(second.lyrics.target_language, "de");
        assert_eq!(second.database_path(), dir.path().join("lyrics.sqlite3"));
    }
}
