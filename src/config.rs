use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{history::DEFAULT_LIST_LIMIT, quality::Quality};

const APP_DIR: &str = "video-downloader";
const SETTINGS_FILE: &str = "settings.json";

/// User settings read from `<config_dir>/video-downloader/settings.json`.
/// Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial value of the download folder field
    pub download_dir: PathBuf,
    /// SQLite file holding the download history
    pub history_path: PathBuf,
    /// yt-dlp executable; a bare name is looked up on PATH
    pub ytdlp_path: PathBuf,
    /// How many history entries are listed
    pub history_limit: usize,
    /// Label of the preset selected at startup, e.g. "720p"
    pub default_quality: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let download_dir = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("./downloads"));
        let history_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("history.db");

        Self {
            download_dir,
            history_path,
            ytdlp_path: PathBuf::from(if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }),
            history_limit: DEFAULT_LIST_LIMIT,
            default_quality: Quality::default().label().to_owned(),
        }
    }
}

impl AppConfig {
    /// Loads the settings file from the platform config directory
    pub fn load() -> Self {
        match dirs::config_dir() {
            Some(dir) => Self::load_from(&dir.join(APP_DIR).join(SETTINGS_FILE)),
            None => Self::default(),
        }
    }

    /// Missing file means defaults; an unreadable one is logged and ignored
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!(path = %path.display(), %err, "could not read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(config) => {
                info!(path = %path.display(), "settings loaded");
                config
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "invalid settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn quality(&self) -> Quality {
        self.default_quality.parse().unwrap_or_else(|err| {
            warn!(%err, "falling back to default quality");
            Quality::default()
        })
    }
}
