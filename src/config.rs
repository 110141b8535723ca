use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// The Flask development server's default address.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

const DEFAULT_BOT_NAME: &str = "暖心";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub server_url: Option<String>,
    pub bot_name: Option<String>,
    /// Playback volume for voice replies, 0.0 to 1.0.
    pub volume: Option<f32>,
    /// Style **bold** markup in replies instead of showing it literally.
    pub render_markdown: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            server_url: None,
            bot_name: None,
            volume: None,
            render_markdown: None,
        }
    }

    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub fn bot_name(&self) -> &str {
        self.bot_name.as_deref().unwrap_or(DEFAULT_BOT_NAME)
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    pub fn render_markdown(&self) -> bool {
        self.render_markdown.unwrap_or(false)
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// A missing file means defaults; an unreadable or malformed one is an
    /// error, so the caller can tell the user before falling back.
    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    pub fn save_server_url(url: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.server_url = Some(url.to_string());
        config.save()
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("soulmate").join("config.json"))
    }
}
