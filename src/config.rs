use std::path::PathBuf;

use color_eyre::eyre::{Context, OptionExt, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    database: String,
    #[serde(default)]
    spotify: Option<SpotifyConfig>,
    #[serde(default)]
    apple_music: Option<AppleMusicConfig>,
    #[serde(default)]
    amazon_music: Option<AmazonMusicConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_spotify_api_base")]
    pub api_base: String,
    #[serde(default = "default_spotify_token_url")]
    pub token_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleMusicConfig {
    /// Pre-minted developer token. Key management happens outside this
    /// service; the adapter only consumes the token.
    pub developer_token: String,
    #[serde(default = "default_apple_storefront")]
    pub storefront: String,
    #[serde(default = "default_apple_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmazonMusicConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_amazon_api_base")]
    pub api_base: String,
    #[serde(default = "default_amazon_token_url")]
    pub token_url: String,
}

fn default_spotify_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_spotify_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_apple_storefront() -> String {
    "us".to_string()
}

fn default_apple_api_base() -> String {
    "https://api.music.apple.com/v1".to_string()
}

fn default_amazon_api_base() -> String {
    "https://api.music.amazon.dev/v1".to_string()
}

fn default_amazon_token_url() -> String {
    "https://api.amazon.com/auth/o2/token".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "~/.local/share/tunebridge/tunebridge.db".to_string(),
            spotify: None,
            apple_music: None,
            amazon_music: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("tunebridge").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or_eyre("No config directory found")?;
        Self::from_file(&config_path)
    }

    /// Create a default config file, if one doesn't exist yet
    pub fn create_default() -> Result<()> {
        let config_path = Self::config_path().ok_or_eyre("No config directory found")?;
        if config_path.exists() {
            return Ok(());
        }
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create config directory: {}",
                parent.display()
            ))?;
        }
        let contents = toml::to_string_pretty(&Config::default())
            .context("Failed to serialize default config")?;
        std::fs::write(&config_path, contents).context(format!(
            "Failed to write config file: {}",
            config_path.display()
        ))?;
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.database)
    }

    pub fn spotify(&self) -> Option<&SpotifyConfig> {
        self.spotify.as_ref()
    }

    pub fn apple_music(&self) -> Option<&AppleMusicConfig> {
        self.apple_music.as_ref()
    }

    pub fn amazon_music(&self) -> Option<&AmazonMusicConfig> {
        self.amazon_music.as_ref()
    }
}
