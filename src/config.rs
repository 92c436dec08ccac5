// ============================================================================
// File: src/config.rs
// Configuration structures and validation
// ============================================================================

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ToolFamily;

/// Main configuration structure loaded from config.json
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Credential for the grammar tool
    #[serde(default)]
    pub grammar_api_key: String,

    /// Credential for the math tool
    #[serde(default)]
    pub math_api_key: String,

    /// Credential for music and image generation
    #[serde(default)]
    pub media_api_key: String,

    /// Base URL of the hosted inference API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model identifiers per task family
    #[serde(default)]
    pub models: ModelSet,

    /// Seconds before a model call is abandoned; 0 waits forever
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Link opened when the ad throttle fires
    #[serde(default = "default_ad_link")]
    pub ad_link: String,

    /// Whether the promotional link is opened at all
    #[serde(default = "default_true")]
    pub promotions_enabled: bool,

    /// Where the ad counter is persisted (defaults to the user data dir)
    #[serde(default)]
    pub counter_path: Option<PathBuf>,

    /// ffmpeg binary used for WAV to MP3 conversion
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
}

/// Model identifiers (e.g., "openai/gpt-4.1")
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelSet {
    #[serde(default = "default_chat_model")]
    pub grammar: String,
    #[serde(default = "default_chat_model")]
    pub math: String,
    #[serde(default = "default_music_model")]
    pub music: String,
    #[serde(default = "default_image_model")]
    pub image: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            grammar: default_chat_model(),
            math: default_chat_model(),
            music: default_music_model(),
            image: default_image_model(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grammar_api_key: String::new(),
            math_api_key: String::new(),
            media_api_key: String::new(),
            api_base_url: default_api_base_url(),
            models: ModelSet::default(),
            request_timeout_secs: default_timeout_secs(),
            ad_link: default_ad_link(),
            promotions_enabled: true,
            counter_path: None,
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.bytez.com/models/v2".to_string()
}

fn default_chat_model() -> String {
    "openai/gpt-4.1".to_string()
}

fn default_music_model() -> String {
    "facebook/musicgen-melody".to_string()
}

fn default_image_model() -> String {
    "stabilityai/stable-diffusion-xl-base-1.0".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_ad_link() -> String {
    "https://omg10.com/4/10649293".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Config {
    /// Reads `path`, or falls back to defaults when `allow_missing` is set and
    /// the file does not exist. Environment credentials always win.
    pub fn load(path: &Path, allow_missing: bool) -> Result<Self> {
        let mut config = if allow_missing && !path.exists() {
            Config::default()
        } else {
            let config_content = fs::read_to_string(path)
                .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
            serde_json::from_str(&config_content)
                .map_err(|e| anyhow!("Failed to parse config: {}", e))?
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        for (var, slot) in [
            ("CUTVERSE_GRAMMAR_API_KEY", &mut self.grammar_api_key),
            ("CUTVERSE_MATH_API_KEY", &mut self.math_api_key),
            ("CUTVERSE_MEDIA_API_KEY", &mut self.media_api_key),
        ] {
            if let Ok(value) = env::var(var) {
                if !value.trim().is_empty() {
                    *slot = value;
                }
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(anyhow!("API base URL is required"));
        }

        for (name, key) in [
            ("grammar_api_key", &self.grammar_api_key),
            ("math_api_key", &self.math_api_key),
            ("media_api_key", &self.media_api_key),
        ] {
            if key.trim().is_empty() {
                return Err(anyhow!("{} is required", name));
            }
        }

        if self.ad_link.trim().is_empty() && self.promotions_enabled {
            return Err(anyhow!("ad_link is required when promotions are enabled"));
        }

        Ok(())
    }

    pub fn api_key(&self, family: ToolFamily) -> &str {
        match family {
            ToolFamily::Grammar => &self.grammar_api_key,
            ToolFamily::Math => &self.math_api_key,
            ToolFamily::Media => &self.media_api_key,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn counter_path(&self) -> PathBuf {
        self.counter_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(env::temp_dir)
                .join("cutverse")
                .join("ad_counter.json")
        })
    }
}
