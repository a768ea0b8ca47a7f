use std::{fs, path::Path, path::PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::ReminderOffsets;
use crate::utils;

const DEFAULT_LISTING_URL: &str = "https://tulane.wavesync.io/org/cookie-and-code-club/events";
const DEFAULT_VENUE_TIMEZONE: &str = "America/Chicago";
const DEFAULT_ORGANIZATION: &str = "Tulane Cookie and Code Club";
const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.5;
const DEFAULT_LLM_MAX_TOKENS: u32 = 3000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("invalid config {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listing_url: String,
    pub venue_timezone: String,
    pub reminder_offsets: Vec<u32>,
    pub flier_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub organization_name: String,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub mailchimp_api_key: Option<String>,
    pub mailchimp_list_id: Option<String>,
    pub mailchimp_from_name: Option<String>,
    pub mailchimp_reply_to: Option<String>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            venue_timezone: DEFAULT_VENUE_TIMEZONE.to_string(),
            reminder_offsets: ReminderOffsets::default().iter().collect(),
            flier_dir: None,
            database_path: None,
            organization_name: DEFAULT_ORGANIZATION.to_string(),
            llm_endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_temperature: DEFAULT_LLM_TEMPERATURE,
            llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
            mailchimp_api_key: None,
            mailchimp_list_id: None,
            mailchimp_from_name: None,
            mailchimp_reply_to: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `path` (or the default config location) and applies environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(utils::config_path);
        let mut config = read_config(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("LISTING_URL") {
            self.listing_url = v;
        }
        if let Some(v) = get("VENUE_TIMEZONE") {
            self.venue_timezone = v;
        }
        if let Some(v) = get("REMINDER_OFFSETS") {
            self.reminder_offsets = parse_offsets(&v)?;
        }
        if let Some(v) = get("FLIER_DIR") {
            self.flier_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ORGANIZATION_NAME") {
            self.organization_name = v;
        }
        if let Some(v) = get("LLM_ENDPOINT") {
            self.llm_endpoint = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.llm_api_key = Some(v);
        }
        if let Some(v) = get("LLM_TEMPERATURE") {
            self.llm_temperature = v.parse().map_err(|err: std::num::ParseFloatError| {
                ConfigError::Invalid {
                    key: "LLM_TEMPERATURE",
                    reason: err.to_string(),
                }
            })?;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            self.llm_max_tokens = v.parse().map_err(|err: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "LLM_MAX_TOKENS",
                    reason: err.to_string(),
                }
            })?;
        }
        if let Some(v) = get("MAILCHIMP_API_KEY") {
            self.mailchimp_api_key = Some(v);
        }
        if let Some(v) = get("MAILCHIMP_LIST_ID") {
            self.mailchimp_list_id = Some(v);
        }
        if let Some(v) = get("MAILCHIMP_FROM_NAME") {
            self.mailchimp_from_name = Some(v);
        }
        if let Some(v) = get("MAILCHIMP_REPLY_TO") {
            self.mailchimp_reply_to = Some(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.listing_url).map_err(|err| ConfigError::Invalid {
            key: "listing_url",
            reason: err.to_string(),
        })?;
        self.venue_tz()?;
        if self.reminder_offsets.is_empty() {
            return Err(ConfigError::Invalid {
                key: "reminder_offsets",
                reason: "at least one offset is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn venue_tz(&self) -> Result<Tz, ConfigError> {
        self.venue_timezone
            .parse::<Tz>()
            .map_err(|err| ConfigError::Invalid {
                key: "venue_timezone",
                reason: err.to_string(),
            })
    }

    pub fn offsets(&self) -> ReminderOffsets {
        ReminderOffsets::new(self.reminder_offsets.iter().copied())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }

    pub fn flier_dir(&self) -> PathBuf {
        self.flier_dir.clone().unwrap_or_else(utils::flier_dir)
    }
}

fn parse_offsets(text: &str) -> Result<Vec<u32>, ConfigError> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>().map_err(|err| ConfigError::Invalid {
                key: "REMINDER_OFFSETS",
                reason: format!("{part:?}: {err}"),
            })
        })
        .collect()
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
