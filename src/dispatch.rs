use std::fs;
use std::time::Duration;

use base64::{engine::general_purpose, Engine};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};
use thiserror::Error;

use crate::compose;
use crate::config::AppConfig;
use crate::models::{EventRecord, FlierRef};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing mailchimp setting: {0}")]
    MissingSetting(&'static str),
    #[error("mailchimp api key has no data center suffix")]
    MalformedKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("mailchimp api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("unable to read flier {path}: {reason}")]
    Flier { path: String, reason: String },
}

/// One reminder ready to send.
#[derive(Debug, Clone)]
pub struct Notification<'a> {
    pub event: &'a EventRecord,
    pub offset_days: u32,
    pub subject: String,
    pub content: String,
    pub flier: Option<&'a FlierRef>,
}

pub trait Dispatcher {
    /// Sends the notification to the configured recipients and returns the
    /// platform's id for the send.
    fn send(&mut self, notification: &Notification<'_>) -> Result<String, DispatchError>;
}

/// Sends each reminder as a one-off Mailchimp campaign to a single audience.
pub struct MailchimpDispatcher {
    api_key: String,
    base_url: String,
    list_id: String,
    from_name: String,
    reply_to: String,
    client: Client,
}

impl MailchimpDispatcher {
    /// Builds the client for the key's data center and verifies the key
    /// against `/ping`.
    pub fn connect(config: &AppConfig) -> Result<Self, DispatchError> {
        let api_key = required(&config.mailchimp_api_key, "mailchimp_api_key")?;
        let data_center = data_center(&api_key)?;
        let dispatcher =
            Self::connect_at(config, &format!("https://{data_center}.api.mailchimp.com/3.0"))?;
        log::info!("connected to mailchimp ({data_center})");
        Ok(dispatcher)
    }

    /// Same as [`connect`](Self::connect) against an explicit API root.
    pub fn connect_at(config: &AppConfig, base_url: &str) -> Result<Self, DispatchError> {
        let api_key = required(&config.mailchimp_api_key, "mailchimp_api_key")?;
        let list_id = required(&config.mailchimp_list_id, "mailchimp_list_id")?;
        let from_name = config
            .mailchimp_from_name
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| config.organization_name.clone());
        let reply_to = required(&config.mailchimp_reply_to, "mailchimp_reply_to")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| DispatchError::Http(err.to_string()))?;

        let dispatcher = Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            list_id,
            from_name,
            reply_to,
            client,
        };
        dispatcher.ping()?;
        Ok(dispatcher)
    }

    fn ping(&self) -> Result<(), DispatchError> {
        self.call(self.client.get(format!("{}/ping", self.base_url)))
            .map(|_| ())
    }

    fn call(&self, request: RequestBuilder) -> Result<Value, DispatchError> {
        let response = request
            .basic_auth("anystring", Some(&self.api_key))
            .send()
            .map_err(|err| DispatchError::Http(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| DispatchError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(DispatchError::Api {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| DispatchError::Http(err.to_string()))
    }

    fn upload_flier(&self, flier: &FlierRef) -> Result<String, DispatchError> {
        let bytes = fs::read(&flier.path).map_err(|err| DispatchError::Flier {
            path: flier.path.display().to_string(),
            reason: err.to_string(),
        })?;
        let name = flier
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("flier.png")
            .to_string();
        let body = self.call(
            self.client
                .post(format!("{}/file-manager/files", self.base_url))
                .json(&json!({
                    "name": name,
                    "file_data": general_purpose::STANDARD.encode(bytes),
                })),
        )?;
        string_field(&body, "full_size_url")
    }
}

impl Dispatcher for MailchimpDispatcher {
    fn send(&mut self, notification: &Notification<'_>) -> Result<String, DispatchError> {
        let flier_url = match notification.flier {
            Some(flier) => match self.upload_flier(flier) {
                Ok(url) => Some(url),
                Err(err) => {
                    log::warn!(
                        "sending {} without flier: {err}",
                        notification.event.title
                    );
                    None
                }
            },
            None => None,
        };
        let html = compose::render_body(
            notification.event,
            &notification.content,
            flier_url.as_deref(),
        );

        let campaign = self.call(
            self.client
                .post(format!("{}/campaigns", self.base_url))
                .json(&campaign_payload(
                    &self.list_id,
                    &self.from_name,
                    &self.reply_to,
                    notification,
                )),
        )?;
        let campaign_id = string_field(&campaign, "id")?;

        self.call(
            self.client
                .put(format!("{}/campaigns/{campaign_id}/content", self.base_url))
                .json(&json!({ "html": html })),
        )?;
        self.call(self.client.post(format!(
            "{}/campaigns/{campaign_id}/actions/send",
            self.base_url
        )))?;

        Ok(campaign_id)
    }
}

/// Logs what would be sent. Used for dry runs.
#[derive(Default)]
pub struct LogDispatcher {
    pub sent: Vec<String>,
}

impl Dispatcher for LogDispatcher {
    fn send(&mut self, notification: &Notification<'_>) -> Result<String, DispatchError> {
        let id = format!(
            "dry-run:{}:{}",
            notification.event.id, notification.offset_days
        );
        log::info!(
            "[dry run] would send {:?} ({} chars, flier: {})",
            notification.subject,
            notification.content.len(),
            notification
                .flier
                .map(|f| f.path.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        self.sent.push(id.clone());
        Ok(id)
    }
}

fn campaign_payload(
    list_id: &str,
    from_name: &str,
    reply_to: &str,
    notification: &Notification<'_>,
) -> Value {
    json!({
        "type": "regular",
        "recipients": { "list_id": list_id },
        "settings": {
            "subject_line": notification.subject,
            "title": format!("{} ({}d)", notification.event.title, notification.offset_days),
            "from_name": from_name,
            "reply_to": reply_to,
        },
    })
}

fn required(value: &Option<String>, key: &'static str) -> Result<String, DispatchError> {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(DispatchError::MissingSetting(key))
}

fn data_center(api_key: &str) -> Result<String, DispatchError> {
    api_key
        .rsplit_once('-')
        .map(|(_, dc)| dc.trim().to_string())
        .filter(|dc| !dc.is_empty() && dc.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or(DispatchError::MalformedKey)
}

fn string_field(body: &Value, key: &str) -> Result<String, DispatchError> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| DispatchError::Http(format!("response missing {key}")))
}
