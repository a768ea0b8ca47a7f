use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::EventRecord;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("composer unavailable: {0}")]
    Unavailable(String),
    #[error("composer returned no content")]
    Empty,
}

pub trait ContentGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// OpenAI-compatible `/chat/completions` client.
pub struct LlmComposer {
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl LlmComposer {
    pub fn from_config(config: &AppConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| GenerationError::Unavailable(err.to_string()))?;
        Ok(Self {
            model: config.llm_model.clone(),
            base_url: config.llm_endpoint.clone(),
            api_key: config.llm_api_key.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            client,
        })
    }
}

impl ContentGenerator for LlmComposer {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{}/chat/completions", base);

        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": prompt,
                }
            ],
        });

        let mut request = self.client.post(url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|err| GenerationError::Unavailable(err.to_string()))?;

        let status = response.status();
        let text_body = response
            .text()
            .map_err(|err| GenerationError::Unavailable(err.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Unavailable(format!(
                "HTTP {}: {}",
                status, text_body
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&text_body)
            .map_err(|err| GenerationError::Unavailable(err.to_string()))?;
        completion_text(&value).ok_or(GenerationError::Empty)
    }
}

fn completion_text(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| {
            choice
                .get("message")
                .and_then(|message| message.get("content"))
                .or_else(|| choice.get("text"))
        })
        .and_then(|content| content.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn build_prompt(event: &EventRecord, organization: &str) -> String {
    format!(
        "Given the following event title and description, write a 300-word email inviting club members for {organization} to attend said meeting. Title: {title}, Description: {description}. Don't write a greeting or a closing remark.",
        organization = organization,
        title = event.title,
        description = event.description,
    )
}

pub fn subject_line(event: &EventRecord, offset_days: u32) -> String {
    match offset_days {
        0 => format!("Today: {}", event.title),
        1 => format!("Tomorrow: {}", event.title),
        7 => format!("Next week: {}", event.title),
        n => format!("In {n} days: {}", event.title),
    }
}

/// HTML body for the campaign: the drafted copy, the when/where lines and the
/// flier when one was uploaded.
pub fn render_body(event: &EventRecord, content: &str, flier_url: Option<&str>) -> String {
    let when = event
        .event_instant
        .format("%A, %B %-d at %-I:%M %p %Z")
        .to_string();

    let mut html = String::new();
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(&event.title)));
    for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        html.push_str(&format!(
            "<p>{}</p>\n",
            escape_html(paragraph).replace('\n', "<br>")
        ));
    }
    html.push_str(&format!("<p><strong>When:</strong> {}</p>\n", escape_html(&when)));
    if !event.location.is_empty() {
        html.push_str(&format!(
            "<p><strong>Where:</strong> {}</p>\n",
            escape_html(&event.location)
        ));
    }
    html.push_str(&format!(
        "<p><a href=\"{url}\">Event details</a></p>\n",
        url = escape_html(&event.url)
    ));
    if let Some(src) = flier_url {
        html.push_str(&format!(
            "<p><img src=\"{}\" alt=\"{}\" style=\"max-width: 100%;\"></p>\n",
            escape_html(src),
            escape_html(&event.title)
        ));
    }
    html
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventRef;
    use chrono::TimeZone;

    fn record() -> EventRecord {
        let instant = chrono_tz::America::Chicago
            .with_ymd_and_hms(2024, 3, 14, 19, 0, 0)
            .single()
            .expect("valid datetime");
        EventRecord::new(
            &EventRef::from_url("https://tulane.wavesync.io/event/18234"),
            "Demo Night".to_string(),
            "Show off <your> projects".to_string(),
            "Stanley Thomas Hall".to_string(),
            "Thursday, March 14 2024 at 7:00 PM CDT".to_string(),
            instant,
            None,
        )
    }

    #[test]
    fn prompt_mentions_title_description_and_club() {
        let prompt = build_prompt(&record(), "Tulane Cookie and Code Club");
        assert!(prompt.contains("Title: Demo Night"));
        assert!(prompt.contains("Description: Show off <your> projects"));
        assert!(prompt.contains("Tulane Cookie and Code Club"));
    }

    #[test]
    fn subject_depends_on_offset() {
        let event = record();
        assert_eq!(subject_line(&event, 0), "Today: Demo Night");
        assert_eq!(subject_line(&event, 1), "Tomorrow: Demo Night");
        assert_eq!(subject_line(&event, 7), "Next week: Demo Night");
        assert_eq!(subject_line(&event, 13), "In 13 days: Demo Night");
    }

    #[test]
    fn body_escapes_and_includes_details() {
        let body = render_body(
            &record(),
            "Come <build>.\n\nSecond paragraph",
            Some("https://cdn.example.com/f.png"),
        );
        assert!(body.contains("<p>Come &lt;build&gt;.</p>"));
        assert!(body.contains("<p>Second paragraph</p>"));
        assert!(body.contains("Thursday, March 14 at 7:00 PM CDT"));
        assert!(body.contains("Stanley Thomas Hall"));
        assert!(body.contains("<img src=\"https://cdn.example.com/f.png\""));
    }

    fn composer_at(url: &str) -> LlmComposer {
        let config = AppConfig {
            llm_endpoint: format!("{url}/v1/"),
            llm_model: "club-writer".to_string(),
            llm_api_key: Some("sk-test".to_string()),
            ..AppConfig::default()
        };
        LlmComposer::from_config(&config).expect("composer")
    }

    #[test]
    fn generate_posts_prompt_and_reads_reply() {
        let mut server = mockito::Server::new();
        let completion = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "club-writer",
                "max_tokens": 3000,
                "messages": [{ "role": "user", "content": "Write about demo night" }],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": " Bring your laptop. "}}]}"#)
            .expect(1)
            .create();

        let text = composer_at(&server.url())
            .generate("Write about demo night")
            .expect("generate");
        assert_eq!(text, "Bring your laptop.");
        completion.assert();
    }

    #[test]
    fn generate_reports_http_errors() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create();

        match composer_at(&server.url()).generate("prompt") {
            Err(GenerationError::Unavailable(reason)) => {
                assert!(reason.contains("503"));
                assert!(reason.contains("overloaded"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn generate_rejects_blank_reply() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "  "}}]}"#)
            .create();

        assert!(matches!(
            composer_at(&server.url()).generate("prompt"),
            Err(GenerationError::Empty)
        ));
    }

    #[test]
    fn reads_chat_and_completion_shapes() {
        let chat = json!({"choices": [{"message": {"content": "  Hello club  "}}]});
        assert_eq!(completion_text(&chat).as_deref(), Some("Hello club"));
        let legacy = json!({"choices": [{"text": "Legacy"}]});
        assert_eq!(completion_text(&legacy).as_deref(), Some("Legacy"));
        let empty = json!({"choices": [{"message": {"content": "   "}}]});
        assert_eq!(completion_text(&empty), None);
    }
}
