//! Wire types and transport for the Responses-style scoring endpoint.
//!
//! The endpoint is a contract with an external party, so everything here is
//! deliberately tolerant on the way in: a reply may carry a consolidated
//! `output_text` field or only a list of content blocks, and error bodies are
//! classified by message text because that is the only stable signal the
//! endpoint gives for "wrong content tag" and "unsupported format hint".

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Tag identifying a text content block in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTag {
    #[default]
    InputText,
    Text,
}

impl ContentTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentTag::InputText => "input_text",
            ContentTag::Text => "text",
        }
    }

    /// The other accepted tag.
    pub fn flipped(self) -> Self {
        match self {
            ContentTag::InputText => ContentTag::Text,
            ContentTag::Text => ContentTag::InputText,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub tag: ContentTag,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl InputMessage {
    pub fn new(role: Role, tag: ContentTag, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock {
                tag,
                text: text.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOptions {
    pub format: TextFormat,
}

impl TextOptions {
    pub fn json_object() -> Self {
        Self {
            format: TextFormat {
                kind: "json_object".to_string(),
            },
        }
    }
}

/// Body of `POST /responses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
    /// Structured-output hint; omitted when the endpoint refused it.
    #[serde(rename = "text", default, skip_serializing_if = "Option::is_none")]
    pub text_options: Option<TextOptions>,
}

impl ResponsesRequest {
    /// The content tag every block of this request carries.
    pub fn content_tag(&self) -> Option<ContentTag> {
        self.input
            .first()
            .and_then(|m| m.content.first())
            .map(|b| b.tag)
    }

    pub fn requests_json(&self) -> bool {
        self.text_options.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

/// The subset of a Responses reply the scorer reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsesReply {
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

impl ResponsesReply {
    /// A reply carrying a consolidated `output_text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            output_text: Some(text.into()),
            output: Vec::new(),
        }
    }

    /// The textual output: `output_text` if non-empty, else the concatenated
    /// `output_text` content blocks.
    pub fn text(&self) -> Option<String> {
        if let Some(t) = self.output_text.as_deref().filter(|t| !t.is_empty()) {
            return Some(t.to_string());
        }
        let joined: String = self
            .output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect();
        (!joined.is_empty()).then_some(joined)
    }
}

/// Something that can submit a [`ResponsesRequest`].
///
/// [`HttpTransport`] talks to a real endpoint; tests substitute stubs.
#[async_trait]
pub trait ResponsesTransport: Send + Sync {
    async fn create(&self, request: &ResponsesRequest) -> Result<ResponsesReply, TransportError>;
}

/// Map an endpoint error onto a [`TransportError`].
///
/// Content-tag rejections name the offending field path
/// (`input[0].content[0].type`) and usually quote the tag that was refused.
pub fn classify_api_error(status: u16, message: &str) -> TransportError {
    let lowered = message.to_lowercase();

    if lowered.contains("content[0].type") {
        return TransportError::ContentTagRejected {
            rejected: rejected_tag(&lowered),
            message: message.to_string(),
        };
    }

    if lowered.contains("response_format") || lowered.contains("text.format") {
        return TransportError::ResponseFormatUnsupported {
            message: message.to_string(),
        };
    }

    match status {
        401 | 403 => TransportError::Auth {
            status,
            message: message.to_string(),
        },
        429 => TransportError::RateLimited {
            retry_after_secs: None,
        },
        _ => TransportError::Api {
            status,
            message: message.to_string(),
        },
    }
}

fn parse_tag(token: &str) -> Option<ContentTag> {
    match token {
        "input_text" => Some(ContentTag::InputText),
        "text" => Some(ContentTag::Text),
        _ => None,
    }
}

/// The tag a rejection refers to, from an already lowercased message.
///
/// The refused value is the first quoted token after "invalid value"; the
/// rest of the message may list the supported tags. Without that marker a
/// tag counts only when it is the single one mentioned.
fn rejected_tag(lowered: &str) -> Option<ContentTag> {
    if let Some(idx) = lowered.find("invalid value") {
        let rest = &lowered[idx..];
        let quoted = rest
            .split_once('\'')
            .and_then(|(_, tail)| tail.split_once('\''))
            .map(|(token, _)| token);
        if let Some(tag) = quoted.and_then(parse_tag) {
            return Some(tag);
        }
    }

    match (lowered.contains("'input_text'"), lowered.contains("'text'")) {
        (true, false) => Some(ContentTag::InputText),
        (false, true) => Some(ContentTag::Text),
        _ => None,
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    param: Option<String>,
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match env.error.param {
            Some(param) if !env.error.message.contains(&param) => {
                format!("{} (param: {})", env.error.message, param)
            }
            _ => env.error.message,
        },
        Err(_) => body.trim().to_string(),
    }
}

/// reqwest-backed transport for `POST {base_url}/responses`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/responses", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ResponsesTransport for HttpTransport {
    async fn create(&self, request: &ResponsesRequest) -> Result<ResponsesReply, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(TransportError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                TransportError::Http(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(classify_api_error(status.as_u16(), &error_message(&body)));
        }

        debug!("Responses reply: {} bytes", body.len());
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialises_with_type_tags_and_format_hint() {
        let req = ResponsesRequest {
            model: "gpt-4.1-mini".into(),
            input: vec![
                InputMessage::new(Role::System, ContentTag::InputText, "rubric"),
                InputMessage::new(Role::User, ContentTag::InputText, "{}"),
            ],
            text_options: Some(TextOptions::json_object()),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["input"][0]["role"], "system");
        assert_eq!(v["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(v["input"][1]["role"], "user");
        assert_eq!(v["text"]["format"]["type"], "json_object");
    }

    #[test]
    fn request_without_hint_omits_text_field() {
        let req = ResponsesRequest {
            model: "m".into(),
            input: vec![InputMessage::new(Role::User, ContentTag::Text, "x")],
            text_options: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("text").is_none());
        assert_eq!(v["input"][0]["content"][0]["type"], "text");
        assert_eq!(req.content_tag(), Some(ContentTag::Text));
    }

    #[test]
    fn reply_prefers_output_text() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "output_text": "{\"a\":1}",
            "output": [{"content": [{"type": "output_text", "text": "ignored"}]}]
        }))
        .unwrap();
        assert_eq!(reply.text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn reply_concatenates_output_blocks() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"points\":"},
                    {"type": "refusal", "text": "nope"},
                    {"type": "output_text", "text": " 5}"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(reply.text().as_deref(), Some("{\"points\": 5}"));
    }

    #[test]
    fn empty_reply_has_no_text() {
        assert_eq!(ResponsesReply::default().text(), None);
        assert_eq!(ResponsesReply::from_text("").text(), None);
    }

    #[test]
    fn classifies_content_tag_rejections() {
        let e = classify_api_error(
            400,
            "Invalid value: 'input_text'. Supported values are: 'text' for input[0].content[0].type",
        );
        assert!(matches!(
            e,
            TransportError::ContentTagRejected {
                rejected: Some(ContentTag::InputText),
                ..
            }
        ));

        let e = classify_api_error(400, "Invalid value 'text' at input[0].content[0].type");
        assert!(matches!(
            e,
            TransportError::ContentTagRejected {
                rejected: Some(ContentTag::Text),
                ..
            }
        ));

        let e = classify_api_error(400, "bad input[0].content[0].type");
        assert!(matches!(
            e,
            TransportError::ContentTagRejected { rejected: None, .. }
        ));
    }

    #[test]
    fn refused_tag_wins_over_supported_list() {
        let e = classify_api_error(
            400,
            "Invalid value: 'text'. Supported values are: 'input_text', 'input_image', \
             and 'input_file'. (param: input[0].content[0].type)",
        );
        assert!(matches!(
            e,
            TransportError::ContentTagRejected {
                rejected: Some(ContentTag::Text),
                ..
            }
        ));

        // Both tags mentioned, neither marked as the refused one.
        let e = classify_api_error(400, "expected 'text' or 'input_text' at input[0].content[0].type");
        assert!(matches!(
            e,
            TransportError::ContentTagRejected { rejected: None, .. }
        ));
    }

    #[test]
    fn classifies_format_hint_and_status_errors() {
        assert!(matches!(
            classify_api_error(400, "Unsupported parameter: 'text.format'"),
            TransportError::ResponseFormatUnsupported { .. }
        ));
        assert!(matches!(
            classify_api_error(401, "Incorrect API key"),
            TransportError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            classify_api_error(500, "server exploded"),
            TransportError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn error_message_appends_param() {
        let body = r#"{"error": {"message": "Invalid value: 'input_text'.", "param": "input[0].content[0].type"}}"#;
        let msg = error_message(body);
        assert!(msg.contains("input[0].content[0].type"));
        assert!(matches!(
            classify_api_error(400, &msg),
            TransportError::ContentTagRejected {
                rejected: Some(ContentTag::InputText),
                ..
            }
        ));
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }

    #[test]
    fn transport_url_is_normalised() {
        let t = HttpTransport::new("https://api.example.com/v1/", "k", 5).unwrap();
        assert_eq!(t.url(), "https://api.example.com/v1/responses");
    }

    #[test]
    fn tags_flip() {
        assert_eq!(ContentTag::InputText.flipped(), ContentTag::Text);
        assert_eq!(ContentTag::Text.flipped(), ContentTag::InputText);
        assert_eq!(ContentTag::default(), ContentTag::InputText);
    }
}
