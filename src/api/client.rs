//! Authenticated HTTP client for the storefront messaging API
//!
//! Wraps reqwest::Client with bearer-token injection and normalizes every
//! record it returns.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use url::Url;

use super::{ApiError, ChatApi};
use crate::config::Config;
use crate::models::{normalize_value, Attachment, ConversationId, Draft, Message, MessageId};

/// REST client bound to one backend and operator token.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    history_limit: Option<usize>,
}

impl RestClient {
    /// Build a client from the stored configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let raw = config.base_url()?;
        let base_url = Url::parse(raw.trim())
            .with_context(|| format!("Invalid backend URL {}", raw))?;
        if base_url.cannot_be_a_base() {
            bail!("Backend URL {} cannot carry a path", raw);
        }
        if config.api_token.is_none() {
            tracing::warn!("No api token configured; requests will be unauthenticated");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: config.api_token.clone(),
            history_limit: config.history_limit,
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request_id = uuid::Uuid::new_v4().to_string();
        let builder = self
            .http
            .request(method, url)
            .header("X-Request-Id", request_id);
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder, url: &str) -> Result<reqwest::Response, ApiError> {
        let resp = builder.send().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        check_response(resp, url).await
    }

    /// Read a response body as JSON. An empty body yields `None`.
    async fn json_body(resp: reqwest::Response, url: &str) -> Result<Option<Value>, ApiError> {
        let text = resp.text().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn record(&self, builder: RequestBuilder, url: &str) -> Result<Message, ApiError> {
        let resp = self.execute(builder, url).await?;
        let body = Self::json_body(resp, url)
            .await?
            .ok_or_else(|| ApiError::Decode {
                url: url.to_string(),
                reason: "empty body".to_string(),
            })?;
        decode_record(body, url)
    }
}

#[async_trait]
impl ChatApi for RestClient {
    async fn fetch_history(&self, conversation: &ConversationId) -> Result<Vec<Message>, ApiError> {
        let mut url = messages_url(&self.base_url, conversation);
        if let Some(limit) = self.history_limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        let url = String::from(url);
        tracing::debug!("History GET {}", url);

        let resp = self.execute(self.request(Method::GET, &url), &url).await?;
        let body = Self::json_body(resp, &url).await?.unwrap_or(Value::Null);
        Ok(decode_history(body))
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        sender: &str,
        draft: &Draft,
    ) -> Result<Message, ApiError> {
        let url = String::from(messages_url(&self.base_url, conversation));
        tracing::debug!("Send POST {}", url);

        let form = draft_form(sender, draft).map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;
        let builder = self.request(Method::POST, &url).multipart(form);
        self.record(builder, &url).await
    }

    async fn edit_message(
        &self,
        id: &MessageId,
        sender: &str,
        draft: &Draft,
    ) -> Result<Message, ApiError> {
        let url = String::from(message_url(&self.base_url, id, &[]));
        tracing::debug!("Edit PUT {}", url);

        let form = draft_form(sender, draft).map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;
        let builder = self.request(Method::PUT, &url).multipart(form);
        self.record(builder, &url).await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), ApiError> {
        let url = String::from(message_url(&self.base_url, id, &[]));
        tracing::debug!("Delete {}", url);

        self.execute(self.request(Method::DELETE, &url), &url).await?;
        Ok(())
    }

    async fn acknowledge_read(&self, id: &MessageId) -> Result<Option<Message>, ApiError> {
        let url = String::from(message_url(&self.base_url, id, &["read"]));
        tracing::debug!("Read POST {}", url);

        let resp = self.execute(self.request(Method::POST, &url), &url).await?;
        match Self::json_body(resp, &url).await? {
            // Bare acknowledgements like {"ok": true} carry no record.
            Some(body) if looks_like_record(&body) => decode_record(body, &url).map(Some),
            _ => Ok(None),
        }
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = if status == StatusCode::UNAUTHORIZED {
        String::new()
    } else {
        resp.text().await.unwrap_or_default()
    };
    Err(status_error(status, url, body))
}

/// Map a non-success status to the error the caller sees.
fn status_error(status: StatusCode, url: &str, body: String) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized(url.to_string());
    }
    ApiError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    }
}

/// Append percent-encoded path segments to the backend root.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // Only fails for cannot-be-a-base URLs, which `RestClient::new` rejects.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// `{base}/api/conversations/{conversation}/messages`
fn messages_url(base: &Url, conversation: &ConversationId) -> Url {
    endpoint(base, &["api", "conversations", conversation.as_str(), "messages"])
}

/// `{base}/api/messages/{id}` plus any trailing segments.
fn message_url(base: &Url, id: &MessageId, rest: &[&str]) -> Url {
    let mut segments = vec!["api", "messages", id.as_str()];
    segments.extend_from_slice(rest);
    endpoint(base, &segments)
}

const SENDER_FIELD: &str = "sender";
const BODY_FIELD: &str = "body";
const ATTACHMENT_FIELD: &str = "attachment";

/// Text parts of a send or edit form, in order.
fn draft_fields(sender: &str, draft: &Draft) -> [(&'static str, String); 2] {
    [
        (SENDER_FIELD, sender.to_string()),
        (BODY_FIELD, draft.body.clone()),
    ]
}

fn attachment_part(attachment: &Attachment) -> Result<Part, reqwest::Error> {
    Part::bytes(attachment.bytes.clone())
        .file_name(attachment.file_name.clone())
        .mime_str(attachment.content_type)
}

fn draft_form(sender: &str, draft: &Draft) -> Result<Form, reqwest::Error> {
    let mut form = Form::new();
    for (name, value) in draft_fields(sender, draft) {
        form = form.text(name, value);
    }
    if let Some(ref attachment) = draft.attachment {
        form = form.part(ATTACHMENT_FIELD, attachment_part(attachment)?);
    }
    Ok(form)
}

/// Strip `{"message": ...}` / `{"data": ...}` envelopes.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() <= 2 => {
            for key in ["message", "data"] {
                if matches!(map.get(key), Some(Value::Object(_)) | Some(Value::Array(_))) {
                    if let Some(inner) = map.remove(key) {
                        return inner;
                    }
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn looks_like_record(value: &Value) -> bool {
    let inner = unwrap_envelope(value.clone());
    inner.get("id").is_some() || inner.get("_id").is_some()
}

fn decode_record(value: Value, url: &str) -> Result<Message, ApiError> {
    normalize_value(unwrap_envelope(value)).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// History arrives as a bare array or wrapped in `messages`/`data`.
fn decode_history(value: Value) -> Vec<Message> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("messages").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => {
                tracing::warn!("History response has no message list");
                Vec::new()
            }
        },
        Value::Null => Vec::new(),
        other => {
            tracing::warn!("Unexpected history response: {}", other);
            Vec::new()
        }
    };

    items
        .into_iter()
        .filter_map(|item| match normalize_value(item) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!("Skipping malformed history record: {}", e);
                None
            }
        })
        .collect()
}
