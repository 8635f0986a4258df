//! HTTP client for the external chat service
//!
//! Two endpoints: `POST {base}/api/v1/chats` creates a chat and returns its
//! id; `POST {base}/api/v1/chats/{id}/messages` sends a prompt and returns
//! the model's reply.

use crate::capability::CapabilityError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: HTTP {status} - {body}")]
    Server {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("empty response")]
    EmptyResponse,
}

impl From<ChatError> for CapabilityError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Http(e) if e.is_timeout() => CapabilityError::Timeout,
            ChatError::Http(e) if e.is_decode() => CapabilityError::Malformed(e.to_string()),
            ChatError::Http(e) => CapabilityError::unavailable(e.to_string()),
            ChatError::Server {
                status,
                body,
                retry_after,
            } => {
                if status == StatusCode::TOO_MANY_REQUESTS.as_u16() || status >= 500 {
                    CapabilityError::Unavailable {
                        message: format!("HTTP {status}: {body}"),
                        retry_after,
                    }
                } else {
                    CapabilityError::Rejected {
                        status,
                        message: body,
                    }
                }
            }
            ChatError::EmptyResponse => CapabilityError::Malformed("empty response".to_string()),
        }
    }
}

#[derive(Serialize)]
struct CreateChatRequest<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
struct CreateChatResponse {
    id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatClient {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_chat(&self, title: &str) -> Result<String, ChatError> {
        let url = format!("{}/api/v1/chats", self.base_url);
        let response: CreateChatResponse =
            self.post_json(&url, &CreateChatRequest { title }).await?;
        if response.id.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(response.id)
    }

    pub async fn send_message(&self, chat_id: &str, message: &str) -> Result<String, ChatError> {
        let url = format!("{}/api/v1/chats/{chat_id}/messages", self.base_url);
        let response: SendMessageResponse =
            self.post_json(&url, &SendMessageRequest { message }).await?;
        match response.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(ChatError::EmptyResponse),
        }
    }

    /// One-shot exchange: open a chat titled `title` and send `message`.
    pub async fn ask(&self, title: &str, message: &str) -> Result<String, ChatError> {
        let chat_id = self.create_chat(title).await?;
        self.send_message(&chat_id, message).await
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ChatError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Server {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        Ok(response.json().await?)
    }
}
