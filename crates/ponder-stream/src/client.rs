//! Chat backend HTTP client

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, de::DeserializeOwned};
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    types::{ChatRequest, Conversation, ConversationId, ConversationRecord},
};

/// Default backend address
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Raw response body of a chat dispatch
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Sends a chat message and returns the raw event stream
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// Client for the chat backend REST API
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl BackendClient {
    /// Create a client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "server url must start with http:// or https://, got '{}'",
                base_url
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// List all conversations
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let response = self.client.get(self.url("/api/conversations")).send().await?;
        let records: Vec<ConversationRecord> = read_json(response).await?;
        Ok(records.into_iter().map(Conversation::from).collect())
    }

    /// Create an empty conversation
    pub async fn create_conversation(&self) -> Result<Conversation> {
        let response = self
            .client
            .post(self.url("/api/conversations"))
            .send()
            .await?;
        let record: ConversationRecord = read_json(response).await?;
        Ok(record.into())
    }

    /// Delete a conversation
    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/conversations/{}", id)))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// List model identifiers offered by the backend
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.get_json("/api/models").await
    }

    /// List models that stream reasoning
    pub async fn thinking_models(&self) -> Result<Vec<String>> {
        self.get_json("/api/thinking_models").await
    }

    /// The backend's default model
    pub async fn default_model(&self) -> Result<String> {
        self.get_json("/api/default_model").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl Dispatcher for BackendClient {
    async fn dispatch(&self, request: &ChatRequest) -> Result<ByteStream> {
        tracing::debug!(
            "Dispatching chat to {} (model: {}, thinking: {}, search: {})",
            request.conversation_id,
            request.model_name,
            request.deep_thinking,
            request.web_search
        );

        let response = self
            .client
            .post(self.url("/api/chat"))
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(Error::from)),
        ))
    }
}

/// Turn a non-success response into an API error, unwrapping the backend's
/// `{"error": "..."}` body when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

/// Read a successful response body as JSON.
///
/// A body that doesn't match the expected shape is `Error::Json`, not a
/// transport error.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = check_status(response).await?.bytes().await?;
    decode_body(&body)
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}
