//! Web API client for the `conversations.*` endpoints and private file URLs.

use super::RemoteApi;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::types::{ChannelInfo, Message, PageResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Channel types requested from `conversations.list`
const CHANNEL_TYPES: &str = "public_channel,private_channel";

/// Common envelope of every Web API response
#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

impl From<MessagesResponse> for PageResult {
    fn from(response: MessagesResponse) -> Self {
        // The remote signals the last page with an empty cursor
        let next_cursor = response
            .response_metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty());

        PageResult {
            messages: response.messages,
            next_cursor,
        }
    }
}

#[derive(Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    channels: Vec<ChannelInfo>,
}

/// [`RemoteApi`] over the Slack-style Web API
#[derive(Clone)]
pub struct SlackWebApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
    history_page_limit: u32,
}

impl SlackWebApi {
    /// Build a client from configuration
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            history_page_limit: config.history_page_limit,
        })
    }

    /// Call a Web API method and decode its payload
    async fn call<R: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<R> {
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RemoteApi {
                code: "ratelimited".to_string(),
            });
        }

        let body = response.bytes().await?;

        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(Error::Transport(format!(
                    "Malformed response from {}: {}",
                    method, e
                )));
            }
            Err(_) => {
                return Err(Error::Transport(format!(
                    "HTTP error calling {}: {}",
                    method, status
                )));
            }
        };

        if !envelope.ok {
            return Err(Error::RemoteApi {
                code: envelope.error.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        serde_json::from_slice(&body).map_err(|e| {
            Error::Transport(format!("Malformed response from {}: {}", method, e))
        })
    }
}

#[async_trait]
impl RemoteApi for SlackWebApi {
    async fn fetch_history_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<PageResult> {
        let limit = self.history_page_limit.to_string();
        let mut params = vec![
            ("channel", channel_id),
            ("include_all_metadata", "true"),
            ("limit", limit.as_str()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        if let Some(before) = before {
            params.push(("latest", before));
        }
        if let Some(after) = after {
            params.push(("oldest", after));
        }

        let response: MessagesResponse = self.call("conversations.history", &params).await?;
        Ok(response.into())
    }

    async fn fetch_replies_page(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<PageResult> {
        let mut params = vec![("channel", channel_id), ("ts", thread_ts)];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let response: MessagesResponse = self.call("conversations.replies", &params).await?;
        Ok(response.into())
    }

    async fn fetch_file_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RemoteApi {
                code: "ratelimited".to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::RemoteApi {
                code: format!("http_{}", status.as_u16()),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let response: ChannelsResponse = self
            .call(
                "conversations.list",
                &[("limit", "999"), ("types", CHANNEL_TYPES)],
            )
            .await?;
        Ok(response.channels)
    }

    fn name(&self) -> &'static str {
        "slack-web-api"
    }
}
