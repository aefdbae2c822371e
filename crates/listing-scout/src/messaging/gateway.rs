//! [`MessagingClient`] over an HTTP messaging gateway.
//!
//! The gateway holds the user session and exposes it as JSON:
//!
//! | call              | request                                       |
//! |-------------------|-----------------------------------------------|
//! | `list_history`    | `GET  /chats/{chat}/history?offset_id=&limit=` |
//! | `get_media_group` | `GET  /chats/{chat}/messages/{id}/media_group` |
//! | `download`        | `GET  /files/{file_id}`                        |
//! | `list_dialogs`    | `GET  /dialogs`                                |
//! | `mark_read`       | `POST /chats/{chat}/read_mentions`             |
//! | `get_chat`        | `GET  /chats/{chat}`                           |
//!
//! HTTP 429 is flood control: the delay comes from `Retry-After` or from a
//! `retry_after` field in the body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::MessagingError;
use super::types::{ChatInfo, Dialog, Message, Photo};
use super::MessagingClient;

/// Used when a 429 names no delay.
const DEFAULT_FLOOD_WAIT: Duration = Duration::from_secs(5);

pub struct GatewayClient {
    http: HttpClient,
    base_url: String,
    session: Option<SecretString>,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessagingError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, MessagingError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| MessagingError::Network(e.without_url().to_string()))?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MessagingError> {
        let response = self.send(self.http.get(self.url(path))).await?;
        response
            .json()
            .await
            .map_err(|e| MessagingError::Decode(e.to_string()))
    }
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// `{"retry_after": n}` or `{"parameters": {"retry_after": n}}`
fn retry_after_body(body: &str) -> Option<Duration> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after")
        .or_else(|| value.get("parameters").and_then(|p| p.get("retry_after")))
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
}

async fn check_status(response: Response) -> Result<Response, MessagingError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header_wait = retry_after_header(&response);
        let body = response.text().await.unwrap_or_default();
        let wait = header_wait
            .or_else(|| retry_after_body(&body))
            .unwrap_or(DEFAULT_FLOOD_WAIT);
        return Err(MessagingError::FloodWait(wait));
    }

    let body = response.text().await.unwrap_or_default();
    Err(MessagingError::Api {
        status: status.as_u16(),
        message: body.chars().take(500).collect(),
    })
}

#[async_trait]
impl MessagingClient for GatewayClient {
    async fn list_history(
        &self,
        chat: &str,
        offset_id: i64,
        limit: u32,
    ) -> Result<Vec<Message>, MessagingError> {
        let request = self
            .http
            .get(self.url(&format!("/chats/{}/history", chat)))
            .query(&[("offset_id", offset_id.to_string()), ("limit", limit.to_string())]);
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| MessagingError::Decode(e.to_string()))
    }

    async fn get_media_group(
        &self,
        chat: &str,
        message_id: i64,
    ) -> Result<Vec<Photo>, MessagingError> {
        self.get_json(&format!("/chats/{}/messages/{}/media_group", chat, message_id))
            .await
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, MessagingError> {
        let response = self
            .send(self.http.get(self.url(&format!("/files/{}", file_id))))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MessagingError::Network(e.without_url().to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn list_dialogs(&self) -> Result<Vec<Dialog>, MessagingError> {
        self.get_json("/dialogs").await
    }

    async fn mark_read(&self, chat: &str) -> Result<(), MessagingError> {
        self.send(
            self.http
                .post(self.url(&format!("/chats/{}/read_mentions", chat))),
        )
        .await?;
        Ok(())
    }

    async fn get_chat(&self, chat: &str) -> Result<ChatInfo, MessagingError> {
        self.get_json(&format!("/chats/{}", chat)).await
    }
}
