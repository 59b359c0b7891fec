//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending messages
//! through the Telegram Bot API.

use crate::message::{AssetRef, ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use photomerge_common::config::{BotConfig, NetworkConfig};
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Telegram's per-message text limit.
const MAX_MESSAGE_LEN: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// Telegram Channel
// ============================================================================

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel against the public Bot API.
    pub fn new(bot_token: String) -> Self {
        Self::with_options(
            bot_token,
            BotConfig::default().api_base,
            BotConfig::default().poll_timeout_secs,
            NetworkConfig::default().request_timeout(),
        )
    }

    /// Create a channel from loaded configuration.
    pub fn from_config(bot: &BotConfig, network: &NetworkConfig) -> ChannelResult<Self> {
        let token = bot
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ChannelError::Auth("Bot token is missing".into()))?;
        Ok(Self::with_options(
            token,
            bot.api_base.clone(),
            bot.poll_timeout_secs,
            network.request_timeout(),
        ))
    }

    /// Create a channel with an explicit API base and timeouts.
    pub fn with_options(
        bot_token: String,
        api_base: String,
        poll_timeout_secs: u64,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs,
            request_timeout,
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    fn map_request_error(&self, err: reqwest::Error) -> ChannelError {
        if err.is_timeout() {
            ChannelError::Timeout(self.request_timeout.as_secs())
        } else {
            ChannelError::Connection(err.without_url().to_string())
        }
    }

    /// Download a file from Telegram by its `file_id`.
    async fn download_file(&self, file_id: &str) -> ChannelResult<Vec<u8>> {
        // Step 1: Get the file path via getFile API
        let body = serde_json::json!({ "file_id": file_id });

        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::DownloadFailed(format!(
                "Telegram getFile failed: {err}"
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(|p| p.as_str())
            .ok_or_else(|| {
                ChannelError::DownloadFailed("Missing file_path in getFile response".into())
            })?;

        // Step 2: Download the file
        let file_resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !file_resp.status().is_success() {
            return Err(ChannelError::DownloadFailed(format!(
                "Failed to download file from Telegram: {}",
                file_resp.status()
            )));
        }

        let bytes = file_resp
            .bytes()
            .await
            .map_err(|e| self.map_request_error(e))?;
        Ok(bytes.to_vec())
    }

    /// Send a document from bytes (in-memory) to a Telegram chat
    pub async fn send_document_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        mime_type: Option<&str>,
    ) -> ChannelResult<()> {
        let mut part = Part::bytes(file_bytes).file_name(file_name.to_string());
        if let Some(mime) = mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
        }

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "Telegram sendDocument failed: {err}"
            )));
        }

        tracing::info!(chat_id = %chat_id, file_name = %file_name, "Telegram document sent");
        Ok(())
    }

    /// Send a single plain-text message chunk.
    async fn send_single_chunk(&self, message: &str, chat_id: &str) -> ChannelResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if resp.status().is_success() {
            return Ok(());
        }

        let error_text = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed(format!(
            "Telegram sendMessage failed: {error_text}"
        )))
    }

    /// Normalize one `message` object from an update.
    ///
    /// Photos resolve to their largest size. Documents with an `image/*` MIME
    /// type count as photos. Everything else non-text becomes `Other`.
    fn parse_message(message: &serde_json::Value) -> Option<ChannelMessage> {
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)?
            .to_string();

        let from = message.get("from");
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)
            .map_or_else(|| chat_id.clone(), |id| id.to_string());
        let user_name = from
            .and_then(|f| f.get("username").or_else(|| f.get("first_name")))
            .and_then(|u| u.as_str())
            .map(String::from);

        let caption = message
            .get("caption")
            .and_then(|v| v.as_str())
            .map(String::from);

        let content = if let Some(text) = message.get("text").and_then(|v| v.as_str()) {
            MessageContent::Text {
                text: text.to_string(),
            }
        } else if let Some(sizes) = message.get("photo").and_then(|p| p.as_array()) {
            // Sizes are listed smallest first
            let largest = sizes.last()?;
            MessageContent::Image {
                asset: Self::asset_from(largest)?,
                caption,
            }
        } else if let Some(doc) = message.get("document") {
            let is_image = doc
                .get("mime_type")
                .and_then(|v| v.as_str())
                .is_some_and(|m| m.starts_with("image/"));
            if is_image {
                MessageContent::Image {
                    asset: Self::asset_from(doc)?,
                    caption,
                }
            } else {
                MessageContent::Other {
                    kind: "document".into(),
                }
            }
        } else {
            let kind = ["sticker", "voice", "audio", "video", "animation", "location", "contact"]
                .into_iter()
                .find(|k| message.get(*k).is_some())
                .unwrap_or("unknown");
            MessageContent::Other { kind: kind.into() }
        };

        let id = message
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string());

        Some(ChannelMessage {
            id,
            channel_type: ChannelType::Telegram,
            channel_id: chat_id,
            user_id,
            user_name,
            content,
            metadata: std::collections::HashMap::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            trace_id: photomerge_common::logging::generate_trace_id(),
        })
    }

    fn asset_from(file: &serde_json::Value) -> Option<AssetRef> {
        let file_id = file.get("file_id")?.as_str()?;
        Some(AssetRef {
            file_id: file_id.to_string(),
            size_bytes: file.get("file_size").and_then(serde_json::Value::as_u64),
        })
    }
}

/// Split a message into chunks that fit within Telegram's limit.
fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        let chunk = &remaining[..boundary];
        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". "))
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        let actual_split = if split_pos == 0 { boundary } else { split_pos };

        chunks.push(remaining[..actual_split].to_string());
        remaining = remaining[actual_split..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!("Telegram channel initialized");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        match message.content {
            OutgoingContent::Text { text } => {
                for chunk in split_message(&text, MAX_MESSAGE_LEN) {
                    self.send_single_chunk(&chunk, &message.channel_id).await?;
                }
            }
            OutgoingContent::File {
                data,
                filename,
                mime_type,
            } => {
                self.send_document_bytes(&message.channel_id, data, &filename, mime_type.as_deref())
                    .await?;
            }
        }

        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn fetch_asset(&self, asset: &AssetRef) -> ChannelResult<Vec<u8>> {
        self.download_file(&asset.file_id).await
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        let mut offset: i64 = 0;
        // Long polls outlive the regular request timeout
        let poll_deadline = Duration::from_secs(self.poll_timeout_secs + 10);

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .timeout(poll_deadline)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {}", e.without_url());
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {}", e.without_url());
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
                tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(msg) = update.get("message").and_then(Self::parse_message) else {
                    continue;
                };

                tracing::info!(
                    trace_id = %msg.trace_id,
                    message_id = %msg.id,
                    channel_id = %msg.channel_id,
                    user_id = %msg.user_id,
                    "Telegram message received"
                );

                callback(msg);
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> TelegramChannel {
        TelegramChannel::with_options(
            "123:ABC".into(),
            server.uri(),
            1,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into());
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            ch.file_url("photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_1.jpg"
        );
    }

    #[test]
    fn from_config_requires_token() {
        let bot = BotConfig::default();
        let err = TelegramChannel::from_config(&bot, &NetworkConfig::default());
        assert!(matches!(err, Err(ChannelError::Auth(_))));
    }

    #[test]
    fn parse_text_message() {
        let raw = json!({
            "message_id": 10,
            "from": {"id": 42, "username": "alice"},
            "chat": {"id": 4242},
            "text": "/start"
        });
        let msg = TelegramChannel::parse_message(&raw).unwrap();
        assert_eq!(msg.id, "10");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.channel_id, "4242");
        assert_eq!(msg.user_name.as_deref(), Some("alice"));
        assert_eq!(msg.text(), Some("/start"));
    }

    #[test]
    fn parse_photo_uses_largest_size() {
        let raw = json!({
            "message_id": 11,
            "from": {"id": 42},
            "chat": {"id": 4242},
            "photo": [
                {"file_id": "small", "width": 90, "height": 60, "file_size": 1000},
                {"file_id": "large", "width": 1280, "height": 853, "file_size": 90000}
            ]
        });
        let msg = TelegramChannel::parse_message(&raw).unwrap();
        let asset = msg.asset().unwrap();
        assert_eq!(asset.file_id, "large");
        assert_eq!(asset.size_bytes, Some(90000));
    }

    #[test]
    fn parse_image_document_as_photo() {
        let raw = json!({
            "message_id": 12,
            "from": {"id": 42},
            "chat": {"id": 4242},
            "document": {"file_id": "doc-img", "mime_type": "image/png", "file_name": "scan.png"}
        });
        let msg = TelegramChannel::parse_message(&raw).unwrap();
        assert_eq!(msg.asset().map(|a| a.file_id.as_str()), Some("doc-img"));
    }

    #[test]
    fn parse_other_content() {
        let raw = json!({
            "message_id": 13,
            "from": {"id": 42},
            "chat": {"id": 4242},
            "document": {"file_id": "doc", "mime_type": "application/zip"}
        });
        let msg = TelegramChannel::parse_message(&raw).unwrap();
        assert_eq!(msg.content, MessageContent::Other { kind: "document".into() });

        let raw = json!({
            "message_id": 14,
            "from": {"id": 42},
            "chat": {"id": 4242},
            "sticker": {"file_id": "stk"}
        });
        let msg = TelegramChannel::parse_message(&raw).unwrap();
        assert_eq!(msg.content, MessageContent::Other { kind: "sticker".into() });
    }

    #[test]
    fn parse_message_without_chat_is_dropped() {
        assert!(TelegramChannel::parse_message(&json!({"text": "hi"})).is_none());
    }

    #[test]
    fn split_message_short() {
        let result = split_message("Hello, World!", 4096);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0], "Hello, World!");
    }

    #[test]
    fn split_message_long() {
        let msg = "x".repeat(5000);
        let result = split_message(&msg, 4096);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        let msg = "é".repeat(3000);
        let result = split_message(&msg, 4095);
        assert!(result.len() >= 2);
        assert_eq!(result.concat(), msg);
    }

    #[tokio::test]
    async fn fetch_asset_resolves_and_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/getFile"))
            .and(body_partial_json(json!({"file_id": "AgAD"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"file_id": "AgAD", "file_path": "photos/file_1.jpg"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/bot123:ABC/photos/file_1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let bytes = ch.fetch_asset(&AssetRef::new("AgAD")).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fetch_asset_reports_get_file_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/getFile"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: invalid file_id"))
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let err = ch.fetch_asset(&AssetRef::new("nope")).await.unwrap_err();
        assert!(matches!(err, ChannelError::DownloadFailed(ref m) if m.contains("invalid file_id")));
    }

    #[tokio::test]
    async fn send_document_posts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendDocument"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let message = OutgoingMessage {
            channel_type: ChannelType::Telegram,
            channel_id: "4242".into(),
            reply_to: None,
            content: OutgoingContent::File {
                data: b"%PDF-1.5".to_vec(),
                filename: "trip.pdf".into(),
                mime_type: Some("application/pdf".into()),
            },
        };
        assert!(ch.send(message).await.is_ok());
    }

    #[tokio::test]
    async fn send_text_failure_is_send_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden: bot was blocked"))
            .mount(&server)
            .await;

        let ch = channel_for(&server);
        let message = OutgoingMessage {
            channel_type: ChannelType::Telegram,
            channel_id: "4242".into(),
            reply_to: None,
            content: OutgoingContent::Text { text: "hi".into() },
        };
        assert!(matches!(
            ch.send(message).await,
            Err(ChannelError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn init_rejects_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bot123:ABC/getMe"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let mut ch = channel_for(&server);
        assert!(matches!(ch.init().await, Err(ChannelError::Auth(_))));
        assert!(matches!(ch.health_check().await, Err(ChannelError::NotReady)));
    }
}
