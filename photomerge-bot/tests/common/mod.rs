//! In-memory channel and mailer shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use photomerge_bot::mail::{compose, MailError, Mailer};
use photomerge_bot::{
    AssembledDocument, AssetRef, Channel, ChannelError, ChannelMessage, ChannelResult,
    ChannelType, Conversation, MessageContent, OutgoingContent, OutgoingMessage, SessionStore,
};
use photomerge_common::config::{DocumentConfig, MailServerConfig};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fake channel
// ============================================================================

#[derive(Default)]
pub struct FakeChannel {
    sent: Mutex<Vec<OutgoingMessage>>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    fail_documents: AtomicBool,
    fail_texts_containing: Mutex<Option<String>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `file_id` resolvable to `bytes`.
    pub fn add_asset(&self, file_id: &str, bytes: Vec<u8>) {
        self.assets.lock().unwrap().insert(file_id.into(), bytes);
    }

    pub fn fail_documents(&self, fail: bool) {
        self.fail_documents.store(fail, Ordering::SeqCst);
    }

    /// Reject text sends whose body contains `needle`.
    pub fn fail_texts_containing(&self, needle: &str) {
        *self.fail_texts_containing.lock().unwrap() = Some(needle.to_string());
    }

    /// Text replies sent into `chat`, in order.
    pub fn texts(&self, chat: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == chat)
            .filter_map(|m| match &m.content {
                OutgoingContent::Text { text } => Some(text.clone()),
                OutgoingContent::File { .. } => None,
            })
            .collect()
    }

    /// Files sent into `chat` as (filename, mime, bytes).
    pub fn files(&self, chat: &str) -> Vec<(String, Option<String>, Vec<u8>)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == chat)
            .filter_map(|m| match &m.content {
                OutgoingContent::File {
                    data,
                    filename,
                    mime_type,
                } => Some((filename.clone(), mime_type.clone(), data.clone())),
                OutgoingContent::Text { .. } => None,
            })
            .collect()
    }

    pub fn last_text(&self, chat: &str) -> Option<String> {
        self.texts(chat).pop()
    }
}

#[async_trait]
impl Channel for FakeChannel {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        if matches!(message.content, OutgoingContent::File { .. })
            && self.fail_documents.load(Ordering::SeqCst)
        {
            return Err(ChannelError::SendFailed("document upload rejected".into()));
        }
        if let OutgoingContent::Text { text } = &message.content {
            let needle = self.fail_texts_containing.lock().unwrap().clone();
            if needle.is_some_and(|n| text.contains(&n)) {
                return Err(ChannelError::SendFailed("text rejected".into()));
            }
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message);
        Ok(sent.len().to_string())
    }

    async fn fetch_asset(&self, asset: &AssetRef) -> ChannelResult<Vec<u8>> {
        self.assets
            .lock()
            .unwrap()
            .get(&asset.file_id)
            .cloned()
            .ok_or_else(|| ChannelError::DownloadFailed(format!("unknown file {}", asset.file_id)))
    }

    async fn listen<F>(&self, _callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

// ============================================================================
// Fake mailer
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub filename: String,
    pub attachment: Vec<u8>,
    /// Full RFC 5322 rendering of the composed message
    pub raw: String,
}

/// Composes messages like the real mailer but keeps them in memory.
pub struct FakeMailer {
    config: MailServerConfig,
    reject_auth: bool,
    calls: AtomicUsize,
    sent: Mutex<Vec<SentMail>>,
}

impl FakeMailer {
    pub fn accepting() -> Self {
        Self::new(false)
    }

    pub fn rejecting_auth() -> Self {
        Self::new(true)
    }

    fn new(reject_auth: bool) -> Self {
        Self {
            config: MailServerConfig {
                smtp_socket: Some("smtp.example.com:465".into()),
                from_address: Some("bot@example.com".into()),
                login: Some("bot".into()),
                password: Some("secret".into()),
                ..MailServerConfig::default()
            },
            reject_auth,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_document(
        &self,
        to: &str,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<(), MailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let email = compose(&self.config, to, document, filename)?;
        if self.reject_auth {
            return Err(MailError::Auth("535 5.7.8 Invalid credentials".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.trim().to_string(),
            filename: filename.to_string(),
            attachment: document.to_vec(),
            raw: String::from_utf8_lossy(&email.formatted()).to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub struct Harness {
    pub channel: Arc<FakeChannel>,
    pub mailer: Arc<FakeMailer>,
    pub conversation: Arc<Conversation<FakeChannel>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mailer(FakeMailer::accepting())
    }

    pub fn with_mailer(mailer: FakeMailer) -> Self {
        let channel = Arc::new(FakeChannel::new());
        let mailer = Arc::new(mailer);
        let dyn_mailer: Arc<dyn Mailer> = mailer.clone();
        let conversation = Arc::new(Conversation::new(
            channel.clone(),
            dyn_mailer,
            Arc::new(SessionStore::new()),
            &DocumentConfig::default(),
        ));
        Self {
            channel,
            mailer,
            conversation,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        self.conversation.sessions()
    }

    /// Handle a message, panicking on transport errors.
    pub async fn send(&self, msg: ChannelMessage) {
        self.conversation.handle(&msg).await.unwrap();
    }
}

pub fn chat_of(user: &str) -> String {
    format!("chat-{user}")
}

fn message(user: &str, content: MessageContent) -> ChannelMessage {
    ChannelMessage {
        id: uuid::Uuid::new_v4().to_string(),
        channel_type: ChannelType::Telegram,
        channel_id: chat_of(user),
        user_id: user.into(),
        user_name: None,
        content,
        metadata: HashMap::new(),
        timestamp: 0,
        trace_id: photomerge_common::logging::generate_trace_id(),
    }
}

pub fn text(user: &str, text: &str) -> ChannelMessage {
    message(user, MessageContent::Text { text: text.into() })
}

pub fn photo(user: &str, file_id: &str) -> ChannelMessage {
    message(
        user,
        MessageContent::Image {
            asset: AssetRef::new(file_id),
            caption: None,
        },
    )
}

pub fn sticker(user: &str) -> ChannelMessage {
    message(user, MessageContent::Other { kind: "sticker".into() })
}

/// A solid-colour PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 120, 200]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Page widths of a PDF, in page order.
pub fn page_widths(pdf: &[u8]) -> Vec<f32> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_object(*id).unwrap().as_dict().unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            match &media_box[2] {
                lopdf::Object::Real(v) => *v,
                lopdf::Object::Integer(v) => *v as f32,
                other => panic!("unexpected MediaBox entry {other:?}"),
            }
        })
        .collect()
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
