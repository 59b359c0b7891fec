//! Conversation controller.
//!
//! Drives each user through file name → photo uploads → document → mail.
//! Callers must not run two `handle` calls for the same user at once; the
//! [`Dispatcher`](crate::dispatcher::Dispatcher) guarantees that.

use crate::assembler::{AssembledDocument, DocumentAssembler};
use crate::delivery::{deliver, document_file_name};
use crate::mail::Mailer;
use crate::message::{AssetRef, ChannelMessage, Command, MessageContent, OutgoingMessage};
use crate::session::{Session, SessionStore};
use crate::traits::{Channel, ChannelError};
use photomerge_common::config::DocumentConfig;
use photomerge_common::util::{sanitize_for_log, truncate_with_ellipsis};
use std::sync::Arc;
use tracing::Instrument;

/// User-facing texts.
pub mod replies {
    pub const GREETING: &str =
        "Hi! I'm PHOTOS to PDF converter bot.\nSend /exit to stop talking to me.\n\nPlease, enter result PDF filename:";
    pub const FILE_NAME_PROMPT: &str = "Please, enter result PDF filename:";
    pub const UPLOAD_PROMPT: &str =
        "Please, upload photos one by one for merging and converting to pdf:";
    pub const PHOTO_ADDED: &str =
        "Photo successfully added.\n\nAdd more or use /f to finish uploading.";
    pub const NO_PHOTOS: &str = "Please upload at least one photo before finishing.";
    pub const PROCESSING: &str = "Processing...";
    pub const CONVERTED: &str = "Photos successfully converted.";
    pub const EMAIL_PROMPT: &str = "Please, enter your email:";
    pub const CONVERSION_FAILED: &str = "Error while converting images to pdf.";
    pub const BYE: &str = "Bye! Hope to see you soon!";
    pub const UNRECOGNIZED: &str = "Sorry, I didn't understand that command.";
    pub const FAILURE: &str = "Something went wrong, please try again.";

    pub fn sending(address: &str) -> String {
        format!("Sending result to {address} ...")
    }

    pub fn sent(address: &str) -> String {
        format!("Result file is successfully sent to {address} \n\nBye!")
    }

    pub fn mail_failed(address: &str) -> String {
        format!("Error while sending email to {address}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type ConversationResult<T> = Result<T, ConversationError>;

pub struct Conversation<C: Channel> {
    channel: Arc<C>,
    mailer: Arc<dyn Mailer>,
    sessions: Arc<SessionStore>,
    assembler: DocumentAssembler,
    extension: String,
}

impl<C: Channel> Conversation<C> {
    pub fn new(
        channel: Arc<C>,
        mailer: Arc<dyn Mailer>,
        sessions: Arc<SessionStore>,
        document: &DocumentConfig,
    ) -> Self {
        Self {
            channel,
            mailer,
            sessions,
            assembler: DocumentAssembler::from_config(document),
            extension: document.extension.clone(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Handle one inbound message.
    ///
    /// Errors are transport failures the caller should surface to the user.
    pub async fn handle(&self, msg: &ChannelMessage) -> ConversationResult<()> {
        let span = photomerge_common::channel_span!(
            msg.channel_type_str(),
            msg.trace_id,
            msg.user_id,
            chat_id = %msg.channel_id
        );
        self.dispatch(msg).instrument(span).await
    }

    async fn dispatch(&self, msg: &ChannelMessage) -> ConversationResult<()> {
        let user = msg.user_id.as_str();

        match msg.command() {
            Some(Command::Start) => {
                let replaced = self.sessions.begin(user);
                tracing::info!(replaced, "Conversation started");
                return self.reply(msg, replies::GREETING).await;
            }
            Some(Command::Exit) if self.sessions.contains(user) => {
                self.sessions.remove(user);
                tracing::info!("Conversation exited");
                return self.reply(msg, replies::BYE).await;
            }
            _ => {}
        }

        let Some(session) = self.sessions.get(user) else {
            tracing::debug!("Message outside a conversation");
            return self.reply(msg, replies::UNRECOGNIZED).await;
        };

        match session {
            Session::AwaitingFileName => self.on_file_name(msg).await,
            Session::Uploading { file_name, assets } => {
                self.on_upload(msg, file_name, assets).await
            }
            Session::Mailing {
                file_name,
                document,
            } => self.on_mail_address(msg, &file_name, document).await,
        }
    }

    async fn on_file_name(&self, msg: &ChannelMessage) -> ConversationResult<()> {
        match &msg.content {
            MessageContent::Text { .. } if msg.command().is_some() => {
                self.reply(msg, replies::UNRECOGNIZED).await
            }
            MessageContent::Text { text } => {
                self.sessions.replace(
                    &msg.user_id,
                    Session::Uploading {
                        file_name: text.clone(),
                        assets: Vec::new(),
                    },
                );
                tracing::info!(
                    file_name = %truncate_with_ellipsis(&sanitize_for_log(text), 64),
                    "File name stored"
                );
                self.reply(msg, replies::UPLOAD_PROMPT).await
            }
            _ => self.reply(msg, replies::FILE_NAME_PROMPT).await,
        }
    }

    async fn on_upload(
        &self,
        msg: &ChannelMessage,
        file_name: String,
        assets: Vec<AssetRef>,
    ) -> ConversationResult<()> {
        if let Some(asset) = msg.asset() {
            return self.record_upload(msg, asset).await;
        }

        match msg.command() {
            Some(Command::Finish) if assets.is_empty() => {
                self.reply(msg, replies::NO_PHOTOS).await
            }
            Some(Command::Finish) => self.finish_upload(msg, file_name, assets).await,
            Some(_) => self.reply(msg, replies::UNRECOGNIZED).await,
            None => self.reply(msg, replies::UPLOAD_PROMPT).await,
        }
    }

    /// Append a photo to the live upload session.
    ///
    /// The session can be gone by the time the photo is recorded; the user is
    /// then asked to upload again rather than told it was added.
    async fn record_upload(&self, msg: &ChannelMessage, asset: &AssetRef) -> ConversationResult<()> {
        match self.sessions.push_asset(&msg.user_id, asset.clone()) {
            Some(count) => {
                tracing::info!(
                    file_id = %asset.file_id,
                    size_bytes = ?asset.size_bytes,
                    uploads = count,
                    "Photo recorded"
                );
                self.reply(msg, replies::PHOTO_ADDED).await
            }
            None => {
                tracing::warn!(file_id = %asset.file_id, "Upload session gone, photo dropped");
                self.reply(msg, replies::UPLOAD_PROMPT).await
            }
        }
    }

    /// Resolve uploads, assemble, return the document and move on to mailing.
    async fn finish_upload(
        &self,
        msg: &ChannelMessage,
        file_name: String,
        assets: Vec<AssetRef>,
    ) -> ConversationResult<()> {
        self.reply(msg, replies::PROCESSING).await?;

        let images = match self.resolve_assets(&assets).await {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(error = %e, uploads = assets.len(), "Asset resolution failed");
                return self.restart_upload(msg, file_name).await;
            }
        };

        let assembler = self.assembler.clone();
        let assembled = tokio::task::spawn_blocking(move || assembler.assemble(&images))
            .await
            .map_err(|e| ConversationError::Task(e.to_string()))?;

        let document = match assembled {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, uploads = assets.len(), "Assembly failed");
                return self.restart_upload(msg, file_name).await;
            }
        };

        tracing::info!(
            pages = document.page_count(),
            bytes = document.len(),
            "Photos assembled"
        );

        deliver(
            self.channel.as_ref(),
            msg,
            &document,
            &file_name,
            &self.extension,
        )
        .await?;

        self.sessions.replace(
            &msg.user_id,
            Session::Mailing {
                file_name,
                document,
            },
        );

        self.reply(msg, replies::CONVERTED).await?;
        self.reply(msg, replies::EMAIL_PROMPT).await
    }

    async fn resolve_assets(&self, assets: &[AssetRef]) -> Result<Vec<Vec<u8>>, ChannelError> {
        let mut images = Vec::with_capacity(assets.len());
        for asset in assets {
            images.push(self.channel.fetch_asset(asset).await?);
        }
        Ok(images)
    }

    /// Keep the file name, drop the uploads, ask for photos again.
    async fn restart_upload(&self, msg: &ChannelMessage, file_name: String) -> ConversationResult<()> {
        self.sessions.replace(
            &msg.user_id,
            Session::Uploading {
                file_name,
                assets: Vec::new(),
            },
        );
        self.reply(msg, replies::CONVERSION_FAILED).await?;
        self.reply(msg, replies::UPLOAD_PROMPT).await
    }

    async fn on_mail_address(
        &self,
        msg: &ChannelMessage,
        file_name: &str,
        document: AssembledDocument,
    ) -> ConversationResult<()> {
        let address = match (msg.text(), msg.command()) {
            (_, Some(_)) => return self.reply(msg, replies::UNRECOGNIZED).await,
            (Some(text), None) => text.trim().to_string(),
            (None, None) => return self.reply(msg, replies::EMAIL_PROMPT).await,
        };

        // The conversation ends here whatever the mail outcome
        self.sessions.remove(&msg.user_id);

        if let Err(e) = self.reply(msg, &replies::sending(&address)).await {
            tracing::warn!(to = %address, error = %e, "Progress reply failed, sending anyway");
        }

        let filename = document_file_name(file_name, &self.extension);
        match self.mailer.send_document(&address, &document, &filename).await {
            Ok(()) => {
                tracing::info!(to = %address, filename = %filename, "Document mailed");
                self.reply(msg, &replies::sent(&address)).await
            }
            Err(e) => {
                tracing::warn!(to = %address, error = %e, "Mail delivery failed");
                self.reply(msg, &replies::mail_failed(&address)).await
            }
        }
    }

    async fn reply(&self, to: &ChannelMessage, text: &str) -> ConversationResult<()> {
        self.channel
            .send(OutgoingMessage::text_reply(to, text))
            .await?;
        Ok(())
    }
}
