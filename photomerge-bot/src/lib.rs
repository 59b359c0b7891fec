//! Photomerge bot - merge chat photo uploads into one PDF.
//!
//! A user picks a file name, uploads photos one by one and finishes with
//! `/f`. The bot builds a PDF with one page per photo, sends it back into the
//! chat and then mails it to an address the user provides.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ─ getUpdates ─→ TelegramChannel ─→ Dispatcher (lane per user)
//!                                                   ↓
//!                                             Conversation ── SessionStore
//!                                              ↓        ↓
//!                              DocumentAssembler     delivery / mail
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod assembler;
pub mod conversation;
pub mod delivery;
pub mod dispatcher;
pub mod mail;
pub mod message;
pub mod session;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use assembler::{AssembledDocument, AssemblyError, DocumentAssembler};
pub use conversation::{Conversation, ConversationError, ConversationResult};
pub use dispatcher::Dispatcher;
pub use mail::{MailError, Mailer, SmtpMailer};
pub use message::{
    AssetRef, ChannelMessage, ChannelType, Command, MessageContent, OutgoingContent,
    OutgoingMessage,
};
pub use session::{ConversationState, Session, SessionStore};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};

use photomerge_common::config::Config;
use std::sync::Arc;

/// Connect to Telegram and serve conversations until interrupted.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    let mut channel = TelegramChannel::from_config(&config.bot, &config.network)?;
    channel.init().await?;
    let channel = Arc::new(channel);

    if !config.mail.is_configured() {
        tracing::warn!("Mail relay is not fully configured, mail delivery will fail");
    }

    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(
        config.mail.clone(),
        config.network.request_timeout(),
    ));
    let sessions = Arc::new(SessionStore::new());
    let conversation = Arc::new(Conversation::new(
        channel.clone(),
        mailer,
        sessions,
        &config.document,
    ));
    let dispatcher = Arc::new(Dispatcher::new(conversation));

    tracing::info!("Photomerge bot started");

    let router = dispatcher.clone();
    tokio::select! {
        result = channel.listen(move |msg| router.route(msg)) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(active_lanes = dispatcher.active_lanes(), "Shutdown signal received");
        }
    }

    channel.shutdown().await?;
    Ok(())
}
