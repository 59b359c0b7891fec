//! Channel traits for implementing channel adapters.

use crate::message::{AssetRef, ChannelMessage, OutgoingMessage};
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
///
/// Also the error of the direct-return delivery path.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Asset download failed: {0}")]
    DownloadFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel not ready")]
    NotReady,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

/// Channel adapter trait.
///
/// Implement this trait to plug a messaging transport into the bot.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Initialize the channel (connect, authenticate, etc.).
    async fn init(&mut self) -> ChannelResult<()>;

    /// Send a message to the channel.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Resolve an asset handle to its raw bytes.
    async fn fetch_asset(&self, asset: &AssetRef) -> ChannelResult<Vec<u8>>;

    /// Start listening for incoming messages.
    ///
    /// Runs until the channel shuts down, calling `callback` for every
    /// normalized inbound message.
    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> ChannelResult<()>;

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()>;
}
