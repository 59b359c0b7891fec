//! Per-user message lanes.
//!
//! Each active user gets an unbounded FIFO queue drained by one worker task,
//! so one user's messages are handled strictly in order while different users
//! proceed in parallel. A lane with nothing to do for `idle_timeout` retires.

use crate::conversation::{replies, Conversation};
use crate::message::{ChannelMessage, OutgoingMessage};
use crate::traits::Channel;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default idle period before a user's lane is torn down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

type Lanes = DashMap<String, mpsc::UnboundedSender<ChannelMessage>>;

pub struct Dispatcher<C: Channel + 'static> {
    conversation: Arc<Conversation<C>>,
    lanes: Arc<Lanes>,
    idle_timeout: Duration,
}

impl<C: Channel + 'static> Dispatcher<C> {
    pub fn new(conversation: Arc<Conversation<C>>) -> Self {
        Self {
            conversation,
            lanes: Arc::new(DashMap::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of users with a live lane.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Queue a message on its user's lane, starting the lane if needed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn route(&self, msg: ChannelMessage) {
        let user = msg.user_id.clone();

        // The entry guard is held while sending, so a lane cannot retire
        // between the lookup and the send.
        let mut lane = self
            .lanes
            .entry(user.clone())
            .or_insert_with(|| self.spawn_lane(&user));

        if let Err(mpsc::error::SendError(msg)) = lane.send(msg) {
            tracing::warn!(user_id = %user, "Lane worker gone, restarting lane");
            *lane = self.spawn_lane(&user);
            if lane.send(msg).is_err() {
                tracing::error!(user_id = %user, "Failed to queue message");
            }
        }
    }

    fn spawn_lane(&self, user: &str) -> mpsc::UnboundedSender<ChannelMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMessage>();
        let conversation = self.conversation.clone();
        let lanes = self.lanes.clone();
        let idle_timeout = self.idle_timeout;
        let user = user.to_string();

        tokio::spawn(async move {
            tracing::debug!(user_id = %user, "Lane started");

            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(msg)) => process(&conversation, msg).await,
                    Ok(None) => break,
                    Err(_) => {
                        if lanes.remove_if(&user, |_, _| rx.is_empty()).is_some() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!(user_id = %user, "Lane retired");
        });

        tx
    }
}

async fn process<C: Channel>(conversation: &Conversation<C>, msg: ChannelMessage) {
    let Err(e) = conversation.handle(&msg).await else {
        return;
    };

    tracing::error!(
        trace_id = %msg.trace_id,
        user_id = %msg.user_id,
        error = %e,
        "Failed to process message"
    );

    let notice = OutgoingMessage::text_reply(&msg, replies::FAILURE);
    if let Err(send_err) = conversation.channel().send(notice).await {
        tracing::warn!(user_id = %msg.user_id, error = %send_err, "Failed to report error to user");
    }
}
