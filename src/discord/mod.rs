//! Discord client wrapper module.
//!
//! Provides the gateway event handler, slash command registration and the
//! [`Announcer`] abstraction used to post announcements.

mod client;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{DiscordAnnouncer, DiscordBot};

/// Errors that can occur while posting to a channel.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Channel with ID {0} not found")]
    ChannelNotFound(u64),

    #[error("Missing permissions to send messages to channel {0}")]
    Forbidden(u64),

    #[error("Failed to send message: {0}")]
    Other(String),
}

/// Posts announcements and resolves channel names.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Sends `content` to the channel.
    async fn send(&self, channel_id: u64, content: &str) -> Result<(), SendError>;

    /// Returns the channel's display name, if it can be resolved.
    async fn channel_name(&self, channel_id: u64) -> Option<String>;
}
