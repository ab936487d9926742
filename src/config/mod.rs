//! Configuration module for the announcer bot.
//!
//! Handles loading of Discord credentials, Gemini settings and
//! bot runtime options from the environment.

mod settings;

pub use settings::{AiConfig, BotSettings, ConfigError, DiscordConfig};

/// Maximum length of a Discord message in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Prefix put in front of every scheduled announcement.
pub const ANNOUNCEMENT_PREFIX: &str = "**[Scheduled Announcement]** ";

/// Longest announcement body that still fits in one message after the prefix.
pub const MAX_ANNOUNCEMENT_BODY: usize = MAX_MESSAGE_LENGTH - ANNOUNCEMENT_PREFIX.len();
