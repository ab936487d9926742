//! Command handling module.
//!
//! Processes the slash commands users invoke in Discord:
//! `/manual`, `/automatic`, `/stop` and `/status`.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{
    CommandDefinition, CommandResult, OptionDefinition, OptionKind, OptionValue, SlashCommand,
};
