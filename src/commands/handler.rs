//! Command handler implementation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{CommandResult, OptionValue, SlashCommand};
use crate::config::MAX_ANNOUNCEMENT_BODY;
use crate::discord::Announcer;
use crate::scheduler::{AnnouncementMode, Schedule, ScheduleState};

/// Handles slash commands and manages the announcement schedule.
pub struct CommandHandler {
    /// Shared scheduler state.
    state: Arc<RwLock<ScheduleState>>,

    /// Where the state is saved after every change.
    state_path: Option<PathBuf>,

    /// Used to resolve channel names for status replies.
    announcer: Arc<dyn Announcer>,

    /// Whether automatic (AI) mode is available.
    ai_enabled: bool,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(
        state: Arc<RwLock<ScheduleState>>,
        state_path: Option<PathBuf>,
        announcer: Arc<dyn Announcer>,
        ai_enabled: bool,
    ) -> Self {
        Self {
            state,
            state_path,
            announcer,
            ai_enabled,
        }
    }

    /// Tries to parse and execute a command invoked in `channel_id`.
    ///
    /// Returns `None` if the command is unknown or malformed.
    pub async fn try_handle(
        &self,
        name: &str,
        options: &[(&str, OptionValue)],
        channel_id: u64,
    ) -> Option<CommandResult> {
        let command = SlashCommand::parse(name, options)?;

        debug!("Handling command: {}", command);
        let result = self.execute(command, channel_id).await;
        info!(
            "Command /{} handled (ephemeral: {})",
            name, result.ephemeral
        );

        Some(result)
    }

    /// Executes a parsed command.
    pub async fn execute(&self, command: SlashCommand, channel_id: u64) -> CommandResult {
        match command {
            SlashCommand::Manual {
                message,
                interval_hours,
            } => self.handle_manual(message, interval_hours, channel_id).await,
            SlashCommand::Automatic {
                prompt,
                interval_hours,
            } => {
                self.handle_automatic(prompt, interval_hours, channel_id)
                    .await
            }
            SlashCommand::Stop => self.handle_stop().await,
            SlashCommand::Status => self.handle_status().await,
        }
    }

    async fn handle_manual(
        &self,
        message: String,
        interval_hours: f64,
        channel_id: u64,
    ) -> CommandResult {
        if let Err(e) = validate_interval(interval_hours) {
            return CommandResult::ephemeral(e);
        }
        if let Err(e) = validate_text(&message, "message") {
            return CommandResult::ephemeral(e);
        }

        let schedule = Schedule::new(
            channel_id,
            interval_hours,
            AnnouncementMode::Manual { message },
        );
        self.install(schedule).await;

        CommandResult::public(format!(
            "✅ **Manual Scheduled!** Interval: **{interval_hours:?} hours**."
        ))
    }

    async fn handle_automatic(
        &self,
        prompt: String,
        interval_hours: f64,
        channel_id: u64,
    ) -> CommandResult {
        if !self.ai_enabled {
            return CommandResult::ephemeral("❌ **Error:** `GEMINI_API_KEY` is missing.");
        }
        if let Err(e) = validate_interval(interval_hours) {
            return CommandResult::ephemeral(e);
        }
        if prompt.trim().is_empty() {
            return CommandResult::ephemeral("The prompt cannot be empty.");
        }

        let schedule = Schedule::new(
            channel_id,
            interval_hours,
            AnnouncementMode::Automatic { prompt },
        );
        self.install(schedule).await;

        CommandResult::public(format!(
            "🤖 **Automatic Scheduled!** Interval: **{interval_hours:?} hours**."
        ))
    }

    async fn install(&self, schedule: Schedule) {
        let mut state = self.state.write().await;
        info!(
            "Scheduling {} announcements in channel {} every {} hours",
            schedule.mode.label(),
            schedule.channel_id,
            schedule.interval_hours
        );
        state.start(schedule, Utc::now());
        state.persist(self.state_path.as_deref());
    }

    async fn handle_stop(&self) -> CommandResult {
        let mut state = self.state.write().await;

        if !state.stop() {
            return CommandResult::ephemeral("No schedule running.");
        }

        state.persist(self.state_path.as_deref());
        info!("Schedule stopped");
        CommandResult::public("🛑 **Schedule has been stopped.**")
    }

    async fn handle_status(&self) -> CommandResult {
        let (schedule, since_send, awaiting) = {
            let state = self.state.read().await;
            let Some(schedule) = state.schedule.clone() else {
                return CommandResult::ephemeral("Status: **Idle**.");
            };
            (
                schedule,
                state.time_since_last_send(Utc::now()),
                state.is_awaiting_activity(),
            )
        };

        // Resolved without holding the lock.
        let channel_name = self
            .announcer
            .channel_name(schedule.channel_id)
            .await
            .unwrap_or_else(|| "Unknown Channel".to_owned());

        let paused = if awaiting {
            "Yes (Awaiting chat activity)"
        } else {
            "No"
        };

        let message = format!(
            "**Status:** Running\n\
             **Mode:** {}\n\
             **Channel:** #{channel_name}\n\
             **Interval:** {:?} hours\n\
             **Time Since Last Send:** {:.1} seconds\n\
             **Paused (Idle Channel):** {paused}",
            schedule.mode.label(),
            schedule.interval_hours,
            since_send.as_secs_f64(),
        );

        CommandResult::ephemeral(message)
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("state_path", &self.state_path)
            .field("ai_enabled", &self.ai_enabled)
            .finish_non_exhaustive()
    }
}

/// Validates an interval given in hours.
fn validate_interval(interval_hours: f64) -> Result<(), &'static str> {
    let probe = Schedule::new(
        0,
        interval_hours,
        AnnouncementMode::Manual {
            message: String::new(),
        },
    );
    if probe.interval().is_none() {
        return Err("The interval must be > 0.");
    }
    Ok(())
}

/// Validates a manual announcement body.
fn validate_text(text: &str, what: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err(format!("The {what} cannot be empty."));
    }

    let char_count = text.chars().count();
    if char_count > MAX_ANNOUNCEMENT_BODY {
        return Err(format!(
            "The {what} is too long: {char_count} chars (max: {MAX_ANNOUNCEMENT_BODY})."
        ));
    }

    Ok(())
}
