//! Discord gateway client and REST announcer.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::Utc;
use serenity::all::{
    Channel, ChannelId, Client, Command, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EventHandler, GatewayIntents, GuildId, Interaction,
    Message, Ready, ResolvedValue, UserId,
};
use serenity::http::{Http, HttpError};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{Announcer, SendError};
use crate::commands::{CommandDefinition, CommandHandler, OptionKind, OptionValue, SlashCommand};
use crate::config::DiscordConfig;
use crate::scheduler::ScheduleState;

/// Posts announcements through Discord's REST API.
#[derive(Clone)]
pub struct DiscordAnnouncer {
    http: Arc<Http>,
}

impl DiscordAnnouncer {
    /// Creates an announcer authenticated with the bot token.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

#[async_trait]
impl Announcer for DiscordAnnouncer {
    async fn send(&self, channel_id: u64, content: &str) -> Result<(), SendError> {
        if channel_id == 0 {
            return Err(SendError::ChannelNotFound(channel_id));
        }

        ChannelId::new(channel_id)
            .say(&self.http, content)
            .await
            .map(|_| ())
            .map_err(|e| map_send_error(channel_id, e))
    }

    async fn channel_name(&self, channel_id: u64) -> Option<String> {
        if channel_id == 0 {
            return None;
        }

        match self.http.get_channel(ChannelId::new(channel_id)).await {
            Ok(Channel::Guild(channel)) => Some(channel.name),
            Ok(Channel::Private(channel)) => Some(channel.name()),
            Ok(_) => None,
            Err(e) => {
                debug!("Could not resolve channel {}: {}", channel_id, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for DiscordAnnouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordAnnouncer").finish_non_exhaustive()
    }
}

/// Maps a serenity error onto the announcer's error type.
fn map_send_error(channel_id: u64, err: serenity::Error) -> SendError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        match response.status_code.as_u16() {
            403 => return SendError::Forbidden(channel_id),
            404 => return SendError::ChannelNotFound(channel_id),
            _ => {}
        }
    }
    SendError::Other(err.to_string())
}

/// Gateway event handler.
struct Handler {
    commands: Arc<CommandHandler>,
    state: Arc<RwLock<ScheduleState>>,
    state_path: Option<std::path::PathBuf>,
    guild_id: Option<u64>,
    bot_user: OnceLock<UserId>,
}

impl Handler {
    async fn register_commands(&self, ctx: &Context) {
        let commands: Vec<CreateCommand> = SlashCommand::definitions()
            .iter()
            .map(build_command)
            .collect();

        let result = match self.guild_id {
            Some(guild_id) => GuildId::new(guild_id)
                .set_commands(&ctx.http, commands)
                .await
                .map(|registered| (registered.len(), "guild")),
            None => Command::set_global_commands(&ctx.http, commands)
                .await
                .map(|registered| (registered.len(), "global")),
        };

        match result {
            Ok((count, scope)) => info!("Registered {} {} slash commands", count, scope),
            Err(e) => error!("Failed to register slash commands: {}", e),
        }
    }

    async fn respond(&self, ctx: &Context, command: &CommandInteraction) {
        let options: Vec<(&str, OptionValue)> = command
            .data
            .options()
            .into_iter()
            .filter_map(|option| {
                let value = match option.value {
                    ResolvedValue::String(s) => OptionValue::String(s.to_owned()),
                    ResolvedValue::Number(n) => OptionValue::Number(n),
                    ResolvedValue::Integer(i) => OptionValue::Integer(i),
                    _ => return None,
                };
                Some((option.name, value))
            })
            .collect();

        let result = self
            .commands
            .try_handle(&command.data.name, &options, command.channel_id.get())
            .await;

        let (content, ephemeral) = match result {
            Some(result) => (result.message, result.ephemeral),
            None => {
                warn!("Received unknown command: /{}", command.data.name);
                ("Unknown command.".to_owned(), true)
            }
        };

        let message = CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(ephemeral);

        if let Err(e) = command
            .create_response(&ctx.http, CreateInteractionResponse::Message(message))
            .await
        {
            error!("Failed to respond to /{}: {}", command.data.name, e);
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        // Ready fires again after reconnects; the id never changes.
        let _ = self.bot_user.set(ready.user.id);
        info!("Logged in as {} (ID: {})", ready.user.name, ready.user.id);

        self.register_commands(&ctx).await;
        info!("Bot is ready and running.");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let author_is_self = self.bot_user.get() == Some(&msg.author.id);

        let mut state = self.state.write().await;
        let was_awaiting = state.is_awaiting_activity();
        if state.record_activity(msg.channel_id.get(), author_is_self, Utc::now()) && was_awaiting
        {
            debug!("Channel {} is active again", msg.channel_id);
            state.persist(self.state_path.as_deref());
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            self.respond(&ctx, &command).await;
        }
    }
}

/// Converts a command definition into a registration payload.
fn build_command(definition: &CommandDefinition) -> CreateCommand {
    definition.options.iter().fold(
        CreateCommand::new(definition.name).description(definition.description),
        |command, option| {
            let kind = match option.kind {
                OptionKind::String => CommandOptionType::String,
                OptionKind::Number => CommandOptionType::Number,
            };
            command.add_option(
                CreateCommandOption::new(kind, option.name, option.description)
                    .required(option.required),
            )
        },
    )
}

/// Gateway events the bot listens to.
///
/// Commands are registered globally and can be run in a DM, so DM messages
/// must count as activity too. Message content is never read.
fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES
}

/// Discord gateway connection.
pub struct DiscordBot {
    client: Client,
}

impl DiscordBot {
    /// Builds the gateway client.
    pub async fn connect(
        config: &DiscordConfig,
        commands: Arc<CommandHandler>,
        state: Arc<RwLock<ScheduleState>>,
        state_path: Option<std::path::PathBuf>,
    ) -> Result<Self, serenity::Error> {
        info!("Connecting to Discord...");

        let handler = Handler {
            commands,
            state,
            state_path,
            guild_id: config.guild_id,
            bot_user: OnceLock::new(),
        };

        let client = Client::builder(&config.token, gateway_intents())
            .event_handler(handler)
            .await?;

        Ok(Self { client })
    }

    /// Runs the gateway until `shutdown` resolves or the connection fails.
    pub async fn run(
        mut self,
        shutdown: impl std::future::Future<Output = ()> + Send,
    ) -> Result<(), serenity::Error> {
        let shard_manager = Arc::clone(&self.client.shard_manager);

        tokio::select! {
            result = self.client.start() => result,
            () = shutdown => {
                info!("Disconnecting from Discord...");
                shard_manager.shutdown_all().await;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for DiscordBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordBot").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serenity::http::ErrorResponse;

    use super::*;

    #[test]
    fn test_build_command_serializes_options() {
        let definitions = SlashCommand::definitions();
        let manual = definitions.iter().find(|d| d.name == "manual").unwrap();

        let value = serde_json::to_value(build_command(manual)).unwrap();
        assert_eq!(value["name"], "manual");
        assert_eq!(value["options"][0]["name"], "message");
        assert_eq!(value["options"][0]["required"], true);
        assert_eq!(value["options"][1]["name"], "interval_hours");
        // Discord's NUMBER option type.
        assert_eq!(value["options"][1]["type"], 10);
    }

    async fn http_failure(status: u16) -> serenity::Error {
        let response: reqwest::Response = axum::http::Response::builder()
            .status(status)
            .body(r#"{"code":50013,"message":"Missing Permissions"}"#)
            .unwrap()
            .into();
        let error = ErrorResponse::from_response(response, reqwest::Method::POST).await;
        serenity::Error::Http(HttpError::UnsuccessfulRequest(error))
    }

    #[tokio::test]
    async fn test_map_send_error_statuses() {
        assert!(matches!(
            map_send_error(7, http_failure(403).await),
            SendError::Forbidden(7)
        ));
        assert!(matches!(
            map_send_error(7, http_failure(404).await),
            SendError::ChannelNotFound(7)
        ));
        assert!(matches!(
            map_send_error(7, http_failure(500).await),
            SendError::Other(_)
        ));
    }

    #[test]
    fn test_intents_cover_direct_messages() {
        let intents = gateway_intents();
        assert!(intents.contains(GatewayIntents::GUILD_MESSAGES));
        assert!(intents.contains(GatewayIntents::DIRECT_MESSAGES));
        assert!(!intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn test_map_send_error_fallback() {
        let err = serenity::Error::Other("boom");
        assert!(matches!(map_send_error(1, err), SendError::Other(_)));
    }

    #[tokio::test]
    async fn test_zero_channel_is_not_found() {
        let announcer = DiscordAnnouncer::new("token");
        assert!(matches!(
            announcer.send(0, "hi").await,
            Err(SendError::ChannelNotFound(0))
        ));
        assert!(announcer.channel_name(0).await.is_none());
    }
}
