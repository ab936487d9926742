//! Command types and definitions.

use std::fmt;

/// Value of a resolved slash command option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Number(f64),
    Integer(i64),
}

impl OptionValue {
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            Self::String(s) => s.trim().parse().ok(),
        }
    }
}

/// Kind of a declared command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Number,
}

/// Declared option of a slash command, used for registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
}

/// Declared slash command, used for registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<OptionDefinition>,
}

const INTERVAL_OPTION: OptionDefinition = OptionDefinition {
    name: "interval_hours",
    description: "The interval in hours (e.g., 2 or 0.5).",
    kind: OptionKind::Number,
    required: true,
};

/// Available slash commands.
#[derive(Debug, Clone, PartialEq)]
pub enum SlashCommand {
    /// Schedule a fixed message.
    Manual { message: String, interval_hours: f64 },

    /// Schedule an AI-generated message.
    Automatic { prompt: String, interval_hours: f64 },

    /// Stop the running schedule.
    Stop,

    /// Show the running schedule.
    Status,
}

impl SlashCommand {
    /// Parses a command from its name and resolved options.
    ///
    /// Returns `None` for unknown commands or missing required options.
    #[must_use]
    pub fn parse(name: &str, options: &[(&str, OptionValue)]) -> Option<Self> {
        let get = |key: &str| {
            options
                .iter()
                .find(|(option_name, _)| *option_name == key)
                .map(|(_, value)| value)
        };

        match name {
            "manual" => Some(Self::Manual {
                message: get("message")?.as_str()?.to_owned(),
                interval_hours: get("interval_hours")?.as_f64()?,
            }),
            "automatic" => Some(Self::Automatic {
                prompt: get("prompt")?.as_str()?.to_owned(),
                interval_hours: get("interval_hours")?.as_f64()?,
            }),
            "stop" => Some(Self::Stop),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    /// Returns the command name as registered with Discord.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "manual",
            Self::Automatic { .. } => "automatic",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }

    /// Returns all commands with their options.
    #[must_use]
    pub fn definitions() -> Vec<CommandDefinition> {
        vec![
            CommandDefinition {
                name: "manual",
                description: "Schedule a fixed message to be sent at intervals.",
                options: vec![
                    OptionDefinition {
                        name: "message",
                        description: "The exact message to repeat.",
                        kind: OptionKind::String,
                        required: true,
                    },
                    INTERVAL_OPTION,
                ],
            },
            CommandDefinition {
                name: "automatic",
                description: "Schedule an AI-generated message based on a prompt.",
                options: vec![
                    OptionDefinition {
                        name: "prompt",
                        description: "The prompt for the AI.",
                        kind: OptionKind::String,
                        required: true,
                    },
                    INTERVAL_OPTION,
                ],
            },
            CommandDefinition {
                name: "stop",
                description: "Stop the currently running scheduled announcement.",
                options: Vec::new(),
            },
            CommandDefinition {
                name: "status",
                description: "Check the status of the current scheduled announcement.",
                options: Vec::new(),
            },
        ]
    }
}

impl fmt::Display for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual { interval_hours, .. } | Self::Automatic { interval_hours, .. } => {
                write!(f, "/{} (every {interval_hours}h)", self.name())
            }
            _ => write!(f, "/{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Response message to show the user.
    pub message: String,

    /// Whether only the invoking user sees the response.
    pub ephemeral: bool,
}

impl CommandResult {
    /// Creates a response visible to the whole channel.
    #[must_use]
    pub fn public(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ephemeral: false,
        }
    }

    /// Creates a response visible only to the invoking user.
    #[must_use]
    pub fn ephemeral(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ephemeral: true,
        }
    }
}
