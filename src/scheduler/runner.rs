//! Announcement scheduler runner.
//!
//! Every tick the scheduler asks the state what to do:
//! 1. Idle or not due → nothing
//! 2. Due but the channel stayed quiet since the last post → restart the
//!    interval clock without posting (anti-stacking)
//! 3. Due with activity → resolve the text (fixed message or AI generation),
//!    post it, and record the send
//!
//! No lock is held while generating or sending. A send only writes back if
//! the schedule was not replaced in the meantime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::{AnnouncementJob, AnnouncementMode, ScheduleState, TickDecision};
use crate::ai::{AiError, MessageGenerator};
use crate::config::{ANNOUNCEMENT_PREFIX, MAX_ANNOUNCEMENT_BODY};
use crate::discord::Announcer;

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// Stop the scheduler.
    Shutdown,
}

/// Posts scheduled announcements.
pub struct AnnouncementScheduler {
    /// Posts to Discord.
    announcer: Arc<dyn Announcer>,

    /// Generates automatic announcements; `None` when AI is not configured.
    generator: Option<Arc<dyn MessageGenerator>>,

    /// Scheduler state.
    state: Arc<RwLock<ScheduleState>>,

    /// Path to save persistent state.
    state_path: Option<PathBuf>,

    /// Check interval for state changes.
    check_interval: Duration,

    /// Delay before retrying a failed announcement.
    retry_backoff: Duration,
}

impl AnnouncementScheduler {
    /// Creates a new announcement scheduler.
    #[must_use]
    pub fn new(
        announcer: Arc<dyn Announcer>,
        generator: Option<Arc<dyn MessageGenerator>>,
        state: Arc<RwLock<ScheduleState>>,
        state_path: Option<PathBuf>,
    ) -> Self {
        Self {
            announcer,
            generator,
            state,
            state_path,
            check_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(60),
        }
    }

    /// Sets the check interval for state changes.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets the delay before retrying a failed announcement.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Runs the scheduler loop.
    pub async fn run(&self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        info!("Announcement scheduler started");

        let mut check_timer = interval(self.check_interval);
        check_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // A shutdown (or a closed channel) also cancels an announcement in flight.
        loop {
            tokio::select! {
                _ = check_timer.tick() => {}
                _ = rx.recv() => break,
            }
            tokio::select! {
                () = self.tick() => {}
                _ = rx.recv() => break,
            }
        }

        info!("Scheduler shutting down");
    }

    /// Single tick of the scheduler.
    pub async fn tick(&self) {
        let now = Utc::now();
        let decision = self.state.read().await.decide(now);

        match decision {
            TickDecision::Idle | TickDecision::NotDue => {}
            TickDecision::SkipIdle => {
                let mut state = self.state.write().await;
                // Re-check under the write lock, a message may have arrived.
                if state.decide(now) == TickDecision::SkipIdle {
                    state.mark_idle_skip(now);
                    state.persist(self.state_path.as_deref());
                    info!(
                        "Channel is idle since last announcement. Skipping to prevent spam."
                    );
                }
            }
            TickDecision::Send(job) => self.announce(job).await,
        }
    }

    async fn announce(&self, job: AnnouncementJob) {
        let body = match self.resolve_text(&job.mode).await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to prepare announcement: {}", e);
                self.mark_failed(job.revision).await;
                return;
            }
        };

        let content = format_announcement(&body);
        match self.announcer.send(job.channel_id, &content).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                if state.mark_sent(job.revision, Utc::now()) {
                    state.persist(self.state_path.as_deref());
                    info!(
                        "Scheduled announcement sent to channel {}",
                        job.channel_id
                    );
                } else {
                    debug!("Schedule changed while sending; not recording send");
                }
            }
            Err(e) => {
                error!("Error sending announcement: {}", e);
                self.mark_failed(job.revision).await;
            }
        }
    }

    async fn resolve_text(&self, mode: &AnnouncementMode) -> Result<String, AiError> {
        match mode {
            AnnouncementMode::Manual { message } => Ok(message.clone()),
            AnnouncementMode::Automatic { prompt } => match &self.generator {
                Some(generator) => generator.generate(prompt).await,
                None => Err(AiError::MissingApiKey),
            },
        }
    }

    async fn mark_failed(&self, revision: u64) {
        let mut state = self.state.write().await;
        state.mark_failed(revision, Utc::now(), self.retry_backoff);
        debug!("Next attempt in {:?}", self.retry_backoff);
    }
}

impl std::fmt::Debug for AnnouncementScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncementScheduler")
            .field("check_interval", &self.check_interval)
            .field("retry_backoff", &self.retry_backoff)
            .field("ai_enabled", &self.generator.is_some())
            .finish_non_exhaustive()
    }
}

/// Prefixes the body and clips it to a single Discord message.
#[must_use]
pub fn format_announcement(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_ANNOUNCEMENT_BODY {
        return format!("{ANNOUNCEMENT_PREFIX}{body}");
    }

    let clipped: String = body.chars().take(MAX_ANNOUNCEMENT_BODY - 1).collect();
    format!("{ANNOUNCEMENT_PREFIX}{clipped}…")
}
