//! Announcement schedule state.
//!
//! A single schedule is tracked at a time. Timestamps are wall-clock UTC so
//! the state can be written to disk and picked up again after a restart.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while persisting state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to write state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What gets posted when the schedule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnouncementMode {
    /// A fixed message repeated verbatim.
    Manual { message: String },
    /// A prompt handed to the AI generator on every run.
    Automatic { prompt: String },
}

impl AnnouncementMode {
    /// Human-readable mode label used in status replies.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "Manual (Fixed)",
            Self::Automatic { .. } => "Automatic (AI)",
        }
    }

    #[must_use]
    pub const fn is_automatic(&self) -> bool {
        matches!(self, Self::Automatic { .. })
    }
}

/// An active announcement schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Channel the announcements are posted to.
    pub channel_id: u64,

    /// Interval between announcements, in hours.
    pub interval_hours: f64,

    /// Manual or automatic content.
    pub mode: AnnouncementMode,
}

impl Schedule {
    #[must_use]
    pub const fn new(channel_id: u64, interval_hours: f64, mode: AnnouncementMode) -> Self {
        Self {
            channel_id,
            interval_hours,
            mode,
        }
    }

    /// Converts the interval to a [`Duration`].
    ///
    /// Returns `None` for non-positive, non-finite or overflowing intervals.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        if !(self.interval_hours.is_finite() && self.interval_hours > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(self.interval_hours * 3600.0).ok()
    }
}

/// Work item handed from the state to the scheduler when an announcement is due.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementJob {
    /// Revision of the schedule this job belongs to.
    pub revision: u64,
    pub channel_id: u64,
    pub mode: AnnouncementMode,
}

/// Outcome of a single scheduler check.
#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// No schedule is running.
    Idle,
    /// The interval has not elapsed yet, or a retry backoff is active.
    NotDue,
    /// Due, but nobody chatted since the last announcement.
    SkipIdle,
    /// Due and the channel has seen activity.
    Send(AnnouncementJob),
}

/// State of the announcement scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Running schedule, `None` when idle.
    pub schedule: Option<Schedule>,

    /// Incremented every time a schedule is started or stopped.
    #[serde(default)]
    pub revision: u64,

    /// When the bot last posted (or last skipped an idle channel).
    pub last_send_at: DateTime<Utc>,

    /// When a user last wrote in the scheduled channel.
    pub last_activity_at: DateTime<Utc>,

    /// Whether a user wrote in the channel since the last announcement.
    #[serde(default)]
    pub activity_since_send: bool,

    /// Earliest time the next attempt may run after a failure.
    #[serde(skip)]
    retry_not_before: Option<DateTime<Utc>>,
}

impl Default for ScheduleState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            schedule: None,
            revision: 0,
            last_send_at: now,
            last_activity_at: now,
            activity_since_send: false,
            retry_not_before: None,
        }
    }
}

impl ScheduleState {
    /// Creates an idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads state from a JSON file, returns an idle state if missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting idle", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Could not read state file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Saves state to a JSON file.
    ///
    /// Writes to a sibling temp file first so a crash never leaves a torn file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StateError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Saves to `path` when one is configured, logging instead of failing.
    pub fn persist(&self, path: Option<&Path>) {
        if let Some(path) = path {
            if let Err(e) = self.save(path) {
                warn!("Failed to save state to {}: {}", path.display(), e);
            }
        }
    }

    /// Whether a schedule is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.schedule.is_some()
    }

    /// Installs a new schedule, replacing any running one.
    ///
    /// The first announcement fires one full interval later regardless of chat
    /// activity.
    pub fn start(&mut self, schedule: Schedule, now: DateTime<Utc>) {
        self.schedule = Some(schedule);
        self.revision += 1;
        self.last_send_at = now;
        self.last_activity_at = now;
        self.activity_since_send = true;
        self.retry_not_before = None;
    }

    /// Stops the running schedule. Returns `false` if nothing was running.
    pub fn stop(&mut self) -> bool {
        if self.schedule.take().is_none() {
            return false;
        }
        self.revision += 1;
        self.retry_not_before = None;
        true
    }

    /// Records a user message. Only the scheduled channel counts.
    ///
    /// Returns `true` if the message was counted as activity.
    pub fn record_activity(
        &mut self,
        channel_id: u64,
        author_is_self: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if author_is_self {
            return false;
        }
        match &self.schedule {
            Some(schedule) if schedule.channel_id == channel_id => {
                self.last_activity_at = now;
                self.activity_since_send = true;
                true
            }
            _ => false,
        }
    }

    /// Decides what the scheduler should do at `now`.
    #[must_use]
    pub fn decide(&self, now: DateTime<Utc>) -> TickDecision {
        let Some(schedule) = &self.schedule else {
            return TickDecision::Idle;
        };
        let Some(interval) = schedule.interval() else {
            return TickDecision::Idle;
        };

        if self.retry_not_before.is_some_and(|t| now < t) {
            return TickDecision::NotDue;
        }

        let elapsed = (now - self.last_send_at).to_std().unwrap_or_default();
        if elapsed < interval {
            return TickDecision::NotDue;
        }

        if !self.activity_since_send {
            return TickDecision::SkipIdle;
        }

        TickDecision::Send(AnnouncementJob {
            revision: self.revision,
            channel_id: schedule.channel_id,
            mode: schedule.mode.clone(),
        })
    }

    /// Records a successful announcement for the given schedule revision.
    ///
    /// Returns `false` if the schedule changed while the announcement was in flight.
    pub fn mark_sent(&mut self, revision: u64, now: DateTime<Utc>) -> bool {
        if revision != self.revision {
            return false;
        }
        self.last_send_at = now;
        self.activity_since_send = false;
        self.retry_not_before = None;
        true
    }

    /// Restarts the interval clock after skipping an idle channel.
    pub fn mark_idle_skip(&mut self, now: DateTime<Utc>) {
        self.last_send_at = now;
    }

    /// Delays the next attempt after a failure.
    pub fn mark_failed(&mut self, revision: u64, now: DateTime<Utc>, backoff: Duration) {
        if revision != self.revision {
            return;
        }
        let backoff = chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
        self.retry_not_before = Some(now + backoff);
    }

    /// Time elapsed since the last announcement.
    #[must_use]
    pub fn time_since_last_send(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_send_at).to_std().unwrap_or_default()
    }

    /// Whether the schedule is held back until someone chats.
    #[must_use]
    pub const fn is_awaiting_activity(&self) -> bool {
        !self.activity_since_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(channel_id: u64, hours: f64) -> Schedule {
        Schedule::new(
            channel_id,
            hours,
            AnnouncementMode::Manual {
                message: "hello".to_owned(),
            },
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_default_state_is_idle() {
        let state = ScheduleState::new();
        assert!(!state.is_running());
        assert_eq!(state.decide(Utc::now()), TickDecision::Idle);
    }

    #[test]
    fn test_interval_conversion() {
        assert_eq!(manual(1, 0.5).interval(), Some(Duration::from_secs(1800)));
        assert_eq!(manual(1, 0.0).interval(), None);
        assert_eq!(manual(1, -1.0).interval(), None);
        assert_eq!(manual(1, f64::NAN).interval(), None);
        assert_eq!(manual(1, f64::INFINITY).interval(), None);
    }

    #[test]
    fn test_first_interval_sends_without_activity() {
        let mut state = ScheduleState::new();
        state.start(manual(7, 1.0), at(0));

        assert_eq!(state.decide(at(3599)), TickDecision::NotDue);
        match state.decide(at(3600)) {
            TickDecision::Send(job) => {
                assert_eq!(job.channel_id, 7);
                assert_eq!(job.revision, state.revision);
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_idle_channel_is_skipped_and_clock_restarts() {
        let mut state = ScheduleState::new();
        state.start(manual(7, 1.0), at(0));
        let revision = state.revision;

        assert!(state.mark_sent(revision, at(3600)));
        assert!(state.is_awaiting_activity());
        assert_eq!(state.decide(at(7200)), TickDecision::SkipIdle);

        state.mark_idle_skip(at(7200));
        assert_eq!(state.decide(at(7201)), TickDecision::NotDue);
    }

    #[test]
    fn test_activity_only_counts_in_scheduled_channel() {
        let mut state = ScheduleState::new();
        state.start(manual(7, 1.0), at(0));
        let revision = state.revision;
        state.mark_sent(revision, at(3600));

        assert!(!state.record_activity(8, false, at(3700)));
        assert!(!state.record_activity(7, true, at(3700)));
        assert!(state.is_awaiting_activity());

        assert!(state.record_activity(7, false, at(3800)));
        assert!(matches!(state.decide(at(7200)), TickDecision::Send(_)));
    }

    #[test]
    fn test_activity_in_dm_schedule_resumes_posting() {
        // DM channel ids are plain channel ids; the schedule does not care.
        let dm_channel = 1_180_000_000_000_000_000;
        let mut state = ScheduleState::new();
        state.start(manual(dm_channel, 1.0), at(0));
        let revision = state.revision;

        assert!(state.mark_sent(revision, at(3600)));
        assert_eq!(state.decide(at(7200)), TickDecision::SkipIdle);
        state.mark_idle_skip(at(7200));

        assert!(state.record_activity(dm_channel, false, at(7300)));
        assert!(matches!(
            state.decide(at(10_800)),
            TickDecision::Send(job) if job.channel_id == dm_channel
        ));
    }

    #[test]
    fn test_stale_revision_does_not_write_back() {
        let mut state = ScheduleState::new();
        state.start(manual(7, 1.0), at(0));
        let old_revision = state.revision;

        state.start(manual(9, 2.0), at(100));
        assert!(!state.mark_sent(old_revision, at(3600)));
        assert_eq!(state.last_send_at, at(100));
    }

    #[test]
    fn test_failure_backoff_delays_retry() {
        let mut state = ScheduleState::new();
        state.start(manual(7, 1.0), at(0));
        let revision = state.revision;

        state.mark_failed(revision, at(3600), Duration::from_secs(60));
        assert_eq!(state.decide(at(3630)), TickDecision::NotDue);
        assert!(matches!(state.decide(at(3660)), TickDecision::Send(_)));
    }

    #[test]
    fn test_stop() {
        let mut state = ScheduleState::new();
        assert!(!state.stop());

        state.start(manual(7, 1.0), at(0));
        assert!(state.stop());
        assert_eq!(state.decide(at(10_000)), TickDecision::Idle);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = ScheduleState::new();
        state.start(
            Schedule::new(
                42,
                2.5,
                AnnouncementMode::Automatic {
                    prompt: "daily tip".to_owned(),
                },
            ),
            at(0),
        );
        state.save(&path).unwrap();

        let loaded = ScheduleState::load(&path);
        assert_eq!(loaded.schedule, state.schedule);
        assert_eq!(loaded.revision, state.revision);
        assert_eq!(loaded.last_send_at, at(0));
        assert!(loaded.activity_since_send);
    }

    #[test]
    fn test_load_missing_or_corrupt_file_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(!ScheduleState::load(&missing).is_running());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        assert!(!ScheduleState::load(&corrupt).is_running());
    }
}
