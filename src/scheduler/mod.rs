//! Announcement scheduler module.
//!
//! Tracks the active schedule and posts announcements
//! at the configured interval.

mod runner;
mod state;

pub use runner::{AnnouncementScheduler, SchedulerMessage, format_announcement};
pub use state::{
    AnnouncementJob, AnnouncementMode, Schedule, ScheduleState, StateError, TickDecision,
};
