//! Announcer Bot Library
//!
//! A Discord bot that posts scheduled announcements to a channel.
//!
//! This crate provides the core functionality for:
//! - Scheduling fixed or AI-generated announcements via slash commands
//! - Skipping announcements while the channel stays quiet
//! - Generating announcement text with the Gemini API
//! - Serving a keep-alive HTTP endpoint for container hosts

pub mod ai;
pub mod commands;
pub mod config;
pub mod discord;
pub mod scheduler;
pub mod web;
