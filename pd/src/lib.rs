//! PostDaemon - scheduled video poster with caption rotation
//!
//! Posts videos to social platforms on a weekly schedule. Every video has a
//! fixed set of pre-written captions; each successful post uses the next one,
//! wrapping around, and the position survives restarts in a JSON history file
//! (see the `uploadstore` crate).
//!
//! # Modules
//!
//! - [`orchestrator`] - One upload attempt: pick caption, post, record
//! - [`schedule`] - Weekly slots and the scheduling loop
//! - [`uploader`] - Platform uploaders (external commands)
//! - [`caption`] - Optional AI-generated captions via [`llm`]
//! - [`video`] - Video files on disk and compression
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agent;
pub mod caption;
pub mod check;
pub mod cli;
pub mod config;
pub mod exec;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod schedule;
pub mod status;
pub mod uploader;
pub mod video;

pub use agent::Agent;
pub use config::Config;
pub use orchestrator::{Orchestrator, SlotReport, UploadError, UploadOutcome};
pub use schedule::WeeklySchedule;
pub use uploader::{Platform, Uploader};
