//! Translalia — incremental poetry translation with ranked variants.
//!
//! A poem becomes one job with a fixed set of units (lines or stanzas).
//! Repeated, bounded [`scheduler::TickScheduler::tick`] invocations move
//! units through their lifecycle independently: each attempt produces three
//! ranked variants with word alignments, failures back off exponentially per
//! unit, and a shared rate limit caps generation calls across ticks.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod notify;
pub mod progress;
pub mod provider;
pub mod ratelimit;
pub mod scheduler;
pub mod segment;
pub mod translator;
pub mod ui;

pub use error::{TranslaliaError, TranslationFailure};
