//! # weeknotes-core
//!
//! Core library for weeknotes - incremental summaries of a notes vault,
//! rolled up into a weekly report.
//!
//! This library provides:
//! - Change detection over a directory of Markdown notes
//! - Per-note summarization with bounded collaborator input
//! - An append-only, crash-safe summary log
//! - Topic aggregation and report rendering
//! - Idempotent publishing to an issue tracker
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Two stages share the summary log:
//! - **Scan:** vault → change detector → summarizer → summary log (append)
//! - **Report:** summary log (window) → aggregator → report store → publisher
//!
//! The scan stage runs often and is cheap when nothing changed; the report
//! stage runs once per period and never mutates the log.
//!
//! ## Example
//!
//! ```rust,no_run
//! use weeknotes_core::store::SummaryLog;
//! use weeknotes_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! let log = SummaryLog::open_read_only(&Config::summary_log_path()).expect("failed to open log");
//! println!("{} summaries recorded", log.len());
//! ```

// Re-export commonly used items at the crate root
pub use aggregate::{aggregate, build_report, ReportOutcome, TopicClusterer};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{ScanCoordinator, ScanOptions, ScanResult};
pub use publish::{publish, IssueTracker};
pub use store::{ReportStore, RunState, SummaryLog};
pub use summarize::Summarizer;
pub use types::*;

// Public modules
pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod preview;
pub mod publish;
pub mod store;
pub mod summarize;
pub mod types;
