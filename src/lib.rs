//! hsnap: point-in-time, hard-link deduplicated snapshots driven by rsync.
//!
//! This crate provides the run lifecycle (locking, checks, transfer,
//! verification, publication, retention) used by the `hsnap` CLI.

pub mod args;
pub mod binary;
pub mod config;
pub mod constants;
pub mod disk;
pub mod error;
pub mod lock;
pub mod logger;
pub mod orchestrator;
pub mod path_util;
pub mod probe;
pub mod process;
pub mod signal;
pub mod snapshot;

pub use config::Config;
pub use error::{Result, SnapshotError, Warning};
pub use orchestrator::{BackupOrchestrator, RunReport, RunState};
