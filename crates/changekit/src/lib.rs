//! # Changekit
//!
//! Orchestration core for reversible, idempotent system changes.
//!
//! A workstation is provisioned by running a batch of change units against
//! external state (files, installed packages). This crate provides the
//! contract every unit implements and the engine that drives them.
//!
//! ## Core Concepts
//!
//! - **Change**: A reversible, idempotent operation (write a file, install a package)
//! - **Target**: The resource a change claims, identified by a deterministic checksum
//! - **TargetLock**: A target plus the longest the engine waits to acquire it
//! - **ChangeResult**: The `SUCCESS` / `FAILED` / `WARN` outcome of one invocation
//! - **ChangeEngine**: Runs a selection of registered changes sequentially,
//!   holding their locks and isolating failures per unit
//!
//! ## Example
//!
//! ```ignore
//! use changekit::{
//!     Change, ChangeContext, ChangeEngine, ChangeResult, LogFacade, Registry,
//!     RunOptions, Target, TargetLock,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Touch { path: String }
//!
//! impl Change for Touch {
//!     fn name(&self) -> &str { "touch" }
//!     fn description(&self) -> String { format!("Create {}", self.path) }
//!
//!     fn locks(&self) -> Vec<TargetLock> {
//!         let target = Target::new(&self.path, "file path", &[&self.path]);
//!         vec![TargetLock::secs(target, 30)]
//!     }
//!
//!     fn is_applied(&self) -> anyhow::Result<bool> {
//!         Ok(std::path::Path::new(&self.path).exists())
//!     }
//!
//!     fn apply(&self, _ctx: &ChangeContext) -> anyhow::Result<ChangeResult> {
//!         std::fs::write(&self.path, "")?;
//!         Ok(ChangeResult::success(format!("Created {}", self.path)))
//!     }
//!
//!     fn rollback(&self, _ctx: &ChangeContext) -> anyhow::Result<ChangeResult> {
//!         Ok(ChangeResult::warn("Rollback not supported"))
//!     }
//! }
//!
//! let registry = Registry::new(vec![Arc::new(Touch { path: "/tmp/x".into() })])?;
//! let engine = ChangeEngine::new(registry, Arc::new(LogFacade));
//! let report = engine.apply(&["touch"], &RunOptions::default())?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`ChangeLog`]: Receives plain and source-qualified log lines
//! - [`ProgressCallback`]: Receives per-unit progress updates
//!
//! This keeps the engine free of any terminal or logging backend.

pub mod change;
pub mod engine;
pub mod error;
pub mod lock;
pub mod logging;
pub mod registry;
pub mod target;
pub mod types;

// Re-export main types at crate root
pub use change::{Change, ChangeContext, ParentLink, PATH_SEPARATOR};
pub use engine::{ChangeEngine, NoProgress, ProgressCallback};
pub use error::{Error, Result};
pub use lock::{LockManager, LockSet};
pub use logging::{ChangeLog, LogFacade};
pub use registry::Registry;
pub use target::{Target, TargetLock, checksum};
pub use types::{
    BatchReport, BatchSummary, ChangeResult, ChangeStatus, Operation, RunOptions, UnitOutcome,
    UnitReport,
};
