//! # warden
//!
//! Batch moderation-action orchestrator for channel networks fronted by a
//! rate-limited directory/action service.
//!
//! ## Overview
//!
//! This library drives restrict (ban), lift (unban) and remove (kick)
//! requests across named groups of channels. The core is the batch loop:
//! a retry/backoff engine that honors service-signaled rate-limit waits,
//! a fixed inter-action throttle, ordered fan-out with partial-failure
//! aggregation, and a staged delayed-start protocol with countdown and
//! cadence progress updates. Everything around that loop (the channel-group
//! registry, membership rosters, the persistence layer) is deliberately thin.
//!
//! ## Design Notes
//!
//! - **Sequential by contract**: one action in flight at a time, throttled,
//!   so the external service's rate limits stay tractable.
//! - **Partial failure is normal**: per-target failures become report rows,
//!   never request errors; a batch always runs to the end of its plan.
//! - **Pluggable seams**: the directory service, the registry store and the
//!   progress destination are traits with in-memory implementations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use warden::directory::Directory;
//! use warden::registry::{JsonFileStore, Registry};
//! use warden::types::SubjectId;
//! use warden::{BatchRunner, OperationRequest, Subject, TargetScope};
//!
//! # fn directory() -> Arc<dyn Directory> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> warden::Result<()> {
//!     let store = Arc::new(JsonFileStore::in_dir("."));
//!     let registry = Arc::new(Registry::open(store, BTreeSet::from([SubjectId(1)])).await?);
//!
//!     let runner = BatchRunner::builder()
//!         .with_directory(directory())
//!         .with_registry(registry)
//!         .build()?;
//!
//!     let request = OperationRequest::restrict(
//!         Subject::new(SubjectId(424242)).with_handle("spammer"),
//!         TargetScope::group("vip"),
//!     );
//!     let report = runner.run(&request).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Identities, actions, requests and scopes |
//! | [`directory`] | Directory/action service trait and test double |
//! | [`registry`] | Channel groups and exemptions, persisted as JSON |
//! | [`resilience`] | Retry executor and inter-action throttle |
//! | [`progress`] | Progress sinks and the cadence reporter |
//! | [`report`] | Per-target outcomes and batch reports |
//! | [`runner`] | The batch orchestrator itself |
//! | [`roster`] | Membership snapshots and channel probes |

pub mod directory;
pub mod progress;
pub mod registry;
pub mod report;
pub mod resilience;
pub mod roster;
pub mod runner;
pub mod types;

// Re-export main types for convenience
pub use report::{BatchReport, OperationResult, Outcome};
pub use runner::{BatchRunner, BatchRunnerBuilder};
pub use types::{ActionKind, OperationRequest, Subject, TargetScope};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
