//! # Declarative
//!
//! A framework for two-phase declarative reconciliation.
//!
//! This crate provides the core abstractions for inspecting the state a
//! unit requires without side effects, deciding whether anything must
//! change, and committing real changes only when that is authorized.
//!
//! ## Core Concepts
//!
//! - **Reconciler**: A unit with `inspect`, `decide` and `commit` phases
//! - **PropertyState**: What one property of a unit reported
//! - **Phase**: The lifecycle state machine of one cycle
//! - **reconcile**: Drives a unit through one cycle, honoring dry runs
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExecuteOptions, reconcile_simple};
//!
//! let summary = reconcile_simple(&unit, &ExecuteOptions { dry_run: true })?;
//! println!("{} ended {}", summary.unit, summary.phase);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`PrivilegeContext`]: Identity resolution, run-as and ownership changes
//! - [`Reporter`]: Receives lifecycle events
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks or privilege mechanisms.

pub mod context;
pub mod executor;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoReport, PrivilegeContext, Reporter};
pub use executor::{reconcile, reconcile_simple};
pub use resource::Reconciler;
pub use types::{
    CycleSummary, Decision, ExecuteOptions, Identity, Phase, PropertyReport, PropertyState,
    SkipReason, TransitionError,
};
