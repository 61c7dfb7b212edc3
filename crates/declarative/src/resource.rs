//! Reconciler trait for two-phase declarative state management
//!
//! A reconciliation unit is inspected without side effects, a decision
//! is derived from the inspection, and only then are real changes made.

use crate::types::{Decision, PropertyReport};
use anyhow::Result;
use std::fmt;

/// Core trait for reconciliation units
///
/// Every unit provides:
/// - Identity (id, description)
/// - Inspection (side-effect free, produces an explicit result value)
/// - Decision (derived from the inspection's property states)
/// - Commit (the only place real changes happen)
///
/// The inspection result is threaded from `inspect` into `commit`
/// instead of being stored on the unit, so no state leaks between phases.
///
/// # Example
///
/// ```ignore
/// use declarative::{Reconciler, PropertyReport, PropertyState};
///
/// #[derive(Debug)]
/// struct Marker { path: std::path::PathBuf }
///
/// impl Reconciler for Marker {
///     type Inspection = bool;
///
///     fn id(&self) -> String { self.path.display().to_string() }
///     fn description(&self) -> String { format!("Marker file {}", self.id()) }
///
///     fn inspect(&self) -> anyhow::Result<bool> {
///         Ok(self.path.exists())
///     }
///
///     fn properties(&self, exists: &bool) -> Vec<PropertyReport> {
///         let state = if *exists { PropertyState::NoChanges } else { PropertyState::ChangesRequired };
///         vec![PropertyReport::new("marker", state)]
///     }
///
///     fn commit(&self, _exists: &bool) -> anyhow::Result<Vec<PropertyReport>> {
///         std::fs::write(&self.path, "")?;
///         Ok(vec![PropertyReport::new("marker", PropertyState::Changed)])
///     }
/// }
/// ```
pub trait Reconciler: fmt::Debug {
    /// Everything Inspect learned, consumed by Decide and Commit
    type Inspection;

    /// Unique identifier for this unit
    fn id(&self) -> String;

    /// Human-readable description of what this unit manages
    fn description(&self) -> String;

    /// Determine the required state without touching real state
    fn inspect(&self) -> Result<Self::Inspection>;

    /// Per-property states derived from an inspection
    fn properties(&self, inspection: &Self::Inspection) -> Vec<PropertyReport>;

    /// Whether a commit is needed
    ///
    /// Default implementation: any property out of sync needs a commit.
    fn decide(&self, inspection: &Self::Inspection) -> Decision {
        if self
            .properties(inspection)
            .iter()
            .all(|p| p.state.is_in_sync())
        {
            Decision::NoChange
        } else {
            Decision::ChangeNeeded
        }
    }

    /// Apply real changes for everything the inspection found
    ///
    /// Only called after a `ChangeNeeded` decision outside dry-run mode.
    fn commit(&self, inspection: &Self::Inspection) -> Result<Vec<PropertyReport>>;
}
