//! Core types for two-phase reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// State reported by one property of a reconciliation unit
///
/// Every property's goal state is an "in sync" sentinel, so anything
/// else drives the unit towards a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyState {
    /// Inspection found nothing to do
    NoChanges,
    /// An audit run completed and reported nothing to do
    RunNoChanges,
    /// Inspection found work to do
    ChangesRequired,
    /// Commit applied changes
    Changed,
}

impl PropertyState {
    /// Whether this state matches the goal state
    pub fn is_in_sync(&self) -> bool {
        matches!(self, Self::NoChanges | Self::RunNoChanges)
    }
}

impl fmt::Display for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoChanges => "no_changes",
            Self::RunNoChanges => "run_no_changes",
            Self::ChangesRequired => "changes_required",
            Self::Changed => "changed",
        };
        f.write_str(s)
    }
}

/// A property's state plus optional user-facing detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyReport {
    /// Property name (e.g. "files", "exec")
    pub property: String,
    pub state: PropertyState,
    /// Free-form detail: diffs, captured output
    pub detail: Option<String>,
}

impl PropertyReport {
    pub fn new(property: impl Into<String>, state: PropertyState) -> Self {
        Self {
            property: property.into(),
            state,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.is_empty() {
            self.detail = Some(detail);
        }
        self
    }
}

/// Outcome of the Decide phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    NoChange,
    ChangeNeeded,
}

/// Why a cycle ended without committing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Every property was already in sync
    InSync,
    /// Changes were needed but the cycle was a dry run
    DryRun,
    /// Changes were needed but the operator declined
    Declined,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InSync => f.write_str("in sync"),
            Self::DryRun => f.write_str("dry run"),
            Self::Declined => f.write_str("declined"),
        }
    }
}

/// Lifecycle phase of one reconciliation cycle
///
/// `Unevaluated → Inspecting → Decided → (Committing → Committed) | Skipped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unevaluated,
    Inspecting,
    Decided(Decision),
    Committing,
    Committed,
    Skipped(SkipReason),
}

impl Phase {
    /// Whether the cycle has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Skipped(_))
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(self, next: Phase) -> Result<Phase, TransitionError> {
        let allowed = match (self, next) {
            (Self::Unevaluated, Self::Inspecting) => true,
            (Self::Inspecting, Self::Decided(_)) => true,
            (Self::Decided(Decision::ChangeNeeded), Self::Committing) => true,
            (Self::Decided(Decision::ChangeNeeded), Self::Skipped(reason)) => {
                reason != SkipReason::InSync
            }
            (Self::Decided(Decision::NoChange), Self::Skipped(SkipReason::InSync)) => true,
            (Self::Committing, Self::Committed) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unevaluated => f.write_str("unevaluated"),
            Self::Inspecting => f.write_str("inspecting"),
            Self::Decided(Decision::NoChange) => f.write_str("decided (no change)"),
            Self::Decided(Decision::ChangeNeeded) => f.write_str("decided (change needed)"),
            Self::Committing => f.write_str("committing"),
            Self::Committed => f.write_str("committed"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// An illegal lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid lifecycle transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

/// A resolved user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.uid, self.gid)
    }
}

/// Options for one reconciliation cycle
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Inspect and decide only, never commit
    pub dry_run: bool,
}

/// Result of one reconciliation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary<I> {
    /// Identifier of the unit
    pub unit: String,
    /// Terminal phase
    pub phase: Phase,
    pub decision: Decision,
    /// Property states from the Inspect phase
    pub inspected: Vec<PropertyReport>,
    /// Property states from the Commit phase (empty when skipped)
    pub committed: Vec<PropertyReport>,
    /// The unit's inspection result, handed back for reporting
    pub inspection: I,
}

impl<I> CycleSummary<I> {
    pub fn is_committed(&self) -> bool {
        self.phase == Phase::Committed
    }

    /// Number of properties that were out of sync at inspection
    pub fn pending_changes(&self) -> usize {
        self.inspected.iter().filter(|p| !p.state.is_in_sync()).count()
    }

    /// Number of properties that reported a change during commit
    pub fn total_changes(&self) -> usize {
        self.committed
            .iter()
            .filter(|p| p.state == PropertyState::Changed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_sync_states() {
        assert!(PropertyState::NoChanges.is_in_sync());
        assert!(PropertyState::RunNoChanges.is_in_sync());
        assert!(!PropertyState::ChangesRequired.is_in_sync());
        assert!(!PropertyState::Changed.is_in_sync());
    }

    #[test]
    fn test_commit_path_transitions() {
        let phase = Phase::Unevaluated
            .advance(Phase::Inspecting)
            .and_then(|p| p.advance(Phase::Decided(Decision::ChangeNeeded)))
            .and_then(|p| p.advance(Phase::Committing))
            .and_then(|p| p.advance(Phase::Committed))
            .unwrap();
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_no_change_cannot_commit() {
        let err = Phase::Decided(Decision::NoChange)
            .advance(Phase::Committing)
            .unwrap_err();
        assert_eq!(err.from, Phase::Decided(Decision::NoChange));
    }

    #[test]
    fn test_change_needed_cannot_skip_as_in_sync() {
        assert!(
            Phase::Decided(Decision::ChangeNeeded)
                .advance(Phase::Skipped(SkipReason::InSync))
                .is_err()
        );
        assert!(
            Phase::Decided(Decision::ChangeNeeded)
                .advance(Phase::Skipped(SkipReason::DryRun))
                .is_ok()
        );
    }

    #[test]
    fn test_cannot_skip_inspection() {
        assert!(Phase::Unevaluated.advance(Phase::Committing).is_err());
        assert!(Phase::Committed.advance(Phase::Inspecting).is_err());
    }

    #[test]
    fn test_report_ignores_empty_detail() {
        let report = PropertyReport::new("exec", PropertyState::Changed).with_detail("");
        assert!(report.detail.is_none());
    }
}
