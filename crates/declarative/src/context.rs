//! Provider traits for privilege, reporting and confirmation
//!
//! These traits allow the declarative crate to be used without
//! depending on specific implementations of identity switching, UI, etc.

use crate::types::{Decision, Identity, Phase, PropertyReport};
use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Capability for acting as another user
///
/// Implement this trait to provide identity lookup, privilege switching
/// for child processes and ownership changes. Test doubles can simulate
/// lookup or ownership failures without real system accounts.
pub trait PrivilegeContext: Send + Sync {
    /// Resolve a user name (or numeric uid) into a full identity
    fn resolve_identity(&self, user: &str) -> Result<Identity>;

    /// Configure `command` so the spawned process runs as `identity`
    ///
    /// Must fail if the calling process cannot assume that identity.
    fn run_as(&self, identity: &Identity, command: &mut Command) -> Result<()>;

    /// Give `path` to `identity`'s user and primary group
    ///
    /// A symlink at `path` is changed itself, never its target.
    fn chown(&self, path: &Path, identity: &Identity) -> Result<()>;
}

/// Receives lifecycle events during a cycle
///
/// Implement this trait to drive progress output.
pub trait Reporter {
    /// Called on every phase transition
    fn on_phase(&mut self, unit: &str, phase: Phase);

    /// Called once Inspect and Decide have completed
    fn on_inspected(&mut self, unit: &str, decision: Decision, properties: &[PropertyReport]);

    /// Called once Commit has completed
    fn on_committed(&mut self, unit: &str, properties: &[PropertyReport]);
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op reporter
pub struct NoReport;

impl Reporter for NoReport {
    fn on_phase(&mut self, _unit: &str, _phase: Phase) {}
    fn on_inspected(&mut self, _unit: &str, _decision: Decision, _properties: &[PropertyReport]) {}
    fn on_committed(&mut self, _unit: &str, _properties: &[PropertyReport]) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
