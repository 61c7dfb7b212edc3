//! Per-cycle deployment description and its cross-field invariants

use manifest::FileManifest;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ReconcileError, Result};
use crate::runner::Mode;

/// Exit status reserved for "command not found"
pub const EXIT_NOT_FOUND: i32 = 127;

/// Immutable configuration of one reconciliation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSpec {
    /// Resource name used in every report and error
    pub name: String,
    /// Absolute directory the manifest is deployed into
    pub deploy_path: PathBuf,
    /// User that owns the files and runs the script
    pub owner: String,
    /// Manifest key of the script to run
    pub script_name: String,
    pub timeout_seconds: u64,
    /// `KEY=VALUE` entries for the script's environment
    pub environment: Vec<String>,
    pub audit_params: Vec<String>,
    pub apply_params: Vec<String>,
    /// Exit codes meaning "changes pending"
    pub change_codes: BTreeSet<i32>,
    /// Exit codes meaning "functional warning"
    pub warning_codes: BTreeSet<i32>,
}

impl DeploymentSpec {
    /// Check every invariant that spans more than one field
    pub fn validate(&self, manifest: &FileManifest) -> Result<()> {
        let fail = |msg: String| Err(ReconcileError::config(&self.name, msg));

        if self.name.trim().is_empty() {
            return Err(ReconcileError::config("<unnamed>", "name must not be empty"));
        }
        if !self.deploy_path.is_absolute() {
            return fail(format!(
                "deploy_path must be absolute: {}",
                self.deploy_path.display()
            ));
        }
        if self.owner.trim().is_empty() {
            return fail("owner must not be empty".into());
        }
        if !manifest.contains(&self.script_name) {
            return fail(format!(
                "script `{}` is not one of the managed files",
                self.script_name
            ));
        }
        if self.timeout_seconds == 0 {
            return fail("timeout must be a positive number of seconds".into());
        }
        if let Some(bad) = self.environment.iter().find(|e| !e.contains('=')) {
            return fail(format!("environment entry `{bad}` is not KEY=VALUE"));
        }
        if self.audit_params.is_empty() {
            return fail("audit_params must not be empty".into());
        }
        if self.apply_params.is_empty() {
            return fail("apply_params must not be empty".into());
        }
        if self.audit_params.join(" ") == self.apply_params.join(" ") {
            return fail("audit_params and apply_params must differ".into());
        }

        for (label, codes) in [
            ("change_codes", &self.change_codes),
            ("warning_codes", &self.warning_codes),
        ] {
            if let Some(code) = codes.iter().find(|c| **c < 0) {
                return fail(format!("{label} contains negative code {code}"));
            }
            if codes.contains(&0) || codes.contains(&EXIT_NOT_FOUND) {
                return fail(format!(
                    "{label} must not contain 0 or {EXIT_NOT_FOUND}"
                ));
            }
        }
        if let Some(code) = self.change_codes.intersection(&self.warning_codes).next() {
            return fail(format!(
                "code {code} is both a change code and a warning code"
            ));
        }

        Ok(())
    }

    /// Parameters for the given mode
    pub fn params(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Audit => &self.audit_params,
            Mode::Apply => &self.apply_params,
        }
    }

    /// Location of the script under `root`
    pub fn script_path(&self, root: &Path) -> PathBuf {
        manifest::target_path(root, &self.script_name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
