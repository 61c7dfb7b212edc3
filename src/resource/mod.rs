//! The script deployment reconciliation unit
//!
//! A deployment has two properties:
//! - `files`: the manifest's content under the deploy path
//! - `exec`: whether the script, audited in a sandbox, wants changes
//!
//! Inspect touches neither the deploy path nor the real script. Commit
//! writes the files first, then runs the script in apply mode if the
//! audit asked for it.

use anyhow::Result;
use declarative::{Decision, Identity, PrivilegeContext, PropertyReport, Reconciler};
use manifest::{ContentDigest, FileChange, FileManifest};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::deployer::Deployer;
use crate::deployment::DeploymentSpec;
use crate::error::ReconcileError;
use crate::runner::ScriptRunner;

mod exec;
mod files;

/// Display and debugging switches for Inspect
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectOptions {
    /// Include a unified diff for modified files
    pub show_diff: bool,
    /// Keep a copy of the audit sandbox
    pub keep_sandbox: bool,
}

/// Everything one Inspect pass learned
///
/// Created fresh each cycle and consumed by Decide and Commit.
#[derive(Debug, Clone, Serialize)]
pub struct InspectionResult {
    /// Files needing a write, keyed by absolute path
    pub file_changes: BTreeMap<PathBuf, FileChange>,
    /// Intended digest of every managed file, keyed by absolute path
    pub intended_digests: BTreeMap<PathBuf, ContentDigest>,
    pub script_change_required: bool,
    pub audit_output: String,
    pub commit_needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_copy: Option<PathBuf>,
}

/// A deploy path, the files that belong there, and the script that checks them
pub struct ScriptDeployment<'a> {
    spec: DeploymentSpec,
    manifest: FileManifest,
    owner: Identity,
    privilege: &'a dyn PrivilegeContext,
    options: InspectOptions,
}

impl<'a> ScriptDeployment<'a> {
    /// Validate `spec` against `manifest` and resolve the owner
    pub fn new(
        spec: DeploymentSpec,
        manifest: FileManifest,
        privilege: &'a dyn PrivilegeContext,
        options: InspectOptions,
    ) -> Result<Self, ReconcileError> {
        spec.validate(&manifest)?;
        let owner = privilege
            .resolve_identity(&spec.owner)
            .map_err(|e| ReconcileError::Identity {
                resource: spec.name.clone(),
                user: spec.owner.clone(),
                message: format!("{e:#}"),
            })?;

        Ok(Self {
            spec,
            manifest,
            owner,
            privilege,
            options,
        })
    }

    pub fn spec(&self) -> &DeploymentSpec {
        &self.spec
    }

    pub fn manifest(&self) -> &FileManifest {
        &self.manifest
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn options(&self) -> InspectOptions {
        self.options
    }

    fn privilege(&self) -> &dyn PrivilegeContext {
        self.privilege
    }

    fn runner(&self) -> ScriptRunner<'_> {
        ScriptRunner::new(&self.spec, &self.manifest, &self.owner, self.privilege)
    }

    fn deployer(&self) -> Deployer<'_> {
        Deployer::new(
            &self.spec.name,
            &self.spec.script_name,
            &self.owner,
            self.privilege,
        )
    }
}

impl fmt::Debug for ScriptDeployment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDeployment")
            .field("spec", &self.spec)
            .field("files", &self.manifest.len())
            .field("owner", &self.owner)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Reconciler for ScriptDeployment<'_> {
    type Inspection = InspectionResult;

    fn id(&self) -> String {
        self.spec.name.clone()
    }

    fn description(&self) -> String {
        format!(
            "{} file(s) in {}, checked by {} as {}",
            self.manifest.len(),
            self.spec.deploy_path.display(),
            self.spec.script_name,
            self.owner
        )
    }

    fn inspect(&self) -> Result<InspectionResult> {
        let diff = files::inspect(&self.spec.name, &self.manifest, &self.spec.deploy_path)?;
        let (audit, debug_copy) = exec::audit(self)?;

        let script_change_required = audit.changes_required();
        let commit_needed = diff.has_changes() || script_change_required;
        Ok(InspectionResult {
            file_changes: diff.changes,
            intended_digests: diff.intended,
            script_change_required,
            audit_output: audit.captured_output,
            commit_needed,
            debug_copy,
        })
    }

    fn properties(&self, inspection: &InspectionResult) -> Vec<PropertyReport> {
        vec![
            files::report(
                inspection,
                &self.manifest,
                &self.spec.deploy_path,
                self.options.show_diff,
            ),
            exec::report(inspection),
        ]
    }

    fn decide(&self, inspection: &InspectionResult) -> Decision {
        if inspection.commit_needed {
            Decision::ChangeNeeded
        } else {
            Decision::NoChange
        }
    }

    fn commit(&self, inspection: &InspectionResult) -> Result<Vec<PropertyReport>> {
        let files = files::commit(
            &self.deployer(),
            &self.manifest,
            &self.spec.deploy_path,
            inspection,
        )?;
        let exec = exec::commit(self, inspection)?;
        Ok(vec![files, exec])
    }
}
