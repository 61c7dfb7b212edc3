//! `exec` property: audit the script in a sandbox, apply it for real

use declarative::{PropertyReport, PropertyState};
use std::path::PathBuf;

use super::{InspectionResult, ScriptDeployment};
use crate::deployer::Deployer;
use crate::error::Result;
use crate::runner::{ExecutionOutcome, Mode};
use crate::sandbox::Sandbox;

pub const PROPERTY: &str = "exec";

/// Audit run against sandboxed copies of every managed file
///
/// The real deploy path is never touched. The sandbox is gone when this
/// returns, whatever the outcome; only a requested debug copy survives.
pub(super) fn audit(unit: &ScriptDeployment<'_>) -> Result<(ExecutionOutcome, Option<PathBuf>)> {
    let spec = unit.spec();
    let mut sandbox = Sandbox::acquire(
        &spec.name,
        unit.owner(),
        unit.privilege(),
        unit.options().keep_sandbox,
    )?;

    Deployer::new(&spec.name, &spec.script_name, unit.owner(), unit.privilege())
        .deploy(unit.manifest(), sandbox.path())?;
    let debug_copy = sandbox.preserve(&spec.name)?.map(PathBuf::from);

    let outcome = unit.runner().run(
        &spec.script_path(sandbox.path()),
        spec.params(Mode::Audit),
        Mode::Audit,
    )?;
    drop(sandbox);

    log::info!(
        "{}: audit `{}` exited {}",
        spec.name,
        outcome.command,
        outcome.exit_status
    );

    Ok((outcome, debug_copy))
}

pub(super) fn report(inspection: &InspectionResult) -> PropertyReport {
    if inspection.script_change_required {
        PropertyReport::new(PROPERTY, PropertyState::ChangesRequired)
            .with_detail(inspection.audit_output.trim_end())
    } else {
        PropertyReport::new(PROPERTY, PropertyState::RunNoChanges)
    }
}

/// Apply run against the deployed script, only if the audit asked for it
pub(super) fn commit(
    unit: &ScriptDeployment<'_>,
    inspection: &InspectionResult,
) -> Result<PropertyReport> {
    if !inspection.script_change_required {
        return Ok(PropertyReport::new(PROPERTY, PropertyState::RunNoChanges));
    }

    let spec = unit.spec();
    let outcome = unit.runner().run(
        &spec.script_path(&spec.deploy_path),
        spec.params(Mode::Apply),
        Mode::Apply,
    )?;
    Ok(PropertyReport::new(PROPERTY, PropertyState::Changed)
        .with_detail(outcome.captured_output.trim_end()))
}
