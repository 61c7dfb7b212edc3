//! Cycle driver - runs one unit through Inspect, Decide and Commit

use crate::context::{ConfirmCallback, Reporter};
use crate::resource::Reconciler;
use crate::types::{CycleSummary, Decision, ExecuteOptions, Phase, SkipReason};
use anyhow::{Context, Result};

/// Run one reconciliation cycle
///
/// # Arguments
/// * `unit` - The reconciliation unit
/// * `opts` - Execution options (dry_run)
/// * `reporter` - Receives phase transitions and property reports
/// * `confirm` - Asked before committing (not consulted on dry runs)
///
/// # Returns
/// Summary of the cycle, ending in `Committed` or `Skipped`.
/// Any error from Inspect or Commit aborts the cycle.
pub fn reconcile<R, P, C>(
    unit: &R,
    opts: &ExecuteOptions,
    reporter: &mut P,
    confirm: &mut C,
) -> Result<CycleSummary<R::Inspection>>
where
    R: Reconciler,
    P: Reporter,
    C: ConfirmCallback,
{
    let id = unit.id();
    let mut phase = Phase::Unevaluated;

    phase = transition(&id, phase, Phase::Inspecting, reporter)?;
    let inspection = unit
        .inspect()
        .with_context(|| format!("{}: inspection failed", id))?;

    let inspected = unit.properties(&inspection);
    let decision = unit.decide(&inspection);
    phase = transition(&id, phase, Phase::Decided(decision), reporter)?;
    reporter.on_inspected(&id, decision, &inspected);

    let skip = match decision {
        Decision::NoChange => Some(SkipReason::InSync),
        Decision::ChangeNeeded if opts.dry_run => Some(SkipReason::DryRun),
        Decision::ChangeNeeded if !confirm.confirm("Apply changes?")? => {
            Some(SkipReason::Declined)
        }
        Decision::ChangeNeeded => None,
    };

    if let Some(reason) = skip {
        phase = transition(&id, phase, Phase::Skipped(reason), reporter)?;
        return Ok(CycleSummary {
            unit: id,
            phase,
            decision,
            inspected,
            committed: Vec::new(),
            inspection,
        });
    }

    phase = transition(&id, phase, Phase::Committing, reporter)?;
    let committed = unit
        .commit(&inspection)
        .with_context(|| format!("{}: commit failed", id))?;
    phase = transition(&id, phase, Phase::Committed, reporter)?;
    reporter.on_committed(&id, &committed);

    Ok(CycleSummary {
        unit: id,
        phase,
        decision,
        inspected,
        committed,
        inspection,
    })
}

/// Simple execution without callbacks
///
/// Commits without asking when changes are needed and `dry_run` is off.
pub fn reconcile_simple<R: Reconciler>(
    unit: &R,
    opts: &ExecuteOptions,
) -> Result<CycleSummary<R::Inspection>> {
    use crate::context::{AutoConfirm, NoReport};

    reconcile(unit, opts, &mut NoReport, &mut AutoConfirm)
}

fn transition<P: Reporter>(unit: &str, from: Phase, to: Phase, reporter: &mut P) -> Result<Phase> {
    let phase = from.advance(to)?;
    reporter.on_phase(unit, phase);
    Ok(phase)
}
