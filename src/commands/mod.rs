// Reconciliation commands: inspect, apply, validate
pub mod reconcile;

use crate::error::ReconcileError;
use crate::ui;

/// Print a fatal error with advice for its category
pub fn report_error(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if let Some(typed) = err.downcast_ref::<ReconcileError>() {
        ui::dim(typed.category().advice());
    }
}
