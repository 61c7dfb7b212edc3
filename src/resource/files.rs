//! `files` property: managed file content under the deploy path

use declarative::{PropertyReport, PropertyState};
use manifest::{ContentDigest, FileChange, FileManifest};
use std::fmt::Write;
use std::path::Path;

use super::InspectionResult;
use crate::deployer::Deployer;
use crate::error::{ReconcileError, Result};

pub const PROPERTY: &str = "files";

/// Digest comparison of the manifest against the real deploy path
pub(super) fn inspect(
    resource: &str,
    manifest: &FileManifest,
    deploy_path: &Path,
) -> Result<manifest::ManifestDiff> {
    let diff = manifest::diff_manifest(manifest, deploy_path)
        .map_err(|e| ReconcileError::from_manifest(resource, e))?;
    log::debug!(
        "{}: {} absent, {} modified of {} file(s)",
        resource,
        diff.absent_count(),
        diff.modified_count(),
        manifest.len()
    );
    Ok(diff)
}

/// Property report for an inspection
pub(super) fn report(
    inspection: &InspectionResult,
    manifest: &FileManifest,
    deploy_path: &Path,
    show_diff: bool,
) -> PropertyReport {
    if inspection.file_changes.is_empty() {
        return PropertyReport::new(PROPERTY, PropertyState::NoChanges);
    }

    let mut detail = String::new();
    for (path, change) in &inspection.file_changes {
        let intended = inspection.intended_digests.get(path);
        let content = intended_content(manifest, deploy_path, path);
        detail.push_str(&describe(path, change, intended, content.as_deref(), show_diff));
    }
    PropertyReport::new(PROPERTY, PropertyState::ChangesRequired).with_detail(detail.trim_end())
}

/// Write the manifest to the real deploy path
pub(super) fn commit(
    deployer: &Deployer<'_>,
    manifest: &FileManifest,
    deploy_path: &Path,
    inspection: &InspectionResult,
) -> Result<PropertyReport> {
    let written = deployer.deploy(manifest, deploy_path)?;

    if inspection.file_changes.is_empty() {
        return Ok(PropertyReport::new(PROPERTY, PropertyState::NoChanges));
    }

    let mut detail = String::new();
    for path in &written.created {
        let _ = writeln!(detail, "created {}", manifest::target_path(deploy_path, path).display());
    }
    for path in &written.modified {
        let _ = writeln!(detail, "updated {}", manifest::target_path(deploy_path, path).display());
    }
    Ok(PropertyReport::new(PROPERTY, PropertyState::Changed).with_detail(detail.trim_end()))
}

fn intended_content(manifest: &FileManifest, deploy_path: &Path, target: &Path) -> Option<Vec<u8>> {
    manifest
        .entries()
        .iter()
        .find(|e| manifest::target_path(deploy_path, &e.path) == target)
        .map(|e| e.rendered())
}

/// One change, as shown to the operator
fn describe(
    path: &Path,
    change: &FileChange,
    intended: Option<&ContentDigest>,
    content: Option<&[u8]>,
    show_diff: bool,
) -> String {
    let intended = intended.map(ToString::to_string).unwrap_or_default();
    match change {
        FileChange::Absent => {
            format!("{}: absent, would be created with {}\n", path.display(), intended)
        }
        FileChange::Modified { current, previous } => {
            let mut out = format!(
                "{}: content {} differs from intended {}\n",
                path.display(),
                current,
                intended
            );
            if show_diff && let Some(content) = content {
                out.push_str(&unified_diff(previous, content));
            }
            out
        }
        FileChange::NotRegular { found } => format!(
            "{}: {} in place of a managed file, would be replaced with {}\n",
            path.display(),
            found,
            intended
        ),
    }
}

/// Unified diff from what is on disk to what would be written
pub fn unified_diff(current: &[u8], intended: &[u8]) -> String {
    let current = String::from_utf8_lossy(current);
    let intended = String::from_utf8_lossy(intended);
    similar::TextDiff::from_lines(current.as_ref(), intended.as_ref())
        .unified_diff()
        .context_radius(3)
        .header("current", "intended")
        .to_string()
}
