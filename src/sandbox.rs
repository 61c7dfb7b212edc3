//! Disposable directory for audit runs
//!
//! The sandbox is a fresh temporary directory owned by the script's user.
//! It is removed when the [`Sandbox`] is dropped, on every exit path.
//! A debug copy, if requested, is a separate directory and survives.

use anyhow::Result;
use chrono::Local;
use declarative::{Identity, PrivilegeContext};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::ReconcileError;

/// Mode added to the sandbox so the script's user can enter it
const SANDBOX_MODE: u32 = 0o755;

/// Scoped temporary directory for one audit pass
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
    keep_copy: bool,
    debug_copy: Option<PathBuf>,
}

impl Sandbox {
    /// Create a sandbox owned by `owner`
    ///
    /// With `keep_copy`, [`Sandbox::preserve`] duplicates the contents to a
    /// sibling directory that outlives the sandbox.
    pub fn acquire(
        resource: &str,
        owner: &Identity,
        privilege: &dyn PrivilegeContext,
        keep_copy: bool,
    ) -> Result<Self, ReconcileError> {
        let dir = tempfile::Builder::new()
            .prefix("scriptdeploy-")
            .tempdir()
            .map_err(|e| ReconcileError::io(resource, "failed to create sandbox in", std::env::temp_dir(), e))?;

        let path = dir.path();
        let mode = fs::metadata(path)
            .map_err(|e| ReconcileError::io(resource, "failed to stat sandbox", path, e))?
            .permissions()
            .mode()
            | SANDBOX_MODE;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
            ReconcileError::permission(resource, path, &anyhow::Error::new(e))
        })?;
        privilege
            .chown(path, owner)
            .map_err(|e| ReconcileError::permission(resource, path, &e))?;

        log::debug!("Created sandbox {} for {}", path.display(), owner.name);

        Ok(Self {
            dir,
            keep_copy,
            debug_copy: None,
        })
    }

    /// Sandbox root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Duplicate the sandbox to a sibling directory if a debug copy was requested
    ///
    /// Call after the sandbox is populated, before the script runs.
    pub fn preserve(&mut self, resource: &str) -> Result<Option<&Path>, ReconcileError> {
        if !self.keep_copy || self.debug_copy.is_some() {
            return Ok(self.debug_copy.as_deref());
        }

        let target = debug_copy_path(self.path());
        copy_tree(self.path(), &target)
            .map_err(|e| ReconcileError::PermissionSetup {
                resource: resource.to_string(),
                path: target.clone(),
                message: format!("{e:#}"),
            })?;

        log::info!("Kept sandbox copy at {}", target.display());
        self.debug_copy = Some(target);
        Ok(self.debug_copy.as_deref())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        log::debug!("Removing sandbox {}", self.dir.path().display());
    }
}

/// Sibling path for a debug copy: `<sandbox>.debug-<timestamp>`
fn debug_copy_path(sandbox: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%dT%H%M%S%3f");
    let name = sandbox
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "sandbox".to_string());
    sandbox.with_file_name(format!("{name}.debug-{stamp}"))
}

/// Recursively copy `from` into a new directory `to`, keeping modes
///
/// Symlinks are recreated as symlinks, never read through.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    use anyhow::Context;

    for entry in WalkDir::new(from) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .with_context(|| format!("Failed to strip prefix from {}", entry.path().display()))?;
        let dest = to.join(relative);

        if entry.file_type().is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("Failed to read link {}", entry.path().display()))?;
            std::os::unix::fs::symlink(&link, &dest)
                .with_context(|| format!("Failed to create link {}", dest.display()))?;
            continue;
        }

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create {}", dest.display()))?;
        } else {
            fs::copy(entry.path(), &dest).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), dest.display())
            })?;
        }

        let mode = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .permissions()
            .mode();
        fs::set_permissions(&dest, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set mode on {}", dest.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::SystemPrivilege;
    use crate::test_support::FailingChown;

    #[test]
    fn test_sandbox_is_removed_on_drop() {
        let me = SystemPrivilege::current().unwrap();
        let sandbox = Sandbox::acquire("t", &me, &SystemPrivilege, false).unwrap();
        let path = sandbox.path().to_path_buf();
        assert!(path.is_dir());

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);

        drop(sandbox);
        assert!(!path.exists());
    }

    #[test]
    fn test_sandbox_removed_when_scope_errors() {
        fn failing_scope(path: &mut Option<PathBuf>) -> Result<(), ReconcileError> {
            let me = SystemPrivilege::current().unwrap();
            let sandbox = Sandbox::acquire("t", &me, &SystemPrivilege, false)?;
            *path = Some(sandbox.path().to_path_buf());
            Err(ReconcileError::config("t", "boom"))
        }

        let mut path = None;
        assert!(failing_scope(&mut path).is_err());
        assert!(!path.unwrap().exists());
    }

    #[test]
    fn test_preserve_without_flag_is_noop() {
        let me = SystemPrivilege::current().unwrap();
        let mut sandbox = Sandbox::acquire("t", &me, &SystemPrivilege, false).unwrap();
        assert!(sandbox.preserve("t").unwrap().is_none());
    }

    #[test]
    fn test_debug_copy_survives() {
        let me = SystemPrivilege::current().unwrap();
        let mut sandbox = Sandbox::acquire("t", &me, &SystemPrivilege, true).unwrap();
        fs::create_dir(sandbox.path().join("lib")).unwrap();
        fs::write(sandbox.path().join("lib/a.sh"), "echo a\n").unwrap();

        let copy = sandbox.preserve("t").unwrap().unwrap().to_path_buf();
        let original = sandbox.path().to_path_buf();
        drop(sandbox);

        assert!(!original.exists());
        assert_eq!(fs::read_to_string(copy.join("lib/a.sh")).unwrap(), "echo a\n");
        assert_eq!(copy.parent(), original.parent());
        fs::remove_dir_all(copy).unwrap();
    }

    #[test]
    fn test_debug_copy_keeps_symlinks_as_links() {
        let me = SystemPrivilege::current().unwrap();
        let outside = tempfile::TempDir::new().unwrap();
        let secret = outside.path().join("secret");
        fs::write(&secret, "s\n").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o600)).unwrap();

        let mut sandbox = Sandbox::acquire("t", &me, &SystemPrivilege, true).unwrap();
        std::os::unix::fs::symlink(&secret, sandbox.path().join("a.conf")).unwrap();
        let copy = sandbox.preserve("t").unwrap().unwrap().to_path_buf();
        drop(sandbox);

        let copied = copy.join("a.conf");
        assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&copied).unwrap(), secret);
        assert_eq!(fs::metadata(&secret).unwrap().permissions().mode() & 0o777, 0o600);
        fs::remove_dir_all(copy).unwrap();
    }

    #[test]
    fn test_chown_failure_is_permission_error() {
        let me = SystemPrivilege::current().unwrap();
        let err = Sandbox::acquire("t", &me, &FailingChown, false).unwrap_err();
        assert!(matches!(err, ReconcileError::PermissionSetup { .. }));
    }
}
