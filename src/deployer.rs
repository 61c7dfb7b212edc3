//! Writes a manifest to disk with the owner's modes and ownership

use declarative::{Identity, PrivilegeContext};
use manifest::{FileManifest, FileState};
use nix::fcntl::OFlag;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::error::{ReconcileError, Result};

/// Mode of the designated script and of created directories
pub const EXEC_MODE: u32 = 0o755;
/// Mode of every other managed file
pub const FILE_MODE: u32 = 0o644;

/// What a deployment pass did to each file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

impl DeployReport {
    pub fn changed(&self) -> usize {
        self.created.len() + self.modified.len()
    }
}

/// Deploys files as a given owner
pub struct Deployer<'a> {
    resource: &'a str,
    script_name: &'a str,
    owner: &'a Identity,
    privilege: &'a dyn PrivilegeContext,
}

impl<'a> Deployer<'a> {
    pub fn new(
        resource: &'a str,
        script_name: &'a str,
        owner: &'a Identity,
        privilege: &'a dyn PrivilegeContext,
    ) -> Self {
        Self {
            resource,
            script_name,
            owner,
            privilege,
        }
    }

    /// Write every manifest entry under `deploy_path`
    ///
    /// The parent of `deploy_path` must exist. `deploy_path` and any
    /// directories below it are created as needed. Symlinks below
    /// `deploy_path` are never followed: a link standing in for a managed
    /// file is replaced, one standing in for a directory is an error.
    pub fn deploy(&self, manifest: &FileManifest, deploy_path: &Path) -> Result<DeployReport> {
        if let Some(parent) = deploy_path.parent()
            && !parent.is_dir()
        {
            return Err(ReconcileError::io(
                self.resource,
                "missing parent directory",
                parent,
                std::io::Error::from(ErrorKind::NotFound),
            ));
        }

        if !deploy_path.is_dir() {
            self.create_dir(deploy_path)?;
        }

        let mut report = DeployReport::default();
        for entry in manifest.entries() {
            let target = manifest::target_path(deploy_path, &entry.path);
            if let Some(parent) = target.parent() {
                self.ensure_tree(deploy_path, parent)?;
            }

            let before = manifest::current_state(&target)
                .map_err(|e| ReconcileError::from_manifest(self.resource, e))?;
            let bucket = match before {
                FileState::Absent => &mut report.created,
                FileState::Present { ref digest, .. } if *digest == entry.intended_digest() => {
                    &mut report.unchanged
                }
                FileState::Present { .. } | FileState::NotRegular { .. } => &mut report.modified,
            };
            bucket.push(entry.path.clone());

            let mode = if entry.path == self.script_name {
                EXEC_MODE
            } else {
                FILE_MODE
            };
            self.write_file(&target, &entry.rendered(), mode)?;
            log::debug!("Deployed {} ({:o})", target.display(), mode);
        }

        log::info!(
            "{}: deployed {} file(s) to {} ({} changed, {} unchanged)",
            self.resource,
            manifest.len(),
            deploy_path.display(),
            report.changed(),
            report.unchanged.len()
        );
        Ok(report)
    }

    /// Create `dir` and every missing directory between `root` and it
    fn ensure_tree(&self, root: &Path, dir: &Path) -> Result<()> {
        let Ok(relative) = dir.strip_prefix(root) else {
            return self.ensure_dir(dir);
        };
        let mut current = root.to_path_buf();
        for component in relative.components() {
            current.push(component);
            self.ensure_dir(&current)?;
        }
        Ok(())
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        match fs::symlink_metadata(dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ReconcileError::io(
                self.resource,
                "refusing to deploy through",
                dir,
                std::io::Error::other("not a real directory"),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => self.create_dir(dir),
            Err(e) => Err(ReconcileError::io(self.resource, "failed to stat", dir, e)),
        }
    }

    fn create_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir(dir)
            .map_err(|e| ReconcileError::io(self.resource, "failed to create directory", dir, e))?;
        let handle = open_dir_nofollow(dir)
            .map_err(|e| ReconcileError::io(self.resource, "failed to open directory", dir, e))?;
        self.finish(&handle, dir, EXEC_MODE)
    }

    /// Stage `content` next to `target`, then rename it into place
    ///
    /// The rename replaces whatever is at `target` without following it.
    fn write_file(&self, target: &Path, content: &[u8], mode: u32) -> Result<()> {
        let write_error =
            |e: std::io::Error| ReconcileError::io(self.resource, "failed to write", target, e);
        let dir = target.parent().unwrap_or_else(|| Path::new("."));

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .tempfile_in(dir)
            .map_err(write_error)?;
        staged.write_all(content).map_err(write_error)?;
        self.finish(staged.as_file(), staged.path(), mode)?;
        staged.persist(target).map_err(|e| write_error(e.error))?;
        Ok(())
    }

    /// Set `mode` through the open handle and hand `path` to the owner
    fn finish(&self, handle: &File, path: &Path, mode: u32) -> Result<()> {
        handle
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| ReconcileError::permission(self.resource, path, &anyhow::Error::new(e)))?;
        self.privilege
            .chown(path, self.owner)
            .map_err(|e| ReconcileError::permission(self.resource, path, &e))
    }
}

fn open_dir_nofollow(dir: &Path) -> std::io::Result<File> {
    fs::OpenOptions::new()
        .read(true)
        .custom_flags((OFlag::O_NOFOLLOW | OFlag::O_DIRECTORY).bits())
        .open(dir)
}
