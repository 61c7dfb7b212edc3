//! Shared fixtures for unit tests

use anyhow::{Result, bail};
use declarative::{Identity, PrivilegeContext};
use manifest::FileManifest;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use crate::deployment::DeploymentSpec;
use crate::privilege::SystemPrivilege;

/// Resolves identities but refuses every ownership change
pub struct FailingChown;

impl PrivilegeContext for FailingChown {
    fn resolve_identity(&self, user: &str) -> Result<Identity> {
        SystemPrivilege.resolve_identity(user)
    }

    fn run_as(&self, identity: &Identity, command: &mut Command) -> Result<()> {
        SystemPrivilege.run_as(identity, command)
    }

    fn chown(&self, path: &Path, _identity: &Identity) -> Result<()> {
        bail!("operation not permitted: {}", path.display())
    }
}

/// Knows no users at all
pub struct NoUsers;

impl PrivilegeContext for NoUsers {
    fn resolve_identity(&self, user: &str) -> Result<Identity> {
        bail!("No such user: {user}")
    }

    fn run_as(&self, identity: &Identity, _command: &mut Command) -> Result<()> {
        bail!("cannot switch to {identity}")
    }

    fn chown(&self, _path: &Path, _identity: &Identity) -> Result<()> {
        Ok(())
    }
}

/// Name of the user running the tests
pub fn current_user() -> String {
    SystemPrivilege::current().unwrap().name
}

/// Deployment of `script.sh` into `deploy_path`, run as the current user
pub fn spec_for(deploy_path: &Path) -> DeploymentSpec {
    DeploymentSpec {
        name: "test-deploy".into(),
        deploy_path: deploy_path.to_path_buf(),
        owner: current_user(),
        script_name: "script.sh".into(),
        timeout_seconds: 10,
        environment: Vec::new(),
        audit_params: vec!["audit".into()],
        apply_params: vec!["apply".into()],
        change_codes: BTreeSet::from([2]),
        warning_codes: BTreeSet::from([3]),
    }
}

/// Manifest with `script.sh` holding `body` plus any extra files
pub fn manifest_with_script(body: &str, extra: &[(&str, &str)]) -> FileManifest {
    let mut manifest = FileManifest::new();
    manifest
        .insert("script.sh", format!("#!/bin/sh\n{body}"))
        .unwrap();
    for (path, content) in extra {
        manifest.insert(*path, *content).unwrap();
    }
    manifest
}
