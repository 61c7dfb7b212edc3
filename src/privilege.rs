//! Identity resolution and privilege switching
//!
//! Privilege is never changed for the whole process. Instead:
//! 1. The owner is resolved once per cycle
//! 2. Only the script's child process is started as that user
//! 3. Files and the sandbox are handed over with `chown`
//!
//! Running as the current user needs no privilege at all; running as
//! anyone else requires root.

use anyhow::{Context, Result, bail};
use declarative::{Identity, PrivilegeContext};
use nix::fcntl::AtFlags;
use nix::unistd::{Gid, Uid, User, fchownat, geteuid};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// Privilege context backed by the system user database
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrivilege;

impl SystemPrivilege {
    /// Identity of the effective user of this process
    pub fn current() -> Result<Identity> {
        let uid = geteuid();
        let user = User::from_uid(uid)
            .context("Failed to read user database")?
            .with_context(|| format!("No user database entry for uid {uid}"))?;
        Ok(identity_of(&user))
    }
}

impl PrivilegeContext for SystemPrivilege {
    fn resolve_identity(&self, user: &str) -> Result<Identity> {
        let entry = match user.parse::<u32>() {
            Ok(uid) => User::from_uid(Uid::from_raw(uid)),
            Err(_) => User::from_name(user),
        }
        .with_context(|| format!("Failed to look up user `{user}`"))?;

        match entry {
            Some(entry) => Ok(identity_of(&entry)),
            None => bail!("No such user: {user}"),
        }
    }

    fn run_as(&self, identity: &Identity, command: &mut Command) -> Result<()> {
        let euid = geteuid();

        if euid.as_raw() == identity.uid {
            log::debug!("Already running as {}, no switch needed", identity.name);
            return Ok(());
        }

        if !euid.is_root() {
            bail!(
                "switching to {} requires root, running as uid {}",
                identity,
                euid
            );
        }

        log::debug!("Child process will run as {identity}");
        command.uid(identity.uid).gid(identity.gid);
        Ok(())
    }

    /// Change ownership of `path` itself; a symlink is never followed
    fn chown(&self, path: &Path, identity: &Identity) -> Result<()> {
        fchownat(
            None,
            path,
            Some(Uid::from_raw(identity.uid)),
            Some(Gid::from_raw(identity.gid)),
            AtFlags::AT_SYMLINK_NOFOLLOW,
        )
        .with_context(|| format!("chown {} to {}", path.display(), identity))
    }
}

fn identity_of(user: &User) -> Identity {
    Identity {
        name: user.name.clone(),
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
    }
}
