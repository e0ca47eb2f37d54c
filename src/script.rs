use std::fmt::Write as _;
use std::fs;
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use nix::sys::stat::{fchmod, Mode};
use nix::unistd::{close, mkstemp, write, Gid, Uid};

use crate::error::{Error, Result};
use crate::identity::IdentityRecord;

/// mkstemp(3) template for the bootstrap script. The kernel picks the
/// suffix, so concurrent invocations never collide and the name cannot be
/// predicted (and symlinked) in advance.
const TEMPLATE: &str = "/tmp/CSTARTXXXXXX";

/// The per-invocation script that recreates the caller's account inside the
/// container and execs their command.
///
/// The file is fully written and made owner-executable before the runtime
/// is forked, and removed by the supervisor once the runtime reaches a
/// terminal state. If the launcher dies in between, the file is orphaned;
/// see the README for why no cleanup handler is installed.
#[derive(Debug)]
pub struct BootstrapScript {
    path: PathBuf,
}

impl BootstrapScript {
    /// Render the script body for `identity` and write it to a fresh
    /// temp file, mode 0755.
    pub fn create(
        identity: &IdentityRecord,
        uid: Uid,
        gid: Gid,
        command: Option<&str>,
    ) -> Result<BootstrapScript> {
        let body = render(identity, uid, gid, command);
        let (fd, path) = mkstemp(TEMPLATE).map_err(Error::TempFile)?;
        let written = write_fully(fd, body.as_bytes())
            .and_then(|()| fchmod(fd, Mode::from_bits_truncate(0o755)));
        let closed = close(fd);
        written.and(closed).map_err(Error::TempFile)?;
        Ok(BootstrapScript { path })
    }

    /// Host path of the script, to be bind-mounted into the container.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the script file, consuming the handle.
    pub fn remove(self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

fn write_fully(fd: RawFd, mut bytes: &[u8]) -> nix::Result<()> {
    while !bytes.is_empty() {
        let written = write(fd, bytes)?;
        bytes = &bytes[written..];
    }
    Ok(())
}

/// The script body, as executed by bash inside the container: create the
/// caller's group and user, then exec their shell (or command) as that
/// user.
///
/// Every interpolated field is quoted as a single shell word, so
/// identity-database content containing spaces or quotes cannot change the
/// structure of the script.
fn render(identity: &IdentityRecord, uid: Uid, gid: Gid, command: Option<&str>) -> String {
    let group = sh_quote(&identity.group);
    let home = sh_quote(&identity.home);
    let user = sh_quote(&identity.user);

    let mut body = String::from("#!/bin/bash\n");
    let _ = writeln!(body, "/usr/sbin/groupadd -g {gid} {group}");
    let _ = writeln!(body, "/usr/sbin/useradd -g {gid} -d {home} -M -u {uid} {user}");
    match command {
        None => {
            let _ = writeln!(body, "exec /sbin/runuser -u {user} -- /bin/bash");
        }
        Some(cmd) => {
            let _ = writeln!(
                body,
                "exec /sbin/runuser -u {user} -- /bin/bash -c {}",
                sh_quote(cmd)
            );
        }
    }
    body
}

/// Quote `s` as exactly one POSIX shell word: wrap in single quotes,
/// splicing any embedded single quote as `'\''`.
fn sh_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}
