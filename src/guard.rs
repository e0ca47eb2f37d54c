use nix::unistd::{getgid, geteuid, getuid, Gid, Uid};

use crate::error::{Error, Result};

/// Callers with a real uid below this are system accounts and may not use
/// the launcher.
pub const MIN_USER_UID: u32 = 1000;

/// Snapshot of the invoking process's identity, taken once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Uid,
    pub euid: Uid,
    pub gid: Gid,
}

impl Credentials {
    pub fn current() -> Credentials {
        Credentials {
            uid: getuid(),
            euid: geteuid(),
            gid: getgid(),
        }
    }
}

/// The authorization gate. Must run before any identity lookup or file
/// creation; a rejected caller leaves no trace on the system.
///
/// The effective-root requirement is waived when the `unprivileged` feature
/// is enabled, so the launcher can be exercised from a non-setuid checkout.
pub fn check(creds: &Credentials) -> Result<()> {
    if !cfg!(feature = "unprivileged") && !creds.euid.is_root() {
        return Err(Error::PermissionDenied(
            "this program must be installed setuid root",
        ));
    }
    if creds.uid.as_raw() < MIN_USER_UID {
        return Err(Error::PermissionDenied(
            "system users (uid < 1000) may not launch containers",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(uid: u32, euid: u32, gid: u32) -> Credentials {
        Credentials {
            uid: Uid::from_raw(uid),
            euid: Uid::from_raw(euid),
            gid: Gid::from_raw(gid),
        }
    }

    #[test]
    fn rejects_system_users() {
        let err = check(&creds(500, 0, 500)).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn rejects_uid_just_below_the_threshold() {
        assert!(check(&creds(MIN_USER_UID - 1, 0, 100)).is_err());
        assert!(check(&creds(MIN_USER_UID, 0, 100)).is_ok());
    }

    #[cfg(not(feature = "unprivileged"))]
    #[test]
    fn rejects_non_root_effective_uid() {
        let err = check(&creds(1500, 1500, 1500)).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn accepts_regular_user_with_root_effective_uid() {
        assert!(check(&creds(1500, 0, 1500)).is_ok());
    }
}
