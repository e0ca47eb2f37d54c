use nix::unistd::{Gid, Group, Uid, User};

use crate::error::{Error, Result};

/// The invoking user's identity, as it will be recreated inside the
/// container.
///
/// Fields are kept as `String`s because they end up interpolated into
/// shell text and argv entries; non-UTF-8 database content is rejected at
/// resolution time rather than converted lossily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub user: String,
    pub home: String,
    pub group: String,
}

/// Resolve the real uid and gid against the identity database.
///
/// A missing entry is a hard failure: a caller the system does not know
/// cannot be recreated inside the container, and there is no sensible
/// default to fall back to.
pub fn resolve(uid: Uid, gid: Gid) -> Result<IdentityRecord> {
    let user = User::from_uid(uid)
        .map_err(|err| Error::IdentityLookup(format!("passwd lookup for uid {uid}: {err}")))?
        .ok_or_else(|| Error::IdentityLookup(format!("no passwd entry for uid {uid}")))?;
    let group = Group::from_gid(gid)
        .map_err(|err| Error::IdentityLookup(format!("group lookup for gid {gid}: {err}")))?
        .ok_or_else(|| Error::IdentityLookup(format!("no group entry for gid {gid}")))?;

    let home = user
        .dir
        .into_os_string()
        .into_string()
        .map_err(|_| {
            Error::IdentityLookup(format!("home directory for uid {uid} is not valid UTF-8"))
        })?;

    Ok(IdentityRecord {
        user: user.name,
        home,
        group: group.name,
    })
}
