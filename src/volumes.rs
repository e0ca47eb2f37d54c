use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};

/// The administrator-maintained list of directories to expose in the
/// container.
#[cfg(not(feature = "unprivileged"))]
pub const VOLFILE: &str = "/etc/containers/ucontainer.conf";
/// With the `unprivileged` feature, read the mount list from the current
/// directory so a development checkout needs no system config.
#[cfg(feature = "unprivileged")]
pub const VOLFILE: &str = "ucontainer.conf";

/// Upper bound on configured mounts, sized to the argv budget of the
/// container runtime invocation.
pub const MAX_VOLUMES: usize = 64;

/// One host directory, bind-mounted at the identical path inside the
/// container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub path: String,
}

/// Read the mount list from `path`.
///
/// An unreadable file is the launcher's one recoverable failure: callers
/// log the [`Error::ConfigUnavailable`] and continue with no extra mounts.
pub fn load(path: &Path) -> Result<Vec<Volume>> {
    let content = fs::read_to_string(path).map_err(|source| Error::ConfigUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&content))
}

/// Whitespace-delimited host paths. A token starting with `#` comments out
/// the rest of its line. Entries past [`MAX_VOLUMES`] are ignored with a
/// warning.
fn parse(content: &str) -> Vec<Volume> {
    let mut volumes = Vec::new();
    let mut skipped = 0usize;
    for line in content.lines() {
        for token in line.split_whitespace() {
            if token.starts_with('#') {
                break;
            }
            if volumes.len() == MAX_VOLUMES {
                skipped += 1;
                continue;
            }
            volumes.push(Volume {
                path: token.to_owned(),
            });
        }
    }
    if skipped > 0 {
        warn!(
            skipped,
            limit = MAX_VOLUMES,
            "volume config exceeds the mount limit, ignoring the excess entries"
        );
    }
    volumes
}
