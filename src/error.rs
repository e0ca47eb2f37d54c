use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes for a single launcher invocation.
///
/// Every variant is fatal except [`Error::ConfigUnavailable`], which the
/// caller recovers from by running the container with no extra mounts.
/// Keeping the kinds distinct is what makes that asymmetry testable.
#[derive(Debug, Error)]
pub enum Error {
    /// The authorization gate rejected the caller. Nothing has been
    /// created or looked up when this is returned.
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    /// The caller has no usable passwd or group entry. Treated as an
    /// environment error, never retried or defaulted.
    #[error("identity lookup failed: {0}")]
    IdentityLookup(String),

    /// Creating or writing the bootstrap script failed.
    #[error("failed to create bootstrap script: {0}")]
    TempFile(#[source] nix::Error),

    /// The volume config file could not be read.
    #[error("cannot read volume config {path}: {source}")]
    ConfigUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An argument cannot legally appear in the exec vector.
    #[error("invalid argument: {0}")]
    BadArgument(&'static str),

    /// fork(2) failed; no child exists.
    #[error("failed to fork container runtime: {0}")]
    Fork(#[source] nix::Error),

    /// waitpid(2) failed while supervising the child.
    #[error("failed to wait for container runtime: {0}")]
    Wait(#[source] nix::Error),
}
