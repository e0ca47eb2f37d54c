//! Setuid launcher that runs a command in a container on behalf of a normal
//! user.
//!
//! The container bind-mounts an administrator-controlled set of host
//! directories plus an ephemeral bootstrap script that recreates the
//! invoking user's account inside the container and execs their command.

pub mod command;
mod error;
pub mod guard;
pub mod identity;
pub mod script;
pub mod spawn;
pub mod volumes;

pub use command::{CommandVector, DockerCommand};
pub use error::{Error, Result};
pub use guard::Credentials;
pub use identity::IdentityRecord;
pub use script::BootstrapScript;
pub use spawn::ProcessOutcome;
pub use volumes::Volume;

/// In test builds, use alloc_counter to verify at runtime that the functions
/// which must be async-signal-safe do not allocate.
#[cfg(debug_assertions)]
#[global_allocator]
static ALLOC: alloc_counter::AllocCounterSystem = alloc_counter::AllocCounterSystem;
