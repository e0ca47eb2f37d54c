use alloc_counter::no_alloc;
use std::ffi::{c_char, c_int, c_void};
use std::io::Write;

use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use tracing::{debug, info, warn};

use crate::command::CommandVector;
use crate::error::{Error, Result};
use crate::script::BootstrapScript;

/// Log a message (given in format_args! style) by writing it to a file
/// descriptor.
///
/// This cannot allocate---buffer messages to a fixed-length,
/// stack-allocated 2048-byte buffer.
macro_rules! log_fd {
    ($fd:expr, $fmt:expr) => {
        {
            let mut buffer = [0u8; 2048];
            let mut cursor = std::io::Cursor::new(&mut buffer[..]);
            let _ = writeln!(cursor, $fmt);
            let _ = unsafe {libc::write($fd, cursor.get_ref().as_ptr() as *const c_void, cursor.position() as usize)};
        }
    };
    ($fd:expr, $fmt:expr, $($arg:tt)*) => {
        {
            let mut buffer = [0u8; 2048];
            let mut cursor = std::io::Cursor::new(&mut buffer[..]);
            let _ = writeln!(cursor, $fmt, $($arg)*);
            let _ = unsafe {libc::write($fd, cursor.get_ref().as_ptr() as *const c_void, cursor.position() as usize)};
        }
    };
}

/// Terminal classification of the supervised child. Stopped and continued
/// notifications are reported but never end supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(i32),
    Signaled(Signal),
}

/// Handle to the forked container runtime.
pub struct Child {
    pid: Pid,
}

/// Launch the container runtime and supervise it to a terminal state,
/// removing the bootstrap script afterwards.
///
/// The script could in principle be deleted earlier, but we never learn
/// when the runtime has actually bind-mounted it, so the only safe point is
/// after the child is gone. The outcome is reported, not propagated: the
/// launcher's own exit status does not depend on the child's.
pub fn supervise(vector: CommandVector, script: BootstrapScript) -> Result<ProcessOutcome> {
    let child = spawn(&vector)?;
    let outcome = child.wait_terminal()?;
    if let Err(err) = script.remove() {
        warn!("failed to remove bootstrap script: {err}");
    }
    Ok(outcome)
}

/// Fork and exec the runtime.
///
/// The argv pointer table is fully prepared before the fork, so the child
/// performs no allocation between fork and exec.
pub fn spawn(vector: &CommandVector) -> Result<Child> {
    let argv = vector.argv();
    match unsafe { fork() }.map_err(Error::Fork)? {
        ForkResult::Parent { child } => {
            debug!(pid = child.as_raw(), "forked container runtime");
            Ok(Child { pid: child })
        }
        ForkResult::Child => {
            let errno = unsafe { exec_child(vector.program().as_ptr(), argv.as_ptr()) };
            unsafe { libc::_exit(errno) }
        }
    }
}

/// Runs in the child between fork and exec. Must not allocate.
#[cfg_attr(debug_assertions, no_alloc)]
unsafe fn exec_child(program: *const c_char, argv: *const *const c_char) -> c_int {
    libc::execv(program, argv);
    // execv only returns on failure; the errno becomes the exit status.
    let errno = *libc::__errno_location();
    log_fd!(libc::STDERR_FILENO, "execv failed (errno {errno})");
    errno
}

impl Child {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child exits or is killed by a signal, reporting
    /// every status change along the way.
    pub fn wait_terminal(&self) -> Result<ProcessOutcome> {
        let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        loop {
            match waitpid(self.pid, Some(flags)).map_err(Error::Wait)? {
                WaitStatus::Exited(_, code) => {
                    info!(code, "container runtime exited");
                    return Ok(ProcessOutcome::Exited(code));
                }
                WaitStatus::Signaled(_, signal, _) => {
                    info!(%signal, "container runtime killed by signal");
                    return Ok(ProcessOutcome::Signaled(signal));
                }
                WaitStatus::Stopped(_, signal) => {
                    info!(%signal, "container runtime stopped");
                }
                WaitStatus::Continued(_) => {
                    info!("container runtime continued");
                }
                other => {
                    debug!(status = ?other, "ignoring non-terminal wait status");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityRecord;
    use nix::unistd::{Gid, Uid};

    fn test_script() -> BootstrapScript {
        let identity = IdentityRecord {
            user: "alice".into(),
            home: "/home/alice".into(),
            group: "devs".into(),
        };
        BootstrapScript::create(&identity, Uid::from_raw(1500), Gid::from_raw(1500), None).unwrap()
    }

    fn shell(command: &str) -> CommandVector {
        CommandVector::from_args(vec!["/bin/sh".into(), "-c".into(), command.into()]).unwrap()
    }

    #[test]
    fn spawn_hands_back_a_usable_pid() {
        let child = spawn(&shell("exit 0")).unwrap();
        assert!(child.pid().as_raw() > 0);
        assert_eq!(child.wait_terminal().unwrap(), ProcessOutcome::Exited(0));
    }

    #[test]
    fn reports_the_child_exit_code_and_removes_the_script() {
        let script = test_script();
        let path = script.path().to_path_buf();
        assert!(path.exists());

        let outcome = supervise(shell("exit 7"), script).unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(7));
        assert!(!path.exists());
    }

    #[test]
    fn classifies_death_by_signal_as_terminal() {
        let script = test_script();
        let path = script.path().to_path_buf();

        let outcome = supervise(shell("kill -TERM $$"), script).unwrap();
        assert_eq!(outcome, ProcessOutcome::Signaled(Signal::SIGTERM));
        assert!(!path.exists());
    }

    #[test]
    fn exec_failure_surfaces_as_the_child_exit_status() {
        let script = test_script();
        let vector =
            CommandVector::from_args(vec!["/nonexistent/ucontainer-runtime".into()]).unwrap();

        let outcome = supervise(vector, script).unwrap();
        // ENOENT from the failed execv.
        assert_eq!(outcome, ProcessOutcome::Exited(libc::ENOENT));
    }
}
