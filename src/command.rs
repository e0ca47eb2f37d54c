use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::path::PathBuf;
use std::ptr;

use crate::error::{Error, Result};
use crate::volumes::Volume;

/// The container runtime executable.
pub const DOCKER_BIN: &str = "/usr/bin/docker-current";

/// In-container path of the bootstrap script, which doubles as the
/// container entrypoint.
pub const START_SCRIPT: &str = "/START.sh";

const OPT_INTERACTIVE: &str = "-it";
const OPT_REMOVE: &str = "--rm";

/// Longest accepted image name. The reference implementation truncated
/// into a fixed buffer of this size; we reject instead.
const MAX_IMAGE_LEN: usize = 255;

/// Builder for one `docker run` invocation.
pub struct DockerCommand {
    image: String,
    workdir: String,
    script_path: PathBuf,
    interactive: bool,
    volumes: Vec<Volume>,
}

impl DockerCommand {
    /// Start a command for `image`, with the container's working directory
    /// set to `workdir` and `script_path` bind-mounted at [`START_SCRIPT`].
    pub fn new(
        image: impl Into<String>,
        workdir: impl Into<String>,
        script_path: impl Into<PathBuf>,
    ) -> DockerCommand {
        DockerCommand {
            image: image.into(),
            workdir: workdir.into(),
            script_path: script_path.into(),
            interactive: false,
            volumes: Vec::new(),
        }
    }

    /// Attach a tty and keep stdin open.
    pub fn interactive(&mut self, enabled: bool) -> &mut DockerCommand {
        self.interactive = enabled;
        self
    }

    /// Bind-mount each volume at its own path, in order.
    pub fn volumes(&mut self, volumes: Vec<Volume>) -> &mut DockerCommand {
        self.volumes = volumes;
        self
    }

    /// Compose the final argument vector:
    ///
    /// ```text
    /// docker run --rm (--rm|-it) -w <home> -v <script>:/START.sh
    ///     [-v <path>:<path>]... <image> /START.sh
    /// ```
    ///
    /// Slot 3 carries `-it` in interactive mode and a second `--rm`
    /// otherwise. The duplicate is a historical placeholder that keeps
    /// every later argument at a fixed position; tooling that indexes into
    /// the vector depends on the layout.
    pub fn build(&self) -> Result<CommandVector> {
        if self.image.is_empty() {
            return Err(Error::BadArgument("image name is empty"));
        }
        if self.image.len() > MAX_IMAGE_LEN {
            return Err(Error::BadArgument("image name is too long"));
        }
        let Some(script_path) = self.script_path.to_str() else {
            return Err(Error::BadArgument(
                "bootstrap script path is not valid UTF-8",
            ));
        };

        let mut args: Vec<String> = Vec::with_capacity(10 + 2 * self.volumes.len());
        args.push(DOCKER_BIN.to_owned());
        args.push("run".to_owned());
        args.push(OPT_REMOVE.to_owned());
        args.push(
            if self.interactive {
                OPT_INTERACTIVE
            } else {
                OPT_REMOVE
            }
            .to_owned(),
        );
        args.push("-w".to_owned());
        args.push(self.workdir.clone());
        args.push("-v".to_owned());
        args.push(format!("{script_path}:{START_SCRIPT}"));
        for volume in &self.volumes {
            args.push("-v".to_owned());
            args.push(format!("{0}:{0}", volume.path));
        }
        args.push(self.image.clone());
        args.push(START_SCRIPT.to_owned());

        CommandVector::from_args(args)
    }
}

/// An exec-ready argument vector.
///
/// Exclusively owned by its builder until handed to the supervisor; nothing
/// mutates it after that. Each element is a discrete argv entry, so no
/// shell quoting applies at this layer.
#[derive(Debug)]
pub struct CommandVector {
    args: Vec<CString>,
}

impl CommandVector {
    pub(crate) fn from_args(args: Vec<String>) -> Result<CommandVector> {
        if args.is_empty() {
            return Err(Error::BadArgument("empty argument vector"));
        }
        let args = args
            .into_iter()
            .map(|arg| {
                CString::new(arg).map_err(|_| Error::BadArgument("argument contains interior NUL"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CommandVector { args })
    }

    /// The executable, `argv[0]`.
    pub(crate) fn program(&self) -> &CStr {
        &self.args[0]
    }

    /// Null-terminated pointer vector for execv(2). The pointers borrow
    /// from `self` and must not outlive it.
    pub(crate) fn argv(&self) -> Vec<*const c_char> {
        let mut argv: Vec<*const c_char> = self.args.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(ptr::null());
        argv
    }

    /// The arguments, in order.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(|arg| arg.to_str().expect("arguments are built from UTF-8 strings"))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Display for CommandVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(path: &str) -> Volume {
        Volume { path: path.into() }
    }

    fn collect(vector: &CommandVector) -> Vec<&str> {
        vector.args().collect()
    }

    #[test]
    fn non_interactive_layout_matches_slot_for_slot() {
        let vector = DockerCommand::new("myimg", "/home/alice", "/tmp/CSTARTabc123")
            .volumes(vec![volume("/data"), volume("/scratch")])
            .build()
            .unwrap();
        assert_eq!(
            collect(&vector),
            [
                DOCKER_BIN,
                "run",
                "--rm",
                "--rm",
                "-w",
                "/home/alice",
                "-v",
                "/tmp/CSTARTabc123:/START.sh",
                "-v",
                "/data:/data",
                "-v",
                "/scratch:/scratch",
                "myimg",
                "/START.sh",
            ]
        );
    }

    #[test]
    fn interactive_differs_only_at_the_interactivity_slot() {
        let plain = DockerCommand::new("myimg", "/home/alice", "/tmp/CSTARTabc123")
            .volumes(vec![volume("/data")])
            .build()
            .unwrap();
        let interactive = DockerCommand::new("myimg", "/home/alice", "/tmp/CSTARTabc123")
            .interactive(true)
            .volumes(vec![volume("/data")])
            .build()
            .unwrap();

        let plain: Vec<&str> = plain.args().collect();
        let interactive: Vec<&str> = interactive.args().collect();
        assert_eq!(plain.len(), interactive.len());

        let differing: Vec<usize> = (0..plain.len())
            .filter(|&i| plain[i] != interactive[i])
            .collect();
        assert_eq!(differing, [3]);
        assert_eq!(plain[3], "--rm");
        assert_eq!(interactive[3], "-it");
        // Only the fixed remove-after-exit flag remains; the redundant
        // duplicate is gone.
        assert_eq!(interactive.iter().filter(|&&a| a == "--rm").count(), 1);
    }

    #[test]
    fn no_volumes_leaves_only_the_bootstrap_mount() {
        let vector = DockerCommand::new("myimg", "/home/alice", "/tmp/CSTARTabc123")
            .build()
            .unwrap();
        let args = collect(&vector);
        let mount_flags = args.iter().filter(|&&a| a == "-v").count();
        assert_eq!(mount_flags, 1);
        assert_eq!(args.last(), Some(&START_SCRIPT));
    }

    #[test]
    fn rejects_bad_image_names() {
        let err = DockerCommand::new("", "/home/alice", "/tmp/x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));

        let long = "i".repeat(MAX_IMAGE_LEN + 1);
        let err = DockerCommand::new(long, "/home/alice", "/tmp/x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));
    }

    #[test]
    fn rejects_interior_nul() {
        let err = DockerCommand::new("img", "/home/al\0ice", "/tmp/x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BadArgument(_)));
    }

    #[test]
    fn argv_is_null_terminated() {
        let vector = DockerCommand::new("myimg", "/home/alice", "/tmp/x")
            .build()
            .unwrap();
        let argv = vector.argv();
        assert_eq!(argv.len(), vector.len() + 1);
        assert!(argv.last().unwrap().is_null());
    }
}
