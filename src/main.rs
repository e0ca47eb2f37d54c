use std::path::Path;
use std::process;

use clap::Parser;
use tracing::{debug, error, warn};

use ucontainer::{
    guard, identity, spawn, volumes, BootstrapScript, Credentials, DockerCommand, Result,
};

/// Run a command in a container on behalf of a normal user.
///
/// The container bind-mounts a set of external directories, plus a
/// generated bootstrap script that recreates the caller's account inside
/// the container and execs their command as that account.
#[derive(Parser)]
#[command(name = "ucontainer", version)]
struct Cli {
    /// Attach a terminal to the container (passes -it to the runtime)
    #[arg(short, long)]
    interactive: bool,

    /// Name of the container image to run
    image: String,

    /// Command to run inside the container as the invoking user; defaults
    /// to an interactive shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let creds = Credentials::current();
    if let Err(err) = run(cli, creds) {
        error!("{err}");
        process::exit(1);
    }
}

fn run(cli: Cli, creds: Credentials) -> Result<()> {
    // The gate runs before any lookup or file creation: a rejected caller
    // leaves no trace.
    guard::check(&creds)?;

    let identity = identity::resolve(creds.uid, creds.gid)?;

    let command = (!cli.command.is_empty()).then(|| cli.command.join(" "));
    let script = BootstrapScript::create(&identity, creds.uid, creds.gid, command.as_deref())?;

    // A missing mount list is the one recoverable failure: the container
    // can legitimately run with no extra mounts.
    let volumes = match volumes::load(Path::new(volumes::VOLFILE)) {
        Ok(volumes) => volumes,
        Err(err) => {
            warn!("{err}; continuing with no extra mounts");
            Vec::new()
        }
    };

    let vector = DockerCommand::new(cli.image, identity.home, script.path())
        .interactive(cli.interactive)
        .volumes(volumes)
        .build()?;
    debug!(%vector, "assembled container invocation");

    // Supervision reaching a terminal state is success, whatever the
    // container's own exit status was.
    spawn::supervise(vector, script)?;
    Ok(())
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
