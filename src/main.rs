/*!
 * Tidemark CLI - mirror service entry point
 */

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use tidemark::core::Journal;
use tidemark::error::{MirrorError, Result, EXIT_SUCCESS};
use tidemark::{logging, CancelFlag, HttpStoreClient, InstanceGuard, MirrorConfig, MirrorLoop};

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(version, about = "Mirror time-series buckets from a remote store to a local one", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "tidemark.toml")]
    config: PathBuf,

    /// Start even if the instance state reports another running mirror
    #[arg(long)]
    force: bool,

    /// Enable verbose logging (shorthand for log level = debug)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if matches!(e, MirrorError::AlreadyRunning) {
                eprintln!(
                    "If the previous run crashed or was killed, start again with --force."
                );
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let config = MirrorConfig::from_file(&cli.config)?;
    logging::init_logging(&config, cli.verbose)?;

    let guard = InstanceGuard::acquire(&config.state_file, cli.force)?;

    let result = serve(&config);

    // Lower the running flag on every reachable exit path; a serve error
    // still takes precedence over a release failure in what we report.
    let released = guard.release();
    result.and(released)
}

fn serve(config: &MirrorConfig) -> Result<()> {
    let cancel = CancelFlag::new();
    cancel.register_signals()?;

    let client = HttpStoreClient::new()?;
    let journal = Journal::new(&client, config.local.target());
    journal.debug("Started mirror service.");

    let mut mirror = MirrorLoop::new(&client, config, cancel)?;
    mirror.run();

    journal.debug("Mirror service shutdown manually.");
    info!("mirror service stopped");
    Ok(())
}
