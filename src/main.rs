//! eventfs daemon entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eventfs::config;
use eventfs::EventFs;

#[derive(Debug, Parser)]
#[command(name = "eventfs", about = "Self-cleaning event-queue filesystem")]
struct Opts {
    /// Path to the global configuration file.
    #[arg(short = 'c', long = "config-file", default_value = config::DEFAULT_CONFIG_PATH)]
    config_file: PathBuf,

    /// Arguments handed through to the host mount machinery; the
    /// first one names the mountpoint.
    #[arg(trailing_var_arg = true)]
    mount_args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let opts = Opts::parse();

    let (config, user_quotas, group_quotas) = match config::load(&opts.config_file) {
        Ok(loaded) => loaded,
        Err(err) => {
            error!(config = %opts.config_file.display(), %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let fs = EventFs::new(config, user_quotas, group_quotas);
    fs.start();

    match opts.mount_args.first() {
        Some(mountpoint) => info!(%mountpoint, "engine ready; host adapter may attach"),
        None => info!("engine ready; no mountpoint given"),
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to wait for shutdown signal");
        fs.stop();
        return ExitCode::FAILURE;
    }

    info!("shutting down");
    fs.quiesce().await;
    fs.stop();
    ExitCode::SUCCESS
}
