//! Runtime host entrypoint
//!
//! Single command, no arguments: provision the data directory, launch
//! exactly one worker and exit with the worker's exit code.

use gatebot::host::{self, HostConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Host logs go to stderr so the worker's stdout streams through
    // untouched.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = HostConfig::from_env();
    match host::run(&config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}
