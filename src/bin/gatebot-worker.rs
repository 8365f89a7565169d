//! Worker entrypoint

use gatebot::config::{self, BotConfig};
use gatebot::worker;

#[tokio::main]
async fn main() {
    let unbuffered =
        config::flag_enabled(std::env::var("UNBUFFERED_OUTPUT").ok().as_deref());
    worker::init_logging(unbuffered);

    let config = BotConfig::from_env();
    if let Err(e) = worker::run(&config).await {
        tracing::error!("worker failed: {e}");
        std::process::exit(1);
    }
}
