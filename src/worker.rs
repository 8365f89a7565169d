//! Worker runtime
//!
//! Brings the subscription engine up over the persistent store and runs the
//! daily scheduler until interrupted. The store file is created here on
//! first use; the runtime host guarantees the containing directory exists
//! and is writable.

use std::io::Write;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::BotConfig;
use crate::services::scheduler::Scheduler;
use crate::services::subscription::{AssumeSubscribed, SubscriptionService};
use crate::store::{Store, StoreError};

/// Worker errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("signal handler error: {0}")]
    Signal(std::io::Error),
}

/// Run the worker until the scheduler is interrupted.
pub async fn run(config: &BotConfig) -> Result<(), WorkerError> {
    tracing::info!(db = %config.database_path.display(), "opening persistent store");
    let store = Store::open(&config.database_path)?;
    seed_channels(&store, config)?;

    let service = SubscriptionService::new(&store, config, AssumeSubscribed);
    let scheduler = Scheduler::new(config.check_hour, config.check_minute);

    tokio::select! {
        _ = scheduler.run(&service) => {}
        res = tokio::signal::ctrl_c() => {
            res.map_err(WorkerError::Signal)?;
            tracing::info!("interrupt received, shutting down");
        }
    }
    Ok(())
}

/// Make the store reflect the configured channel set. Upserts, so renames
/// and threshold changes take effect on restart.
fn seed_channels(store: &Store, config: &BotConfig) -> Result<(), StoreError> {
    store.upsert_channel(config.main_channel_id, "Main channel", 0, true)?;
    for spec in &config.channels {
        if spec.channel_id != 0 {
            store.upsert_channel(spec.channel_id, &spec.name, spec.days_required, false)?;
        }
    }
    tracing::info!(channels = config.channels.len(), "channel set seeded");
    Ok(())
}

/// Initialize logging. With `unbuffered`, every event is flushed to stdout
/// as it is written so externally captured logs stream in real time.
pub fn init_logging(unbuffered: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if unbuffered {
        builder.with_writer(|| Flushing(std::io::stdout())).init();
    } else {
        builder.init();
    }
}

/// Writer that flushes the inner writer after every write, so each log
/// line reaches the captured stream as soon as it is emitted.
struct Flushing<W>(W);

impl<W: Write> Write for Flushing<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.0.write(buf)?;
        self.0.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}
