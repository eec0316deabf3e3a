//! Meeting-room booking engine: conflict detection over half-open
//! time spans, bounded expansion of recurrence rules into concrete
//! child bookings, and a write-ahead log so a restart replays the
//! full schedule.

pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod time;
pub mod wal;

pub use config::Config;
pub use engine::{Engine, EngineError};

use std::io;
use std::sync::Arc;

use crate::notify::NotifyHub;
use crate::time::SystemClock;

/// Assemble a production engine from configuration: open the WAL under
/// the data directory, start the background sweeper and compactor, and
/// expose metrics if a port is configured.
pub fn launch(cfg: &Config) -> io::Result<Arc<Engine>> {
    std::fs::create_dir_all(&cfg.data_dir)?;
    observability::init(cfg.metrics_port);

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(
        cfg.wal_path(),
        notify,
        cfg.zone,
        Arc::new(SystemClock),
    )?);

    let sweeper_engine = engine.clone();
    let interval = cfg.sweep_interval;
    tokio::spawn(async move {
        reaper::run_sweeper(sweeper_engine, interval).await;
    });
    let compactor_engine = engine.clone();
    let threshold = cfg.compact_threshold;
    tokio::spawn(async move {
        reaper::run_compactor(compactor_engine, threshold).await;
    });

    Ok(engine)
}
