//! Engine configuration, from the environment or built in code.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::limits::{DEFAULT_COMPACT_THRESHOLD, DEFAULT_SWEEP_INTERVAL_SECS};

pub const DEFAULT_ZONE: Tz = chrono_tz::America::Sao_Paulo;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the write-ahead log.
    pub data_dir: PathBuf,
    /// Zone in which wall-clock inputs are interpreted.
    pub zone: Tz,
    /// WAL appends between log compactions.
    pub compact_threshold: u64,
    /// How often the sweeper reaps ended meetings.
    pub sweep_interval: Duration,
    /// Prometheus exporter port, if any.
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            zone: DEFAULT_ZONE,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("PLENUM_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let zone = std::env::var("PLENUM_TZ")
            .ok()
            .and_then(|s| match s.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    tracing::warn!("unrecognized PLENUM_TZ {s:?}, using {DEFAULT_ZONE}");
                    None
                }
            })
            .unwrap_or(DEFAULT_ZONE);
        let compact_threshold: u64 = std::env::var("PLENUM_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let sweep_secs: u64 = std::env::var("PLENUM_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let metrics_port: Option<u16> = std::env::var("PLENUM_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            data_dir: PathBuf::from(data_dir),
            zone,
            compact_threshold,
            sweep_interval: Duration::from_secs(sweep_secs),
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("plenum.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.zone, DEFAULT_ZONE);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/plenum.wal"));
    }
}
