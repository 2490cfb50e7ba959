use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// Liveness file shared by all loops; whichever loop notices the interval
/// has elapsed rewrites it.
#[derive(Debug)]
pub struct Heartbeat {
    path: PathBuf,
    interval_secs: i64,
    last_beat: AtomicI64,
}

impl Heartbeat {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval_secs: interval.as_secs() as i64,
            last_beat: AtomicI64::new(i64::MIN),
        }
    }

    /// Write the file if the interval has elapsed. Returns whether it wrote.
    pub fn beat(&self) -> bool {
        let now = Utc::now();
        let now_secs = now.timestamp();
        let last = self.last_beat.load(Ordering::Relaxed);
        if last != i64::MIN && now_secs.saturating_sub(last) < self.interval_secs {
            return false;
        }
        if self
            .last_beat
            .compare_exchange(last, now_secs, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Heartbeat directory create failed: {}", e);
                return false;
            }
        }
        match std::fs::write(&self.path, now.to_rfc3339_opts(SecondsFormat::Secs, true)) {
            Ok(()) => {
                debug!("Heartbeat written");
                true
            }
            Err(e) => {
                error!("Heartbeat write failed: {}", e);
                false
            }
        }
    }
}
