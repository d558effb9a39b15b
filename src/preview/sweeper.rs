//! Expiry of preview cache entries.
//!
//! Every `age / 2` the sweeper lists the preview root's immediate
//! subdirectories and removes those last modified more than `age` ago, so
//! no entry outlives `1.5 × age`. Removal failures are logged and left for
//! the next tick.

use crate::log;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

/// Shortest interval between two sweeps.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub retained: usize,
    pub failed: usize,
}

/// Whether an entry last modified at `modified` is past `age` at `now`.
///
/// Entries dated in the future (clock skew) are never expired.
pub fn is_expired(modified: SystemTime, now: SystemTime, age: Duration) -> bool {
    now.duration_since(modified)
        .is_ok_and(|elapsed| elapsed > age)
}

/// Remove every subdirectory of `root` older than `age` at `now`.
///
/// A missing root is an empty cache, not an error.
pub fn sweep(root: &Path, age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return report,
        Err(err) => {
            log!("error"; "failed to read {}: {err}", root.display());
            report.failed += 1;
            return report;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let modified = match entry.metadata() {
            Ok(meta) if !meta.is_dir() => continue,
            Ok(meta) => meta.modified(),
            Err(err) => Err(err),
        };

        match modified {
            Ok(modified) if !is_expired(modified, now, age) => report.retained += 1,
            Ok(_) => match fs::remove_dir_all(&path) {
                Ok(()) => {
                    log!("sweep"; "removed {}", entry.file_name().to_string_lossy());
                    report.removed += 1;
                }
                Err(err) => {
                    log!("error"; "failed to remove {}: {err}", path.display());
                    report.failed += 1;
                }
            },
            Err(err) => {
                log!("error"; "failed to stat {}: {err}", path.display());
                report.failed += 1;
            }
        }
    }

    report
}

/// Background task sweeping a preview root on a fixed interval.
pub struct Sweeper {
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Time between sweeps for a preview `age`.
    pub fn interval(age: Duration) -> Duration {
        (age / 2).max(MIN_INTERVAL)
    }

    /// Start sweeping `root` on `handle`. The first sweep runs one interval
    /// after spawning.
    pub fn spawn(handle: &Handle, root: PathBuf, age: Duration) -> Self {
        let period = Self::interval(age);

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let root = root.clone();
                let swept =
                    tokio::task::spawn_blocking(move || sweep(&root, age, SystemTime::now())).await;

                match swept {
                    Ok(report) if report.removed + report.failed > 0 => log!(
                        "sweep"; "removed {}, kept {}, failed {}",
                        report.removed, report.retained, report.failed
                    ),
                    Ok(_) => {}
                    Err(err) => log!("error"; "sweep task failed: {err}"),
                }
            }
        });

        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}
