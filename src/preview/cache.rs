//! Preview cache entries and in-flight build tracking.
//!
//! An entry is the directory `<output>/preview/<key>/`; its modification
//! time is the only expiry clock. Concurrent requests for one key share a
//! single build: the first caller runs it, later callers await the same
//! [`OnceCell`] and receive a clone of its result.
//!
//! The cell stays registered until the build's [`BuildSlot`] is dropped,
//! not until the first caller returns. A build that outlives its timeout
//! keeps the key busy, and callers arriving meanwhile get the shared
//! `Timeout` instead of starting a second writer on the same directory.

use super::{PreviewKey, sweeper::is_expired};
use crate::pipeline::BuildError;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    fs,
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::OnceCell;

type Shared = Arc<OnceCell<Result<BuildOutcome, BuildError>>>;
type InFlight = Arc<Mutex<FxHashMap<PreviewKey, Shared>>>;

/// How a preview request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The pipeline ran and wrote this many files.
    Built(usize),
    /// An unexpired entry was served as is.
    Reused,
}

/// Registration of a running build. Dropping it frees the key.
pub struct BuildSlot {
    in_flight: InFlight,
    key: PreviewKey,
    cell: Shared,
}

impl Drop for BuildSlot {
    fn drop(&mut self) {
        // Only retire our own cell; a newer build may have replaced it.
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.cell))
        {
            in_flight.remove(&self.key);
        }
    }
}

pub struct PreviewCache {
    root: PathBuf,
    age: Duration,
    reuse_fresh: bool,
    in_flight: InFlight,
}

impl PreviewCache {
    pub fn new(root: impl Into<PathBuf>, age: Duration, reuse_fresh: bool) -> Self {
        Self {
            root: root.into(),
            age,
            reuse_fresh,
            in_flight: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// Directory holding `key`'s build.
    pub fn entry_path(&self, key: &PreviewKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Whether `key` has an entry younger than the preview age.
    pub fn is_fresh(&self, key: &PreviewKey, now: SystemTime) -> bool {
        fs::metadata(self.entry_path(key))
            .and_then(|meta| meta.modified())
            .is_ok_and(|modified| !is_expired(modified, now, self.age))
    }

    /// Number of keys with a build in progress.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Build `key` with `build`, unless a build for it is already running,
    /// in which case wait for that one instead.
    ///
    /// `build` receives the key's [`BuildSlot`] and must keep it alive for
    /// as long as it writes the entry. With `reuse_fresh`, an unexpired
    /// entry is returned without building.
    pub async fn ensure<F, Fut>(&self, key: &PreviewKey, build: F) -> Result<BuildOutcome, BuildError>
    where
        F: FnOnce(BuildSlot) -> Fut,
        Fut: Future<Output = Result<usize, BuildError>>,
    {
        let cell = Arc::clone(self.in_flight.lock().entry(key.clone()).or_default());
        let in_flight = Arc::clone(&self.in_flight);
        let slot_cell = Arc::clone(&cell);

        cell.get_or_init(move || {
            let slot = BuildSlot {
                in_flight,
                key: key.clone(),
                cell: slot_cell,
            };
            async move {
                if self.reuse_fresh && self.is_fresh(key, SystemTime::now()) {
                    return Ok(BuildOutcome::Reused);
                }
                build(slot).await.map(BuildOutcome::Built)
            }
        })
        .await
        .clone()
    }
}
