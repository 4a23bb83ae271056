//! Periodic import progress reporting.

use super::ldif_reader::ImportReporter;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Logs import progress every `interval` until dropped.
pub struct ProgressLogger {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressLogger {
    pub fn start(reporter: Arc<ImportReporter>, interval: Duration) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("import-progress".to_string())
            .spawn(move || run(reporter, interval, signal));

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!("Unable to start the import progress thread: {}", err);
                None
            }
        };
        Self { stop, handle }
    }
}

fn run(reporter: Arc<ImportReporter>, interval: Duration, stop: Arc<(Mutex<bool>, Condvar)>) {
    let (lock, condvar) = &*stop;
    let mut last_count = 0u64;
    let mut last_time = Instant::now();
    let mut stopped = lock.lock();
    while !*stopped {
        let timed_out = condvar.wait_for(&mut stopped, interval).timed_out();
        if *stopped || !timed_out {
            continue;
        }
        let progress = reporter.snapshot();
        let elapsed = last_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            (progress.entries_read - last_count) as f64 / elapsed
        } else {
            0.0
        };
        log::info!(
            "Processed {} entries, imported {}, skipped {}, rejected {} ({:.1} entries/s)",
            progress.entries_read,
            progress.entries_imported,
            progress.entries_ignored,
            progress.entries_rejected,
            rate
        );
        last_count = progress.entries_read;
        last_time = Instant::now();
    }
}

impl Drop for ProgressLogger {
    fn drop(&mut self) {
        let (lock, condvar) = &*self.stop;
        *lock.lock() = true;
        condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Import progress thread panicked");
            }
        }
    }
}
