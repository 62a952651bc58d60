// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Periodic driver: a dedicated thread that sleeps, checks its active flag,
//! and invokes the tick closure. `stop` clears the flag and joins, so it
//! returns only after any in-flight tick has completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error};

pub struct PeriodicDriver {
    name: &'static str,
    interval: Duration,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicDriver {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            active: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the driver thread. Starting an active driver is a no-op.
    pub fn start<F>(&mut self, tick: F)
    where
        F: Fn() + Send + 'static,
    {
        if self.is_active() {
            return;
        }
        // A previous run may have left a joined-out handle behind.
        self.handle.take();

        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        let interval = self.interval;
        let name = self.name;
        let handle = std::thread::Builder::new()
            .name(format!("driver-{name}"))
            .spawn(move || {
                debug!(target: "driver", "{name}: started ({interval:?})");
                while active.load(Ordering::SeqCst) {
                    std::thread::sleep(interval);
                    // Re-check: stop() may have fired during the sleep.
                    if active.load(Ordering::SeqCst) {
                        tick();
                    }
                }
                debug!(target: "driver", "{name}: stopped");
            })
            .expect("failed to spawn periodic driver thread");
        self.handle = Some(handle);
    }

    /// Clear the active flag and wait for the thread. Returns only after an
    /// in-flight tick has completed. Stopping a stopped driver is a no-op.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(target: "driver", "{}: driver thread panicked", self.name);
            }
        }
    }
}

impl Drop for PeriodicDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut driver = PeriodicDriver::new("test", Duration::from_millis(5));
        driver.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(driver.is_active());
        std::thread::sleep(Duration::from_millis(40));
        driver.stop();
        assert!(!driver.is_active());
        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected a few ticks, got {ticks}");
        // No further ticks after stop.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }

    #[test]
    fn restart_after_stop_works() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut driver = PeriodicDriver::new("restart", Duration::from_millis(5));
        let counter = Arc::clone(&count);
        driver.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(15));
        driver.stop();
        let after_first = count.load(Ordering::SeqCst);

        let counter = Arc::clone(&count);
        driver.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(15));
        driver.stop();
        assert!(count.load(Ordering::SeqCst) > after_first);
    }
}
