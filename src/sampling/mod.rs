// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Snapshot buffers shared between sampling workers and readers.
//!
//! Each sampled module owns one [`ModuleSnapshot`]: the worker thread is its
//! sole writer, every other component copies out under the lock. A short
//! circular history keeps the last few complete snapshots for clients that
//! want short-term access without a historian.

pub mod worker;

use std::collections::VecDeque;
use std::sync::Mutex;

pub use worker::{SamplingWorker, WorkerHandle};

/// Depth of the per-module snapshot history.
pub const HISTORY_DEPTH: usize = 11;

/// A fixed-size vector readers and one writer share without torn values.
///
/// `restore` replaces the whole contents under the lock; readers only ever
/// observe the previous complete snapshot or the new one.
#[derive(Debug, Default)]
pub struct SnapshotBuffer {
    data: Mutex<Vec<f64>>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the contents.
    pub fn restore(&self, source: &[f64]) {
        let mut data = self.data.lock().unwrap();
        data.clear();
        data.extend_from_slice(source);
    }

    /// Copy the contents out.
    pub fn copy(&self) -> Vec<f64> {
        self.data.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mutex-protected circular buffer of fixed depth.
#[derive(Debug)]
pub struct CircularHistory<T: Clone> {
    inner: Mutex<VecDeque<T>>,
    depth: usize,
}

impl<T: Clone> CircularHistory<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(depth)),
            depth,
        }
    }

    /// Append an item, evicting the oldest once the buffer is full.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        if inner.len() == self.depth {
            inner.pop_front();
        }
        inner.push_back(item);
    }

    /// Copy the retained items, oldest first.
    pub fn copy(&self) -> Vec<T> {
        self.inner.lock().unwrap().iter().cloned().collect()
    }

    /// The most recently pushed item, if any.
    pub fn latest(&self) -> Option<T> {
        self.inner.lock().unwrap().back().cloned()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current values plus recent history for one sampled module.
#[derive(Debug)]
pub struct ModuleSnapshot {
    pub values: SnapshotBuffer,
    pub history: CircularHistory<Vec<f64>>,
    last_update: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl ModuleSnapshot {
    pub fn new() -> Self {
        Self {
            values: SnapshotBuffer::new(),
            history: CircularHistory::new(HISTORY_DEPTH),
            last_update: Mutex::new(None),
        }
    }

    /// Publish a complete snapshot: restore the live buffer, retain a copy
    /// in the history and stamp the publication time.
    pub fn publish(&self, values: &[f64]) {
        self.values.restore(values);
        self.history.push(values.to_vec());
        *self.last_update.lock().unwrap() = Some(chrono::Utc::now());
    }

    /// When the current snapshot was published, if ever.
    pub fn last_update(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        *self.last_update.lock().unwrap()
    }
}

impl Default for ModuleSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_and_copy_round_trip() {
        let buffer = SnapshotBuffer::new();
        buffer.restore(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.copy(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 3);
        buffer.restore(&[4.0]);
        assert_eq!(buffer.copy(), vec![4.0]);
    }

    #[test]
    fn history_evicts_oldest_beyond_depth() {
        let history = CircularHistory::new(3);
        for i in 0..5 {
            history.push(i);
        }
        assert_eq!(history.copy(), vec![2, 3, 4]);
        assert_eq!(history.latest(), Some(4));
    }

    #[test]
    fn snapshot_publish_feeds_history() {
        let snapshot = ModuleSnapshot::new();
        assert!(snapshot.last_update().is_none());
        for i in 0..(HISTORY_DEPTH + 2) {
            snapshot.publish(&[i as f64]);
        }
        assert_eq!(snapshot.history.len(), HISTORY_DEPTH);
        assert_eq!(snapshot.values.copy(), vec![(HISTORY_DEPTH + 1) as f64]);
        assert!(snapshot.last_update().is_some());
    }
}
