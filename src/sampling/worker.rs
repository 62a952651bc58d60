// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-module sampling workers.
//!
//! One worker thread per sampled module. Each iteration: make sure a burst
//! task exists (retrying task creation with a short back-off), read one
//! burst, post-process, publish into the module snapshot. Any hardware
//! failure tears the task down and the next iteration rebuilds it; errors
//! never cross the tick boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::acquisition::SamplerConfig;
use crate::daq::{BurstTask, DaqError, DaqHardware};
use crate::preprocessing::{oversample_mean, rolling_pair_average, LowPassFilter, NotchFilter};
use crate::sampling::ModuleSnapshot;

/// Delay between two task-creation attempts grows linearly in this window.
const RETRY_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RETRY_BACKOFF_MAX: Duration = Duration::from_millis(100);

/// A sampling worker ready to be spawned on its own thread.
pub struct SamplingWorker {
    hardware: Arc<dyn DaqHardware>,
    snapshot: Arc<ModuleSnapshot>,
    config: SamplerConfig,
}

/// Handle to a running worker: stop flag plus the join handle.
pub struct WorkerHandle {
    module: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SamplingWorker {
    pub fn new(
        hardware: Arc<dyn DaqHardware>,
        snapshot: Arc<ModuleSnapshot>,
        config: SamplerConfig,
    ) -> Self {
        Self {
            hardware,
            snapshot,
            config,
        }
    }

    /// Start the worker thread.
    pub fn spawn(self) -> WorkerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let module = self.config.module.clone();
        let flag = Arc::clone(&running);
        let thread_name = format!("sampler-{module}");
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.run(flag))
            .expect("failed to spawn sampling worker thread");
        info!(target: "sampling", "sampling worker started for {module}");
        WorkerHandle {
            module,
            running,
            handle: Some(handle),
        }
    }

    fn run(self, running: Arc<AtomicBool>) {
        let mut task: Option<BurstTask> = None;
        let mut previous_published: Vec<f64> = Vec::new();
        let mut last_cycle = Instant::now();

        while running.load(Ordering::SeqCst) {
            if task.is_none() {
                match self.create_task_with_retry(&running) {
                    Ok(Some(t)) => task = Some(t),
                    Ok(None) => break, // stopped while retrying
                    Err(err) => {
                        error!(
                            target: "sampling",
                            "{}: task creation exhausted retries: {err}", self.config.module
                        );
                        std::thread::sleep(RETRY_BACKOFF_MAX);
                        continue;
                    }
                }
            }

            let current_task = task.as_ref().unwrap();
            let burst = match self.hardware.read_burst(current_task) {
                Ok(burst) => burst,
                Err(err) => {
                    warn!(
                        target: "sampling",
                        "{}: burst read failed, clearing task: {err}", self.config.module
                    );
                    self.hardware.clear_burst_task(current_task);
                    task = None;
                    continue;
                }
            };

            let now = Instant::now();
            let delta_t = now.duration_since(last_cycle).as_secs_f64();
            last_cycle = now;

            let mut averages = self.post_process(&burst, delta_t);

            if self.config.rolling_window
                && previous_published.len() == averages.len()
                && !previous_published.is_empty()
            {
                rolling_pair_average(&mut averages, &previous_published);
            }

            self.snapshot.publish(&averages);

            if self.config.rolling_window {
                previous_published = self.snapshot.values.copy();
            }
        }

        if let Some(t) = task {
            self.hardware.clear_burst_task(&t);
        }
        debug!(target: "sampling", "{}: worker loop exited", self.config.module);
    }

    /// One average per channel: optional notch and low-pass stages over the
    /// channel burst, then the oversampling mean.
    fn post_process(&self, burst: &[f64], delta_t: f64) -> Vec<f64> {
        let channels = self.config.channel_count;
        let samples = self.config.samples_per_channel;
        let mut averages = Vec::with_capacity(channels);

        for channel in 0..channels {
            let start = channel * samples;
            let end = (start + samples).min(burst.len());
            let mut channel_samples: &[f64] = &burst[start..end];

            let notch_pass;
            if let Some(notch) = &self.config.notch {
                notch_pass = NotchFilter::filter_samples(
                    self.config.sample_rate_hz,
                    notch.gain_at_notch,
                    notch.q,
                    notch.frequency_hz,
                    channel_samples,
                );
                channel_samples = &notch_pass;
            }

            let lowpass_pass;
            if let Some(cutoff) = self.config.lowpass_cutoff_hz {
                lowpass_pass = LowPassFilter::filter_samples(cutoff, delta_t, channel_samples);
                channel_samples = &lowpass_pass;
            }

            averages.push(oversample_mean(channel_samples));
        }
        averages
    }

    /// Retry task creation up to the configured maximum with a 10–100 ms
    /// linear back-off. Returns `Ok(None)` if the worker was stopped while
    /// waiting.
    fn create_task_with_retry(
        &self,
        running: &AtomicBool,
    ) -> Result<Option<BurstTask>, DaqError> {
        let spec = self.config.burst_spec();
        let max_attempts = self.config.max_task_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            if !running.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match self.hardware.create_burst_task(&spec) {
                Ok(task) => return Ok(Some(task)),
                Err(err) => {
                    warn!(
                        target: "sampling",
                        "{}: task creation attempt {attempt}/{max_attempts} failed: {err}",
                        self.config.module
                    );
                    last_err = Some(err);
                    let backoff = RETRY_BACKOFF_MIN
                        .saturating_mul(attempt)
                        .min(RETRY_BACKOFF_MAX);
                    std::thread::sleep(backoff);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| DaqError::TaskCreate("no attempt made".into())))
    }
}

impl WorkerHandle {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the worker to stop and wait for the in-flight iteration.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(target: "sampling", "{}: worker thread panicked", self.module);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::acquisition::SamplerSignal;
    use crate::daq::SimulatedDaq;

    fn current_sampler(module: &str) -> SamplerConfig {
        SamplerConfig {
            module: module.to_string(),
            signal: SamplerSignal::Current {
                min_amps: 0.004,
                max_amps: 0.020,
            },
            channel_count: 2,
            sample_rate_hz: 1000.0,
            samples_per_channel: 4,
            timeout_secs: 1.0,
            notch: None,
            lowpass_cutoff_hz: None,
            rolling_window: false,
            max_task_retries: 3,
        }
    }

    #[test]
    fn worker_publishes_channel_averages() {
        let daq = Arc::new(SimulatedDaq::with_default_rack());
        daq.set_current("Mod1", "/ai0", 0.008);
        daq.set_current("Mod1", "/ai1", 0.016);
        let snapshot = Arc::new(ModuleSnapshot::new());

        let worker = SamplingWorker::new(daq, Arc::clone(&snapshot), current_sampler("Mod1"));
        let mut handle = worker.spawn();

        // Let a few bursts complete.
        std::thread::sleep(Duration::from_millis(80));
        handle.stop();

        let values = snapshot.values.copy();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 0.008).abs() < 1e-9);
        assert!((values[1] - 0.016).abs() < 1e-9);
        assert!(!snapshot.history.is_empty());
    }

    #[test]
    fn worker_recovers_from_task_creation_failures() {
        let daq = Arc::new(SimulatedDaq::with_default_rack());
        daq.fail_next_task_creations(2);
        let snapshot = Arc::new(ModuleSnapshot::new());

        let worker = SamplingWorker::new(
            Arc::clone(&daq) as Arc<dyn DaqHardware>,
            Arc::clone(&snapshot),
            current_sampler("Mod1"),
        );
        let mut handle = worker.spawn();
        std::thread::sleep(Duration::from_millis(150));
        handle.stop();

        assert!(!snapshot.values.is_empty());
    }

    #[test]
    fn worker_rebuilds_task_after_read_failure() {
        let daq = Arc::new(SimulatedDaq::with_default_rack());
        daq.fail_next_burst_reads(1);
        let snapshot = Arc::new(ModuleSnapshot::new());

        let worker = SamplingWorker::new(
            Arc::clone(&daq) as Arc<dyn DaqHardware>,
            Arc::clone(&snapshot),
            current_sampler("Mod2"),
        );
        let mut handle = worker.spawn();
        std::thread::sleep(Duration::from_millis(120));
        handle.stop();

        assert!(!snapshot.values.is_empty());
    }

    #[test]
    fn rolling_window_halves_a_step_change() {
        let daq = Arc::new(SimulatedDaq::with_default_rack());
        daq.set_current("Mod1", "/ai0", 0.010);
        daq.set_current("Mod1", "/ai1", 0.010);
        let snapshot = Arc::new(ModuleSnapshot::new());

        let mut config = current_sampler("Mod1");
        config.rolling_window = true;
        let worker = SamplingWorker::new(Arc::clone(&daq) as Arc<dyn DaqHardware>, Arc::clone(&snapshot), config);
        let mut handle = worker.spawn();
        std::thread::sleep(Duration::from_millis(80));
        // Step the input; the first publication after the step sits halfway.
        daq.set_current("Mod1", "/ai0", 0.020);
        std::thread::sleep(Duration::from_millis(80));
        handle.stop();

        let values = snapshot.values.copy();
        assert_eq!(values.len(), 2);
        // Converging toward 0.020 from 0.010 through pairwise averaging.
        assert!(values[0] > 0.010 && values[0] <= 0.020);
    }
}
