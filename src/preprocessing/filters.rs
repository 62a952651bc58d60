// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Digital filters for signal preprocessing

use log::warn;

use crate::utility::round_to_significant_digits;

/// A single-pole low-pass filter, the digital equivalent of an RC stage.
///
/// The mixing coefficient is `alpha = 1 - exp(-2π · f_c · Δt)`: the output
/// moves toward each new input by that fraction. A non-positive cutoff or
/// sample interval forces `alpha = 0`, turning the filter into a pass-through
/// that holds its last output.
pub struct LowPassFilter {
    output: f64,
    alpha: f64,
}

impl LowPassFilter {
    /// Create a new filter for the given cutoff frequency and sample interval.
    pub fn new(cutoff_hz: f64, delta_t: f64) -> Self {
        let mut filter = Self {
            output: 0.0,
            alpha: 0.0,
        };
        filter.reconfigure(cutoff_hz, delta_t);
        filter
    }

    /// Recompute `alpha` for new parameters; the held output is untouched.
    pub fn reconfigure(&mut self, cutoff_hz: f64, delta_t: f64) {
        if delta_t <= 0.0 {
            warn!(target: "filters", "low-pass configured with a non-positive sample interval");
            self.alpha = 0.0;
            return;
        }
        if cutoff_hz <= 0.0 {
            warn!(target: "filters", "low-pass configured with a non-positive cutoff frequency");
            self.alpha = 0.0;
            return;
        }
        self.alpha = 1.0 - (-delta_t * 2.0 * std::f64::consts::PI * cutoff_hz).exp();
    }

    /// Feed one sample and return the filtered output.
    pub fn update(&mut self, input: f64) -> f64 {
        self.output += (input - self.output) * self.alpha;
        self.output
    }

    /// Current mixing coefficient.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Run a fresh filter pass over a burst of samples.
    pub fn filter_samples(cutoff_hz: f64, delta_t: f64, samples: &[f64]) -> Vec<f64> {
        let mut filter = Self::new(cutoff_hz, delta_t);
        samples.iter().map(|&s| filter.update(s)).collect()
    }
}

/// A second-order notch filter with a bank of precomputed coefficient sets.
///
/// The bank covers center frequencies `f_min + i * f_step`; `select`
/// switches between them at runtime without recomputing anything, which is
/// how the rig retunes the mains-hum notch between 50 Hz and 60 Hz sites.
pub struct NotchFilter {
    bank: Vec<NotchCoefficients>,
    coefficients: NotchCoefficients,
    x: [f64; 3],
    y: [f64; 3],
}

#[derive(Debug, Clone, Copy, Default)]
struct NotchCoefficients {
    d0: f64,
    d1: f64,
    d2: f64,
}

impl NotchFilter {
    /// Build a coefficient bank.
    ///
    /// `gain_at_notch` in (0, 1) sets the attenuation depth (closer to 0 is
    /// deeper); `q` sets the notch width (higher is narrower).
    pub fn new(
        sampling_rate_hz: f64,
        gain_at_notch: f64,
        q: f64,
        f_step: f64,
        f_min: f64,
        bank_size: usize,
    ) -> Self {
        let damp = (1.0 - gain_at_notch * gain_at_notch).sqrt() / gain_at_notch;
        let mut bank = Vec::with_capacity(bank_size);
        for i in 0..bank_size {
            let wo = 2.0 * std::f64::consts::PI * (f_step * i as f64 + f_min) / sampling_rate_hz;
            let e = 1.0 / (1.0 + damp * (wo / (q * 2.0)).tan());
            let p = wo.cos();
            bank.push(NotchCoefficients {
                d0: e,
                d1: 2.0 * e * p,
                d2: 2.0 * e - 1.0,
            });
        }
        let coefficients = bank.first().copied().unwrap_or_default();
        Self {
            bank,
            coefficients,
            x: [0.0; 3],
            y: [0.0; 3],
        }
    }

    /// A single-frequency notch.
    pub fn single(sampling_rate_hz: f64, gain_at_notch: f64, q: f64, frequency_hz: f64) -> Self {
        Self::new(sampling_rate_hz, gain_at_notch, q, 0.0, frequency_hz, 1)
    }

    /// Switch to the coefficient set at `index`. Out-of-range indices are
    /// ignored.
    pub fn select(&mut self, index: usize) {
        if let Some(coefficients) = self.bank.get(index) {
            self.coefficients = *coefficients;
        } else {
            warn!(target: "filters", "notch bank index {index} out of range");
        }
    }

    /// Feed one sample and return the filtered output.
    pub fn filter(&mut self, input: f64) -> f64 {
        self.x[0] = self.x[1];
        self.x[1] = self.x[2];
        self.x[2] = input;
        self.y[0] = self.y[1];
        self.y[1] = self.y[2];

        let c = &self.coefficients;
        self.y[2] =
            c.d0 * self.x[2] - c.d1 * self.x[1] + c.d0 * self.x[0] + c.d1 * self.y[1]
                - c.d2 * self.y[0];
        self.y[2]
    }

    /// Run a fresh notch pass over a burst of samples.
    pub fn filter_samples(
        sampling_rate_hz: f64,
        gain_at_notch: f64,
        q: f64,
        frequency_hz: f64,
        samples: &[f64],
    ) -> Vec<f64> {
        let mut filter = Self::single(sampling_rate_hz, gain_at_notch, q, frequency_hz);
        samples.iter().map(|&s| filter.filter(s)).collect()
    }
}

/// Arithmetic mean of an oversampling burst, rounded to four significant
/// digits. An empty burst yields 0.
pub fn oversample_mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    round_to_significant_digits(mean, 4)
}

/// Two-point rolling window: replace each value with the average of itself
/// and the previously published value. Lengths must match; the caller gates
/// on that before invoking.
pub fn rolling_pair_average(current: &mut [f64], previous: &[f64]) {
    for (value, prev) in current.iter_mut().zip(previous.iter()) {
        *value = (*value + *prev) / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_matches_rc_formula() {
        let filter = LowPassFilter::new(10.0, 0.01);
        let expected = 1.0 - (-0.01 * 2.0 * std::f64::consts::PI * 10.0).exp();
        assert!((filter.alpha() - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_cutoff_or_interval_becomes_pass_through() {
        let mut filter = LowPassFilter::new(0.0, 0.01);
        assert_eq!(filter.alpha(), 0.0);
        assert_eq!(filter.update(5.0), 0.0); // output held at its last value

        let mut filter = LowPassFilter::new(10.0, 0.0);
        assert_eq!(filter.alpha(), 0.0);
        assert_eq!(filter.update(5.0), 0.0);
    }

    #[test]
    fn output_converges_toward_constant_input() {
        let mut filter = LowPassFilter::new(50.0, 0.01);
        let mut last = 0.0;
        for _ in 0..200 {
            last = filter.update(1.0);
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reconfigure_only_updates_alpha() {
        let mut filter = LowPassFilter::new(50.0, 0.01);
        filter.update(10.0);
        let held = filter.update(10.0);
        filter.reconfigure(5.0, 0.01);
        // Held output survives reconfiguration.
        assert!(filter.update(held) <= 10.0);
    }

    #[test]
    fn notch_attenuates_its_center_frequency() {
        let sampling_rate = 1000.0;
        let notch_freq = 50.0;
        let samples: Vec<f64> = (0..2000)
            .map(|i| {
                let t = i as f64 / sampling_rate;
                (2.0 * std::f64::consts::PI * notch_freq * t).sin()
            })
            .collect();

        let filtered =
            NotchFilter::filter_samples(sampling_rate, 0.3, 4.0, notch_freq, &samples);

        // Compare steady-state RMS, skipping the settling transient.
        let rms = |signal: &[f64]| {
            let tail = &signal[signal.len() / 2..];
            (tail.iter().map(|v| v * v).sum::<f64>() / tail.len() as f64).sqrt()
        };
        assert!(
            rms(&filtered) < rms(&samples) * 0.5,
            "the notch center must be attenuated"
        );
    }

    #[test]
    fn notch_passes_distant_frequencies() {
        let sampling_rate = 1000.0;
        let samples: Vec<f64> = (0..2000)
            .map(|i| {
                let t = i as f64 / sampling_rate;
                (2.0 * std::f64::consts::PI * 5.0 * t).sin()
            })
            .collect();

        let filtered = NotchFilter::filter_samples(sampling_rate, 0.3, 4.0, 50.0, &samples);
        let rms = |signal: &[f64]| {
            let tail = &signal[signal.len() / 2..];
            (tail.iter().map(|v| v * v).sum::<f64>() / tail.len() as f64).sqrt()
        };
        assert!(rms(&filtered) > rms(&samples) * 0.8);
    }

    #[test]
    fn notch_bank_selection() {
        let mut filter = NotchFilter::new(1000.0, 0.5, 2.0, 10.0, 50.0, 3);
        filter.select(2); // 70 Hz set
        filter.select(99); // ignored
        assert!(filter.filter(1.0).is_finite());
    }

    #[test]
    fn oversample_mean_rounds_to_four_digits() {
        let samples = vec![0.0123, 0.0124, 0.0125];
        assert_eq!(oversample_mean(&samples), 0.0124);
        assert_eq!(oversample_mean(&[]), 0.0);
    }

    #[test]
    fn rolling_window_averages_pairwise() {
        let mut current = vec![2.0, 4.0];
        rolling_pair_average(&mut current, &[4.0, 8.0]);
        assert_eq!(current, vec![3.0, 6.0]);
    }
}
