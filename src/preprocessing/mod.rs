// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Signal preprocessing for the sampling pipeline.
//!
//! Sampling workers run their bursts through the filters in this module
//! before publishing: an optional one-pole low-pass per channel, the
//! oversampling average, then an optional two-point rolling window against
//! the previously published snapshot.

pub mod filters;

pub use filters::{oversample_mean, rolling_pair_average, LowPassFilter, NotchFilter};
