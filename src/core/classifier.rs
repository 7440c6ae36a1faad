//! Occupancy classification from accelerometer magnitude.
//!
//! Each machine keeps a short rolling window of magnitudes. The window mean is
//! compared against a threshold, and a flip of the reported state is only
//! accepted once enough consecutive samples agree on it.

use crate::core::reading::Reading;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What the classifier reports while a machine's window is still filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupPolicy {
    /// Report "available" until the window holds `window_size` samples
    UntilWindowFull,
    /// Decide from whatever the window holds, starting with the first sample
    Immediate,
}

/// How the smoothed magnitude is turned into a raw decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Occupied when the smoothed magnitude is strictly above `threshold` (m/s²)
    Absolute,
    /// Learn a resting baseline from the first `calibration_samples` readings,
    /// then treat `threshold` as a relative deviation from it (0.02 = 2%)
    Calibrated { calibration_samples: usize },
}

/// Classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Decision threshold; unit depends on [`ThresholdMode`]
    pub threshold: f64,
    /// Number of magnitudes averaged per decision
    pub window_size: usize,
    /// Consecutive agreeing samples required before the state flips
    pub debounce_samples: usize,
    pub warmup: WarmupPolicy,
    pub mode: ThresholdMode,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            // Just above 1 g so a machine at rest reads as available
            threshold: 10.5,
            window_size: 3,
            debounce_samples: 1,
            warmup: WarmupPolicy::UntilWindowFull,
            mode: ThresholdMode::Absolute,
        }
    }
}

/// Per-machine classifier memory.
#[derive(Debug, Clone, Default)]
pub struct MachineHistory {
    window: VecDeque<f64>,
    /// Last debounced decision
    occupied: bool,
    /// Consecutive raw decisions that disagree with `occupied`
    streak: usize,
    calibration_sum: f64,
    calibration_count: usize,
    baseline: Option<f64>,
}

impl MachineHistory {
    /// Number of magnitudes currently in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Mean of the window, or `None` before the first sample.
    pub fn smoothed(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
        }
    }

    /// Resting baseline, once calibration has finished.
    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Forget the window and the decision. Calibration is kept: a machine is
    /// calibrated once, and a reset while it still vibrates must not learn
    /// that vibration as its resting level.
    pub fn clear(&mut self) {
        self.window.clear();
        self.occupied = false;
        self.streak = 0;
    }

    fn push(&mut self, magnitude: f64, capacity: usize) {
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(magnitude);
    }

    fn debounce(&mut self, raw: bool, required: usize) -> bool {
        if raw == self.occupied {
            self.streak = 0;
        } else {
            self.streak += 1;
            if self.streak >= required {
                self.occupied = raw;
                self.streak = 0;
            }
        }
        self.occupied
    }
}

/// Turns readings into occupied/available decisions.
#[derive(Debug, Clone)]
pub struct StateClassifier {
    config: ClassifierConfig,
}

impl StateClassifier {
    pub fn new(mut config: ClassifierConfig) -> Self {
        config.window_size = config.window_size.max(1);
        config.debounce_samples = config.debounce_samples.max(1);
        if let ThresholdMode::Calibrated {
            calibration_samples,
        } = config.mode
        {
            config.mode = ThresholdMode::Calibrated {
                calibration_samples: calibration_samples.max(1),
            };
        }
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a reading against the machine's history.
    ///
    /// The result is the debounced decision; it is not compared to any
    /// previously stored machine state.
    pub fn classify(&self, history: &mut MachineHistory, reading: &Reading) -> bool {
        self.classify_magnitude(history, reading.magnitude())
    }

    pub fn classify_magnitude(&self, history: &mut MachineHistory, magnitude: f64) -> bool {
        if let ThresholdMode::Calibrated {
            calibration_samples,
        } = self.config.mode
        {
            if history.baseline.is_none() {
                history.calibration_sum += magnitude;
                history.calibration_count += 1;
                if history.calibration_count >= calibration_samples {
                    let baseline = history.calibration_sum / history.calibration_count as f64;
                    tracing::debug!(baseline, "Calibration complete");
                    history.baseline = Some(baseline);
                }
                return history.occupied;
            }
        }

        history.push(magnitude, self.config.window_size);

        if self.config.warmup == WarmupPolicy::UntilWindowFull
            && history.len() < self.config.window_size
        {
            return history.occupied;
        }

        let raw = match history.smoothed() {
            Some(smoothed) => self.exceeds(smoothed, history.baseline),
            None => false,
        };
        history.debounce(raw, self.config.debounce_samples)
    }

    fn exceeds(&self, smoothed: f64, baseline: Option<f64>) -> bool {
        match (self.config.mode, baseline) {
            (ThresholdMode::Calibrated { .. }, Some(baseline)) => {
                let average = (smoothed + baseline) / 2.0;
                if average <= 0.0 {
                    return false;
                }
                (smoothed - baseline).abs() / average >= self.config.threshold
            }
            _ => smoothed > self.config.threshold,
        }
    }
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
