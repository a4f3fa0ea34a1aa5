//! # Force filter
//!
//! Exponential moving average over the end effector force with predictive
//! variance gating. Each new sample is first smoothed, then compared to a
//! linear extrapolation of the filter's recent trend: samples which deviate
//! too far from the trend are rejected and the filter holds its value. This
//! keeps the filter steady against transient spikes while it still follows
//! slow changes in the steady contact force.
//!
//! The filtered value is the baseline used to detect a human pushing or
//! pulling on the arm.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use util::maths::rel_diff;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Tuning of the force filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceFilterParams {
    /// Smoothing constant of the moving average, in `[0, 1]`.
    pub alpha: f64,

    /// Predicted values below this are treated as an unwarmed filter and the
    /// new value is always accepted.
    pub epsilon: f64,

    /// Maximum relative deviation of the smoothed value from the predicted
    /// value for a sample to be accepted.
    pub variance: f64,

    /// Relative difference between the raw and filtered force above which an
    /// interaction is detected.
    pub rel_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct ForceFilter {
    params: ForceFilterParams,

    /// Units: Newtons
    filt: Vector3<f64>,

    /// Units: Newtons/second
    change: Vector3<f64>,

    last_update: Instant,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ForceFilterParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            epsilon: 1e-6,
            variance: 1e-4,
            rel_threshold: 0.2,
        }
    }
}

impl ForceFilter {
    /// A zero initialised filter.
    pub fn new(params: ForceFilterParams) -> Self {
        Self {
            params,
            filt: Vector3::zeros(),
            change: Vector3::zeros(),
            last_update: Instant::now(),
        }
    }

    /// Update the filter with a raw sample taken `dt` seconds after the
    /// previous one, returning the new filtered value.
    ///
    /// Samples with a non-positive or non-finite `dt` are ignored.
    pub fn update(&mut self, raw: &Vector3<f64>, dt: f64) -> Vector3<f64> {
        if !(dt.is_finite() && dt > 0.0) {
            return self.filt;
        }

        let alpha = self.params.alpha;

        for i in 0..3 {
            let new = (1.0 - alpha) * self.filt[i] + alpha * raw[i];
            let pred = self.filt[i] + self.change[i] * dt;

            self.change[i] = (new - self.filt[i]) / dt;

            if pred < self.params.epsilon || ((new - pred) / pred).abs() < self.params.variance {
                self.filt[i] = new;
            }
        }

        self.filt
    }

    /// Update the filter with a sample taken at `now`, using the time since
    /// the last such update as `dt`.
    pub fn update_at(&mut self, raw: &Vector3<f64>, now: Instant) -> Vector3<f64> {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        self.update(raw, dt)
    }

    /// True if any axis of `current` differs from the filtered baseline by more
    /// than the relative threshold.
    pub fn detect_interaction(&self, current: &Vector3<f64>) -> bool {
        (0..3).any(|i| rel_diff(current[i], self.filt[i]) > self.params.rel_threshold)
    }

    pub fn filtered(&self) -> Vector3<f64> {
        self.filt
    }

    /// Rate of change of the filter computed on the last update.
    pub fn rate(&self) -> Vector3<f64> {
        self.change
    }

    pub fn params(&self) -> &ForceFilterParams {
        &self.params
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn filter(variance: f64) -> ForceFilter {
        ForceFilter::new(ForceFilterParams {
            variance,
            ..Default::default()
        })
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut f = filter(1e-4);
        let raw = Vector3::new(5.0, 5.0, 5.0);

        for _ in 0..200 {
            f.update(&raw, 0.01);
        }

        assert!((f.filtered() - raw).amax() < 1e-3);
        assert!(!f.detect_interaction(&raw));
    }

    #[test]
    fn test_rejects_single_spike() {
        let mut f = filter(0.1);
        let steady = Vector3::new(5.0, 5.0, 5.0);

        for _ in 0..300 {
            f.update(&steady, 0.01);
        }

        f.update(&Vector3::new(5.0, 5.0, 50.0), 0.01);
        assert!((f.filtered().z - 5.0).abs() < 1e-6);

        // The sample after the spike is rejected too, as it is far from the
        // trend the spike introduced
        f.update(&steady, 0.01);
        assert!((f.filtered().z - 5.0).abs() < 1e-6);

        // The spike itself is an interaction
        assert!(f.detect_interaction(&Vector3::new(5.0, 5.0, 50.0)));
    }

    #[test]
    fn test_follows_sustained_step() {
        let mut f = filter(1e-4);

        for _ in 0..300 {
            f.update(&Vector3::new(5.0, 0.0, 0.0), 0.01);
        }
        for _ in 0..300 {
            f.update(&Vector3::new(8.0, 0.0, 0.0), 0.01);
        }

        assert!((f.filtered().x - 8.0).abs() < 1e-3);
    }

    #[test]
    fn test_ignores_bad_dt() {
        let mut f = filter(1e-4);
        f.update(&Vector3::new(1.0, 1.0, 1.0), 0.0);
        f.update(&Vector3::new(1.0, 1.0, 1.0), -0.1);
        f.update(&Vector3::new(1.0, 1.0, 1.0), f64::NAN);

        assert_eq!(f.filtered(), Vector3::zeros());
        assert_eq!(f.rate(), Vector3::zeros());
    }

    #[test]
    fn test_first_update_accepted() {
        let mut f = filter(1e-4);
        let out = f.update(&Vector3::new(10.0, -10.0, 0.0), 0.01);

        assert!((out - Vector3::new(3.0, -3.0, 0.0)).amax() < 1e-12);
    }
}
