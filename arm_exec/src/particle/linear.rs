//! Constant speed straight line motion law

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector3;

use super::MotionLaw;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Distance under which the particle is considered to be on its target.
///
/// Units: meters
const REACHED_EPSILON_M: f64 = 1e-6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A 3D point following a straight line from start to end at constant speed.
#[derive(Debug, Clone, Default)]
pub struct LinearPointParticle {
    start_pt: Vector3<f64>,
    des_pt: Vector3<f64>,

    /// Units: meters/second
    speed_ms: f64,

    is_set: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LinearPointParticle {
    /// An unset particle, call `setup` before starting it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup(start: Vector3<f64>, des: Vector3<f64>, speed_ms: f64) -> Self {
        let mut p = Self::new();
        p.setup(start, des, speed_ms);
        p
    }

    /// Set the start point, desired point and speed of the particle.
    ///
    /// Returns false (leaving the particle unset) if the speed is not a
    /// positive number or a point is not finite.
    pub fn setup(&mut self, start: Vector3<f64>, des: Vector3<f64>, speed_ms: f64) -> bool {
        let finite = start.iter().chain(des.iter()).all(|v| v.is_finite());

        self.is_set = finite && speed_ms.is_finite() && speed_ms > 0.0;

        if self.is_set {
            self.start_pt = start;
            self.des_pt = des;
            self.speed_ms = speed_ms;
        }

        self.is_set
    }
}

impl MotionLaw for LinearPointParticle {
    fn is_set(&self) -> bool {
        self.is_set
    }

    fn initial_point(&self) -> Vector3<f64> {
        self.start_pt
    }

    fn desired_point(&self) -> Vector3<f64> {
        self.des_pt
    }

    fn next_point(&mut self, elapsed_s: f64) -> Vector3<f64> {
        let path = self.des_pt - self.start_pt;
        let length = path.norm();
        let travelled = self.speed_ms * elapsed_s.max(0.0);

        if length < REACHED_EPSILON_M || travelled >= length {
            self.des_pt
        } else {
            self.start_pt + path * (travelled / length)
        }
    }

    fn is_reached(&self, point: &Vector3<f64>) -> bool {
        (point - self.des_pt).norm() < REACHED_EPSILON_M
    }
}
