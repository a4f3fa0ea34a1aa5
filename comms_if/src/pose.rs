//! # Pose
//!
//! Cartesian pose of the arm's end effector, expressed in the robot base frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Position and orientation of the end effector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position of the end effector.
    ///
    /// Units: meters
    pub position: Vector3<f64>,

    /// Orientation of the end effector, always a unit quaternion.
    pub orientation: UnitQuaternion<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Build a pose from a position and an orientation.
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Build a pose from raw components.
    ///
    /// The quaternion is given in `(x, y, z, w)` order and is renormalised, so
    /// slightly denormalised inputs (e.g. from a text parameter file) are accepted.
    pub fn from_parts_raw(px: f64, py: f64, pz: f64, ox: f64, oy: f64, oz: f64, ow: f64) -> Self {
        Self {
            position: Vector3::new(px, py, pz),
            orientation: UnitQuaternion::from_quaternion(Quaternion::new(ow, ox, oy, oz)),
        }
    }

    /// Raw `[x, y, z, w]` components of the orientation.
    pub fn orientation_xyzw(&self) -> [f64; 4] {
        let q = self.orientation.quaternion();
        [q.i, q.j, q.k, q.w]
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [ox, oy, oz, ow] = self.orientation_xyzw();
        write!(
            f,
            "[{:.3}, {:.3}, {:.3}] [{:.3}, {:.3}, {:.3}, {:.3}]",
            self.position.x, self.position.y, self.position.z, ox, oy, oz, ow
        )
    }
}
