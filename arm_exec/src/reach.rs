//! # Reachability predicates
//!
//! Stateless checks of whether a current pose matches a desired pose,
//! position, orientation or joint configuration within the tolerances of a
//! check mode.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fmt, str::FromStr};

use comms_if::{eqpt::arm::JointState, Pose};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use util::maths::max_abs_diff;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Tolerance profile of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckMode {
    Strict,
    Loose,
}

/// Which part of a pose a check (or a control session) is concerned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtrlType {
    Pose,
    Position,
    Orientation,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReachError {
    #[error("Mode should be either strict or loose, received {0} instead")]
    InvalidMode(String),

    #[error("Type should be either pose, position or orientation, received {0} instead")]
    InvalidType(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CheckMode {
    /// Maximum error on any axis.
    ///
    /// Units: meters
    pub fn position_threshold_m(&self) -> f64 {
        match self {
            CheckMode::Strict => 0.003,
            CheckMode::Loose => 0.010,
        }
    }

    /// Minimum absolute dot product between the two unit quaternions.
    pub fn orientation_min_dot(&self) -> f64 {
        match self {
            CheckMode::Strict => 0.98,
            CheckMode::Loose => 0.95,
        }
    }

    /// Maximum error on any joint, about half a degree (strict) or one
    /// degree (loose).
    ///
    /// Units: radians
    pub fn joint_threshold_rad(&self) -> f64 {
        match self {
            CheckMode::Strict => 0.010,
            CheckMode::Loose => 0.020,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckMode::Strict => "strict",
            CheckMode::Loose => "loose",
        }
    }
}

impl Default for CheckMode {
    fn default() -> Self {
        CheckMode::Strict
    }
}

impl FromStr for CheckMode {
    type Err = ReachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(CheckMode::Strict),
            "loose" => Ok(CheckMode::Loose),
            _ => Err(ReachError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CtrlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CtrlType::Pose => "pose",
            CtrlType::Position => "position",
            CtrlType::Orientation => "orientation",
        }
    }
}

impl Default for CtrlType {
    fn default() -> Self {
        CtrlType::Pose
    }
}

impl FromStr for CtrlType {
    type Err = ReachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pose" => Ok(CtrlType::Pose),
            "position" => Ok(CtrlType::Position),
            "orientation" => Ok(CtrlType::Orientation),
            _ => Err(ReachError::InvalidType(s.to_string())),
        }
    }
}

impl fmt::Display for CtrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True if every axis error is within the mode's threshold.
pub fn is_position_reached(curr: &Vector3<f64>, des: &Vector3<f64>, mode: CheckMode) -> bool {
    let thresh = mode.position_threshold_m();

    (0..3).all(|i| (curr[i] - des[i]).abs() <= thresh)
}

/// True if the absolute dot product of the two orientations is at least the
/// mode's minimum, which treats `q` and `-q` as the same rotation.
pub fn is_orientation_reached(
    curr: &UnitQuaternion<f64>,
    des: &UnitQuaternion<f64>,
    mode: CheckMode,
) -> bool {
    let dot = curr.quaternion().coords.dot(&des.quaternion().coords);

    dot.abs() >= mode.orientation_min_dot()
}

/// True if every desired joint is present in `curr` and within the mode's
/// threshold.
///
/// An empty or inconsistent desired configuration is never reached.
pub fn is_configuration_reached(
    curr: &JointState,
    des_names: &[String],
    des_pos: &[f64],
    mode: CheckMode,
) -> bool {
    if des_names.is_empty() || des_names.len() != des_pos.len() {
        return false;
    }

    let curr_pos: Option<Vec<f64>> = des_names
        .iter()
        .map(|name| {
            curr.name
                .iter()
                .position(|n| n == name)
                .and_then(|i| curr.position.get(i))
                .copied()
        })
        .collect();

    match curr_pos {
        Some(pos) if pos.iter().chain(des_pos.iter()).all(|p| p.is_finite()) => {
            max_abs_diff(&pos, des_pos).map_or(false, |d| d <= mode.joint_threshold_rad())
        }
        _ => false,
    }
}

/// Composite check of a pose according to the control type.
pub fn is_pose_reached(curr: &Pose, des: &Pose, mode: CheckMode, ctrl_type: CtrlType) -> bool {
    let position = || is_position_reached(&curr.position, &des.position, mode);
    let orientation = || is_orientation_reached(&curr.orientation, &des.orientation, mode);

    match ctrl_type {
        CtrlType::Pose => position() && orientation(),
        CtrlType::Position => position(),
        CtrlType::Orientation => orientation(),
    }
}

/// String based `is_pose_reached`.
///
/// Invalid mode or type strings return an error, callers treat that as not
/// reached.
pub fn check_pose_reached(
    curr: &Pose,
    des: &Pose,
    mode: &str,
    ctrl_type: &str,
) -> Result<bool, ReachError> {
    let mode: CheckMode = mode.parse()?;
    let ctrl_type: CtrlType = ctrl_type.parse()?;

    Ok(is_pose_reached(curr, des, mode, ctrl_type))
}

/// String based `is_position_reached`.
pub fn check_position_reached(
    curr: &Vector3<f64>,
    des: &Vector3<f64>,
    mode: &str,
) -> Result<bool, ReachError> {
    Ok(is_position_reached(curr, des, mode.parse()?))
}

/// String based `is_orientation_reached`.
pub fn check_orientation_reached(
    curr: &UnitQuaternion<f64>,
    des: &UnitQuaternion<f64>,
    mode: &str,
) -> Result<bool, ReachError> {
    Ok(is_orientation_reached(curr, des, mode.parse()?))
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Quaternion;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("right_j{}", i)).collect()
    }

    #[test]
    fn test_position_thresholds() {
        let des = Vector3::zeros();

        assert!(is_position_reached(&Vector3::new(0.003, -0.003, 0.0), &des, CheckMode::Strict));
        assert!(!is_position_reached(&Vector3::new(0.0, 0.0, 0.0031), &des, CheckMode::Strict));
        assert!(is_position_reached(&Vector3::new(0.0, 0.0, 0.0031), &des, CheckMode::Loose));
        assert!(is_position_reached(&Vector3::new(0.01, 0.0, 0.0), &des, CheckMode::Loose));
        assert!(!is_position_reached(&Vector3::new(0.0, -0.0101, 0.0), &des, CheckMode::Loose));
    }

    #[test]
    fn test_orientation_double_cover() {
        let q = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.0);
        let neg_q = UnitQuaternion::new_unchecked(-q.into_inner());

        assert!(is_orientation_reached(&q, &neg_q, CheckMode::Strict));

        // 0.3 rad away gives a dot product of cos(0.15) ~ 0.9888
        let r = q * UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0);
        assert!(is_orientation_reached(&q, &r, CheckMode::Strict));

        // 0.5 rad away gives cos(0.25) ~ 0.9689
        let r = q * UnitQuaternion::from_euler_angles(0.5, 0.0, 0.0);
        assert!(!is_orientation_reached(&q, &r, CheckMode::Strict));
        assert!(is_orientation_reached(&q, &r, CheckMode::Loose));

        // 0.7 rad away gives cos(0.35) ~ 0.9394
        let r = q * UnitQuaternion::from_euler_angles(0.7, 0.0, 0.0);
        assert!(!is_orientation_reached(&q, &r, CheckMode::Loose));
    }

    #[test]
    fn test_invalid_mode_strings() {
        let p = Pose::default();

        assert_eq!(
            check_position_reached(&p.position, &p.position, "lenient"),
            Err(ReachError::InvalidMode("lenient".into()))
        );
        assert_eq!(
            check_orientation_reached(&p.orientation, &p.orientation, ""),
            Err(ReachError::InvalidMode("".into()))
        );
        assert_eq!(
            check_pose_reached(&p, &p, "strict", "everything"),
            Err(ReachError::InvalidType("everything".into()))
        );
        assert_eq!(check_pose_reached(&p, &p, "loose", "pose"), Ok(true));
    }

    #[test]
    fn test_pose_by_type() {
        let curr = Pose::default();
        let des = Pose::new(
            Vector3::new(0.5, 0.0, 0.0),
            UnitQuaternion::from_quaternion(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
        );

        assert!(!is_pose_reached(&curr, &des, CheckMode::Strict, CtrlType::Pose));
        assert!(!is_pose_reached(&curr, &des, CheckMode::Strict, CtrlType::Position));
        assert!(is_pose_reached(&curr, &des, CheckMode::Strict, CtrlType::Orientation));
    }

    #[test]
    fn test_configuration() {
        let curr = JointState {
            // Other limb's joints and a different order are fine
            name: vec!["left_j0".into(), "right_j1".into(), "right_j0".into()],
            position: vec![9.0, 0.515, 0.1],
            velocity: vec![0.0; 3],
        };

        assert!(is_configuration_reached(&curr, &names(2), &[0.1, 0.5], CheckMode::Loose));
        assert!(!is_configuration_reached(&curr, &names(2), &[0.1, 0.5], CheckMode::Strict));

        // Unknown joint name
        assert!(!is_configuration_reached(&curr, &names(3), &[0.1, 0.5, 0.0], CheckMode::Loose));

        // Empty or mismatched requests
        assert!(!is_configuration_reached(&curr, &[], &[], CheckMode::Loose));
        assert!(!is_configuration_reached(&curr, &names(2), &[0.1], CheckMode::Loose));
    }
}
