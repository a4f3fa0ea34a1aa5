//! Parameters structure for the RobotInterface

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::arm::Limb;
use serde::{Deserialize, Serialize};

use crate::force_filter::ForceFilterParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the RobotInterface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- CONTROL LOOP ----
    /// Frequency of the cartesian control loop.
    ///
    /// Units: Hertz
    pub ctrl_freq_hz: f64,

    /// Frequency of the trajectory particle thread.
    ///
    /// Units: Hertz
    pub particle_freq_hz: f64,

    /// Linear speed of the end effector during control sessions.
    ///
    /// Units: meters/second
    pub arm_speed_ms: f64,

    /// Rotational speed of the end effector during control sessions.
    ///
    /// Units: radians/second
    pub arm_rot_speed_rads: f64,

    /// Start the cartesian control loop thread.
    pub use_cart_ctrl: bool,

    /// Allow the velocity and raw position control modes.
    pub experimental: bool,

    /// What to do if a collision is detected during a control session.
    pub coll_severity: CollSeverity,

    // ---- FORCES ----
    /// Filter the end effector forces on every endpoint update.
    pub use_forces: bool,

    /// Smoothing constant of the force filter.
    pub force_alpha: f64,

    /// Predicted forces below this are accepted unconditionally.
    ///
    /// Units: Newtons
    pub force_epsilon: f64,

    // ---- INVERSE KINEMATICS ----
    /// Total time allowed for a single `compute_ik` call including retries.
    ///
    /// Units: seconds
    pub ik_timeout_s: f64,

    /// Amount the target is raised between IK retries.
    ///
    /// Units: meters
    pub ik_z_step_m: f64,

    /// Maximum amount the target may be raised before IK gives up.
    ///
    /// Units: meters
    pub ik_z_window_m: f64,

    /// A single solver call slower than this is warned about.
    ///
    /// Units: seconds
    pub ik_slow_warn_s: f64,

    // ---- BLOCKING MOTION ----
    /// Rate at which blocking motions resend their joint command.
    ///
    /// Units: Hertz
    pub motion_cmd_rate_hz: f64,

    /// Maximum duration of a blocking motion.
    ///
    /// Units: seconds
    pub motion_timeout_s: f64,

    // ---- PER LIMB ----
    pub left: LimbParams,
    pub right: LimbParams,
}

/// Parameters which depend on the limb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimbParams {
    /// Maximum relative deviation from the predicted force for a sample to be
    /// accepted by the filter.
    pub filt_variance: f64,

    /// Relative force change detected as an interaction.
    pub rel_force_thres: f64,

    /// IR range under which the gripper is colliding, strict mode.
    ///
    /// Units: meters
    pub ir_strict_m: f64,

    /// IR range under which the gripper is colliding, loose mode.
    ///
    /// Units: meters
    pub ir_loose_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Effect of a detected collision on a running control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollSeverity {
    /// Log the collision and carry on.
    Warn,

    /// Fail the session.
    Fail,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    pub fn limb(&self, limb: Limb) -> &LimbParams {
        match limb {
            Limb::Left => &self.left,
            Limb::Right => &self.right,
        }
    }

    /// Force filter parameters for the given limb.
    pub fn force_filter(&self, limb: Limb) -> ForceFilterParams {
        let lp = self.limb(limb);

        ForceFilterParams {
            alpha: self.force_alpha,
            epsilon: self.force_epsilon,
            variance: lp.filt_variance,
            rel_threshold: lp.rel_force_thres,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            ctrl_freq_hz: 100.0,
            particle_freq_hz: 100.0,
            arm_speed_ms: 0.05,
            arm_rot_speed_rads: 0.5,
            use_cart_ctrl: true,
            experimental: false,
            coll_severity: CollSeverity::Warn,
            use_forces: true,
            force_alpha: 0.3,
            force_epsilon: 1e-6,
            ik_timeout_s: 0.05,
            ik_z_step_m: 0.001,
            ik_z_window_m: 0.01,
            ik_slow_warn_s: 0.010,
            motion_cmd_rate_hz: 100.0,
            motion_timeout_s: 30.0,
            left: LimbParams {
                ir_strict_m: 0.050,
                ir_loose_m: 0.067,
                ..Default::default()
            },
            right: LimbParams {
                ir_strict_m: 0.089,
                ir_loose_m: 0.110,
                ..Default::default()
            },
        }
    }
}

impl Default for LimbParams {
    fn default() -> Self {
        Self {
            filt_variance: 1e-4,
            rel_force_thres: 0.2,
            ir_strict_m: 0.050,
            ir_loose_m: 0.067,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let p: Params = toml::from_str(
            r#"
            arm_speed_ms = 0.1
            coll_severity = "Fail"

            [right]
            filt_variance = 0.01
            rel_force_thres = 0.5
            ir_strict_m = 0.09
            ir_loose_m = 0.11
            "#,
        )
        .unwrap();

        assert_eq!(p.arm_speed_ms, 0.1);
        assert_eq!(p.coll_severity, CollSeverity::Fail);
        assert_eq!(p.ctrl_freq_hz, 100.0);
        assert_eq!(p.left.ir_strict_m, 0.050);
        assert_eq!(p.force_filter(Limb::Right).variance, 0.01);
        assert_eq!(p.force_filter(Limb::Right).alpha, 0.3);
    }
}
