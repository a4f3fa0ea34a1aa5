//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::{eqpt::arm::Limb, Pose};
use serde::{Deserialize, Serialize};

use crate::robot_interface::NUM_JOINTS;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the arm controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- REQUESTS ----
    /// Try to recover from a failed action by releasing the object and going
    /// home.
    pub internal_recovery: bool,

    /// Maximum time an action request waits for the action to end, `None` to
    /// wait until it ends however long it takes.
    ///
    /// Units: seconds
    pub request_timeout_s: Option<f64>,

    /// Rate at which an action request polls the arm state.
    ///
    /// Units: Hertz
    pub request_poll_hz: f64,

    /// Location of the home configuration used at startup.
    pub home_location: HomeLocation,

    // ---- HEIGHTS AND DISTANCES ----
    /// Height of the low hover above the table.
    ///
    /// Units: meters
    pub z_low_m: f64,

    /// Height of the high hover above the table.
    ///
    /// Units: meters
    pub z_high_m: f64,

    /// Distance the gripper descends from the low hover to pick up an object.
    ///
    /// Units: meters
    pub pick_depth_m: f64,

    /// Distance an object is lifted after being picked up.
    ///
    /// Units: meters
    pub lift_m: f64,

    /// Distance an object is lifted after being picked up to be cleaned up.
    ///
    /// Units: meters
    pub cleanup_lift_m: f64,

    // ---- USER FEEDBACK ----
    /// Units: seconds
    pub hold_start_timeout_s: f64,

    /// Units: seconds
    pub hold_end_timeout_s: f64,

    /// Units: seconds
    pub pass_timeout_s: f64,

    // ---- PER LIMB ----
    pub left: LimbParams,
    pub right: LimbParams,
}

/// Parameters which depend on the limb.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimbParams {
    /// Home joint configuration when working at the table.
    ///
    /// Units: radians
    pub home_conf_table: [f64; NUM_JOINTS],

    /// Home joint configuration when working at the pool.
    ///
    /// Units: radians
    pub home_conf_pool: [f64; NUM_JOINTS],

    /// Position of the table centre in the horizontal plane.
    ///
    /// Units: meters
    pub table_pos_m: [f64; 2],

    /// Position above the pool where objects are dropped.
    ///
    /// Units: meters
    pub pool_pos_m: [f64; 3],

    /// Position where objects are passed to the human.
    ///
    /// Units: meters
    pub pass_pos_m: [f64; 3],

    /// Position where objects are held for the human, `None` if the limb
    /// cannot hold objects.
    ///
    /// Units: meters
    pub hold_pos_m: Option<[f64; 3]>,

    /// Orientation with the gripper pointing down, `[x, y, z, w]`.
    pub vertical_ori: [f64; 4],

    /// Orientation with the gripper pointing forwards, `[x, y, z, w]`.
    pub horizontal_ori: [f64; 4],

    /// Object database, `name = id`.
    pub objects: toml::value::Table,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeLocation {
    Table,
    Pool,
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
}

impl LimbParams {
    pub fn home_conf(&self, location: HomeLocation) -> [f64; NUM_JOINTS] {
        match location {
            HomeLocation::Table => self.home_conf_table,
            HomeLocation::Pool => self.home_conf_pool,
        }
    }

    /// Pose above the table centre at the given height, gripper down.
    pub fn table_pose(&self, height_m: f64) -> Pose {
        pose(
            [self.table_pos_m[0], self.table_pos_m[1], height_m],
            self.vertical_ori,
        )
    }

    pub fn pool_pose(&self) -> Pose {
        pose(self.pool_pos_m, self.vertical_ori)
    }

    pub fn pass_pose(&self) -> Pose {
        pose(self.pass_pos_m, self.horizontal_ori)
    }

    pub fn hold_pose(&self) -> Option<Pose> {
        self.hold_pos_m.map(|p| pose(p, self.horizontal_ori))
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            internal_recovery: true,
            request_timeout_s: None,
            request_poll_hz: 100.0,
            home_location: HomeLocation::Table,
            z_low_m: 0.1,
            z_high_m: 0.25,
            pick_depth_m: 0.05,
            lift_m: 0.1,
            cleanup_lift_m: 0.3,
            hold_start_timeout_s: 30.0,
            hold_end_timeout_s: 180.0,
            pass_timeout_s: 60.0,
            left: LimbParams {
                home_conf_table: [0.1967, -0.8702, -1.0531, 1.5578, 0.6516, 1.2464, -0.1787],
                home_conf_pool: [0.7060, -1.2717, 0.3846, 1.5405, -0.1273, 1.3135, 0.3206],
                table_pos_m: [0.65, 0.45],
                pool_pos_m: [-0.10, 0.60, 0.20],
                pass_pos_m: [0.80, 0.26, 0.32],
                hold_pos_m: None,
                ..Default::default()
            },
            right: LimbParams {
                home_conf_table: [0.0717, -1.0009, 1.1083, 1.5520, -0.5235, 1.3468, 0.4464],
                home_conf_pool: [-1.6801, -1.0500, 1.1693, 1.9762, -0.5722, 1.0205, 0.5430],
                table_pos_m: [0.65, -0.25],
                pool_pos_m: [-0.10, -0.60, 0.20],
                pass_pos_m: [0.85, -0.26, 0.27],
                hold_pos_m: Some([0.80, -0.40, 0.30]),
                ..Default::default()
            },
        }
    }
}

impl Default for LimbParams {
    fn default() -> Self {
        Self {
            home_conf_table: [0.0; NUM_JOINTS],
            home_conf_pool: [0.0; NUM_JOINTS],
            table_pos_m: [0.65, 0.0],
            pool_pos_m: [-0.10, 0.0, 0.20],
            pass_pos_m: [0.80, 0.0, 0.30],
            hold_pos_m: None,
            vertical_ori: [0.0, 1.0, 0.0, 0.0],
            horizontal_ori: [0.0, 0.70, 0.10, 0.70],
            objects: toml::value::Table::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn pose(p: [f64; 3], o: [f64; 4]) -> Pose {
    Pose::from_parts_raw(p[0], p[1], p[2], o[0], o[1], o[2], o[3])
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_load_objects_and_location() {
        let p: Params = toml::from_str(
            r#"
            home_location = "pool"
            request_timeout_s = 5.0

            [right.objects]
            screwdriver = 3
            "#,
        )
        .unwrap();

        assert_eq!(p.home_location, HomeLocation::Pool);
        assert_eq!(p.request_timeout_s, Some(5.0));
        assert_eq!(p.right.objects.len(), 1);

        // Limb tables given in the file replace the defaults entirely
        assert_eq!(p.right.home_conf_table, [0.0; NUM_JOINTS]);
        assert_eq!(p.left.home_conf_table[0], 0.1967);
        assert!(p.request_timeout_s.is_some());
    }

    #[test]
    fn test_poses() {
        let lp = Params::default().right;

        let t = lp.table_pose(0.1);
        assert_eq!(t.position, Vector3::new(0.65, -0.25, 0.1));
        assert!((t.orientation.quaternion().norm() - 1.0).abs() < 1e-12);

        assert!(lp.hold_pose().is_some());
        assert!(Params::default().left.hold_pose().is_none());
    }
}
