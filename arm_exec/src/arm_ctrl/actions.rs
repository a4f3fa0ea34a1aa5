//! # Built-in actions
//!
//! The actions every arm provides, and the motion helpers they are built
//! from. Each action returns `true` on success. On failure the sub state may
//! be set to explain why, otherwise the arm controller reports a generic
//! failure.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{thread, time::Instant};

use comms_if::{
    tc::arm_ctrl::{ACTION_GET, ACT_KILLED, INV_KIN_FAILED, PREV_ACT_MISSING},
    Pose,
};
use log::{error, info, warn};
use nalgebra::Vector3;
use util::time::{seconds_to_duration, LoopRate};

use super::{capabilities::PassTarget, ArmCtx};
use crate::{gripper::GripperType, reach::CheckMode, robot_interface::ArmState, sync::lock};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Length of the slices a pause is split into, so that it can be
/// interrupted.
///
/// Units: seconds
const PAUSE_SLICE_S: f64 = 0.01;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Direction of a straight line motion, in the robot base frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Direction {
    pub fn unit(&self) -> Vector3<f64> {
        match self {
            Direction::Forward => Vector3::x(),
            Direction::Backward => -Vector3::x(),
            Direction::Left => Vector3::y(),
            Direction::Right => -Vector3::y(),
            Direction::Up => Vector3::z(),
            Direction::Down => -Vector3::z(),
        }
    }
}

impl ArmCtx {
    // ---- ACTIONS ----

    /// Go to the home configuration and open the gripper.
    pub fn go_home(&self) -> bool {
        let res = self.home_pose_strict(false);
        self.gripper.open() && res
    }

    /// Pick up the selected object from the table and bring it home.
    pub fn get_object(&self) -> bool {
        lock(&self.book).picked_up_pos = None;

        if !self.home_pose_strict(false) {
            return false;
        }
        self.pause(0.05);

        if !self.variant.select_object_for_pick_up(self) {
            return false;
        }
        if !self.variant.pick_up_object(self) {
            return false;
        }
        if !self.gripper.close() {
            return false;
        }

        lock(&self.book).picked_up_pos = Some(self.ri.position());

        if !self.move_arm(Direction::Up, self.params.lift_m, CheckMode::Loose, false) {
            return false;
        }
        if !self.home_pose_strict(false) {
            return false;
        }

        self.gripper.is_gripping()
    }

    /// Hand the object picked up by the previous `get` over.
    pub fn pass_object(&self) -> bool {
        if self.prev_action() != ACTION_GET {
            error!(
                "[{}] Cannot pass, the previous action was {:?} rather than {}",
                self.limb,
                self.prev_action(),
                ACTION_GET
            );
            self.set_sub_state(PREV_ACT_MISSING);
            return false;
        }

        let target = match self.variant.move_object_to_pass_position(self) {
            Some(t) => t,
            None => return false,
        };
        self.pause(0.25);

        if target == PassTarget::Human && !self.wait_for_user_fb(self.params.pass_timeout_s) {
            return false;
        }

        if !self.gripper.open() {
            return false;
        }
        self.pause(0.2);

        if target == PassTarget::Table
            && !self.hover_above_table(self.params.z_low_m, CheckMode::Loose, false)
        {
            return false;
        }

        self.home_pose_strict(false)
    }

    pub fn get_pass_object(&self) -> bool {
        if !self.get_object() {
            return false;
        }

        self.set_prev_action(ACTION_GET);
        self.pass_object()
    }

    /// Pick up the selected object and drop it in the pool.
    pub fn clean_up_object(&self) -> bool {
        if !self.hover_above_table(self.params.z_high_m, CheckMode::Loose, false) {
            return false;
        }
        self.pause(0.05);

        if !self.variant.select_object_for_pick_up(self) {
            return false;
        }
        if !self.variant.pick_up_object(self) {
            return false;
        }
        if !self.gripper.close() {
            return false;
        }
        if !self.move_arm(
            Direction::Up,
            self.params.cleanup_lift_m,
            CheckMode::Loose,
            false,
        ) {
            return false;
        }
        if !self.home_pose_strict(false) {
            return false;
        }
        if !self.variant.move_object_to_pool_position(self) {
            return false;
        }
        self.pause(0.25);

        if !self.gripper.open() {
            return false;
        }

        self.home_pose_strict(false)
    }

    /// Go to the hold pose and grasp the object once the user confirms.
    pub fn start_hold(&self) -> bool {
        if !self.can_hold() {
            return false;
        }

        if !self.go_hold_pose() {
            return false;
        }
        self.pause(0.5);

        if !self.wait_for_user_fb(self.params.hold_start_timeout_s) {
            return false;
        }
        if !self.gripper.close() {
            return false;
        }

        self.pause(1.0)
    }

    /// Release the held object once the user confirms and go home.
    pub fn end_hold(&self) -> bool {
        if !self.can_hold() {
            return false;
        }

        if !self.wait_for_user_fb(self.params.hold_end_timeout_s) {
            return false;
        }
        if !self.gripper.open() {
            return false;
        }
        self.pause(1.0);

        self.home_pose_strict(false)
    }

    pub fn hold_object(&self) -> bool {
        self.start_hold() && self.end_hold()
    }

    // ---- MOTION HELPERS ----

    /// Move to the home configuration and wait until it is reached.
    pub fn home_pose_strict(&self, disable_coll_av: bool) -> bool {
        info!("[{}] Going home", self.limb);

        match self
            .ri
            .go_to_joint_conf(&self.home_conf(), CheckMode::Strict, disable_coll_av)
        {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] Could not reach home: {}", self.limb, e);
                false
            }
        }
    }

    /// Move to `pose`, setting the sub state if the motion fails while the
    /// arm was not killed.
    pub fn go_to_pose(&self, pose: &Pose, mode: CheckMode, disable_coll_av: bool) -> bool {
        match self.ri.go_to_pose(pose, mode, disable_coll_av) {
            Ok(()) => true,
            Err(e) => {
                error!("[{}] Could not go to {}: {}", self.limb, pose, e);

                if self.ri.state() != ArmState::Killed && self.sub_state() != ACT_KILLED {
                    self.set_sub_state(INV_KIN_FAILED);
                }
                false
            }
        }
    }

    /// Move in a straight line by `dist` along `dir`, keeping the current
    /// orientation.
    ///
    /// The intermediate targets advance at the arm speed from the start
    /// position until the final position is reached.
    pub fn move_arm(
        &self,
        dir: Direction,
        dist: f64,
        mode: CheckMode,
        disable_coll_av: bool,
    ) -> bool {
        let ri_params = self.ri.params();
        let start_pos = self.ri.position();
        let ori = self.ri.orientation();
        let final_pos = start_pos + dir.unit() * dist;

        let start = Instant::now();
        let timeout = seconds_to_duration(ri_params.motion_timeout_s);
        let mut rate = LoopRate::new(ri_params.motion_cmd_rate_hz);

        while self.ok() && !self.ri.is_position_reached(&final_pos, mode) {
            if disable_coll_av {
                self.ri.suppress_collision_av();
            }

            let t_elap = start.elapsed().as_secs_f64();
            let travelled = (ri_params.arm_speed_ms * t_elap).min(dist);
            let target = Pose::new(start_pos + dir.unit() * travelled, ori);

            if let Err(e) = self.ri.go_to_pose_no_check(&target) {
                error!("[{}] Move {:?} failed: {}", self.limb, dir, e);
                return false;
            }

            if start.elapsed() > timeout {
                warn!("[{}] Move {:?} timed out", self.limb, dir);
                return false;
            }

            rate.sleep();
        }

        self.ok()
    }

    pub fn hover_above_table(&self, height_m: f64, mode: CheckMode, disable_coll_av: bool) -> bool {
        let pose = self.limb_params().table_pose(height_m);
        self.go_to_pose(&pose, mode, disable_coll_av)
    }

    pub fn hover_above_pool(&self) -> bool {
        let pose = self.limb_params().pool_pose();
        self.go_to_pose(&pose, CheckMode::Loose, false)
    }

    fn go_hold_pose(&self) -> bool {
        match self.limb_params().hold_pose() {
            Some(pose) => self.go_to_pose(&pose, CheckMode::Loose, false),
            None => {
                error!("[{}] No hold pose for this limb", self.limb);
                false
            }
        }
    }

    fn can_hold(&self) -> bool {
        if self.gripper.gripper_type() == GripperType::Suction {
            error!("[{}] Cannot hold objects with a suction gripper", self.limb);
            false
        } else {
            true
        }
    }

    /// Wait for the user to press the upper cuff button.
    pub fn wait_for_user_fb(&self, timeout_s: f64) -> bool {
        info!("[{}] Waiting for user feedback", self.limb);
        self.ri.wait_for_upper_cuff(timeout_s)
    }

    /// Sleep for `seconds`, returning early (and false) if the arm stops
    /// being ok.
    pub fn pause(&self, seconds: f64) -> bool {
        let start = Instant::now();
        let duration = seconds_to_duration(seconds);
        let slice = seconds_to_duration(PAUSE_SLICE_S);

        while self.ok() {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return true;
            }

            thread::sleep(slice.min(duration - elapsed));
        }

        false
    }
}
