//! # Sensor callbacks and safety monitoring
//!
//! The callbacks may be invoked from any thread. Each one only updates its own
//! cache or flag, apart from the cuff buttons which kill the arm.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{sync::atomic::Ordering, time::Instant};

use comms_if::eqpt::arm::{
    ButtonState, CollisionAvoidanceState, CollisionDetectionState, EndpointState, JointState,
    RangeState,
};
use log::{info, warn};
use util::{
    log_throttle,
    time::{seconds_to_duration, LoopRate},
};

use super::{ArmState, Shared};
use crate::{reach::CheckMode, sync::lock};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Rate at which the blocking waits poll.
///
/// Units: Hertz
const WAIT_RATE_HZ: f64 = 100.0;

/// Prefix of the collision object names reported by the robot.
const COLL_OBJ_PREFIX: &str = "collision_";

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Shared {
    pub(super) fn endpoint_cb(&self, msg: &EndpointState) {
        *lock(&self.endpoint) = *msg;

        if self.params.use_forces {
            self.filter_forces();
        }
    }

    pub(super) fn ir_cb(&self, msg: &RangeState) {
        *lock(&self.range) = Some(*msg);
    }

    pub(super) fn cuff_lower_cb(&self, msg: ButtonState) {
        let pressed = msg == ButtonState::Pressed;

        if pressed && !self.lower_cuff_pressed.swap(pressed, Ordering::SeqCst) {
            info!("[{}] Lower cuff button pressed!", self.limb);
            self.set_state(ArmState::Killed);
        } else {
            self.lower_cuff_pressed.store(pressed, Ordering::SeqCst);
        }
    }

    pub(super) fn cuff_upper_cb(&self, msg: ButtonState) {
        let pressed = msg == ButtonState::Pressed;

        if pressed && !self.upper_cuff_pressed.swap(pressed, Ordering::SeqCst) {
            info!("[{}] Upper cuff button pressed!", self.limb);

            if self.upper_fb_armed.load(Ordering::SeqCst) {
                self.upper_fb.store(true, Ordering::SeqCst);
            } else {
                self.set_state(ArmState::Killed);
            }
        } else {
            self.upper_cuff_pressed.store(pressed, Ordering::SeqCst);
        }
    }

    /// Keep this limb's joints from a joint state message, which may cover
    /// the whole robot.
    pub(super) fn joint_states_cb(&self, msg: &JointState) {
        if msg.name.len() < self.joint_names.len() {
            return;
        }

        let mut js = JointState::default();

        for name in self.joint_names.iter() {
            if let Some(i) = msg.name.iter().position(|n| n == name) {
                js.name.push(name.clone());
                js.position.push(msg.position.get(i).copied().unwrap_or(f64::NAN));
                js.velocity.push(msg.velocity.get(i).copied().unwrap_or(0.0));
            }
        }

        *lock(&self.joints) = js;
    }

    pub(super) fn coll_av_cb(&self, msg: &CollisionAvoidanceState) {
        let on = !msg.collision_objects.is_empty();
        self.coll_av_on.store(on, Ordering::SeqCst);

        if on {
            let objects: Vec<&str> = msg
                .collision_objects
                .iter()
                .map(|o| o.strip_prefix(COLL_OBJ_PREFIX).unwrap_or(o.as_str()))
                .collect();

            log_throttle!(
                self.coll_throttle,
                log::Level::Warn,
                "[{}] Collision avoidance with: {}",
                self.limb,
                objects.join(" ")
            );
        }
    }

    pub(super) fn coll_det_cb(&self, msg: &CollisionDetectionState) {
        self.coll_det_on.store(msg.collision_state, Ordering::SeqCst);

        if msg.collision_state {
            log_throttle!(
                self.coll_throttle,
                log::Level::Warn,
                "[{}] Collision detected!",
                self.limb
            );
        }
    }

    pub(super) fn filter_forces(&self) {
        let force = lock(&self.endpoint).force;
        lock(&self.force_filter).update_at(&force, Instant::now());
    }

    pub(super) fn detect_force_interaction(&self) -> bool {
        let force = lock(&self.endpoint).force;

        if lock(&self.force_filter).detect_interaction(&force) {
            info!(
                "[{}] Interaction: {:.3} {:.3} {:.3}",
                self.limb, force.x, force.y, force.z
            );
            true
        } else {
            false
        }
    }

    pub(super) fn wait_for_force_interaction(&self, timeout_s: f64, disable_coll_av: bool) -> bool {
        let res = self.wait_until(timeout_s, || {
            if disable_coll_av {
                self.arm.suppress_collision_av();
            }
            self.detect_force_interaction()
        });

        if res == Some(false) {
            warn!(
                "[{}] No force interaction has been detected in {} s!",
                self.limb, timeout_s
            );
        }

        res == Some(true)
    }

    pub(super) fn wait_for_joint_angles(&self, timeout_s: f64) -> bool {
        let res = self.wait_until(timeout_s, || !lock(&self.joints).position.is_empty());

        if res == Some(false) {
            warn!("[{}] No joint angles received in {} s!", self.limb, timeout_s);
        }

        res == Some(true)
    }

    pub(super) fn wait_for_upper_cuff(&self, timeout_s: f64) -> bool {
        self.upper_fb.store(false, Ordering::SeqCst);
        self.upper_fb_armed.store(true, Ordering::SeqCst);

        let res = self.wait_until(timeout_s, || self.upper_fb.load(Ordering::SeqCst));

        self.upper_fb_armed.store(false, Ordering::SeqCst);

        if res == Some(false) {
            warn!("[{}] No user feedback received in {} s!", self.limb, timeout_s);
        }

        res == Some(true)
    }

    /// Poll `cond` until it holds or `timeout_s` elapses.
    ///
    /// Returns `Some(true)` if the condition held, `Some(false)` on timeout
    /// and `None` if the arm stopped being ok.
    fn wait_until<F>(&self, timeout_s: f64, mut cond: F) -> Option<bool>
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        let timeout = seconds_to_duration(timeout_s);
        let mut rate = LoopRate::new(WAIT_RATE_HZ);

        while self.ok() {
            if cond() {
                return Some(true);
            }

            if start.elapsed() > timeout {
                return Some(false);
            }

            rate.sleep();
        }

        None
    }

    /// True if the IR range reading is under the limb's threshold for the
    /// mode. Readings outside the sensor's valid range are not collisions.
    pub(super) fn has_collided_ir(&self, mode: CheckMode) -> bool {
        let range = match *lock(&self.range) {
            Some(r) => r,
            None => return false,
        };

        let lp = self.params.limb(self.limb);
        let thresh = match mode {
            CheckMode::Strict => lp.ir_strict_m,
            CheckMode::Loose => lp.ir_loose_m,
        };

        range.range_m <= range.max_range_m
            && range.range_m >= range.min_range_m
            && range.range_m <= thresh
    }
}
