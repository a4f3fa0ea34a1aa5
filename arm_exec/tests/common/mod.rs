//! Test rig shared by the integration tests: a full arm controller driving
//! the simulated arm, with the simulated sensors pumped into the robot
//! interface.

#![allow(dead_code)]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use arm_lib::{
    arm_ctrl::{self, ArmCtrl, ArmVariant, DefaultArm},
    gripper::GripperType,
    robot_interface::{self, ArmState, LatchedStatePublisher, RobotInterface},
    sim::{SensorPump, SimArm},
};
use comms_if::eqpt::arm::{ButtonState, Limb};

pub struct Rig {
    // Dropped before the arm, the pump holds a reference to it
    pub pump: SensorPump,
    pub arm: Arc<ArmCtrl>,
    pub sim: Arc<SimArm>,
    pub publisher: Arc<LatchedStatePublisher>,
}

/// Robot interface parameters with fast motions.
pub fn fast_ri_params() -> robot_interface::Params {
    robot_interface::Params {
        arm_speed_ms: 1.0,
        arm_rot_speed_rads: 10.0,
        motion_timeout_s: 5.0,
        ..Default::default()
    }
}

impl Rig {
    pub fn new() -> Self {
        Self::with(
            Limb::Right,
            GripperType::Electric,
            fast_ri_params(),
            arm_ctrl::Params::default(),
        )
    }

    pub fn with(
        limb: Limb,
        gripper_type: GripperType,
        ri_params: robot_interface::Params,
        ctrl_params: arm_ctrl::Params,
    ) -> Self {
        Self::with_variant(
            limb,
            gripper_type,
            ri_params,
            ctrl_params,
            Box::new(DefaultArm),
        )
    }

    pub fn with_variant(
        limb: Limb,
        gripper_type: GripperType,
        ri_params: robot_interface::Params,
        ctrl_params: arm_ctrl::Params,
        variant: Box<dyn ArmVariant>,
    ) -> Self {
        let sim = Arc::new(SimArm::new(limb, gripper_type));
        let publisher = Arc::new(LatchedStatePublisher::new());

        let ri = RobotInterface::new(
            "test",
            limb,
            ri_params,
            Box::new(sim.clone()),
            Box::new(sim.clone()),
            Box::new(publisher.clone()),
        );

        let arm = Arc::new(ArmCtrl::new(
            "test",
            limb,
            ctrl_params,
            ri,
            Box::new(sim.clone()),
            variant,
        ));

        let pump = {
            let sim = sim.clone();
            let arm = arm.clone();
            SensorPump::start(200.0, move || sim.feed(arm.ri()))
        };

        assert!(arm.ri().wait_for_joint_angles(2.0));

        Self {
            pump,
            arm,
            sim,
            publisher,
        }
    }

    pub fn ri(&self) -> &RobotInterface {
        self.arm.ri()
    }

    pub fn state(&self) -> ArmState {
        self.arm.ri().state()
    }

    pub fn press_lower_cuff(&self) {
        self.ri().cuff_lower_cb(ButtonState::Pressed);
        self.ri().cuff_lower_cb(ButtonState::Released);
    }

    pub fn press_upper_cuff(&self) {
        self.ri().cuff_upper_cb(ButtonState::Pressed);
        self.ri().cuff_upper_cb(ButtonState::Released);
    }

    /// Wait up to `timeout_s` for the arm to reach `state`.
    pub fn wait_for_state(&self, state: ArmState, timeout_s: f64) -> bool {
        wait_for(timeout_s, || self.state() == state)
    }
}

/// Poll `cond` every millisecond until it holds or the timeout elapses.
pub fn wait_for<F: FnMut() -> bool>(timeout_s: f64, mut cond: F) -> bool {
    let start = Instant::now();

    while start.elapsed() < Duration::from_secs_f64(timeout_s) {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }

    cond()
}
