//! Cartesian control sessions and safety monitoring of the robot interface
//! against the simulated arm.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use arm_lib::{
    arm_ctrl,
    gripper::GripperType,
    reach::CtrlType,
    robot_interface::{
        self, ArmState, CollSeverity, CtrlCmdError, IkError, IkSolution, IkSolver,
        LatchedStatePublisher, RobotInterface,
    },
    sim::SimArm,
};
use comms_if::{
    eqpt::arm::{ButtonState, JointState, Limb},
    tc::arm_ctrl::{CtrlMode, GoToPose},
    Pose,
};
use common::{fast_ri_params, wait_for, Rig};
use nalgebra::{UnitQuaternion, Vector3};

/// Solver which always fails, counting how often it is called.
struct BrokenSolver {
    calls: AtomicUsize,
}

impl IkSolver for BrokenSolver {
    fn solve(&self, _pose: &Pose, _seed: &JointState) -> Result<IkSolution, IkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(IkError::SolverError("no licence".into()))
    }
}

/// Robot interface parameters with sessions that take seconds to finish.
fn slow_ri_params() -> robot_interface::Params {
    robot_interface::Params {
        arm_speed_ms: 0.01,
        ..fast_ri_params()
    }
}

fn rig_with(ri_params: robot_interface::Params) -> Rig {
    Rig::with(
        Limb::Right,
        GripperType::Electric,
        ri_params,
        arm_ctrl::Params::default(),
    )
}

#[test]
fn test_session_reaches_target() {
    let rig = Rig::new();

    rig.ri()
        .ctrl_msg_cb(&GoToPose::position(Vector3::new(0.6, 0.0, 0.25)))
        .unwrap();

    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
    assert!(!rig.ri().is_ctrl_running());
    assert!((rig.sim.pose().position - Vector3::new(0.6, 0.0, 0.25)).norm() < 0.005);

    // Relative commands start from where the arm is now
    rig.ri().ctrl_msg_cb(&GoToPose::relative('y', 0.05)).unwrap();

    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
    assert!((rig.sim.pose().position - Vector3::new(0.6, 0.05, 0.25)).norm() < 0.01);
}

#[test]
fn test_stop_is_idempotent() {
    let rig = rig_with(slow_ri_params());

    // Nothing to stop
    assert_eq!(rig.ri().ctrl_msg_cb(&GoToPose::stop()), Ok(()));
    assert_eq!(rig.state(), ArmState::Start);

    rig.ri()
        .ctrl_msg_cb(&GoToPose::position(Vector3::new(0.6, 0.0, 0.2)))
        .unwrap();
    assert_eq!(rig.state(), ArmState::CtrlRunning);
    assert!(rig.ri().is_ctrl_running());

    assert_eq!(rig.ri().ctrl_msg_cb(&GoToPose::stop()), Ok(()));
    assert_eq!(rig.state(), ArmState::CtrlDone);
    assert!(!rig.ri().is_ctrl_running());

    assert_eq!(rig.ri().ctrl_msg_cb(&GoToPose::stop()), Ok(()));
    assert_eq!(rig.state(), ArmState::CtrlDone);
}

#[test]
fn test_kill_halts_session() {
    let rig = rig_with(slow_ri_params());

    rig.ri()
        .ctrl_msg_cb(&GoToPose::position(Vector3::new(0.6, 0.0, 0.2)))
        .unwrap();
    assert!(rig.ri().is_ctrl_running());

    rig.ri().cuff_lower_cb(ButtonState::Pressed);

    assert_eq!(rig.state(), ArmState::Killed);
    assert!(!rig.ri().is_ctrl_running());
    assert!(!rig.ri().ok());

    rig.ri().cuff_lower_cb(ButtonState::Released);
    assert_eq!(rig.state(), ArmState::Killed);
}

#[test]
fn test_rejected_commands() {
    let rig = Rig::new();

    assert_eq!(
        rig.ri().ctrl_msg_cb(&GoToPose::of_type("spin")),
        Err(CtrlCmdError::UnknownCmdType("spin".into()))
    );

    let cmd = GoToPose {
        ctrl_mode: CtrlMode::Velocity,
        ..GoToPose::relative('z', 0.05)
    };
    assert_eq!(
        rig.ri().ctrl_msg_cb(&cmd),
        Err(CtrlCmdError::ModeNotAllowed(CtrlMode::Velocity))
    );

    assert_eq!(rig.state(), ArmState::Start);
    assert!(!rig.ri().is_ctrl_running());
}

#[test]
fn test_ik_failure_fails_session() {
    let rig = Rig::new();
    rig.sim.set_ik_enabled(false);

    rig.ri()
        .ctrl_msg_cb(&GoToPose::position(Vector3::new(0.6, 0.0, 0.2)))
        .unwrap();

    assert!(rig.wait_for_state(ArmState::CtrlFail, 3.0));
    assert!(!rig.ri().is_ctrl_running());
}

#[test]
fn test_collision_severity() {
    // Warn: the session carries on
    let rig = Rig::new();
    rig.sim.set_range(0.05);
    assert!(common::wait_for(1.0, || rig
        .ri()
        .has_collided_ir(arm_lib::reach::CheckMode::Strict)));

    rig.ri()
        .ctrl_msg_cb(&GoToPose::position(Vector3::new(0.6, 0.0, 0.25)))
        .unwrap();
    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
    drop(rig);

    // Fail: the session is stopped
    let rig = rig_with(robot_interface::Params {
        coll_severity: CollSeverity::Fail,
        ..slow_ri_params()
    });
    rig.sim.set_range(0.05);
    assert!(common::wait_for(1.0, || rig
        .ri()
        .has_collided_ir(arm_lib::reach::CheckMode::Strict)));

    rig.ri()
        .ctrl_msg_cb(&GoToPose::position(Vector3::new(0.6, 0.0, 0.2)))
        .unwrap();
    assert!(rig.wait_for_state(ArmState::CtrlFail, 3.0));
}

#[test]
fn test_upper_cuff_kills_unless_waiting() {
    let rig = Rig::new();

    rig.ri().cuff_upper_cb(ButtonState::Pressed);
    rig.ri().cuff_upper_cb(ButtonState::Released);
    assert_eq!(rig.state(), ArmState::Killed);

    let ri_arm = rig.arm.clone();
    let jh = std::thread::spawn(move || ri_arm.ri().wait_for_upper_cuff(5.0));

    // The wait only counts while the arm is ok
    assert!(!jh.join().unwrap());

    rig.ri().set_state(ArmState::Start);
    let ri_arm = rig.arm.clone();
    let jh = std::thread::spawn(move || ri_arm.ri().wait_for_upper_cuff(5.0));
    std::thread::sleep(std::time::Duration::from_millis(100));
    rig.press_upper_cuff();

    assert!(jh.join().unwrap());
    assert_eq!(rig.state(), ArmState::Start);
}

#[test]
fn test_invalid_target_rejected() {
    let rig = Rig::new();
    let before = rig.sim.joints();

    let zero_ori = GoToPose {
        orientation: [0.0; 4],
        ..GoToPose::pose(&rig.sim.pose())
    };
    assert_eq!(
        rig.ri().ctrl_msg_cb(&zero_ori),
        Err(CtrlCmdError::InvalidTarget)
    );

    let nan_ori = GoToPose {
        orientation: [f64::NAN, 0.0, 0.0, 1.0],
        ..GoToPose::pose(&rig.sim.pose())
    };
    assert_eq!(
        rig.ri().ctrl_msg_cb(&nan_ori),
        Err(CtrlCmdError::InvalidTarget)
    );

    assert_eq!(
        rig.ri()
            .ctrl_msg_cb(&GoToPose::position(Vector3::new(f64::NAN, 0.0, 0.2))),
        Err(CtrlCmdError::InvalidTarget)
    );
    assert_eq!(
        rig.ri().ctrl_msg_cb(&GoToPose::relative('x', f64::INFINITY)),
        Err(CtrlCmdError::InvalidTarget)
    );

    assert_eq!(rig.state(), ArmState::Start);
    assert!(!rig.ri().is_ctrl_running());
    assert_eq!(rig.sim.joints(), before);
}

#[test]
fn test_tracking_follows_new_goal_until_stopped() {
    let rig = Rig::new();
    let tracking = |p: Vector3<f64>| GoToPose {
        tracking_mode: "on".into(),
        ..GoToPose::position(p)
    };

    let a = Vector3::new(0.6, 0.0, 0.25);
    rig.ri().ctrl_msg_cb(&tracking(a)).unwrap();
    assert!(wait_for(3.0, || (rig.sim.pose().position - a).norm() < 0.005));

    // Reaching the goal does not end the session
    thread::sleep(Duration::from_millis(200));
    assert_eq!(rig.state(), ArmState::CtrlRunning);
    assert!(rig.ri().is_ctrl_running());

    let b = Vector3::new(0.6, 0.05, 0.25);
    rig.ri().ctrl_msg_cb(&tracking(b)).unwrap();
    assert!(wait_for(3.0, || (rig.sim.pose().position - b).norm() < 0.005));

    thread::sleep(Duration::from_millis(200));
    assert_eq!(rig.state(), ArmState::CtrlRunning);

    assert_eq!(rig.ri().ctrl_msg_cb(&GoToPose::stop()), Ok(()));
    assert_eq!(rig.state(), ArmState::CtrlDone);
    assert!(!rig.ri().is_ctrl_running());
}

#[test]
fn test_ctrl_type_position() {
    // Rotations take minutes, translations are instant
    let rig = rig_with(robot_interface::Params {
        arm_rot_speed_rads: 0.01,
        ..fast_ri_params()
    });
    rig.ri().set_ctrl_type("position").unwrap();
    assert_eq!(rig.ri().ctrl_type(), CtrlType::Position);

    let start = rig.sim.pose();
    let des = Pose::new(
        Vector3::new(0.6, 0.0, 0.25),
        UnitQuaternion::from_euler_angles(0.0, 0.0, 1.0) * start.orientation,
    );
    rig.ri().ctrl_msg_cb(&GoToPose::pose(&des)).unwrap();

    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
    assert!((rig.sim.pose().position - des.position).norm() < 0.01);
    assert!(rig.sim.pose().orientation.angle_to(&des.orientation) > 0.5);
}

#[test]
fn test_ctrl_type_orientation() {
    // Translations take seconds, rotations are instant
    let rig = rig_with(slow_ri_params());
    assert!(rig.ri().set_ctrl_type("wobble").is_err());
    rig.ri().set_ctrl_type("orientation").unwrap();
    assert_eq!(rig.ri().ctrl_type(), CtrlType::Orientation);

    let start = rig.sim.pose();
    let des = Pose::new(
        start.position - Vector3::new(0.0, 0.0, 0.1),
        UnitQuaternion::from_euler_angles(0.0, 0.0, 1.0) * start.orientation,
    );
    rig.ri().ctrl_msg_cb(&GoToPose::pose(&des)).unwrap();

    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
    assert!(rig.sim.pose().orientation.angle_to(&des.orientation) < 0.45);
    assert!((rig.sim.pose().position - des.position).norm() > 0.05);
}

#[test]
fn test_velocity_mode_zeroed_on_target() {
    let rig = rig_with(robot_interface::Params {
        experimental: true,
        ..fast_ri_params()
    });
    let before = rig.sim.joints();

    // Already at the target, so the first tick ends the session
    let cmd = GoToPose {
        ctrl_mode: CtrlMode::Velocity,
        ..GoToPose::relative('z', 0.0)
    };
    rig.ri().ctrl_msg_cb(&cmd).unwrap();

    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
    assert!(wait_for(1.0, || match rig.sim.last_cmd() {
        Some(c) => {
            c.mode == CtrlMode::Velocity
                && c.velocity.len() == 7
                && c.velocity.iter().all(|v| *v == 0.0)
        }
        None => false,
    }));
    assert_eq!(rig.sim.joints(), before);
}

#[test]
fn test_wait_for_force_interaction() {
    // The baseline is only filtered on demand
    let rig = rig_with(robot_interface::Params {
        use_forces: false,
        ..fast_ri_params()
    });
    rig.ri().filter_forces();
    assert!(!rig.ri().detect_force_interaction());

    let start = Instant::now();
    assert!(!rig.ri().wait_for_force_interaction(0.2, false));
    assert!(start.elapsed() >= Duration::from_millis(200));

    let arm = rig.arm.clone();
    let jh = thread::spawn(move || arm.ri().wait_for_force_interaction(5.0, true));

    thread::sleep(Duration::from_millis(100));
    rig.sim.set_force(Vector3::new(0.0, 0.0, 5.0));

    assert!(jh.join().unwrap());
    assert!(rig.sim.num_suppressions() > 0);
    assert!(rig.ri().detect_force_interaction());
}

#[test]
fn test_solver_error_not_retried() {
    let sim = Arc::new(SimArm::new(Limb::Right, GripperType::Electric));
    let solver = Arc::new(BrokenSolver {
        calls: AtomicUsize::new(0),
    });

    let ri = RobotInterface::new(
        "test",
        Limb::Right,
        fast_ri_params(),
        Box::new(sim.clone()),
        Box::new(solver.clone()),
        Box::new(LatchedStatePublisher::new()),
    );

    assert_eq!(
        ri.compute_ik(&sim.pose()),
        Err(IkError::SolverError("no licence".into()))
    );
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
}
