//! Action requests served by the arm controller against the simulated arm.

mod common;

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use arm_lib::{
    arm_ctrl::{self, ArmCtx, ArmVariant},
    gripper::GripperType,
    robot_interface::{ArmState, CtrlCmdError},
};
use comms_if::{
    eqpt::arm::Limb,
    tc::arm_ctrl::*,
};
use common::{fast_ri_params, wait_for, Rig};
use nalgebra::Vector3;

/// Arm variant whose recovery takes a while before going home.
struct SlowRecovery;

impl ArmVariant for SlowRecovery {
    fn recover_from_error(&self, ctx: &ArmCtx) -> bool {
        ctx.pause(1.0) && ctx.go_home()
    }
}

#[test]
fn test_home_from_idle() {
    let rig = Rig::new();
    let rx = rig.publisher.subscribe();

    assert_eq!(rig.state(), ArmState::Start);

    let resp = rig.arm.service_cb(&ActionRequest::new(ACTION_HOME, &[]));

    assert_eq!(resp, ActionResponse::new(true, ACTION_HOME));
    assert_eq!(rig.state(), ArmState::Start);
    assert!(rig
        .ri()
        .is_configuration_reached(&rig.arm.ctx().home_conf(), arm_lib::reach::CheckMode::Strict));
    assert!(!rig.sim.is_gripper_closed());

    // The latched START, then WORKING and back to START
    let states: Vec<String> = rx.try_iter().map(|tm| tm.state).collect();
    let working = states
        .iter()
        .position(|s| s == "WORKING")
        .expect("WORKING was not published");
    assert_eq!(states.first().map(String::as_str), Some("START"));
    assert!(states[working..].iter().any(|s| s == "START"));

    let latest = rig.publisher.latest().unwrap();
    assert_eq!(latest.state, "START");
    assert_eq!(latest.action, ACTION_HOME);
}

#[test]
fn test_objects_narrowed_to_database() {
    let rig = Rig::new();
    rig.arm.insert_object(9, "screwdriver").unwrap();

    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();
    rig.arm
        .insert_action("pickup", move |c| {
            *seen_clone.lock().unwrap() = Some((c.object_ids(), c.sel_object_id()));
            true
        })
        .unwrap();

    let resp = rig.arm.service_cb(&ActionRequest::new("pickup", &[5, 9]));

    assert_eq!(resp, ActionResponse::new(true, "pickup"));
    assert_eq!(rig.state(), ArmState::Done);
    assert_eq!(*seen.lock().unwrap(), Some((vec![9], Some(9))));

    let latest = rig.publisher.latest().unwrap();
    assert_eq!(latest.action, "pickup");
    assert_eq!(latest.object, "screwdriver");
}

#[test]
fn test_ctrl_cmd_rejected_while_working() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.arm.insert_action("wait", |c| c.pause(0.5)).unwrap();

    let arm = rig.arm.clone();
    let jh = thread::spawn(move || arm.service_cb(&ActionRequest::new("wait", &[1])));

    assert!(rig.wait_for_state(ArmState::Working, 2.0));

    let cmd = GoToPose::position(Vector3::new(0.6, 0.0, 0.2));
    assert_eq!(rig.ri().ctrl_msg_cb(&cmd), Err(CtrlCmdError::ArmBusy));
    assert!(!rig.ri().is_ctrl_running());
    assert_eq!(rig.state(), ArmState::Working);

    let resp = jh.join().unwrap();
    assert_eq!(resp, ActionResponse::new(true, "wait"));
    assert_eq!(rig.state(), ArmState::Done);
}

#[test]
fn test_kill_mid_action() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.arm.insert_action("long", |c| c.pause(5.0)).unwrap();

    let arm = rig.arm.clone();
    let jh = thread::spawn(move || arm.service_cb(&ActionRequest::new("long", &[1])));

    assert!(rig.wait_for_state(ArmState::Working, 2.0));
    rig.press_lower_cuff();

    // The kill is immediate, not when the action notices it
    assert_eq!(rig.state(), ArmState::Killed);

    let resp = jh.join().unwrap();
    assert_eq!(resp, ActionResponse::new(false, ACT_KILLED));
    assert_eq!(rig.state(), ArmState::Killed);
    assert_eq!(rig.arm.ctx().sub_state(), ACT_KILLED);

    // Home is accepted after a kill
    let resp = rig.arm.service_cb(&ActionRequest::new(ACTION_HOME, &[]));
    assert!(resp.success);
    assert_eq!(rig.state(), ArmState::Start);
}

#[test]
fn test_busy() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.arm.insert_action("wait", |c| c.pause(0.5)).unwrap();

    let arm = rig.arm.clone();
    let jh = thread::spawn(move || arm.service_cb(&ActionRequest::new("wait", &[1])));

    assert!(rig.wait_for_state(ArmState::Working, 2.0));
    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(ACTION_HOME, &[])),
        ActionResponse::new(false, ARM_BUSY)
    );

    assert!(jh.join().unwrap().success);
}

#[test]
fn test_list_requests() {
    let rig = Rig::new();
    rig.arm.insert_object(2, "leg").unwrap();
    rig.arm.insert_object(1, "screwdriver").unwrap();

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(LIST_ACTIONS, &[])),
        ActionResponse::new(
            true,
            "cleanup, end_hold, get, get_pass, hold, home, pass, release, start_hold"
        )
    );
    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(LIST_OBJECTS, &[])),
        ActionResponse::new(true, "[1] screwdriver, [2] leg")
    );

    assert_eq!(
        rig.arm.insert_action(LIST_OBJECTS, |_| true),
        Err(arm_ctrl::ArmCtrlError::ActionDb(
            arm_ctrl::ActionDbError::ProtectedKey(LIST_OBJECTS.into())
        ))
    );
    assert_eq!(rig.state(), ArmState::Start);
}

#[test]
fn test_invalid_objects() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[])),
        ActionResponse::new(false, NO_OBJ_SELECTED)
    );
    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[42, 43])),
        ActionResponse::new(false, OBJ_NOT_IN_DB)
    );

    // Nothing was started
    assert_eq!(rig.state(), ArmState::Start);
}

#[test]
fn test_action_not_in_db() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new("juggle", &[1])),
        ActionResponse::new(false, ACT_NOT_IN_DB)
    );
    assert_eq!(rig.state(), ArmState::Start);

    // A held object is kept through the rejection
    assert!(rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[1])).success);
    assert_eq!(rig.state(), ArmState::Done);

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new("juggle", &[1])),
        ActionResponse::new(false, ACT_NOT_IN_DB)
    );
    assert_eq!(rig.state(), ArmState::Done);
    assert!(rig.sim.is_gripper_closed());
    assert_eq!(rig.arm.ctx().action(), ACTION_GET);
}

#[test]
fn test_get_object() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();

    let resp = rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[1]));

    assert_eq!(resp, ActionResponse::new(true, ACTION_GET));
    assert_eq!(rig.state(), ArmState::Done);
    assert!(rig.sim.is_gripper_closed());

    // Picked up below the low hover above the table
    let picked = rig.arm.ctx().picked_up_pos().unwrap();
    assert!((picked - Vector3::new(0.65, -0.25, 0.05)).norm() < 0.02);
}

#[test]
fn test_get_nothing_gripped() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.sim.set_object_present(false);

    let resp = rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[1]));

    assert_eq!(resp, ActionResponse::new(false, ACT_FAILED));
    assert_eq!(rig.state(), ArmState::Error);

    // Recovery releases the gripper and goes home
    assert!(wait_for(5.0, || !rig.sim.is_gripper_closed()));
}

#[test]
fn test_ik_failure() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.sim.set_ik_enabled(false);

    let resp = rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[1]));

    assert_eq!(resp, ActionResponse::new(false, INV_KIN_FAILED));
    assert_eq!(rig.state(), ArmState::Error);
}

#[test]
fn test_get_then_pass() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();

    assert!(rig.arm.service_cb(&ActionRequest::new(ACTION_GET, &[1])).success);

    // The human takes the object once the arm is waiting for them
    let ri_arm = rig.arm.clone();
    let human = thread::spawn(move || {
        thread::sleep(Duration::from_millis(1000));
        ri_arm.ri().cuff_upper_cb(comms_if::eqpt::arm::ButtonState::Pressed);
        ri_arm.ri().cuff_upper_cb(comms_if::eqpt::arm::ButtonState::Released);
    });

    let resp = rig.arm.service_cb(&ActionRequest::new(ACTION_PASS, &[1]));
    human.join().unwrap();

    assert_eq!(resp, ActionResponse::new(true, ACTION_PASS));
    assert_eq!(rig.state(), ArmState::Done);
    assert!(!rig.sim.is_gripper_closed());
    assert_eq!(rig.arm.ctx().prev_action(), ACTION_GET);
}

#[test]
fn test_pass_needs_get() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(ACTION_PASS, &[1])),
        ActionResponse::new(false, PREV_ACT_MISSING)
    );
    assert_eq!(rig.state(), ArmState::Error);
}

#[test]
fn test_hold_refused() {
    // No hold pose on the left limb
    let rig = Rig::with(
        Limb::Left,
        GripperType::Electric,
        fast_ri_params(),
        arm_ctrl::Params::default(),
    );
    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(ACTION_START_HOLD, &[])),
        ActionResponse::new(false, ACT_FAILED)
    );
    drop(rig);

    // Suction grippers cannot hold
    let rig = Rig::with(
        Limb::Right,
        GripperType::Suction,
        fast_ri_params(),
        arm_ctrl::Params::default(),
    );
    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new(ACTION_HOLD, &[])),
        ActionResponse::new(false, ACT_FAILED)
    );
}

#[test]
fn test_request_timeout() {
    let rig = Rig::with(
        Limb::Right,
        GripperType::Electric,
        fast_ri_params(),
        arm_ctrl::Params {
            request_timeout_s: Some(0.1),
            ..Default::default()
        },
    );
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.arm.insert_action("long", |c| c.pause(1.0)).unwrap();

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new("long", &[1])),
        ActionResponse::new(false, REQ_TIMED_OUT)
    );

    // The action carries on
    assert_eq!(rig.state(), ArmState::Working);
    assert!(rig.wait_for_state(ArmState::Done, 3.0));
}

#[test]
fn test_stop_mid_action() {
    let rig = Rig::new();
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.arm.insert_action("long", |c| c.pause(5.0)).unwrap();

    let arm = rig.arm.clone();
    let jh = thread::spawn(move || arm.service_cb(&ActionRequest::new("long", &[1])));

    assert!(rig.wait_for_state(ArmState::Working, 2.0));
    rig.ri().stop();

    assert_eq!(jh.join().unwrap(), ActionResponse::new(false, ACT_KILLED));
    assert_eq!(rig.state(), ArmState::Stopped);

    // Only home is accepted once stopped
    assert!(!rig.arm.service_cb(&ActionRequest::new("long", &[1])).success);
    assert!(rig.arm.service_cb(&ActionRequest::new(ACTION_HOME, &[])).success);
    assert_eq!(rig.state(), ArmState::Start);
}

#[test]
fn test_ctrl_cmd_rejected_during_recovery() {
    let rig = Rig::with_variant(
        Limb::Right,
        GripperType::Electric,
        fast_ri_params(),
        arm_ctrl::Params::default(),
        Box::new(SlowRecovery),
    );
    rig.arm.insert_object(1, "screwdriver").unwrap();
    rig.arm.insert_action("fail", |_| false).unwrap();

    assert_eq!(
        rig.arm.service_cb(&ActionRequest::new("fail", &[1])),
        ActionResponse::new(false, ACT_FAILED)
    );
    assert_eq!(rig.state(), ArmState::Error);

    // Recovery is still moving the arm
    assert!(rig.ri().is_action_active());

    let cmd = GoToPose::position(Vector3::new(0.6, 0.0, 0.25));
    assert_eq!(rig.ri().ctrl_msg_cb(&cmd), Err(CtrlCmdError::ArmBusy));
    assert!(!rig.ri().set_ctrl_running(true));
    assert!(!rig.ri().is_ctrl_running());
    assert_eq!(rig.state(), ArmState::Error);

    assert!(wait_for(5.0, || !rig.ri().is_action_active()));
    assert_eq!(rig.ri().ctrl_msg_cb(&cmd), Ok(()));
    assert!(rig.wait_for_state(ArmState::CtrlDone, 3.0));
}
