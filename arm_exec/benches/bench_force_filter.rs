//! # Force Filter Benchmark
//!
//! The filter and the reachability predicates run inside the sensor callbacks
//! and the control loop, so they are benchmarked against the control period.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arm_lib::{
    force_filter::{ForceFilter, ForceFilterParams},
    reach::{self, CheckMode, CtrlType},
};
use comms_if::{eqpt::arm::JointState, Pose};
use nalgebra::{UnitQuaternion, Vector3};

fn force_filter_benchmark(c: &mut Criterion) {
    // ---- Build a noisy force signal ----

    let samples: Vec<Vector3<f64>> = (0..1000)
        .map(|i| {
            let t = i as f64 * 0.01;
            Vector3::new(
                2.0 + 0.1 * (t * 13.0).sin(),
                -1.0 + 0.1 * (t * 7.0).cos(),
                9.8 + 0.05 * (t * 29.0).sin(),
            )
        })
        .collect();

    c.bench_function("ForceFilter::update", |b| {
        let mut filter = ForceFilter::new(ForceFilterParams::default());
        b.iter(|| {
            for s in samples.iter() {
                filter.update(black_box(s), 0.01);
            }
        })
    });

    let mut filter = ForceFilter::new(ForceFilterParams::default());
    for s in samples.iter() {
        filter.update(s, 0.01);
    }

    c.bench_function("ForceFilter::detect_interaction", |b| {
        b.iter(|| filter.detect_interaction(black_box(&Vector3::new(5.0, -1.0, 9.8))))
    });
}

fn reach_benchmark(c: &mut Criterion) {
    let curr = Pose::new(
        Vector3::new(0.65, -0.25, 0.1),
        UnitQuaternion::from_euler_angles(3.1, 0.0, 0.1),
    );
    let des = Pose::new(
        Vector3::new(0.651, -0.249, 0.1),
        UnitQuaternion::from_euler_angles(3.1, 0.01, 0.1),
    );

    c.bench_function("reach::is_pose_reached", |b| {
        b.iter(|| {
            reach::is_pose_reached(
                black_box(&curr),
                black_box(&des),
                CheckMode::Strict,
                CtrlType::Pose,
            )
        })
    });

    let names: Vec<String> = (0..7).map(|i| format!("right_j{}", i)).collect();
    let js = JointState {
        name: names.clone(),
        position: vec![0.1; 7],
        velocity: vec![0.0; 7],
    };
    let des_pos = vec![0.105; 7];

    c.bench_function("reach::is_configuration_reached", |b| {
        b.iter(|| {
            reach::is_configuration_reached(
                black_box(&js),
                &names,
                black_box(&des_pos),
                CheckMode::Strict,
            )
        })
    });
}

criterion_group!(benches, force_filter_benchmark, reach_benchmark);
criterion_main!(benches);
