use criterion::{black_box, criterion_group, criterion_main, Criterion};
use marker_pose_core::{
    estimate_marker_pose, Intrinsics, MarkerGeometry, Pose, PoseEstimator, PoseEstimatorParams,
    Quaternion,
};
use nalgebra::{Point2, Rotation3, Vector3};

fn fixture(intrinsics: &Intrinsics) -> (MarkerGeometry, [Point2<f64>; 4]) {
    let geometry = MarkerGeometry::new(0.03).expect("valid edge");
    let pose = Pose::from_axis_angle(
        Vector3::new(2.9, -0.3, 0.15),
        Vector3::new(0.04, -0.02, 0.45),
    );
    let corners = geometry.object_corners().map(|p| {
        intrinsics
            .project(&pose.transform_point(&p))
            .expect("fixture marker is in front of the camera")
    });
    (geometry, corners)
}

fn bench_estimate(c: &mut Criterion) {
    let pinhole = Intrinsics::pinhole(615.3, 615.9, 320.1, 240.4).expect("valid intrinsics");
    let (geometry, corners) = fixture(&pinhole);
    c.bench_function("estimate_pose_pinhole", |b| {
        b.iter(|| black_box(estimate_marker_pose(black_box(&corners), &geometry, &pinhole)))
    });

    let distorted = Intrinsics::new(
        615.3,
        615.9,
        320.1,
        240.4,
        vec![-0.08, 0.03, 0.0008, -0.0005, 0.0],
    )
    .expect("valid intrinsics");
    let (geometry, corners) = fixture(&distorted);
    c.bench_function("estimate_pose_distorted", |b| {
        b.iter(|| black_box(estimate_marker_pose(black_box(&corners), &geometry, &distorted)))
    });

    let linear_only = PoseEstimator::new(
        geometry,
        PoseEstimatorParams {
            max_refine_iterations: 0,
            ..PoseEstimatorParams::default()
        },
    );
    c.bench_function("estimate_pose_linear_only", |b| {
        b.iter(|| black_box(linear_only.estimate(black_box(&corners), &distorted)))
    });
}

fn bench_quaternion(c: &mut Criterion) {
    let r = Rotation3::new(Vector3::new(0.4, -1.2, 2.1));
    c.bench_function("quaternion_from_rotation", |b| {
        b.iter(|| black_box(Quaternion::from_rotation(black_box(&r))))
    });
}

criterion_group!(pose, bench_estimate, bench_quaternion);
criterion_main!(pose);
