#![allow(dead_code)]

//! Shared synthetic-scene helpers for the integration tests.

use nalgebra::{Matrix3, Point3, Vector3};

use line_mvg::PinholeCamera;
use line_recon::{CamId, EngineConfig, LineEngine};

/// Honor `RUST_LOG` in test runs; repeated calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().compact())
        .with(EnvFilter::from_default_env())
        .try_init();
}

pub fn intrinsics() -> Matrix3<f64> {
    Matrix3::new(500.0, 0.0, 250.0, 0.0, 500.0, 250.0, 0.0, 0.0, 1.0)
}

/// Rotation and translation of a camera at `eye` looking at `target`.
pub fn look_at(eye: Point3<f64>, target: Point3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let up = Vector3::z();
    let fwd = (target - eye).normalize();
    let right = fwd.cross(&up).normalize();
    let down = fwd.cross(&right).normalize();
    let r = Matrix3::from_rows(&[right.transpose(), down.transpose(), fwd.transpose()]);
    let t = -r * eye.coords;
    (r, t)
}

pub fn camera_at(eye: Point3<f64>) -> PinholeCamera<f64> {
    let (r, t) = look_at(eye, Point3::origin());
    PinholeCamera::new(intrinsics(), r, t).unwrap()
}

/// Six cameras on a slightly irregular ring around the origin. The jitter
/// keeps the scene free of exactly symmetric epipolar degeneracies.
pub fn ring_positions() -> Vec<Point3<f64>> {
    let angles_deg = [3.0, 61.0, 124.0, 179.0, 242.0, 300.0];
    let radii = [5.1, 4.9, 5.2, 5.0, 4.8, 5.15];
    let heights = [1.3, 1.5, 1.2, 1.45, 1.35, 1.55];
    angles_deg
        .iter()
        .zip(radii)
        .zip(heights)
        .map(|((angle, radius), z)| {
            let a = angle * std::f64::consts::PI / 180.0;
            Point3::new(radius * a.cos(), radius * a.sin(), z)
        })
        .collect()
}

pub const CUBE_VERTICES: [[f64; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

pub const CUBE_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

pub fn cube_edge(idx: usize) -> (Point3<f64>, Point3<f64>) {
    let (a, b) = CUBE_EDGES[idx];
    (Point3::from(CUBE_VERTICES[a]), Point3::from(CUBE_VERTICES[b]))
}

/// Exact pixel projections of a set of 3D segments.
pub fn project_segments(
    cam: &PinholeCamera<f64>,
    segments: &[(Point3<f64>, Point3<f64>)],
) -> Vec<[f64; 4]> {
    segments
        .iter()
        .map(|(a, b)| {
            let pa = cam.project(a).expect("segment endpoint is visible");
            let pb = cam.project(b).expect("segment endpoint is visible");
            [pa.x, pa.y, pb.x, pb.y]
        })
        .collect()
}

/// Engine with the given 3D segments registered in every ring view, with
/// shared world-point ids driving neighbor selection.
pub fn ring_engine(segments: &[(Point3<f64>, Point3<f64>)]) -> LineEngine {
    let engine = LineEngine::new(EngineConfig::default());
    let worldpoints: Vec<u64> = (0..8).collect();
    for (i, eye) in ring_positions().into_iter().enumerate() {
        let cam = camera_at(eye);
        let segs = project_segments(&cam, segments);
        let (r, t) = look_at(eye, Point3::origin());
        engine
            .add_image(
                CamId(i as u32),
                500,
                500,
                intrinsics(),
                r,
                t,
                eye.coords.norm(),
                &worldpoints,
                Some(segs),
            )
            .unwrap();
    }
    engine
}

pub fn cube_engine() -> LineEngine {
    let edges: Vec<_> = (0..12).map(cube_edge).collect();
    ring_engine(&edges)
}

/// True when the segment's endpoints coincide with `{a, b}` in either order,
/// within `tol`.
pub fn endpoints_close(
    seg: &line_recon::Segment3d<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    tol: f64,
) -> bool {
    let fwd = nalgebra::distance(&seg.p1, a).max(nalgebra::distance(&seg.p2, b));
    let rev = nalgebra::distance(&seg.p1, b).max(nalgebra::distance(&seg.p2, a));
    fwd.min(rev) < tol
}
