#![deny(rust_2018_idioms)]

//! Multi-view geometry for line-segment reconstruction.
//!
//! The pieces here are deliberately camera-model agnostic: a linear pinhole
//! camera, 2D/3D segment math, epipolar helpers, plane-based two-way
//! triangulation and 3D line fitting. Everything pipeline-specific (view
//! bookkeeping, matching, scoring, clustering) lives in `line-recon`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MvgError {
    #[error("singular intrinsic matrix")]
    SingularIntrinsics,
    #[error("not enough points")]
    NotEnoughPoints,
    #[error("SVD failed")]
    SvdFailed,
}

pub type Result<M> = std::result::Result<M, MvgError>;

/// Denominator magnitudes below this are treated as degenerate.
pub const GEOM_EPS: f64 = 1e-12;

mod camera;
pub use crate::camera::PinholeCamera;

mod segment;
pub use crate::segment::{Segment2d, Segment3d};

mod epipolar;
pub use crate::epipolar::{epipolar_line, intersect_lines, mutual_overlap};

mod triangulate;
pub use crate::triangulate::{two_way_depths, TwoWayDepths};

mod fit;
pub use crate::fit::{fit_line_svd, project_ray_onto_line};
