#![deny(rust_2018_idioms)]

//! Multi-view 3D line reconstruction.
//!
//! Given a set of calibrated views with 2D line segments, the engine matches
//! segments pairwise along epipolar geometry, scores the candidate matches
//! for 3D consistency, links the survivors into an affinity graph and fits
//! 3D lines with collinear support intervals to the resulting clusters.
//!
//! The entry point is [`LineEngine`]: register views with
//! [`LineEngine::add_image`], then run [`LineEngine::match_images`] and
//! [`LineEngine::reconstruct`], and collect the result from
//! [`LineEngine::get_lines`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod affinity;
mod clustering;
mod config;
mod engine;
mod matching;
mod neighbors;
pub mod output;
mod registry;
mod scoring;
mod view;

pub use crate::clustering::{FinalLine3d, LineCluster3d};
pub use crate::config::{EngineConfig, MatchParams, ReconstructParams};
pub use crate::engine::{LineEngine, LineRefiner, SegmentSource, ViewSnapshot};
pub use crate::matching::{Backend, CpuBackend, Match};
pub use crate::view::View;

pub use line_mvg::{PinholeCamera, Segment2d, Segment3d};

/// Caller-supplied camera identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CamId(pub u32);

impl std::fmt::Display for CamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CamId {
    fn from(orig: u32) -> Self {
        CamId(orig)
    }
}

/// A 2D segment addressed by camera and per-view segment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId {
    pub cam: CamId,
    pub seg: usize,
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.cam, self.seg)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("camera {0} is already registered")]
    DuplicateCamera(CamId),
    #[error("camera {0}: empty tie-point / neighbor list")]
    EmptyContext(CamId),
    #[error("camera {0}: no segments supplied and no segment source configured")]
    NoSegmentSource(CamId),
    #[error("segment source failed for camera {cam}: {message}")]
    SegmentSource { cam: CamId, message: String },
    #[error("{source}")]
    Mvg {
        #[from]
        source: line_mvg::MvgError,
    },
    #[error("{source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<M> = std::result::Result<M, Error>;
