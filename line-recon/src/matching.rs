use std::cmp::Reverse;
use std::collections::BTreeMap;

use nalgebra::Matrix3;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rayon::prelude::*;

use line_mvg::{epipolar_line, intersect_lines, mutual_overlap, two_way_depths};

use crate::config::MatchParams;
use crate::scoring;
use crate::view::View;
use crate::CamId;

/// A candidate correspondence between a source segment and a target segment,
/// with the ray depths from two-way triangulation. All four depths of a
/// stored match are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub src_cam: CamId,
    pub src_seg: usize,
    pub tgt_cam: CamId,
    pub tgt_seg: usize,
    /// Mutual epipolar overlap at match time.
    pub overlap: f64,
    /// 3D-consistency score; zero until the source view is scored.
    pub score3d: f64,
    pub depth_p1: f64,
    pub depth_p2: f64,
    pub depth_q1: f64,
    pub depth_q2: f64,
}

impl Match {
    /// The same correspondence seen from the target view, to be rescored
    /// there.
    pub(crate) fn mirrored(&self) -> Match {
        Match {
            src_cam: self.tgt_cam,
            src_seg: self.tgt_seg,
            tgt_cam: self.src_cam,
            tgt_seg: self.src_seg,
            overlap: self.overlap,
            score3d: 0.0,
            depth_p1: self.depth_q1,
            depth_p2: self.depth_q2,
            depth_q1: self.depth_p1,
            depth_q2: self.depth_p2,
        }
    }
}

/// Matching / scoring backend. The pipeline is fixed; implementations only
/// decide how the per-pair candidate search and the per-view rescoring are
/// executed, so an accelerated variant can be swapped in without touching
/// the engine.
pub trait Backend: Send + Sync {
    /// Candidate matches for every source segment of `src` against `tgt`.
    /// The outer vector is indexed by source segment.
    fn match_pair(
        &self,
        src: &View,
        tgt: &View,
        f: &Matrix3<f64>,
        params: &MatchParams,
    ) -> Vec<Vec<Match>>;

    /// Recompute `score3d` for all candidates of `src`, in place.
    fn score_view(&self, src: &View, candidates: &mut [Vec<Match>], params: &MatchParams);
}

/// Data-parallel CPU backend.
#[derive(Debug, Default)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    fn match_pair(
        &self,
        src: &View,
        tgt: &View,
        f: &Matrix3<f64>,
        params: &MatchParams,
    ) -> Vec<Vec<Match>> {
        src.segments
            .par_iter()
            .enumerate()
            .map(|(src_idx, r)| {
                let l1 = epipolar_line(f, &r.p1);
                let l2 = epipolar_line(f, &r.p2);
                let mut out = Vec::new();
                for (tgt_idx, c) in tgt.segments.iter().enumerate() {
                    let target_line = c.line();
                    let p1p = match intersect_lines(&l1, &target_line) {
                        Some(p) => p,
                        None => continue,
                    };
                    let p2p = match intersect_lines(&l2, &target_line) {
                        Some(p) => p,
                        None => continue,
                    };
                    let overlap = mutual_overlap(&p1p, &p2p, &c.p1, &c.p2);
                    if overlap <= params.epipolar_overlap {
                        continue;
                    }
                    let depths = match two_way_depths(&src.camera, &tgt.camera, r, c) {
                        Some(d) => d,
                        None => continue,
                    };
                    if depths.d_p1 <= 0.0
                        || depths.d_p2 <= 0.0
                        || depths.d_q1 <= 0.0
                        || depths.d_q2 <= 0.0
                    {
                        continue;
                    }
                    out.push(Match {
                        src_cam: src.cam_id,
                        src_seg: src_idx,
                        tgt_cam: tgt.cam_id,
                        tgt_seg: tgt_idx,
                        overlap,
                        score3d: 0.0,
                        depth_p1: depths.d_p1,
                        depth_p2: depths.d_p2,
                        depth_q1: depths.d_q1,
                        depth_q2: depths.d_q2,
                    });
                }
                if params.knn > 0 && out.len() > params.knn as usize {
                    // stable sort keeps target traversal order among ties
                    out.sort_by_key(|m| Reverse(OrderedFloat(m.overlap)));
                    out.truncate(params.knn as usize);
                }
                out
            })
            .collect()
    }

    fn score_view(&self, src: &View, candidates: &mut [Vec<Match>], params: &MatchParams) {
        scoring::score_view(src, candidates, params);
    }
}

/// Symmetric cache of fundamental matrices between registered views, keyed
/// by dense view index. A reverse lookup returns the transpose.
#[derive(Debug, Default)]
pub(crate) struct FundamentalCache {
    cache: Mutex<BTreeMap<(usize, usize), Matrix3<f64>>>,
}

impl FundamentalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, src: usize, tgt: usize, views: &[View]) -> Matrix3<f64> {
        let mut cache = self.cache.lock();
        if let Some(f) = cache.get(&(src, tgt)) {
            return *f;
        }
        if let Some(f) = cache.get(&(tgt, src)) {
            return f.transpose();
        }
        let f = views[src].camera.fundamental_to(&views[tgt].camera);
        cache.insert((src, tgt), f);
        f
    }
}
