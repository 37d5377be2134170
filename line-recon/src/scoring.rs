use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use line_mvg::Segment3d;

use crate::config::{MatchParams, MIN_BEST_SCORE_3D, MIN_SIM_3D};
use crate::matching::Match;
use crate::view::View;
use crate::SegmentId;

/// Gaussian similarity kernel.
#[inline]
pub(crate) fn gauss(delta: f64, sigma: f64) -> f64 {
    let sigma = sigma.max(f64::EPSILON);
    (-(delta * delta) / (2.0 * sigma * sigma)).exp()
}

/// Angular similarity for an (undirected) angle in degrees.
#[inline]
pub(crate) fn sim_angle(angle_deg: f64, sigma_a: f64) -> f64 {
    gauss(angle_deg, sigma_a)
}

/// Back-project segment `seg_idx` of `view` to the 3D segment at the given
/// ray depths.
pub(crate) fn backproject(view: &View, seg_idx: usize, d1: f64, d2: f64) -> Segment3d<f64> {
    let seg = &view.segments[seg_idx];
    Segment3d::new(
        view.camera.point_at_depth(&seg.p1, d1),
        view.camera.point_at_depth(&seg.p2, d2),
    )
}

/// Similarity of two 3D segments: angular kernel combined with
/// endpoint-symmetric point-to-line distances under a positional sigma.
pub(crate) fn segment_similarity_3d(
    a: &Segment3d<f64>,
    b: &Segment3d<f64>,
    sigma_pos: f64,
    sigma_a: f64,
) -> f64 {
    let sim_a = sim_angle(a.angle_to_deg(b, true), sigma_a);
    let d = a
        .distance_to_point(&b.p1)
        .max(a.distance_to_point(&b.p2))
        .max(b.distance_to_point(&a.p1))
        .max(b.distance_to_point(&a.p2));
    sim_a.min(gauss(d, sigma_pos))
}

/// Rescore every candidate of the source view for 3D consistency.
///
/// Each candidate is compared with the other candidates of the same source
/// segment that target a different view; per target camera only the
/// strongest agreement counts, and the per-camera maxima are summed into
/// `score3d`.
pub(crate) fn score_view(src: &View, candidates: &mut [Vec<Match>], params: &MatchParams) {
    let sigma_a = params.sigma_a;
    candidates.par_iter_mut().enumerate().for_each(|(seg_idx, list)| {
        if list.is_empty() {
            return;
        }
        let segs3d: Vec<Segment3d<f64>> = list
            .iter()
            .map(|m| backproject(src, seg_idx, m.depth_p1, m.depth_p2))
            .collect();
        let scores: Vec<f64> = (0..list.len())
            .map(|a| {
                let mut per_cam: BTreeMap<crate::CamId, f64> = BTreeMap::new();
                for b in 0..list.len() {
                    if b == a || list[b].tgt_cam == list[a].tgt_cam {
                        continue;
                    }
                    let sim_a = sim_angle(segs3d[a].angle_to_deg(&segs3d[b], true), sigma_a);
                    let sim_p = gauss(
                        list[a].depth_p1 - list[b].depth_p1,
                        src.position_sigma(list[a].depth_p1),
                    )
                    .min(gauss(
                        list[a].depth_p2 - list[b].depth_p2,
                        src.position_sigma(list[a].depth_p2),
                    ));
                    let sim = sim_a.min(sim_p);
                    if sim < MIN_SIM_3D {
                        continue;
                    }
                    let entry = per_cam.entry(list[b].tgt_cam).or_insert(0.0);
                    if sim > *entry {
                        *entry = sim;
                    }
                }
                per_cam.values().sum()
            })
            .collect();
        for (m, score) in list.iter_mut().zip(scores) {
            m.score3d = score;
        }
    });
}

/// The best-scoring match of a segment together with its back-projection.
#[derive(Debug, Clone)]
pub(crate) struct Estimate {
    pub seg: SegmentId,
    pub view_idx: usize,
    pub seg_idx: usize,
    pub m: Match,
    pub seg3d: Segment3d<f64>,
    /// Valid supports from at least two distinct target views.
    pub clusterable: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EstimateTable {
    pub entries: Vec<Estimate>,
    pub by_seg: BTreeMap<SegmentId, usize>,
}

/// Top-scoring match of a candidate list, if it clears the estimate
/// threshold. Ties keep the earliest candidate.
pub(crate) fn best_match(list: &[Match]) -> Option<&Match> {
    let mut best: Option<&Match> = None;
    for m in list {
        if best.map_or(true, |b| m.score3d > b.score3d) {
            best = Some(m);
        }
    }
    best.filter(|m| m.score3d > MIN_BEST_SCORE_3D)
}

/// Derive the estimates table from the filtered match lists. Each segment
/// appears at most once, keyed to its argmax-by-score match.
pub(crate) fn collect_estimates(views: &[View], matches: &[Vec<Vec<Match>>]) -> EstimateTable {
    let mut table = EstimateTable::default();
    for (view_idx, view) in views.iter().enumerate() {
        for (seg_idx, list) in matches[view_idx].iter().enumerate() {
            let best = match best_match(list) {
                Some(b) => *b,
                None => continue,
            };
            let distinct: BTreeSet<crate::CamId> = list.iter().map(|m| m.tgt_cam).collect();
            let seg3d = backproject(view, seg_idx, best.depth_p1, best.depth_p2);
            let seg = SegmentId {
                cam: view.cam_id,
                seg: seg_idx,
            };
            table.by_seg.insert(seg, table.entries.len());
            table.entries.push(Estimate {
                seg,
                view_idx,
                seg_idx,
                m: best,
                seg3d,
                clusterable: distinct.len() >= 2,
            });
        }
    }
    table
}
