use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::debug;

use crate::config::MIN_AFFINITY;
use crate::matching::Match;
use crate::scoring::{backproject, segment_similarity_3d, EstimateTable};
use crate::view::View;
use crate::{CamId, SegmentId};

/// One directed affinity edge between two local segment ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AffinityEdge {
    pub i: u32,
    pub j: u32,
    pub w: f64,
}

/// Sparse symmetric affinity over 2D segments, with dense local ids
/// allocated on first sight.
#[derive(Debug, Default)]
pub(crate) struct AffinityGraph {
    pub edges: Vec<AffinityEdge>,
    /// local id -> segment
    pub ids: Vec<SegmentId>,
    pub by_seg: BTreeMap<SegmentId, u32>,
}

impl AffinityGraph {
    fn id_of(&mut self, seg: SegmentId) -> u32 {
        if let Some(&id) = self.by_seg.get(&seg) {
            return id;
        }
        let id = self.ids.len() as u32;
        self.ids.push(seg);
        self.by_seg.insert(seg, id);
        id
    }

    fn push_symmetric(&mut self, a: SegmentId, b: SegmentId, w: f64) {
        let ia = self.id_of(a);
        let ib = self.id_of(b);
        self.edges.push(AffinityEdge { i: ia, j: ib, w });
        self.edges.push(AffinityEdge { i: ib, j: ia, w });
    }
}

/// Build the affinity graph over all clusterable estimates.
///
/// For every estimate the candidates of its source segment propose edges to
/// their target segments, weighted by the similarity of the estimate's 3D
/// segment and the candidate's back-projection. With a positive collinearity
/// tolerance, edges additionally extend to in-view collinear neighbors on
/// both sides, provided those hold 3D estimates themselves.
///
/// Candidate edges are computed in parallel with per-worker buffers; the
/// merge walks the estimates in table order under a symmetric used-set, so
/// the resulting edge list and id assignment are deterministic.
pub(crate) fn build_affinity(
    views: &[View],
    matches: &[Vec<Vec<Match>>],
    estimates: &EstimateTable,
    collinear: Option<&[Vec<Vec<usize>>]>,
    by_cam: &BTreeMap<CamId, usize>,
    sigma_a: f64,
) -> AffinityGraph {
    let partials: Vec<Vec<(SegmentId, SegmentId, f64)>> = estimates
        .entries
        .par_iter()
        .map(|e| {
            if !e.clusterable {
                return Vec::new();
            }
            let mut out = Vec::new();
            let src_view = &views[e.view_idx];
            let sigma_pos = src_view.position_sigma(0.5 * (e.m.depth_p1 + e.m.depth_p2));

            for m in &matches[e.view_idx][e.seg_idx] {
                let tgt = SegmentId {
                    cam: m.tgt_cam,
                    seg: m.tgt_seg,
                };
                let hypothesis = backproject(src_view, e.seg_idx, m.depth_p1, m.depth_p2);
                let w = segment_similarity_3d(&e.seg3d, &hypothesis, sigma_pos, sigma_a);
                if w > MIN_AFFINITY {
                    out.push((e.seg, tgt, w));
                }
                if let Some(collinear) = collinear {
                    let tgt_idx = by_cam[&m.tgt_cam];
                    for &c in &collinear[tgt_idx][m.tgt_seg] {
                        let cid = SegmentId {
                            cam: m.tgt_cam,
                            seg: c,
                        };
                        if let Some(&ei) = estimates.by_seg.get(&cid) {
                            let other = &estimates.entries[ei].seg3d;
                            let w = segment_similarity_3d(&e.seg3d, other, sigma_pos, sigma_a);
                            if w > MIN_AFFINITY {
                                out.push((e.seg, cid, w));
                            }
                        }
                    }
                }
            }

            // collinear extension in the estimate's own view, once per source
            if let Some(collinear) = collinear {
                for &c in &collinear[e.view_idx][e.seg_idx] {
                    let cid = SegmentId {
                        cam: e.seg.cam,
                        seg: c,
                    };
                    if let Some(&ei) = estimates.by_seg.get(&cid) {
                        let other = &estimates.entries[ei].seg3d;
                        let w = segment_similarity_3d(&e.seg3d, other, sigma_pos, sigma_a);
                        if w > MIN_AFFINITY {
                            out.push((e.seg, cid, w));
                        }
                    }
                }
            }
            out
        })
        .collect();

    let mut graph = AffinityGraph::default();
    let mut used: BTreeSet<(SegmentId, SegmentId)> = BTreeSet::new();
    for partial in partials {
        for (a, b, w) in partial {
            if a == b {
                continue;
            }
            let key = if a <= b { (a, b) } else { (b, a) };
            if !used.insert(key) {
                continue;
            }
            graph.push_symmetric(a, b, w);
        }
    }
    debug!(
        "affinity graph: {} vertices, {} directed edges",
        graph.ids.len(),
        graph.edges.len()
    );
    graph
}

/// Diffuse edge weights through shared neighborhoods.
///
/// Weights are replaced by the symmetric blend of the row-stochastic
/// transition probabilities plus the overlap of the two endpoints'
/// neighborhoods. The vertex support is unchanged; edges whose diffused
/// weight vanishes are removed.
pub(crate) fn diffuse(graph: &mut AffinityGraph) {
    let n = graph.ids.len();
    if n == 0 {
        return;
    }

    // sorted adjacency rows of transition probabilities
    let mut rows: Vec<Vec<(u32, f64)>> = vec![Vec::new(); n];
    for e in &graph.edges {
        rows[e.i as usize].push((e.j, e.w));
    }
    for row in &mut rows {
        row.sort_by_key(|(j, _)| *j);
        let sum: f64 = row.iter().map(|(_, w)| w).sum();
        if sum > 0.0 {
            for (_, w) in row.iter_mut() {
                *w /= sum;
            }
        }
    }

    let p_of = |i: u32, j: u32| -> f64 {
        let row = &rows[i as usize];
        match row.binary_search_by_key(&j, |(k, _)| *k) {
            Ok(pos) => row[pos].1,
            Err(_) => 0.0,
        }
    };

    let new_weights: Vec<f64> = graph
        .edges
        .par_iter()
        .map(|e| {
            let direct = 0.5 * (p_of(e.i, e.j) + p_of(e.j, e.i));
            let mut shared = 0.0;
            for &(k, pik) in &rows[e.i as usize] {
                if k == e.i || k == e.j {
                    continue;
                }
                let pjk = p_of(e.j, k);
                if pjk > 0.0 {
                    shared += pik.min(pjk);
                }
            }
            direct + shared
        })
        .collect();

    for (e, w) in graph.edges.iter_mut().zip(new_weights) {
        e.w = w;
    }
    graph.edges.retain(|e| e.w > 0.0);
}
