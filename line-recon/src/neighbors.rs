use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::config::MatchParams;
use crate::view::{View, ViewContext};
use crate::CamId;

/// Select up to `num_neighbors` visual neighbors per view.
///
/// Views with an explicit neighbor list keep the currently-registered subset
/// of that list. Views with tie points are scored against every other
/// tie-point view by shared world-point support; candidates whose optical
/// axis diverges by ninety degrees or more are discarded, and the rest are
/// admitted greedily in score order subject to the baseline criterion.
pub(crate) fn select_neighbors(
    views: &[View],
    by_cam: &BTreeMap<CamId, usize>,
    params: &MatchParams,
) -> Vec<Vec<usize>> {
    let out: Vec<Vec<usize>> = (0..views.len())
        .into_par_iter()
        .map(|v| neighbors_for(v, views, by_cam, params))
        .collect();
    for (v, neighbors) in out.iter().enumerate() {
        debug!(
            "view {} has {} visual neighbor(s)",
            views[v].cam_id,
            neighbors.len()
        );
    }
    out
}

fn neighbors_for(
    v: usize,
    views: &[View],
    by_cam: &BTreeMap<CamId, usize>,
    params: &MatchParams,
) -> Vec<usize> {
    let view = &views[v];
    let wps = match &view.context {
        ViewContext::Neighbors(list) => {
            return list
                .iter()
                .filter_map(|cam_id| by_cam.get(cam_id).copied())
                .filter(|&u| u != v)
                .collect();
        }
        ViewContext::TiePoints(wps) => wps,
    };

    let mut scored: Vec<(f64, usize)> = Vec::new();
    for (u, other) in views.iter().enumerate() {
        if u == v {
            continue;
        }
        let wps_u = match &other.context {
            ViewContext::TiePoints(wps_u) => wps_u,
            ViewContext::Neighbors(_) => continue,
        };
        let common = sorted_intersection_count(wps, wps_u);
        if common == 0 {
            continue;
        }
        if view.camera.axis_angle_to(&other.camera) >= std::f64::consts::FRAC_PI_2 {
            continue;
        }
        let score = 2.0 * common as f64 / (wps.len() + wps_u.len()) as f64;
        scored.push((score, u));
    }

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut chosen: Vec<usize> = Vec::new();
    for (_, u) in scored {
        if chosen.len() >= params.num_neighbors {
            break;
        }
        let far_enough = view.camera.baseline_to(&views[u].camera) > params.min_baseline
            && chosen
                .iter()
                .all(|&w| views[u].camera.baseline_to(&views[w].camera) > params.min_baseline);
        if far_enough {
            chosen.push(u);
        }
    }
    chosen
}

fn sorted_intersection_count(a: &[u64], b: &[u64]) -> usize {
    let mut count = 0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}
