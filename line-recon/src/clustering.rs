use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Point3;
use ordered_float::OrderedFloat;

use line_mvg::{fit_line_svd, project_ray_onto_line, Segment2d, Segment3d};

use crate::affinity::{AffinityEdge, AffinityGraph};
use crate::config::TAU_INIT;
use crate::scoring::EstimateTable;
use crate::view::View;
use crate::{CamId, SegmentId};

/// A clustered set of 2D segments with its fitted 3D segment.
#[derive(Debug, Clone, PartialEq)]
pub struct LineCluster3d {
    /// The fitted line, spanned by the reference segment's ray projections.
    pub seg3d: Segment3d<f64>,
    /// The member providing the longest 3D hypothesis.
    pub reference: SegmentId,
    pub members: Vec<SegmentId>,
}

/// A final reconstructed line: a cluster plus its collinear 3D intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalLine3d {
    pub cluster: LineCluster3d,
    pub intervals: Vec<Segment3d<f64>>,
}

// union-find ------------------------------------------------------------

struct UnionFind {
    parent: Vec<u32>,
    size: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] as usize != x {
            // path halving
            self.parent[x] = self.parent[self.parent[x] as usize];
            x = self.parent[x] as usize;
        }
        x
    }

    fn size(&self, root: usize) -> u32 {
        self.size[root]
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (big, small) = if self.size[a] >= self.size[b] {
            (a, b)
        } else {
            (b, a)
        };
        self.parent[small] = big as u32;
        self.size[big] += self.size[small];
        big
    }
}

/// Cluster the affinity graph with a relaxing per-component threshold.
///
/// Edges are visited strongest-first. Each component tracks the weight of
/// its weakest accepted internal edge, starting at [`TAU_INIT`]; an edge
/// merges two components when its weight reaches both components' internal
/// weight minus the size-dependent slack `TAU_INIT / |component|`. Small
/// components are therefore forgiving and the bar tightens as they grow.
pub(crate) fn cluster_graph(edges: &[AffinityEdge], n: usize) -> Vec<Vec<u32>> {
    if n == 0 {
        return Vec::new();
    }
    let mut sorted: Vec<&AffinityEdge> = edges.iter().filter(|e| e.i < e.j && e.w > 0.0).collect();
    sorted.sort_by_key(|e| (std::cmp::Reverse(OrderedFloat(e.w)), e.i, e.j));

    let mut uf = UnionFind::new(n);
    let mut internal = vec![TAU_INIT; n];
    for e in sorted {
        let a = uf.find(e.i as usize);
        let b = uf.find(e.j as usize);
        if a == b {
            continue;
        }
        let bar_a = internal[a] - TAU_INIT / uf.size(a) as f64;
        let bar_b = internal[b] - TAU_INIT / uf.size(b) as f64;
        if e.w >= bar_a && e.w >= bar_b {
            let root = uf.union(a, b);
            internal[root] = e.w;
        }
    }

    let mut clusters: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    for i in 0..n {
        clusters.entry(uf.find(i)).or_default().push(i as u32);
    }
    clusters.into_values().collect()
}

// cluster fitting -------------------------------------------------------

/// Fit one cluster: visibility filter, SVD line fit over the members' 3D
/// estimates, reference-ray projection and collinear-interval extraction.
/// `None` when any stage rejects the cluster or no interval survives.
pub(crate) fn fit_cluster(
    member_ids: &[u32],
    graph: &AffinityGraph,
    estimates: &EstimateTable,
    views: &[View],
    by_cam: &BTreeMap<CamId, usize>,
    visibility_t: usize,
) -> Option<FinalLine3d> {
    let members: Vec<SegmentId> = member_ids
        .iter()
        .map(|&l| graph.ids[l as usize])
        .collect();

    let cams: BTreeSet<CamId> = members.iter().map(|m| m.cam).collect();
    if cams.len() < visibility_t {
        return None;
    }

    // stack the endpoints of every member's current 3D estimate
    let mut points: Vec<Point3<f64>> = Vec::new();
    let mut reference: Option<(f64, SegmentId)> = None;
    for m in &members {
        let ei = match estimates.by_seg.get(m) {
            Some(&ei) => ei,
            None => continue,
        };
        let est = &estimates.entries[ei];
        points.push(est.seg3d.p1);
        points.push(est.seg3d.p2);
        let len = est.seg3d.length();
        if reference.map_or(true, |(best, _)| len > best) {
            reference = Some((len, *m));
        }
    }
    let (_, reference) = reference?;
    let (anchor, dir) = fit_line_svd(&points)?;

    // project the reference segment's endpoint rays onto the fitted line
    let ref_view = &views[by_cam[&reference.cam]];
    let ref_seg = &ref_view.segments[reference.seg];
    let center = ref_view.camera.center();
    let s1 = project_ray_onto_line(&anchor, &dir, center, &ref_view.camera.ray(&ref_seg.p1))?;
    let s2 = project_ray_onto_line(&anchor, &dir, center, &ref_view.camera.ray(&ref_seg.p2))?;
    let seg3d = Segment3d::new(
        anchor + dir.into_inner() * s1,
        anchor + dir.into_inner() * s2,
    );

    let intervals = collinear_intervals(&members, &anchor, &dir, views, by_cam)
        .into_iter()
        .filter(|interval| {
            match (
                ref_view.camera.project(&interval.p1),
                ref_view.camera.project(&interval.p2),
            ) {
                (Some(a), Some(b)) => ref_view.projected_long_enough(&Segment2d::new(a, b)),
                _ => false,
            }
        })
        .collect::<Vec<_>>();
    if intervals.is_empty() {
        return None;
    }

    Some(FinalLine3d {
        cluster: LineCluster3d {
            seg3d,
            reference,
            members,
        },
        intervals,
    })
}

struct EndpointEvent {
    pos: Point3<f64>,
    member: usize,
    cam: CamId,
    border_dist: f64,
}

/// Sweep the members' projected endpoints along the fitted line and emit the
/// spans supported by at least three distinct cameras.
fn collinear_intervals(
    members: &[SegmentId],
    anchor: &Point3<f64>,
    dir: &nalgebra::Unit<nalgebra::Vector3<f64>>,
    views: &[View],
    by_cam: &BTreeMap<CamId, usize>,
) -> Vec<Segment3d<f64>> {
    let mut events: Vec<EndpointEvent> = Vec::new();
    for (member, m) in members.iter().enumerate() {
        let view = &views[by_cam[&m.cam]];
        let seg = &view.segments[m.seg];
        let center = view.camera.center();
        let t1 = match project_ray_onto_line(anchor, dir, center, &view.camera.ray(&seg.p1)) {
            Some(t) => t,
            None => continue,
        };
        let t2 = match project_ray_onto_line(anchor, dir, center, &view.camera.ray(&seg.p2)) {
            Some(t) => t,
            None => continue,
        };
        for t in [t1, t2] {
            events.push(EndpointEvent {
                pos: anchor + dir.into_inner() * t,
                member,
                cam: m.cam,
                border_dist: 0.0,
            });
        }
    }
    if events.len() < 6 {
        return Vec::new();
    }

    // the border is the endpoint farthest from the endpoint centroid; sweep
    // order is ascending distance from it
    let mut centroid = nalgebra::Vector3::zeros();
    for ev in &events {
        centroid += ev.pos.coords;
    }
    let centroid = Point3::from(centroid / events.len() as f64);
    let border = events
        .iter()
        .map(|ev| ev.pos)
        .max_by_key(|p| OrderedFloat(nalgebra::distance(p, &centroid)))
        .expect("events is non-empty");
    for ev in &mut events {
        ev.border_dist = nalgebra::distance(&ev.pos, &border);
    }
    events.sort_by(|a, b| {
        a.border_dist
            .partial_cmp(&b.border_dist)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut open = vec![false; members.len()];
    let mut cam_open: BTreeMap<CamId, usize> = BTreeMap::new();
    let mut distinct_open = 0usize;
    let mut start: Option<Point3<f64>> = None;
    let mut intervals = Vec::new();

    for ev in &events {
        if !open[ev.member] {
            open[ev.member] = true;
            let count = cam_open.entry(ev.cam).or_insert(0);
            *count += 1;
            if *count == 1 {
                distinct_open += 1;
            }
            if distinct_open >= 3 && start.is_none() {
                start = Some(ev.pos);
            }
        } else {
            open[ev.member] = false;
            let count = cam_open.get_mut(&ev.cam).expect("camera was opened");
            *count -= 1;
            if *count == 0 {
                distinct_open -= 1;
            }
            if distinct_open < 3 {
                if let Some(s0) = start.take() {
                    intervals.push(Segment3d::new(s0, ev.pos));
                }
            }
        }
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(i: u32, j: u32, w: f64) -> AffinityEdge {
        AffinityEdge { i, j, w }
    }

    #[test]
    fn test_union_find_basics() {
        let mut uf = UnionFind::new(4);
        assert_ne!(uf.find(0), uf.find(1));
        let root = uf.union(0, 1);
        assert_eq!(uf.size(root), 2);
        assert_eq!(uf.find(0), uf.find(1));
    }

    #[test]
    fn test_strong_edges_merge() {
        let edges = vec![
            edge(0, 1, 0.9),
            edge(1, 0, 0.9),
            edge(1, 2, 0.8),
            edge(2, 1, 0.8),
        ];
        let clusters = cluster_graph(&edges, 4);
        // {0,1,2} merged, 3 isolated
        assert_eq!(clusters.len(), 2);
        let sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        assert!(sizes.contains(&3) && sizes.contains(&1));
    }

    #[test]
    fn test_zero_weight_edges_do_not_merge() {
        let edges = vec![edge(0, 1, 0.0), edge(1, 0, 0.0)];
        let clusters = cluster_graph(&edges, 2);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let edges = vec![
            edge(0, 1, 0.5),
            edge(1, 0, 0.5),
            edge(2, 3, 0.5),
            edge(3, 2, 0.5),
            edge(1, 2, 0.5),
            edge(2, 1, 0.5),
        ];
        let a = cluster_graph(&edges, 4);
        let b = cluster_graph(&edges, 4);
        assert_eq!(a, b);
    }
}
