use std::collections::BTreeSet;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use line_mvg::{PinholeCamera, Segment2d};

use crate::clustering::{cluster_graph, fit_cluster, FinalLine3d, LineCluster3d};
use crate::config::{EngineConfig, MatchParams, ReconstructParams, MIN_SCORE_3D};
use crate::matching::{Backend, CpuBackend, FundamentalCache, Match};
use crate::registry::ViewRegistry;
use crate::scoring::{best_match, collect_estimates};
use crate::view::{prepare_segments, View, ViewContext};
use crate::{affinity, neighbors, CamId, Error, Result};

/// External provider of 2D segments (a line-segment detector or a segment
/// cache). Output is raw endpoint 4-tuples `(x1, y1, x2, y2)` in the
/// coordinates the detector ran at.
pub trait SegmentSource: Send + Sync {
    fn segments(&self, cam_id: CamId, width: u32, height: u32) -> Result<Vec<[f64; 4]>>;
}

/// Read-only view data handed to a refinement backend.
pub struct ViewSnapshot<'a> {
    pub cam_id: CamId,
    pub camera: &'a PinholeCamera<f64>,
    pub segments: &'a [Segment2d<f64>],
}

/// Optional post-clustering refinement backend.
///
/// Implementations may move cluster endpoints to reduce per-view
/// reprojection residuals but must not change cluster membership.
pub trait LineRefiner {
    fn refine(&self, clusters: &mut [LineCluster3d], views: &[ViewSnapshot<'_>]);
}

/// The multi-view 3D line reconstruction engine.
///
/// All mutable pipeline state (views, matches, final lines) is owned here;
/// there is no process-wide state. `add_image` may be called concurrently;
/// the matching and reconstruction phases take exclusive access.
pub struct LineEngine {
    config: EngineConfig,
    backend: Box<dyn Backend>,
    segment_source: Option<Box<dyn SegmentSource>>,
    registry: ViewRegistry,
    fundamentals: FundamentalCache,
    /// Candidate matches per view, per source segment.
    matches: Vec<Vec<Vec<Match>>>,
    processed: Vec<bool>,
    raw_candidates: usize,
    lines: Vec<FinalLine3d>,
    match_params: Option<MatchParams>,
    recon_params: Option<ReconstructParams>,
    refined: bool,
}

impl LineEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            backend: Box::new(CpuBackend),
            segment_source: None,
            registry: ViewRegistry::new(),
            fundamentals: FundamentalCache::new(),
            matches: Vec::new(),
            processed: Vec::new(),
            raw_candidates: 0,
            lines: Vec::new(),
            match_params: None,
            recon_params: None,
            refined: false,
        }
    }

    pub fn with_segment_source(mut self, source: Box<dyn SegmentSource>) -> Self {
        self.segment_source = Some(source);
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn num_views(&self) -> usize {
        self.registry.len()
    }

    /// Total pairwise candidates found by the last matching phase, before
    /// score filtering.
    #[inline]
    pub fn num_raw_candidates(&self) -> usize {
        self.raw_candidates
    }

    /// The per-source-segment candidate lists of a view, as left by the last
    /// phase that touched them.
    pub fn candidate_matches(&self, cam_id: CamId) -> Option<Vec<Vec<Match>>> {
        let inner = self.registry.read();
        let &idx = inner.by_cam.get(&cam_id)?;
        self.matches.get(idx).cloned()
    }

    #[inline]
    pub fn get_lines(&self) -> &[FinalLine3d] {
        &self.lines
    }

    /// Register a calibrated image. `context` is interpreted per the
    /// engine-level `neighbors_by_worldpoints` flag: world-point ids, or
    /// explicit neighbor camera ids. Segments are either supplied in pixel
    /// coordinates or pulled from the configured segment source.
    ///
    /// Rejections (duplicate id, empty context, missing segment source) are
    /// logged and leave the engine unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn add_image(
        &self,
        cam_id: CamId,
        width: u32,
        height: u32,
        k: Matrix3<f64>,
        r: Matrix3<f64>,
        t: Vector3<f64>,
        median_depth: f64,
        context: &[u64],
        segments: Option<Vec<[f64; 4]>>,
    ) -> Result<()> {
        if context.is_empty() {
            warn!("camera {cam_id}: rejecting view with empty tie-point / neighbor list");
            return Err(Error::EmptyContext(cam_id));
        }
        let camera = PinholeCamera::new(k, r, t)?;

        self.registry.reserve(cam_id).map_err(|e| {
            warn!("camera {cam_id}: duplicate registration ignored");
            e
        })?;

        let raw = match segments {
            Some(raw) => raw,
            None => match &self.segment_source {
                Some(source) => match source.segments(cam_id, width, height) {
                    Ok(raw) => raw,
                    Err(e) => {
                        self.registry.cancel(cam_id);
                        warn!("camera {cam_id}: segment source failed: {e}");
                        return Err(e);
                    }
                },
                None => {
                    self.registry.cancel(cam_id);
                    warn!("camera {cam_id}: no segments and no segment source");
                    return Err(Error::NoSegmentSource(cam_id));
                }
            },
        };

        let long_side = width.max(height) as f64;
        let scale = if self.config.max_image_width > 0
            && long_side > self.config.max_image_width as f64
        {
            long_side / self.config.max_image_width as f64
        } else {
            1.0
        };
        let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt();
        let segments = prepare_segments(&raw, scale, crate::config::MIN_LEN_FACTOR * diagonal);

        let context = if self.config.neighbors_by_worldpoints {
            let mut wps: Vec<u64> = context.to_vec();
            wps.sort_unstable();
            wps.dedup();
            ViewContext::TiePoints(wps)
        } else {
            ViewContext::Neighbors(context.iter().map(|&c| CamId(c as u32)).collect())
        };

        let view = View::new(cam_id, camera, width, height, segments, context, median_depth);
        debug!(
            "camera {cam_id}: registered with {} segment(s)",
            view.segments.len()
        );
        self.registry.publish(view);
        Ok(())
    }

    /// Run neighbor selection, pairwise epipolar matching and 3D-consistency
    /// scoring. Any previous matches are discarded.
    pub fn match_images(&mut self, params: &MatchParams) -> Result<()> {
        let params = params.sanitized();
        self.match_params = Some(params);
        self.raw_candidates = 0;
        self.lines.clear();
        self.matches.clear();

        let mut inner = self.registry.write();
        let n = inner.views.len();
        self.processed = vec![false; n];
        if n < 2 {
            warn!("matching needs at least two views, have {n}");
            return Ok(());
        }

        inner
            .views
            .par_iter_mut()
            .for_each(|view| view.set_regularizer(params.sigma_p));

        let neighbors = neighbors::select_neighbors(&inner.views, &inner.by_cam, &params);

        self.matches = inner
            .views
            .iter()
            .map(|view| vec![Vec::new(); view.segments.len()])
            .collect();

        // pairwise matching, deduplicated over unordered pairs
        let mut paired: BTreeSet<(usize, usize)> = BTreeSet::new();
        for a in 0..n {
            for &b in &neighbors[a] {
                if b == a || !paired.insert((a.min(b), a.max(b))) {
                    continue;
                }
                let f = self.fundamentals.get(a, b, &inner.views);
                let per_seg = self
                    .backend
                    .match_pair(&inner.views[a], &inner.views[b], &f, &params);
                for (seg_idx, list) in per_seg.into_iter().enumerate() {
                    self.raw_candidates += list.len();
                    self.matches[a][seg_idx].extend(list);
                }
            }
        }
        info!(
            "pairwise matching: {} candidate(s) over {} view(s)",
            self.raw_candidates, n
        );

        // score views in registration order; each view's matches are final
        // once it is processed
        for s in 0..n {
            self.backend
                .score_view(&inner.views[s], &mut self.matches[s], &params);
            for list in &mut self.matches[s] {
                list.retain(|m| m.score3d > MIN_SCORE_3D);
            }

            // materialize the inverse matches in still-unprocessed targets
            let mut mirrored: Vec<(usize, usize, Match)> = Vec::new();
            for list in &self.matches[s] {
                for m in list {
                    let t = inner.by_cam[&m.tgt_cam];
                    if !self.processed[t] {
                        mirrored.push((t, m.tgt_seg, m.mirrored()));
                    }
                }
            }
            for (t, seg_idx, m) in mirrored {
                self.matches[t][seg_idx].push(m);
            }

            // refresh the view's median depth from its best hypotheses
            let mut depths = Vec::new();
            for list in &self.matches[s] {
                if let Some(best) = best_match(list) {
                    depths.push(best.depth_p1);
                    depths.push(best.depth_p2);
                }
            }
            inner.views[s].update_median_depth(depths);
            self.processed[s] = true;
        }

        let kept: usize = self.matches.iter().flatten().map(Vec::len).sum();
        info!("scoring kept {kept} match(es)");
        Ok(())
    }

    /// Build the affinity graph over the scored matches, cluster it, fit 3D
    /// lines and extract collinear support intervals. Previous results are
    /// discarded; an empty outcome is not an error.
    pub fn reconstruct(
        &mut self,
        params: &ReconstructParams,
        refiner: Option<&dyn LineRefiner>,
    ) -> Result<()> {
        let params = params.sanitized();
        self.recon_params = Some(params);
        self.refined = false;
        self.lines.clear();

        let inner = self.registry.read();
        if self.matches.is_empty() {
            warn!("reconstruct called without matches; no lines produced");
            return Ok(());
        }

        let estimates = collect_estimates(&inner.views, &self.matches);
        if estimates.entries.is_empty() {
            warn!("no 3D estimates survived scoring; no lines produced");
            return Ok(());
        }
        debug!("{} segment estimate(s)", estimates.entries.len());

        let collinear: Option<Vec<Vec<Vec<usize>>>> = if params.collinearity > 0.0 {
            Some(
                inner
                    .views
                    .par_iter()
                    .map(|view| view.collinear_segments(params.collinearity))
                    .collect(),
            )
        } else {
            None
        };

        let sigma_a = self
            .match_params
            .map(|p| p.sigma_a)
            .unwrap_or_else(|| MatchParams::default().sigma_a);
        let mut graph = affinity::build_affinity(
            &inner.views,
            &self.matches,
            &estimates,
            collinear.as_deref(),
            &inner.by_cam,
            sigma_a,
        );
        if params.perform_diffusion {
            affinity::diffuse(&mut graph);
        }

        let clusters = cluster_graph(&graph.edges, graph.ids.len());
        self.lines = clusters
            .par_iter()
            .filter_map(|members| {
                fit_cluster(
                    members,
                    &graph,
                    &estimates,
                    &inner.views,
                    &inner.by_cam,
                    params.visibility_t,
                )
            })
            .collect();

        if let Some(refiner) = refiner {
            let snapshots: Vec<ViewSnapshot<'_>> = inner
                .views
                .iter()
                .map(|view| ViewSnapshot {
                    cam_id: view.cam_id,
                    camera: &view.camera,
                    segments: &view.segments,
                })
                .collect();
            let mut clusters: Vec<LineCluster3d> =
                self.lines.iter().map(|l| l.cluster.clone()).collect();
            refiner.refine(&mut clusters, &snapshots);
            for (line, cluster) in self.lines.iter_mut().zip(clusters) {
                debug_assert_eq!(line.cluster.members, cluster.members);
                line.cluster.seg3d = cluster.seg3d;
            }
            self.refined = true;
        }

        if self.lines.is_empty() {
            warn!("reconstruction produced no 3D lines");
        } else {
            info!("reconstructed {} 3D line(s)", self.lines.len());
        }
        Ok(())
    }

    /// File-name stem encoding the engine configuration and the parameters
    /// of the last matching / reconstruction runs.
    pub fn output_stem(&self) -> String {
        let m = self.match_params.unwrap_or_default();
        let r = self.recon_params.unwrap_or_default();
        let mut stem = format!(
            "Line3D++__W_{}__N_{}__sigmaP_{}__sigmaA_{}__epiOverlap_{}__minBaseline_{}",
            self.config.max_image_width,
            m.num_neighbors,
            m.sigma_p,
            m.sigma_a,
            m.epipolar_overlap,
            m.min_baseline
        );
        if m.knn > 0 {
            stem.push_str(&format!("__kNN_{}", m.knn));
        }
        if r.collinearity > 0.0 {
            stem.push_str(&format!("__COLLIN_{}", r.collinearity));
        }
        if m.fixed_sigma_p() {
            stem.push_str("__FXD_SIGMA_P");
        }
        if r.perform_diffusion {
            stem.push_str("__DIFFUSION");
        }
        if self.refined {
            stem.push_str("__OPTIMIZED");
        }
        stem.push_str(&format!("__vis_{}", r.visibility_t));
        stem
    }

    /// Write the reconstructed segments as ASCII STL.
    pub fn save_stl<W: std::io::Write>(&self, out: W) -> Result<()> {
        crate::output::write_stl(out, &self.lines)?;
        Ok(())
    }

    /// Write the reconstructed segments as a Wavefront OBJ line set.
    pub fn save_obj<W: std::io::Write>(&self, out: W) -> Result<()> {
        crate::output::write_obj(out, &self.lines)?;
        Ok(())
    }

    /// Write lines, intervals and 2D residuals in the plain-text format.
    pub fn save_txt<W: std::io::Write>(&self, out: W) -> Result<()> {
        let inner = self.registry.read();
        crate::output::write_txt(out, &self.lines, |seg| {
            inner
                .by_cam
                .get(&seg.cam)
                .and_then(|&idx| inner.views[idx].segments.get(seg.seg))
                .copied()
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for LineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineEngine")
            .field("views", &self.num_views())
            .field("raw_candidates", &self.raw_candidates)
            .field("lines", &self.lines.len())
            .finish_non_exhaustive()
    }
}
