use serde::{Deserialize, Serialize};

/// Pairwise similarities below this contribute nothing to a match score.
pub(crate) const MIN_SIM_3D: f64 = 0.1;
/// Matches scoring below this are discarded after rescoring.
pub(crate) const MIN_SCORE_3D: f64 = 0.25;
/// Minimum score for a match to become a segment's 3D estimate.
pub(crate) const MIN_BEST_SCORE_3D: f64 = 0.25;
/// Affinity edges below this weight are not emitted.
pub(crate) const MIN_AFFINITY: f64 = 0.25;
/// Detected segments shorter than this fraction of the image diagonal are
/// dropped at registration.
pub(crate) const MIN_LEN_FACTOR: f64 = 0.005;
/// Initial per-component clustering threshold.
pub(crate) const TAU_INIT: f64 = 3.0;
/// Smallest usable pixel-space positional sigma.
pub(crate) const MIN_SIGMA_P_PX: f64 = 0.1;

/// Engine-level settings fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When true, the context list passed to `add_image` holds world-point
    /// ids and visual neighbors are derived from shared observations; when
    /// false the list holds explicit neighbor camera ids.
    pub neighbors_by_worldpoints: bool,
    /// Detector images wider than this are assumed to have been processed at
    /// reduced scale; detector output is rescaled accordingly. Non-positive
    /// disables rescaling.
    pub max_image_width: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            neighbors_by_worldpoints: true,
            max_image_width: -1,
        }
    }
}

/// Parameters of the matching phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Positional uncertainty. Non-negative: pixels, converted per view to a
    /// depth-dependent world sigma. Negative: |sigma_p| is a fixed
    /// world-space sigma used uniformly across views.
    pub sigma_p: f64,
    /// Angular uncertainty in degrees.
    pub sigma_a: f64,
    /// Maximum number of visual neighbors per view.
    pub num_neighbors: usize,
    /// Minimum mutual epipolar overlap for a candidate match.
    pub epipolar_overlap: f64,
    /// Minimum baseline between a view and each of its neighbors.
    pub min_baseline: f64,
    /// Keep only the k best candidates per source segment and view pair;
    /// non-positive keeps all.
    pub knn: i32,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            sigma_p: 2.5,
            sigma_a: 10.0,
            num_neighbors: 10,
            epipolar_overlap: 0.25,
            min_baseline: 0.1,
            knn: 10,
        }
    }
}

impl MatchParams {
    /// Clamp all parameters into their valid ranges.
    pub fn sanitized(&self) -> MatchParams {
        let mut p = *self;
        if p.num_neighbors < 2 {
            p.num_neighbors = 2;
        }
        p.epipolar_overlap = p.epipolar_overlap.clamp(0.0, 0.99);
        p.sigma_a = p.sigma_a.clamp(0.0, 90.0).max(0.1);
        p.min_baseline = p.min_baseline.max(0.0);
        if p.sigma_p >= 0.0 {
            p.sigma_p = p.sigma_p.max(MIN_SIGMA_P_PX);
        }
        p
    }

    /// True when `sigma_p` requests a fixed world-space regularizer.
    #[inline]
    pub fn fixed_sigma_p(&self) -> bool {
        self.sigma_p < 0.0
    }
}

/// Parameters of the reconstruction phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructParams {
    /// Minimum number of distinct cameras per surviving cluster.
    pub visibility_t: usize,
    /// Reweight the affinity graph by diffusion before clustering.
    pub perform_diffusion: bool,
    /// Pixel tolerance for same-view collinearity extension; non-positive
    /// disables it.
    pub collinearity: f64,
}

impl Default for ReconstructParams {
    fn default() -> Self {
        Self {
            visibility_t: 3,
            perform_diffusion: false,
            collinearity: -1.0,
        }
    }
}

impl ReconstructParams {
    pub fn sanitized(&self) -> ReconstructParams {
        let mut p = *self;
        if p.visibility_t < 3 {
            p.visibility_t = 3;
        }
        p
    }
}
