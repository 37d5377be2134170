use line_mvg::{PinholeCamera, Segment2d};

use crate::config::{MIN_LEN_FACTOR, MIN_SIGMA_P_PX};
use crate::CamId;

/// How a view relates to the rest of the rig: either the ids of the world
/// points it observes, or an explicit list of neighbor cameras.
#[derive(Debug, Clone)]
pub(crate) enum ViewContext {
    /// Sorted, deduplicated world-point ids.
    TiePoints(Vec<u64>),
    Neighbors(Vec<CamId>),
}

/// Per-camera state. Immutable after registration except for the median
/// depth and the spatial regularizer, which the matching phase refreshes.
#[derive(Debug, Clone)]
pub struct View {
    pub(crate) cam_id: CamId,
    pub(crate) camera: PinholeCamera<f64>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) segments: Vec<Segment2d<f64>>,
    pub(crate) context: ViewContext,
    pub(crate) median_depth: f64,
    /// Spatial regularizer: radians-per-unit-depth for pixel-space sigmas,
    /// or a fixed world-space sigma when `fixed_k` is set.
    pub(crate) k: f64,
    pub(crate) fixed_k: bool,
    /// Minimum usable 2D segment length in this view, in pixels.
    pub(crate) min_len_2d: f64,
}

impl View {
    pub(crate) fn new(
        cam_id: CamId,
        camera: PinholeCamera<f64>,
        width: u32,
        height: u32,
        segments: Vec<Segment2d<f64>>,
        context: ViewContext,
        median_depth: f64,
    ) -> Self {
        let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt();
        Self {
            cam_id,
            camera,
            width,
            height,
            segments,
            context,
            median_depth: median_depth.max(f64::EPSILON),
            k: 0.0,
            fixed_k: false,
            min_len_2d: MIN_LEN_FACTOR * diagonal,
        }
    }

    #[inline]
    pub fn cam_id(&self) -> CamId {
        self.cam_id
    }

    #[inline]
    pub fn camera(&self) -> &PinholeCamera<f64> {
        &self.camera
    }

    #[inline]
    pub fn segments(&self) -> &[Segment2d<f64>] {
        &self.segments
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn median_depth(&self) -> f64 {
        self.median_depth
    }

    /// Set the spatial regularizer from the engine-wide sigma_p convention:
    /// negative values are fixed world-space sigmas, non-negative values are
    /// pixel sigmas converted by the focal scale.
    pub(crate) fn set_regularizer(&mut self, sigma_p: f64) {
        if sigma_p < 0.0 {
            self.k = -sigma_p;
            self.fixed_k = true;
        } else {
            self.k = sigma_p.max(MIN_SIGMA_P_PX) / self.camera.focal_scale();
            self.fixed_k = false;
        }
    }

    /// Positional uncertainty at the given depth.
    #[inline]
    pub fn position_sigma(&self, depth: f64) -> f64 {
        if self.fixed_k {
            self.k
        } else {
            self.k * depth.abs()
        }
    }

    /// Replace the median depth with the midpoint element of the sorted
    /// depth multiset. Even-sized inputs take the upper-middle element
    /// without interpolation.
    pub(crate) fn update_median_depth(&mut self, mut depths: Vec<f64>) {
        if depths.is_empty() {
            return;
        }
        depths.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.median_depth = depths[depths.len() / 2];
    }

    #[inline]
    pub fn projected_long_enough(&self, seg: &Segment2d<f64>) -> bool {
        seg.length() >= self.min_len_2d
    }

    /// Per-segment lists of other in-view segments whose supporting lines
    /// lie within `tau` pixels of each other at all four endpoints.
    pub(crate) fn collinear_segments(&self, tau: f64) -> Vec<Vec<usize>> {
        let n = self.segments.len();
        let mut out = vec![Vec::new(); n];
        if tau <= 0.0 {
            return out;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let a = &self.segments[i];
                let b = &self.segments[j];
                let d = a
                    .distance_to_point(&b.p1)
                    .max(a.distance_to_point(&b.p2))
                    .max(b.distance_to_point(&a.p1))
                    .max(b.distance_to_point(&a.p2));
                if d < tau {
                    out[i].push(j);
                    out[j].push(i);
                }
            }
        }
        out
    }
}

/// Convert raw detector output (4-tuples, possibly detected on a downscaled
/// image) into stored segments: rescale and drop everything below the
/// per-view minimum length. Insertion order is preserved.
pub(crate) fn prepare_segments(
    raw: &[[f64; 4]],
    scale: f64,
    min_len: f64,
) -> Vec<Segment2d<f64>> {
    raw.iter()
        .map(|c| Segment2d::from_endpoints([c[0] * scale, c[1] * scale, c[2] * scale, c[3] * scale]))
        .filter(|s| s.length() >= min_len)
        .collect()
}
