use na::RealField;
use nalgebra as na;

use crate::{PinholeCamera, Segment2d};

/// Ray depths from a plane-based two-way triangulation of a segment pair.
///
/// `d_p1`/`d_p2` are depths of the source endpoints along the source camera
/// rays, `d_q1`/`d_q2` the target endpoints along the target camera rays.
/// Signs are not filtered here; callers reject non-positive depths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoWayDepths<R: RealField + Copy> {
    pub d_p1: R,
    pub d_p2: R,
    pub d_q1: R,
    pub d_q2: R,
}

/// Triangulate a source segment against a target segment by intersecting
/// each endpoint ray with the plane spanned by the other camera's segment.
///
/// The plane through the target center with normal `ray(q1) x ray(q2)`
/// yields the source depths; the symmetric construction yields the target
/// depths. `None` when either plane is degenerate or any ray is parallel to
/// its plane.
pub fn two_way_depths<R: RealField + Copy>(
    src: &PinholeCamera<R>,
    tgt: &PinholeCamera<R>,
    src_seg: &Segment2d<R>,
    tgt_seg: &Segment2d<R>,
) -> Option<TwoWayDepths<R>> {
    let eps: R = na::convert(crate::GEOM_EPS);
    let c_s = src.center();
    let c_t = tgt.center();

    let n_t = tgt
        .ray(&tgt_seg.p1)
        .cross(&tgt.ray(&tgt_seg.p2));
    if n_t.norm() < eps {
        return None;
    }
    let n_t = n_t.normalize();

    let n_s = src
        .ray(&src_seg.p1)
        .cross(&src.ray(&src_seg.p2));
    if n_s.norm() < eps {
        return None;
    }
    let n_s = n_s.normalize();

    let num_st = (c_t - c_s).dot(&n_t);
    let num_ts = (c_s - c_t).dot(&n_s);

    let depth = |num: R, denom: R| {
        if denom.abs() < eps {
            None
        } else {
            Some(num / denom)
        }
    };

    let d_p1 = depth(num_st, src.ray(&src_seg.p1).dot(&n_t))?;
    let d_p2 = depth(num_st, src.ray(&src_seg.p2).dot(&n_t))?;
    let d_q1 = depth(num_ts, tgt.ray(&tgt_seg.p1).dot(&n_s))?;
    let d_q2 = depth(num_ts, tgt.ray(&tgt_seg.p2).dot(&n_s))?;

    Some(TwoWayDepths {
        d_p1,
        d_p2,
        d_q1,
        d_q2,
    })
}
