use na::{Matrix3, Point2, RealField, Vector3};
use nalgebra as na;

/// Epipolar line in the target image for pixel `px` of the source image.
#[inline]
pub fn epipolar_line<R: RealField + Copy>(f: &Matrix3<R>, px: &Point2<R>) -> Vector3<R> {
    f * px.to_homogeneous()
}

/// Intersection of two homogeneous 2D lines; `None` when the intersection
/// is at infinity.
pub fn intersect_lines<R: RealField + Copy>(l1: &Vector3<R>, l2: &Vector3<R>) -> Option<Point2<R>> {
    let eps: R = na::convert(crate::GEOM_EPS);
    let x = l1.cross(l2);
    if x[2].abs() < eps {
        return None;
    }
    Some(Point2::new(x[0] / x[2], x[1] / x[2]))
}

/// Mutual overlap score of two collinear point pairs `(p1,p2)` and `(q1,q2)`.
///
/// When one pair's endpoints fall within the other pair's span along the
/// shared line, the score is the inner-pair distance divided by the
/// outer-pair distance, i.e. the common span normalized by the union span.
/// Pairs shorter than one pixel score zero.
pub fn mutual_overlap<R: RealField + Copy>(
    p1: &Point2<R>,
    p2: &Point2<R>,
    q1: &Point2<R>,
    q2: &Point2<R>,
) -> R {
    let zero: R = na::convert(0.0);
    let one: R = na::convert(1.0);
    let eps: R = na::convert(crate::GEOM_EPS);

    if na::distance(p1, p2) < one || na::distance(q1, q2) < one {
        return zero;
    }

    let within = |a: &Point2<R>, b: &Point2<R>, x: &Point2<R>| (a - x).dot(&(b - x)) < eps;
    let touching = within(p1, p2, q1)
        || within(p1, p2, q2)
        || within(q1, q2, p1)
        || within(q1, q2, p2);
    if !touching {
        return zero;
    }

    // order the four points along the shared line
    let dir = (p2 - p1).normalize();
    let mut ts = [
        zero,
        (p2 - p1).dot(&dir),
        (q1 - p1).dot(&dir),
        (q2 - p1).dot(&dir),
    ];
    ts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let outer = ts[3] - ts[0];
    if outer < eps {
        return zero;
    }
    (ts[2] - ts[1]) / outer
}
