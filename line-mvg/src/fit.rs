use na::{Matrix3, Point3, RealField, Unit, Vector3};
use nalgebra as na;

/// Fit an infinite 3D line to a point scatter.
///
/// The anchor is the centroid; the direction is the eigenvector of the
/// centered scatter matrix with the largest eigenvalue. `None` for fewer
/// than two points or a degenerate (all-coincident) scatter.
pub fn fit_line_svd<R: RealField + Copy>(
    points: &[Point3<R>],
) -> Option<(Point3<R>, Unit<Vector3<R>>)> {
    if points.len() < 2 {
        return None;
    }
    let eps: R = na::convert(crate::GEOM_EPS);
    let n: R = na::convert(points.len() as f64);

    let mut centroid = Vector3::zeros();
    for p in points {
        centroid += p.coords;
    }
    let centroid = Point3::from(centroid / n);

    let mut scatter = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        scatter += d * d.transpose();
    }

    let eig = na::linalg::SymmetricEigen::new(scatter);
    let mut imax = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] > eig.eigenvalues[imax] {
            imax = i;
        }
    }
    if eig.eigenvalues[imax] < eps {
        return None;
    }
    let dir = Unit::new_normalize(eig.eigenvectors.column(imax).into_owned());
    Some((centroid, dir))
}

/// Parameter `s` on the line `anchor + s * dir` of the point closest to the
/// ray `cam_center + t * ray`.
///
/// `None` when the ray is (numerically) parallel to the line.
pub fn project_ray_onto_line<R: RealField + Copy>(
    anchor: &Point3<R>,
    dir: &Unit<Vector3<R>>,
    cam_center: &Point3<R>,
    ray: &Unit<Vector3<R>>,
) -> Option<R> {
    let eps: R = na::convert(crate::GEOM_EPS);
    let u = dir.into_inner();
    let v = ray.into_inner();
    let w = anchor - cam_center;

    let a = u.dot(&u);
    let b = u.dot(&v);
    let c = v.dot(&v);
    let d = u.dot(&w);
    let e = v.dot(&w);

    let denom = a * c - b * b;
    if denom.abs() <= eps {
        return None;
    }
    Some((b * e - c * d) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_line_recovers_direction() {
        let dir = Vector3::new(1.0, 2.0, -0.5).normalize();
        let anchor = Point3::new(0.3, -0.2, 1.0);
        let points: Vec<Point3<f64>> = (-5..=5)
            .map(|i| anchor + dir * (i as f64) * 0.25)
            .collect();
        let (c, d) = fit_line_svd(&points).unwrap();
        assert_relative_eq!(c.coords, anchor.coords, epsilon = 1e-9);
        // direction sign is arbitrary
        assert_relative_eq!(d.dot(&dir).abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_line_degenerate() {
        let p = Point3::new(1.0, 1.0, 1.0);
        assert!(fit_line_svd(&[p, p, p]).is_none());
        assert!(fit_line_svd(&[p]).is_none());
    }

    #[test]
    fn test_project_ray_onto_line() {
        let anchor = Point3::origin();
        let dir = Unit::new_normalize(Vector3::x());
        let center = Point3::new(0.0, 0.0, -5.0);
        // ray through (1, 0, 0)
        let ray = Unit::new_normalize(Vector3::new(1.0, 0.0, 5.0));
        let s = project_ray_onto_line(&anchor, &dir, &center, &ray).unwrap();
        assert_relative_eq!(s, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_project_parallel_ray_fails() {
        let anchor = Point3::origin();
        let dir = Unit::new_normalize(Vector3::x());
        let center = Point3::new(0.0, 0.0, -5.0);
        let ray = Unit::new_normalize(Vector3::x());
        assert!(project_ray_onto_line(&anchor, &dir, &center, &ray).is_none());
    }
}
