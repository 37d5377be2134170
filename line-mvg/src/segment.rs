use na::{Point2, Point3, RealField, Unit, Vector2, Vector3};
use nalgebra as na;

/// A 2D line segment in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment2d<R: RealField + Copy> {
    pub p1: Point2<R>,
    pub p2: Point2<R>,
}

impl<R: RealField + Copy> Segment2d<R> {
    pub fn new(p1: Point2<R>, p2: Point2<R>) -> Self {
        Self { p1, p2 }
    }

    pub fn from_endpoints(c: [R; 4]) -> Self {
        Self {
            p1: Point2::new(c[0], c[1]),
            p2: Point2::new(c[2], c[3]),
        }
    }

    #[inline]
    pub fn length(&self) -> R {
        na::distance(&self.p1, &self.p2)
    }

    #[inline]
    pub fn direction(&self) -> Vector2<R> {
        self.p2 - self.p1
    }

    #[inline]
    pub fn midpoint(&self) -> Point2<R> {
        na::center(&self.p1, &self.p2)
    }

    /// Homogeneous line through both endpoints.
    pub fn line(&self) -> Vector3<R> {
        self.p1.to_homogeneous().cross(&self.p2.to_homogeneous())
    }

    /// Distance from `pt` to the infinite line through the segment.
    pub fn distance_to_point(&self, pt: &Point2<R>) -> R {
        let l = self.line();
        let norm = (l[0] * l[0] + l[1] * l[1]).sqrt();
        let eps: R = na::convert(crate::GEOM_EPS);
        if norm < eps {
            return na::distance(&self.p1, pt);
        }
        (l.dot(&pt.to_homogeneous()) / norm).abs()
    }
}

/// A 3D line segment. Equality is by endpoints, not by direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment3d<R: RealField + Copy> {
    pub p1: Point3<R>,
    pub p2: Point3<R>,
}

impl<R: RealField + Copy> Segment3d<R> {
    pub fn new(p1: Point3<R>, p2: Point3<R>) -> Self {
        Self { p1, p2 }
    }

    #[inline]
    pub fn length(&self) -> R {
        na::distance(&self.p1, &self.p2)
    }

    #[inline]
    pub fn direction(&self) -> Unit<Vector3<R>> {
        Unit::new_normalize(self.p2 - self.p1)
    }

    #[inline]
    pub fn midpoint(&self) -> Point3<R> {
        na::center(&self.p1, &self.p2)
    }

    /// Angle to `other` in degrees; folded into [0, 90] when `undirected`.
    pub fn angle_to_deg(&self, other: &Segment3d<R>, undirected: bool) -> R {
        let one: R = na::convert(1.0);
        let dot = self.direction().dot(&other.direction()).clamp(-one, one);
        let mut deg = dot.acos() * na::convert(180.0 / std::f64::consts::PI);
        let ninety: R = na::convert(90.0);
        if undirected && deg > ninety {
            deg = na::convert::<f64, R>(180.0) - deg;
        }
        deg
    }

    /// Distance from `pt` to the infinite line through the segment.
    pub fn distance_to_point(&self, pt: &Point3<R>) -> R {
        let d = self.direction();
        (pt - self.p1).cross(&d).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_segment2d_line_and_distance() {
        let s = Segment2d::new(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0));
        assert_relative_eq!(s.length(), 10.0);
        assert_relative_eq!(s.distance_to_point(&Point2::new(5.0, 3.0)), 3.0, epsilon = 1e-12);
        assert_relative_eq!(s.distance_to_point(&Point2::new(-7.0, -2.0)), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_segment3d_angles() {
        let a = Segment3d::new(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let b = Segment3d::new(Point3::origin(), Point3::new(0.0, 1.0, 0.0));
        let c = Segment3d::new(Point3::new(1.0, 0.0, 0.0), Point3::origin());
        assert_relative_eq!(a.angle_to_deg(&b, false), 90.0, epsilon = 1e-10);
        assert_relative_eq!(a.angle_to_deg(&c, false), 180.0, epsilon = 1e-10);
        assert_relative_eq!(a.angle_to_deg(&c, true), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_segment3d_point_distance() {
        let s = Segment3d::new(Point3::origin(), Point3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(s.distance_to_point(&Point3::new(1.0, 0.0, 4.0)), 4.0, epsilon = 1e-12);
    }
}
