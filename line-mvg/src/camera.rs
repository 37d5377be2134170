use na::{Matrix3, Point2, Point3, RealField, Unit, Vector3};
use nalgebra as na;

use crate::{MvgError, Result};

/// A calibrated linear pinhole camera: intrinsics `K`, rotation `R` and
/// translation `t`, with `x_cam = R x_world + t`.
///
/// The inverse intrinsics and the camera center `C = -Rᵀt` are cached at
/// construction; the struct is immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera<R: RealField + Copy> {
    k: Matrix3<R>,
    rot: Matrix3<R>,
    t: Vector3<R>,
    k_inv: Matrix3<R>,
    center: Point3<R>,
}

impl<R: RealField + Copy> PinholeCamera<R> {
    pub fn new(k: Matrix3<R>, rot: Matrix3<R>, t: Vector3<R>) -> Result<Self> {
        let k_inv = k.try_inverse().ok_or(MvgError::SingularIntrinsics)?;
        let center = Point3::from(-(rot.transpose() * t));
        Ok(Self {
            k,
            rot,
            t,
            k_inv,
            center,
        })
    }

    #[inline]
    pub fn intrinsics(&self) -> &Matrix3<R> {
        &self.k
    }

    #[inline]
    pub fn rotation(&self) -> &Matrix3<R> {
        &self.rot
    }

    #[inline]
    pub fn translation(&self) -> &Vector3<R> {
        &self.t
    }

    #[inline]
    pub fn center(&self) -> &Point3<R> {
        &self.center
    }

    /// Viewing direction of the principal ray in world coordinates.
    #[inline]
    pub fn optical_axis(&self) -> Vector3<R> {
        self.rot.row(2).transpose()
    }

    /// Mean of the two focal lengths, used to translate a pixel-space sigma
    /// into an angular scale.
    #[inline]
    pub fn focal_scale(&self) -> R {
        let two: R = na::convert(2.0);
        (self.k[(0, 0)].abs() + self.k[(1, 1)].abs()) / two
    }

    /// Normalized world-frame ray through the given pixel.
    pub fn ray(&self, px: &Point2<R>) -> Unit<Vector3<R>> {
        let dir_cam = self.k_inv * px.to_homogeneous();
        Unit::new_normalize(self.rot.transpose() * dir_cam)
    }

    /// World point at `depth` along the ray through `px`.
    pub fn point_at_depth(&self, px: &Point2<R>, depth: R) -> Point3<R> {
        self.center + self.ray(px).into_inner() * depth
    }

    /// Project a world point; `None` when the point is at or behind the
    /// camera plane.
    pub fn project(&self, pt: &Point3<R>) -> Option<Point2<R>> {
        let eps: R = na::convert(crate::GEOM_EPS);
        let cam = self.rot * pt.coords + self.t;
        if cam[2] <= eps {
            return None;
        }
        let h = self.k * cam;
        Some(Point2::new(h[0] / h[2], h[1] / h[2]))
    }

    #[inline]
    pub fn baseline_to(&self, other: &PinholeCamera<R>) -> R {
        na::distance(&self.center, &other.center)
    }

    /// Angle between the two optical axes, in radians.
    pub fn axis_angle_to(&self, other: &PinholeCamera<R>) -> R {
        let one: R = na::convert(1.0);
        let d = self.optical_axis().dot(&other.optical_axis());
        d.clamp(-one, one).acos()
    }

    /// Fundamental matrix mapping a pixel of `self` to its epipolar line in
    /// `other`.
    pub fn fundamental_to(&self, other: &PinholeCamera<R>) -> Matrix3<R> {
        let r_rel = other.rot * self.rot.transpose();
        let t_rel = other.t - r_rel * self.t;
        let e = skew(&t_rel) * r_rel;
        other.k_inv.transpose() * e * self.k_inv
    }
}

fn skew<R: RealField + Copy>(v: &Vector3<R>) -> Matrix3<R> {
    let zero: R = na::convert(0.0);
    Matrix3::new(
        zero, -v[2], v[1], //
        v[2], zero, -v[0], //
        -v[1], v[0], zero,
    )
}
