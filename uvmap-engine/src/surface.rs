use std::f64::consts::TAU;

use uvmap_core::geometry::{Bounds2D, Point2, Point3, Vector3};

/// 参数曲面：参数域加上 (u, v) 到三维点的求值。
pub trait Surface {
    fn domain(&self) -> Bounds2D;

    fn point_at(&self, uv: Point2) -> Point3;

    /// u 方向的周期，非周期曲面返回 `None`。
    fn u_period(&self) -> Option<f64> {
        None
    }

    /// 参数到空间为仿射关系时返回 `true`，此时控制点可直接抬升。
    fn is_planar(&self) -> bool {
        false
    }
}

impl<S: Surface + ?Sized> Surface for Box<S> {
    fn domain(&self) -> Bounds2D {
        (**self).domain()
    }

    fn point_at(&self, uv: Point2) -> Point3 {
        (**self).point_at(uv)
    }

    fn u_period(&self) -> Option<f64> {
        (**self).u_period()
    }

    fn is_planar(&self) -> bool {
        (**self).is_planar()
    }
}

/// 平面：`origin + u * u_axis + v * v_axis`。
#[derive(Debug, Clone, Copy)]
pub struct PlaneSurface {
    origin: Point3,
    u_axis: Vector3,
    v_axis: Vector3,
    domain: Bounds2D,
}

impl PlaneSurface {
    pub fn new(origin: Point3, u_axis: Vector3, v_axis: Vector3, domain: Bounds2D) -> Self {
        Self {
            origin,
            u_axis,
            v_axis,
            domain,
        }
    }

    /// 位于世界 XY 平面上的矩形。
    pub fn xy(domain: Bounds2D) -> Self {
        Self::new(
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            domain,
        )
    }

    #[inline]
    pub fn normal(&self) -> Vector3 {
        self.u_axis.cross(self.v_axis)
    }
}

impl Surface for PlaneSurface {
    fn domain(&self) -> Bounds2D {
        self.domain
    }

    fn point_at(&self, uv: Point2) -> Point3 {
        self.origin
            .translate(self.u_axis.scale(uv.x()))
            .translate(self.v_axis.scale(uv.y()))
    }

    fn is_planar(&self) -> bool {
        true
    }
}

/// 轴线沿 +Z 的圆柱侧面。u 为角度（周期 2π），v 为高度。
#[derive(Debug, Clone, Copy)]
pub struct CylinderSurface {
    origin: Point3,
    radius: f64,
    height: f64,
}

impl CylinderSurface {
    pub fn new(origin: Point3, radius: f64, height: f64) -> Self {
        Self {
            origin,
            radius,
            height,
        }
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }
}

impl Surface for CylinderSurface {
    fn domain(&self) -> Bounds2D {
        Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(TAU, self.height))
    }

    fn point_at(&self, uv: Point2) -> Point3 {
        let (sin, cos) = uv.x().sin_cos();
        self.origin.translate(Vector3::new(
            self.radius * cos,
            self.radius * sin,
            uv.y(),
        ))
    }

    fn u_period(&self) -> Option<f64> {
        Some(TAU)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn plane_maps_parameters_along_axes() {
        let plane = PlaneSurface::new(
            Point3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)),
        );
        let p = plane.point_at(Point2::new(0.5, 0.25));
        assert!(p.distance(Point3::new(1.0, 3.0, 3.25)) < 1e-12);
        assert!(plane.is_planar());
        assert!(plane.u_period().is_none());
        let normal = plane.normal().as_vec3();
        assert!((normal.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cylinder_wraps_angle_around_axis() {
        let cylinder = CylinderSurface::new(Point3::new(0.0, 0.0, 0.0), 2.0, 5.0);
        let domain = cylinder.domain();
        assert!((domain.width() - TAU).abs() < 1e-12);
        assert!((domain.height() - 5.0).abs() < 1e-12);

        let p = cylinder.point_at(Point2::new(FRAC_PI_2, 1.5));
        assert!(p.distance(Point3::new(0.0, 2.0, 1.5)) < 1e-12);
        let seam_start = cylinder.point_at(Point2::new(0.0, 1.0));
        let seam_end = cylinder.point_at(Point2::new(TAU, 1.0));
        assert!(seam_start.distance(seam_end) < 1e-12);
    }

    #[test]
    fn boxed_surface_delegates() {
        let boxed: Box<dyn Surface> = Box::new(CylinderSurface::new(
            Point3::new(0.0, 0.0, 0.0),
            1.0,
            1.0,
        ));
        assert_eq!(boxed.u_period(), Some(TAU));
        assert!(!boxed.is_planar());
    }
}
