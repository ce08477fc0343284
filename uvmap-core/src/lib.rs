pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。草图平面坐标与曲面参数 (u, v) 共用此类型。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn lerp(self, other: Point2, t: f64) -> Self {
            Self(self.0.lerp(other.0, t))
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维点，仅由曲面求值器产生。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn translate(self, offset: Vector3) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn distance(self, other: Point3) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 三维向量，用于描述平面曲面的参数轴。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Vector3 {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn cross(self, other: Vector3) -> Vector3 {
            Self(self.0.cross(other.0))
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框。既用来描述草图范围，也用来描述曲面的参数域。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 由任意点集构造包围盒，点集为空时返回空盒。
        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        /// X 方向跨度，空盒视为 0。
        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        /// Y 方向跨度，空盒视为 0。
        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        /// 判断点是否落在盒内，`tolerance` 向外放宽边界。
        #[inline]
        pub fn contains(&self, point: Point2, tolerance: f64) -> bool {
            !self.is_empty()
                && point.x() >= self.min.x() - tolerance
                && point.x() <= self.max.x() + tolerance
                && point.y() >= self.min.y() - tolerance
                && point.y() <= self.max.y() + tolerance
        }

        /// 四个角点，顺序为 (min,min)、(max,min)、(min,max)、(max,max)。
        pub fn corners(&self) -> [Point2; 4] {
            [
                self.min,
                Point2::new(self.max.x(), self.min.y()),
                Point2::new(self.min.x(), self.max.y()),
                self.max,
            ]
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn bounds_grow_point_by_point() {
            let mut bounds = Bounds2D::empty();
            assert!(bounds.is_empty());
            assert_eq!(bounds.width(), 0.0);

            bounds.include_point(Point2::new(3.0, -1.0));
            assert!(!bounds.is_empty());
            assert_eq!(bounds.width(), 0.0);
            assert_eq!(bounds.height(), 0.0);

            bounds.include_point(Point2::new(-2.0, 4.0));
            assert_eq!(bounds.min(), Point2::new(-2.0, -1.0));
            assert_eq!(bounds.max(), Point2::new(3.0, 4.0));
            assert!((bounds.width() - 5.0).abs() < f64::EPSILON);
            assert!((bounds.height() - 5.0).abs() < f64::EPSILON);
            assert_eq!(bounds.center(), Point2::new(0.5, 1.5));
        }

        #[test]
        fn contains_respects_tolerance() {
            let bounds = Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0));
            assert!(bounds.contains(Point2::new(1.0, 0.5), 0.0));
            assert!(!bounds.contains(Point2::new(1.001, 0.5), 0.0));
            assert!(bounds.contains(Point2::new(1.001, 0.5), 0.01));
            assert!(!Bounds2D::empty().contains(Point2::new(0.0, 0.0), 1.0));
        }
    }
}

pub mod curve {
    use std::f64::consts::{FRAC_PI_2, TAU};
    use std::fmt;
    use std::ops::{Add, Mul};

    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{Point2, Point3, Vector2};

    const COLLINEAR_TOLERANCE: f64 = 1e-12;

    /// 曲线种类，用于日志、计数与错误上下文。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum CurveKind {
        Line,
        Arc,
        Spline,
    }

    impl fmt::Display for CurveKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let name = match self {
                CurveKind::Line => "line",
                CurveKind::Arc => "arc",
                CurveKind::Spline => "spline",
            };
            f.write_str(name)
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum SplineError {
        #[error("spline degree must be at least 1")]
        InvalidDegree,
        #[error("spline of degree {degree} needs more than {count} control points")]
        TooFewControlPoints { degree: usize, count: usize },
        #[error("expected {expected} knots, found {found}")]
        KnotCount { expected: usize, found: usize },
        #[error("knot at index {0} is not finite")]
        NonFiniteKnot(usize),
        #[error("knot vector decreases at index {0}")]
        DecreasingKnots(usize),
        #[error("expected {expected} weights, found {found}")]
        WeightCount { expected: usize, found: usize },
        #[error("weight at index {0} is not positive")]
        NonPositiveWeight(usize),
    }

    /// 圆心式圆弧。`sweep` 带符号：正值为逆时针，负值为顺时针。
    /// 参数即角度，取值区间为 `[start_angle, start_angle + sweep]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Arc2 {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub sweep: f64,
    }

    impl Arc2 {
        #[inline]
        pub fn new(center: Point2, radius: f64, start_angle: f64, sweep: f64) -> Self {
            Self {
                center,
                radius,
                start_angle,
                sweep,
            }
        }

        /// 按 DXF 约定（逆时针，从起始角到终止角）构造圆弧，起止角相同视为整圆。
        pub fn from_angles(center: Point2, radius: f64, start_angle: f64, end_angle: f64) -> Self {
            let mut sweep = (end_angle - start_angle).rem_euclid(TAU);
            if sweep.abs() < 1e-12 {
                sweep = TAU;
            }
            Self::new(center, radius, start_angle, sweep)
        }

        /// 经过三点的唯一圆弧：从 `start` 经 `mid` 到 `end`。三点共线或重合时返回 `None`。
        pub fn from_three_points(start: Point2, mid: Point2, end: Point2) -> Option<Self> {
            let b = mid.as_vec2() - start.as_vec2();
            let c = end.as_vec2() - start.as_vec2();
            let b_len2 = b.length_squared();
            let c_len2 = c.length_squared();
            let denom = 2.0 * b.perp_dot(c);
            let scale = b_len2.max(c_len2);
            if !denom.is_finite() || scale <= f64::EPSILON || denom.abs() <= COLLINEAR_TOLERANCE * scale
            {
                return None;
            }

            let offset = DVec2::new(
                (c.y * b_len2 - b.y * c_len2) / denom,
                (b.x * c_len2 - c.x * b_len2) / denom,
            );
            let center = start.as_vec2() + offset;
            let radius = offset.length();

            let angle_of = |p: Point2| {
                let d = p.as_vec2() - center;
                d.y.atan2(d.x)
            };
            let a0 = angle_of(start);
            let a1 = angle_of(mid);
            let a2 = angle_of(end);

            let ccw_to_end = (a2 - a0).rem_euclid(TAU);
            let ccw_to_mid = (a1 - a0).rem_euclid(TAU);
            let sweep = if ccw_to_mid < ccw_to_end {
                ccw_to_end
            } else {
                ccw_to_end - TAU
            };

            Some(Self::new(Point2::from_vec(center), radius, a0, sweep))
        }

        #[inline]
        pub fn parameter_range(&self) -> (f64, f64) {
            (self.start_angle, self.start_angle + self.sweep)
        }

        #[inline]
        pub fn point_at(&self, angle: f64) -> Point2 {
            let offset = Vector2::new(self.radius * angle.cos(), self.radius * angle.sin());
            self.center.translate(offset)
        }

        #[inline]
        pub fn start_point(&self) -> Point2 {
            self.point_at(self.start_angle)
        }

        #[inline]
        pub fn end_point(&self) -> Point2 {
            self.point_at(self.start_angle + self.sweep)
        }

        /// 在起止参数平均值处求值的参数中点（不是弦中点）。
        /// 半径非正、扫掠为零或结果非有限时返回 `None`。
        pub fn parametric_midpoint(&self) -> Option<Point2> {
            if !(self.radius.is_finite() && self.radius > 0.0) {
                return None;
            }
            if !self.sweep.is_finite() || self.sweep == 0.0 || !self.start_angle.is_finite() {
                return None;
            }
            let (start, end) = self.parameter_range();
            let mid = self.point_at((start + end) * 0.5);
            mid.is_finite().then_some(mid)
        }

        /// 精确的有理二次 NURBS 表示，每段不超过 90°。
        pub fn to_nurbs(&self) -> NurbsCurve2 {
            let segments = (self.sweep.abs() / FRAC_PI_2).ceil().max(1.0) as usize;
            let segment_sweep = self.sweep / segments as f64;
            let half = segment_sweep * 0.5;
            let mid_weight = half.cos();
            let tangent_length = self.radius / mid_weight;

            let mut control_points = Vec::with_capacity(2 * segments + 1);
            let mut weights = Vec::with_capacity(2 * segments + 1);
            control_points.push(self.start_point());
            weights.push(1.0);
            for seg in 0..segments {
                let seg_start = self.start_angle + seg as f64 * segment_sweep;
                let seg_mid = seg_start + half;
                control_points.push(self.center.translate(Vector2::new(
                    tangent_length * seg_mid.cos(),
                    tangent_length * seg_mid.sin(),
                )));
                weights.push(mid_weight);
                control_points.push(self.point_at(seg_start + segment_sweep));
                weights.push(1.0);
            }

            let mut knots = vec![0.0; 3];
            for i in 1..segments {
                knots.push(i as f64);
                knots.push(i as f64);
            }
            knots.extend([segments as f64; 3]);

            NurbsCurve2 {
                control_points,
                degree: 2,
                knots,
                weights: Some(weights),
                periodic: false,
            }
        }
    }

    /// 二维 NURBS 曲线。`weights` 仅在有理曲线时存在。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct NurbsCurve2 {
        pub control_points: Vec<Point2>,
        pub degree: usize,
        pub knots: Vec<f64>,
        pub weights: Option<Vec<f64>>,
        pub periodic: bool,
    }

    impl NurbsCurve2 {
        pub fn new(
            control_points: Vec<Point2>,
            degree: usize,
            knots: Vec<f64>,
            weights: Option<Vec<f64>>,
            periodic: bool,
        ) -> Result<Self, SplineError> {
            let curve = Self {
                control_points,
                degree,
                knots,
                weights,
                periodic,
            };
            curve.validate()?;
            Ok(curve)
        }

        #[inline]
        pub fn is_rational(&self) -> bool {
            self.weights.is_some()
        }

        pub fn validate(&self) -> Result<(), SplineError> {
            validate_layout(
                self.control_points.len(),
                self.degree,
                &self.knots,
                self.weights.as_deref(),
            )
        }

        /// 有效参数区间 `[knots[p], knots[n]]`。
        #[inline]
        pub fn domain(&self) -> (f64, f64) {
            (
                self.knots[self.degree],
                self.knots[self.control_points.len()],
            )
        }

        /// 有理 de Boor 求值，`t` 会被夹到有效区间内。曲线须先通过 `validate`。
        pub fn point_at(&self, t: f64) -> Point2 {
            let homogeneous: Vec<(DVec2, f64)> = self
                .control_points
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let w = weight_at(self.weights.as_deref(), i);
                    (p.as_vec2() * w, w)
                })
                .collect();
            let (wp, w) = de_boor(&homogeneous, self.degree, &self.knots, t);
            Point2::from_vec(wp / w)
        }

        /// 逐点变换控制点；阶数、节点、权重与周期标志原样保留。
        pub fn map_points<F>(&self, mut f: F) -> NurbsCurve2
        where
            F: FnMut(Point2) -> Point2,
        {
            NurbsCurve2 {
                control_points: self.control_points.iter().map(|p| f(*p)).collect(),
                degree: self.degree,
                knots: self.knots.clone(),
                weights: self.weights.clone(),
                periodic: self.periodic,
            }
        }

        /// 把控制点抬升到三维，仅对仿射映射精确。
        pub fn lift<F>(&self, mut f: F) -> NurbsCurve3
        where
            F: FnMut(Point2) -> Point3,
        {
            NurbsCurve3 {
                control_points: self.control_points.iter().map(|p| f(*p)).collect(),
                degree: self.degree,
                knots: self.knots.clone(),
                weights: self.weights.clone(),
                periodic: self.periodic,
            }
        }
    }

    /// 三维 NURBS 曲线，是所有实现结果的统一表示。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct NurbsCurve3 {
        pub control_points: Vec<Point3>,
        pub degree: usize,
        pub knots: Vec<f64>,
        pub weights: Option<Vec<f64>>,
        pub periodic: bool,
    }

    impl NurbsCurve3 {
        /// 一次直线段，节点 `[0, 0, 1, 1]`。
        pub fn from_line(start: Point3, end: Point3) -> Self {
            Self {
                control_points: vec![start, end],
                degree: 1,
                knots: vec![0.0, 0.0, 1.0, 1.0],
                weights: None,
                periodic: false,
            }
        }

        /// 一次折线，按弦长参数化；总长为零时退化为均匀参数。
        pub fn from_polyline(points: Vec<Point3>) -> Self {
            let mut params = Vec::with_capacity(points.len());
            let mut total = 0.0;
            params.push(0.0);
            for pair in points.windows(2) {
                total += pair[0].distance(pair[1]);
                params.push(total);
            }
            if total <= f64::EPSILON {
                params = (0..points.len()).map(|i| i as f64).collect();
            }

            let mut knots = Vec::with_capacity(points.len() + 2);
            if let (Some(first), Some(last)) = (params.first(), params.last()) {
                knots.push(*first);
                knots.extend(params.iter().copied());
                knots.push(*last);
            }

            Self {
                control_points: points,
                degree: 1,
                knots,
                weights: None,
                periodic: false,
            }
        }

        #[inline]
        pub fn is_rational(&self) -> bool {
            self.weights.is_some()
        }

        pub fn validate(&self) -> Result<(), SplineError> {
            validate_layout(
                self.control_points.len(),
                self.degree,
                &self.knots,
                self.weights.as_deref(),
            )
        }

        #[inline]
        pub fn domain(&self) -> (f64, f64) {
            (
                self.knots[self.degree],
                self.knots[self.control_points.len()],
            )
        }

        /// 有理 de Boor 求值。曲线须先通过 `validate`。
        pub fn point_at(&self, t: f64) -> Point3 {
            let homogeneous: Vec<(DVec3, f64)> = self
                .control_points
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let w = weight_at(self.weights.as_deref(), i);
                    (p.as_vec3() * w, w)
                })
                .collect();
            let (wp, w) = de_boor(&homogeneous, self.degree, &self.knots, t);
            Point3::from(wp / w)
        }
    }

    /// 变换后的二维参数曲线，交给曲面求值器实现为三维曲线。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum ParametricCurve {
        Line { start: Point2, end: Point2 },
        Arc(Arc2),
        Nurbs(NurbsCurve2),
    }

    impl ParametricCurve {
        pub fn kind(&self) -> CurveKind {
            match self {
                ParametricCurve::Line { .. } => CurveKind::Line,
                ParametricCurve::Arc(_) => CurveKind::Arc,
                ParametricCurve::Nurbs(_) => CurveKind::Spline,
            }
        }

        pub fn parameter_range(&self) -> (f64, f64) {
            match self {
                ParametricCurve::Line { .. } => (0.0, 1.0),
                ParametricCurve::Arc(arc) => arc.parameter_range(),
                ParametricCurve::Nurbs(nurbs) => nurbs.domain(),
            }
        }

        pub fn point_at(&self, t: f64) -> Point2 {
            match self {
                ParametricCurve::Line { start, end } => start.lerp(*end, t),
                ParametricCurve::Arc(arc) => arc.point_at(t),
                ParametricCurve::Nurbs(nurbs) => nurbs.point_at(t),
            }
        }

        /// 在参数区间上等距采样 `count` 个点（至少 2 个，包含两端）。
        pub fn sample(&self, count: usize) -> Vec<Point2> {
            let count = count.max(2);
            let (start, end) = self.parameter_range();
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    let t = if i + 1 == count {
                        end
                    } else {
                        start + step * i as f64
                    };
                    self.point_at(t)
                })
                .collect()
        }
    }

    /// 草图平面上的待映射曲线。圆弧以三点形式给出，`mid` 为参数中点。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum PlanarCurve {
        Line {
            start: Point2,
            end: Point2,
        },
        Arc {
            start: Point2,
            mid: Point2,
            end: Point2,
        },
        Spline(NurbsCurve2),
    }

    impl PlanarCurve {
        pub fn kind(&self) -> CurveKind {
            match self {
                PlanarCurve::Line { .. } => CurveKind::Line,
                PlanarCurve::Arc { .. } => CurveKind::Arc,
                PlanarCurve::Spline(_) => CurveKind::Spline,
            }
        }

        /// 定义曲线的全部点（样条为控制点）。
        pub fn points(&self) -> Vec<Point2> {
            match self {
                PlanarCurve::Line { start, end } => vec![*start, *end],
                PlanarCurve::Arc { start, mid, end } => vec![*start, *mid, *end],
                PlanarCurve::Spline(spline) => spline.control_points.clone(),
            }
        }

        /// 对每个定义点应用同一变换，样条的其余字段保持不变。
        pub fn map_points<F>(&self, mut f: F) -> PlanarCurve
        where
            F: FnMut(Point2) -> Point2,
        {
            match self {
                PlanarCurve::Line { start, end } => PlanarCurve::Line {
                    start: f(*start),
                    end: f(*end),
                },
                PlanarCurve::Arc { start, mid, end } => PlanarCurve::Arc {
                    start: f(*start),
                    mid: f(*mid),
                    end: f(*end),
                },
                PlanarCurve::Spline(spline) => PlanarCurve::Spline(spline.map_points(f)),
            }
        }
    }

    fn validate_layout(
        count: usize,
        degree: usize,
        knots: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<(), SplineError> {
        if degree < 1 {
            return Err(SplineError::InvalidDegree);
        }
        if count <= degree {
            return Err(SplineError::TooFewControlPoints { degree, count });
        }
        let expected = count + degree + 1;
        if knots.len() != expected {
            return Err(SplineError::KnotCount {
                expected,
                found: knots.len(),
            });
        }
        if let Some(index) = knots.iter().position(|k| !k.is_finite()) {
            return Err(SplineError::NonFiniteKnot(index));
        }
        if let Some(index) = knots.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(SplineError::DecreasingKnots(index + 1));
        }
        if let Some(weights) = weights {
            if weights.len() != count {
                return Err(SplineError::WeightCount {
                    expected: count,
                    found: weights.len(),
                });
            }
            if let Some(index) = weights.iter().position(|w| !(*w > 0.0)) {
                return Err(SplineError::NonPositiveWeight(index));
            }
        }
        Ok(())
    }

    #[inline]
    fn weight_at(weights: Option<&[f64]>, index: usize) -> f64 {
        weights.map_or(1.0, |w| w[index])
    }

    fn find_span(knots: &[f64], count: usize, degree: usize, t: f64) -> usize {
        if t >= knots[count] {
            return count - 1;
        }
        let mut low = degree;
        let mut high = count;
        while low < high {
            let mid = (low + high) / 2;
            if t < knots[mid] {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        (low - 1).max(degree)
    }

    /// 齐次坐标下的 de Boor 递推，返回 (w·P, w)。
    fn de_boor<V>(points: &[(V, f64)], degree: usize, knots: &[f64], t: f64) -> (V, f64)
    where
        V: Copy + Add<Output = V> + Mul<f64, Output = V>,
    {
        let count = points.len();
        let (t_min, t_max) = (knots[degree], knots[count]);
        let t = t.clamp(t_min.min(t_max), t_max.max(t_min));
        let span = find_span(knots, count, degree, t);

        let mut d: Vec<(V, f64)> = (0..=degree).map(|j| points[span - degree + j]).collect();
        for r in 1..=degree {
            for j in (r..=degree).rev() {
                let i = span - degree + j;
                let denom = knots[i + degree - r + 1] - knots[i];
                let alpha = if denom.abs() < f64::EPSILON {
                    0.0
                } else {
                    (t - knots[i]) / denom
                };
                let (prev_p, prev_w) = d[j - 1];
                let (cur_p, cur_w) = d[j];
                d[j] = (
                    prev_p * (1.0 - alpha) + cur_p * alpha,
                    prev_w * (1.0 - alpha) + cur_w * alpha,
                );
            }
        }
        d[degree]
    }

}

pub mod sketch {
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use std::f64::consts::TAU;

    use crate::curve::{Arc2, CurveKind, NurbsCurve2, PlanarCurve};
    use crate::geometry::{Bounds2D, Point2};

    const FULL_CIRCLE_TOLERANCE: f64 = 1e-9;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    pub enum ConversionError {
        #[error("parametric midpoint of arc could not be evaluated")]
        ArcMidpointUnavailable,
        #[error("full circle cannot be described by start, midpoint and end")]
        FullCircle,
    }

    /// 草图中的几何对象。圆弧保存圆心式，样条同时保留拟合点。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum SketchGeometry {
        Line {
            start: Point2,
            end: Point2,
        },
        Arc(Arc2),
        FittedSpline {
            curve: NurbsCurve2,
            fit_points: Vec<Point2>,
        },
    }

    impl SketchGeometry {
        pub fn kind(&self) -> CurveKind {
            match self {
                SketchGeometry::Line { .. } => CurveKind::Line,
                SketchGeometry::Arc(_) => CurveKind::Arc,
                SketchGeometry::FittedSpline { .. } => CurveKind::Spline,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SketchCurve {
        pub geometry: SketchGeometry,
        pub layer: String,
        pub is_construction: bool,
    }

    /// 一条待映射的源曲线：`index` 为其在草图中的位置。
    #[derive(Debug, Clone, PartialEq)]
    pub struct SourceCurve {
        pub index: usize,
        pub kind: CurveKind,
        pub curve: Result<PlanarCurve, ConversionError>,
    }

    /// 源草图：曲线加孤立点。
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct Sketch {
        pub name: String,
        curves: Vec<SketchCurve>,
        points: Vec<Point2>,
    }

    impl Sketch {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                curves: Vec::new(),
                points: Vec::new(),
            }
        }

        pub fn add_curve(&mut self, curve: SketchCurve) -> usize {
            self.curves.push(curve);
            self.curves.len() - 1
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) -> usize {
            self.add_curve(SketchCurve {
                geometry: SketchGeometry::Line { start, end },
                layer: layer.into(),
                is_construction: false,
            })
        }

        pub fn add_arc(&mut self, arc: Arc2, layer: impl Into<String>) -> usize {
            self.add_curve(SketchCurve {
                geometry: SketchGeometry::Arc(arc),
                layer: layer.into(),
                is_construction: false,
            })
        }

        pub fn add_fitted_spline(
            &mut self,
            curve: NurbsCurve2,
            fit_points: Vec<Point2>,
            layer: impl Into<String>,
        ) -> usize {
            self.add_curve(SketchCurve {
                geometry: SketchGeometry::FittedSpline { curve, fit_points },
                layer: layer.into(),
                is_construction: false,
            })
        }

        pub fn add_point(&mut self, point: Point2) {
            self.points.push(point);
        }

        /// 标记或取消构造线，返回该曲线是否存在。
        pub fn set_construction(&mut self, index: usize, is_construction: bool) -> bool {
            match self.curves.get_mut(index) {
                Some(curve) => {
                    curve.is_construction = is_construction;
                    true
                }
                None => false,
            }
        }

        pub fn curves(&self) -> impl Iterator<Item = &SketchCurve> {
            self.curves.iter()
        }

        pub fn points(&self) -> impl Iterator<Item = &Point2> {
            self.points.iter()
        }

        /// 草图拥有的全部点：直线端点、圆弧圆心与端点、样条拟合点（无拟合点时取控制点）
        /// 以及孤立点。构造线的点同样计入。
        pub fn sketch_points(&self) -> Vec<Point2> {
            let mut points = Vec::new();
            for curve in &self.curves {
                match &curve.geometry {
                    SketchGeometry::Line { start, end } => {
                        points.push(*start);
                        points.push(*end);
                    }
                    SketchGeometry::Arc(arc) => {
                        points.push(arc.center);
                        points.push(arc.start_point());
                        points.push(arc.end_point());
                    }
                    SketchGeometry::FittedSpline { curve, fit_points } => {
                        if fit_points.is_empty() {
                            points.extend(curve.control_points.iter().copied());
                        } else {
                            points.extend(fit_points.iter().copied());
                        }
                    }
                }
            }
            points.extend(self.points.iter().copied());
            points
        }

        /// 逐点扫描得到的真实范围，不依赖任何缓存的包围盒。
        pub fn extent(&self) -> Bounds2D {
            Bounds2D::from_points(self.sketch_points())
        }

        /// 按草图顺序转换所有非构造曲线。
        pub fn planar_curves(&self) -> Vec<SourceCurve> {
            self.curves
                .iter()
                .enumerate()
                .filter(|(_, curve)| !curve.is_construction)
                .map(|(index, curve)| SourceCurve {
                    index,
                    kind: curve.geometry.kind(),
                    curve: to_planar(&curve.geometry),
                })
                .collect()
        }
    }

    fn to_planar(geometry: &SketchGeometry) -> Result<PlanarCurve, ConversionError> {
        match geometry {
            SketchGeometry::Line { start, end } => Ok(PlanarCurve::Line {
                start: *start,
                end: *end,
            }),
            SketchGeometry::Arc(arc) => {
                // 整圆的起点与终点重合，三点式无法确定圆
                if arc.sweep.abs() >= TAU - FULL_CIRCLE_TOLERANCE {
                    return Err(ConversionError::FullCircle);
                }
                let mid = arc
                    .parametric_midpoint()
                    .ok_or(ConversionError::ArcMidpointUnavailable)?;
                Ok(PlanarCurve::Arc {
                    start: arc.start_point(),
                    mid,
                    end: arc.end_point(),
                })
            }
            SketchGeometry::FittedSpline { curve, .. } => Ok(PlanarCurve::Spline(curve.clone())),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::f64::consts::{FRAC_PI_2, PI};

        #[test]
        fn extent_includes_isolated_points() {
            let mut sketch = Sketch::new("S");
            sketch.add_line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), "0");
            sketch.add_point(Point2::new(4.0, 5.0));

            let extent = sketch.extent();
            assert_eq!(extent.min(), Point2::new(0.0, 0.0));
            assert_eq!(extent.max(), Point2::new(10.0, 5.0));
        }

        #[test]
        fn extent_counts_arc_center_and_construction_curves() {
            let mut sketch = Sketch::new("S");
            sketch.add_arc(Arc2::from_angles(Point2::new(0.0, 0.0), 1.0, 0.0, FRAC_PI_2), "0");
            let construction = sketch.add_line(Point2::new(-3.0, 0.0), Point2::new(0.0, 0.0), "0");
            sketch.set_construction(construction, true);

            let extent = sketch.extent();
            assert!((extent.min().x() + 3.0).abs() < 1e-12);
            assert!((extent.max().x() - 1.0).abs() < 1e-12);
            assert!((extent.max().y() - 1.0).abs() < 1e-12);
        }

        #[test]
        fn planar_curves_skip_construction_and_keep_order() {
            let mut sketch = Sketch::new("S");
            sketch.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "0");
            let hidden = sketch.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 1.0), "0");
            sketch.add_arc(Arc2::from_angles(Point2::new(0.0, 0.0), 2.0, 0.0, PI), "0");
            sketch.set_construction(hidden, true);

            let sources = sketch.planar_curves();
            assert_eq!(sources.len(), 2);
            assert_eq!(sources[0].index, 0);
            assert_eq!(sources[0].kind, CurveKind::Line);
            assert_eq!(sources[1].index, 2);
            match &sources[1].curve {
                Ok(PlanarCurve::Arc { mid, .. }) => {
                    assert!(mid.distance(Point2::new(0.0, 2.0)) < 1e-12);
                }
                other => panic!("unexpected conversion result: {other:?}"),
            }
        }

        #[test]
        fn unusable_arc_reports_missing_midpoint() {
            let mut sketch = Sketch::new("S");
            sketch.add_arc(Arc2::new(Point2::new(0.0, 0.0), 0.0, 0.0, PI), "0");
            let sources = sketch.planar_curves();
            assert_eq!(
                sources[0].curve,
                Err(ConversionError::ArcMidpointUnavailable)
            );
        }

        #[test]
        fn full_circle_is_rejected_per_curve() {
            let mut sketch = Sketch::new("S");
            sketch.add_arc(Arc2::from_angles(Point2::new(2.0, 3.0), 1.5, 0.4, 0.4), "0");
            sketch.add_arc(Arc2::new(Point2::new(0.0, 0.0), 1.0, 0.0, -TAU), "0");
            sketch.add_line(Point2::new(0.0, 0.0), Point2::new(4.0, 4.0), "0");

            let sources = sketch.planar_curves();
            assert_eq!(sources.len(), 3);
            assert_eq!(sources[0].curve, Err(ConversionError::FullCircle));
            assert_eq!(sources[1].curve, Err(ConversionError::FullCircle));
            assert!(sources[2].curve.is_ok());

            let nearly_full = Arc2::new(Point2::new(0.0, 0.0), 1.0, 0.0, TAU - 1e-3);
            sketch.add_arc(nearly_full, "0");
            assert!(sketch.planar_curves()[3].curve.is_ok());
        }
    }
}
