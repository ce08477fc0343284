pub mod evaluator;
pub mod realizer;
pub mod surface;

pub mod errors {
    use thiserror::Error;
    use uvmap_core::curve::{CurveKind, SplineError};
    use uvmap_core::sketch::ConversionError;

    /// 整个映射过程的致命错误，发生时不处理任何曲线。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum MappingError {
        #[error("sketch has no points to map")]
        EmptySketch,
        #[error("source extent is degenerate (x range {x_range}, y range {y_range})")]
        DegenerateExtent { x_range: f64, y_range: f64 },
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EvaluatorError {
        #[error("curve cannot be evaluated: {0}")]
        InvalidCurve(#[from] SplineError),
        #[error("surface evaluation failed: {0}")]
        Surface(String),
    }

    /// 单条曲线的可恢复错误。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum CurveError {
        #[error("surface evaluator returned no segments")]
        EvaluationFailure,
        #[error("parametric midpoint of arc could not be evaluated")]
        ArcMidpointUnavailable,
        #[error("full circle cannot be mapped through three points")]
        FullCircle,
        #[error("transformed arc points are collinear")]
        DegenerateArc,
        #[error("invalid spline: {0}")]
        InvalidSpline(#[from] SplineError),
        #[error(transparent)]
        Evaluator(#[from] EvaluatorError),
    }

    impl From<ConversionError> for CurveError {
        fn from(value: ConversionError) -> Self {
            match value {
                ConversionError::ArcMidpointUnavailable => CurveError::ArcMidpointUnavailable,
                ConversionError::FullCircle => CurveError::FullCircle,
            }
        }
    }

    /// 带上下文（序号、种类）的曲线错误。
    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("curve #{index} ({kind}): {error}")]
    pub struct CurveFailure {
        pub index: usize,
        pub kind: CurveKind,
        #[source]
        pub error: CurveError,
    }
}

pub mod mapper {
    use tracing::debug;
    use uvmap_core::curve::PlanarCurve;
    use uvmap_core::geometry::{Bounds2D, Point2};

    use crate::errors::MappingError;

    /// 单次映射的显式配置，映射期间只读。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MappingOptions {
        pub swap_uv: bool,
        pub verbose: bool,
    }

    /// 从草图范围到曲面参数矩形的仿射映射，两轴缩放相互独立。
    ///
    /// 交换模式下，由 x 算出的值按 v 方向缩放并作为输出的第二坐标，
    /// 由 y 算出的值按 u 方向缩放并作为第一坐标。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct AffineMap2D {
        source: Bounds2D,
        target: Bounds2D,
        scale_x: f64,
        scale_y: f64,
        axis_swap: bool,
    }

    impl AffineMap2D {
        pub fn from_extents(
            source: Bounds2D,
            target: Bounds2D,
            axis_swap: bool,
        ) -> Result<Self, MappingError> {
            let x_range = source.width();
            let y_range = source.height();
            if source.is_empty() || x_range == 0.0 || y_range == 0.0 {
                return Err(MappingError::DegenerateExtent { x_range, y_range });
            }

            let (scale_x, scale_y) = if axis_swap {
                (target.height() / x_range, target.width() / y_range)
            } else {
                (target.width() / x_range, target.height() / y_range)
            };
            debug!(scale_x, scale_y, axis_swap, "已计算仿射缩放");

            Ok(Self {
                source,
                target,
                scale_x,
                scale_y,
                axis_swap,
            })
        }

        pub fn apply(&self, point: Point2) -> Point2 {
            let origin = self.source.min();
            let offset = self.target.min();
            let from_x = (point.x() - origin.x()) * self.scale_x;
            let from_y = (point.y() - origin.y()) * self.scale_y;
            if self.axis_swap {
                Point2::new(from_y + offset.x(), from_x + offset.y())
            } else {
                Point2::new(from_x + offset.x(), from_y + offset.y())
            }
        }

        /// 反向映射：交换源与目标范围，保持相同的交换标志。
        pub fn inverse(&self) -> Result<Self, MappingError> {
            Self::from_extents(self.target, self.source, self.axis_swap)
        }

        pub fn map_curve(&self, curve: &PlanarCurve) -> PlanarCurve {
            curve.map_points(|point| self.apply(point))
        }

        #[inline]
        pub fn source(&self) -> Bounds2D {
            self.source
        }

        #[inline]
        pub fn target(&self) -> Bounds2D {
            self.target
        }

        #[inline]
        pub fn scale_x(&self) -> f64 {
            self.scale_x
        }

        #[inline]
        pub fn scale_y(&self) -> f64 {
            self.scale_y
        }

        #[inline]
        pub fn axis_swap(&self) -> bool {
            self.axis_swap
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use uvmap_core::curve::{Arc2, NurbsCurve2};

        fn bounds(x0: f64, y0: f64, x1: f64, y1: f64) -> Bounds2D {
            Bounds2D::new(Point2::new(x0, y0), Point2::new(x1, y1))
        }

        fn assert_close(a: Point2, b: Point2) {
            assert!(
                a.distance(b) < 1e-9,
                "({}, {}) != ({}, {})",
                a.x(),
                a.y(),
                b.x(),
                b.y()
            );
        }

        #[test]
        fn corners_map_to_corners_without_swap() {
            let source = bounds(-3.0, 2.0, 7.0, 4.5);
            let target = bounds(0.5, -1.0, 2.0, 6.0);
            let map = AffineMap2D::from_extents(source, target, false).unwrap();
            for (from, to) in source.corners().iter().zip(target.corners()) {
                assert_close(map.apply(*from), to);
            }
        }

        #[test]
        fn corners_map_to_corners_with_swap() {
            let source = bounds(-3.0, 2.0, 7.0, 4.5);
            let target = bounds(0.5, -1.0, 2.0, 6.0);
            let map = AffineMap2D::from_extents(source, target, true).unwrap();
            let [s00, s10, s01, s11] = source.corners();
            let [t00, t10, t01, t11] = target.corners();
            assert_close(map.apply(s00), t00);
            assert_close(map.apply(s10), t01);
            assert_close(map.apply(s01), t10);
            assert_close(map.apply(s11), t11);
        }

        #[test]
        fn swap_follows_explicit_formula_not_plain_transpose() {
            let source = bounds(0.0, 0.0, 10.0, 5.0);
            let target = bounds(0.0, 0.0, 2.0, 4.0);
            let map = AffineMap2D::from_extents(source, target, true).unwrap();
            assert!((map.scale_x() - 0.4).abs() < 1e-12);
            assert!((map.scale_y() - 0.4).abs() < 1e-12);

            let mapped = map.apply(Point2::new(10.0, 0.0));
            assert_close(mapped, Point2::new(0.0, 4.0));

            // 先不交换映射再转置会得到 (0, 2)
            let plain = AffineMap2D::from_extents(source, target, false).unwrap();
            let transposed = plain.apply(Point2::new(10.0, 0.0));
            assert_close(Point2::new(transposed.y(), transposed.x()), Point2::new(0.0, 2.0));
        }

        #[test]
        fn zero_width_or_height_is_rejected() {
            let target = bounds(0.0, 0.0, 1.0, 1.0);
            let err = AffineMap2D::from_extents(bounds(0.0, 0.0, 0.0, 5.0), target, false)
                .unwrap_err();
            assert_eq!(
                err,
                MappingError::DegenerateExtent {
                    x_range: 0.0,
                    y_range: 5.0
                }
            );

            let single = Bounds2D::from_points([Point2::new(3.0, 3.0)]);
            assert!(AffineMap2D::from_extents(single, target, true).is_err());
            assert!(AffineMap2D::from_extents(Bounds2D::empty(), target, false).is_err());
        }

        #[test]
        fn inverse_round_trips_curves() {
            let source = bounds(-5.0, 1.0, 15.0, 11.0);
            let target = bounds(0.0, 0.0, 6.283, 20.0);
            let spline = PlanarCurve::Spline(NurbsCurve2 {
                control_points: vec![
                    Point2::new(-5.0, 1.0),
                    Point2::new(0.0, 8.0),
                    Point2::new(7.0, 3.0),
                    Point2::new(15.0, 11.0),
                ],
                degree: 3,
                knots: vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
                weights: None,
                periodic: false,
            });
            let arc = PlanarCurve::Arc {
                start: Point2::new(0.0, 1.0),
                mid: Point2::new(2.0, 3.0),
                end: Point2::new(4.0, 1.0),
            };

            for swap in [false, true] {
                let map = AffineMap2D::from_extents(source, target, swap).unwrap();
                let inverse = map.inverse().unwrap();
                for curve in [&spline, &arc] {
                    let back = inverse.map_curve(&map.map_curve(curve));
                    for (a, b) in back.points().iter().zip(curve.points()) {
                        assert_close(*a, b);
                    }
                }
            }
        }

        #[test]
        fn end_to_end_line_and_arc_scenario() {
            let source = bounds(0.0, 0.0, 10.0, 5.0);
            let target = bounds(0.0, 0.0, 1.0, 1.0);
            let map = AffineMap2D::from_extents(source, target, false).unwrap();

            let line = map.map_curve(&PlanarCurve::Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(10.0, 5.0),
            });
            assert_eq!(
                line,
                PlanarCurve::Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(1.0, 1.0)
                }
            );

            let arc = map.map_curve(&PlanarCurve::Arc {
                start: Point2::new(0.0, 0.0),
                mid: Point2::new(5.0, 0.0),
                end: Point2::new(10.0, 0.0),
            });
            assert_eq!(
                arc,
                PlanarCurve::Arc {
                    start: Point2::new(0.0, 0.0),
                    mid: Point2::new(0.5, 0.0),
                    end: Point2::new(1.0, 0.0)
                }
            );

            let swapped = AffineMap2D::from_extents(source, target, true).unwrap();
            let line = swapped.map_curve(&PlanarCurve::Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(10.0, 5.0),
            });
            assert_eq!(
                line,
                PlanarCurve::Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(1.0, 1.0)
                }
            );
            // 交换后 (10, 0) 的 x 分量进入 v
            assert_close(swapped.apply(Point2::new(10.0, 0.0)), Point2::new(0.0, 1.0));
        }

        #[test]
        fn arc_midpoint_survives_uniform_scaling() {
            let source = bounds(0.0, 0.0, 10.0, 5.0);
            let arc = Arc2::new(Point2::new(5.0, 2.0), 2.0, 0.3, 2.0);
            // 两种模式下两轴缩放相同 (0.2)，交换时为镜像
            for (target, swap) in [
                (bounds(1.0, 2.0, 3.0, 3.0), false),
                (bounds(1.0, 2.0, 2.0, 4.0), true),
            ] {
                let map = AffineMap2D::from_extents(source, target, swap).unwrap();
                assert!((map.scale_x() - map.scale_y()).abs() < 1e-12);

                let mid = map.apply(arc.parametric_midpoint().unwrap());
                let rebuilt = Arc2::from_three_points(
                    map.apply(arc.start_point()),
                    mid,
                    map.apply(arc.end_point()),
                )
                .unwrap();
                assert!((rebuilt.radius - 0.4).abs() < 1e-9);
                assert!((rebuilt.sweep.abs() - 2.0).abs() < 1e-9);
                assert_eq!(rebuilt.sweep < 0.0, swap);
                assert_close(rebuilt.parametric_midpoint().unwrap(), mid);
            }
        }
    }
}
