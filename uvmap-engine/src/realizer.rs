use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};
use uvmap_core::curve::{Arc2, CurveKind, NurbsCurve3, ParametricCurve, PlanarCurve};
use uvmap_core::geometry::Point2;
use uvmap_core::sketch::Sketch;

use crate::errors::{CurveError, CurveFailure, MappingError};
use crate::evaluator::{ModelCurve, SurfaceEvaluator};
use crate::mapper::{AffineMap2D, MappingOptions};

/// 单条输入曲线实现出的全部三维曲线段。
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedGroup {
    pub index: usize,
    pub kind: CurveKind,
    pub segments: Vec<NurbsCurve3>,
}

/// 仅用于观察的计数器，不影响结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RealizeCounters {
    pub lines: usize,
    pub arcs: usize,
    pub splines: usize,
    pub segments: usize,
}

impl RealizeCounters {
    fn record(&mut self, kind: CurveKind, segments: usize) {
        match kind {
            CurveKind::Line => self.lines += 1,
            CurveKind::Arc => self.arcs += 1,
            CurveKind::Spline => self.splines += 1,
        }
        self.segments += segments;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RealizeReport {
    pub groups: Vec<RealizedGroup>,
    pub failures: Vec<CurveFailure>,
    pub counters: RealizeCounters,
    pub cancelled: bool,
}

impl RealizeReport {
    /// 按输入顺序展开的全部曲线段。
    pub fn curves(&self) -> impl Iterator<Item = &NurbsCurve3> {
        self.groups.iter().flat_map(|group| group.segments.iter())
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            counters: self.counters,
            failures: self
                .failures
                .iter()
                .map(|failure| FailureSummary {
                    index: failure.index,
                    kind: failure.kind,
                    message: failure.error.to_string(),
                })
                .collect(),
            cancelled: self.cancelled,
        }
    }
}

/// 可序列化的运行摘要。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub counters: RealizeCounters,
    pub failures: Vec<FailureSummary>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub index: usize,
    pub kind: CurveKind,
    pub message: String,
}

/// 输出草图名称：不交换时为 `UV from <name>`，交换时为 `VU from <name>`。
pub fn output_name(source_name: &str, swap_uv: bool) -> String {
    if swap_uv {
        format!("VU from {source_name}")
    } else {
        format!("UV from {source_name}")
    }
}

/// 曲线实现器：变换控制几何、构造参数曲线并交给曲面求值器。
pub struct CurveRealizer<'a, E: ?Sized> {
    evaluator: &'a E,
    map: AffineMap2D,
    options: MappingOptions,
}

impl<'a, E: SurfaceEvaluator + ?Sized> CurveRealizer<'a, E> {
    pub fn new(evaluator: &'a E, map: AffineMap2D, options: MappingOptions) -> Self {
        Self {
            evaluator,
            map,
            options,
        }
    }

    /// 由草图的真实范围与曲面参数域推导映射。范围退化时直接失败。
    pub fn for_sketch(
        evaluator: &'a E,
        sketch: &Sketch,
        options: MappingOptions,
    ) -> Result<Self, MappingError> {
        let extent = sketch.extent();
        if extent.is_empty() {
            return Err(MappingError::EmptySketch);
        }
        let domain = evaluator.parametric_domain();
        if options.verbose {
            debug!(
                min_x = extent.min().x(),
                max_x = extent.max().x(),
                min_y = extent.min().y(),
                max_y = extent.max().y(),
                "草图范围"
            );
            debug!(
                min_u = domain.min().x(),
                max_u = domain.max().x(),
                min_v = domain.min().y(),
                max_v = domain.max().y(),
                "曲面参数域"
            );
        }
        let map = AffineMap2D::from_extents(extent, domain, options.swap_uv)?;
        Ok(Self::new(evaluator, map, options))
    }

    #[inline]
    pub fn map(&self) -> &AffineMap2D {
        &self.map
    }

    pub fn realize(&self, curves: &[PlanarCurve]) -> RealizeReport {
        self.run(Self::indexed(curves), None)
    }

    /// 与 `realize` 相同，但每条曲线开始前检查取消标志。
    pub fn realize_with_cancel(&self, curves: &[PlanarCurve], cancel: &AtomicBool) -> RealizeReport {
        self.run(Self::indexed(curves), Some(cancel))
    }

    pub fn realize_sketch(&self, sketch: &Sketch) -> RealizeReport {
        self.realize_sketch_inner(sketch, None)
    }

    pub fn realize_sketch_with_cancel(&self, sketch: &Sketch, cancel: &AtomicBool) -> RealizeReport {
        self.realize_sketch_inner(sketch, Some(cancel))
    }

    /// 实现单条曲线，返回归一为 NURBS 的全部曲线段。
    pub fn realize_curve(&self, curve: &PlanarCurve) -> Result<Vec<NurbsCurve3>, CurveError> {
        let mapped = self.map.map_curve(curve);
        if self.options.verbose {
            trace_points(curve.kind(), &curve.points(), &mapped.points());
        }

        let parametric = match mapped {
            PlanarCurve::Line { start, end } => ParametricCurve::Line { start, end },
            PlanarCurve::Arc { start, mid, end } => ParametricCurve::Arc(
                Arc2::from_three_points(start, mid, end).ok_or(CurveError::DegenerateArc)?,
            ),
            PlanarCurve::Spline(spline) => {
                spline.validate()?;
                ParametricCurve::Nurbs(spline)
            }
        };

        let segments = self.evaluator.project(&parametric)?;
        if segments.is_empty() {
            return Err(CurveError::EvaluationFailure);
        }
        Ok(segments.into_iter().map(ModelCurve::into_nurbs).collect())
    }

    fn indexed(
        curves: &[PlanarCurve],
    ) -> impl Iterator<Item = (usize, CurveKind, Result<&PlanarCurve, CurveError>)> {
        curves
            .iter()
            .enumerate()
            .map(|(index, curve)| (index, curve.kind(), Ok(curve)))
    }

    fn realize_sketch_inner(&self, sketch: &Sketch, cancel: Option<&AtomicBool>) -> RealizeReport {
        let sources = sketch.planar_curves();
        info!(
            sketch = %sketch.name,
            curves = sources.len(),
            swap_uv = self.options.swap_uv,
            "开始映射草图"
        );
        let items = sources.iter().map(|source| {
            (
                source.index,
                source.kind,
                source.curve.as_ref().map_err(|err| CurveError::from(*err)),
            )
        });
        self.run(items, cancel)
    }

    fn run<'c, I>(&self, items: I, cancel: Option<&AtomicBool>) -> RealizeReport
    where
        I: IntoIterator<Item = (usize, CurveKind, Result<&'c PlanarCurve, CurveError>)>,
    {
        let mut report = RealizeReport::default();
        for (index, kind, curve) in items {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!(index, "映射已取消");
                report.cancelled = true;
                break;
            }

            match curve.and_then(|curve| self.realize_curve(curve)) {
                Ok(segments) => {
                    report.counters.record(kind, segments.len());
                    if self.options.verbose {
                        debug!(index, %kind, segments = segments.len(), "曲线已实现");
                    }
                    report.groups.push(RealizedGroup {
                        index,
                        kind,
                        segments,
                    });
                }
                Err(error) => {
                    warn!(index, %kind, error = %error, "曲线未能实现，继续处理后续曲线");
                    report.failures.push(CurveFailure { index, kind, error });
                }
            }
        }

        info!(
            lines = report.counters.lines,
            arcs = report.counters.arcs,
            splines = report.counters.splines,
            segments = report.counters.segments,
            failures = report.failures.len(),
            "映射完成"
        );
        report
    }
}

fn trace_points(kind: CurveKind, before: &[Point2], after: &[Point2]) {
    let format = |points: &[Point2]| {
        points
            .iter()
            .map(|p| format!("({:.3}, {:.3})", p.x(), p.y()))
            .collect::<Vec<_>>()
            .join(" -> ")
    };
    debug!(%kind, xy = %format(before), uv = %format(after), "控制几何已变换");
}

/// 完整的一次映射：求范围、推导映射，再逐条实现非构造曲线。
pub fn map_sketch<E: SurfaceEvaluator + ?Sized>(
    sketch: &Sketch,
    evaluator: &E,
    options: MappingOptions,
) -> Result<RealizeReport, MappingError> {
    let realizer = CurveRealizer::for_sketch(evaluator, sketch, options)?;
    Ok(realizer.realize_sketch(sketch))
}
