use std::mem;

use uvmap_core::curve::{NurbsCurve3, ParametricCurve};
use uvmap_core::geometry::{Bounds2D, Point2, Point3};

use crate::errors::EvaluatorError;
use crate::surface::Surface;

pub const DEFAULT_SAMPLES_PER_CURVE: usize = 64;
pub const DEFAULT_DOMAIN_TOLERANCE: f64 = 1e-9;

/// 求值器返回的三维曲线段，表示形式不一，统一经 `into_nurbs` 归一。
#[derive(Debug, Clone, PartialEq)]
pub enum ModelCurve {
    Line { start: Point3, end: Point3 },
    Polyline(Vec<Point3>),
    Nurbs(NurbsCurve3),
}

impl ModelCurve {
    pub fn into_nurbs(self) -> NurbsCurve3 {
        match self {
            ModelCurve::Line { start, end } => NurbsCurve3::from_line(start, end),
            ModelCurve::Polyline(points) => NurbsCurve3::from_polyline(points),
            ModelCurve::Nurbs(curve) => curve,
        }
    }
}

/// 目标曲面的求值能力：提供参数域，并把二维参数曲线实现为曲面上的三维曲线。
/// 返回空集合表示曲线落在可表示区域之外。
pub trait SurfaceEvaluator {
    fn parametric_domain(&self) -> Bounds2D;

    fn project(&self, curve: &ParametricCurve) -> Result<Vec<ModelCurve>, EvaluatorError>;
}

/// 基于采样的求值器。平面上精确抬升；其他曲面按采样点折线实现，
/// 越出参数域处断开，周期方向跨过接缝时另起一段。
#[derive(Debug, Clone)]
pub struct SampledEvaluator<S> {
    surface: S,
    samples_per_curve: usize,
    domain_tolerance: f64,
}

impl<S: Surface> SampledEvaluator<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            samples_per_curve: DEFAULT_SAMPLES_PER_CURVE,
            domain_tolerance: DEFAULT_DOMAIN_TOLERANCE,
        }
    }

    pub fn with_samples(mut self, samples_per_curve: usize) -> Self {
        self.samples_per_curve = samples_per_curve.max(2);
        self
    }

    pub fn with_tolerance(mut self, domain_tolerance: f64) -> Self {
        self.domain_tolerance = domain_tolerance.abs();
        self
    }

    #[inline]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn exact_on_plane(&self, curve: &ParametricCurve) -> ModelCurve {
        let lift = |uv: Point2| self.surface.point_at(uv);
        match curve {
            ParametricCurve::Line { start, end } => ModelCurve::Line {
                start: lift(*start),
                end: lift(*end),
            },
            ParametricCurve::Arc(arc) => ModelCurve::Nurbs(arc.to_nurbs().lift(lift)),
            ParametricCurve::Nurbs(nurbs) => ModelCurve::Nurbs(nurbs.lift(lift)),
        }
    }

    /// 把参数点放进参数域：周期方向折回主周期，并返回所在周期序号。
    fn place(&self, raw: Point2, domain: &Bounds2D) -> Option<(Point2, i64)> {
        let tolerance = self.domain_tolerance;
        let (u, cell) = match self.surface.u_period() {
            Some(period) if period > 0.0 => {
                let offset = raw.x() - domain.min().x();
                if offset >= -tolerance && offset <= period + tolerance {
                    (raw.x(), 0)
                } else {
                    let cell = (offset / period).floor();
                    (raw.x() - cell * period, cell as i64)
                }
            }
            _ => (raw.x(), 0),
        };
        let uv = Point2::new(u, raw.y());
        domain.contains(uv, tolerance).then_some((uv, cell))
    }

    fn split_runs(&self, samples: &[Point2]) -> Vec<ModelCurve> {
        let domain = self.surface.domain();
        let mut segments = Vec::new();
        let mut run: Vec<Point3> = Vec::new();
        let mut previous: Option<(Point2, i64)> = None;

        for &raw in samples {
            let placed = self.place(raw, &domain);
            match (placed, previous) {
                (Some((uv, cell)), Some((prev_raw, prev_cell))) if cell != prev_cell => {
                    if let Some((closing, opening)) =
                        self.seam_points(prev_raw, prev_cell, raw, cell, &domain)
                    {
                        run.push(self.surface.point_at(closing));
                        flush_run(&mut run, &mut segments);
                        run.push(self.surface.point_at(opening));
                    } else {
                        flush_run(&mut run, &mut segments);
                    }
                    run.push(self.surface.point_at(uv));
                }
                (Some((uv, _)), _) => run.push(self.surface.point_at(uv)),
                (None, _) => flush_run(&mut run, &mut segments),
            }
            previous = placed.map(|(_, cell)| (raw, cell));
        }
        flush_run(&mut run, &mut segments);
        segments
    }

    /// 相邻周期之间的接缝点：分别以前一段和后一段的坐标表示。
    fn seam_points(
        &self,
        prev_raw: Point2,
        prev_cell: i64,
        raw: Point2,
        cell: i64,
        domain: &Bounds2D,
    ) -> Option<(Point2, Point2)> {
        let period = self.surface.u_period()?;
        if (cell - prev_cell).abs() != 1 {
            return None;
        }
        let seam = domain.min().x() + period * cell.max(prev_cell) as f64;
        let du = raw.x() - prev_raw.x();
        if du.abs() <= f64::EPSILON {
            return None;
        }
        let t = (seam - prev_raw.x()) / du;
        let v = prev_raw.y() + (raw.y() - prev_raw.y()) * t;
        let closing = Point2::new(seam - period * prev_cell as f64, v);
        let opening = Point2::new(seam - period * cell as f64, v);
        let tolerance = self.domain_tolerance;
        (domain.contains(closing, tolerance) && domain.contains(opening, tolerance))
            .then_some((closing, opening))
    }
}

impl<S: Surface> SurfaceEvaluator for SampledEvaluator<S> {
    fn parametric_domain(&self) -> Bounds2D {
        self.surface.domain()
    }

    fn project(&self, curve: &ParametricCurve) -> Result<Vec<ModelCurve>, EvaluatorError> {
        if let ParametricCurve::Nurbs(nurbs) = curve {
            nurbs.validate()?;
        }
        let samples = curve.sample(self.samples_per_curve);
        if samples.iter().any(|p| !p.is_finite()) {
            return Err(EvaluatorError::Surface(
                "curve produced non-finite parameters".to_string(),
            ));
        }

        let domain = self.surface.domain();
        if self.surface.is_planar()
            && samples
                .iter()
                .all(|p| domain.contains(*p, self.domain_tolerance))
        {
            return Ok(vec![self.exact_on_plane(curve)]);
        }
        Ok(self.split_runs(&samples))
    }
}

fn flush_run(run: &mut Vec<Point3>, segments: &mut Vec<ModelCurve>) {
    if run.len() >= 2 {
        segments.push(ModelCurve::Polyline(mem::take(run)));
    } else {
        run.clear();
    }
}
