use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use uvmap_config::{AppConfig, SurfaceConfig};
use uvmap_core::geometry::{Bounds2D, Point2, Point3, Vector3};
use uvmap_engine::errors::MappingError;
use uvmap_engine::evaluator::SampledEvaluator;
use uvmap_engine::mapper::MappingOptions;
use uvmap_engine::realizer::{RealizeReport, map_sketch, output_name};
use uvmap_engine::surface::{CylinderSurface, PlaneSurface, Surface};
use uvmap_io::{CurveSaver, DxfCurveWriter, DxfSketchLoader, IoError, SketchLoader};

/// 一次映射运行的输入输出。
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub options: MappingOptions,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub output: PathBuf,
    pub label: String,
    pub report: RealizeReport,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("mapping aborted: {0}")]
    Mapping(#[from] MappingError),
    #[error("failed to write report {path:?}: {message}")]
    Report { path: PathBuf, message: String },
}

pub fn build_surface(config: &SurfaceConfig) -> Box<dyn Surface> {
    match config {
        SurfaceConfig::Plane {
            origin,
            u_axis,
            v_axis,
            u_range,
            v_range,
        } => Box::new(PlaneSurface::new(
            point3(*origin),
            Vector3::new(u_axis[0], u_axis[1], u_axis[2]),
            Vector3::new(v_axis[0], v_axis[1], v_axis[2]),
            Bounds2D::new(
                Point2::new(u_range[0], v_range[0]),
                Point2::new(u_range[1], v_range[1]),
            ),
        )),
        SurfaceConfig::Cylinder {
            origin,
            radius,
            height,
        } => Box::new(CylinderSurface::new(point3(*origin), *radius, *height)),
    }
}

fn point3(raw: [f64; 3]) -> Point3 {
    Point3::new(raw[0], raw[1], raw[2])
}

/// 未指定输出路径时写到输入文件旁：`<stem>_uv.dxf` 或 `<stem>_vu.dxf`。
pub fn default_output_path(input: &Path, swap_uv: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sketch".to_string());
    let suffix = if swap_uv { "vu" } else { "uv" };
    input.with_file_name(format!("{stem}_{suffix}.dxf"))
}

pub fn run(config: &AppConfig, request: &RunRequest) -> Result<RunOutcome, PipelineError> {
    let loader = DxfSketchLoader::with_construction_layers(&config.input.construction_layers);
    let sketch = loader.load(&request.input)?;

    let evaluator = SampledEvaluator::new(build_surface(&config.surface))
        .with_samples(config.sampling.samples_per_curve)
        .with_tolerance(config.sampling.domain_tolerance);
    let report = map_sketch(&sketch, &evaluator, request.options)?;

    for failure in &report.failures {
        warn!(
            index = failure.index,
            kind = %failure.kind,
            error = %failure.error,
            "曲线未能映射"
        );
    }

    let label = output_name(&sketch.name, request.options.swap_uv);
    let output = request
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&request.input, request.options.swap_uv));
    let curves: Vec<_> = report.curves().cloned().collect();
    DxfCurveWriter::new(label.clone()).save(&curves, &output)?;

    if let Some(path) = &request.report {
        write_report(path, &report)?;
    }

    info!(
        output = %output.display(),
        label = %label,
        curves = curves.len(),
        failures = report.failures.len(),
        "映射结果已保存"
    );
    Ok(RunOutcome {
        output,
        label,
        report,
    })
}

fn write_report(path: &Path, report: &RealizeReport) -> Result<(), PipelineError> {
    let to_error = |message: String| PipelineError::Report {
        path: path.to_path_buf(),
        message,
    };
    let json =
        serde_json::to_string_pretty(&report.summary()).map_err(|err| to_error(err.to_string()))?;
    fs::write(path, json).map_err(|err| to_error(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKETCH: &str = "0\nSECTION\n2\nENTITIES\n\
0\nLINE\n8\n0\n10\n0\n20\n0\n11\n10\n21\n5\n\
0\nARC\n8\n0\n10\n5\n20\n2.5\n40\n2\n50\n0\n51\n180\n\
0\nLINE\n8\nCONSTRUCTION\n10\n0\n20\n5\n11\n10\n21\n0\n\
0\nENDSEC\n0\nEOF\n";

    fn write_sketch(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("write sketch");
        path
    }

    #[test]
    fn default_output_sits_next_to_input() {
        let input = Path::new("/tmp/drawings/Sketch1.dxf");
        assert_eq!(
            default_output_path(input, false),
            PathBuf::from("/tmp/drawings/Sketch1_uv.dxf")
        );
        assert_eq!(
            default_output_path(input, true),
            PathBuf::from("/tmp/drawings/Sketch1_vu.dxf")
        );
    }

    #[test]
    fn run_writes_curves_and_report() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = write_sketch(dir.path(), "Sketch1.dxf", SKETCH);
        let report_path = dir.path().join("report.json");
        let request = RunRequest {
            input,
            output: None,
            report: Some(report_path.clone()),
            options: MappingOptions::default(),
        };

        let outcome = run(&AppConfig::default(), &request).expect("run pipeline");
        assert_eq!(outcome.label, "UV from Sketch1");
        assert_eq!(outcome.output, dir.path().join("Sketch1_uv.dxf"));
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.report.groups.len(), 2);

        let written = fs::read_to_string(&outcome.output).expect("read output");
        assert_eq!(written.lines().filter(|line| *line == "SPLINE").count(), 2);
        assert!(written.contains("UV from Sketch1"));

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(report_path).expect("read report"))
                .expect("parse report");
        assert_eq!(summary["counters"]["lines"], 1);
        assert_eq!(summary["counters"]["arcs"], 1);
        assert_eq!(summary["cancelled"], false);
    }

    #[test]
    fn degenerate_sketch_writes_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = write_sketch(
            dir.path(),
            "flat.dxf",
            "0\nSECTION\n2\nENTITIES\n0\nLINE\n10\n0\n20\n1\n11\n4\n21\n1\n0\nENDSEC\n0\nEOF\n",
        );
        let output = dir.path().join("out.dxf");
        let request = RunRequest {
            input,
            output: Some(output.clone()),
            report: None,
            options: MappingOptions {
                swap_uv: true,
                verbose: false,
            },
        };

        let err = run(&AppConfig::default(), &request).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Mapping(MappingError::DegenerateExtent { .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn plane_surface_from_config() {
        let surface = build_surface(&SurfaceConfig::Plane {
            origin: [0.0, 0.0, 1.0],
            u_axis: [1.0, 0.0, 0.0],
            v_axis: [0.0, 1.0, 0.0],
            u_range: [0.0, 2.0],
            v_range: [0.0, 3.0],
        });
        assert!(surface.is_planar());
        assert!((surface.domain().width() - 2.0).abs() < 1e-12);
        let p = surface.point_at(Point2::new(1.0, 1.0));
        assert!(p.distance(Point3::new(1.0, 1.0, 1.0)) < 1e-12);
    }
}
