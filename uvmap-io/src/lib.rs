use std::convert::TryFrom;
use std::f64::consts::PI;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use uvmap_core::{
    curve::{Arc2, NurbsCurve2, NurbsCurve3},
    geometry::Point2,
    sketch::Sketch,
};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait SketchLoader {
    fn load(&self, path: &Path) -> Result<Sketch, IoError>;
}

pub trait CurveSaver {
    fn save(&self, curves: &[NurbsCurve3], path: &Path) -> Result<(), IoError>;
}

/// 从 DXF 的 ENTITIES 段读取源草图。位于构造图层上的曲线被标记为构造线。
#[derive(Debug, Clone, Default)]
pub struct DxfSketchLoader {
    construction_layers: Vec<String>,
}

impl DxfSketchLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_construction_layers<I, S>(layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            construction_layers: layers.into_iter().map(Into::into).collect(),
        }
    }

    /// 解析内存中的 DXF 文本，`name` 作为草图名称。
    pub fn parse_str(&self, name: &str, source: &str) -> Result<Sketch, IoError> {
        let parser = DxfParser::new(source, &self.construction_layers);
        parser.parse(name).map_err(IoError::from)
    }
}

impl SketchLoader for DxfSketchLoader {
    fn load(&self, path: &Path) -> Result<Sketch, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Sketch".to_string());
        let sketch = self.parse_str(&name, &data)?;
        info!(
            path = %path.display(),
            curves = sketch.curves().count(),
            points = sketch.points().count(),
            "已加载草图"
        );
        Ok(sketch)
    }
}

/// 把实现后的三维曲线写成 SPLINE 实体，全部放在同一图层。
#[derive(Debug, Clone)]
pub struct DxfCurveWriter {
    layer: String,
}

impl DxfCurveWriter {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
        }
    }

    #[inline]
    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn to_dxf_string(&self, curves: &[NurbsCurve3]) -> String {
        let mut out = String::new();
        push_pair(&mut out, 0, "SECTION");
        push_pair(&mut out, 2, "ENTITIES");
        for curve in curves {
            self.write_spline(&mut out, curve);
        }
        push_pair(&mut out, 0, "ENDSEC");
        push_pair(&mut out, 0, "EOF");
        out
    }

    fn write_spline(&self, out: &mut String, curve: &NurbsCurve3) {
        let mut flags = 0;
        if curve.periodic {
            flags |= 0x02;
        }
        if curve.is_rational() {
            flags |= 0x04;
        }

        push_pair(out, 0, "SPLINE");
        push_pair(out, 8, &self.layer);
        push_pair(out, 70, flags);
        push_pair(out, 71, curve.degree);
        push_pair(out, 72, curve.knots.len());
        push_pair(out, 73, curve.control_points.len());
        push_pair(out, 74, 0);
        for knot in &curve.knots {
            push_pair(out, 40, knot);
        }
        if let Some(weights) = &curve.weights {
            for weight in weights {
                push_pair(out, 41, weight);
            }
        }
        for point in &curve.control_points {
            push_pair(out, 10, point.x());
            push_pair(out, 20, point.y());
            push_pair(out, 30, point.z());
        }
    }
}

impl CurveSaver for DxfCurveWriter {
    fn save(&self, curves: &[NurbsCurve3], path: &Path) -> Result<(), IoError> {
        fs::write(path, self.to_dxf_string(curves)).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), curves = curves.len(), layer = %self.layer, "已写出曲线");
        Ok(())
    }
}

fn push_pair(out: &mut String, code: i32, value: impl Display) {
    out.push_str(&format!("{code}\n{value}\n"));
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
    construction_layers: &'a [String],
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str, construction_layers: &'a [String]) -> Self {
        Self {
            reader: DxfReader::new(source),
            construction_layers,
        }
    }

    fn parse(mut self, name: &str) -> Result<Sketch, DxfError> {
        let mut sketch = Sketch::new(name);
        while let Some((code, value)) = self.reader.next_pair()? {
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.as_str() {
                "SECTION" => {
                    let (name_code, section) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match section.as_str() {
                        "ENTITIES" => self.parse_entities(&mut sketch)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(sketch)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, sketch: &mut Sketch) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            let index = match value.as_str() {
                "ENDSEC" => break,
                "LINE" => {
                    let (layer, start, end) = self.parse_line()?;
                    Some((sketch.add_line(start, end, &layer), layer))
                }
                "ARC" => {
                    let (layer, arc) = self.parse_arc()?;
                    Some((sketch.add_arc(arc, &layer), layer))
                }
                "SPLINE" => {
                    let (layer, curve, fit_points) = self.parse_spline()?;
                    Some((sketch.add_fitted_spline(curve, fit_points, &layer), layer))
                }
                "POINT" => {
                    sketch.add_point(self.parse_point()?);
                    None
                }
                other => {
                    debug!(entity = other, "跳过不参与映射的实体");
                    self.skip_entity_body()?;
                    None
                }
            };

            if let Some((index, layer)) = index {
                if self.is_construction_layer(&layer) {
                    sketch.set_construction(index, true);
                }
            }
        }
        Ok(())
    }

    fn is_construction_layer(&self, layer: &str) -> bool {
        self.construction_layers
            .iter()
            .any(|name| name.eq_ignore_ascii_case(layer))
    }

    fn parse_line(&mut self) -> Result<(String, Point2, Point2), DxfError> {
        let mut layer = None;
        let mut start_x = None;
        let mut start_y = None;
        let mut end_x = None;
        let mut end_y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => assign_coord(&mut start_x, &value, "LINE 起点 X（组码 10）")?,
                    20 => assign_coord(&mut start_y, &value, "LINE 起点 Y（组码 20）")?,
                    11 => assign_coord(&mut end_x, &value, "LINE 终点 X（组码 11）")?,
                    21 => assign_coord(&mut end_y, &value, "LINE 终点 Y（组码 21）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
        let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
        let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
        let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;
        Ok((layer, Point2::new(sx, sy), Point2::new(ex, ey)))
    }

    fn parse_arc(&mut self) -> Result<(String, Arc2), DxfError> {
        let mut layer = None;
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        let mut normal = [None; 3];
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    210 => assign_coord(&mut normal[0], &value, "ARC 拉伸方向 X（组码 210）")?,
                    220 => assign_coord(&mut normal[1], &value, "ARC 拉伸方向 Y（组码 220）")?,
                    230 => assign_coord(&mut normal[2], &value, "ARC 拉伸方向 Z（组码 230）")?,
                    10 => assign_coord(&mut center_x, &value, "ARC 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "ARC 圆心 Y（组码 20）")?,
                    40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                    50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                    51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
        let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;

        let start_angle = start_angle.to_radians();
        let end_angle = end_angle.to_radians();

        // DXF 圆弧角度以度为单位，在 OCS 中自起始角逆时针到终止角
        let arc = match arc_extrusion(normal)? {
            Extrusion::PositiveZ => {
                Arc2::from_angles(Point2::new(cx, cy), radius, start_angle, end_angle)
            }
            // 法向为 -Z 时 OCS 的 X 轴为 -X：圆心 X 取反，角度镜像且方向反转
            Extrusion::NegativeZ => Arc2::from_angles(
                Point2::new(-cx, cy),
                radius,
                PI - end_angle,
                PI - start_angle,
            ),
        };
        Ok((layer, arc))
    }

    fn parse_spline(&mut self) -> Result<(String, NurbsCurve2, Vec<Point2>), DxfError> {
        let mut layer = None;
        let mut flags: i16 = 0;
        let mut degree: Option<i16> = None;
        let mut knots: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        let mut control_points: Vec<Point2> = Vec::new();
        let mut fit_points: Vec<Point2> = Vec::new();
        let mut pending_control_x: Option<f64> = None;
        let mut pending_fit_x: Option<f64> = None;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    70 => flags = parse_i16(&value, "SPLINE 类型标志（组码 70）")?,
                    71 => {
                        if degree.is_some() {
                            return Err(DxfError::invalid("SPLINE 遇到重复的阶数（组码 71）"));
                        }
                        degree = Some(parse_i16(&value, "SPLINE 阶数（组码 71）")?);
                    }
                    40 => knots.push(parse_f64(&value, "SPLINE 节点值（组码 40）")?),
                    41 => weights.push(parse_f64(&value, "SPLINE 权重（组码 41）")?),
                    10 => {
                        if pending_control_x
                            .replace(parse_f64(&value, "SPLINE 控制点 X（组码 10）")?)
                            .is_some()
                        {
                            return Err(DxfError::invalid(
                                "SPLINE 控制点 X（组码 10）在未提供 Y 之前重复出现",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "SPLINE 控制点 Y（组码 20）")?;
                        let x = pending_control_x.take().ok_or_else(|| {
                            DxfError::invalid("SPLINE 控制点 Y（组码 20）缺少对应的 X")
                        })?;
                        control_points.push(Point2::new(x, y));
                    }
                    11 => {
                        if pending_fit_x
                            .replace(parse_f64(&value, "SPLINE 拟合点 X（组码 11）")?)
                            .is_some()
                        {
                            return Err(DxfError::invalid(
                                "SPLINE 拟合点 X（组码 11）在未提供 Y 之前重复出现",
                            ));
                        }
                    }
                    21 => {
                        let y = parse_f64(&value, "SPLINE 拟合点 Y（组码 21）")?;
                        let x = pending_fit_x.take().ok_or_else(|| {
                            DxfError::invalid("SPLINE 拟合点 Y（组码 21）缺少对应的 X")
                        })?;
                        fit_points.push(Point2::new(x, y));
                    }
                    // 计数（72/73/74）由实际读到的数据决定
                    _ => {}
                },
                None => return Err(DxfError::invalid("SPLINE 未正确结束")),
            }
        }

        if let Some(x) = pending_control_x {
            return Err(DxfError::invalid(format!(
                "SPLINE 控制点 X={x} 缺少对应的 Y（组码 20）"
            )));
        }
        if let Some(x) = pending_fit_x {
            return Err(DxfError::invalid(format!(
                "SPLINE 拟合点 X={x} 缺少对应的 Y（组码 21）"
            )));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let degree = degree.ok_or_else(|| DxfError::invalid("SPLINE 缺少阶数（组码 71）"))?;
        let degree = usize::try_from(degree)
            .map_err(|_| DxfError::invalid(format!("SPLINE 阶数 {degree} 无效")))?;
        if control_points.is_empty() {
            if fit_points.is_empty() {
                return Err(DxfError::invalid("SPLINE 缺少控制点（组码 10/20）"));
            }
            return Err(DxfError::unsupported("仅含拟合点的 SPLINE"));
        }

        let periodic = flags & 0x02 != 0;
        let rational = flags & 0x04 != 0 || weights.iter().any(|w| (w - 1.0).abs() > 1e-12);
        if knots.is_empty() {
            knots = clamped_uniform_knots(control_points.len(), degree);
        }
        let weights = if !rational {
            None
        } else if weights.is_empty() {
            Some(vec![1.0; control_points.len()])
        } else {
            Some(weights)
        };

        let curve = NurbsCurve2::new(control_points, degree, knots, weights, periodic)
            .map_err(|err| DxfError::invalid(format!("SPLINE 结构无效: {err}")))?;
        Ok((layer, curve, fit_points))
    }

    fn parse_point(&mut self) -> Result<Point2, DxfError> {
        let mut x = None;
        let mut y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    10 => assign_coord(&mut x, &value, "POINT X（组码 10）")?,
                    20 => assign_coord(&mut y, &value, "POINT Y（组码 20）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("POINT 未正确结束")),
            }
        }
        let x = x.ok_or_else(|| DxfError::invalid("POINT 缺少 X（组码 10）"))?;
        let y = y.ok_or_else(|| DxfError::invalid("POINT 缺少 Y（组码 20）"))?;
        Ok(Point2::new(x, y))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// 首尾各重复 `degree + 1` 次的均匀节点向量。
fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let spans = count.saturating_sub(degree).max(1);
    let mut knots = vec![0.0; degree + 1];
    knots.extend((1..spans).map(|i| i as f64 / spans as f64));
    knots.extend(std::iter::repeat_n(1.0, degree + 1));
    knots
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim().to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

const EXTRUSION_TOLERANCE: f64 = 1e-9;

enum Extrusion {
    PositiveZ,
    NegativeZ,
}

/// 草图位于 XY 平面，只接受沿 ±Z 的拉伸方向；缺省为 +Z。
fn arc_extrusion(normal: [Option<f64>; 3]) -> Result<Extrusion, DxfError> {
    let [x, y, z] = normal;
    let (x, y, z) = (x.unwrap_or(0.0), y.unwrap_or(0.0), z.unwrap_or(1.0));
    let length = (x * x + y * y + z * z).sqrt();
    if !length.is_finite() || length <= EXTRUSION_TOLERANCE {
        return Err(DxfError::invalid("ARC 拉伸方向长度为零"));
    }
    if (x / length).abs() > EXTRUSION_TOLERANCE || (y / length).abs() > EXTRUSION_TOLERANCE {
        return Err(DxfError::unsupported(format!(
            "ARC 拉伸方向 ({x}, {y}, {z}) 不在 Z 轴上"
        )));
    }
    Ok(if z > 0.0 {
        Extrusion::PositiveZ
    } else {
        Extrusion::NegativeZ
    })
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = raw
        .trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}
