use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub input: InputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `UVMAP_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("UVMAP_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.samples_per_curve < 2 {
            return Err(ConfigError::Invalid(format!(
                "sampling.samples_per_curve 至少为 2，当前为 {}",
                self.sampling.samples_per_curve
            )));
        }
        if !self.sampling.domain_tolerance.is_finite() || self.sampling.domain_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "sampling.domain_tolerance 必须为非负有限数".to_string(),
            ));
        }
        self.surface.validate()
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub swap_uv: bool,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "SamplingConfig::default_samples")]
    pub samples_per_curve: usize,
    #[serde(default = "SamplingConfig::default_tolerance")]
    pub domain_tolerance: f64,
}

impl SamplingConfig {
    fn default_samples() -> usize {
        64
    }

    fn default_tolerance() -> f64 {
        1e-9
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples_per_curve: Self::default_samples(),
            domain_tolerance: Self::default_tolerance(),
        }
    }
}

/// 目标曲面，按 `kind` 区分。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SurfaceConfig {
    Plane {
        #[serde(default = "SurfaceConfig::default_origin")]
        origin: [f64; 3],
        #[serde(default = "SurfaceConfig::default_u_axis")]
        u_axis: [f64; 3],
        #[serde(default = "SurfaceConfig::default_v_axis")]
        v_axis: [f64; 3],
        #[serde(default = "SurfaceConfig::default_range")]
        u_range: [f64; 2],
        #[serde(default = "SurfaceConfig::default_range")]
        v_range: [f64; 2],
    },
    Cylinder {
        #[serde(default = "SurfaceConfig::default_origin")]
        origin: [f64; 3],
        #[serde(default = "SurfaceConfig::default_radius")]
        radius: f64,
        #[serde(default = "SurfaceConfig::default_height")]
        height: f64,
    },
}

impl SurfaceConfig {
    fn default_origin() -> [f64; 3] {
        [0.0, 0.0, 0.0]
    }

    fn default_u_axis() -> [f64; 3] {
        [1.0, 0.0, 0.0]
    }

    fn default_v_axis() -> [f64; 3] {
        [0.0, 1.0, 0.0]
    }

    fn default_range() -> [f64; 2] {
        [0.0, 1.0]
    }

    fn default_radius() -> f64 {
        10.0
    }

    fn default_height() -> f64 {
        20.0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SurfaceConfig::Plane {
                u_range, v_range, ..
            } => {
                if u_range[0] > u_range[1] || v_range[0] > v_range[1] {
                    return Err(ConfigError::Invalid(
                        "平面参数范围的下限不能大于上限".to_string(),
                    ));
                }
                Ok(())
            }
            SurfaceConfig::Cylinder { radius, height, .. } => {
                if !(*radius > 0.0) || !(*height > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "圆柱半径与高度必须为正数，当前为 radius={radius}, height={height}"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        SurfaceConfig::Cylinder {
            origin: Self::default_origin(),
            radius: Self::default_radius(),
            height: Self::default_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "InputConfig::default_construction_layers")]
    pub construction_layers: Vec<String>,
}

impl InputConfig {
    fn default_construction_layers() -> Vec<String> {
        vec!["CONSTRUCTION".to_string()]
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            construction_layers: Self::default_construction_layers(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置无效: {0}")]
    Invalid(String),
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.mapping.swap_uv);
        assert!(!cfg.mapping.verbose);
        assert_eq!(cfg.sampling.samples_per_curve, 64);
        assert_eq!(
            cfg.surface,
            SurfaceConfig::Cylinder {
                origin: [0.0, 0.0, 0.0],
                radius: 10.0,
                height: 20.0
            }
        );
        assert_eq!(cfg.input.construction_layers, vec!["CONSTRUCTION"]);
    }

    #[test]
    fn load_from_temp_file() {
        let file = write_config(
            r#"
            [logging]
            level = "debug"

            [mapping]
            swap_uv = true

            [sampling]
            samples_per_curve = 128

            [surface]
            kind = "plane"
            u_range = [0.0, 2.0]
            v_range = [-1.0, 1.0]

            [input]
            construction_layers = ["AUX", "REF"]
            "#,
        );

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.mapping.swap_uv);
        assert!(!cfg.mapping.verbose);
        assert_eq!(cfg.sampling.samples_per_curve, 128);
        assert_eq!(cfg.sampling.domain_tolerance, 1e-9);
        match cfg.surface {
            SurfaceConfig::Plane {
                origin,
                u_axis,
                u_range,
                v_range,
                ..
            } => {
                assert_eq!(origin, [0.0, 0.0, 0.0]);
                assert_eq!(u_axis, [1.0, 0.0, 0.0]);
                assert_eq!(u_range, [0.0, 2.0]);
                assert_eq!(v_range, [-1.0, 1.0]);
            }
            other => panic!("expected plane, got {other:?}"),
        }
        assert_eq!(cfg.input.construction_layers, vec!["AUX", "REF"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config(
            r#"
            [surface]
            kind = "cylinder"
            radius = 0.0
            "#,
        );
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let file = write_config(
            r#"
            [sampling]
            samples_per_curve = 1
            "#,
        );
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_surface_kind_fails_to_parse() {
        let file = write_config(
            r#"
            [surface]
            kind = "torus"
            "#,
        );
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
