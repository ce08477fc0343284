use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uvmap_config::{AppConfig, ConfigError};
use uvmap_engine::mapper::MappingOptions;

mod pipeline;

const USAGE: &str = "用法：uvmap-app [--config <path>] [--swap-uv] [--verbose] [--output <path>] [--report <path>] <sketch.dxf>";

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut swap_uv = false;
    let mut verbose = false;
    let mut output: Option<PathBuf> = None;
    let mut report: Option<PathBuf> = None;
    let mut input: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--swap-uv" => swap_uv = true,
            "--verbose" => verbose = true,
            "--config" | "--output" | "--report" => {
                let Some(path) = args.next() else {
                    eprintln!("`{arg}` 需要提供文件路径");
                    std::process::exit(1);
                };
                let slot = match arg.as_str() {
                    "--config" => &mut config_override,
                    "--output" => &mut output,
                    _ => &mut report,
                };
                *slot = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                return;
            }
            other if other.starts_with("--") => {
                eprintln!("未知参数：{other}");
                eprintln!("{USAGE}");
                std::process::exit(1);
            }
            other => {
                if input.replace(PathBuf::from(other)).is_some() {
                    eprintln!("只能指定一个草图文件");
                    std::process::exit(1);
                }
            }
        }
    }

    let Some(input) = input else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let mut config = load_configuration(config_override);
    config.mapping.swap_uv |= swap_uv;
    config.mapping.verbose |= verbose;
    if config.mapping.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config);
    info!(input = %input.display(), "启动 UV 映射");

    let request = pipeline::RunRequest {
        input,
        output,
        report,
        options: MappingOptions {
            swap_uv: config.mapping.swap_uv,
            verbose: config.mapping.verbose,
        },
    };
    match pipeline::run(&config, &request) {
        Ok(outcome) => {
            if !outcome.report.failures.is_empty() {
                warn!(
                    failures = outcome.report.failures.len(),
                    "部分曲线未能映射，结果不完整"
                );
            }
        }
        Err(err) => {
            error!(error = %err, "映射失败");
            std::process::exit(1);
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            eprintln!("加载指定配置 {} 失败，使用默认配置：{err}", path.display());
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        eprintln!("加载默认配置 {} 失败，使用内建默认值：{err}", path.display());
                    }
                    ConfigError::Invalid(_) | ConfigError::Context { .. } => {
                        eprintln!("加载默认配置失败，使用内建默认值：{err}");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
