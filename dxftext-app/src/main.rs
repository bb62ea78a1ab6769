use std::path::Path;

use clap::Parser;
use dxftext_config::{AppConfig, ConfigError};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod cli;
mod convert;

use cli::Cli;
use convert::ConversionSettings;

fn main() {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.as_deref());
    init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));
    info!(input = %cli.input.display(), "启动 dxftext");

    let settings = ConversionSettings::resolve(&cli, &config);
    match convert::run(&settings) {
        Ok(summary) => println!("{summary}"),
        Err(err) => {
            error!(error = %format!("{err:#}"), "转换失败");
            // 日志可能被 --log-level off 关闭，错误链总是直接写到 stderr
            eprintln!("错误: {err:#}");
            std::process::exit(1);
        }
    }
}

fn load_configuration(override_path: Option<&Path>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

/// 日志写到 stderr，stdout 只输出转换摘要。
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
