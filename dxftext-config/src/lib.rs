use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 未显式指定源坐标系时使用的 CRS（英国国家格网）。
pub const DEFAULT_SOURCE_CRS: &str = "EPSG:27700";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub fonts: FontConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `DXFTEXT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("DXFTEXT_CONFIG") {
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
}

/// 日志配置，支持设置默认等级（`EnvFilter` 语法）。
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

/// 转换流程的默认参数，命令行参数优先于这里的值。
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "ConversionConfig::default_source_crs")]
    pub source_crs: String,
    #[serde(default = "ConversionConfig::default_exclude_strings")]
    pub exclude_strings: Vec<String>,
    /// 曲线展平容差，以 em 为单位（实际容差 = 容差 × units-per-em）。
    #[serde(default = "ConversionConfig::default_tolerance_em")]
    pub tolerance_em: f64,
    #[serde(default = "ConversionConfig::default_pretty")]
    pub pretty: bool,
}

impl ConversionConfig {
    fn default_source_crs() -> String {
        DEFAULT_SOURCE_CRS.to_string()
    }

    fn default_exclude_strings() -> Vec<String> {
        vec!["0".to_string(), "0.0".to_string()]
    }

    fn default_tolerance_em() -> f64 {
        0.001
    }

    fn default_pretty() -> bool {
        true
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            source_crs: Self::default_source_crs(),
            exclude_strings: Self::default_exclude_strings(),
            tolerance_em: Self::default_tolerance_em(),
            pretty: Self::default_pretty(),
        }
    }
}

/// 字体回退设置：指定字体不可用时先尝试 `default_font`，再按字族查询系统字体。
#[derive(Debug, Clone, Deserialize)]
pub struct FontConfig {
    #[serde(default)]
    pub default_font: Option<PathBuf>,
    #[serde(default = "FontConfig::default_fallback_families")]
    pub fallback_families: Vec<String>,
}

impl FontConfig {
    fn default_fallback_families() -> Vec<String> {
        vec!["sans-serif".to_string()]
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            default_font: None,
            fallback_families: Self::default_fallback_families(),
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

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.conversion.source_crs, "EPSG:27700");
        assert_eq!(cfg.conversion.exclude_strings, vec!["0", "0.0"]);
        assert!((cfg.conversion.tolerance_em - 0.001).abs() < f64::EPSILON);
        assert!(cfg.conversion.pretty);
        assert!(cfg.fonts.default_font.is_none());
        assert_eq!(cfg.fonts.fallback_families, vec!["sans-serif"]);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [conversion]
            source_crs = "EPSG:32631"
            exclude_strings = []
            tolerance_em = 0.01
            pretty = false

            [fonts]
            default_font = "/usr/share/fonts/custom.ttf"
            fallback_families = ["DejaVu Sans", "monospace"]
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.conversion.source_crs, "EPSG:32631");
        assert!(cfg.conversion.exclude_strings.is_empty());
        assert!((cfg.conversion.tolerance_em - 0.01).abs() < f64::EPSILON);
        assert!(!cfg.conversion.pretty);
        assert_eq!(
            cfg.fonts
                .default_font
                .as_deref()
                .map(|p| p.to_string_lossy().to_string()),
            Some("/usr/share/fonts/custom.ttf".to_string())
        );
        assert_eq!(cfg.fonts.fallback_families.len(), 2);
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [conversion]
            source_crs = "EPSG:4326"
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.conversion.source_crs, "EPSG:4326");
        assert_eq!(cfg.conversion.exclude_strings, vec!["0", "0.0"]);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[conversion\nsource_crs = 1").unwrap();
        let err = AppConfig::from_file(file.path()).expect_err("invalid toml");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
