use std::path::PathBuf;

use clap::Parser;

/// 将 DXF 中的文字转换为 WGS84 下的逐字符轮廓多边形（GeoJSON）。
#[derive(Debug, Parser)]
#[command(name = "dxftext", version, about)]
pub struct Cli {
    /// 输入 DXF 文件
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// 输出 GeoJSON 文件
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// TrueType/OpenType 字体文件，不可用时按配置回退
    #[arg(long, value_name = "PATH")]
    pub font: PathBuf,

    /// 源坐标系，如 EPSG:27700 或 +proj= 定义串
    #[arg(long = "source-crs", alias = "source_crs", value_name = "CRS")]
    pub source_crs: Option<String>,

    /// 需要整串排除的文字，可给出零个或多个
    #[arg(
        long = "exclude-strings",
        alias = "exclude_strings",
        value_name = "TEXT",
        num_args = 0..,
        allow_negative_numbers = true
    )]
    pub exclude_strings: Option<Vec<String>>,

    /// 配置文件，缺省时读取 DXFTEXT_CONFIG 或 ./config/default.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 日志过滤表达式（EnvFilter 语法），覆盖配置中的等级
    #[arg(long = "log-level", value_name = "FILTER")]
    pub log_level: Option<String>,

    /// 输出紧凑 JSON
    #[arg(long)]
    pub compact: bool,
}
