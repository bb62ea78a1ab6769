use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dxftext_config::AppConfig;
use dxftext_engine::{
    ConversionStats, Converter, FontRequest, Projector, StringFilter, resolve_font,
};
use dxftext_io::{DocumentLoader, DxfFacade, FeatureSaver, GeoJsonWriter};
use tracing::info;

use crate::cli::Cli;

/// 命令行与配置合并后的转换参数，命令行优先。
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub font: FontRequest,
    pub source_crs: String,
    pub exclude_strings: Vec<String>,
    pub tolerance_em: f64,
    pub pretty: bool,
}

impl ConversionSettings {
    pub fn resolve(cli: &Cli, config: &AppConfig) -> Self {
        Self {
            input: cli.input.clone(),
            output: cli.output.clone(),
            font: FontRequest {
                path: Some(cli.font.clone()),
                default_font: config.fonts.default_font.clone(),
                fallback_families: config.fonts.fallback_families.clone(),
            },
            source_crs: cli
                .source_crs
                .clone()
                .unwrap_or_else(|| config.conversion.source_crs.clone()),
            exclude_strings: cli
                .exclude_strings
                .clone()
                .unwrap_or_else(|| config.conversion.exclude_strings.clone()),
            tolerance_em: config.conversion.tolerance_em,
            pretty: config.conversion.pretty && !cli.compact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub stats: ConversionStats,
    pub warnings: usize,
    pub font: Option<String>,
    pub output: PathBuf,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "records: {}, excluded: {}, characters: {}, warnings: {}, output: {}",
            self.stats.records,
            self.stats.excluded,
            self.stats.characters,
            self.warnings,
            self.output.display()
        )?;
        if let Some(font) = &self.font {
            write!(f, ", font: {font}")?;
        }
        Ok(())
    }
}

/// 读取 DXF、转换并写出 GeoJSON。任何致命错误都带上阶段上下文返回。
pub fn run(settings: &ConversionSettings) -> Result<Summary> {
    let projector = Projector::new(&settings.source_crs)
        .with_context(|| format!("无法建立源坐标系 {} 的投影", settings.source_crs))?;

    let document = DxfFacade::new()
        .load(&settings.input)
        .with_context(|| format!("读取 DXF 文件 {} 失败", settings.input.display()))?;
    info!(
        path = %settings.input.display(),
        entities = document.entities().count(),
        blocks = document.blocks().count(),
        "DXF loaded"
    );

    let filter = StringFilter::new(settings.exclude_strings.iter().cloned());
    let mut converter = Converter::new(filter, &projector, settings.tolerance_em);
    let output = converter
        .convert(&document, |diagnostics| resolve_font(&settings.font, diagnostics))
        .context("文字转换失败")?;

    GeoJsonWriter::with_pretty(settings.pretty)
        .save(&output.features, &settings.output)
        .with_context(|| format!("写出 GeoJSON 文件 {} 失败", settings.output.display()))?;
    info!(
        path = %settings.output.display(),
        features = output.features.len(),
        "GeoJSON written"
    );

    Ok(Summary {
        stats: output.stats,
        warnings: output.diagnostics.len(),
        font: output.font,
        output: settings.output.clone(),
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["dxftext", "--input", "in.dxf", "--output", "out.geojson", "--font", "f.ttf"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn config_supplies_defaults() {
        let settings = ConversionSettings::resolve(&cli(&[]), &AppConfig::default());
        assert_eq!(settings.source_crs, "EPSG:27700");
        assert_eq!(settings.exclude_strings, vec!["0", "0.0"]);
        assert!(settings.pretty);
        assert_eq!(settings.font.path, Some(PathBuf::from("f.ttf")));
        assert_eq!(settings.font.fallback_families, vec!["sans-serif"]);
    }

    #[test]
    fn command_line_overrides_config() {
        let settings = ConversionSettings::resolve(
            &cli(&["--source-crs", "EPSG:4326", "--exclude-strings", "--compact"]),
            &AppConfig::default(),
        );
        assert_eq!(settings.source_crs, "EPSG:4326");
        assert!(settings.exclude_strings.is_empty());
        assert!(!settings.pretty);
    }
}
