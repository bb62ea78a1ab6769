//! 源坐标系到 WGS84 的重投影，基于纯 Rust 的 proj4rs 与 crs-definitions 内置的 EPSG 定义。

use dxftext_core::feature::PlacedPolygon;
use dxftext_core::geometry::Point2;
use proj4rs::proj::Proj;
use thiserror::Error;
use tracing::debug;

/// 输出坐标系。
pub const TARGET_EPSG: u32 = 4326;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),
    #[error("Projection error: {0}")]
    Transform(String),
}

/// 转换器使用的坐标投影接口。
pub trait CoordinateProjection {
    /// 投影单个点，返回（经度, 纬度），单位为度。
    fn project(&self, point: Point2) -> Result<Point2, ProjectionError>;

    fn project_polygon(&self, polygon: &mut PlacedPolygon) -> Result<(), ProjectionError> {
        for part in polygon.parts.iter_mut() {
            for point in part.exterior.iter_mut() {
                *point = self.project(*point)?;
            }
            for hole in part.holes.iter_mut() {
                for point in hole.iter_mut() {
                    *point = self.project(*point)?;
                }
            }
        }
        Ok(())
    }
}

struct Transform {
    source: Proj,
    target: Proj,
    source_geographic: bool,
}

/// 源坐标系到 EPSG:4326 的投影。源坐标系本身为 EPSG:4326 时为恒等变换。
pub struct Projector {
    source_crs: String,
    transform: Option<Transform>,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("source_crs", &self.source_crs)
            .field("identity", &self.is_identity())
            .finish()
    }
}

impl Projector {
    /// 接受 `EPSG:<code>` 或以 `+proj=` 开头的 PROJ.4 定义串。
    pub fn new(source_crs: &str) -> Result<Self, ProjectionError> {
        let source_crs = source_crs.trim();
        if parse_epsg_code(source_crs) == Some(TARGET_EPSG) {
            debug!(crs = source_crs, "source CRS is WGS84, projection is identity");
            return Ok(Self {
                source_crs: source_crs.to_string(),
                transform: None,
            });
        }

        let source_definition = proj_definition(source_crs)?;
        let target_definition = epsg_definition(TARGET_EPSG)?;
        let source = Proj::from_proj_string(source_definition)
            .map_err(|err| ProjectionError::InvalidCrs(format!("{source_crs}: {err}")))?;
        let target = Proj::from_proj_string(target_definition)
            .map_err(|err| ProjectionError::InvalidCrs(format!("EPSG:{TARGET_EPSG}: {err}")))?;
        debug!(crs = source_crs, definition = source_definition, "projection initialised");

        Ok(Self {
            source_crs: source_crs.to_string(),
            transform: Some(Transform {
                source,
                target,
                source_geographic: is_geographic(source_definition),
            }),
        })
    }

    #[inline]
    pub fn source_crs(&self) -> &str {
        &self.source_crs
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.transform.is_none()
    }
}

impl CoordinateProjection for Projector {
    fn project(&self, point: Point2) -> Result<Point2, ProjectionError> {
        let Some(transform) = &self.transform else {
            return Ok(point);
        };

        let mut coordinate = if transform.source_geographic {
            (point.x().to_radians(), point.y().to_radians(), 0.0)
        } else {
            (point.x(), point.y(), 0.0)
        };
        proj4rs::transform::transform(&transform.source, &transform.target, &mut coordinate)
            .map_err(|err| {
                ProjectionError::Transform(format!(
                    "({}, {}) from {}: {err}",
                    point.x(),
                    point.y(),
                    self.source_crs
                ))
            })?;

        let (lon, lat) = (coordinate.0.to_degrees(), coordinate.1.to_degrees());
        if !lon.is_finite() || !lat.is_finite() {
            return Err(ProjectionError::Transform(format!(
                "({}, {}) from {} is outside the projection domain",
                point.x(),
                point.y(),
                self.source_crs
            )));
        }
        Ok(Point2::new(lon, lat))
    }
}

/// 从 `EPSG:<code>` 形式的字符串中取出代码（大小写不敏感）。
pub fn parse_epsg_code(crs: &str) -> Option<u32> {
    let crs = crs.trim();
    let prefix = crs.get(..5)?;
    if prefix.eq_ignore_ascii_case("EPSG:") {
        crs[5..].trim().parse::<u32>().ok()
    } else {
        None
    }
}

fn proj_definition(crs: &str) -> Result<&str, ProjectionError> {
    if crs.starts_with("+proj=") || crs.starts_with("+init=") {
        return Ok(crs);
    }
    match parse_epsg_code(crs) {
        Some(code) => epsg_definition(code),
        None => Err(ProjectionError::InvalidCrs(format!(
            "{crs}: expected EPSG:<code> or a +proj= definition"
        ))),
    }
}

fn epsg_definition(code: u32) -> Result<&'static str, ProjectionError> {
    u16::try_from(code)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|definition| definition.proj4)
        .filter(|proj4| !proj4.is_empty())
        .ok_or_else(|| ProjectionError::InvalidCrs(format!("EPSG:{code}: unknown code")))
}

fn is_geographic(definition: &str) -> bool {
    definition.split_whitespace().any(|token| {
        matches!(
            token,
            "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon"
        )
    })
}
