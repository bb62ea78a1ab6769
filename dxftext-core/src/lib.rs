pub mod geometry {
    use glam::{DAffine2, DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，全部计算使用双精度。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        /// 以 `[x, y]` 形式输出，便于序列化为 GeoJSON 坐标。
        #[inline]
        pub fn to_array(self) -> [f64; 2] {
            [self.0.x, self.0.y]
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。插入缩放、文字方向等都用它表达。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        /// 向量相对 X 轴的角度（弧度）。零向量返回 0。
        #[inline]
        pub fn angle(self) -> f64 {
            if self.length_squared() < f64::EPSILON {
                0.0
            } else {
                self.0.y.atan2(self.0.x)
            }
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于文字排版时的居中计算。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 由点集构造边界框；空点集得到空边界框。
        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let min_vec = self.min.as_vec2();
            let max_vec = self.max.as_vec2();
            let center = (min_vec + max_vec) * 0.5;
            Point2::from_vec(center)
        }
    }

    /// 按任意轴算法由拉伸方向（组码 210/220/230）求 OCS 到 WCS 的平面变换。
    ///
    /// 只保留 WCS 的 X、Y 分量。拉伸方向为 +Z 或零向量时返回 `None`，表示恒等。
    /// 常见的 (0, 0, -1) 得到 X 轴镜像。
    pub fn ocs_to_wcs(extrusion: DVec3) -> Option<DAffine2> {
        const ARBITRARY_AXIS_LIMIT: f64 = 1.0 / 64.0;

        let normal = extrusion.try_normalize()?;
        if normal.abs_diff_eq(DVec3::Z, 1e-12) {
            return None;
        }
        let axis_x = if normal.x.abs() < ARBITRARY_AXIS_LIMIT
            && normal.y.abs() < ARBITRARY_AXIS_LIMIT
        {
            DVec3::Y.cross(normal)
        } else {
            DVec3::Z.cross(normal)
        }
        .normalize();
        let axis_y = normal.cross(axis_x).normalize();
        Some(DAffine2::from_cols(axis_x.truncate(), axis_y.truncate(), DVec2::ZERO))
    }

    /// DXF 拉伸方向的缺省值。
    #[inline]
    pub fn default_extrusion() -> DVec3 {
        DVec3::Z
    }

    /// 环的有向面积（鞋带公式），逆时针为正。
    pub fn signed_area(ring: &[DVec2]) -> f64 {
        if ring.len() < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for (index, current) in ring.iter().enumerate() {
            let next = ring[(index + 1) % ring.len()];
            sum += current.x * next.y - next.x * current.y;
        }
        sum * 0.5
    }

    /// 射线法判断点是否位于闭合环内部（边界上的点结果不确定）。
    pub fn ring_contains(ring: &[DVec2], point: DVec2) -> bool {
        let mut inside = false;
        if ring.len() < 3 {
            return false;
        }
        let mut previous = ring[ring.len() - 1];
        for &current in ring {
            if (current.y > point.y) != (previous.y > point.y) {
                let t = (point.y - current.y) / (previous.y - current.y);
                let crossing_x = current.x + t * (previous.x - current.x);
                if point.x < crossing_x {
                    inside = !inside;
                }
            }
            previous = current;
        }
        inside
    }

    /// 保证环首尾相接；少于三个不同顶点的环视为退化并返回 `None`。
    pub fn close_ring(mut ring: Vec<DVec2>) -> Option<Vec<DVec2>> {
        ring.dedup_by(|a, b| a.abs_diff_eq(*b, 1e-12));
        let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) else {
            return None;
        };
        if !first.abs_diff_eq(last, 1e-12) {
            ring.push(first);
        } else if let Some(end) = ring.last_mut() {
            *end = first;
        }
        if ring.len() < 4 {
            return None;
        }
        Some(ring)
    }
}

pub mod document {
    use std::collections::HashMap;

    use glam::DVec3;
    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2, default_extrusion};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 文档中与文字提取相关的实体。其余 DXF 实体在读取阶段即被跳过。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Text(Text),
        MText(MText),
        BlockReference(BlockReference),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Text(text) => &text.layer,
                Entity::MText(mtext) => &mtext.layer,
                Entity::BlockReference(block) => &block.layer,
            }
        }

        /// 是否属于图纸空间（组码 67 = 1）。
        #[inline]
        pub fn in_paper_space(&self) -> bool {
            match self {
                Entity::Text(text) => text.paper_space,
                Entity::MText(mtext) => mtext.paper_space,
                Entity::BlockReference(block) => block.paper_space,
            }
        }
    }

    /// 单行文字。`insert` 与 `rotation`（弧度）处于由 `extrusion` 决定的 OCS 中。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub width_factor: f64,
        pub style: Option<String>,
        pub layer: String,
        #[serde(default = "default_extrusion")]
        pub extrusion: DVec3,
        #[serde(default)]
        pub paper_space: bool,
    }

    /// 多行文字。`content` 已去除格式控制码，换行以 `\n` 表示。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub reference_width: Option<f64>,
        pub direction: Vector2,
        pub attachment_point: i16,
        pub line_spacing_factor: f64,
        pub style: Option<String>,
        pub layer: String,
        #[serde(default)]
        pub paper_space: bool,
    }

    impl MText {
        /// AutoCAD 的标准行距为字高的 5/3 倍，再乘以行距因子。
        #[inline]
        pub fn line_pitch(&self) -> f64 {
            self.height * 5.0 / 3.0 * self.line_spacing_factor
        }

        #[inline]
        pub fn rotation(&self) -> f64 {
            self.direction.angle()
        }
    }

    /// 块参照上附带的属性值（ATTRIB）。坐标与块参照处于同一坐标系。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Attribute {
        pub tag: String,
        pub text: String,
        pub insert: Point2,
        pub height: f64,
        pub rotation: f64,
        pub width_factor: f64,
        pub style: Option<String>,
        pub is_invisible: bool,
        pub layer: String,
        #[serde(default = "default_extrusion")]
        pub extrusion: DVec3,
    }

    /// 块参照。插入点、旋转和缩放都在它自己的 OCS 中。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub attributes: Vec<Attribute>,
        pub layer: String,
        #[serde(default = "default_extrusion")]
        pub extrusion: DVec3,
        #[serde(default)]
        pub paper_space: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: HashMap<String, BlockDefinition>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                rotation,
                width_factor: 1.0,
                style: None,
                layer,
                extrusion: default_extrusion(),
                paper_space: false,
            }))
        }

        pub fn add_mtext(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            direction: Vector2,
            line_spacing_factor: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.add_entity(Entity::MText(MText {
                insert,
                content: content.into(),
                height,
                reference_width: None,
                direction,
                attachment_point: 1,
                line_spacing_factor,
                style: None,
                layer,
                paper_space: false,
            }))
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            attributes: Vec<Attribute>,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                attributes,
                layer,
                extrusion: default_extrusion(),
                paper_space: false,
            }))
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find(|(entity_id, _)| *entity_id == id)
                .map(|(_, entity)| entity)
        }

        fn next_id(&mut self) -> EntityId {
            self.next_entity_id += 1;
            EntityId::new(self.next_entity_id)
        }
    }
}

pub mod feature {
    use serde::{Deserialize, Serialize};

    use crate::geometry::Point2;

    /// 单个多边形：外环加若干内环（孔洞），均为首尾相接的闭合环。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PolygonRings {
        pub exterior: Vec<Point2>,
        pub holes: Vec<Vec<Point2>>,
    }

    /// 要素属性，字段名与输出 GeoJSON 中的键一致。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FeatureProperties {
        pub text: String,
        #[serde(rename = "char")]
        pub character: String,
        pub layer: String,
        pub font: String,
        pub insert_x_wcs: f64,
        pub insert_y_wcs: f64,
    }

    /// 一个字符实例经排版、变换后的几何体。
    ///
    /// 多数字形只有一个部件；像 `i`、`%` 这样由多个分离轮廓组成的字形会有多个部件。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PlacedPolygon {
        pub parts: Vec<PolygonRings>,
        pub properties: FeatureProperties,
    }

    impl PlacedPolygon {
        /// 依次遍历所有部件的外环与内环。
        pub fn rings(&self) -> impl Iterator<Item = &Vec<Point2>> {
            self.parts
                .iter()
                .flat_map(|part| std::iter::once(&part.exterior).chain(part.holes.iter()))
        }

        pub fn points(&self) -> impl Iterator<Item = Point2> + '_ {
            self.rings().flat_map(|ring| ring.iter().copied())
        }
    }
}
