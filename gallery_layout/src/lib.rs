//! Gallery layout format: hall dimensions, bench, artwork catalog and light rig.
#![forbid(unsafe_code)]

use std::f32::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const LAYOUT_VERSION: u32 = 1;

const BUILTIN_LAYOUT: &str = include_str!("../layouts/ethiopian_heritage.toml");

#[derive(Debug)]
pub enum LayoutError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(String),
    Invalid(Vec<String>),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Io { path, source } => {
                write!(f, "read layout {} failed: {}", path.display(), source)
            }
            LayoutError::Parse(message) => write!(f, "layout parse failed: {}", message),
            LayoutError::Invalid(errors) => write!(f, "layout invalid: {}", errors.join("; ")),
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayoutError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GalleryLayout {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub hall: HallSpec,
    #[serde(default)]
    pub bench: Option<BenchSpec>,
    #[serde(default)]
    pub frame: FrameSpec,
    #[serde(default)]
    pub lights: LightSpec,
    #[serde(default)]
    pub artworks: Vec<ArtworkRecord>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct HallSpec {
    pub size: f32,
    pub wall_height: f32,
    pub wall_thickness: f32,
    #[serde(default = "default_floor_extent")]
    pub floor_extent: f32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct BenchSpec {
    pub size: [f32; 3],
    #[serde(default)]
    pub pos: [f32; 3],
}

/// Canvas dimensions shared by every artwork. Width follows the image aspect.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct FrameSpec {
    #[serde(default = "default_frame_height")]
    pub height: f32,
    #[serde(default = "default_frame_depth")]
    pub depth: f32,
    /// Distance between the wall's inner face and the back of the canvas.
    #[serde(default = "default_wall_gap")]
    pub wall_gap: f32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            height: default_frame_height(),
            depth: default_frame_depth(),
            wall_gap: default_wall_gap(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LightSpec {
    #[serde(default = "default_ambient")]
    pub ambient: f32,
    #[serde(default = "default_spot_color")]
    pub spot_color: [f32; 3],
    #[serde(default = "default_spot_intensity")]
    pub spot_intensity: f32,
    #[serde(default = "default_spot_angle_deg")]
    pub spot_angle_deg: f32,
    #[serde(default = "default_spot_penumbra")]
    pub spot_penumbra: f32,
    /// How far each spotlight hangs in from its wall.
    #[serde(default = "default_spot_inset")]
    pub spot_inset: f32,
    #[serde(default = "default_center_color")]
    pub center_color: [f32; 3],
    #[serde(default = "default_center_intensity")]
    pub center_intensity: f32,
}

impl Default for LightSpec {
    fn default() -> Self {
        Self {
            ambient: default_ambient(),
            spot_color: default_spot_color(),
            spot_intensity: default_spot_intensity(),
            spot_angle_deg: default_spot_angle_deg(),
            spot_penumbra: default_spot_penumbra(),
            spot_inset: default_spot_inset(),
            center_color: default_center_color(),
            center_intensity: default_center_intensity(),
        }
    }
}

/// One catalog entry. Field text is shown verbatim in the info panel.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ArtworkRecord {
    pub name: String,
    pub lifespan: String,
    pub description: String,
    pub achievement: String,
    #[serde(default)]
    pub image: Option<String>,
    pub wall: WallSide,
    pub slot: WallSlot,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WallSide {
    /// The -Z wall.
    Back,
    /// The +Z wall.
    Front,
    /// The -X wall.
    Left,
    /// The +X wall.
    Right,
}

impl WallSide {
    /// Yaw that turns a canvas to face into the hall from this wall.
    pub fn facing_yaw(self) -> f32 {
        match self {
            WallSide::Back => 0.0,
            WallSide::Front => PI,
            WallSide::Left => FRAC_PI_2,
            WallSide::Right => -FRAC_PI_2,
        }
    }
}

/// Position along a wall, in the wall's negative-to-positive axis order.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WallSlot {
    Start,
    #[serde(alias = "center")]
    Centre,
    End,
}

impl WallSlot {
    fn sign(self) -> f32 {
        match self {
            WallSlot::Start => -1.0,
            WallSlot::Centre => 0.0,
            WallSlot::End => 1.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LayoutValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LayoutValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Axis-aligned static box in world space.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedBox {
    pub id: String,
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArtworkPlacement {
    pub position: [f32; 3],
    pub yaw: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: f32,
    /// Half-angle of the cone in radians.
    pub angle: f32,
    pub penumbra: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightRig {
    pub ambient: f32,
    pub spots: Vec<SpotLight>,
    pub center: PointLight,
}

/// World-space geometry derived from a validated layout.
#[derive(Clone, Debug)]
pub struct ResolvedLayout {
    pub walls: Vec<ResolvedBox>,
    pub bench: Option<ResolvedBox>,
    pub floor_extent: f32,
    pub ceiling_height: f32,
    pub hall_size: f32,
    pub frame: FrameSpec,
    /// One per catalog record, same order.
    pub placements: Vec<ArtworkPlacement>,
    pub lights: LightRig,
}

impl GalleryLayout {
    /// The hall and catalog shipped with the application.
    pub fn builtin() -> Result<Self, LayoutError> {
        Self::parse_toml(BUILTIN_LAYOUT)
    }

    pub fn parse_toml(text: &str) -> Result<Self, LayoutError> {
        toml::from_str(text).map_err(|err| LayoutError::Parse(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, LayoutError> {
        let text = std::fs::read_to_string(path).map_err(|source| LayoutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&text)
    }

    pub fn validate(&self) -> LayoutValidation {
        let mut validation = LayoutValidation::default();
        if self.version != LAYOUT_VERSION {
            validation.errors.push(format!(
                "unsupported layout version {} (expected {})",
                self.version, LAYOUT_VERSION
            ));
        }
        if self.name.trim().is_empty() {
            validation
                .errors
                .push("layout name must not be empty".to_string());
        }

        let hall = &self.hall;
        if !positive(hall.size) || !positive(hall.wall_height) || !positive(hall.wall_thickness)
        {
            validation
                .errors
                .push("hall dimensions must be > 0".to_string());
        } else if hall.wall_thickness * 2.0 >= hall.size {
            validation
                .errors
                .push("hall wall_thickness leaves no interior".to_string());
        }
        if !positive(hall.floor_extent) {
            validation
                .errors
                .push("hall floor_extent must be > 0".to_string());
        } else if hall.floor_extent < hall.size {
            validation
                .warnings
                .push("floor_extent is smaller than the hall".to_string());
        }

        if let Some(bench) = &self.bench {
            if !bench.size.iter().all(|value| positive(*value)) {
                validation
                    .errors
                    .push("bench size must be > 0".to_string());
            }
            if !bench.pos.iter().all(|value| value.is_finite()) {
                validation
                    .errors
                    .push("bench pos must be finite".to_string());
            }
        }

        let frame = &self.frame;
        if !positive(frame.height) || !positive(frame.depth) {
            validation
                .errors
                .push("frame height/depth must be > 0".to_string());
        }
        if !frame.wall_gap.is_finite() || frame.wall_gap < 0.0 {
            validation
                .errors
                .push("frame wall_gap must be >= 0".to_string());
        }
        if positive(frame.height) && frame.height > hall.wall_height {
            validation
                .warnings
                .push("frame height exceeds wall height".to_string());
        }

        let lights = &self.lights;
        if !lights.ambient.is_finite() || lights.ambient < 0.0 {
            validation
                .errors
                .push("lights ambient must be >= 0".to_string());
        }
        if lights.spot_angle_deg <= 0.0 || lights.spot_angle_deg >= 90.0 {
            validation
                .errors
                .push("lights spot_angle_deg must be between 0 and 90".to_string());
        }

        if self.artworks.is_empty() {
            validation
                .warnings
                .push("layout has no artworks".to_string());
        }
        let mut slots = std::collections::HashSet::new();
        for (index, record) in self.artworks.iter().enumerate() {
            if record.name.trim().is_empty() {
                validation
                    .errors
                    .push(format!("artwork {} name must not be empty", index));
            }
            match record.image.as_deref() {
                None => validation.warnings.push(format!(
                    "artwork {} '{}' has no image; a placeholder will be shown",
                    index, record.name
                )),
                Some(image) if image.trim().is_empty() => validation
                    .errors
                    .push(format!("artwork {} image path is empty", index)),
                Some(_) => {}
            }
            if !slots.insert((record.wall, record.slot)) {
                validation.warnings.push(format!(
                    "artwork {} '{}' shares {:?}/{:?} with another artwork",
                    index, record.name, record.wall, record.slot
                ));
            }
        }
        validation
    }

    pub fn resolve(&self) -> Result<ResolvedLayout, LayoutError> {
        let validation = self.validate();
        if !validation.is_ok() {
            return Err(LayoutError::Invalid(validation.errors));
        }
        Ok(ResolvedLayout {
            walls: self.walls(),
            bench: self.bench.map(|bench| ResolvedBox {
                id: "bench".to_string(),
                center: [
                    bench.pos[0],
                    bench.pos[1] + bench.size[1] * 0.5,
                    bench.pos[2],
                ],
                half_extents: [
                    bench.size[0] * 0.5,
                    bench.size[1] * 0.5,
                    bench.size[2] * 0.5,
                ],
            }),
            floor_extent: self.hall.floor_extent,
            ceiling_height: self.hall.wall_height,
            hall_size: self.hall.size,
            frame: self.frame,
            placements: self
                .artworks
                .iter()
                .map(|record| self.placement(record.wall, record.slot))
                .collect(),
            lights: self.light_rig(),
        })
    }

    /// Canvas centre for a wall slot, pulled off the wall toward the hall centre.
    pub fn placement(&self, wall: WallSide, slot: WallSlot) -> ArtworkPlacement {
        let hall = &self.hall;
        let frame = &self.frame;
        let reach =
            hall.size * 0.5 - hall.wall_thickness * 0.5 - frame.depth * 0.5 - frame.wall_gap;
        let along = slot.sign() * hall.size / 3.5;
        let y = hall.wall_height / 2.2;
        let position = match wall {
            WallSide::Back => [along, y, -reach],
            WallSide::Front => [along, y, reach],
            WallSide::Left => [-reach, y, along],
            WallSide::Right => [reach, y, along],
        };
        ArtworkPlacement {
            position,
            yaw: wall.facing_yaw(),
        }
    }

    fn walls(&self) -> Vec<ResolvedBox> {
        let half = self.hall.size * 0.5;
        let half_height = self.hall.wall_height * 0.5;
        let half_thick = self.hall.wall_thickness * 0.5;
        let inset = half - half_thick;
        let wall = |id: &str, center: [f32; 3], half_extents: [f32; 3]| ResolvedBox {
            id: id.to_string(),
            center,
            half_extents,
        };
        vec![
            wall(
                "wall_front",
                [0.0, half_height, inset],
                [half, half_height, half_thick],
            ),
            wall(
                "wall_back",
                [0.0, half_height, -inset],
                [half, half_height, half_thick],
            ),
            wall(
                "wall_right",
                [inset, half_height, 0.0],
                [half_thick, half_height, half],
            ),
            wall(
                "wall_left",
                [-inset, half_height, 0.0],
                [half_thick, half_height, half],
            ),
        ]
    }

    fn light_rig(&self) -> LightRig {
        let lights = &self.lights;
        let half = self.hall.size * 0.5;
        let spot_y = self.hall.wall_height - 0.5;
        let target_y = self.hall.wall_height / 2.5;
        let side = self.hall.size / 3.5;
        let range = self.hall.size * 0.8;
        let spot = |position: [f32; 3], target: [f32; 3]| SpotLight {
            position,
            target,
            color: lights.spot_color,
            intensity: lights.spot_intensity,
            range,
            angle: lights.spot_angle_deg.to_radians(),
            penumbra: lights.spot_penumbra,
        };

        let mut spots = Vec::with_capacity(12);
        let inset = half - lights.spot_inset;
        for along in [-side, 0.0, side] {
            spots.push(spot([inset, spot_y, along], [half, target_y, along]));
        }
        for along in [-side, 0.0, side] {
            spots.push(spot([-inset, spot_y, along], [-half, target_y, along]));
        }
        for along in [-side, 0.0, side] {
            spots.push(spot([along, spot_y, inset], [along, target_y, half]));
        }
        for along in [-side, 0.0, side] {
            spots.push(spot([along, spot_y, -inset], [along, target_y, -half]));
        }

        LightRig {
            ambient: lights.ambient,
            spots,
            center: PointLight {
                position: [0.0, self.hall.wall_height - 0.3, 0.0],
                color: lights.center_color,
                intensity: lights.center_intensity,
                range: self.hall.size * 1.2,
            },
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn default_floor_extent() -> f32 {
    100.0
}

fn default_frame_height() -> f32 {
    2.5
}

fn default_frame_depth() -> f32 {
    0.05
}

fn default_wall_gap() -> f32 {
    0.3
}

fn default_ambient() -> f32 {
    0.15
}

// 0xffeedd
fn default_spot_color() -> [f32; 3] {
    [1.0, 238.0 / 255.0, 221.0 / 255.0]
}

fn default_spot_intensity() -> f32 {
    1.5
}

fn default_spot_angle_deg() -> f32 {
    30.0
}

fn default_spot_penumbra() -> f32 {
    0.6
}

fn default_spot_inset() -> f32 {
    2.0
}

// 0xfff5e1
fn default_center_color() -> [f32; 3] {
    [1.0, 245.0 / 255.0, 225.0 / 255.0]
}

fn default_center_intensity() -> f32 {
    0.25
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version = 1
name = "mini"

[hall]
size = 10.0
wall_height = 4.0
wall_thickness = 0.2

[[artworks]]
name = "Only"
lifespan = "1900-1950"
description = "d"
achievement = "a"
wall = "left"
slot = "center"
"#;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1.0e-5
    }

    #[test]
    fn builtin_layout_resolves_twelve_artworks() {
        let layout = GalleryLayout::builtin().unwrap();
        let validation = layout.validate();
        assert!(validation.is_ok(), "{:?}", validation.errors);
        let resolved = layout.resolve().unwrap();
        assert_eq!(layout.artworks.len(), 12);
        assert_eq!(resolved.placements.len(), 12);
        assert_eq!(resolved.walls.len(), 4);
        assert_eq!(resolved.lights.spots.len(), 12);
        assert!(close(resolved.ceiling_height, 6.0));
        assert_eq!(layout.artworks[3].name, "Abebe Bikila");
        assert_eq!(layout.artworks[11].name, "Lázaro di Andrade");
    }

    #[test]
    fn builtin_placements_follow_wall_order() {
        let layout = GalleryLayout::builtin().unwrap();
        let resolved = layout.resolve().unwrap();
        let reach = 10.0 - 0.25 - 0.025 - 0.3;
        let side = 20.0 / 3.5;
        let y = 6.0 / 2.2;

        let back = resolved.placements[0];
        assert!(close(back.position[0], -side));
        assert!(close(back.position[1], y));
        assert!(close(back.position[2], -reach));
        assert!(close(back.yaw, 0.0));

        let front_centre = resolved.placements[5];
        assert!(close(front_centre.position[0], 0.0));
        assert!(close(front_centre.position[2], reach));
        assert!(close(front_centre.yaw, PI));

        let left_end = resolved.placements[8];
        assert!(close(left_end.position[0], -reach));
        assert!(close(left_end.position[2], side));
        assert!(close(left_end.yaw, FRAC_PI_2));

        let right_start = resolved.placements[9];
        assert!(close(right_start.position[0], reach));
        assert!(close(right_start.position[2], -side));
        assert!(close(right_start.yaw, -FRAC_PI_2));
    }

    #[test]
    fn bench_rests_on_the_floor() {
        let layout = GalleryLayout::builtin().unwrap();
        let bench = layout.resolve().unwrap().bench.unwrap();
        assert!(close(bench.center[1], 0.3));
        assert!(close(bench.half_extents[0], 3.0));
        assert!(close(bench.half_extents[2], 0.75));
    }

    #[test]
    fn spotlights_aim_at_their_wall() {
        let layout = GalleryLayout::builtin().unwrap();
        let rig = layout.resolve().unwrap().lights;
        let first = rig.spots[0];
        assert!(close(first.position[0], 8.0));
        assert!(close(first.position[1], 5.5));
        assert!(close(first.target[0], 10.0));
        assert!(close(first.target[1], 2.4));
        assert!(close(first.angle, PI / 6.0));
        assert!(close(rig.ambient, 0.15));
        assert!(close(rig.center.position[1], 5.7));
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let layout = GalleryLayout::parse_toml(MINIMAL).unwrap();
        assert!(layout.bench.is_none());
        assert!(close(layout.frame.height, 2.5));
        assert!(close(layout.hall.floor_extent, 100.0));
        let validation = layout.validate();
        assert!(validation.is_ok());
        assert!(validation
            .warnings
            .iter()
            .any(|warning| warning.contains("no image")));
        assert_eq!(layout.artworks[0].slot, WallSlot::Centre);
    }

    #[test]
    fn rejects_bad_version_and_dimensions() {
        let text = MINIMAL
            .replace("version = 1", "version = 2")
            .replace("size = 10.0", "size = -1.0");
        let layout = GalleryLayout::parse_toml(&text).unwrap();
        let validation = layout.validate();
        assert!(validation.errors.iter().any(|e| e.contains("version")));
        assert!(validation.errors.iter().any(|e| e.contains("hall")));
        assert!(matches!(layout.resolve(), Err(LayoutError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_titles() {
        let text = MINIMAL.replace("name = \"Only\"", "name = \"  \"");
        let layout = GalleryLayout::parse_toml(&text).unwrap();
        assert!(!layout.validate().is_ok());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = GalleryLayout::parse_toml("version = ").unwrap_err();
        assert!(matches!(err, LayoutError::Parse(_)));
    }
}
