use crate::types::{BoundingBox, LookSide, OrbitData, Polarization, TopoError, TopoResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Sensor families with geometry-product support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// Sentinel-1 TOPS: multi-swath, burst-based
    Sentinel1,
    /// SAOCOM stripmap SLC: single-frame
    Saocom,
}

impl SensorKind {
    /// Whether the platform is right-looking by construction
    pub fn right_looking_by_construction(self) -> bool {
        match self {
            SensorKind::Sentinel1 => true,
            SensorKind::Saocom => false,
        }
    }

    /// Product shape this family's readers produce
    pub fn capability(self) -> ReaderCapability {
        match self {
            SensorKind::Sentinel1 => ReaderCapability::Bursts,
            SensorKind::Saocom => ReaderCapability::Frame,
        }
    }

    /// Unit groups to process for an optional swath selection
    ///
    /// Burst-mode sensors default to all three sub-swaths; frame-mode
    /// sensors take no swath selection and always yield the single frame
    /// group.
    pub fn unit_groups(self, swaths: Option<&[u8]>) -> TopoResult<Vec<UnitGroup>> {
        match self.capability() {
            ReaderCapability::Bursts => {
                let numbers: Vec<u8> = match swaths {
                    Some(s) => s.to_vec(),
                    None => vec![1, 2, 3],
                };
                if numbers.is_empty() {
                    return Err(TopoError::Config(
                        "at least one swath must be requested".to_string(),
                    ));
                }
                for &n in &numbers {
                    if !(1..=3).contains(&n) {
                        return Err(TopoError::Config(format!(
                            "swath number must be one of 1, 2, or 3, got {}",
                            n
                        )));
                    }
                }
                Ok(numbers.into_iter().map(UnitGroup::Swath).collect())
            }
            ReaderCapability::Frame => {
                if swaths.is_some() {
                    return Err(TopoError::Config(format!(
                        "{} products are frame-based and take no swath selection",
                        self
                    )));
                }
                Ok(vec![UnitGroup::Frame])
            }
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Sentinel1 => write!(f, "sentinel1"),
            SensorKind::Saocom => write!(f, "saocom"),
        }
    }
}

impl std::str::FromStr for SensorKind {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sentinel1" | "sentinel-1" => Ok(SensorKind::Sentinel1),
            "saocom" | "saocom_slc" => Ok(SensorKind::Saocom),
            other => Err(TopoError::UnsupportedSensor(other.to_string())),
        }
    }
}

/// Product shape a sensor family produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderCapability {
    Bursts,
    Frame,
}

impl std::fmt::Display for ReaderCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderCapability::Bursts => write!(f, "bursts"),
            ReaderCapability::Frame => write!(f, "frame"),
        }
    }
}

/// One processing group: a numbered sub-swath or a whole frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitGroup {
    Swath(u8),
    Frame,
}

impl UnitGroup {
    /// Label used for output subdirectories and result keys
    pub fn label(&self) -> String {
        match self {
            UnitGroup::Swath(n) => format!("IW{}", n),
            UnitGroup::Frame => "frame".to_string(),
        }
    }
}

/// Validated reader configuration, one variant per sensor family
///
/// Deserialization rejects unknown keys; `validate` checks the structural
/// rules serde cannot express.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderConfig {
    Tops(TopsReaderConfig),
    Stripmap(StripmapReaderConfig),
}

impl ReaderConfig {
    pub fn validate(&self) -> TopoResult<()> {
        match self {
            ReaderConfig::Tops(cfg) => cfg.validate(),
            ReaderConfig::Stripmap(cfg) => cfg.validate(),
        }
    }

    /// Whether this configuration belongs to the given sensor family
    pub fn matches_sensor(&self, sensor: SensorKind) -> bool {
        matches!(
            (self, sensor),
            (ReaderConfig::Tops(_), SensorKind::Sentinel1)
                | (ReaderConfig::Stripmap(_), SensorKind::Saocom)
        )
    }
}

/// Reader inputs for TOPS (burst-mode) products
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TopsReaderConfig {
    pub safe_paths: Vec<PathBuf>,
    pub annotation_paths: Vec<PathBuf>,
    pub manifest_paths: Vec<PathBuf>,
    pub orbit_file: Option<PathBuf>,
    pub orbit_dir: Option<PathBuf>,
    pub aux_dir: Option<PathBuf>,
}

impl TopsReaderConfig {
    fn validate(&self) -> TopoResult<()> {
        if self.safe_paths.is_empty() && self.annotation_paths.is_empty() {
            return Err(TopoError::Config(
                "TOPS reader needs at least one SAFE path or annotation path".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reader inputs for stripmap (frame-mode) products
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StripmapReaderConfig {
    pub image_file: PathBuf,
    pub annotation_file: PathBuf,
    #[serde(default)]
    pub manifest_file: Option<PathBuf>,
    #[serde(default)]
    pub orbit_dir: Option<PathBuf>,
}

impl StripmapReaderConfig {
    fn validate(&self) -> TopoResult<()> {
        if self.image_file.as_os_str().is_empty() {
            return Err(TopoError::Config(
                "stripmap reader needs an image file".to_string(),
            ));
        }
        if self.annotation_file.as_os_str().is_empty() {
            return Err(TopoError::Config(
                "stripmap reader needs an annotation file".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-burst timing and geometry metadata
#[derive(Debug, Clone)]
pub struct BurstRecord {
    pub samples: usize,
    pub lines: usize,
    pub range_pixel_spacing: f64, // meters
    /// Directly recorded PRF, when the annotation carries one
    pub prf: Option<f64>,
    /// Azimuth line interval in seconds; its reciprocal stands in for a missing PRF
    pub azimuth_time_interval: Option<f64>,
    pub radar_wavelength: f64, // meters
    pub orbit: Arc<OrbitData>,
    pub sensing_start: DateTime<Utc>,
    pub starting_range: f64, // meters
}

/// Whole-frame metadata for stripmap products
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub samples: usize,
    pub lines: usize,
    pub range_pixel_spacing: f64, // meters
    pub prf: f64,                 // Hz
    pub radar_wavelength: f64,    // meters
    pub orbit: Arc<OrbitData>,
    pub sensing_start: DateTime<Utc>,
    pub starting_range: f64, // meters
    /// Platform pointing direction
    pub pointing: LookSide,
    /// (lat, lon) of the four frame corners
    pub corners: [(f64, f64); 4],
}

impl FrameRecord {
    /// Ground bounding box spanned by the frame corners
    pub fn bbox(&self) -> BoundingBox {
        let mut b = BoundingBox::new(
            self.corners[0].0,
            self.corners[0].0,
            self.corners[0].1,
            self.corners[0].1,
        );
        for &(lat, lon) in &self.corners[1..] {
            b.south = b.south.min(lat);
            b.north = b.north.max(lat);
            b.west = b.west.min(lon);
            b.east = b.east.max(lon);
        }
        b
    }
}

/// Burst-mode product for one unit group
#[derive(Debug, Clone)]
pub struct BurstProduct {
    pub sensor: SensorKind,
    /// Ground bounding box from product metadata
    pub bbox: BoundingBox,
    pub bursts: Vec<BurstRecord>,
    /// Pointing from platform metadata, for sensors not right-looking by construction
    pub look_side: Option<LookSide>,
}

/// Frame-mode product
#[derive(Debug, Clone)]
pub struct FrameProduct {
    pub sensor: SensorKind,
    pub frame: FrameRecord,
}

/// Closed union of the product shapes a reader can produce
#[derive(Debug, Clone)]
pub enum ReaderShape {
    Bursts(BurstProduct),
    Frame(FrameProduct),
}

impl ReaderShape {
    pub fn capability(&self) -> ReaderCapability {
        match self {
            ReaderShape::Bursts(_) => ReaderCapability::Bursts,
            ReaderShape::Frame(_) => ReaderCapability::Frame,
        }
    }

    /// Number of geometry units the shape holds
    pub fn unit_count(&self) -> usize {
        match self {
            ReaderShape::Bursts(p) => p.bursts.len(),
            ReaderShape::Frame(_) => 1,
        }
    }
}

/// Decoded view of one unit group's product
#[derive(Debug, Clone)]
pub struct ParsedProduct {
    /// Unit-group label the product belongs to, e.g. `IW1` or `frame`
    pub label: String,
    pub polarization: Option<Polarization>,
    pub shape: ReaderShape,
}

impl ParsedProduct {
    /// Ground coverage, if the product holds at least one unit
    pub fn coverage_bbox(&self) -> Option<BoundingBox> {
        match &self.shape {
            ReaderShape::Bursts(p) if p.bursts.is_empty() => None,
            ReaderShape::Bursts(p) => Some(p.bbox),
            ReaderShape::Frame(p) => Some(p.frame.bbox()),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.shape.unit_count()
    }
}

/// One constructed product reader
///
/// `parse` performs the format-specific decoding, which is outside this
/// crate; implementations wrap the actual SLC/annotation unpackers.
pub trait ProductReader: Send {
    fn parse(&mut self) -> TopoResult<ParsedProduct>;
}

/// Builds product readers for a sensor family
pub trait ReaderFactory: Send + Sync {
    fn build(
        &self,
        sensor: SensorKind,
        config: &ReaderConfig,
        group: UnitGroup,
        polarization: Polarization,
    ) -> TopoResult<Box<dyn ProductReader>>;
}
