use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Polarization channels carried by supported SAR products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl std::str::FromStr for Polarization {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            other => Err(TopoError::Config(format!(
                "unknown polarization: {}",
                other
            ))),
        }
    }
}

/// Side of track the radar antenna points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookSide {
    Left,
    Right,
}

impl LookSide {
    /// Engine sign convention: +1 left-looking, -1 right-looking
    pub fn sign(self) -> i32 {
        match self {
            LookSide::Left => 1,
            LookSide::Right => -1,
        }
    }
}

impl std::fmt::Display for LookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookSide::Left => write!(f, "left"),
            LookSide::Right => write!(f, "right"),
        }
    }
}

/// DEM interpolation methods understood by the terrain-intersection engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemInterpMethod {
    Sinc,
    Bilinear,
    Bicubic,
    Nearest,
    Akima,
    Biquintic,
}

impl Default for DemInterpMethod {
    fn default() -> Self {
        DemInterpMethod::Biquintic
    }
}

impl std::fmt::Display for DemInterpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DemInterpMethod::Sinc => "SINC",
            DemInterpMethod::Bilinear => "BILINEAR",
            DemInterpMethod::Bicubic => "BICUBIC",
            DemInterpMethod::Nearest => "NEAREST",
            DemInterpMethod::Akima => "AKIMA",
            DemInterpMethod::Biquintic => "BIQUINTIC",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for DemInterpMethod {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SINC" => Ok(DemInterpMethod::Sinc),
            "BILINEAR" => Ok(DemInterpMethod::Bilinear),
            "BICUBIC" => Ok(DemInterpMethod::Bicubic),
            "NEAREST" => Ok(DemInterpMethod::Nearest),
            "AKIMA" => Ok(DemInterpMethod::Akima),
            "BIQUINTIC" => Ok(DemInterpMethod::Biquintic),
            other => Err(TopoError::UnsupportedInterpolation(other.to_string())),
        }
    }
}

/// Geographic bounding box in SNWE order, degrees
///
/// Invariants: `south <= north`, `west <= east`. No antimeridian wraparound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// Component-wise union of two boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            south: self.south.min(other.south),
            north: self.north.max(other.north),
            west: self.west.min(other.west),
            east: self.east.max(other.east),
        }
    }

    /// Union over a sequence of boxes; zero boxes is an error
    pub fn union_all<I>(boxes: I) -> TopoResult<BoundingBox>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let first = iter
            .next()
            .ok_or(TopoError::EmptyInput("cannot union zero bounding boxes"))?;
        Ok(iter.fold(first, |acc, b| acc.union(&b)))
    }

    /// Smallest integer-degree bounds enclosing this box
    ///
    /// Rounds outward with exact floor/ceil, so an edge already on an
    /// integer degree stays put. DEM tiles are keyed by integer-degree
    /// cells, and fractional coverage must never round inward.
    pub fn expand_to_integer_degrees(&self) -> DegreeBounds {
        DegreeBounds {
            south: self.south.floor() as i32,
            north: self.north.ceil() as i32,
            west: self.west.floor() as i32,
            east: self.east.ceil() as i32,
        }
    }
}

/// Integer-degree bounds produced by [`BoundingBox::expand_to_integer_degrees`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeBounds {
    pub south: i32,
    pub north: i32,
    pub west: i32,
    pub east: i32,
}

/// 1-based inclusive burst selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstRange {
    pub start: usize,
    pub stop: usize,
}

impl BurstRange {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }
}

/// Orbit state vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVector {
    pub time: DateTime<Utc>,
    pub position: [f64; 3], // [x, y, z] in meters
    pub velocity: [f64; 3], // [vx, vy, vz] in m/s
}

/// Platform ephemeris, handed opaquely to the terrain-intersection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitData {
    pub state_vectors: Vec<StateVector>,
    pub reference_time: DateTime<Utc>,
}

/// Reference ellipsoid for the terrain-intersection engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    pub name: String,
    pub semi_major_axis: f64, // meters
    pub eccentricity_squared: f64,
}

impl Planet {
    /// Earth on the WGS84 ellipsoid
    pub fn earth() -> Self {
        Self {
            name: "Earth".to_string(),
            semi_major_axis: 6_378_137.0,
            eccentricity_squared: 0.006_694_379_990_141_3,
        }
    }
}

impl Default for Planet {
    fn default() -> Self {
        Planet::earth()
    }
}

/// One geometry computation: a single burst or a whole frame
///
/// Created by the task extractor from a parsed product, consumed exactly
/// once by the topo processor. Never persisted.
#[derive(Debug, Clone)]
pub struct GeometryTask {
    /// Human-readable identity, e.g. `burst_03` or `frame`
    pub label: String,
    /// Filename component, e.g. `03` or `frame`
    pub tag: String,
    /// Raster width in samples
    pub width: usize,
    /// Raster length in lines
    pub length: usize,
    /// Slant-range pixel spacing in meters
    pub range_pixel_spacing: f64,
    /// Pulse repetition frequency in Hz
    pub prf: f64,
    /// Radar wavelength in meters
    pub radar_wavelength: f64,
    /// Platform ephemeris, shared across tasks
    pub orbit: Arc<OrbitData>,
    /// Acquisition start time
    pub sensing_start: DateTime<Utc>,
    /// Slant range to the first sample in meters
    pub starting_range: f64,
    pub look_side: LookSide,
    pub polarization: Option<Polarization>,
}

impl GeometryTask {
    /// Check the imaging-geometry invariants before handing the task to an engine
    pub fn validate(&self) -> TopoResult<()> {
        if self.width == 0 || self.length == 0 {
            return Err(TopoError::Metadata(format!(
                "{}: raster dimensions must be positive, got {}x{}",
                self.label, self.width, self.length
            )));
        }
        if !self.range_pixel_spacing.is_finite() || self.range_pixel_spacing <= 0.0 {
            return Err(TopoError::Metadata(format!(
                "{}: range pixel spacing must be positive, got {}",
                self.label, self.range_pixel_spacing
            )));
        }
        if !self.prf.is_finite() || self.prf <= 0.0 {
            return Err(TopoError::Metadata(format!(
                "{}: pulse repetition frequency must be positive, got {}",
                self.label, self.prf
            )));
        }
        if !self.radar_wavelength.is_finite() || self.radar_wavelength <= 0.0 {
            return Err(TopoError::Metadata(format!(
                "{}: radar wavelength must be positive, got {}",
                self.label, self.radar_wavelength
            )));
        }
        Ok(())
    }
}

/// Per-task geometry outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryResult {
    pub label: String,
    pub mask_path: PathBuf,
    pub bbox: BoundingBox,
    pub polarization: Option<Polarization>,
}

/// Summary metadata attached to a [`SceneResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Unit-group label, e.g. `IW1` or `frame`
    pub group: String,
    pub polarization: Option<Polarization>,
    pub dem_path: PathBuf,
    pub dem_interp: DemInterpMethod,
    pub tasks_attempted: usize,
    pub tasks_completed: usize,
}

/// Aggregated geometry products for one unit group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneResult {
    pub output_directory: PathBuf,
    pub units: Vec<GeometryResult>,
    pub overall_bbox: BoundingBox,
    pub metadata: SceneMetadata,
}

/// Error types for geometry and mask processing
#[derive(Debug, thiserror::Error)]
pub enum TopoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("DEM descriptor not found: {}", .0.display())]
    MissingDescriptor(PathBuf),

    #[error("invalid burst range: {0}")]
    InvalidRange(String),

    #[error("unsupported sensor: {0}")]
    UnsupportedSensor(String),

    #[error("unsupported DEM interpolation method: {0}")]
    UnsupportedInterpolation(String),

    #[error("unsupported reader shape: {0}")]
    UnsupportedReader(String),

    #[error("no coverage: {0}")]
    NoCoverage(String),

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("DEM acquisition failed: {0}")]
    DemAcquisition(String),

    #[error("engine execution failed: {0}")]
    EngineExecution(String),

    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),
}

/// Result type for geometry and mask operations
pub type TopoResult<T> = Result<T, TopoError>;
