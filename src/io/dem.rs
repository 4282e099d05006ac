use crate::types::{BoundingBox, DegreeBounds, TopoError, TopoResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// XML descriptor describing a DEM grid
///
/// Sits next to the elevation raster as `<path>.xml`, or is the DEM path
/// itself when that already ends in `.xml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "demImage", rename_all = "camelCase")]
pub struct DemDescriptor {
    pub width: usize,
    pub length: usize,
    pub first_latitude: f64,
    pub first_longitude: f64,
    pub delta_latitude: f64,
    pub delta_longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_data_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
}

impl DemDescriptor {
    /// Parse a descriptor XML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> TopoResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        quick_xml::de::from_str(&text).map_err(|e| {
            TopoError::XmlParsing(format!(
                "DEM descriptor {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Serialize to descriptor XML
    pub fn to_xml(&self) -> TopoResult<String> {
        quick_xml::se::to_string(self)
            .map_err(|e| TopoError::XmlParsing(format!("DEM descriptor serialization: {}", e)))
    }

    /// Write the sidecar next to a DEM file, returning the sidecar path
    pub fn write_for<P: AsRef<Path>>(&self, dem_path: P) -> TopoResult<PathBuf> {
        let path = descriptor_path(dem_path.as_ref());
        std::fs::write(&path, self.to_xml()?)?;
        Ok(path)
    }

    /// Ground coverage implied by the grid origin and post spacing
    pub fn coverage(&self) -> BoundingBox {
        let lat0 = self.first_latitude;
        let lat1 = self.first_latitude + self.delta_latitude * self.length as f64;
        let lon0 = self.first_longitude;
        let lon1 = self.first_longitude + self.delta_longitude * self.width as f64;
        BoundingBox::new(
            lat0.min(lat1),
            lat0.max(lat1),
            lon0.min(lon1),
            lon0.max(lon1),
        )
    }
}

/// Descriptor location for a DEM path
pub fn descriptor_path(dem_path: &Path) -> PathBuf {
    if dem_path.extension().and_then(|e| e.to_str()) == Some("xml") {
        dem_path.to_path_buf()
    } else {
        // Append rather than replace: `srtm.dem.wgs84` -> `srtm.dem.wgs84.xml`
        let mut os = dem_path.as_os_str().to_os_string();
        os.push(".xml");
        PathBuf::from(os)
    }
}

/// Validate that a DEM file and its descriptor sidecar exist
///
/// Returns the absolute DEM path.
pub fn ensure_dem_inputs(dem_path: &Path) -> TopoResult<PathBuf> {
    let absolute = std::path::absolute(dem_path)?;
    if !absolute.is_file() {
        return Err(TopoError::InputNotFound(absolute));
    }
    let descriptor = descriptor_path(&absolute);
    if !descriptor.is_file() {
        return Err(TopoError::MissingDescriptor(descriptor));
    }
    Ok(absolute)
}

/// A resolved DEM: absolute path, parsed descriptor, derived coverage
///
/// Opened once per run and shared read-only across all engine invocations.
#[derive(Debug, Clone)]
pub struct DemHandle {
    path: PathBuf,
    descriptor: DemDescriptor,
    coverage: BoundingBox,
}

impl DemHandle {
    /// Open a DEM, requiring the descriptor sidecar
    pub fn open<P: AsRef<Path>>(path: P) -> TopoResult<Self> {
        let absolute = ensure_dem_inputs(path.as_ref())?;
        let descriptor = DemDescriptor::from_file(descriptor_path(&absolute))?;
        let coverage = descriptor.coverage();
        log::debug!(
            "Opened DEM {} ({}x{} posts, coverage lat {:.3}..{:.3}, lon {:.3}..{:.3})",
            absolute.display(),
            descriptor.width,
            descriptor.length,
            coverage.south,
            coverage.north,
            coverage.west,
            coverage.east
        );
        Ok(Self {
            path: absolute,
            descriptor,
            coverage,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor(&self) -> &DemDescriptor {
        &self.descriptor
    }

    pub fn coverage(&self) -> BoundingBox {
        self.coverage
    }

    /// Read the elevation grid through GDAL, for engines that want it in memory
    ///
    /// Works for GDAL-readable rasters; raw stitched mosaics are fully
    /// described by the descriptor instead.
    pub fn read_raster(&self) -> TopoResult<Array2<f32>> {
        let dataset = gdal::Dataset::open(&self.path)?;
        let band = dataset.rasterband(1)?;
        let (width, height) = dataset.raster_size();
        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| TopoError::Metadata(format!("DEM raster reshape failed: {}", e)))
    }
}

/// Integer identifier of a DEM source catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemSource(pub u8);

impl DemSource {
    /// SRTM 1 arc-second catalog
    pub const SRTM1: DemSource = DemSource(1);
    /// SRTM 3 arc-second catalog
    pub const SRTM3: DemSource = DemSource(3);
}

impl std::fmt::Display for DemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stitching order handed to a DEM stitching collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct StitchRequest {
    /// [south, north] latitude range in integer degrees
    pub lat: [i32; 2],
    /// [west, east] longitude range in integer degrees
    pub lon: [i32; 2],
    pub source: DemSource,
    /// Mosaic filename to produce inside `download_dir`
    pub name: String,
    pub download_dir: PathBuf,
    /// Keep downloaded tiles for reuse by later runs
    pub keep_tiles: bool,
    /// Write the XML descriptor next to the mosaic
    pub write_descriptor: bool,
}

/// DEM stitching collaborator
///
/// `Ok(false)` means the service ran but produced nothing (no coverage at
/// the requested cells, exhausted mirrors); hard faults are errors.
pub trait DemStitcher: Send + Sync {
    fn stitch(&self, request: &StitchRequest) -> TopoResult<bool>;
}

/// Canonical mosaic name for integer-degree bounds,
/// e.g. `demLat_N37_N41_Lon_W123_W118.dem.wgs84`
pub fn default_dem_name(bounds: &DegreeBounds) -> String {
    format!(
        "demLat_{}_{}_Lon_{}_{}.dem.wgs84",
        format_lat(bounds.south),
        format_lat(bounds.north),
        format_lon(bounds.west),
        format_lon(bounds.east)
    )
}

pub(crate) fn format_lat(value: i32) -> String {
    let hemisphere = if value < 0 { 'S' } else { 'N' };
    format!("{}{:02}", hemisphere, value.abs())
}

pub(crate) fn format_lon(value: i32) -> String {
    let hemisphere = if value < 0 { 'W' } else { 'E' };
    format!("{}{:03}", hemisphere, value.abs())
}

/// Resolves the DEM for a scene
///
/// Validates a caller-supplied file, or drives the stitching collaborator
/// over the integer-degree expansion of the scene bbox.
pub struct DemProvisioner<'a> {
    stitcher: &'a dyn DemStitcher,
}

impl<'a> DemProvisioner<'a> {
    pub fn new(stitcher: &'a dyn DemStitcher) -> Self {
        Self { stitcher }
    }

    /// Resolve a DEM covering `bbox`
    ///
    /// A caller-supplied `existing_dem` short-circuits stitching: it must
    /// exist together with its descriptor sidecar and is otherwise trusted
    /// as-is, without coverage re-validation.
    pub fn resolve(
        &self,
        bbox: &BoundingBox,
        dem_dir: &Path,
        source: DemSource,
        existing_dem: Option<&Path>,
    ) -> TopoResult<PathBuf> {
        if let Some(existing) = existing_dem {
            let resolved = ensure_dem_inputs(existing)?;
            log::info!("Using existing DEM: {}", resolved.display());
            return Ok(resolved);
        }

        std::fs::create_dir_all(dem_dir)?;
        let bounds = bbox.expand_to_integer_degrees();
        let name = default_dem_name(&bounds);
        log::info!(
            "Stitching DEM {} for lat [{}, {}], lon [{}, {}] from source {}",
            name,
            bounds.south,
            bounds.north,
            bounds.west,
            bounds.east,
            source
        );

        let request = StitchRequest {
            lat: [bounds.south, bounds.north],
            lon: [bounds.west, bounds.east],
            source,
            name: name.clone(),
            download_dir: dem_dir.to_path_buf(),
            keep_tiles: true,
            write_descriptor: true,
        };
        if !self.stitcher.stitch(&request)? {
            return Err(TopoError::DemAcquisition(format!(
                "stitching failed for lat [{}, {}], lon [{}, {}] from source {}",
                bounds.south, bounds.north, bounds.west, bounds.east, source
            )));
        }
        Ok(dem_dir.join(name))
    }
}
