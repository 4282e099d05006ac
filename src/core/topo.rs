use crate::io::dem::DemHandle;
use crate::types::{
    BoundingBox, DemInterpMethod, GeometryTask, OrbitData, Planet, TopoError, TopoResult,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// The six rasters one geometry task produces
#[derive(Debug, Clone, PartialEq)]
pub struct TopoOutputs {
    pub lat: PathBuf,
    pub lon: PathBuf,
    pub hgt: PathBuf,
    pub los: PathBuf,
    pub inc: PathBuf,
    pub mask: PathBuf,
}

impl TopoOutputs {
    /// Deterministic raster paths for one task tag
    pub fn for_tag(dir: &Path, tag: &str) -> Self {
        Self {
            lat: dir.join(format!("lat_{}.rdr", tag)),
            lon: dir.join(format!("lon_{}.rdr", tag)),
            hgt: dir.join(format!("hgt_{}.rdr", tag)),
            los: dir.join(format!("los_{}.rdr", tag)),
            inc: dir.join(format!("incLocal_{}.rdr", tag)),
            mask: dir.join(format!("shadowMask_{}.rdr", tag)),
        }
    }

    pub fn all(&self) -> [&Path; 6] {
        [
            &self.lat, &self.lon, &self.hgt, &self.los, &self.inc, &self.mask,
        ]
    }

    /// First raster not present on disk
    pub fn first_missing(&self) -> Option<&Path> {
        self.all().into_iter().find(|p| !p.is_file())
    }
}

/// Flat parameter set handed to the terrain-intersection engine
#[derive(Debug, Clone)]
pub struct TopoRequest {
    pub width: usize,
    pub length: usize,
    pub range_pixel_spacing: f64,
    pub prf: f64,
    pub radar_wavelength: f64,
    pub orbit: Arc<OrbitData>,
    pub sensing_start: DateTime<Utc>,
    pub starting_range: f64,
    /// +1 left-looking, -1 right-looking
    pub look_side: i32,
    pub range_looks: u32,
    pub azimuth_looks: u32,
    pub dem_interp: DemInterpMethod,
    pub outputs: TopoOutputs,
}

/// Ground extrema reported by the engine after a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopoExtent {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl TopoExtent {
    /// Extrema as a bounding box; `None` when degenerate or non-finite
    pub fn to_bbox(&self) -> Option<BoundingBox> {
        let ok = self.min_latitude.is_finite()
            && self.max_latitude.is_finite()
            && self.min_longitude.is_finite()
            && self.max_longitude.is_finite()
            && self.min_latitude <= self.max_latitude
            && self.min_longitude <= self.max_longitude;
        ok.then(|| {
            BoundingBox::new(
                self.min_latitude,
                self.max_latitude,
                self.min_longitude,
                self.max_longitude,
            )
        })
    }
}

/// Terrain-intersection engine collaborator
///
/// Implementations solve the range-Doppler equations against the DEM and
/// write the six rasters named in the request before returning the ground
/// extrema they covered.
pub trait TopoEngine: Send + Sync {
    fn execute(
        &self,
        request: &TopoRequest,
        dem: &DemHandle,
        planet: &Planet,
    ) -> TopoResult<TopoExtent>;
}

/// Runs one geometry task through the engine and verifies its products
///
/// Holds the planet model and an optional per-task time limit; the engine
/// itself is shared behind an `Arc` so tasks can run from worker threads.
pub struct TopoProcessor {
    engine: Arc<dyn TopoEngine>,
    planet: Planet,
    timeout: Option<Duration>,
}

impl TopoProcessor {
    pub fn new(engine: Arc<dyn TopoEngine>) -> Self {
        Self {
            engine,
            planet: Planet::earth(),
            timeout: None,
        }
    }

    pub fn with_planet(mut self, planet: Planet) -> Self {
        self.planet = planet;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute one task, returning its ground bbox and the mask raster path
    ///
    /// All six rasters must exist on disk afterwards; a missing raster or
    /// degenerate extrema fail the task. Failed tasks are never retried.
    pub fn run(
        &self,
        task: &GeometryTask,
        dem: &Arc<DemHandle>,
        output_dir: &Path,
        dem_interp: DemInterpMethod,
    ) -> TopoResult<(BoundingBox, PathBuf)> {
        let outputs = TopoOutputs::for_tag(output_dir, &task.tag);
        let request = TopoRequest {
            width: task.width,
            length: task.length,
            range_pixel_spacing: task.range_pixel_spacing,
            prf: task.prf,
            radar_wavelength: task.radar_wavelength,
            orbit: Arc::clone(&task.orbit),
            sensing_start: task.sensing_start,
            starting_range: task.starting_range,
            look_side: task.look_side.sign(),
            range_looks: 1,
            azimuth_looks: 1,
            dem_interp,
            outputs: outputs.clone(),
        };

        log::info!(
            "Computing geometry for {} ({} samples x {} lines, {} looking)",
            task.label,
            task.width,
            task.length,
            task.look_side
        );

        let extent = match self.timeout {
            None => self.engine.execute(&request, dem, &self.planet)?,
            Some(limit) => self.execute_with_timeout(&request, dem, limit, &task.label)?,
        };

        if let Some(missing) = outputs.first_missing() {
            return Err(TopoError::EngineExecution(format!(
                "{}: engine did not produce {}",
                task.label,
                missing.display()
            )));
        }

        let bbox = extent.to_bbox().ok_or_else(|| {
            TopoError::EngineExecution(format!(
                "{}: engine returned degenerate ground extrema",
                task.label
            ))
        })?;

        log::debug!(
            "{}: ground coverage lat {:.4}..{:.4}, lon {:.4}..{:.4}",
            task.label,
            bbox.south,
            bbox.north,
            bbox.west,
            bbox.east
        );
        Ok((bbox, outputs.mask))
    }

    /// Run the engine on a worker thread, abandoning it on expiry
    fn execute_with_timeout(
        &self,
        request: &TopoRequest,
        dem: &Arc<DemHandle>,
        limit: Duration,
        label: &str,
    ) -> TopoResult<TopoExtent> {
        let (sender, receiver) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        let planet = self.planet.clone();
        let request = request.clone();
        let dem = Arc::clone(dem);

        std::thread::Builder::new()
            .name(format!("topo-{}", label))
            .spawn(move || {
                // The receiver may be gone after a timeout; nothing to report then
                let _ = sender.send(engine.execute(&request, &dem, &planet));
            })
            .map_err(|e| {
                TopoError::EngineExecution(format!("{}: failed to spawn worker: {}", label, e))
            })?;

        match receiver.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(TopoError::EngineExecution(format!(
                "{}: engine timed out after {:.1}s",
                label,
                limit.as_secs_f64()
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(TopoError::EngineExecution(format!(
                "{}: engine worker terminated without a result",
                label
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::dem::DemDescriptor;
    use crate::types::LookSide;
    use tempfile::TempDir;

    fn test_dem(dir: &Path) -> Arc<DemHandle> {
        let dem = dir.join("test.dem.wgs84");
        std::fs::write(&dem, [0u8; 8]).unwrap();
        DemDescriptor {
            width: 3600,
            length: 3600,
            first_latitude: 39.0,
            first_longitude: -123.0,
            delta_latitude: -1.0 / 3600.0,
            delta_longitude: 1.0 / 3600.0,
            no_data_value: None,
            datum: None,
        }
        .write_for(&dem)
        .unwrap();
        Arc::new(DemHandle::open(&dem).unwrap())
    }

    fn test_task(tag: &str) -> GeometryTask {
        GeometryTask {
            label: format!("burst_{}", tag),
            tag: tag.to_string(),
            width: 25_483,
            length: 1_507,
            range_pixel_spacing: 2.329_562,
            prf: 486.486,
            radar_wavelength: 0.055_465_76,
            orbit: Arc::new(OrbitData {
                state_vectors: Vec::new(),
                reference_time: Utc::now(),
            }),
            sensing_start: Utc::now(),
            starting_range: 803_347.0,
            look_side: LookSide::Right,
            polarization: None,
        }
    }

    fn extent(s: f64, n: f64, w: f64, e: f64) -> TopoExtent {
        TopoExtent {
            min_latitude: s,
            max_latitude: n,
            min_longitude: w,
            max_longitude: e,
        }
    }

    struct WritingEngine {
        extent: TopoExtent,
        skip: Option<usize>,
    }

    impl TopoEngine for WritingEngine {
        fn execute(
            &self,
            request: &TopoRequest,
            _dem: &DemHandle,
            _planet: &Planet,
        ) -> TopoResult<TopoExtent> {
            for (i, path) in request.outputs.all().into_iter().enumerate() {
                if self.skip == Some(i) {
                    continue;
                }
                std::fs::write(path, b"raster")?;
            }
            Ok(self.extent)
        }
    }

    struct SleepingEngine;

    impl TopoEngine for SleepingEngine {
        fn execute(
            &self,
            _request: &TopoRequest,
            _dem: &DemHandle,
            _planet: &Planet,
        ) -> TopoResult<TopoExtent> {
            std::thread::sleep(Duration::from_millis(400));
            Ok(extent(0.0, 1.0, 0.0, 1.0))
        }
    }

    #[test]
    fn test_output_paths_for_tag() {
        let outputs = TopoOutputs::for_tag(Path::new("/out/IW2"), "03");
        assert_eq!(outputs.lat, PathBuf::from("/out/IW2/lat_03.rdr"));
        assert_eq!(outputs.inc, PathBuf::from("/out/IW2/incLocal_03.rdr"));
        assert_eq!(outputs.mask, PathBuf::from("/out/IW2/shadowMask_03.rdr"));

        let frame = TopoOutputs::for_tag(Path::new("/out/frame"), "frame");
        assert_eq!(frame.hgt, PathBuf::from("/out/frame/hgt_frame.rdr"));
    }

    #[test]
    fn test_run_returns_extent_and_mask_path() {
        let dir = TempDir::new().unwrap();
        let dem = test_dem(dir.path());
        let engine = Arc::new(WritingEngine {
            extent: extent(37.1, 38.2, -122.4, -121.3),
            skip: None,
        });

        let (bbox, mask) = TopoProcessor::new(engine)
            .run(
                &test_task("03"),
                &dem,
                dir.path(),
                DemInterpMethod::Biquintic,
            )
            .unwrap();

        assert_eq!(bbox, BoundingBox::new(37.1, 38.2, -122.4, -121.3));
        assert_eq!(mask, dir.path().join("shadowMask_03.rdr"));
        for path in TopoOutputs::for_tag(dir.path(), "03").all() {
            assert!(path.is_file(), "missing {}", path.display());
        }
    }

    #[test]
    fn test_missing_raster_fails_the_task() {
        let dir = TempDir::new().unwrap();
        let dem = test_dem(dir.path());
        let engine = Arc::new(WritingEngine {
            extent: extent(37.1, 38.2, -122.4, -121.3),
            skip: Some(4),
        });

        let err = TopoProcessor::new(engine)
            .run(
                &test_task("01"),
                &dem,
                dir.path(),
                DemInterpMethod::Biquintic,
            )
            .unwrap_err();
        assert!(matches!(err, TopoError::EngineExecution(_)));
        assert!(err.to_string().contains("incLocal_01.rdr"));
    }

    #[test]
    fn test_degenerate_extrema_fail_the_task() {
        let dir = TempDir::new().unwrap();
        let dem = test_dem(dir.path());
        let engine = Arc::new(WritingEngine {
            extent: extent(38.2, 37.1, -122.4, -121.3),
            skip: None,
        });

        let err = TopoProcessor::new(engine)
            .run(
                &test_task("01"),
                &dem,
                dir.path(),
                DemInterpMethod::Biquintic,
            )
            .unwrap_err();
        assert!(matches!(err, TopoError::EngineExecution(_)));
    }

    #[test]
    fn test_timeout_expires_for_hung_engine() {
        let dir = TempDir::new().unwrap();
        let dem = test_dem(dir.path());

        let err = TopoProcessor::new(Arc::new(SleepingEngine))
            .with_timeout(Some(Duration::from_millis(50)))
            .run(
                &test_task("01"),
                &dem,
                dir.path(),
                DemInterpMethod::Biquintic,
            )
            .unwrap_err();
        assert!(matches!(err, TopoError::EngineExecution(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_fast_engine_beats_the_timeout() {
        let dir = TempDir::new().unwrap();
        let dem = test_dem(dir.path());
        let engine = Arc::new(WritingEngine {
            extent: extent(37.1, 38.2, -122.4, -121.3),
            skip: None,
        });

        let result = TopoProcessor::new(engine)
            .with_timeout(Some(Duration::from_secs(5)))
            .run(
                &test_task("02"),
                &dem,
                dir.path(),
                DemInterpMethod::Biquintic,
            );
        assert!(result.is_ok());
    }
}
