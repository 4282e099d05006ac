use crate::core::extract::TaskExtractor;
use crate::core::topo::{TopoEngine, TopoProcessor};
use crate::io::dem::{DemHandle, DemProvisioner, DemSource, DemStitcher};
use crate::io::product::{ParsedProduct, ReaderConfig, ReaderFactory, SensorKind, UnitGroup};
use crate::types::{
    BoundingBox, BurstRange, DemInterpMethod, GeometryResult, GeometryTask, Polarization,
    SceneMetadata, SceneResult, TopoError, TopoResult,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// What to do when a single geometry task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFailurePolicy {
    /// Fail the whole scene on the first task error
    Abort,
    /// Log the failure, skip the task, keep going
    Continue,
}

impl Default for TaskFailurePolicy {
    fn default() -> Self {
        TaskFailurePolicy::Abort
    }
}

/// Execution knobs for a scene run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SceneOptions {
    pub failure_policy: TaskFailurePolicy,
    /// Upper bound on a single engine invocation
    pub task_timeout: Option<Duration>,
    /// Run tasks on the rayon pool instead of sequentially
    pub parallel: bool,
}

/// Everything one scene run needs, all explicit
#[derive(Debug, Clone)]
pub struct SceneRequest {
    pub sensor: SensorKind,
    pub reader: ReaderConfig,
    pub polarization: Polarization,
    /// Sub-swath numbers for burst-mode sensors; `None` means all three
    pub swaths: Option<Vec<u8>>,
    pub output_dir: PathBuf,
    pub dem_dir: PathBuf,
    pub dem_source: DemSource,
    /// Existing DEM to use instead of stitching
    pub dem_path: Option<PathBuf>,
    pub burst_range: Option<BurstRange>,
    pub dem_interp: DemInterpMethod,
    pub options: SceneOptions,
}

/// Orchestrates a whole scene: readers, coverage, DEM, per-unit geometry
///
/// Holds only its collaborators; each `run` is independent and leaves no
/// state behind.
pub struct SceneProcessor {
    factory: Arc<dyn ReaderFactory>,
    stitcher: Arc<dyn DemStitcher>,
    engine: Arc<dyn TopoEngine>,
}

impl SceneProcessor {
    pub fn new(
        factory: Arc<dyn ReaderFactory>,
        stitcher: Arc<dyn DemStitcher>,
        engine: Arc<dyn TopoEngine>,
    ) -> Self {
        Self {
            factory,
            stitcher,
            engine,
        }
    }

    /// Run the full pipeline, returning one result per unit group
    ///
    /// Groups whose product holds no units are skipped; a scene where no
    /// group contributes coverage fails with `NoCoverage`, and one where no
    /// task survives fails with `EmptyResult`.
    pub fn run(&self, request: &SceneRequest) -> TopoResult<HashMap<String, SceneResult>> {
        request.reader.validate()?;
        if !request.reader.matches_sensor(request.sensor) {
            return Err(TopoError::Config(format!(
                "reader configuration does not match sensor family {}",
                request.sensor
            )));
        }
        let groups = request.sensor.unit_groups(request.swaths.as_deref())?;
        log::info!(
            "Processing {} scene: {} unit groups, polarization {}",
            request.sensor,
            groups.len(),
            request.polarization
        );

        // Parse every reader once; products are reused for coverage and tasks
        let mut products: Vec<(UnitGroup, ParsedProduct)> = Vec::with_capacity(groups.len());
        for group in groups {
            let mut reader =
                self.factory
                    .build(request.sensor, &request.reader, group, request.polarization)?;
            let product = reader.parse()?;
            if product.shape.capability() != request.sensor.capability() {
                return Err(TopoError::UnsupportedReader(format!(
                    "{} reader produced a {} product, expected {}",
                    group.label(),
                    product.shape.capability(),
                    request.sensor.capability()
                )));
            }
            products.push((group, product));
        }

        let mut coverage = Vec::new();
        for (group, product) in &products {
            match product.coverage_bbox() {
                Some(bbox) => coverage.push(bbox),
                None => log::warn!("{}: product holds no units, skipping", group.label()),
            }
        }
        if coverage.is_empty() {
            return Err(TopoError::NoCoverage(
                "no reader contributed a bounding box".to_string(),
            ));
        }
        let scene_bbox = BoundingBox::union_all(coverage)?;
        log::info!(
            "Scene coverage: lat {:.4}..{:.4}, lon {:.4}..{:.4}",
            scene_bbox.south,
            scene_bbox.north,
            scene_bbox.west,
            scene_bbox.east
        );

        let provisioner = DemProvisioner::new(self.stitcher.as_ref());
        let dem_path = provisioner.resolve(
            &scene_bbox,
            &request.dem_dir,
            request.dem_source,
            request.dem_path.as_deref(),
        )?;
        let dem = Arc::new(DemHandle::open(&dem_path)?);

        std::fs::create_dir_all(&request.output_dir)?;
        let processor =
            TopoProcessor::new(Arc::clone(&self.engine)).with_timeout(request.options.task_timeout);

        let mut results = HashMap::new();
        for (group, product) in &products {
            if product.unit_count() == 0 {
                continue;
            }
            if let Some(result) =
                self.run_unit_group(&processor, *group, product, &dem, &dem_path, request)?
            {
                results.insert(group.label(), result);
            }
        }

        if results.is_empty() {
            return Err(TopoError::EmptyResult(
                "no geometry task completed".to_string(),
            ));
        }
        Ok(results)
    }

    /// Process one unit group; `Ok(None)` when every task failed under the
    /// `Continue` policy
    fn run_unit_group(
        &self,
        processor: &TopoProcessor,
        group: UnitGroup,
        product: &ParsedProduct,
        dem: &Arc<DemHandle>,
        dem_path: &Path,
        request: &SceneRequest,
    ) -> TopoResult<Option<SceneResult>> {
        let label = group.label();
        let group_dir = request.output_dir.join(&label);
        std::fs::create_dir_all(&group_dir)?;

        let tasks = TaskExtractor::extract(product, request.burst_range)?;
        log::info!("{}: running {} geometry tasks", label, tasks.len());

        let outcomes = self.run_tasks(processor, &tasks, dem, &group_dir, request)?;

        let mut units = Vec::new();
        let mut boxes = Vec::new();
        for (task, outcome) in tasks.iter().zip(outcomes) {
            if let Some((bbox, mask_path)) = outcome {
                units.push(GeometryResult {
                    label: task.label.clone(),
                    mask_path,
                    bbox,
                    polarization: task.polarization,
                });
                boxes.push(bbox);
            }
        }

        if units.is_empty() {
            log::warn!("{}: every task failed, dropping group", label);
            return Ok(None);
        }

        let overall_bbox = BoundingBox::union_all(boxes)?;
        let tasks_attempted = tasks.len();
        let tasks_completed = units.len();
        log::info!(
            "{}: {} of {} tasks completed",
            label,
            tasks_completed,
            tasks_attempted
        );
        Ok(Some(SceneResult {
            output_directory: group_dir,
            units,
            overall_bbox,
            metadata: SceneMetadata {
                group: label,
                polarization: product.polarization,
                dem_path: dem_path.to_path_buf(),
                dem_interp: request.dem_interp,
                tasks_attempted,
                tasks_completed,
            },
        }))
    }

    /// Run tasks in order (or on the rayon pool) and apply the failure policy
    ///
    /// Outcomes stay aligned with the task list; under `Abort` the first
    /// error in task order wins, also for parallel runs.
    fn run_tasks(
        &self,
        processor: &TopoProcessor,
        tasks: &[GeometryTask],
        dem: &Arc<DemHandle>,
        group_dir: &Path,
        request: &SceneRequest,
    ) -> TopoResult<Vec<Option<(BoundingBox, PathBuf)>>> {
        let run_one =
            |task: &GeometryTask| processor.run(task, dem, group_dir, request.dem_interp);
        let policy = request.options.failure_policy;

        let outcomes: Vec<TopoResult<(BoundingBox, PathBuf)>> = if request.options.parallel {
            tasks.par_iter().map(run_one).collect()
        } else {
            let mut collected = Vec::with_capacity(tasks.len());
            for task in tasks {
                let outcome = run_one(task);
                let failed = outcome.is_err();
                collected.push(outcome);
                if failed && policy == TaskFailurePolicy::Abort {
                    break;
                }
            }
            collected
        };

        let mut results = Vec::with_capacity(outcomes.len());
        for (task, outcome) in tasks.iter().zip(outcomes) {
            match outcome {
                Ok(pair) => results.push(Some(pair)),
                Err(e) => match policy {
                    TaskFailurePolicy::Abort => return Err(e),
                    TaskFailurePolicy::Continue => {
                        log::warn!("{}: task failed, skipping: {}", task.label, e);
                        results.push(None);
                    }
                },
            }
        }
        Ok(results)
    }
}

/// Generate geometry products for one already-parsed product
///
/// Convenience wrapper around the extractor and the engine adapter: opens
/// the DEM (descriptor included) before any engine work, then runs every
/// task sequentially, aborting on the first failure. The planet is Earth on
/// WGS84.
pub fn generate_shadow_layover(
    engine: Arc<dyn TopoEngine>,
    dem_path: &Path,
    output_dir: &Path,
    product: &ParsedProduct,
    burst_range: Option<BurstRange>,
    dem_interp: DemInterpMethod,
) -> TopoResult<SceneResult> {
    let dem = Arc::new(DemHandle::open(dem_path)?);
    let tasks = TaskExtractor::extract(product, burst_range)?;

    let group_dir = output_dir.join(&product.label);
    std::fs::create_dir_all(&group_dir)?;

    let processor = TopoProcessor::new(engine);
    let mut units = Vec::with_capacity(tasks.len());
    let mut boxes = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let (bbox, mask_path) = processor.run(task, &dem, &group_dir, dem_interp)?;
        units.push(GeometryResult {
            label: task.label.clone(),
            mask_path,
            bbox,
            polarization: task.polarization,
        });
        boxes.push(bbox);
    }

    let overall_bbox = BoundingBox::union_all(boxes)?;
    let tasks_attempted = tasks.len();
    Ok(SceneResult {
        output_directory: group_dir,
        units,
        overall_bbox,
        metadata: SceneMetadata {
            group: product.label.clone(),
            polarization: product.polarization,
            dem_path: dem.path().to_path_buf(),
            dem_interp,
            tasks_attempted,
            tasks_completed: tasks_attempted,
        },
    })
}

/// Run a whole scene through a processor
pub fn generate_scene_shadow_masks(
    processor: &SceneProcessor,
    request: &SceneRequest,
) -> TopoResult<HashMap<String, SceneResult>> {
    processor.run(request)
}
