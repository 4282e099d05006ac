//! topomask: Per-burst SAR ground geometry and shadow/layover masks
//!
//! Computes latitude, longitude, height, line-of-sight, local incidence
//! angle, and shadow/layover classification rasters per acquisition unit
//! (TOPS burst or stripmap frame), orchestrating bounding-box selection,
//! DEM provisioning and stitching, and per-unit dispatch of an external
//! terrain-intersection engine.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use crate::types::{
    BoundingBox, BurstRange, DegreeBounds, DemInterpMethod, GeometryResult, GeometryTask,
    LookSide, OrbitData, Planet, Polarization, SceneMetadata, SceneResult, StateVector,
    TopoError, TopoResult,
};

pub use crate::io::{
    DemDescriptor, DemHandle, DemProvisioner, DemSource, DemStitcher, ParsedProduct,
    ProductReader, ReaderConfig, ReaderFactory, SensorKind, SrtmStitcher, StitchRequest,
    UnitGroup,
};

pub use crate::core::{
    generate_scene_shadow_masks, generate_shadow_layover, SceneOptions, SceneProcessor,
    SceneRequest, TaskExtractor, TaskFailurePolicy, TopoEngine, TopoExtent, TopoOutputs,
    TopoProcessor, TopoRequest,
};
