//! Product parsing, DEM handling, and SRTM stitching

pub mod product;
pub mod dem;
pub mod stitch;

// Re-export main types
pub use product::{
    BurstProduct, BurstRecord, FrameProduct, FrameRecord, ParsedProduct, ProductReader,
    ReaderCapability, ReaderConfig, ReaderFactory, ReaderShape, SensorKind,
    StripmapReaderConfig, TopsReaderConfig, UnitGroup,
};
pub use dem::{DemDescriptor, DemHandle, DemProvisioner, DemSource, DemStitcher, StitchRequest};
pub use stitch::SrtmStitcher;
