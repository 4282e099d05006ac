//! Geometry task extraction, engine dispatch, and scene orchestration

pub mod extract;
pub mod topo;
pub mod scene;

// Re-export main types
pub use extract::TaskExtractor;
pub use topo::{TopoEngine, TopoExtent, TopoOutputs, TopoProcessor, TopoRequest};
pub use scene::{
    generate_scene_shadow_masks, generate_shadow_layover, SceneOptions, SceneProcessor,
    SceneRequest, TaskFailurePolicy,
};
