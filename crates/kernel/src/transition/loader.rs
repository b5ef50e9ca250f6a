use thiserror::Error;

use crate::spawn::SpawnPoint;

/// Handle for one pending load or unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneOp(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    /// 0.0 to 1.0. A load waiting for activation stops short of 1.0.
    pub progress: f32,
    pub is_done: bool,
}

impl LoadProgress {
    pub const DONE: LoadProgress = LoadProgress {
        progress: 1.0,
        is_done: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneLoadError {
    #[error("scene '{scene}' is not known to the loader")]
    UnknownScene { scene: String },
    #[error("scene '{scene}' is not loaded")]
    NotLoaded { scene: String },
    #[error("scene operation {op} is not pending")]
    UnknownOperation { op: u64 },
    #[error("scene backend failed for '{scene}': {message}")]
    Backend { scene: String, message: String },
}

/// Additive scene loading as seen by the transition orchestrator.
///
/// Loads and unloads return a handle that is polled once per tick until it
/// reports `is_done`. A load started with `allow_activation == false` must
/// stall below completion until [`SceneLoader::allow_activation`] is called.
pub trait SceneLoader {
    fn load_additive(&mut self, scene: &str, allow_activation: bool)
        -> Result<SceneOp, SceneLoadError>;
    fn allow_activation(&mut self, op: SceneOp) -> Result<(), SceneLoadError>;
    fn unload(&mut self, scene: &str) -> Result<SceneOp, SceneLoadError>;
    fn poll(&mut self, op: SceneOp) -> Result<LoadProgress, SceneLoadError>;
    fn active_scene(&self) -> Option<String>;
    fn set_active_scene(&mut self, scene: &str) -> Result<(), SceneLoadError>;
    fn activate_overlay_camera(&mut self, overlay_scene: &str) -> Result<(), SceneLoadError>;
    /// Spawn points of a loaded scene, in enumeration order.
    fn spawn_points(&self, scene: &str) -> Vec<SpawnPoint>;
}
