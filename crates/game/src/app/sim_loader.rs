use std::collections::{HashMap, HashSet, VecDeque};

use kernel::{LoadProgress, SceneLoadError, SceneLoader, SceneOp, SpawnPoint};
use tracing::{debug, info};

/// Progress a load stalls at until activation is allowed.
const ACTIVATION_HOLD_PROGRESS: f32 = 0.9;
const DEFAULT_PROGRESS_STEP: f32 = 0.25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SceneEvent {
    Loaded(String),
    Unloaded(String),
}

#[derive(Debug)]
struct PendingLoad {
    scene: String,
    progress: f32,
    allow_activation: bool,
}

/// In-memory scene loader for the headless host.
///
/// Every poll advances a pending load by a fixed step. Unloads finish at once,
/// so one that is never polled still frees the scene. Finished loads and
/// unloads are queued as [`SceneEvent`]s for the session to build or tear down
/// scene features.
#[derive(Debug)]
pub(crate) struct SimulatedSceneLoader {
    spawn_points: HashMap<String, Vec<SpawnPoint>>,
    overlay_scene: String,
    progress_step: f32,
    loaded: Vec<String>,
    active: Option<String>,
    overlay_camera: Option<String>,
    ops: HashMap<u64, PendingLoad>,
    finished_unloads: HashSet<u64>,
    next_op: u64,
    events: VecDeque<SceneEvent>,
}

impl SimulatedSceneLoader {
    pub(crate) fn new(
        spawn_points: HashMap<String, Vec<SpawnPoint>>,
        overlay_scene: impl Into<String>,
    ) -> Self {
        Self {
            spawn_points,
            overlay_scene: overlay_scene.into(),
            progress_step: DEFAULT_PROGRESS_STEP,
            loaded: Vec::new(),
            active: None,
            overlay_camera: None,
            ops: HashMap::new(),
            finished_unloads: HashSet::new(),
            next_op: 1,
            events: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_progress_step(mut self, step: f32) -> Self {
        self.progress_step = if step > 0.0 {
            step
        } else {
            DEFAULT_PROGRESS_STEP
        };
        self
    }

    /// Loads and activates `scene` at once. Used for the start scene.
    pub(crate) fn load_immediately(&mut self, scene: &str) -> Result<(), SceneLoadError> {
        self.ensure_known(scene)?;
        self.finish_load(scene.to_string());
        self.active = Some(scene.to_string());
        info!(scene, "scene_activated");
        Ok(())
    }

    pub(crate) fn drain_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn is_loaded(&self, scene: &str) -> bool {
        self.loaded.iter().any(|loaded| loaded == scene)
    }

    #[cfg(test)]
    pub(crate) fn loaded_scenes(&self) -> &[String] {
        &self.loaded
    }

    #[cfg(test)]
    pub(crate) fn overlay_camera(&self) -> Option<&str> {
        self.overlay_camera.as_deref()
    }

    fn ensure_known(&self, scene: &str) -> Result<(), SceneLoadError> {
        if scene == self.overlay_scene || self.spawn_points.contains_key(scene) {
            Ok(())
        } else {
            Err(SceneLoadError::UnknownScene {
                scene: scene.to_string(),
            })
        }
    }

    fn next_op(&mut self) -> SceneOp {
        let op = SceneOp(self.next_op);
        self.next_op += 1;
        op
    }

    fn finish_load(&mut self, scene: String) {
        self.loaded.push(scene.clone());
        info!(scene = %scene, "scene_loaded");
        self.events.push_back(SceneEvent::Loaded(scene));
    }

    fn finish_unload(&mut self, scene: String) {
        self.loaded.retain(|loaded| *loaded != scene);
        if self.active.as_deref() == Some(scene.as_str()) {
            self.active = None;
        }
        if self.overlay_camera.as_deref() == Some(scene.as_str()) {
            self.overlay_camera = None;
        }
        info!(scene = %scene, "scene_unloaded");
        self.events.push_back(SceneEvent::Unloaded(scene));
    }
}

impl SceneLoader for SimulatedSceneLoader {
    fn load_additive(
        &mut self,
        scene: &str,
        allow_activation: bool,
    ) -> Result<SceneOp, SceneLoadError> {
        self.ensure_known(scene)?;
        let op = self.next_op();
        self.ops.insert(
            op.0,
            PendingLoad {
                scene: scene.to_string(),
                progress: 0.0,
                allow_activation,
            },
        );
        debug!(scene, op = op.0, allow_activation, "scene_load_started");
        Ok(op)
    }

    fn allow_activation(&mut self, op: SceneOp) -> Result<(), SceneLoadError> {
        let pending = self
            .ops
            .get_mut(&op.0)
            .ok_or(SceneLoadError::UnknownOperation { op: op.0 })?;
        pending.allow_activation = true;
        Ok(())
    }

    fn unload(&mut self, scene: &str) -> Result<SceneOp, SceneLoadError> {
        if !self.is_loaded(scene) {
            return Err(SceneLoadError::NotLoaded {
                scene: scene.to_string(),
            });
        }
        let op = self.next_op();
        self.finish_unload(scene.to_string());
        self.finished_unloads.insert(op.0);
        Ok(op)
    }

    fn poll(&mut self, op: SceneOp) -> Result<LoadProgress, SceneLoadError> {
        if self.finished_unloads.remove(&op.0) {
            return Ok(LoadProgress::DONE);
        }
        let step = self.progress_step;
        let pending = self
            .ops
            .get_mut(&op.0)
            .ok_or(SceneLoadError::UnknownOperation { op: op.0 })?;
        pending.progress = (pending.progress + step).min(1.0);
        if !pending.allow_activation {
            pending.progress = pending.progress.min(ACTIVATION_HOLD_PROGRESS);
        }
        if pending.progress < 1.0 {
            return Ok(LoadProgress {
                progress: pending.progress,
                is_done: false,
            });
        }

        let Some(finished) = self.ops.remove(&op.0) else {
            return Err(SceneLoadError::UnknownOperation { op: op.0 });
        };
        self.finish_load(finished.scene);
        Ok(LoadProgress::DONE)
    }

    fn active_scene(&self) -> Option<String> {
        self.active.clone()
    }

    fn set_active_scene(&mut self, scene: &str) -> Result<(), SceneLoadError> {
        if !self.is_loaded(scene) {
            return Err(SceneLoadError::NotLoaded {
                scene: scene.to_string(),
            });
        }
        self.active = Some(scene.to_string());
        Ok(())
    }

    fn activate_overlay_camera(&mut self, overlay_scene: &str) -> Result<(), SceneLoadError> {
        if !self.is_loaded(overlay_scene) {
            return Err(SceneLoadError::NotLoaded {
                scene: overlay_scene.to_string(),
            });
        }
        self.overlay_camera = Some(overlay_scene.to_string());
        Ok(())
    }

    fn spawn_points(&self, scene: &str) -> Vec<SpawnPoint> {
        self.spawn_points.get(scene).cloned().unwrap_or_default()
    }
}
