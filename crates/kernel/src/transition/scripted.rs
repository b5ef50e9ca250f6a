//! In-memory scene loader for orchestrator tests.

use std::collections::{HashMap, HashSet};

use super::loader::{LoadProgress, SceneLoadError, SceneLoader, SceneOp};
use crate::spawn::SpawnPoint;

const STALLED_PROGRESS: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Load,
    Unload,
}

#[derive(Debug)]
struct PendingOp {
    scene: String,
    kind: OpKind,
    progress: f32,
    allow_activation: bool,
}

/// Advances every pending operation by `step` per poll and records each call
/// as a short event string such as `"load:Transition"` or `"active:B"`.
#[derive(Debug)]
pub(crate) struct ScriptedSceneLoader {
    pub step: f32,
    pub events: Vec<String>,
    pub fail_loading: HashSet<String>,
    pub panic_loading: HashSet<String>,
    loaded: Vec<String>,
    active: Option<String>,
    ops: HashMap<u64, PendingOp>,
    next_op: u64,
    spawn_points: HashMap<String, Vec<SpawnPoint>>,
}

impl ScriptedSceneLoader {
    pub fn new(active_scene: &str) -> Self {
        Self {
            step: 0.5,
            events: Vec::new(),
            fail_loading: HashSet::new(),
            panic_loading: HashSet::new(),
            loaded: vec![active_scene.to_string()],
            active: Some(active_scene.to_string()),
            ops: HashMap::new(),
            next_op: 1,
            spawn_points: HashMap::new(),
        }
    }

    pub fn with_spawn_points(mut self, scene: &str, points: Vec<SpawnPoint>) -> Self {
        self.spawn_points.insert(scene.to_string(), points);
        self
    }

    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    pub fn count_events(&self, event: &str) -> usize {
        self.events.iter().filter(|recorded| *recorded == event).count()
    }

    fn start(&mut self, scene: &str, kind: OpKind, allow_activation: bool) -> SceneOp {
        let op = SceneOp(self.next_op);
        self.next_op += 1;
        self.ops.insert(
            op.0,
            PendingOp {
                scene: scene.to_string(),
                kind,
                progress: 0.0,
                allow_activation,
            },
        );
        op
    }
}

impl SceneLoader for ScriptedSceneLoader {
    fn load_additive(
        &mut self,
        scene: &str,
        allow_activation: bool,
    ) -> Result<SceneOp, SceneLoadError> {
        self.events.push(format!("load:{scene}"));
        if self.panic_loading.contains(scene) {
            panic!("scripted panic while loading {scene}");
        }
        if self.fail_loading.contains(scene) {
            return Err(SceneLoadError::UnknownScene {
                scene: scene.to_string(),
            });
        }
        Ok(self.start(scene, OpKind::Load, allow_activation))
    }

    fn allow_activation(&mut self, op: SceneOp) -> Result<(), SceneLoadError> {
        let pending = self
            .ops
            .get_mut(&op.0)
            .ok_or(SceneLoadError::UnknownOperation { op: op.0 })?;
        pending.allow_activation = true;
        self.events.push(format!("allow:{}", pending.scene));
        Ok(())
    }

    fn unload(&mut self, scene: &str) -> Result<SceneOp, SceneLoadError> {
        self.events.push(format!("unload:{scene}"));
        if !self.loaded.iter().any(|loaded| loaded == scene) {
            return Err(SceneLoadError::NotLoaded {
                scene: scene.to_string(),
            });
        }
        Ok(self.start(scene, OpKind::Unload, true))
    }

    fn poll(&mut self, op: SceneOp) -> Result<LoadProgress, SceneLoadError> {
        let pending = self
            .ops
            .get_mut(&op.0)
            .ok_or(SceneLoadError::UnknownOperation { op: op.0 })?;
        pending.progress = (pending.progress + self.step).min(1.0);
        if !pending.allow_activation {
            pending.progress = pending.progress.min(STALLED_PROGRESS);
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
        match finished.kind {
            OpKind::Load => self.loaded.push(finished.scene),
            OpKind::Unload => {
                self.loaded.retain(|loaded| *loaded != finished.scene);
                if self.active.as_deref() == Some(finished.scene.as_str()) {
                    self.active = None;
                }
            }
        }
        Ok(LoadProgress::DONE)
    }

    fn active_scene(&self) -> Option<String> {
        self.active.clone()
    }

    fn set_active_scene(&mut self, scene: &str) -> Result<(), SceneLoadError> {
        self.events.push(format!("active:{scene}"));
        if !self.loaded.iter().any(|loaded| loaded == scene) {
            return Err(SceneLoadError::NotLoaded {
                scene: scene.to_string(),
            });
        }
        self.active = Some(scene.to_string());
        Ok(())
    }

    fn activate_overlay_camera(&mut self, overlay_scene: &str) -> Result<(), SceneLoadError> {
        self.events.push(format!("camera:{overlay_scene}"));
        Ok(())
    }

    fn spawn_points(&self, scene: &str) -> Vec<SpawnPoint> {
        self.spawn_points.get(scene).cloned().unwrap_or_default()
    }
}
