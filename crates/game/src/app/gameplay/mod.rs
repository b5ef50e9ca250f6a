//! Scene features and the headless game session that drives them.

pub(crate) mod loop_puzzle;
pub(crate) mod narrative;
pub(crate) mod pickup;
pub(crate) mod script;
pub(crate) mod stairs;
pub(crate) mod strange_door;

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use kernel::{
    AgentLocator, Door, DoorError, DoorGraph, EventBus, FactStore, Inventory, KernelContext,
    Observer, Placeable, RegistryError, SceneLoadError, SceneLoader, TransitionError,
    TransitionReport, TransitionStatus, Vec3,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, warn};

use self::loop_puzzle::LoopPuzzle;
use self::narrative::NarrativeTrigger;
use self::pickup::Pickup;
use self::script::{ScriptRunner, ScriptStep};
use self::stairs::InfiniteStairs;
use self::strange_door::StrangeDoor;
use super::sim_loader::{SceneEvent, SimulatedSceneLoader};
use super::world::{ObjectDef, SceneContent, World};

const PLAYER_BUS_OWNER: &str = "player";

/// Something placed in a scene that lives exactly as long as the scene is loaded.
pub(crate) trait SceneFeature {
    fn id(&self) -> &str;

    fn set_player_in_range(&self, _in_range: bool) {}

    /// Leaves the player's bus and records anything the visit decided.
    fn teardown(self: Rc<Self>);
}

impl SceneFeature for Door {
    fn id(&self) -> &str {
        self.door_id()
    }

    fn set_player_in_range(&self, in_range: bool) {
        Door::set_player_in_range(self, in_range);
    }

    fn teardown(self: Rc<Self>) {
        self.detach();
    }
}

#[derive(Debug, Error)]
pub(crate) enum FeatureError {
    #[error("{feature} references door '{door_id}' which has no connection")]
    MissingConnection {
        feature: &'static str,
        door_id: String,
    },
    #[error(transparent)]
    Door(#[from] DoorError),
}

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("failed to build scene features: {0}")]
    Feature(#[from] FeatureError),
    #[error("failed to load start scene: {0}")]
    StartScene(#[source] SceneLoadError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Subscribes `feature` to the player's bus. Returns the bus so the feature
/// can leave it again on teardown.
pub(crate) fn attach_to_player<O: Observer + 'static>(
    ctx: &KernelContext,
    feature: &Rc<O>,
) -> Option<Rc<EventBus>> {
    let bus = ctx.agents.player_bus().ok()?;
    bus.subscribe(feature);
    Some(bus)
}

/// Builds the shared services for `world`.
pub(crate) fn kernel_context(world: &World, seed: u64) -> KernelContext {
    KernelContext::new(seed, world.transition.clone())
        .with_inventory(Inventory::with_slots(world.inventory.max_slots))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Player {
    position: Vec3,
}

impl Placeable for Player {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn place_at(&mut self, position: Vec3) {
        self.position = position;
    }
}

/// One play session: the world content, the loaded scenes and their features,
/// and the script standing in for player input.
pub(crate) struct GameSession {
    ctx: KernelContext,
    graph: DoorGraph,
    scenes: HashMap<String, SceneContent>,
    loader: SimulatedSceneLoader,
    player: Player,
    player_bus: Rc<EventBus>,
    features: HashMap<String, Vec<Rc<dyn SceneFeature>>>,
    rng: StdRng,
    script: ScriptRunner,
    store: Box<dyn FactStore>,
    reports: Vec<TransitionReport>,
    failures: Vec<TransitionError>,
    ticks: u64,
}

impl GameSession {
    /// Restores the registry from `store`, then loads and populates the start
    /// scene with the player at the world's start position.
    pub(crate) fn new(
        world: World,
        ctx: KernelContext,
        store: Box<dyn FactStore>,
        seed: u64,
    ) -> Result<Self, SessionError> {
        let restored = ctx.registry.load(store.as_ref())?;
        let player_bus = Rc::new(EventBus::new(PLAYER_BUS_OWNER));
        ctx.agents.register_player(Rc::clone(&player_bus));

        let loader = SimulatedSceneLoader::new(
            world.spawn_points_by_scene(),
            world.transition.overlay_scene.clone(),
        );
        let mut session = Self {
            ctx,
            graph: world.graph,
            scenes: world.scenes,
            loader,
            player: Player {
                position: world.player_start,
            },
            player_bus,
            features: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            script: ScriptRunner::new(world.script),
            store,
            reports: Vec::new(),
            failures: Vec::new(),
            ticks: 0,
        };

        session
            .loader
            .load_immediately(&world.start_scene)
            .map_err(SessionError::StartScene)?;
        session.apply_scene_events()?;
        info!(
            start_scene = %world.start_scene,
            registry_restored = restored,
            script_steps = session.script.remaining(),
            "session_started"
        );
        Ok(session)
    }

    /// Runs one script step if one is due, then one orchestrator step, then
    /// builds or tears down features for scenes that finished loading.
    pub(crate) fn tick(&mut self, dt: Duration) -> Result<(), SessionError> {
        self.ticks += 1;
        let in_flight = self.ctx.transition_in_flight();
        if let Some(step) = self.script.next_step(in_flight) {
            self.apply(step)?;
        }

        let status = self
            .ctx
            .transitions
            .borrow_mut()
            .tick(dt, &mut self.loader, &mut self.player);
        match status {
            TransitionStatus::Completed(report) => self.reports.push(report),
            TransitionStatus::Failed(error) => self.failures.push(error),
            TransitionStatus::Idle | TransitionStatus::InFlight(_) => {}
        }

        self.apply_scene_events()
    }

    pub(crate) fn apply(&mut self, step: ScriptStep) -> Result<(), SessionError> {
        debug!(tick = self.ticks, step = ?step, "script_step");
        match step {
            ScriptStep::Approach { object } => self.approach(&object),
            ScriptStep::Leave => self.leave(),
            ScriptStep::Press { signal } => {
                self.player_bus.publish(signal);
            }
            ScriptStep::Wait { .. } | ScriptStep::AwaitTransition => {}
            ScriptStep::SaveRegistry => self.ctx.registry.save(self.store.as_ref())?,
        }
        Ok(())
    }

    /// Script done and no transition left running.
    pub(crate) fn is_settled(&self) -> bool {
        self.script.is_finished() && !self.ctx.transition_in_flight()
    }

    pub(crate) fn ctx(&self) -> &KernelContext {
        &self.ctx
    }

    pub(crate) fn player_position(&self) -> Vec3 {
        self.player.position
    }

    pub(crate) fn active_scene(&self) -> Option<String> {
        self.loader.active_scene()
    }

    #[cfg(test)]
    pub(crate) fn loader(&self) -> &SimulatedSceneLoader {
        &self.loader
    }

    pub(crate) fn reports(&self) -> &[TransitionReport] {
        &self.reports
    }

    pub(crate) fn failures(&self) -> &[TransitionError] {
        &self.failures
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    #[cfg(test)]
    pub(crate) fn has_feature(&self, scene: &str, id: &str) -> bool {
        self.features
            .get(scene)
            .is_some_and(|features| features.iter().any(|feature| feature.id() == id))
    }

    fn approach(&self, object: &str) {
        let Some(scene) = self.loader.active_scene() else {
            warn!(object, "approach_without_active_scene");
            return;
        };
        let features = self.features.get(&scene).map(Vec::as_slice).unwrap_or(&[]);
        let mut found = false;
        for feature in features {
            let in_range = feature.id() == object;
            found |= in_range;
            feature.set_player_in_range(in_range);
        }
        if !found {
            warn!(scene = %scene, object, "approach_target_missing");
        }
    }

    fn leave(&self) {
        for features in self.features.values() {
            for feature in features {
                feature.set_player_in_range(false);
            }
        }
    }

    fn apply_scene_events(&mut self) -> Result<(), SessionError> {
        for event in self.loader.drain_events() {
            match event {
                SceneEvent::Loaded(scene) => self.build_features(&scene)?,
                SceneEvent::Unloaded(scene) => self.teardown_features(&scene),
            }
        }
        Ok(())
    }

    fn build_features(&mut self, scene: &str) -> Result<(), FeatureError> {
        let Some(content) = self.scenes.get(scene) else {
            return Ok(());
        };
        let mut built: Vec<Rc<dyn SceneFeature>> = Vec::with_capacity(content.objects.len());
        for object in &content.objects {
            match object {
                ObjectDef::Door(config) => built.push(Door::new(&self.ctx, &self.graph, config)?),
                ObjectDef::Stairs(config) => {
                    built.push(InfiniteStairs::new(&self.ctx, &self.graph, scene, config)?)
                }
                ObjectDef::StrangeDoor(config) => {
                    built.push(StrangeDoor::new(&self.ctx, scene, config))
                }
                ObjectDef::Pickup(config) => {
                    if let Some(pickup) = Pickup::spawn(&self.ctx, config) {
                        built.push(pickup);
                    }
                }
                ObjectDef::LoopPuzzle(config) => {
                    let roll: f32 = self.rng.gen();
                    built.push(LoopPuzzle::new(&self.ctx, config, roll));
                }
                ObjectDef::Narrative(config) => {
                    built.push(NarrativeTrigger::new(&self.ctx, config))
                }
            }
        }
        debug!(scene, feature_count = built.len(), "scene_features_built");
        self.features.insert(scene.to_string(), built);
        Ok(())
    }

    fn teardown_features(&mut self, scene: &str) {
        let Some(features) = self.features.remove(scene) else {
            return;
        };
        debug!(scene, feature_count = features.len(), "scene_features_torn_down");
        for feature in features {
            feature.teardown();
        }
    }
}
