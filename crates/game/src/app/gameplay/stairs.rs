use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kernel::{
    DoorConnection, DoorGraph, EventBus, KernelContext, Observer, Signal, TransitionRequest,
    TransitionStyle, INTERACT_SIGNAL,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::{attach_to_player, FeatureError, SceneFeature};

pub(crate) const STAIRS_PUZZLE_FACT: &str = "StairsPuzzle";
const WALK_STAIRS_CUE: &str = "Walk_Stairs";

fn default_puzzle_fact() -> String {
    STAIRS_PUZZLE_FACT.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct StairsConfig {
    /// Connection taken once the puzzle fact is true.
    pub(crate) solved_door_id: String,
    /// Connection taken otherwise. Also the id the stairs are known by.
    pub(crate) loop_door_id: String,
    #[serde(default = "default_puzzle_fact")]
    pub(crate) puzzle_fact: String,
}

/// Stairs that lead back into the same room until the puzzle is solved.
pub(crate) struct InfiniteStairs {
    scene: String,
    puzzle_fact: String,
    solved: DoorConnection,
    looping: DoorConnection,
    in_range: Cell<bool>,
    bus: RefCell<Option<Rc<EventBus>>>,
    ctx: KernelContext,
}

impl InfiniteStairs {
    pub(crate) fn new(
        ctx: &KernelContext,
        graph: &DoorGraph,
        scene: &str,
        config: &StairsConfig,
    ) -> Result<Rc<Self>, FeatureError> {
        let lookup = |door_id: &str| {
            graph
                .get(door_id)
                .cloned()
                .ok_or_else(|| FeatureError::MissingConnection {
                    feature: "stairs",
                    door_id: door_id.to_string(),
                })
        };
        let stairs = Rc::new(Self {
            scene: scene.to_string(),
            puzzle_fact: config.puzzle_fact.clone(),
            solved: lookup(&config.solved_door_id)?,
            looping: lookup(&config.loop_door_id)?,
            in_range: Cell::new(false),
            bus: RefCell::new(None),
            ctx: ctx.clone(),
        });
        *stairs.bus.borrow_mut() = attach_to_player(ctx, &stairs);
        Ok(stairs)
    }

    /// Picks the connection for the current puzzle state and requests the
    /// transition. Returns whether the orchestrator accepted it.
    pub(crate) fn climb(&self) -> bool {
        let solved = self.ctx.registry.get_or_register(&self.puzzle_fact, false);
        let connection = if solved { &self.solved } else { &self.looping };
        let request =
            TransitionRequest::new(&self.scene, &self.looping.door_id, connection.to_scene());

        self.ctx.cues.play(WALK_STAIRS_CUE);
        let Ok(mut transitions) = self.ctx.transitions.try_borrow_mut() else {
            warn!(stairs = %self.looping.door_id, "stairs_transition_orchestrator_busy");
            return false;
        };
        if transitions
            .request_transition(request, TransitionStyle::Standard)
            .is_err()
        {
            return false;
        }
        if solved {
            info!(stairs = %self.looping.door_id, to_scene = %connection.to_scene(), "stairs_exit_taken");
        } else {
            info!(stairs = %self.looping.door_id, "stairs_looped");
        }
        true
    }
}

impl Observer for InfiniteStairs {
    fn handle_event(&self, signal: &Signal) {
        if *signal == INTERACT_SIGNAL && self.in_range.get() {
            self.climb();
        }
    }
}

impl SceneFeature for InfiniteStairs {
    fn id(&self) -> &str {
        &self.looping.door_id
    }

    fn set_player_in_range(&self, in_range: bool) {
        self.in_range.set(in_range);
    }

    fn teardown(self: Rc<Self>) {
        if let Some(bus) = self.bus.borrow_mut().take() {
            bus.unsubscribe(&self);
        }
    }
}
