use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kernel::{
    EventBus, KernelContext, Observer, Signal, TransitionRequest, TransitionStyle,
    INTERACT_SIGNAL, VOID_ENTRY_COUNTER,
};
use serde::Deserialize;
use tracing::info;

use super::{attach_to_player, SceneFeature};

const OPEN_DOOR_CUE: &str = "Open_Door";

fn default_door_id() -> String {
    "StrangeDoor".to_string()
}

fn default_target_scene() -> String {
    "TheVoidScene".to_string()
}

fn default_progress_counter() -> String {
    VOID_ENTRY_COUNTER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct StrangeDoorConfig {
    #[serde(default = "default_door_id")]
    pub(crate) door_id: String,
    #[serde(default = "default_target_scene")]
    pub(crate) target_scene: String,
    #[serde(default = "default_progress_counter")]
    pub(crate) progress_counter: String,
}

/// Door into the void. Counts every entry and uses the flash transition.
pub(crate) struct StrangeDoor {
    scene: String,
    config: StrangeDoorConfig,
    in_range: Cell<bool>,
    bus: RefCell<Option<Rc<EventBus>>>,
    ctx: KernelContext,
}

impl StrangeDoor {
    pub(crate) fn new(ctx: &KernelContext, scene: &str, config: &StrangeDoorConfig) -> Rc<Self> {
        let door = Rc::new(Self {
            scene: scene.to_string(),
            config: config.clone(),
            in_range: Cell::new(false),
            bus: RefCell::new(None),
            ctx: ctx.clone(),
        });
        *door.bus.borrow_mut() = attach_to_player(ctx, &door);
        door
    }

    pub(crate) fn enter(&self) -> bool {
        let Ok(mut transitions) = self.ctx.transitions.try_borrow_mut() else {
            return false;
        };
        if transitions.is_in_flight() {
            return false;
        }

        let request = TransitionRequest::new(
            &self.scene,
            &self.config.door_id,
            &self.config.target_scene,
        );
        let started = transitions
            .request_transition(request, TransitionStyle::Flash)
            .is_ok();
        drop(transitions);
        if !started {
            return false;
        }

        let entries = self
            .ctx
            .registry
            .increment_counter(&self.config.progress_counter, i64::MAX);
        info!(door_id = %self.config.door_id, entries, "void_entered");
        self.ctx.cues.play(OPEN_DOOR_CUE);
        true
    }
}

impl Observer for StrangeDoor {
    fn handle_event(&self, signal: &Signal) {
        if *signal == INTERACT_SIGNAL && self.in_range.get() {
            self.enter();
        }
    }
}

impl SceneFeature for StrangeDoor {
    fn id(&self) -> &str {
        &self.config.door_id
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
