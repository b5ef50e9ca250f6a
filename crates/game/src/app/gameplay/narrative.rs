use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kernel::{EventBus, KernelContext, Observer, Signal, INTERACT_SIGNAL};
use serde::Deserialize;
use tracing::{debug, info};

use super::{attach_to_player, SceneFeature};

fn default_trigger_signal() -> String {
    INTERACT_SIGNAL.to_string()
}

fn default_line_prefix() -> String {
    "Narrative".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct NarrativeConfig {
    pub(crate) id: String,
    #[serde(default = "default_trigger_signal")]
    pub(crate) trigger_signal: String,
    #[serde(default = "default_line_prefix")]
    pub(crate) line_prefix: String,
}

/// Dialogue trigger that never tells the same line twice in a row.
pub(crate) struct NarrativeTrigger {
    config: NarrativeConfig,
    in_range: Cell<bool>,
    bus: RefCell<Option<Rc<EventBus>>>,
    ctx: KernelContext,
}

impl NarrativeTrigger {
    pub(crate) fn new(ctx: &KernelContext, config: &NarrativeConfig) -> Rc<Self> {
        let trigger = Rc::new(Self {
            config: config.clone(),
            in_range: Cell::new(false),
            bus: RefCell::new(None),
            ctx: ctx.clone(),
        });
        *trigger.bus.borrow_mut() = attach_to_player(ctx, &trigger);
        trigger
    }

    /// Picks the next line and announces it on the player's bus.
    pub(crate) fn speak(&self) -> String {
        let index = self.ctx.registry.next_non_repeating_index();
        let line = format!("{}{}", self.config.line_prefix, index);
        info!(trigger = %self.config.id, line = %line, "narrative_line_selected");

        let bus = self.bus.borrow().clone();
        match bus {
            Some(bus) => {
                bus.publish(line.as_str());
            }
            None => debug!(trigger = %self.config.id, "narrative_without_bus"),
        }
        line
    }
}

impl Observer for NarrativeTrigger {
    fn handle_event(&self, signal: &Signal) {
        if *signal == self.config.trigger_signal.as_str() && self.in_range.get() {
            self.speak();
        }
    }
}

impl SceneFeature for NarrativeTrigger {
    fn id(&self) -> &str {
        &self.config.id
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
