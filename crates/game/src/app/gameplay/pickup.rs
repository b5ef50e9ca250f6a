use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kernel::{EventBus, InventoryItem, KernelContext, Observer, Signal, INTERACT_SIGNAL};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{attach_to_player, SceneFeature};

const PICKUP_CUE: &str = "Pickup_Item";

fn default_pickup_signal() -> String {
    INTERACT_SIGNAL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct PickupConfig {
    pub(crate) item: InventoryItem,
    #[serde(default = "default_pickup_signal")]
    pub(crate) pickup_signal: String,
    /// When set, the item can only be taken after this signal was seen.
    #[serde(default)]
    pub(crate) unlock_signal: Option<String>,
}

/// Registry fact recording that `item_id` was picked up. Kept apart from the
/// bare item id, which doors use for their lock fact.
pub(crate) fn picked_fact_key(item_id: &str) -> String {
    format!("picked.{item_id}")
}

pub(crate) struct Pickup {
    config: PickupConfig,
    fact_key: String,
    unlocked: Cell<bool>,
    picked: Cell<bool>,
    in_range: Cell<bool>,
    bus: RefCell<Option<Rc<EventBus>>>,
    ctx: KernelContext,
}

impl Pickup {
    /// Returns `None` when the item was already picked up in this session.
    pub(crate) fn spawn(ctx: &KernelContext, config: &PickupConfig) -> Option<Rc<Self>> {
        let fact_key = picked_fact_key(&config.item.id);
        if ctx.registry.get_or_register(&fact_key, false) {
            debug!(item_id = %config.item.id, "pickup_already_taken");
            return None;
        }

        let pickup = Rc::new(Self {
            config: config.clone(),
            fact_key,
            unlocked: Cell::new(config.unlock_signal.is_none()),
            picked: Cell::new(false),
            in_range: Cell::new(false),
            bus: RefCell::new(None),
            ctx: ctx.clone(),
        });
        *pickup.bus.borrow_mut() = attach_to_player(ctx, &pickup);
        Some(pickup)
    }

    fn pick_up(&self) {
        if self.picked.get() {
            return;
        }
        if let Err(error) = self
            .ctx
            .inventory
            .borrow_mut()
            .add_item(self.config.item.clone())
        {
            warn!(item_id = %self.config.item.id, error = %error, "pickup_rejected");
            return;
        }

        self.picked.set(true);
        self.ctx.registry.update(&self.fact_key, true);
        self.ctx.cues.play(PICKUP_CUE);
        info!(item_id = %self.config.item.id, "item_picked_up");

        if let Some(bus) = self.bus.borrow_mut().take() {
            bus.unsubscribe_ref(self);
        }
    }
}

impl Observer for Pickup {
    fn handle_event(&self, signal: &Signal) {
        if let Some(unlock) = self.config.unlock_signal.as_deref() {
            if *signal == unlock && !self.unlocked.get() {
                self.unlocked.set(true);
                debug!(item_id = %self.config.item.id, "pickup_unlocked");
                return;
            }
        }
        if *signal == self.config.pickup_signal.as_str()
            && self.in_range.get()
            && self.unlocked.get()
        {
            self.pick_up();
        }
    }
}

impl SceneFeature for Pickup {
    fn id(&self) -> &str {
        &self.config.item.id
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
