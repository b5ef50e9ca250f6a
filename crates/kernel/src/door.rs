//! Locked/open doors and their transition table.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::AgentLocator;
use crate::bus::{EventBus, Observer, Signal};
use crate::content::{DoorConnection, DoorGraph};
use crate::context::KernelContext;
use crate::transition::{TransitionError, TransitionRequest, TransitionStyle};

pub const INTERACT_SIGNAL: &str = "E";
pub const DOOR_UNLOCKED_SIGNAL: &str = "door_unlocked";
pub const DOOR_LOCKED_SIGNAL: &str = "door_locked";
pub const UNLOCK_CUE: &str = "Unlock_Door";
pub const LOCKED_CUE: &str = "Locked_Door";
pub const OPEN_CUE: &str = "Open_Door";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorState {
    Locked,
    Open,
}

impl DoorState {
    fn from_locked(locked: bool) -> Self {
        if locked {
            DoorState::Locked
        } else {
            DoorState::Open
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorInput {
    AttemptOpen { holds_required_key: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorEffect {
    /// Write the door's lock fact.
    PersistLocked(bool),
    ConsumeKey,
    Publish(&'static str),
    PlayCue(&'static str),
    BeginTransition,
}

const UNLOCK_EFFECTS: &[DoorEffect] = &[
    DoorEffect::PersistLocked(false),
    DoorEffect::ConsumeKey,
    DoorEffect::Publish(DOOR_UNLOCKED_SIGNAL),
    DoorEffect::PlayCue(UNLOCK_CUE),
    DoorEffect::BeginTransition,
];
const STILL_LOCKED_EFFECTS: &[DoorEffect] = &[
    DoorEffect::PlayCue(LOCKED_CUE),
    DoorEffect::Publish(DOOR_LOCKED_SIGNAL),
];
const ENTER_EFFECTS: &[DoorEffect] = &[
    DoorEffect::PlayCue(OPEN_CUE),
    DoorEffect::BeginTransition,
];

/// The door transition table. Unlocking also walks through the door.
pub fn next_state(state: DoorState, input: DoorInput) -> (DoorState, &'static [DoorEffect]) {
    match (state, input) {
        (
            DoorState::Locked,
            DoorInput::AttemptOpen {
                holds_required_key: true,
            },
        ) => (DoorState::Open, UNLOCK_EFFECTS),
        (
            DoorState::Locked,
            DoorInput::AttemptOpen {
                holds_required_key: false,
            },
        ) => (DoorState::Locked, STILL_LOCKED_EFFECTS),
        (DoorState::Open, DoorInput::AttemptOpen { .. }) => (DoorState::Open, ENTER_EFFECTS),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorConfig {
    pub door_id: String,
    /// Inventory item that unlocks the door. Defaults to the door id.
    #[serde(default)]
    pub key_item_id: Option<String>,
    #[serde(default)]
    pub style: TransitionStyle,
}

impl DoorConfig {
    pub fn new(door_id: impl Into<String>) -> Self {
        Self {
            door_id: door_id.into(),
            key_item_id: None,
            style: TransitionStyle::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DoorError {
    #[error("door '{door_id}' has no connection in the door graph")]
    MissingConnection { door_id: String },
    #[error("door config has an empty door_id")]
    EmptyDoorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionAttempt {
    Started,
    Rejected(TransitionError),
    /// The orchestrator was borrowed elsewhere, which only happens when a
    /// door is opened from inside a transition step.
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorOutcome {
    pub previous: DoorState,
    pub state: DoorState,
    pub transition: Option<TransitionAttempt>,
}

/// A door bound to one [`DoorConnection`].
///
/// Subscribes to the player's bus on creation and reacts to [`INTERACT_SIGNAL`]
/// while the player is in range.
pub struct Door {
    connection: DoorConnection,
    key_item_id: String,
    style: TransitionStyle,
    state: Cell<DoorState>,
    player_in_range: Cell<bool>,
    bus: RefCell<Option<Rc<EventBus>>>,
    ctx: KernelContext,
}

impl Door {
    /// A door without a connection is a content error and fails here rather
    /// than on first use.
    pub fn new(
        ctx: &KernelContext,
        graph: &DoorGraph,
        config: &DoorConfig,
    ) -> Result<Rc<Door>, DoorError> {
        if config.door_id.is_empty() {
            return Err(DoorError::EmptyDoorId);
        }
        let connection = graph
            .get(&config.door_id)
            .cloned()
            .ok_or_else(|| DoorError::MissingConnection {
                door_id: config.door_id.clone(),
            })?;

        let locked = ctx
            .registry
            .get_or_register(&connection.door_id, connection.locked);
        let door = Rc::new(Door {
            key_item_id: config
                .key_item_id
                .clone()
                .unwrap_or_else(|| connection.door_id.clone()),
            style: config.style,
            state: Cell::new(DoorState::from_locked(locked)),
            player_in_range: Cell::new(false),
            bus: RefCell::new(None),
            ctx: ctx.clone(),
            connection,
        });

        if let Ok(bus) = ctx.agents.player_bus() {
            bus.subscribe(&door);
            *door.bus.borrow_mut() = Some(bus);
        }
        debug!(
            door_id = %door.connection.door_id,
            state = ?door.state.get(),
            "door_ready"
        );
        Ok(door)
    }

    pub fn door_id(&self) -> &str {
        &self.connection.door_id
    }

    pub fn connection(&self) -> &DoorConnection {
        &self.connection
    }

    pub fn state(&self) -> DoorState {
        self.state.get()
    }

    pub fn player_in_range(&self) -> bool {
        self.player_in_range.get()
    }

    pub fn set_player_in_range(&self, in_range: bool) {
        self.player_in_range.set(in_range);
    }

    pub fn attempt_open(&self) -> DoorOutcome {
        let previous = self.state.get();
        let holds_required_key = self.ctx.inventory.borrow().has_item(&self.key_item_id);
        let (state, effects) = next_state(previous, DoorInput::AttemptOpen { holds_required_key });
        self.state.set(state);

        let mut transition = None;
        for effect in effects {
            match *effect {
                DoorEffect::PersistLocked(locked) => {
                    self.ctx.registry.update(&self.connection.door_id, locked);
                }
                DoorEffect::ConsumeKey => {
                    self.ctx.inventory.borrow_mut().remove_item(&self.key_item_id);
                }
                DoorEffect::Publish(signal) => self.publish(signal),
                DoorEffect::PlayCue(cue) => self.ctx.cues.play(cue),
                DoorEffect::BeginTransition => transition = Some(self.begin_transition()),
            }
        }

        if previous != state {
            info!(door_id = %self.connection.door_id, from = ?previous, to = ?state, "door_state_changed");
        }
        DoorOutcome {
            previous,
            state,
            transition,
        }
    }

    /// Unsubscribes from the player's bus. Called on scene teardown.
    pub fn detach(self: &Rc<Self>) {
        if let Some(bus) = self.bus.borrow_mut().take() {
            bus.unsubscribe(self);
        }
    }

    fn publish(&self, signal: &'static str) {
        let bus = self.bus.borrow().clone();
        match bus {
            Some(bus) => {
                bus.publish(signal);
            }
            None => debug!(door_id = %self.connection.door_id, signal, "door_signal_without_bus"),
        }
    }

    fn begin_transition(&self) -> TransitionAttempt {
        let request = TransitionRequest::new(
            self.connection.from_scene(),
            self.connection.door_id.as_str(),
            self.connection.to_scene(),
        );
        let Ok(mut transitions) = self.ctx.transitions.try_borrow_mut() else {
            warn!(door_id = %self.connection.door_id, "door_transition_orchestrator_busy");
            return TransitionAttempt::Busy;
        };
        match transitions.request_transition(request, self.style) {
            Ok(()) => TransitionAttempt::Started,
            Err(rejected) => TransitionAttempt::Rejected(rejected),
        }
    }
}

impl Observer for Door {
    fn handle_event(&self, signal: &Signal) {
        if *signal == INTERACT_SIGNAL && self.player_in_range.get() {
            self.attempt_open();
        }
    }
}

impl std::fmt::Debug for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Door")
            .field("door_id", &self.connection.door_id)
            .field("state", &self.state.get())
            .field("player_in_range", &self.player_in_range.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::{CueSink, Placeable};
    use crate::content::SceneDoor;
    use crate::inventory::InventoryItem;
    use crate::spawn::{SpawnPoint, Vec3};
    use crate::transition::scripted::ScriptedSceneLoader;
    use crate::transition::{SpawnOutcome, TransitionConfig, TransitionStatus};

    #[derive(Default)]
    struct RecordingCues {
        played: RefCell<Vec<String>>,
    }

    impl CueSink for RecordingCues {
        fn play(&self, cue: &str) {
            self.played.borrow_mut().push(cue.to_string());
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<String>>,
    }

    impl Observer for Recorder {
        fn handle_event(&self, signal: &Signal) {
            self.seen.borrow_mut().push(signal.as_str().to_string());
        }
    }

    #[derive(Default)]
    struct Player {
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

    struct Fixture {
        ctx: KernelContext,
        cues: Rc<RecordingCues>,
        bus: Rc<EventBus>,
        recorder: Rc<Recorder>,
        graph: DoorGraph,
    }

    fn connection(door_id: &str, locked: bool) -> DoorConnection {
        DoorConnection {
            door_id: door_id.to_string(),
            from_door: SceneDoor {
                scene_name: "A".to_string(),
                door_id: door_id.to_string(),
                spawn_offset: Vec3::new(2.0, 0.0, 0.0),
            },
            to_door: SceneDoor {
                scene_name: "B".to_string(),
                door_id: door_id.to_string(),
                spawn_offset: Vec3::new(2.0, 0.0, 0.0),
            },
            locked,
        }
    }

    fn fixture(locked: bool) -> Fixture {
        let cues = Rc::new(RecordingCues::default());
        let ctx = KernelContext::new(7, TransitionConfig::default()).with_cues(cues.clone());
        let bus = Rc::new(EventBus::new("player"));
        ctx.agents.register_player(Rc::clone(&bus));
        let recorder = Rc::new(Recorder::default());
        bus.subscribe(&recorder);
        let graph = DoorGraph::new(vec![connection("DoorKey1", locked)]).expect("graph");
        Fixture {
            ctx,
            cues,
            bus,
            recorder,
            graph,
        }
    }

    #[test]
    fn transition_table_covers_every_pair() {
        let with_key = DoorInput::AttemptOpen {
            holds_required_key: true,
        };
        let without_key = DoorInput::AttemptOpen {
            holds_required_key: false,
        };
        assert_eq!(next_state(DoorState::Locked, with_key).0, DoorState::Open);
        assert_eq!(next_state(DoorState::Locked, without_key).0, DoorState::Locked);
        assert_eq!(next_state(DoorState::Open, with_key).0, DoorState::Open);
        assert_eq!(next_state(DoorState::Open, without_key).0, DoorState::Open);
        assert!(!next_state(DoorState::Locked, without_key)
            .1
            .contains(&DoorEffect::BeginTransition));
    }

    #[test]
    fn locked_door_without_key_stays_locked() {
        let fx = fixture(true);
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");

        let outcome = door.attempt_open();

        assert_eq!(outcome.state, DoorState::Locked);
        assert_eq!(outcome.transition, None);
        assert!(fx.ctx.registry.get("DoorKey1"));
        assert_eq!(*fx.cues.played.borrow(), ["Locked_Door"]);
        assert_eq!(*fx.recorder.seen.borrow(), ["door_locked"]);
        assert!(!fx.ctx.transition_in_flight());
    }

    #[test]
    fn locked_door_with_key_unlocks_and_starts_transition() {
        let fx = fixture(true);
        fx.ctx
            .inventory
            .borrow_mut()
            .add_item(InventoryItem::new("DoorKey1", "Brass key"))
            .expect("key");
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");
        door.set_player_in_range(true);

        fx.bus.publish("E");

        assert_eq!(door.state(), DoorState::Open);
        assert!(!fx.ctx.registry.get("DoorKey1"));
        assert!(!fx.ctx.inventory.borrow().has_item("DoorKey1"));
        assert_eq!(*fx.recorder.seen.borrow(), ["E", "door_unlocked"]);
        assert_eq!(*fx.cues.played.borrow(), ["Unlock_Door"]);
        assert_eq!(
            fx.ctx.transitions.borrow().in_flight_request(),
            Some(&TransitionRequest::new("A", "DoorKey1", "B"))
        );
    }

    #[test]
    fn interact_signal_is_ignored_out_of_range() {
        let fx = fixture(false);
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");

        fx.bus.publish("E");
        fx.bus.publish("e");

        assert!(fx.cues.played.borrow().is_empty());
        assert!(!fx.ctx.transition_in_flight());
        assert!(!door.player_in_range());
    }

    #[test]
    fn open_door_enters_and_second_attempt_is_rejected() {
        let fx = fixture(false);
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");

        let first = door.attempt_open();
        assert_eq!(first.transition, Some(TransitionAttempt::Started));
        let second = door.attempt_open();
        assert!(matches!(
            second.transition,
            Some(TransitionAttempt::Rejected(TransitionError::AlreadyInProgress { .. }))
        ));
        assert_eq!(*fx.cues.played.borrow(), ["Open_Door", "Open_Door"]);
    }

    #[test]
    fn persisted_fact_overrides_static_lock_flag() {
        let fx = fixture(true);
        fx.ctx.registry.update("DoorKey1", false);
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");
        assert_eq!(door.state(), DoorState::Open);
    }

    #[test]
    fn unlocked_state_survives_rebuilding_the_door() {
        let fx = fixture(true);
        fx.ctx
            .inventory
            .borrow_mut()
            .add_item(InventoryItem::new("DoorKey1", "Brass key"))
            .expect("key");
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");
        door.attempt_open();
        door.detach();
        assert!(!fx.bus.is_subscribed(&door));
        drop(door);

        let rebuilt = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");
        assert_eq!(rebuilt.state(), DoorState::Open);
    }

    #[test]
    fn missing_connection_fails_at_construction() {
        let fx = fixture(true);
        let error = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("NoSuchDoor")).expect_err("missing");
        assert_eq!(
            error,
            DoorError::MissingConnection {
                door_id: "NoSuchDoor".to_string()
            }
        );
    }

    #[test]
    fn door_works_without_a_registered_player() {
        let ctx = KernelContext::new(1, TransitionConfig::default());
        let graph = DoorGraph::new(vec![connection("D", true)]).expect("graph");
        let door = Door::new(&ctx, &graph, &DoorConfig::new("D")).expect("door");
        assert_eq!(door.attempt_open().state, DoorState::Locked);
    }

    #[test]
    fn custom_key_item_is_consumed() {
        let fx = fixture(true);
        fx.ctx
            .inventory
            .borrow_mut()
            .add_item(InventoryItem::new("ClassroomKey", "Classroom key"))
            .expect("key");
        let config = DoorConfig {
            key_item_id: Some("ClassroomKey".to_string()),
            ..DoorConfig::new("DoorKey1")
        };
        let door = Door::new(&fx.ctx, &fx.graph, &config).expect("door");

        assert_eq!(door.attempt_open().state, DoorState::Open);
        assert!(fx.ctx.inventory.borrow().is_empty());
    }

    #[test]
    fn unlock_then_transition_places_player_at_door_spawn() {
        let fx = fixture(true);
        fx.ctx
            .inventory
            .borrow_mut()
            .add_item(InventoryItem::new("DoorKey1", "Brass key"))
            .expect("key");
        let door = Door::new(&fx.ctx, &fx.graph, &DoorConfig::new("DoorKey1")).expect("door");
        door.set_player_in_range(true);
        fx.bus.publish("E");

        let mut loader = ScriptedSceneLoader::new("A").with_spawn_points(
            "B",
            vec![SpawnPoint {
                prev_scene_name: "A".to_string(),
                prev_door_id: "DoorKey1".to_string(),
                position: Vec3::new(3.0, -1.0, 0.0),
                offset: Vec3::new(2.0, 0.0, 0.0),
            }],
        );
        let mut player = Player::default();
        let mut completed = None;
        for _ in 0..1_000 {
            let status = fx.ctx.transitions.borrow_mut().tick(
                Duration::from_millis(100),
                &mut loader,
                &mut player,
            );
            if let TransitionStatus::Completed(report) = status {
                completed = Some(report);
                break;
            }
        }

        let report = completed.expect("transition completed");
        assert_eq!(report.spawn, SpawnOutcome::Placed(Vec3::new(5.0, -1.0, 0.0)));
        assert_eq!(player.position, Vec3::new(5.0, -1.0, 0.0));
    }
}
