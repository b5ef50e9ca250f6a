use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::spawn::Vec3;

/// Anything the orchestrator can move to a spawn point.
pub trait Placeable {
    fn position(&self) -> Vec3;
    fn place_at(&mut self, position: Vec3);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("no player agent is registered")]
    MissingCollaborator,
}

pub trait AgentLocator {
    fn player_bus(&self) -> Result<Rc<EventBus>, LocatorError>;
}

/// Holds the player's bus for features that need to subscribe.
///
/// A missing player is reported once, then stays quiet until a player is
/// registered again.
#[derive(Debug, Default)]
pub struct AgentDirectory {
    player_bus: RefCell<Option<Rc<EventBus>>>,
    missing_reported: Cell<bool>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_player(&self, bus: Rc<EventBus>) {
        info!(owner = %bus.owner(), "player_registered");
        *self.player_bus.borrow_mut() = Some(bus);
        self.missing_reported.set(false);
    }

    pub fn clear_player(&self) {
        self.player_bus.borrow_mut().take();
    }
}

impl AgentLocator for AgentDirectory {
    fn player_bus(&self) -> Result<Rc<EventBus>, LocatorError> {
        if let Some(bus) = self.player_bus.borrow().as_ref() {
            return Ok(Rc::clone(bus));
        }
        if !self.missing_reported.replace(true) {
            warn!(condition = "missing_collaborator", "player_bus_not_found");
        }
        Err(LocatorError::MissingCollaborator)
    }
}

/// Fire-and-forget audio cue output.
pub trait CueSink {
    fn play(&self, cue: &str);
}

/// Cue sink for hosts without audio: cues only show up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCueSink;

impl CueSink for LogCueSink {
    fn play(&self, cue: &str) {
        info!(cue, "cue_played");
    }
}
