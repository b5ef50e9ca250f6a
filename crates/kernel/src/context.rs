use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::agent::{AgentDirectory, CueSink, LogCueSink};
use crate::inventory::Inventory;
use crate::registry::StateRegistry;
use crate::transition::{TransitionConfig, TransitionOrchestrator};

/// Services every feature receives at construction.
///
/// Built once by the host and cloned into features; clones share the same
/// registry, inventory and orchestrator.
#[derive(Clone)]
pub struct KernelContext {
    pub registry: Arc<StateRegistry>,
    pub agents: Rc<AgentDirectory>,
    pub inventory: Rc<RefCell<Inventory>>,
    pub transitions: Rc<RefCell<TransitionOrchestrator>>,
    pub cues: Rc<dyn CueSink>,
}

impl KernelContext {
    pub fn new(seed: u64, transition_config: TransitionConfig) -> Self {
        Self {
            registry: Arc::new(StateRegistry::new(seed)),
            agents: Rc::new(AgentDirectory::new()),
            inventory: Rc::new(RefCell::new(Inventory::default())),
            transitions: Rc::new(RefCell::new(TransitionOrchestrator::new(transition_config))),
            cues: Rc::new(LogCueSink),
        }
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = Rc::new(RefCell::new(inventory));
        self
    }

    pub fn with_cues(mut self, cues: Rc<dyn CueSink>) -> Self {
        self.cues = cues;
        self
    }

    pub fn transition_in_flight(&self) -> bool {
        self.transitions
            .try_borrow()
            .map(|transitions| transitions.is_in_flight())
            .unwrap_or(true)
    }
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext")
            .field("registry", &self.registry)
            .field("agents", &self.agents)
            .field("inventory", &self.inventory)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}
