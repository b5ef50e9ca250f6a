use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kernel::{
    EventBus, KernelContext, Observer, Signal, LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::stairs::STAIRS_PUZZLE_FACT;
use super::{attach_to_player, SceneFeature};

pub(crate) const SET_RIGHT_SIGNAL: &str = "setRight";
pub(crate) const SET_LEFT_SIGNAL: &str = "setLeft";
pub(crate) const BLOOD_RAIN_SIGNAL: &str = "bloodRain";
const BLOOD_RAIN_CUE: &str = "Blood_Rain";

fn default_id() -> String {
    "loop_puzzle".to_string()
}

fn default_truth_chance() -> f32 {
    0.2
}

fn default_started_fact() -> String {
    "stairStart".to_string()
}

fn default_solved_fact() -> String {
    STAIRS_PUZZLE_FACT.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct LoopPuzzleConfig {
    #[serde(default = "default_id")]
    pub(crate) id: String,
    /// Chance that a repeat visit is truthful.
    #[serde(default = "default_truth_chance")]
    pub(crate) truth_chance: f32,
    #[serde(default = "default_started_fact")]
    pub(crate) started_fact: String,
    /// Set once the solved counter reaches its cap.
    #[serde(default = "default_solved_fact")]
    pub(crate) solved_fact: String,
}

/// Room puzzle that may lie about which way is correct.
///
/// The first visit is always truthful. On later visits `roll` decides: a roll
/// at or below `truth_chance` is truthful. A lying room starts out solved, so
/// leaving without touching anything counts as a solve.
pub(crate) struct LoopPuzzle {
    config: LoopPuzzleConfig,
    truthful: bool,
    solved: Cell<bool>,
    blood_shown: Cell<u32>,
    bus: RefCell<Option<Rc<EventBus>>>,
    ctx: KernelContext,
}

impl LoopPuzzle {
    pub(crate) fn new(ctx: &KernelContext, config: &LoopPuzzleConfig, roll: f32) -> Rc<Self> {
        let started = ctx.registry.get_or_register(&config.started_fact, false);
        let truthful = if started {
            roll <= config.truth_chance
        } else {
            ctx.registry.update(&config.started_fact, true);
            true
        };
        debug!(
            puzzle = %config.id,
            first_visit = !started,
            truthful,
            roll,
            "loop_puzzle_ready"
        );

        let puzzle = Rc::new(Self {
            config: config.clone(),
            truthful,
            solved: Cell::new(started && !truthful),
            blood_shown: Cell::new(0),
            bus: RefCell::new(None),
            ctx: ctx.clone(),
        });
        *puzzle.bus.borrow_mut() = attach_to_player(ctx, &puzzle);
        puzzle
    }

    #[cfg(test)]
    pub(crate) fn is_truthful(&self) -> bool {
        self.truthful
    }

    #[cfg(test)]
    pub(crate) fn is_solved(&self) -> bool {
        self.solved.get()
    }

    #[cfg(test)]
    pub(crate) fn blood_shown(&self) -> u32 {
        self.blood_shown.get()
    }

    /// Records the outcome of this visit in the solved counter.
    fn settle(&self) -> i64 {
        let registry = &self.ctx.registry;
        let count = if self.solved.get() {
            registry.increment_counter(LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX)
        } else {
            registry.decrement_counter(LOOP_SOLVED_COUNTER, 0)
        };
        if count >= LOOP_SOLVED_MAX {
            registry.update(&self.config.solved_fact, true);
        }
        info!(
            puzzle = %self.config.id,
            solved = self.solved.get(),
            loop_solved_count = count,
            "loop_puzzle_settled"
        );
        count
    }
}

impl Observer for LoopPuzzle {
    fn handle_event(&self, signal: &Signal) {
        match signal.as_str() {
            SET_RIGHT_SIGNAL => self.solved.set(self.truthful),
            SET_LEFT_SIGNAL => self.solved.set(!self.truthful),
            BLOOD_RAIN_SIGNAL if !self.truthful => {
                self.blood_shown.set(self.blood_shown.get() + 1);
                self.ctx.cues.play(BLOOD_RAIN_CUE);
            }
            _ => {}
        }
    }
}

impl SceneFeature for LoopPuzzle {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn teardown(self: Rc<Self>) {
        if let Some(bus) = self.bus.borrow_mut().take() {
            bus.unsubscribe(&self);
        }
        self.settle();
    }
}
