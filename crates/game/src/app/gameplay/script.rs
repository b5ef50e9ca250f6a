use std::collections::VecDeque;

use serde::Deserialize;

/// One scripted player action. Scripts stand in for live input in the
/// headless host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum ScriptStep {
    /// Put the player in range of one object in the active scene.
    Approach { object: String },
    /// Take the player out of range of everything.
    Leave,
    Press { signal: String },
    /// Hold the script for `ticks` ticks, counting the tick that reads it.
    Wait { ticks: u32 },
    /// Hold the script until no transition is in flight.
    AwaitTransition,
    SaveRegistry,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptRunner {
    steps: VecDeque<ScriptStep>,
    wait_ticks: u32,
}

impl ScriptRunner {
    pub(crate) fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            wait_ticks: 0,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.steps.is_empty() && self.wait_ticks == 0
    }

    pub(crate) fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Returns the next step to run this tick, if the script is not waiting.
    /// `AwaitTransition` is consumed only once `transition_in_flight` is false.
    pub(crate) fn next_step(&mut self, transition_in_flight: bool) -> Option<ScriptStep> {
        if self.wait_ticks > 0 {
            self.wait_ticks -= 1;
            return None;
        }
        match self.steps.front()? {
            ScriptStep::AwaitTransition if transition_in_flight => None,
            ScriptStep::Wait { ticks } => {
                self.wait_ticks = ticks.saturating_sub(1);
                self.steps.pop_front();
                None
            }
            _ => self.steps.pop_front(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_holds_for_the_given_ticks() {
        let mut runner = ScriptRunner::new([
            ScriptStep::Wait { ticks: 2 },
            ScriptStep::Leave,
        ]);

        assert_eq!(runner.next_step(false), None);
        assert_eq!(runner.next_step(false), None);
        assert_eq!(runner.next_step(false), Some(ScriptStep::Leave));
        assert!(runner.is_finished());
    }

    #[test]
    fn zero_and_single_tick_waits_take_one_tick() {
        for ticks in [0, 1] {
            let mut runner = ScriptRunner::new([ScriptStep::Wait { ticks }, ScriptStep::Leave]);

            assert_eq!(runner.next_step(false), None);
            assert_eq!(runner.next_step(false), Some(ScriptStep::Leave));
        }
    }

    #[test]
    fn await_transition_blocks_while_in_flight() {
        let mut runner = ScriptRunner::new([ScriptStep::AwaitTransition, ScriptStep::Leave]);

        assert_eq!(runner.next_step(true), None);
        assert_eq!(runner.remaining(), 2);
        assert_eq!(runner.next_step(false), Some(ScriptStep::AwaitTransition));
        assert_eq!(runner.next_step(true), Some(ScriptStep::Leave));
    }

    #[test]
    fn steps_parse_from_tagged_json() {
        let steps: Vec<ScriptStep> = serde_json::from_str(
            r#"[
                { "action": "approach", "object": "DoorKey1" },
                { "action": "press", "signal": "E" },
                { "action": "await_transition" }
            ]"#,
        )
        .expect("script");
        assert_eq!(
            steps,
            [
                ScriptStep::Approach {
                    object: "DoorKey1".to_string()
                },
                ScriptStep::Press {
                    signal: "E".to_string()
                },
                ScriptStep::AwaitTransition,
            ]
        );
    }
}
