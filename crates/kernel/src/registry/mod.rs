//! Session-wide world facts.
//!
//! One `StateRegistry` is built by the application context and shared by
//! every feature. It is never rebuilt on scene load, which is what lets a door
//! stay unlocked after the player leaves the room and comes back.

mod atomic_io;
mod selector;
mod store;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::{info, warn};

pub use selector::{NonRepeatingSelector, DEFAULT_OPTION_COUNT};
pub use store::{FactStore, JsonFileStore, NullFactStore, RegistrySnapshot, SNAPSHOT_VERSION};

/// Strange-door entries. Grows without a cap.
pub const VOID_ENTRY_COUNTER: &str = "VoidEntryCount";
/// Infinite-stairs solves.
pub const LOOP_SOLVED_COUNTER: &str = "LoopSolvedCount";
pub const LOOP_SOLVED_MAX: i64 = 3;

static REGISTRY_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_registry_lock_poison_once() {
    if REGISTRY_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!("registry lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to access registry snapshot at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode registry snapshot for {path}: {message}")]
    Encode { path: PathBuf, message: String },
    #[error("invalid registry snapshot {path} at {json_path}: {message}")]
    Decode {
        path: PathBuf,
        json_path: String,
        message: String,
    },
    #[error("registry snapshot {path} has version {found}, expected {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

#[derive(Debug)]
struct RegistryState {
    facts: HashMap<String, bool>,
    counters: HashMap<String, i64>,
    selector: NonRepeatingSelector,
}

/// Keyed boolean facts, named counters and the narrative selector.
///
/// Every method takes the single internal lock for its whole body, so
/// multi-step operations such as reshuffle-then-serve are never observed half
/// done, even if the registry is shared across threads.
#[derive(Debug)]
pub struct StateRegistry {
    state: Mutex<RegistryState>,
}

impl StateRegistry {
    pub fn new(seed: u64) -> Self {
        Self::with_option_count(DEFAULT_OPTION_COUNT, seed)
    }

    pub fn with_option_count(option_count: usize, seed: u64) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                facts: HashMap::new(),
                counters: HashMap::new(),
                selector: NonRepeatingSelector::new(option_count, seed),
            }),
        }
    }

    /// Returns the stored fact, or stores and returns `default` on first use.
    ///
    /// An empty key is an `invalid_key` condition: it is logged, nothing is
    /// stored and `default` is returned.
    pub fn get_or_register(&self, key: &str, default: bool) -> bool {
        if key.is_empty() {
            warn!(
                condition = "invalid_key",
                default_value = default,
                "registry_get_or_register_rejected"
            );
            return default;
        }
        let mut state = self.lock();
        *state.facts.entry(key.to_string()).or_insert(default)
    }

    /// Returns the stored fact or `false` when the key was never written.
    pub fn get(&self, key: &str) -> bool {
        let state = self.lock();
        match state.facts.get(key) {
            Some(value) => *value,
            None => {
                warn!(key, "registry_fact_used_before_registered");
                false
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().facts.contains_key(key)
    }

    pub fn update(&self, key: &str, value: bool) {
        if key.is_empty() {
            warn!(condition = "invalid_key", value, "registry_update_rejected");
            return;
        }
        self.lock().facts.insert(key.to_string(), value);
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    /// Adds one, saturating at `max`. Returns the new value.
    pub fn increment_counter(&self, name: &str, max: i64) -> i64 {
        let mut state = self.lock();
        let value = state.counters.entry(name.to_string()).or_insert(0);
        if *value < max {
            *value += 1;
        }
        *value
    }

    /// Subtracts one, saturating at `min`. Returns the new value.
    pub fn decrement_counter(&self, name: &str, min: i64) -> i64 {
        let mut state = self.lock();
        let value = state.counters.entry(name.to_string()).or_insert(0);
        if *value > min {
            *value -= 1;
        }
        *value
    }

    pub fn next_non_repeating_index(&self) -> usize {
        self.lock().selector.next_index()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.lock();
        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            facts: state
                .facts
                .iter()
                .map(|(key, value)| (key.clone(), *value))
                .collect(),
            counters: state
                .counters
                .iter()
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
        }
    }

    /// Replaces all facts and counters with the snapshot contents.
    /// The selector keeps its current round.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let mut state = self.lock();
        state.facts = snapshot.facts.into_iter().collect();
        state.counters = snapshot.counters.into_iter().collect();
    }

    pub fn save(&self, store: &dyn FactStore) -> Result<(), RegistryError> {
        let snapshot = self.snapshot();
        store.save(&snapshot)?;
        info!(
            fact_count = snapshot.facts.len(),
            counter_count = snapshot.counters.len(),
            "registry_saved"
        );
        Ok(())
    }

    /// Restores from `store`. Returns whether a snapshot was found.
    pub fn load(&self, store: &dyn FactStore) -> Result<bool, RegistryError> {
        let Some(snapshot) = store.load()? else {
            return Ok(false);
        };
        info!(
            fact_count = snapshot.facts.len(),
            counter_count = snapshot.counters.len(),
            "registry_restored"
        );
        self.restore(snapshot);
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_registry_lock_poison_once();
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn first_registration_wins() {
        let registry = StateRegistry::new(1);
        assert!(registry.get_or_register("DoorKey1", true));
        assert!(registry.get_or_register("DoorKey1", false));
    }

    #[test]
    fn update_overrides_registration_and_default() {
        let registry = StateRegistry::new(1);
        registry.get_or_register("PR", false);
        registry.update("PR", true);
        assert!(registry.get("PR"));
        assert!(registry.get_or_register("PR", false));

        registry.update("never_registered", true);
        assert!(registry.get("never_registered"));
    }

    #[test]
    fn unknown_key_reads_false_without_registering() {
        let registry = StateRegistry::new(1);
        assert!(!registry.get("ClassroomKey"));
        assert!(!registry.contains("ClassroomKey"));
        assert!(registry.get_or_register("ClassroomKey", true));
    }

    #[test]
    fn empty_key_degrades_to_default_and_stores_nothing() {
        let registry = StateRegistry::new(1);
        assert!(registry.get_or_register("", true));
        assert!(!registry.get_or_register("", false));
        registry.update("", true);
        assert!(registry.snapshot().facts.is_empty());
    }

    #[test]
    fn counters_saturate_at_bounds() {
        let registry = StateRegistry::new(1);
        for _ in 0..5 {
            registry.increment_counter(LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX);
        }
        assert_eq!(registry.counter(LOOP_SOLVED_COUNTER), 3);
        assert_eq!(
            registry.increment_counter(LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX),
            3
        );

        for _ in 0..5 {
            registry.decrement_counter(LOOP_SOLVED_COUNTER, 0);
        }
        assert_eq!(registry.counter(LOOP_SOLVED_COUNTER), 0);
    }

    #[test]
    fn decrement_steps_down_by_one() {
        let registry = StateRegistry::new(1);
        registry.increment_counter(LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX);
        registry.increment_counter(LOOP_SOLVED_COUNTER, LOOP_SOLVED_MAX);
        assert_eq!(registry.decrement_counter(LOOP_SOLVED_COUNTER, 0), 1);
    }

    #[test]
    fn unknown_counter_reads_zero() {
        let registry = StateRegistry::new(1);
        assert_eq!(registry.counter(VOID_ENTRY_COUNTER), 0);
        assert_eq!(registry.decrement_counter(VOID_ENTRY_COUNTER, 0), 0);
    }

    #[test]
    fn selector_is_served_through_the_registry() {
        let registry = StateRegistry::new(9);
        let mut previous = registry.next_non_repeating_index();
        for _ in 0..40 {
            let next = registry.next_non_repeating_index();
            assert!(next < DEFAULT_OPTION_COUNT);
            assert_ne!(previous, next);
            previous = next;
        }
    }

    #[test]
    fn snapshot_restore_round_trips_facts_and_counters() {
        let source = StateRegistry::new(1);
        source.update("DoorKey1", false);
        source.update("PT", true);
        source.increment_counter(VOID_ENTRY_COUNTER, i64::MAX);

        let target = StateRegistry::new(2);
        target.update("stale", true);
        target.restore(source.snapshot());

        assert!(!target.contains("stale"));
        assert!(target.get("PT"));
        assert!(!target.get_or_register("DoorKey1", true));
        assert_eq!(target.counter(VOID_ENTRY_COUNTER), 1);
    }

    #[test]
    fn save_and_load_through_a_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("registry.json"));

        let first_run = StateRegistry::new(1);
        first_run.update("StairsPuzzle", true);
        first_run.save(&store).expect("save");

        let second_run = StateRegistry::new(1);
        assert!(second_run.load(&store).expect("load"));
        assert!(second_run.get("StairsPuzzle"));
    }

    #[test]
    fn load_from_null_store_changes_nothing() {
        let registry = StateRegistry::new(1);
        registry.update("PT", true);
        assert!(!registry.load(&NullFactStore).expect("load"));
        assert!(registry.get("PT"));
    }

    #[test]
    fn concurrent_increments_respect_the_cap() {
        let registry = Arc::new(StateRegistry::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.increment_counter("shared", 500);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(registry.counter("shared"), 500);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let registry = Arc::new(StateRegistry::new(1));
        registry.update("before", true);
        let poisoner = Arc::clone(&registry);
        let _ = thread::spawn(move || {
            let _guard = poisoner.state.lock().expect("lock");
            panic!("poison registry lock");
        })
        .join();

        assert!(registry.get("before"));
        registry.update("after", true);
        assert!(registry.get("after"));
    }
}
