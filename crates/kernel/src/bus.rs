use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

/// Opaque, case-sensitive event name. Carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signal(String);

impl Signal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Signal {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Signal {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for Signal {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Signal {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Observer {
    fn handle_event(&self, signal: &Signal);
}

/// Per-agent publish/subscribe channel.
///
/// The bus only holds weak references: it never keeps an observer alive, and
/// an observer dropped without unsubscribing is pruned on the next publish.
/// `publish` dispatches to a snapshot of the subscriber list taken on entry,
/// so subscribe/unsubscribe calls made from inside `handle_event` only affect
/// later publishes.
pub struct EventBus {
    owner: String,
    observers: RefCell<Vec<Weak<dyn Observer>>>,
}

impl EventBus {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            observers: RefCell::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Adds `observer` unless it is already subscribed. Returns whether it was added.
    pub fn subscribe<O: Observer + 'static>(&self, observer: &Rc<O>) -> bool {
        let address = Rc::as_ptr(observer) as *const ();
        let mut observers = self.observers.borrow_mut();
        observers.retain(|existing| existing.strong_count() > 0);
        if observers
            .iter()
            .any(|existing| observer_address(existing) == address)
        {
            return false;
        }
        let weak: Weak<O> = Rc::downgrade(observer);
        let weak: Weak<dyn Observer> = weak;
        observers.push(weak);
        debug!(
            owner = %self.owner,
            subscriber_count = observers.len(),
            "observer_subscribed"
        );
        true
    }

    /// Removes `observer` if present. Unknown observers are ignored.
    pub fn unsubscribe<O: Observer + 'static>(&self, observer: &Rc<O>) -> bool {
        self.unsubscribe_ref(&**observer)
    }

    /// Same as [`EventBus::unsubscribe`], for observers that only hold `&self`,
    /// such as one leaving the bus from inside its own `handle_event`.
    pub fn unsubscribe_ref<O: Observer>(&self, observer: &O) -> bool {
        let address = observer as *const O as *const ();
        let mut observers = self.observers.borrow_mut();
        let removed = observers
            .iter()
            .any(|existing| observer_address(existing) == address);
        observers.retain(|existing| {
            existing.strong_count() > 0 && observer_address(existing) != address
        });
        if removed {
            debug!(
                owner = %self.owner,
                subscriber_count = observers.len(),
                "observer_unsubscribed"
            );
        }
        removed
    }

    /// Delivers `signal` once to every observer subscribed when this call was
    /// entered, in subscription order. Returns the number of deliveries.
    pub fn publish(&self, signal: impl Into<Signal>) -> usize {
        let signal = signal.into();
        let snapshot: Vec<Rc<dyn Observer>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|existing| existing.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        debug!(
            owner = %self.owner,
            signal = %signal,
            subscriber_count = snapshot.len(),
            "signal_published"
        );
        for observer in &snapshot {
            observer.handle_event(&signal);
        }
        snapshot.len()
    }

    pub fn is_subscribed<O: Observer + 'static>(&self, observer: &Rc<O>) -> bool {
        let address = Rc::as_ptr(observer) as *const ();
        self.observers
            .borrow()
            .iter()
            .any(|existing| existing.strong_count() > 0 && observer_address(existing) == address)
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|existing| existing.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("owner", &self.owner)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

fn observer_address(observer: &Weak<dyn Observer>) -> *const () {
    observer.as_ptr() as *const ()
}
