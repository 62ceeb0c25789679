//! # Events
//!
//! A small named-listener emitter composed into every model type and every
//! instance. Events are observational: listeners cannot cancel or alter the
//! operation that emitted them.
//!
//! Listeners are cloned out of the registry before they run, so a listener
//! may register further listeners or read the emitting instance without
//! deadlocking.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::attribute::Attribute;
use crate::instance::Instance;
use crate::validation::AttributeError;
use crate::value::{Attributes, Collection, Query};

/// Listener callback.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Payload delivered to listeners.
///
/// The same payload is emitted at type level and at instance level, so
/// instance-level listeners also get the instance handle.
#[derive(Debug, Clone)]
pub enum Event {
    Initializing { instance: Instance, attributes: Attributes },
    Initialized { instance: Instance },
    Attribute { name: String, attribute: Attribute },
    Setting { instance: Instance, attributes: Attributes },
    Change { instance: Instance, name: String, value: Value, previous: Value },
    Error { instance: Instance, error: AttributeError },
    BeforeSave { instance: Instance, changed: Attributes },
    AfterSave { instance: Instance },
    BeforeRemove { instance: Instance },
    AfterRemove { instance: Instance },
    BeforeFind { query: Query },
    AfterFind { instance: Option<Instance> },
    BeforeFindAll { query: Query },
    AfterFindAll { collection: Collection },
    BeforeCount { query: Query },
    AfterCount { count: u64 },
    BeforeRemoveAll { query: Query },
    AfterRemoveAll,
}

impl Event {
    /// Canonical event name. `Change` is additionally emitted as `change:<attr>`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initializing { .. } => "initializing",
            Event::Initialized { .. } => "initialized",
            Event::Attribute { .. } => "attribute",
            Event::Setting { .. } => "setting",
            Event::Change { .. } => "change",
            Event::Error { .. } => "error",
            Event::BeforeSave { .. } => "before save",
            Event::AfterSave { .. } => "after save",
            Event::BeforeRemove { .. } => "before remove",
            Event::AfterRemove { .. } => "after remove",
            Event::BeforeFind { .. } => "before find",
            Event::AfterFind { .. } => "after find",
            Event::BeforeFindAll { .. } => "before findAll",
            Event::AfterFindAll { .. } => "after findAll",
            Event::BeforeCount { .. } => "before count",
            Event::AfterCount { .. } => "after count",
            Event::BeforeRemoveAll { .. } => "before removeAll",
            Event::AfterRemoveAll => "after removeAll",
        }
    }
}

/// Listener-name to ordered listener list.
#[derive(Default)]
pub struct Emitter {
    listeners: RwLock<IndexMap<String, Vec<Listener>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Removes every listener registered under `name`.
    pub fn off(&self, name: &str) {
        self.listeners.write().shift_remove(name);
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners
            .read()
            .get(name)
            .is_some_and(|list| !list.is_empty())
    }

    /// Emits under the event's canonical name.
    pub fn emit(&self, event: &Event) {
        self.emit_as(event.name(), event);
    }

    /// Emits under an explicit name, e.g. `change:title`.
    pub fn emit_as(&self, name: &str, event: &Event) {
        let listeners = match self.listeners.read().get(name) {
            Some(list) => list.clone(),
            None => return,
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_map()
            .entries(listeners.iter().map(|(name, list)| (name, list.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listeners_run_in_registration_order() {
        let emitter = Emitter::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            emitter.on("after removeAll", move |_| seen.lock().push(tag));
        }
        emitter.emit(&Event::AfterRemoveAll);

        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_off_and_explicit_names() {
        let emitter = Emitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        emitter.on("change:name", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit_as("change:name", &Event::AfterRemoveAll);
        emitter.emit(&Event::AfterRemoveAll);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        emitter.off("change:name");
        assert!(!emitter.has_listeners("change:name"));
        emitter.emit_as("change:name", &Event::AfterRemoveAll);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_register_listeners() {
        let emitter = Arc::new(Emitter::new());
        let inner = emitter.clone();
        emitter.on("after count", move |_| inner.on("after count", |_| {}));
        emitter.emit(&Event::AfterCount { count: 0 });
    }
}
