//! Keeps the observers registered on a timer, in registration order.

use crate::common::ListenerId;
use crate::events::{EventKind, TimerEvent};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A closure notified of timer events.
pub type Observer = Arc<dyn Fn(&TimerEvent) + Send + Sync>;

pub(crate) struct ObserverEntry {
    pub kind: EventKind,
    pub handler: Observer,
}

/// Maps each event kind to an ordered list of observers.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    entries: SlotMap<ListenerId, ObserverEntry>,
    order: HashMap<EventKind, Vec<ListenerId>>,
}

impl ObserverRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, kind: EventKind, handler: Observer) -> ListenerId {
        let id = self.entries.insert(ObserverEntry { kind, handler });
        self.order.entry(kind).or_default().push(id);
        id
    }

    /// Returns `true` if the observer was found and removed.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                if let Some(ids) = self.order.get_mut(&entry.kind) {
                    ids.retain(|other| *other != id);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clones out the handlers for `kind` so they can be called without
    /// holding the registry.
    pub(crate) fn handlers_for(&self, kind: EventKind) -> Vec<Observer> {
        self.order
            .get(&kind)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.entries.get(*id))
                    .map(|entry| entry.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TimerId;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Observer {
        let log = log.clone();
        Arc::new(move |_event: &TimerEvent| log.lock().unwrap().push(name))
    }

    fn fire(registry: &ObserverRegistry, event: TimerEvent) {
        for handler in registry.handlers_for(event.kind()) {
            handler(&event);
        }
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ObserverRegistry::new();
        registry.insert(EventKind::Tick, recorder(&log, "first"));
        registry.insert(EventKind::Finish, recorder(&log, "other"));
        registry.insert(EventKind::Tick, recorder(&log, "second"));
        registry.insert(EventKind::Tick, recorder(&log, "third"));

        fire(
            &registry,
            TimerEvent::Tick {
                timer: TimerId(1),
                elapsed_ms: 10,
            },
        );
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn removed_handlers_stop_firing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ObserverRegistry::new();
        let keep = registry.insert(EventKind::Stop, recorder(&log, "keep"));
        let dropped = registry.insert(EventKind::Stop, recorder(&log, "drop"));

        assert!(registry.remove(dropped));
        assert!(!registry.remove(dropped));
        fire(&registry, TimerEvent::Stopped { timer: TimerId(1) });

        assert_eq!(*log.lock().unwrap(), vec!["keep"]);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(keep));
        assert!(registry.handlers_for(EventKind::Stop).is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ObserverRegistry::new();
        for kind in EventKind::ALL {
            registry.insert(kind, recorder(&log, "any"));
        }
        assert_eq!(registry.len(), 5);
        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(registry.handlers_for(EventKind::Start).is_empty());
    }
}
