//! Per-component listener registration
//!
//! Processors never own their listeners. Each component holds a `Weak`
//! reference; events for a listener that has gone away are dropped. The
//! table lives behind the processor's event lock, and callers snapshot the
//! live listeners before invoking them with no lock held.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::error::ErrorCode;

/// Receiver of acquisition events for one component
pub trait ComponentListener: Send + Sync {
    /// `counts` events were registered on `channel` at host tick `timestamp`
    fn on_counts(&self, timestamp: i64, channel: u16, counts: u32);

    /// The acquisition finished; `forced` is true when queued data was
    /// discarded
    fn on_finished(&self, forced: bool);

    /// A stream-level fault occurred
    fn on_error(&self, code: ErrorCode, message: &str);
}

/// Component id to listener table
#[derive(Default)]
pub struct ListenerTable {
    entries: BTreeMap<u8, Weak<dyn ComponentListener>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, component: u8, listener: Weak<dyn ComponentListener>) {
        self.entries.insert(component, listener);
    }

    pub fn remove(&mut self, component: u8) {
        self.entries.remove(&component);
    }

    /// Live listener for one component
    pub fn get(&self, component: u8) -> Option<Arc<dyn ComponentListener>> {
        self.entries.get(&component).and_then(Weak::upgrade)
    }

    /// Live listeners for a set of components, in the order given
    pub fn snapshot<I>(&self, components: I) -> Vec<(u8, Arc<dyn ComponentListener>)>
    where
        I: IntoIterator<Item = u8>,
    {
        components
            .into_iter()
            .filter_map(|id| self.get(id).map(|l| (id, l)))
            .collect()
    }

    /// Every live listener
    pub fn all(&self) -> Vec<(u8, Arc<dyn ComponentListener>)> {
        self.entries
            .iter()
            .filter_map(|(id, l)| l.upgrade().map(|l| (*id, l)))
            .collect()
    }
}

impl core::fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Send one error to every listener in `listeners`
pub fn broadcast_error(
    listeners: &[(u8, Arc<dyn ComponentListener>)],
    code: ErrorCode,
    message: &str,
) {
    for (_, l) in listeners {
        l.on_error(code, message);
    }
}
