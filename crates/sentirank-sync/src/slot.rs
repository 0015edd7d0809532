//! Ticketed last-write-wins cell.
//!
//! Every request takes a [`Ticket`] before it starts its work. When the work completes it may
//! only publish if no newer ticket has been issued in the meantime, so a slow request that
//! finishes after a faster, later one is discarded instead of overwriting it.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn number(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct SlotState<T> {
    issued: u64,
    value: Option<Arc<T>>,
}

#[derive(Debug)]
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                issued: 0,
                value: None,
            }),
        }
    }

    pub fn issue(&self) -> Ticket {
        let mut state = self.lock();
        state.issued += 1;
        Ticket(state.issued)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.lock().issued == ticket.0
    }

    /// Stores `value` if `ticket` is still the newest issued. Returns whether it was stored.
    pub fn publish(&self, ticket: Ticket, value: T) -> bool {
        let mut state = self.lock();
        if state.issued != ticket.0 {
            return false;
        }
        state.value = Some(Arc::new(value));
        true
    }

    pub fn latest(&self) -> Option<Arc<T>> {
        self.lock().value.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // Poisoning only means a panic elsewhere; the counter and value are still coherent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
