//! Transient key status text, e.g. "Searching..." or "Sending invitation...".

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::context::Context;
use crate::EventType;

/// Single line of status text shared by key lookups and invitations.
///
/// Every writer gets a ticket; a slow operation may only overwrite the text
/// if nobody wrote to the line since it took its ticket.
#[derive(Debug)]
pub(crate) struct StatusLine {
    context: Context,
    text: Mutex<String>,
    generation: AtomicU64,
}

impl StatusLine {
    pub(crate) fn new(context: &Context, initial: String) -> Self {
        Self {
            context: context.clone(),
            text: Mutex::new(initial),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self) -> String {
        self.text.lock().clone()
    }

    /// Unconditionally sets the text and returns the ticket for later updates.
    pub(crate) fn set(&self, text: String) -> u64 {
        let mut current = self.text.lock();
        let ticket = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.write(&mut current, text);
        ticket
    }

    /// Sets the text if `ticket` is still the latest one.
    pub(crate) fn update(&self, ticket: u64, text: String) -> bool {
        let mut current = self.text.lock();
        if self.generation.load(Ordering::Acquire) != ticket {
            return false;
        }
        self.write(&mut current, text);
        true
    }

    /// Events are emitted under the lock, so they arrive in the order of the writes.
    fn write(&self, current: &mut String, text: String) {
        current.clone_from(&text);
        self.context.emit_event(EventType::KeyIdChanged(text));
    }
}
