//! Context module.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::events::{Event, EventEmitter, EventType, Events};
use crate::stock_str::StockStrings;

/// The context shared by all parts of a message view.
///
/// It carries configuration, translations and the event channel.
/// The collaborators doing I/O are not part of the context,
/// they are handed to the components that need them.
///
/// The context is cheap to clone, all clones refer to the same state.
#[derive(Clone, Debug)]
pub struct Context {
    pub(crate) inner: Arc<InnerContext>,
}

impl Deref for Context {
    type Target = InnerContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Actual context, expensive to clone.
#[derive(Debug)]
pub struct InnerContext {
    /// ID of the context, reported with every event.
    pub(crate) id: u32,
    pub(crate) config: RwLock<HashMap<Config, String>>,
    pub(crate) translated_stockstrings: StockStrings,
    pub(crate) events: Events,
}

/// Source of unique context IDs for contexts created without one.
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

impl Context {
    /// Creates a new context with a fresh event channel.
    pub fn new() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self::with_id(id, Events::new(), StockStrings::new())
    }

    /// Creates a context which emits into an existing event channel,
    /// e.g. one shared by several views.
    pub fn with_id(id: u32, events: Events, stockstrings: StockStrings) -> Self {
        let inner = InnerContext {
            id,
            config: RwLock::new(HashMap::new()),
            translated_stockstrings: stockstrings,
            events,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the context ID.
    pub fn get_id(&self) -> u32 {
        self.id
    }

    /// Emits a single event.
    pub fn emit_event(&self, event: EventType) {
        self.events.emit(Event {
            id: self.id,
            typ: event,
        });
    }

    /// Returns a receiver for emitted events.
    ///
    /// Multiple emitters can be created, but note that in this case each emitted event will
    /// only be received by one of the emitters, not by all of them.
    pub fn get_event_emitter(&self) -> EventEmitter {
        self.events.get_emitter()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
