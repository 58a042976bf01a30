//! # Events emitted by the message view.

use std::path::PathBuf;

use async_channel::{self as channel, Receiver, Sender, TrySendError};

use crate::message::MsgId;
use crate::participant::SecureStatus;

/// Event channel.
#[derive(Debug, Clone)]
pub struct Events {
    receiver: Receiver<Event>,
    sender: Sender<Event>,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    /// Creates a new event channel.
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(1_000);

        Self { receiver, sender }
    }

    /// Emits an event.
    pub fn emit(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                // when we are full, we pop remove the oldest event and push on the new one
                let _ = self.receiver.try_recv();

                // try again
                self.emit(event);
            }
            Err(TrySendError::Closed(_)) => {
                // The channel is never closed as we own a receiver.
            }
        }
    }

    /// Creates an event emitter.
    pub fn get_emitter(&self) -> EventEmitter {
        EventEmitter(self.receiver.clone())
    }
}

/// A receiver of events from a [`crate::context::Context`].
///
/// Every emitter receives every event only once, so a second emitter
/// competes with the first one for events.
#[derive(Debug, Clone)]
pub struct EventEmitter(Receiver<Event>);

impl EventEmitter {
    /// Async recv of an event. Return `None` if the `Sender` has been dropped.
    pub async fn recv(&self) -> Option<Event> {
        self.0.recv().await.ok()
    }

    /// Tries to receive an event without blocking.
    pub fn try_recv(&self) -> Option<Event> {
        self.0.try_recv().ok()
    }
}

/// The event emitted by a [`crate::context::Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The ID of the [`crate::context::Context`] which emitted this event.
    ///
    /// This allows using multiple contexts in a single event channel.
    pub id: u32,

    /// The event payload.
    pub typ: EventType,
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// The library-user may write an informational string to the log.
    ///
    /// This event should *not* be reported to the end-user using a popup or something like
    /// that.
    Info(String),

    /// The library-user should write a warning string to the log.
    ///
    /// This event should *not* be reported to the end-user using a popup or something like
    /// that.
    Warning(String),

    /// The library-user should report an error to the end-user.
    ///
    /// As most things are asynchronous, things may go wrong at any time and the user
    /// should not be disturbed by a dialog or so. Instead, use a bubble or so.
    Error(String),

    /// A new message is displayed, or the view was cleared (`msg_id` is `None`).
    SelectionChanged {
        /// ID of the displayed message.
        msg_id: Option<MsgId>,
    },

    /// The key lookup for a participant of the displayed message finished.
    ParticipantStatusChanged {
        /// ID of the displayed message.
        msg_id: MsgId,
        /// Address of the participant.
        addr: String,
        /// New status.
        status: SecureStatus,
    },

    /// The transient key status text changed, e.g. "Searching...".
    KeyIdChanged(String),

    /// An invitation was accepted by the invitation service
    /// and the bootstrap message was handed to the outbox.
    InvitationSent {
        /// Address of the invited participant.
        addr: String,
    },

    /// The "show images" button should be shown or hidden.
    ShowImagesChanged {
        /// ID of the displayed message.
        msg_id: MsgId,
        /// Whether the button is visible.
        visible: bool,
    },

    /// An attachment was written to disk.
    AttachmentSaved {
        /// Where the file was written to.
        path: PathBuf,
        /// MIME type of the attachment, if known.
        mime_type: Option<String>,
    },
}
