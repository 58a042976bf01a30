//! # Read pane of a mail client.
//!
//! Shows a single message: the encryption readiness of every participant,
//! invitations for participants without a key, the body rendered behind an
//! isolation boundary with remote images suppressed until revealed, and
//! attachments saved to disk on demand.

#![recursion_limit = "256"]
#![warn(
    unused,
    clippy::correctness,
    missing_debug_implementations,
    clippy::all,
    clippy::wildcard_imports,
    clippy::needless_borrow,
    clippy::cast_lossless,
    clippy::unused_async,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::cloned_instead_of_copied
)]
#![cfg_attr(not(test), forbid(clippy::indexing_slicing))]
#![cfg_attr(not(test), forbid(clippy::string_slice))]
#![allow(clippy::match_bool, clippy::bool_to_int_with_if)]

#[macro_use]
mod log;

pub mod attachment;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod invite;
pub mod key;
pub mod message;
pub mod participant;
pub mod readview;
pub mod render;
pub mod securestatus;
pub mod selection;
mod status_line;
pub mod stock_str;

pub use attachment::{AttachmentRequest, AttachmentStore};
pub use context::Context;
pub use error::{ErrorReporter, ViewError};
pub use events::{Event, EventEmitter, EventType, Events};
pub use invite::{
    BootstrapMessage, InvitationRequest, InvitationService, InviteOutcome, MailAddress,
    OutboundQueue,
};
pub use key::{
    Fingerprint, FingerprintFormatter, FsKeyDirectory, KeyDirectory, PgpFingerprinter,
    PublicKeyRecord,
};
pub use message::{Attachment, DisplayedMessage, MsgId};
pub use participant::{Participant, Role, SecureStatus};
pub use readview::{Collaborators, ReadView, ViewEvent};
pub use render::{ContentChannel, RenderMessage, RenderPhase};

#[cfg(test)]
mod test_utils;
