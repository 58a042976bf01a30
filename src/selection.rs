//! # Currently displayed message.
//!
//! Asynchronous work captures the [`SelectionToken`] of the message it was
//! started for. Results are applied through [`Selections::apply_if_current`],
//! which runs under the selection lock, so a selection change can never slip
//! in between the check and the update.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::message::{DisplayedMessage, MsgId};
use crate::render::RenderState;

/// Identity of one display of a message.
///
/// Selecting the same message twice yields two different tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectionToken(u64);

impl fmt::Display for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selection#{}", self.0)
    }
}

/// A message together with its per-display rendering state.
#[derive(Debug)]
pub(crate) struct Selection {
    token: SelectionToken,
    msg: DisplayedMessage,
    render: Mutex<RenderState>,
}

impl Selection {
    pub(crate) fn token(&self) -> SelectionToken {
        self.token
    }

    pub(crate) fn msg(&self) -> &DisplayedMessage {
        &self.msg
    }

    pub(crate) fn render(&self) -> MutexGuard<'_, RenderState> {
        self.render.lock()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Selections {
    current: RwLock<Option<Arc<Selection>>>,
    last_token: AtomicU64,
}

impl Selections {
    /// Displays `msg`, dropping whatever was displayed before.
    pub(crate) fn replace(&self, msg: DisplayedMessage) -> Arc<Selection> {
        let token = SelectionToken(self.last_token.fetch_add(1, Ordering::Relaxed) + 1);
        let render = RenderState::new(
            msg.text().map(str::to_string),
            msg.html().map(str::to_string),
            msg.is_encrypted(),
            msg.is_decrypted(),
        );
        let selection = Arc::new(Selection {
            token,
            msg,
            render: Mutex::new(render),
        });
        *self.current.write() = Some(Arc::clone(&selection));
        selection
    }

    pub(crate) fn clear(&self) {
        *self.current.write() = None;
    }

    pub(crate) fn current(&self) -> Option<Arc<Selection>> {
        self.current.read().clone()
    }

    /// Runs `f` if the message `msg_id` is displayed.
    ///
    /// Like [`Self::apply_if_current`], the selection cannot change while `f` runs.
    pub(crate) fn apply_if_displayed<R>(
        &self,
        msg_id: MsgId,
        f: impl FnOnce(&Selection) -> R,
    ) -> Option<R> {
        let current = self.current.read();
        match current.as_deref() {
            Some(sel) if sel.msg.id() == msg_id => Some(f(sel)),
            _ => None,
        }
    }

    /// Runs `f` if `token` still identifies the displayed message.
    ///
    /// The selection cannot change while `f` runs.
    pub(crate) fn apply_if_current<R>(
        &self,
        token: SelectionToken,
        f: impl FnOnce(&Selection) -> R,
    ) -> Option<R> {
        let current = self.current.read();
        match current.as_deref() {
            Some(sel) if sel.token == token => Some(f(sel)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_differ_per_display() {
        let selections = Selections::default();
        let first = selections.replace(DisplayedMessage::new(MsgId::new(1), "INBOX", 1));
        let second = selections.replace(DisplayedMessage::new(MsgId::new(1), "INBOX", 1));
        assert_ne!(first.token(), second.token());

        assert_eq!(selections.apply_if_current(first.token(), |_| ()), None);
        assert_eq!(
            selections.apply_if_current(second.token(), |sel| sel.msg().uid()),
            Some(1)
        );
        assert_eq!(
            selections.apply_if_displayed(MsgId::new(1), |sel| sel.token()),
            Some(second.token())
        );
        assert_eq!(selections.apply_if_displayed(MsgId::new(2), |_| ()), None);

        selections.clear();
        assert!(selections.current().is_none());
        assert_eq!(selections.apply_if_current(second.token(), |_| ()), None);
    }
}
