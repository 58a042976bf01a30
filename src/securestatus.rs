//! # Encryption readiness of message participants.
//!
//! Every participant of the displayed message gets its own key lookup.
//! Lookups run concurrently and finish in any order. A result is bound to
//! the [`Participant`] object it was started for and is only applied if that
//! object still belongs to the displayed message.

use std::sync::Arc;

use anyhow::Context as _;
use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::error::{ErrorReporter, ViewError};
use crate::key::{FingerprintFormatter, KeyDirectory, PublicKeyRecord};
use crate::participant::{Participant, Resolving, SecureStatus};
use crate::selection::{SelectionToken, Selections};
use crate::status_line::StatusLine;
use crate::stock_str;
use crate::EventType;

/// Lookups started by one resolution pass.
#[derive(Debug)]
#[must_use = "dropping a Resolution detaches the lookups, use `settled()` to wait for them"]
pub struct Resolution {
    handles: Vec<JoinHandle<()>>,
}

impl Resolution {
    /// Number of lookups started.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits until every lookup has either been applied, discarded or reported.
    pub async fn settled(self) {
        join_all(self.handles).await;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SecurityStatusResolver {
    context: Context,
    key_directory: Arc<dyn KeyDirectory>,
    fingerprinter: Arc<dyn FingerprintFormatter>,
    reporter: Arc<dyn ErrorReporter>,
    selections: Arc<Selections>,
    status_line: Arc<StatusLine>,
}

impl SecurityStatusResolver {
    pub(crate) fn new(
        context: &Context,
        key_directory: Arc<dyn KeyDirectory>,
        fingerprinter: Arc<dyn FingerprintFormatter>,
        reporter: Arc<dyn ErrorReporter>,
        selections: Arc<Selections>,
        status_line: Arc<StatusLine>,
    ) -> Self {
        Self {
            context: context.clone(),
            key_directory,
            fingerprinter,
            reporter,
            selections,
            status_line,
        }
    }

    /// Starts one lookup per participant of the selection identified by `token`.
    ///
    /// Participants that already have a lookup in flight are skipped.
    pub(crate) fn resolve(
        &self,
        token: SelectionToken,
        participants: &[Arc<Participant>],
    ) -> Resolution {
        let handles = participants
            .iter()
            .filter_map(|participant| participant.begin_resolution())
            .map(|resolving| {
                let resolver = self.clone();
                tokio::spawn(async move { resolver.check_public_key(token, resolving).await })
            })
            .collect();
        Resolution { handles }
    }

    async fn check_public_key(&self, token: SelectionToken, resolving: Resolving) {
        let participant = resolving.participant();
        let addr = participant.addr().to_string();
        match self.key_directory.lookup(&addr).await {
            Ok(record) => {
                let status = if record.as_ref().is_some_and(PublicKeyRecord::has_key) {
                    SecureStatus::Secure
                } else {
                    SecureStatus::Insecure
                };
                let applied = self
                    .selections
                    .apply_if_current(token, |sel| {
                        if !sel.msg().holds(participant) {
                            return None;
                        }
                        participant.set_status(status);
                        Some(sel.msg().id())
                    })
                    .flatten();
                match applied {
                    Some(msg_id) => {
                        self.context
                            .emit_event(EventType::ParticipantStatusChanged {
                                msg_id,
                                addr,
                                status,
                            });
                    }
                    None => {
                        info!(
                            self.context,
                            "Discarding key lookup result for {addr} of {token}, message is no longer displayed."
                        );
                    }
                }
            }
            Err(cause) => {
                self.reporter.report(ViewError::Lookup { addr, cause });
            }
        }
    }

    /// Looks up a single address for the key status line.
    ///
    /// Returns the text shown, or `None` if the lookup failed.
    /// The status line keeps "Searching..." in that case.
    pub(crate) async fn resolve_one(&self, addr: &str) -> Option<String> {
        let ticket = self
            .status_line
            .set(stock_str::searching(&self.context).await);

        let text = match self.key_id_text(addr).await {
            Ok(text) => text,
            Err(cause) => {
                self.reporter.report(ViewError::Lookup {
                    addr: addr.to_string(),
                    cause,
                });
                return None;
            }
        };
        if !self.status_line.update(ticket, text.clone()) {
            info!(
                self.context,
                "Key status of {addr} superseded before the lookup finished."
            );
        }
        Some(text)
    }

    async fn key_id_text(&self, addr: &str) -> anyhow::Result<String> {
        let record = self.key_directory.lookup(addr).await?;
        match record.filter(PublicKeyRecord::has_key) {
            Some(record) => {
                let fingerprint = self
                    .fingerprinter
                    .fingerprint_of(&record.public_key)
                    .context("cannot compute fingerprint")?;
                Ok(stock_str::pgp_key_id(&self.context, fingerprint.tail()).await)
            }
            None => Ok(stock_str::no_key_click_to_invite(&self.context).await),
        }
    }
}
