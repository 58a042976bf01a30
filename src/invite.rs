//! # Inviting contacts to encrypted mail.
//!
//! A participant without a key can be invited. The invitation is first
//! registered with the invitation service; only once that succeeded a
//! bootstrap message telling the contact how to get started is queued
//! for sending. A failure to queue the message never re-sends the
//! invitation itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::context::Context;
use crate::error::{ErrorReporter, ViewError};
use crate::participant::Participant;
use crate::status_line::StatusLine;
use crate::stock_str;
use crate::EventType;

/// Invitation registered with the [`InvitationService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRequest {
    pub sender: String,
    pub recipient: String,
}

/// Registers invitations, e.g. with a key server.
pub trait InvitationService: fmt::Debug + Send + Sync {
    fn invite<'a>(&'a self, request: &'a InvitationRequest) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAddress {
    pub address: String,
}

/// Message sent to a freshly invited contact.
///
/// It always goes from the inviter to the invitee alone, with no copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapMessage {
    pub from: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub bcc: Vec<MailAddress>,
    pub subject: String,
    pub body: String,
}

impl BootstrapMessage {
    fn new(sender: String, recipient: String, subject: String, body: String) -> Self {
        Self {
            from: vec![MailAddress { address: sender }],
            to: vec![MailAddress { address: recipient }],
            cc: Vec::new(),
            bcc: Vec::new(),
            subject,
            body,
        }
    }
}

/// Queue of messages waiting to be sent, owning them once enqueued.
pub trait OutboundQueue: fmt::Debug + Send + Sync {
    fn enqueue(&self, msg: BootstrapMessage) -> BoxFuture<'_, Result<()>>;
}

/// How an invitation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    /// The participant is already secure, nothing was done.
    Skipped,

    /// Another invitation of this view is still in flight.
    Busy,

    /// The invitation was registered and the bootstrap message queued.
    Sent,

    /// The invitation could not be registered, no message was queued.
    InvitationFailed,

    /// The invitation was registered but the bootstrap message could not be queued.
    EnqueueFailed,
}

#[derive(Debug)]
pub(crate) struct InvitationWorkflow {
    context: Context,
    service: Arc<dyn InvitationService>,
    outbox: Arc<dyn OutboundQueue>,
    reporter: Arc<dyn ErrorReporter>,
    status_line: Arc<StatusLine>,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag, also if the invitation future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InvitationWorkflow {
    pub(crate) fn new(
        context: &Context,
        service: Arc<dyn InvitationService>,
        outbox: Arc<dyn OutboundQueue>,
        reporter: Arc<dyn ErrorReporter>,
        status_line: Arc<StatusLine>,
    ) -> Self {
        Self {
            context: context.clone(),
            service,
            outbox,
            reporter,
            status_line,
            in_flight: AtomicBool::new(false),
        }
    }

    pub(crate) async fn invite(&self, participant: &Participant) -> InviteOutcome {
        if participant.is_secure() {
            info!(
                self.context,
                "Not inviting {}, a key is already known.",
                participant.addr()
            );
            return InviteOutcome::Skipped;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(
                self.context,
                "Not inviting {}, another invitation is in progress.",
                participant.addr()
            );
            return InviteOutcome::Busy;
        }
        let _guard = InFlight(&self.in_flight);

        let addr = participant.addr().to_string();
        self.status_line
            .set(stock_str::sending_invitation(&self.context).await);

        let sender = match self.sender_addr().await {
            Ok(sender) => sender,
            Err(cause) => {
                self.reporter.report(ViewError::Invitation { addr, cause });
                return InviteOutcome::InvitationFailed;
            }
        };

        let request = InvitationRequest {
            sender: sender.clone(),
            recipient: addr.clone(),
        };
        if let Err(cause) = self.service.invite(&request).await {
            self.reporter.report(ViewError::Invitation { addr, cause });
            return InviteOutcome::InvitationFailed;
        }

        let msg = BootstrapMessage::new(
            sender,
            addr.clone(),
            stock_str::invitation_subject(&self.context).await,
            stock_str::invitation_body(&self.context).await,
        );
        if let Err(cause) = self.outbox.enqueue(msg).await {
            self.reporter.report(ViewError::Enqueue { addr, cause });
            return InviteOutcome::EnqueueFailed;
        }

        info!(self.context, "Invitation to {addr} queued.");
        self.context.emit_event(EventType::InvitationSent { addr });
        InviteOutcome::Sent
    }

    async fn sender_addr(&self) -> Result<String> {
        self.context
            .get_config(Config::ConfiguredAddr)
            .await?
            .context("no account address configured")
    }
}
