//! # Read pane.
//!
//! [`ReadView`] ties the parts of the message view together. The host feeds
//! it [`ViewEvent`]s, either directly or through [`ReadView::run`], and calls
//! the user actions (`invite`, `show_images`, `download`) on it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_channel::Receiver;
use parking_lot::Mutex;

use crate::attachment::{AttachmentDownloader, AttachmentStore};
use crate::config::Config;
use crate::context::Context;
use crate::error::ErrorReporter;
use crate::invite::{InvitationService, InvitationWorkflow, InviteOutcome, OutboundQueue};
use crate::key::{FingerprintFormatter, KeyDirectory};
use crate::message::{Attachment, DisplayedMessage, MsgId};
use crate::participant::Participant;
use crate::render::{ContentChannel, RenderMessage, RenderState};
use crate::securestatus::{Resolution, SecurityStatusResolver};
use crate::selection::Selections;
use crate::status_line::StatusLine;
use crate::stock_str;
use crate::EventType;

/// Change notifications the host delivers to the view.
///
/// Each event should fire once per actual change of the value.
/// Body updates for a message that is not displayed are ignored.
#[derive(Debug)]
pub enum ViewEvent {
    /// Another message is displayed, `None` clears the view.
    SelectionChanged(Option<DisplayedMessage>),

    /// The plain-text body of a message became available or changed.
    BodyChanged {
        msg_id: MsgId,
        text: Option<String>,
    },

    /// The HTML body of a message became available or changed.
    HtmlChanged {
        msg_id: MsgId,
        html: Option<String>,
    },

    /// An encrypted message was decrypted, with its plain-text body if any.
    Decrypted {
        msg_id: MsgId,
        text: Option<String>,
    },
}

/// Everything the view talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub key_directory: Arc<dyn KeyDirectory>,
    pub fingerprinter: Arc<dyn FingerprintFormatter>,
    pub invitation_service: Arc<dyn InvitationService>,
    pub outbox: Arc<dyn OutboundQueue>,
    pub attachment_store: Arc<dyn AttachmentStore>,
    pub reporter: Arc<dyn ErrorReporter>,
}

#[derive(Debug)]
pub struct ReadView {
    context: Context,
    selections: Arc<Selections>,
    status_line: Arc<StatusLine>,
    resolver: SecurityStatusResolver,
    invitations: InvitationWorkflow,
    downloader: AttachmentDownloader,
    channel: ContentChannel,

    /// Serializes selection changes.
    selecting: Mutex<()>,

    /// Whether the read pane is open, only relevant on small screens.
    open: AtomicBool,
}

impl ReadView {
    pub async fn new(
        context: &Context,
        collaborators: Collaborators,
        channel: ContentChannel,
    ) -> Result<Self> {
        let selections = Arc::new(Selections::default());
        let status_line = Arc::new(StatusLine::new(
            context,
            stock_str::no_key_found(context).await,
        ));
        let resolver = SecurityStatusResolver::new(
            context,
            collaborators.key_directory,
            collaborators.fingerprinter,
            Arc::clone(&collaborators.reporter),
            Arc::clone(&selections),
            Arc::clone(&status_line),
        );
        let invitations = InvitationWorkflow::new(
            context,
            collaborators.invitation_service,
            collaborators.outbox,
            Arc::clone(&collaborators.reporter),
            Arc::clone(&status_line),
        );
        let downloader = AttachmentDownloader::new(
            context,
            collaborators.attachment_store,
            collaborators.reporter,
            Arc::clone(&selections),
        );
        let open = context.get_config_bool(Config::ReadOpen).await?;

        Ok(Self {
            context: context.clone(),
            selections,
            status_line,
            resolver,
            invitations,
            downloader,
            channel,
            selecting: Mutex::new(()),
            open: AtomicBool::new(open),
        })
    }

    /// Displays a message, or clears the view.
    ///
    /// Starts key lookups for all participants and renders the body.
    /// Must be called from within a tokio runtime.
    pub fn select(&self, msg: Option<DisplayedMessage>) -> Option<Resolution> {
        let _selecting = self.selecting.lock();
        let Some(msg) = msg else {
            self.selections.clear();
            self.channel.post(RenderMessage::Text { text: None });
            self.context
                .emit_event(EventType::SelectionChanged { msg_id: None });
            return None;
        };

        let msg_id = msg.id();
        let sel = self.selections.replace(msg);
        self.context.emit_event(EventType::SelectionChanged {
            msg_id: Some(msg_id),
        });

        let resolution = self.resolver.resolve(sel.token(), sel.msg().participants());
        let visible = self
            .selections
            .apply_if_current(sel.token(), |sel| {
                let mut render = sel.render();
                render.refresh(&self.channel);
                render.show_image_button()
            })
            .unwrap_or_default();
        self.context
            .emit_event(EventType::ShowImagesChanged { msg_id, visible });
        Some(resolution)
    }

    /// Applies a single event.
    pub fn handle_event(&self, event: ViewEvent) {
        match event {
            ViewEvent::SelectionChanged(msg) => {
                if let Some(resolution) = self.select(msg) {
                    info!(self.context, "Started {} key lookups.", resolution.len());
                }
            }
            ViewEvent::BodyChanged { msg_id, text } => self.body_changed(msg_id, text),
            ViewEvent::HtmlChanged { msg_id, html } => self.html_changed(msg_id, html),
            ViewEvent::Decrypted { msg_id, text } => self.decrypted(msg_id, text),
        }
    }

    /// Applies events until the sending side is closed.
    pub async fn run(&self, events: Receiver<ViewEvent>) {
        while let Ok(event) = events.recv().await {
            self.handle_event(event);
        }
        info!(self.context, "View event channel closed.");
    }

    pub fn body_changed(&self, msg_id: MsgId, text: Option<String>) {
        self.update_render(msg_id, "body", |render, channel| {
            render.set_body(text, channel)
        });
    }

    pub fn html_changed(&self, msg_id: MsgId, html: Option<String>) {
        self.update_render(msg_id, "html", |render, channel| {
            render.set_html(html, channel)
        });
    }

    pub fn decrypted(&self, msg_id: MsgId, text: Option<String>) {
        self.update_render(msg_id, "decrypted body", |render, channel| {
            render.set_decrypted(text, channel)
        });
    }

    fn update_render(
        &self,
        msg_id: MsgId,
        what: &str,
        f: impl FnOnce(&mut RenderState, &ContentChannel),
    ) {
        let button = self.selections.apply_if_displayed(msg_id, |sel| {
            let mut render = sel.render();
            let before = render.show_image_button();
            f(&mut *render, &self.channel);
            let after = render.show_image_button();
            (before != after).then_some(after)
        });
        match button {
            None => info!(self.context, "Ignoring {what} of {msg_id}, it is not displayed."),
            Some(Some(visible)) => {
                self.context
                    .emit_event(EventType::ShowImagesChanged { msg_id, visible });
            }
            Some(None) => {}
        }
    }

    /// Reveals the images of the displayed HTML body.
    ///
    /// Returns false if there were no suppressed images.
    pub fn show_images(&self) -> bool {
        let Some(sel) = self.selections.current() else {
            return false;
        };
        let msg_id = sel.msg().id();
        let shown = self
            .selections
            .apply_if_current(sel.token(), |sel| sel.render().show_images(&self.channel))
            .unwrap_or_default();
        if shown {
            self.context.emit_event(EventType::ShowImagesChanged {
                msg_id,
                visible: false,
            });
        }
        shown
    }

    /// Whether the "show images" button is offered.
    pub fn show_image_button(&self) -> bool {
        self.selections
            .current()
            .is_some_and(|sel| {
                let render = sel.render();
                render.show_image_button()
            })
    }

    /// ID of the displayed message.
    pub fn current_msg_id(&self) -> Option<MsgId> {
        self.selections.current().map(|sel| sel.msg().id())
    }

    /// Participants of the displayed message.
    pub fn participants(&self) -> Vec<Arc<Participant>> {
        self.selections
            .current()
            .map(|sel| sel.msg().participants().to_vec())
            .unwrap_or_default()
    }

    /// Attachments of the displayed message.
    pub fn attachments(&self) -> Vec<Arc<Attachment>> {
        self.selections
            .current()
            .map(|sel| sel.msg().attachments().to_vec())
            .unwrap_or_default()
    }

    /// Current key status text.
    pub fn key_id(&self) -> String {
        self.status_line.get()
    }

    /// Looks up the key of `addr` for the key status text.
    pub async fn get_key_id(&self, addr: &str) -> Option<String> {
        self.resolver.resolve_one(addr).await
    }

    /// Invites a participant without a key to encrypted mail.
    pub async fn invite(&self, participant: &Participant) -> InviteOutcome {
        self.invitations.invite(participant).await
    }

    /// Saves an attachment to the download directory.
    pub async fn download(&self, attachment: &Arc<Attachment>) -> Option<PathBuf> {
        self.downloader.download(attachment).await
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Relaxed);
    }
}
