//! # Rendering message bodies in an isolated viewport.
//!
//! The body is painted by a renderer living in a separate, less trusted
//! execution context. The only way to reach it is a one-way stream of
//! [`RenderMessage`]s; there is no reply and no delivery confirmation.
//!
//! Remote images in HTML are suppressed by default, so merely opening a
//! message does not tell the sender it was read. The user can reveal them
//! for the HTML on screen; a different HTML body starts suppressed again.

use async_channel::{self as channel, Receiver, Sender};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Message sent to the renderer.
///
/// Serialized with serde this is exactly the wire format the renderer
/// accepts: `{"text": ...}` or `{"html": ..., "removeImages": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderMessage {
    /// HTML body, optionally with images stripped by the renderer.
    Html {
        html: String,
        #[serde(rename = "removeImages")]
        remove_images: bool,
    },

    /// Plain-text body. `None` clears the viewport.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl RenderMessage {
    /// Serializes the message for posting across the isolation boundary.
    pub fn to_json(&self) -> String {
        // Serializing plain strings and booleans cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Sending half of the channel to the renderer.
#[derive(Debug, Clone)]
pub struct ContentChannel {
    sender: Sender<RenderMessage>,
}

impl ContentChannel {
    /// Creates the channel, the receiver belongs to the renderer side.
    pub fn new() -> (Self, Receiver<RenderMessage>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }

    /// Posts a message. Fire-and-forget: a renderer that went away is not
    /// noticed and nothing is retried.
    pub(crate) fn post(&self, msg: RenderMessage) {
        self.sender.try_send(msg).ok();
    }
}

/// Matches `<img ... src="...">` with any attribute order, any case.
static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+\bsrc=['"][^'">]+['"]"#).unwrap());

/// Checks if the HTML references any image.
pub fn contains_images(html: &str) -> bool {
    IMG_SRC.is_match(html)
}

/// Where the displayed message is in the rendering protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Nothing rendered yet.
    Empty,

    /// Plain text is displayed.
    TextOnly,

    /// The message has an HTML body that is not rendered yet,
    /// text updates are not forwarded.
    AwaitingHtml,

    /// HTML is displayed, with or without images.
    HtmlRendered { images_shown: bool },
}

/// Per-message rendering state.
///
/// Every update is deduplicated: setting the same value twice
/// does not send anything to the renderer again.
#[derive(Debug)]
pub struct RenderState {
    raw_body: Option<String>,
    raw_html: Option<String>,
    contains_images: bool,
    images_revealed: bool,
    encrypted: bool,
    decrypted: bool,
    phase: RenderPhase,
}

impl RenderState {
    pub(crate) fn new(
        raw_body: Option<String>,
        raw_html: Option<String>,
        encrypted: bool,
        decrypted: bool,
    ) -> Self {
        Self {
            raw_body,
            raw_html,
            contains_images: false,
            images_revealed: false,
            encrypted,
            decrypted: encrypted && decrypted,
            phase: RenderPhase::Empty,
        }
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn contains_images(&self) -> bool {
        self.contains_images
    }

    pub fn images_revealed(&self) -> bool {
        self.images_revealed
    }

    /// Whether the "show images" button should be offered.
    pub fn show_image_button(&self) -> bool {
        self.phase
            == RenderPhase::HtmlRendered {
                images_shown: false,
            }
    }

    fn is_locked(&self) -> bool {
        self.encrypted && !self.decrypted
    }

    fn has_html(&self) -> bool {
        self.raw_html.as_deref().is_some_and(|html| !html.is_empty())
    }

    /// Renders whatever is there when the message is first displayed.
    ///
    /// A locked message clears the viewport so the previous message
    /// does not stay visible.
    pub(crate) fn refresh(&mut self, channel: &ContentChannel) {
        if self.is_locked() && !self.has_html() {
            channel.post(RenderMessage::Text { text: None });
        }
        self.display_text(channel);
        self.display_html(channel);
    }

    /// The text body changed.
    pub(crate) fn set_body(&mut self, body: Option<String>, channel: &ContentChannel) {
        if self.raw_body == body {
            return;
        }
        self.raw_body = body;
        self.display_text(channel);
    }

    /// The HTML body changed.
    pub(crate) fn set_html(&mut self, html: Option<String>, channel: &ContentChannel) {
        if self.raw_html == html {
            return;
        }
        self.raw_html = html;
        // A reveal covers the images the user has seen, not new ones.
        self.images_revealed = false;
        self.display_html(channel);
    }

    /// Decryption finished, possibly with the decrypted text body.
    pub(crate) fn set_decrypted(&mut self, body: Option<String>, channel: &ContentChannel) {
        if !self.encrypted || self.decrypted {
            self.set_body(body, channel);
            return;
        }
        self.decrypted = true;
        if body.is_some() {
            self.raw_body = body;
        }
        self.display_text(channel);
    }

    fn display_text(&mut self, channel: &ContentChannel) {
        if matches!(self.phase, RenderPhase::HtmlRendered { .. }) {
            return;
        }
        if self.has_html() {
            self.phase = RenderPhase::AwaitingHtml;
            return;
        }
        if self.is_locked() {
            return;
        }

        channel.post(RenderMessage::Text {
            text: self.raw_body.clone(),
        });
        self.phase = if self.raw_body.is_some() {
            RenderPhase::TextOnly
        } else {
            RenderPhase::Empty
        };
    }

    fn display_html(&mut self, channel: &ContentChannel) {
        let Some(html) = self.raw_html.clone().filter(|html| !html.is_empty()) else {
            return;
        };

        self.contains_images = contains_images(&html);
        self.images_revealed = self.images_revealed && self.contains_images;
        let remove_images = self.contains_images && !self.images_revealed;

        channel.post(RenderMessage::Html {
            html,
            remove_images,
        });
        self.phase = RenderPhase::HtmlRendered {
            images_shown: !remove_images,
        };
    }

    /// Reveals suppressed images, re-sending the same HTML.
    ///
    /// Returns false if there is nothing to reveal.
    pub(crate) fn show_images(&mut self, channel: &ContentChannel) -> bool {
        if !self.show_image_button() {
            return false;
        }
        let Some(html) = self.raw_html.clone() else {
            return false;
        };
        channel.post(RenderMessage::Html {
            html,
            remove_images: false,
        });
        self.images_revealed = true;
        self.phase = RenderPhase::HtmlRendered { images_shown: true };
        true
    }
}
