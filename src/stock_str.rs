//! Module to work with translatable stock strings.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use strum::EnumProperty as EnumPropertyTrait;
use strum_macros::EnumProperty;
use tokio::sync::RwLock;

use crate::context::Context;

/// Storage for string translations.
#[derive(Debug, Clone)]
pub struct StockStrings {
    /// Map from stock string ID to the translation.
    translated_stockstrings: Arc<RwLock<HashMap<usize, String>>>,
}

/// Stock strings
///
/// These identify the string to return in the `stock_str` helper functions.
/// Strings shown in the key status line must keep their wording,
/// UIs match on the untranslated fallbacks.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumProperty)]
#[repr(u32)]
pub enum StockMessage {
    #[strum(props(fallback = "No key found."))]
    NoKeyFound = 1,

    #[strum(props(fallback = "Searching..."))]
    Searching = 2,

    #[strum(props(fallback = "User has no key. Click to invite."))]
    NoKeyClickToInvite = 3,

    #[strum(props(fallback = "PGP key: %1$s"))]
    PgpKeyId = 4,

    #[strum(props(fallback = "Sending invitation..."))]
    SendingInvitation = 5,

    #[strum(props(fallback = "Invitation to a private conversation"))]
    InvitationSubject = 6,

    #[strum(props(
        fallback = "Hi,\n\nI use encrypted email and would like to write to you privately. \
                    Set up a key for your address and I will be able to reach you \
                    end-to-end encrypted from now on.\n\nThis message was sent automatically."
    ))]
    InvitationBody = 7,
}

impl StockMessage {
    /// Default untranslated strings for stock messages.
    ///
    /// These could be used in logging calls, so no logging here.
    fn fallback(self) -> &'static str {
        self.get_str("fallback").unwrap_or_default()
    }
}

impl Default for StockStrings {
    fn default() -> Self {
        StockStrings::new()
    }
}

impl StockStrings {
    /// Creates a new translated string storage.
    pub fn new() -> Self {
        Self {
            translated_stockstrings: Arc::new(RwLock::new(Default::default())),
        }
    }

    async fn translated(&self, id: StockMessage) -> String {
        self.translated_stockstrings
            .read()
            .await
            .get(&(id as usize))
            .map(AsRef::as_ref)
            .unwrap_or_else(|| id.fallback())
            .to_string()
    }

    async fn set_stock_translation(&self, id: StockMessage, stockstring: String) -> Result<()> {
        if stockstring.contains("%1") && !id.fallback().contains("%1") {
            bail!(
                "translation {} contains invalid %1 placeholder, default is {}",
                stockstring,
                id.fallback()
            );
        }
        if !stockstring.contains("%1") && id.fallback().contains("%1") {
            bail!(
                "translation {} lacks the %1 placeholder, default is {}",
                stockstring,
                id.fallback()
            );
        }
        self.translated_stockstrings
            .write()
            .await
            .insert(id as usize, stockstring);
        Ok(())
    }
}

async fn translated(context: &Context, id: StockMessage) -> String {
    context.translated_stockstrings.translated(id).await
}

/// Substitutes the first replacement value if one is present.
fn replace1(s: &str, replacement: &str) -> String {
    s.replacen("%1$s", replacement, 1)
        .replacen("%1$d", replacement, 1)
        .replacen("%1$@", replacement, 1)
}

/// Stock string: `No key found.`.
pub(crate) async fn no_key_found(context: &Context) -> String {
    translated(context, StockMessage::NoKeyFound).await
}

/// Stock string: `Searching...`.
pub(crate) async fn searching(context: &Context) -> String {
    translated(context, StockMessage::Searching).await
}

/// Stock string: `User has no key. Click to invite.`.
pub(crate) async fn no_key_click_to_invite(context: &Context) -> String {
    translated(context, StockMessage::NoKeyClickToInvite).await
}

/// Stock string: `PGP key: %1$s`.
pub(crate) async fn pgp_key_id(context: &Context, key_id: &str) -> String {
    replace1(&translated(context, StockMessage::PgpKeyId).await, key_id)
}

/// Stock string: `Sending invitation...`.
pub(crate) async fn sending_invitation(context: &Context) -> String {
    translated(context, StockMessage::SendingInvitation).await
}

/// Subject of the message sent to invited contacts.
pub(crate) async fn invitation_subject(context: &Context) -> String {
    translated(context, StockMessage::InvitationSubject).await
}

/// Body of the message sent to invited contacts.
pub(crate) async fn invitation_body(context: &Context) -> String {
    translated(context, StockMessage::InvitationBody).await
}

impl Context {
    /// Set the stock string for the [StockMessage].
    pub async fn set_stock_translation(&self, id: StockMessage, stockstring: String) -> Result<()> {
        self.translated_stockstrings
            .set_stock_translation(id, stockstring)
            .await?;
        Ok(())
    }
}
