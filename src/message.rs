//! # Messages as shown in the read pane.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use parking_lot::Mutex;

use crate::context::Context;
use crate::log::LogExt;
use crate::participant::{Participant, Role};

/// Message ID, assigned by the host application.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MsgId(u32);

impl MsgId {
    /// Create a new [MsgId].
    pub fn new(id: u32) -> MsgId {
        MsgId(id)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg#{}", self.0)
    }
}

/// File attached to a message.
///
/// The content is fetched lazily and cached on the attachment once available.
pub struct Attachment {
    /// Position among the attachments of the message, starting at 0.
    part: usize,
    filename: String,
    mime_type: Option<String>,
    content: Mutex<Option<Arc<Vec<u8>>>>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("part", &self.part)
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("content_len", &self.content().map(|c| c.len()))
            .finish()
    }
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            part: 0,
            filename: filename.into(),
            mime_type,
            content: Mutex::new(None),
        }
    }

    /// Tells apart attachments of one message, even with equal filenames.
    pub fn part(&self) -> usize {
        self.part
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Returns the content if it was already fetched.
    pub fn content(&self) -> Option<Arc<Vec<u8>>> {
        self.content.lock().clone()
    }

    pub fn set_content(&self, content: Vec<u8>) -> Arc<Vec<u8>> {
        let content = Arc::new(content);
        *self.content.lock() = Some(Arc::clone(&content));
        content
    }
}

/// Message selected for display.
///
/// Participants and attachments are created fresh for every message and are
/// owned by it, nothing is shared between two displayed messages.
#[derive(Debug)]
pub struct DisplayedMessage {
    id: MsgId,
    folder: String,
    uid: u32,
    subject: Option<String>,
    participants: Vec<Arc<Participant>>,
    text: Option<String>,
    html: Option<String>,
    encrypted: bool,
    decrypted: bool,
    attachments: Vec<Arc<Attachment>>,
}

impl DisplayedMessage {
    /// Creates an empty message living in `folder` under the server `uid`.
    pub fn new(id: MsgId, folder: &str, uid: u32) -> Self {
        Self {
            id,
            folder: folder.to_string(),
            uid,
            subject: None,
            participants: Vec::new(),
            text: None,
            html: None,
            encrypted: false,
            decrypted: false,
            attachments: Vec::new(),
        }
    }

    /// Parses a raw RFC 5322 message.
    ///
    /// PGP/MIME encrypted messages are marked as encrypted and not decrypted,
    /// their body stays empty until [`crate::ViewEvent::Decrypted`] delivers it.
    /// Address headers that cannot be parsed and invalid addresses are skipped
    /// with a warning.
    pub fn from_bytes(
        context: &Context,
        id: MsgId,
        folder: &str,
        uid: u32,
        raw: &[u8],
    ) -> Result<Self> {
        let mail = mailparse::parse_mail(raw).context("cannot parse message")?;
        let mut msg = Self::new(id, folder, uid);
        msg.subject = mail.headers.get_first_value("Subject");

        for (role, name) in [
            (Role::From, "From"),
            (Role::To, "To"),
            (Role::Cc, "Cc"),
            (Role::Bcc, "Bcc"),
        ] {
            for header in mail.headers.get_all_headers(name) {
                let addrs = match mailparse::addrparse_header(header) {
                    Ok(addrs) => addrs,
                    Err(err) => {
                        warn!(context, "Skipping {name} header of {id}: {err}.");
                        continue;
                    }
                };
                for addr in addrs.iter() {
                    let infos = match addr {
                        MailAddr::Single(info) => std::slice::from_ref(info),
                        MailAddr::Group(group) => group.addrs.as_slice(),
                    };
                    for info in infos {
                        msg.add_participant(role, &info.addr, info.display_name.as_deref())
                            .log_err(context);
                    }
                }
            }
        }

        msg.collect_parts(&mail)?;
        Ok(msg)
    }

    /// Walks the MIME tree, taking the first text/plain and text/html part
    /// as body and everything with a filename as attachment.
    fn collect_parts(&mut self, mail: &ParsedMail<'_>) -> Result<()> {
        let mimetype = mail.ctype.mimetype.to_lowercase();
        if mimetype == "multipart/encrypted" {
            self.encrypted = true;
            return Ok(());
        }
        if mimetype.starts_with("multipart/") {
            for part in &mail.subparts {
                self.collect_parts(part)?;
            }
            return Ok(());
        }

        let disposition = mail.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| mail.ctype.params.get("name"))
            .cloned();
        if disposition.disposition == DispositionType::Attachment || filename.is_some() {
            let attachment = Attachment::new(
                filename.unwrap_or_else(|| "attachment".to_string()),
                Some(mimetype),
            );
            attachment.set_content(mail.get_body_raw()?);
            self.add_attachment(attachment);
            return Ok(());
        }

        match mimetype.as_str() {
            "text/plain" if self.text.is_none() => self.text = Some(mail.get_body()?),
            "text/html" if self.html.is_none() => self.html = Some(mail.get_body()?),
            _ => {}
        }
        Ok(())
    }

    pub fn id(&self) -> MsgId {
        self.id
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn set_subject(&mut self, subject: Option<String>) {
        self.subject = subject;
    }

    /// Adds a participant, the same address may appear under several roles.
    pub fn add_participant(
        &mut self,
        role: Role,
        addr: &str,
        display_name: Option<&str>,
    ) -> Result<Arc<Participant>> {
        let participant = Arc::new(Participant::new(role, addr, display_name)?);
        self.participants.push(Arc::clone(&participant));
        Ok(participant)
    }

    /// All participants in header order: from, to, cc, bcc.
    pub fn participants(&self) -> &[Arc<Participant>] {
        &self.participants
    }

    /// Participants with the given role.
    pub fn participants_by_role(&self, role: Role) -> impl Iterator<Item = &Arc<Participant>> {
        self.participants.iter().filter(move |p| p.role() == role)
    }

    /// Checks if this exact participant object belongs to the message.
    pub fn holds(&self, participant: &Arc<Participant>) -> bool {
        self.participants.iter().any(|p| Arc::ptr_eq(p, participant))
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: Option<String>) {
        self.text = text;
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn set_html(&mut self, html: Option<String>) {
        self.html = html;
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_decrypted(&self) -> bool {
        self.decrypted
    }

    /// Sets the encryption state, `decrypted` is only meaningful for encrypted messages.
    pub fn set_encrypted(&mut self, encrypted: bool, decrypted: bool) {
        self.encrypted = encrypted;
        self.decrypted = encrypted && decrypted;
    }

    pub fn attachments(&self) -> &[Arc<Attachment>] {
        &self.attachments
    }

    /// Adds an attachment, numbering it after the existing ones.
    pub fn add_attachment(&mut self, mut attachment: Attachment) -> Arc<Attachment> {
        attachment.part = self.attachments.len();
        let attachment = Arc::new(attachment);
        self.attachments.push(Arc::clone(&attachment));
        attachment
    }

    /// Checks if this exact attachment object belongs to the message.
    pub fn holds_attachment(&self, attachment: &Arc<Attachment>) -> bool {
        self.attachments.iter().any(|a| Arc::ptr_eq(a, attachment))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::participant::SecureStatus;
    use crate::test_utils::TestContext;
    use crate::EventType;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_from_bytes_simple() -> Result<()> {
        let t = TestContext::new().await;
        let raw = b"From: Bob <bob@example.net>\n\
                    To: alice@example.org, Claire <claire@example.com>\n\
                    Cc: Bob@Example.net\n\
                    Subject: hello\n\
                    Content-Type: text/plain; charset=utf-8\n\
                    \n\
                    hi there\n";
        let msg = DisplayedMessage::from_bytes(&t, MsgId::new(7), "INBOX", 42, raw)?;
        assert_eq!(msg.id(), MsgId::new(7));
        assert_eq!(msg.folder(), "INBOX");
        assert_eq!(msg.uid(), 42);
        assert_eq!(msg.subject(), Some("hello"));
        assert_eq!(msg.text().map(str::trim), Some("hi there"));
        assert_eq!(msg.html(), None);
        assert!(!msg.is_encrypted());

        let addrs: Vec<(Role, &str)> = msg
            .participants()
            .iter()
            .map(|p| (p.role(), p.addr()))
            .collect();
        assert_eq!(
            addrs,
            vec![
                (Role::From, "bob@example.net"),
                (Role::To, "alice@example.org"),
                (Role::To, "claire@example.com"),
                (Role::Cc, "bob@example.net"),
            ]
        );
        assert_eq!(msg.participants()[0].display_name(), Some("Bob"));
        assert!(msg
            .participants()
            .iter()
            .all(|p| p.status() == SecureStatus::Unknown));

        // Same address twice gives two independent participants.
        assert!(!Arc::ptr_eq(&msg.participants()[0], &msg.participants()[3]));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_from_bytes_alternative_with_attachment() -> Result<()> {
        let t = TestContext::new().await;
        let raw = b"From: bob@example.net\n\
                    To: alice@example.org\n\
                    Content-Type: multipart/mixed; boundary=\"outer\"\n\
                    \n\
                    --outer\n\
                    Content-Type: multipart/alternative; boundary=\"inner\"\n\
                    \n\
                    --inner\n\
                    Content-Type: text/plain\n\
                    \n\
                    plain body\n\
                    --inner\n\
                    Content-Type: text/html\n\
                    \n\
                    <p>html <img src=\"https://tracker.example/p.png\"></p>\n\
                    --inner--\n\
                    --outer\n\
                    Content-Type: application/pdf; name=\"report.pdf\"\n\
                    Content-Disposition: attachment; filename=\"report.pdf\"\n\
                    Content-Transfer-Encoding: base64\n\
                    \n\
                    JVBERi0=\n\
                    --outer--\n";
        let msg = DisplayedMessage::from_bytes(&t, MsgId::new(1), "INBOX", 1, raw)?;
        assert_eq!(msg.text().map(str::trim), Some("plain body"));
        assert!(msg.html().unwrap().contains("<img src="));
        assert_eq!(msg.attachments().len(), 1);

        let attachment = &msg.attachments()[0];
        assert_eq!(attachment.part(), 0);
        assert_eq!(attachment.filename(), "report.pdf");
        assert_eq!(attachment.mime_type(), Some("application/pdf"));
        assert_eq!(
            attachment.content().as_deref().map(Vec::as_slice),
            Some(&b"%PDF-"[..])
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_from_bytes_encrypted() -> Result<()> {
        let t = TestContext::new().await;
        let raw = b"From: bob@example.net\n\
                    To: alice@example.org\n\
                    Content-Type: multipart/encrypted; protocol=\"application/pgp-encrypted\"; boundary=\"b\"\n\
                    \n\
                    --b\n\
                    Content-Type: application/pgp-encrypted\n\
                    \n\
                    Version: 1\n\
                    --b\n\
                    Content-Type: application/octet-stream\n\
                    \n\
                    -----BEGIN PGP MESSAGE-----\n\
                    -----END PGP MESSAGE-----\n\
                    --b--\n";
        let msg = DisplayedMessage::from_bytes(&t, MsgId::new(2), "INBOX", 2, raw)?;
        assert!(msg.is_encrypted());
        assert!(!msg.is_decrypted());
        assert_eq!(msg.text(), None);
        assert!(msg.attachments().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_group_addresses() -> Result<()> {
        let t = TestContext::new().await;
        let raw = b"From: bob@example.net\n\
                    To: friends: alice@example.org, claire@example.com;\n\
                    \n\
                    hi\n";
        let msg = DisplayedMessage::from_bytes(&t, MsgId::new(3), "INBOX", 3, raw)?;
        let to: Vec<&str> = msg
            .participants_by_role(Role::To)
            .map(|p| p.addr())
            .collect();
        assert_eq!(to, vec!["alice@example.org", "claire@example.com"]);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bad_addresses_are_skipped() -> Result<()> {
        let t = TestContext::new().await;
        let raw = b"From: MAILER-DAEMON\n\
                    To: alice@example.org\n\
                    Cc: undisclosed: bob@;\n\
                    Subject: Undelivered Mail Returned to Sender\n\
                    \n\
                    bounce\n";
        let msg = DisplayedMessage::from_bytes(&t, MsgId::new(4), "INBOX", 4, raw)?;
        let addrs: Vec<(Role, &str)> = msg
            .participants()
            .iter()
            .map(|p| (p.role(), p.addr()))
            .collect();
        assert_eq!(addrs, vec![(Role::To, "alice@example.org")]);
        assert_eq!(msg.text().map(str::trim), Some("bounce"));

        let event = t
            .evtracker
            .get_matching(|evt| matches!(evt, EventType::Warning(_)))
            .await;
        let EventType::Warning(text) = event else {
            unreachable!()
        };
        assert!(text.contains("Skipping From header of Msg#4"));
        Ok(())
    }

    #[test]
    fn test_attachments_are_numbered() {
        let mut msg = DisplayedMessage::new(MsgId::new(1), "INBOX", 1);
        let first = msg.add_attachment(Attachment::new("image.png", None));
        let second = msg.add_attachment(Attachment::new("image.png", None));
        assert_eq!(first.part(), 0);
        assert_eq!(second.part(), 1);
    }

    #[test]
    fn test_set_encrypted() {
        let mut msg = DisplayedMessage::new(MsgId::new(1), "INBOX", 1);
        msg.set_encrypted(false, true);
        assert!(!msg.is_decrypted());
        msg.set_encrypted(true, false);
        assert!(msg.is_encrypted() && !msg.is_decrypted());
    }
}
