//! # Participants of a displayed message.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use strum_macros::{AsRefStr, Display};

/// Header a participant was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    From,
    To,
    Cc,
    Bcc,
}

/// Whether a participant can be reached end-to-end encrypted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
pub enum SecureStatus {
    /// No lookup finished yet, or the last lookup failed.
    #[default]
    Unknown,

    /// The key directory has a public key for the address.
    Secure,

    /// The key directory knows no key for the address.
    Insecure,
}

/// One address with a role on the displayed message.
///
/// Participants are shared as `Arc<Participant>`. A key lookup holds on to the
/// participant it was started for, so the result can only ever land on that
/// very object, never on a participant of another message with the same address.
pub struct Participant {
    addr: String,
    display_name: Option<String>,
    role: Role,
    status: Mutex<SecureStatus>,
    resolving: AtomicBool,
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("addr", &self.addr)
            .field("role", &self.role)
            .field("status", &self.status())
            .finish()
    }
}

impl Participant {
    /// Creates a participant with an unknown status.
    ///
    /// The address is normalized, invalid addresses are rejected.
    pub fn new(role: Role, addr: &str, display_name: Option<&str>) -> Result<Self> {
        let addr = addr_normalize(addr);
        if !may_be_valid_addr(&addr) {
            bail!("invalid address {addr:?}");
        }
        Ok(Self {
            addr,
            display_name: display_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string()),
            role,
            status: Mutex::new(SecureStatus::Unknown),
            resolving: AtomicBool::new(false),
        })
    }

    /// Returns the normalized address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> SecureStatus {
        *self.status.lock()
    }

    pub fn is_secure(&self) -> bool {
        self.status() == SecureStatus::Secure
    }

    pub(crate) fn set_status(&self, status: SecureStatus) {
        *self.status.lock() = status;
    }

    /// Marks a lookup as in flight until the returned guard is dropped.
    ///
    /// Returns `None` if there already is one, the caller must not start another.
    /// A new lookup starts from [`SecureStatus::Unknown`].
    pub(crate) fn begin_resolution(self: &Arc<Self>) -> Option<Resolving> {
        if self.resolving.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.set_status(SecureStatus::Unknown);
        Some(Resolving(Arc::clone(self)))
    }

    pub(crate) fn is_resolving(&self) -> bool {
        self.resolving.load(Ordering::Acquire)
    }
}

/// Lookup in flight for a participant.
///
/// Dropping it ends the lookup, also when the task running it panics.
#[derive(Debug)]
pub(crate) struct Resolving(Arc<Participant>);

impl Resolving {
    pub(crate) fn participant(&self) -> &Arc<Participant> {
        &self.0
    }
}

impl Drop for Resolving {
    fn drop(&mut self) {
        self.0.resolving.store(false, Ordering::Release);
    }
}

/// Returns address lowercased,
/// with whitespace trimmed and `mailto:` prefix removed.
pub fn addr_normalize(addr: &str) -> String {
    let norm = addr.trim().to_lowercase();
    match norm.strip_prefix("mailto:") {
        Some(stripped) => stripped.to_string(),
        None => norm,
    }
}

/// Returns false if addr is an invalid address, otherwise true.
///
/// This is a dead-simple check for `local@domain`, nothing more.
pub fn may_be_valid_addr(addr: &str) -> bool {
    if addr
        .chars()
        .any(|c| c.is_whitespace() || c == '<' || c == '>')
    {
        return false;
    }
    match addr.rsplit_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.ends_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_may_be_valid_addr() {
        assert_eq!(may_be_valid_addr(""), false);
        assert_eq!(may_be_valid_addr("user@domain.tld"), true);
        assert_eq!(may_be_valid_addr("uuu"), false);
        assert_eq!(may_be_valid_addr("u@d"), true);
        assert_eq!(may_be_valid_addr("u@d."), false);
        assert_eq!(may_be_valid_addr("@d.tt"), false);
        assert_eq!(may_be_valid_addr("<da@d.tt"), false);
        assert_eq!(may_be_valid_addr("ask dkl@dd.tt"), false);
    }

    #[test]
    fn test_normalize_addr() {
        assert_eq!(addr_normalize("mailto:john@doe.com"), "john@doe.com");
        assert_eq!(addr_normalize("  hello@world.com   "), "hello@world.com");
        assert_eq!(addr_normalize("John@Doe.com"), "john@doe.com");
    }

    #[test]
    fn test_new_participant() -> Result<()> {
        let p = Participant::new(Role::Cc, " Bob@Example.NET ", Some("  "))?;
        assert_eq!(p.addr(), "bob@example.net");
        assert_eq!(p.display_name(), None);
        assert_eq!(p.role(), Role::Cc);
        assert_eq!(p.status(), SecureStatus::Unknown);
        assert_eq!(p.role().to_string(), "cc");

        assert!(Participant::new(Role::To, "not an address", None).is_err());
        Ok(())
    }

    #[test]
    fn test_one_resolution_at_a_time() -> Result<()> {
        let p = Arc::new(Participant::new(Role::From, "bob@example.net", None)?);
        let resolving = p.begin_resolution().unwrap();
        assert!(p.begin_resolution().is_none());
        assert!(p.is_resolving());
        p.set_status(SecureStatus::Insecure);
        drop(resolving);
        assert!(!p.is_resolving());

        // A new pass starts over from Unknown.
        assert!(p.begin_resolution().is_some());
        assert_eq!(p.status(), SecureStatus::Unknown);
        Ok(())
    }
}
