//! Cryptographic key module
//!
//! Keys are only ever looked at here, never created or managed:
//! the view needs to know whether a key exists and what its fingerprint is.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use pgp::composed::{Deserializable, SignedPublicKey};
use pgp::types::PublicKeyTrait;

use crate::participant::addr_normalize;

/// Public key of a contact as stored by a [`KeyDirectory`],
/// either binary or ASCII-armored OpenPGP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRecord {
    pub public_key: Vec<u8>,
}

impl PublicKeyRecord {
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }

    /// A record without key material counts as "no key".
    pub fn has_key(&self) -> bool {
        !self.public_key.is_empty()
    }
}

/// Source of contact public keys.
pub trait KeyDirectory: fmt::Debug + Send + Sync {
    /// Looks up the public key for an address.
    ///
    /// Returns `Ok(None)` if the directory knows no key for the address.
    fn lookup<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Option<PublicKeyRecord>>>;
}

/// OpenPGP fingerprint, upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Creates a fingerprint from raw bytes.
    pub fn new(bytes: &[u8]) -> Self {
        Self(hex::encode_upper(bytes))
    }

    /// Hex representation without spaces.
    pub fn hex(&self) -> &str {
        &self.0
    }

    /// The part of the fingerprint shown to the user as key id:
    /// everything after the first 32 hex digits.
    ///
    /// Fingerprints shorter than that have no tail.
    pub fn tail(&self) -> &str {
        self.0.get(32..).unwrap_or_default()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<pgp::types::Fingerprint> for Fingerprint {
    fn from(fingerprint: pgp::types::Fingerprint) -> Fingerprint {
        Self::new(fingerprint.as_bytes())
    }
}

/// Computes fingerprints of public keys returned by the [`KeyDirectory`].
pub trait FingerprintFormatter: fmt::Debug + Send + Sync {
    fn fingerprint_of(&self, public_key: &[u8]) -> Result<Fingerprint>;
}

/// [`FingerprintFormatter`] parsing keys with rPGP.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgpFingerprinter;

impl FingerprintFormatter for PgpFingerprinter {
    fn fingerprint_of(&self, public_key: &[u8]) -> Result<Fingerprint> {
        let key = parse_public_key(public_key)?;
        Ok(key.fingerprint().into())
    }
}

/// Parses a public key, accepting both binary and ASCII-armored form.
fn parse_public_key(bytes: &[u8]) -> Result<SignedPublicKey> {
    let armored = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .and_then(|start| bytes.get(start..))
        .is_some_and(|data| data.starts_with(b"-----BEGIN"));
    if armored {
        let (key, _headers) = SignedPublicKey::from_armor_single(Cursor::new(bytes))
            .context("cannot parse armored public key")?;
        Ok(key)
    } else {
        SignedPublicKey::from_bytes(Cursor::new(bytes)).context("cannot parse public key")
    }
}

/// [`KeyDirectory`] backed by a directory of `<address>.asc` files.
#[derive(Debug, Clone)]
pub struct FsKeyDirectory {
    dir: PathBuf,
}

impl FsKeyDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, addr: &str) -> PathBuf {
        let name = sanitize_filename::sanitize(addr_normalize(addr));
        self.dir.join(format!("{name}.asc"))
    }
}

impl KeyDirectory for FsKeyDirectory {
    fn lookup<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Option<PublicKeyRecord>>> {
        Box::pin(async move {
            let path = self.key_path(addr);
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(PublicKeyRecord::new(bytes))),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => {
                    Err(err).with_context(|| format!("cannot read key file {}", path.display()))
                }
            }
        })
    }
}
