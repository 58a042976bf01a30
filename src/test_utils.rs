//! Utilities to help writing tests.
//!
//! This module is only compiled for test runs.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{format_err, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};
use tokio::sync::Semaphore;

use crate::attachment::{AttachmentRequest, AttachmentStore};
use crate::config::Config;
use crate::context::Context;
use crate::error::{ErrorReporter, ViewError};
use crate::events::{EventEmitter, EventType};
use crate::invite::{BootstrapMessage, InvitationRequest, InvitationService, OutboundQueue};
use crate::key::{KeyDirectory, PublicKeyRecord};

/// Fingerprint of [`alice_public_key`].
pub(crate) const ALICE_FINGERPRINT: &str = "69E1C41E3895F7BAC1F9878B30A320D1A26CEC62";

/// ASCII-armored public key of alice@example.org.
pub(crate) fn alice_public_key() -> &'static [u8] {
    include_bytes!("../test-data/key/alice-public.asc")
}

/// How long [`EventTracker::get_matching`] and the `wait_for_calls` helpers wait.
const TIMEOUT: Duration = Duration::from_secs(10);

/// A Context, a temporary directory and a tracker for its events.
#[derive(Debug)]
pub(crate) struct TestContext {
    pub ctx: Context,
    pub dir: TempDir,
    pub evtracker: EventTracker,
}

impl TestContext {
    /// Creates a new unconfigured [TestContext].
    pub async fn new() -> Self {
        let ctx = Context::new();
        let evtracker = EventTracker::new(ctx.get_event_emitter());
        Self {
            ctx,
            dir: tempdir().unwrap(),
            evtracker,
        }
    }

    /// Creates a [TestContext] with alice@example.org as account address.
    pub async fn new_alice() -> Self {
        let t = Self::new().await;
        t.set_config(Config::ConfiguredAddr, Some("alice@example.org"))
            .await
            .unwrap();
        t
    }
}

impl Deref for TestContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

#[derive(Debug)]
pub(crate) struct EventTracker(EventEmitter);

impl EventTracker {
    pub fn new(emitter: EventEmitter) -> Self {
        Self(emitter)
    }

    /// Consumes emitted events returning the first matching one.
    ///
    /// If no matching event is emitted within 10 seconds, this will panic.
    pub async fn get_matching<F: Fn(&EventType) -> bool>(&self, event_matcher: F) -> EventType {
        tokio::time::timeout(TIMEOUT, async move {
            loop {
                let event = self.0.recv().await.unwrap();
                if event_matcher(&event.typ) {
                    return event.typ;
                }
            }
        })
        .await
        .expect("timeout waiting for event match")
    }
}

async fn wait_until(f: impl Fn() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for calls")
}

#[derive(Debug, Clone)]
enum KeyAnswer {
    Key(Vec<u8>),
    NoKey,
    EmptyKey,
    Failure(String),
    Panic,
}

/// [`KeyDirectory`] answering from a table.
///
/// Lookups of an address with a gate block until the gate gets a permit,
/// one permit per lookup. The answer is read after passing the gate.
#[derive(Debug, Default)]
pub(crate) struct ScriptedKeyDirectory {
    answers: Mutex<HashMap<String, KeyAnswer>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: AtomicUsize,
}

impl ScriptedKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn answer(&self, addr: &str, answer: KeyAnswer) {
        self.answers.lock().insert(addr.to_string(), answer);
    }

    pub fn set_key(&self, addr: &str, key: &[u8]) {
        self.answer(addr, KeyAnswer::Key(key.to_vec()));
    }

    pub fn set_no_key(&self, addr: &str) {
        self.answer(addr, KeyAnswer::NoKey);
    }

    pub fn set_empty_key(&self, addr: &str) {
        self.answer(addr, KeyAnswer::EmptyKey);
    }

    pub fn set_failure(&self, addr: &str, msg: &str) {
        self.answer(addr, KeyAnswer::Failure(msg.to_string()));
    }

    /// Makes lookups of `addr` panic, like a crashing backend.
    pub fn set_panic(&self, addr: &str) {
        self.answer(addr, KeyAnswer::Panic);
    }

    pub fn gate(&self, addr: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(addr.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, n: usize) {
        wait_until(|| self.calls() >= n).await
    }
}

impl KeyDirectory for ScriptedKeyDirectory {
    fn lookup<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Option<PublicKeyRecord>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().get(addr).cloned();
            if let Some(gate) = gate {
                gate.acquire().await?.forget();
            }
            let answer = self.answers.lock().get(addr).cloned();
            match answer {
                Some(KeyAnswer::Key(key)) => Ok(Some(PublicKeyRecord::new(key))),
                Some(KeyAnswer::EmptyKey) => Ok(Some(PublicKeyRecord::new(Vec::new()))),
                Some(KeyAnswer::NoKey) | None => Ok(None),
                Some(KeyAnswer::Failure(msg)) => Err(format_err!(msg)),
                Some(KeyAnswer::Panic) => panic!("key directory of {addr} crashed"),
            }
        })
    }
}

/// [`ErrorReporter`] keeping the full error chains of all reports.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, err: ViewError) {
        let err = anyhow::Error::new(err);
        self.reports.lock().push(format!("{err:#}"));
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingInvitationService {
    requests: Mutex<Vec<InvitationRequest>>,
    failure: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingInvitationService {
    pub fn requests(&self) -> Vec<InvitationRequest> {
        self.requests.lock().clone()
    }

    pub fn fail_with(&self, msg: &str) {
        *self.failure.lock() = Some(msg.to_string());
    }

    /// Makes every invitation wait for a permit of the returned gate.
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub async fn wait_for_calls(&self, n: usize) {
        wait_until(|| self.requests.lock().len() >= n).await
    }
}

impl InvitationService for RecordingInvitationService {
    fn invite<'a>(&'a self, request: &'a InvitationRequest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                gate.acquire().await?.forget();
            }
            let failure = self.failure.lock().clone();
            match failure {
                Some(msg) => Err(format_err!(msg)),
                None => Ok(()),
            }
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingOutbox {
    messages: Mutex<Vec<BootstrapMessage>>,
    failure: Mutex<Option<String>>,
}

impl RecordingOutbox {
    pub fn messages(&self) -> Vec<BootstrapMessage> {
        self.messages.lock().clone()
    }

    pub fn fail_with(&self, msg: &str) {
        *self.failure.lock() = Some(msg.to_string());
    }
}

impl OutboundQueue for RecordingOutbox {
    fn enqueue(&self, msg: BootstrapMessage) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let failure = self.failure.lock().clone();
            if let Some(msg) = failure {
                return Err(format_err!(msg));
            }
            self.messages.lock().push(msg);
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryAttachmentStore {
    files: Mutex<HashMap<(String, u32, usize), Vec<u8>>>,
    calls: AtomicUsize,
}

impl MemoryAttachmentStore {
    pub fn insert(&self, folder: &str, uid: u32, part: usize, content: &[u8]) {
        self.files
            .lock()
            .insert((folder.to_string(), uid, part), content.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AttachmentStore for MemoryAttachmentStore {
    fn fetch<'a>(&'a self, request: &'a AttachmentRequest) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = (request.folder.clone(), request.uid, request.part);
            self.files
                .lock()
                .get(&key)
                .cloned()
                .ok_or_else(|| format_err!("no such attachment"))
        })
    }
}
