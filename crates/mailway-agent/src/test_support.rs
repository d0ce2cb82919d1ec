//! Fakes shared by the unit tests of this crate.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use mailway_core::test_utils::test_verifier;
use mailway_core::{ConfigStore, CredentialStore};

use crate::authorizer::Authorizer;
use crate::control::ControlApi;
use crate::error::AuthError;
use crate::spool::{Envelope, Resubmit, SpoolError};

/// One scripted answer of the fake control service.
#[derive(Debug, Clone)]
pub enum Reply {
    Token(String),
    Pending,
    Malformed,
}

#[derive(Debug, Default)]
struct Script {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicU32,
    watched: Mutex<Option<PathBuf>>,
    persisted: Mutex<Vec<Option<String>>>,
}

/// Control service answering from a script, then `Pending` forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedControl {
    script: Arc<Script>,
}

impl ScriptedControl {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let control = Self::default();
        control
            .script
            .replies
            .lock()
            .unwrap()
            .extend(replies);
        control
    }

    pub fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Record the credential stored in the config file at `path` each time
    /// a request comes in.
    pub fn watch_config(&self, path: impl Into<PathBuf>) {
        *self.script.watched.lock().unwrap() = Some(path.into());
    }

    /// Credential found on disk at each request, in call order.
    pub fn persisted(&self) -> Vec<Option<String>> {
        self.script.persisted.lock().unwrap().clone()
    }
}

impl ControlApi for ScriptedControl {
    async fn fetch_credential(&self, _server_id: &str) -> Result<String, AuthError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(path) = self.script.watched.lock().unwrap().as_ref() {
            let stored = ConfigStore::load(path).unwrap().snapshot().server_jwt;
            self.script
                .persisted
                .lock()
                .unwrap()
                .push((!stored.is_empty()).then_some(stored));
        }
        let reply = self.script.replies.lock().unwrap().pop_front();
        match reply.unwrap_or(Reply::Pending) {
            Reply::Token(raw) => Ok(raw),
            Reply::Pending => Ok(String::new()),
            Reply::Malformed => Err(AuthError::Protocol("scripted malformed reply".into())),
        }
    }
}

/// Authorizer over a fresh config in `dir`, trusting the test key.
pub fn test_authorizer(dir: &Path, control: ScriptedControl) -> Authorizer<ScriptedControl> {
    let config = ConfigStore::load(dir.join("conf.toml")).unwrap();
    Authorizer::new(control, config, test_verifier(), CredentialStore::new())
}

/// Resubmitter recording every envelope it is handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingResubmitter {
    sent: Arc<Mutex<Vec<Envelope>>>,
    refuse: bool,
}

impl RecordingResubmitter {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }
}

impl Resubmit for RecordingResubmitter {
    async fn resubmit(&self, envelope: &Envelope, _data: &[u8]) -> Result<(), SpoolError> {
        if self.refuse {
            return Err(SpoolError::Resubmit("relay refused the message".into()));
        }
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
