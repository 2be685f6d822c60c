//! Ceremony-scoped options store
//!
//! One pending ceremony per session key. Saving overwrites; loading
//! consumes, so a challenge can be presented at most once no matter how
//! the verification turns out. Entries expire after the configured TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::webauthn::types::{
    PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions,
};

/// The options of whichever ceremony is pending for a session.
#[derive(Clone, Debug)]
pub enum CeremonyOptions {
    Creation(PublicKeyCredentialCreationOptions),
    Request(PublicKeyCredentialRequestOptions),
}

/// Single-use storage for pending ceremony options.
pub trait ChallengeStore: Send + Sync {
    /// Save the pending options for a session, replacing any previous entry.
    fn save(&self, session_key: &str, options: CeremonyOptions);

    /// Atomically remove and return the pending options. Two concurrent
    /// calls for the same session cannot both observe a value.
    fn load_and_consume(&self, session_key: &str) -> Option<CeremonyOptions>;
}

/// Mutex-backed store with lazy expiry.
pub struct InMemoryChallengeStore {
    entries: Mutex<HashMap<String, (CeremonyOptions, Instant)>>,
    ttl: Duration,
}

impl InMemoryChallengeStore {
    /// Default time-to-live for a pending ceremony.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for InMemoryChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn save(&self, session_key: &str, options: CeremonyOptions) {
        let mut entries = self.entries.lock().expect("challenge store poisoned");
        entries.retain(|_, (_, saved_at)| saved_at.elapsed() < self.ttl);
        entries.insert(session_key.to_string(), (options, Instant::now()));
    }

    fn load_and_consume(&self, session_key: &str) -> Option<CeremonyOptions> {
        let mut entries = self.entries.lock().expect("challenge store poisoned");
        let (options, saved_at) = entries.remove(session_key)?;
        if saved_at.elapsed() >= self.ttl {
            return None;
        }
        Some(options)
    }
}
