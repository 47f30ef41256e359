//! Challenge store and device registry contracts
//!
//! Both are owned by the caller. The engine puts and atomically takes pending
//! challenges and proposes device records and counter updates; where they are
//! persisted is up to the implementation. In-memory implementations are
//! provided for tests and the demo server.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Duration, Utc};

use super::types::{PendingChallenge, RegisteredDevice};

/// What a pending challenge is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Enroll,
    Sign,
}

impl Purpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Enroll => "enroll",
            Purpose::Sign => "sign",
        }
    }
}

/// Storage for pending challenges, at most one per `(user, purpose)`
///
/// # Implementation Notes
///
/// `take_and_clear` must be atomic (a mutex, `GETDEL`, or compare-and-delete)
/// so that two concurrent completions for the same challenge cannot both
/// observe it.
pub trait ChallengeStore: Send + Sync {
    /// Store `challenge`, replacing any pending challenge for the same key
    fn put(&self, user: &str, purpose: Purpose, challenge: PendingChallenge);

    /// Remove and return the pending challenge, if any
    fn take_and_clear(&self, user: &str, purpose: Purpose) -> Option<PendingChallenge>;
}

/// Per-user collection of enrolled devices
pub trait DeviceRegistry: Send + Sync {
    /// All devices enrolled by `user`
    fn list(&self, user: &str) -> Vec<RegisteredDevice>;

    /// Whether `user` has ever been seen by the registry
    fn contains_user(&self, user: &str) -> bool;

    /// Record `user` without devices (an enrollment was started)
    fn ensure_user(&self, user: &str);

    /// Add a newly registered device
    fn append(&self, user: &str, device: RegisteredDevice);

    /// Persist a new signature counter and mark the device as used.
    /// Returns `false` if no such device exists.
    fn update_counter(&self, user: &str, key_handle: &[u8], counter: u32) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave these maps half-updated
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `Mutex`-guarded in-memory challenge store
#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    challenges: Mutex<HashMap<(String, Purpose), PendingChallenge>>,
}

impl MemoryChallengeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn put(&self, user: &str, purpose: Purpose, challenge: PendingChallenge) {
        lock(&self.challenges).insert((user.to_string(), purpose), challenge);
    }

    fn take_and_clear(&self, user: &str, purpose: Purpose) -> Option<PendingChallenge> {
        lock(&self.challenges).remove(&(user.to_string(), purpose))
    }
}

/// Wraps a challenge store and discards challenges older than `timeout`
#[derive(Debug)]
pub struct ExpiringChallengeStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: ChallengeStore> ExpiringChallengeStore<S> {
    #[must_use]
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<S: ChallengeStore> ChallengeStore for ExpiringChallengeStore<S> {
    fn put(&self, user: &str, purpose: Purpose, challenge: PendingChallenge) {
        self.inner.put(user, purpose, challenge);
    }

    fn take_and_clear(&self, user: &str, purpose: Purpose) -> Option<PendingChallenge> {
        // Always taken so an expired challenge is cleared as well
        let challenge = self.inner.take_and_clear(user, purpose)?;
        if Utc::now() - challenge.created_at > self.timeout {
            return None;
        }
        Some(challenge)
    }
}

/// Challenge store selected from settings: optionally expiring, in memory
pub enum ConfiguredChallengeStore {
    Plain(MemoryChallengeStore),
    Expiring(ExpiringChallengeStore<MemoryChallengeStore>),
}

impl ConfiguredChallengeStore {
    /// In-memory store; `timeout_seconds == 0` disables expiry
    #[must_use]
    pub fn in_memory(timeout_seconds: u64) -> Self {
        if timeout_seconds == 0 {
            return Self::Plain(MemoryChallengeStore::new());
        }
        let seconds = i64::try_from(timeout_seconds).unwrap_or(i64::MAX);
        let timeout = Duration::try_seconds(seconds).unwrap_or(Duration::MAX);
        Self::Expiring(ExpiringChallengeStore::new(MemoryChallengeStore::new(), timeout))
    }
}

impl ChallengeStore for ConfiguredChallengeStore {
    fn put(&self, user: &str, purpose: Purpose, challenge: PendingChallenge) {
        match self {
            Self::Plain(store) => store.put(user, purpose, challenge),
            Self::Expiring(store) => store.put(user, purpose, challenge),
        }
    }

    fn take_and_clear(&self, user: &str, purpose: Purpose) -> Option<PendingChallenge> {
        match self {
            Self::Plain(store) => store.take_and_clear(user, purpose),
            Self::Expiring(store) => store.take_and_clear(user, purpose),
        }
    }
}

/// `Mutex`-guarded in-memory device registry
#[derive(Debug, Default)]
pub struct MemoryDeviceRegistry {
    users: Mutex<HashMap<String, Vec<RegisteredDevice>>>,
}

impl MemoryDeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for MemoryDeviceRegistry {
    fn list(&self, user: &str) -> Vec<RegisteredDevice> {
        lock(&self.users).get(user).cloned().unwrap_or_default()
    }

    fn contains_user(&self, user: &str) -> bool {
        lock(&self.users).contains_key(user)
    }

    fn ensure_user(&self, user: &str) {
        lock(&self.users).entry(user.to_string()).or_default();
    }

    fn append(&self, user: &str, device: RegisteredDevice) {
        lock(&self.users)
            .entry(user.to_string())
            .or_default()
            .push(device);
    }

    fn update_counter(&self, user: &str, key_handle: &[u8], counter: u32) -> bool {
        let mut users = lock(&self.users);
        let Some(device) = users
            .get_mut(user)
            .and_then(|devices| devices.iter_mut().find(|d| d.key_handle == key_handle))
        else {
            return false;
        };
        device.counter = counter;
        device.last_used = Some(Utc::now());
        true
    }
}
