//! Listen key lifecycle for user-scoped channels.
//!
//! A listen key is a short-lived credential issued over REST and passed in
//! the stream URL. The manager obtains one (reusing a persisted key when
//! the server still accepts it), refreshes it ahead of expiry, and
//! replaces the socket whenever the key changes or the server rejects it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::connection::{ConnectionManager, ConnectionState};
use super::error::WsError;

/// How long before expiry a key is refreshed.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Returns how long to wait before refreshing a key valid for `expires_in`.
#[must_use]
pub fn refresh_delay(expires_in: Duration) -> Duration {
    expires_in.saturating_sub(REFRESH_MARGIN)
}

/// A listen key as returned by the issue and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKeyGrant {
    /// The key. Refresh responses may omit it.
    #[serde(default, alias = "listen_key", alias = "key")]
    pub listen_key: String,

    /// Validity in seconds.
    #[serde(alias = "expires_in")]
    pub expires_in: u64,
}

/// A listen key with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKey {
    /// The key.
    pub key: String,

    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

impl ListenKey {
    /// Builds a key from a grant received at `now`.
    #[must_use]
    pub fn from_grant(grant: &ListenKeyGrant, now: DateTime<Utc>) -> Self {
        let secs = i64::try_from(grant.expires_in).unwrap_or(i64::MAX);
        Self {
            key: grant.listen_key.clone(),
            expires_at: now + chrono::Duration::seconds(secs.min(i64::from(u32::MAX))),
        }
    }

    /// Returns the remaining validity at `now`.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true if the key is still usable at `now`, leaving room for a
    /// refresh.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) > REFRESH_MARGIN
    }
}

/// REST operations on listen keys.
#[async_trait]
pub trait ListenKeyApi: Send + Sync {
    /// Issues a new key.
    async fn issue(&self) -> Result<ListenKeyGrant, WsError>;

    /// Extends a key.
    async fn refresh(&self, key: &str) -> Result<ListenKeyGrant, WsError>;

    /// Returns true if the server still accepts a key.
    async fn validate(&self, key: &str) -> Result<bool, WsError>;
}

/// Persistence for the current key across restarts.
pub trait ListenKeyStore: Send + Sync {
    /// Loads the stored key.
    fn load(&self) -> Option<ListenKey>;

    /// Stores a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be written.
    fn save(&self, key: &ListenKey) -> Result<(), WsError>;

    /// Forgets the stored key.
    fn clear(&self);
}

/// Stores the key as a JSON file.
#[derive(Debug, Clone)]
pub struct FileListenKeyStore {
    path: PathBuf,
}

impl FileListenKeyStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ListenKeyStore for FileListenKeyStore {
    fn load(&self) -> Option<ListenKey> {
        let text = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable listen key file");
                None
            }
        }
    }

    fn save(&self, key: &ListenKey) -> Result<(), WsError> {
        let json = serde_json::to_string(key).map_err(|e| WsError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WsError::ListenKey(e.to_string()))?;
        }
        fs::write(&self.path, json).map_err(|e| WsError::ListenKey(e.to_string()))
    }

    fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove listen key file");
            }
        }
    }
}

/// Keeps the key in memory only.
#[derive(Debug, Default)]
pub struct MemoryListenKeyStore {
    key: Mutex<Option<ListenKey>>,
}

impl MemoryListenKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListenKeyStore for MemoryListenKeyStore {
    fn load(&self) -> Option<ListenKey> {
        self.key.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn save(&self, key: &ListenKey) -> Result<(), WsError> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(())
    }

    fn clear(&self) {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// The connection side of the key lifecycle.
#[async_trait]
pub trait ListenKeyConsumer: Send + Sync {
    /// Uses `key` for the connection, replacing the socket if one is
    /// active.
    fn install_listen_key(&self, key: &str);

    /// Waits until the server rejects the current key.
    async fn key_rejected(&self);
}

#[async_trait]
impl ListenKeyConsumer for ConnectionManager {
    fn install_listen_key(&self, key: &str) {
        self.set_listen_key(Some(key.to_string()));
        if self.status().state != ConnectionState::Closed {
            self.reconnect_now();
        }
    }

    async fn key_rejected(&self) {
        self.auth_rejected().await;
    }
}

/// Obtains, refreshes and re-issues the listen key.
pub struct ListenKeyManager {
    api: Arc<dyn ListenKeyApi>,
    store: Arc<dyn ListenKeyStore>,
    consumer: Arc<dyn ListenKeyConsumer>,
    retry: Backoff,
    current: watch::Sender<Option<ListenKey>>,
}

impl std::fmt::Debug for ListenKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenKeyManager")
            .field("has_key", &self.current.borrow().is_some())
            .finish()
    }
}

impl ListenKeyManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        api: Arc<dyn ListenKeyApi>,
        store: Arc<dyn ListenKeyStore>,
        consumer: Arc<dyn ListenKeyConsumer>,
    ) -> Self {
        let (current, _rx) = watch::channel(None);
        Self {
            api,
            store,
            consumer,
            retry: Backoff::new(
                Duration::from_secs(1),
                Duration::from_secs(60),
                Duration::from_millis(300),
            ),
            current,
        }
    }

    /// Sets the retry policy for failed REST calls.
    #[must_use]
    pub fn with_retry(mut self, retry: Backoff) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the key in use.
    #[must_use]
    pub fn current(&self) -> Option<ListenKey> {
        self.current.borrow().clone()
    }

    /// Returns a receiver for key changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<ListenKey>> {
        self.current.subscribe()
    }

    /// Returns a usable key and how long until it should be refreshed.
    ///
    /// A stored key is reused if it is not close to expiry and the server
    /// still accepts it; otherwise a new key is issued and stored.
    ///
    /// # Errors
    ///
    /// Returns an error if a new key cannot be issued.
    pub async fn obtain(&self) -> Result<(ListenKey, Duration), WsError> {
        let now = Utc::now();
        if let Some(stored) = self.store.load().filter(|k| k.is_fresh(now)) {
            match self.api.validate(&stored.key).await {
                Ok(true) => {
                    debug!("reusing stored listen key");
                    let delay = refresh_delay(stored.remaining(now));
                    return Ok((stored, delay));
                }
                Ok(false) => debug!("stored listen key no longer valid"),
                Err(e) => warn!(error = %e, "could not validate stored listen key"),
            }
        }
        self.store.clear();
        self.issue().await
    }

    async fn issue(&self) -> Result<(ListenKey, Duration), WsError> {
        let grant = self.api.issue().await?;
        if grant.listen_key.is_empty() {
            return Err(WsError::ListenKey("server issued an empty key".to_string()));
        }
        info!(expires_in = grant.expires_in, "listen key issued");
        Ok(self.accept(&grant))
    }

    fn accept(&self, grant: &ListenKeyGrant) -> (ListenKey, Duration) {
        let key = ListenKey::from_grant(grant, Utc::now());
        if let Err(e) = self.store.save(&key) {
            warn!(error = %e, "failed to persist listen key");
        }
        (key, refresh_delay(Duration::from_secs(grant.expires_in)))
    }

    fn install(&self, key: &ListenKey) {
        self.consumer.install_listen_key(&key.key);
        self.current.send_replace(Some(key.clone()));
    }

    async fn obtain_with_retry(&self, fresh: bool) -> (ListenKey, Duration) {
        let mut attempt = 0u32;
        loop {
            let res = if fresh {
                self.issue().await
            } else {
                self.obtain().await
            };
            match res {
                Ok(obtained) => return obtained,
                Err(e) => {
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, error = %e, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "listen key unavailable, retrying");
                    attempt = attempt.saturating_add(1);
                    sleep(delay).await;
                }
            }
        }
    }

    /// Runs the lifecycle until the task is dropped or aborted.
    pub async fn run(&self) {
        let (mut key, mut delay) = self.obtain_with_retry(false).await;
        self.install(&key);

        loop {
            tokio::select! {
                _ = sleep(delay) => {
                    match self.api.refresh(&key.key).await {
                        Ok(mut grant) => {
                            if grant.listen_key.is_empty() {
                                grant.listen_key = key.key.clone();
                            }
                            info!(expires_in = grant.expires_in, "listen key refreshed");
                            (key, delay) = self.accept(&grant);
                        }
                        Err(e) => {
                            warn!(error = %e, "listen key refresh failed, issuing a new one");
                            self.store.clear();
                            (key, delay) = self.obtain_with_retry(true).await;
                        }
                    }
                }
                _ = self.consumer.key_rejected() => {
                    warn!("listen key rejected, issuing a new one");
                    self.store.clear();
                    (key, delay) = self.obtain_with_retry(true).await;
                }
            }
            self.install(&key);
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}
