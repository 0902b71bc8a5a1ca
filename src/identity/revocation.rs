//! Token revocation (logout, account withdrawal).
//!
//! Entries are keyed by jti and expire on their own once the revoked token would have
//! expired anyway. The two operations fail in opposite directions when the backing
//! store is unreachable: `revoke` logs and returns, `is_revoked` answers `true`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::storage::KvStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationEntry {
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage seam for revocation entries. Implementations must hide entries past their TTL.
pub trait RevocationBackend: Send + Sync {
    fn insert(&self, entry: &RevocationEntry, ttl: Duration) -> Result<(), StoreError>;
    /// Atomically record `entry` unless a live entry for the same jti exists.
    /// Returns `true` when this call created it.
    fn insert_if_absent(&self, entry: &RevocationEntry, ttl: Duration) -> Result<bool, StoreError>;
    fn get(&self, jti: &str) -> Result<Option<RevocationEntry>, StoreError>;
    /// Physically drop expired entries; returns how many were removed.
    fn sweep(&self) -> Result<usize, StoreError>;
}

const KEY_PREFIX: &str = "revoked:";

/// In-process backend on top of the TTL key/value store.
#[derive(Clone)]
pub struct KvRevocationBackend {
    kv: KvStore<i64>,
}

impl KvRevocationBackend {
    pub fn new() -> Self { Self { kv: KvStore::new("revocations") } }
    pub fn len(&self) -> usize { self.kv.len() }
}

impl Default for KvRevocationBackend {
    fn default() -> Self { Self::new() }
}

impl RevocationBackend for KvRevocationBackend {
    fn insert(&self, entry: &RevocationEntry, ttl: Duration) -> Result<(), StoreError> {
        self.kv.set(format!("{}{}", KEY_PREFIX, entry.jti), entry.expires_at.timestamp(), Some(ttl));
        Ok(())
    }

    fn insert_if_absent(&self, entry: &RevocationEntry, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.kv.set_if_absent(format!("{}{}", KEY_PREFIX, entry.jti), entry.expires_at.timestamp(), Some(ttl)))
    }

    fn get(&self, jti: &str) -> Result<Option<RevocationEntry>, StoreError> {
        Ok(self.kv.get(&format!("{}{}", KEY_PREFIX, jti)).map(|exp| RevocationEntry {
            jti: jti.to_string(),
            expires_at: DateTime::<Utc>::from_timestamp(exp, 0).unwrap_or_else(Utc::now),
        }))
    }

    fn sweep(&self) -> Result<usize, StoreError> { Ok(self.kv.sweep()) }
}

fn entry_for(jti: &str, ttl_secs: u64) -> Option<RevocationEntry> {
    let secs = i64::try_from(ttl_secs).ok()?;
    let expires_at = Utc::now().checked_add_signed(chrono::Duration::try_seconds(secs)?)?;
    Some(RevocationEntry { jti: jti.to_string(), expires_at })
}

#[derive(Clone)]
pub struct RevocationStore {
    backend: Arc<dyn RevocationBackend>,
}

impl RevocationStore {
    pub fn new(backend: Arc<dyn RevocationBackend>) -> Self { Self { backend } }

    pub fn in_memory() -> Self { Self::new(Arc::new(KvRevocationBackend::new())) }

    /// Best-effort revoke. A zero TTL means the token is already dead and nothing is stored.
    /// Backend failures are logged and swallowed.
    pub fn revoke(&self, jti: &str, ttl_secs: u64) {
        if ttl_secs == 0 {
            debug!(target: "practicum::revocation", jti, "skip revoke: token already expired");
            return;
        }
        let Some(entry) = entry_for(jti, ttl_secs) else {
            warn!(target: "practicum::revocation", jti, ttl_secs, "revoke not recorded: ttl out of range");
            return;
        };
        match self.backend.insert(&entry, Duration::from_secs(ttl_secs)) {
            Ok(()) => debug!(target: "practicum::revocation", jti, ttl_secs, "token revoked"),
            Err(e) => warn!(target: "practicum::revocation", jti, "revoke not recorded: {}", e),
        }
    }

    /// Revoke `jti` only if nobody has yet. Returns `true` for the single caller that
    /// recorded the entry; a repeat, an out-of-range TTL or a backend failure all return `false`.
    /// Used to make refresh-token rotation single-use.
    pub fn claim(&self, jti: &str, ttl_secs: u64) -> bool {
        let ttl_secs = ttl_secs.max(1);
        let Some(entry) = entry_for(jti, ttl_secs) else {
            warn!(target: "practicum::revocation", jti, ttl_secs, "claim refused: ttl out of range");
            return false;
        };
        match self.backend.insert_if_absent(&entry, Duration::from_secs(ttl_secs)) {
            Ok(true) => {
                debug!(target: "practicum::revocation", jti, ttl_secs, "token claimed");
                true
            }
            Ok(false) => {
                debug!(target: "practicum::revocation", jti, "claim lost: already revoked");
                false
            }
            Err(e) => {
                error!(target: "practicum::revocation", jti, "claim failed, treating as revoked: {}", e);
                false
            }
        }
    }

    /// Fail-closed: an unreachable backend reports every token as revoked.
    pub fn is_revoked(&self, jti: &str) -> bool {
        match self.backend.get(jti) {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                error!(target: "practicum::revocation", jti, "revocation check failed, treating as revoked: {}", e);
                true
            }
        }
    }

    pub fn sweep(&self) -> usize {
        match self.backend.sweep() {
            Ok(n) => n,
            Err(e) => {
                warn!(target: "practicum::revocation", "sweep failed: {}", e);
                0
            }
        }
    }
}
