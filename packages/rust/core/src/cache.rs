//! TTL cache for per-keyword provider results.
//!
//! Entries are keyed on everything that changes what a provider would return
//! for a keyword. Cache failures never fail a run: they are logged and read as
//! a miss.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use keywatch_guardrails::normalize;
use keywatch_shared::{EvidenceItem, RegionScope, Result};
use keywatch_storage::{CacheWrite, Storage};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Inputs that identify one cached provider result.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    pub provider: &'a str,
    /// Keyword surface form; canonicalized when hashed.
    pub keyword: &'a str,
    pub recency_months: u32,
    pub scope: &'a RegionScope,
    /// Raw per-keyword source-location rule, when one was supplied.
    pub source_override: Option<&'a str>,
}

impl CacheKey<'_> {
    /// Canonical term stored next to the payload.
    pub fn term(&self) -> String {
        normalize(self.keyword)
    }

    /// SHA-256 hex digest of the key fields.
    pub fn digest(&self) -> String {
        let term = self.term();
        let recency = self.recency_months.to_string();
        let mut hasher = Sha256::new();
        for part in [
            self.provider,
            term.as_str(),
            recency.as_str(),
            self.scope.mode.as_str(),
            self.scope.country.as_deref().unwrap_or(""),
            self.source_override.unwrap_or(""),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"|");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Evidence cache over optional libSQL storage.
#[derive(Clone)]
pub struct EvidenceCache {
    storage: Option<Arc<Storage>>,
    ttl: Duration,
    bypass: bool,
}

impl EvidenceCache {
    /// A cache that never hits and never writes.
    pub fn disabled() -> Self {
        Self {
            storage: None,
            ttl: Duration::ZERO,
            bypass: true,
        }
    }

    pub fn new(storage: Arc<Storage>, ttl_days: u32, bypass: bool) -> Self {
        Self {
            storage: Some(storage),
            ttl: Duration::from_secs(u64::from(ttl_days) * SECS_PER_DAY),
            bypass,
        }
    }

    /// Open the cache database at `path`. An unopenable database disables the
    /// cache for this run instead of failing it.
    pub async fn open(path: Option<&Path>, ttl_days: u32, bypass: bool) -> Self {
        let Some(path) = path else {
            debug!("no cache path configured, evidence cache disabled");
            return Self::disabled();
        };

        match Storage::open(path).await {
            Ok(storage) => Self::new(Arc::new(storage), ttl_days, bypass),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "evidence cache unavailable, continuing without it");
                Self::disabled()
            }
        }
    }

    /// Whether reads and writes can reach a store.
    pub fn is_active(&self) -> bool {
        self.storage.is_some() && !self.bypass
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached items for `key`, or `None` on a miss, bypass or error.
    pub async fn get(&self, key: &CacheKey<'_>) -> Option<Vec<EvidenceItem>> {
        if self.bypass {
            return None;
        }
        let storage = self.storage.as_ref()?;

        let cached = match storage.get_cached_evidence(&key.digest()).await {
            Ok(Some(cached)) => cached,
            Ok(None) => return None,
            Err(e) => {
                warn!(keyword = %key.keyword, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<Vec<EvidenceItem>>(&cached.payload_json) {
            Ok(items) => {
                debug!(keyword = %key.keyword, items = items.len(), "cache hit");
                Some(items)
            }
            Err(e) => {
                warn!(keyword = %key.keyword, error = %e, "corrupt cache payload, treating as miss");
                None
            }
        }
    }

    /// Store `items` under `key`. Failures are logged and swallowed.
    pub async fn put(&self, key: &CacheKey<'_>, items: &[EvidenceItem]) {
        if self.bypass {
            return;
        }
        let Some(storage) = self.storage.as_ref() else {
            return;
        };

        let payload = match serde_json::to_string(items) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(keyword = %key.keyword, error = %e, "failed to encode cache payload");
                return;
            }
        };

        let digest = key.digest();
        let term = key.term();
        let write = CacheWrite {
            key: &digest,
            provider: key.provider,
            term: &term,
            payload_json: &payload,
            ttl_secs: i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX),
        };

        if let Err(e) = storage.put_cached_evidence(write).await {
            warn!(keyword = %key.keyword, error = %e, "cache write failed");
        }
    }

    /// Delete expired rows. A disabled cache purges nothing.
    pub async fn purge_expired(&self) -> Result<u64> {
        match self.storage.as_ref() {
            Some(storage) => storage.purge_expired().await,
            None => Ok(0),
        }
    }
}
