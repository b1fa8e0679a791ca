//! Per-tenant storage quota accounting.
//!
//! A reservation must be taken before any bytes are written; it is committed
//! once the write has durably succeeded and released automatically on drop
//! otherwise, so every failure path (including task cancellation) returns the
//! provisional hold. The consumed-bytes counter is only ever mutated through
//! the compare-and-swap loops below; no other code path writes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

/// Reservation denied: committing it would push consumed past allowed.
#[derive(Debug, thiserror::Error)]
#[error("quota exceeded for tenant {tenant_id}: requested {requested} bytes, {available} bytes available")]
pub struct QuotaExceeded {
    pub tenant_id: Uuid,
    pub requested: u64,
    pub available: u64,
}

#[derive(Debug)]
struct TenantQuota {
    allowed_bytes: AtomicU64,
    consumed_bytes: AtomicU64,
}

/// Tracks consumed vs. allowed bytes per tenant.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone, Default)]
pub struct QuotaTracker {
    tenants: Arc<RwLock<HashMap<Uuid, Arc<TenantQuota>>>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant or update its allowance. Consumed bytes are kept.
    pub fn set_limit(&self, tenant_id: Uuid, allowed_bytes: u64) {
        let mut tenants = self.tenants.write().expect("quota map poisoned");
        match tenants.get(&tenant_id) {
            Some(quota) => quota.allowed_bytes.store(allowed_bytes, Ordering::SeqCst),
            None => {
                tenants.insert(
                    tenant_id,
                    Arc::new(TenantQuota {
                        allowed_bytes: AtomicU64::new(allowed_bytes),
                        consumed_bytes: AtomicU64::new(0),
                    }),
                );
            }
        }
    }

    fn quota_for(&self, tenant_id: Uuid) -> Option<Arc<TenantQuota>> {
        self.tenants
            .read()
            .expect("quota map poisoned")
            .get(&tenant_id)
            .cloned()
    }

    /// Bytes currently consumed (committed plus outstanding reservations).
    pub fn consumed(&self, tenant_id: Uuid) -> u64 {
        self.quota_for(tenant_id)
            .map(|q| q.consumed_bytes.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Bytes allowed for the tenant, or 0 if the tenant is unknown.
    pub fn allowed(&self, tenant_id: Uuid) -> u64 {
        self.quota_for(tenant_id)
            .map(|q| q.allowed_bytes.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Take a provisional hold of `bytes` against the tenant's allowance.
    ///
    /// The hold counts against consumed immediately (so concurrent reservers
    /// cannot jointly overshoot) and is returned on drop unless committed.
    /// The update is a CAS loop, never a read-then-write.
    pub fn reserve(&self, tenant_id: Uuid, bytes: u64) -> Result<Reservation, QuotaExceeded> {
        let quota = self.quota_for(tenant_id).ok_or(QuotaExceeded {
            tenant_id,
            requested: bytes,
            available: 0,
        })?;

        let allowed = quota.allowed_bytes.load(Ordering::SeqCst);
        let result = quota
            .consumed_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |consumed| {
                let next = consumed.checked_add(bytes)?;
                (next <= allowed).then_some(next)
            });

        match result {
            Ok(_) => {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    reserved_bytes = bytes,
                    "Quota reservation taken"
                );
                Ok(Reservation {
                    quota,
                    tenant_id,
                    bytes,
                    settled: false,
                })
            }
            Err(consumed) => Err(QuotaExceeded {
                tenant_id,
                requested: bytes,
                available: allowed.saturating_sub(consumed),
            }),
        }
    }

    /// Return bytes freed by a delete to the tenant's allowance.
    pub fn release_bytes(&self, tenant_id: Uuid, bytes: u64) {
        if let Some(quota) = self.quota_for(tenant_id) {
            let _ = quota
                .consumed_bytes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |consumed| {
                    Some(consumed.saturating_sub(bytes))
                });
        }
    }
}

/// A provisional hold against a tenant's allowance.
///
/// Commit once the corresponding write has succeeded; dropping an uncommitted
/// reservation releases the hold.
#[derive(Debug)]
pub struct Reservation {
    quota: Arc<TenantQuota>,
    tenant_id: Uuid,
    bytes: u64,
    settled: bool,
}

impl Reservation {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Make the hold permanent. The bytes stay counted as consumed.
    pub fn commit(mut self) {
        self.settled = true;
        tracing::debug!(
            tenant_id = %self.tenant_id,
            committed_bytes = self.bytes,
            "Quota reservation committed"
        );
    }

    /// Explicitly release the hold. Equivalent to dropping the reservation.
    pub fn release(self) {}
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self
                .quota
                .consumed_bytes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |consumed| {
                    Some(consumed.saturating_sub(self.bytes))
                });
            tracing::debug!(
                tenant_id = %self.tenant_id,
                released_bytes = self.bytes,
                "Quota reservation released"
            );
        }
    }
}
