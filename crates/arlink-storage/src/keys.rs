//! Shared key generation for storage backends.
//!
//! Key format: `content/{tenant_id}/{filename}`. Every key carries the
//! tenant id so backends stay isolated per tenant.

use uuid::Uuid;

/// Generate a storage key for the given tenant and filename.
///
/// All backends must use this format for consistency; tenant prefix checks
/// rely on it.
pub fn generate_storage_key(tenant_id: Uuid, filename: &str) -> String {
    format!("content/{}/{}", tenant_id, filename)
}

/// The prefix all of a tenant's keys live under.
pub fn tenant_prefix(tenant_id: Uuid) -> String {
    format!("content/{}/", tenant_id)
}
