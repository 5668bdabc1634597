// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Cache fingerprints.
//!
//! A fingerprint is a stable sha-256 over `{tenant_id, query_name,
//! parameters, dependency_version}` in canonical JSON form. The rendered key
//! leads with the query name so a view refresh can invalidate every
//! dependent entry across tenants with one prefix delete; the tenant
//! segment follows for tenant-scoped invalidation.

use crate::tenant::TenantId;
use serde_json::json;
use sha2::{Digest, Sha256};

/// A computed cache key: `{query}:{tenant}:{hex-digest-prefix}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Compute the fingerprint for a query execution.
///
/// `dependency_version` should change whenever an upstream view refresh
/// invalidates derived results, so stale entries miss naturally.
pub fn fingerprint(
    tenant: &TenantId,
    query_name: &str,
    parameters: &serde_json::Value,
    dependency_version: &str,
) -> Fingerprint {
    let canonical = json!({
        "tenant_id": tenant.as_str(),
        "query_name": query_name,
        "parameters": parameters,
        "dependency_version": dependency_version,
    });
    // serde_json::Value serialization is deterministic for a given value
    // (map keys are sorted), which is what makes the hash stable.
    let rendered = canonical.to_string();
    let digest = Sha256::digest(rendered.as_bytes());
    let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
    Fingerprint(format!("{}:{}:{}", query_name, tenant.as_str(), hex))
}

/// Prefix matching every fingerprint of a query, across all tenants.
pub fn fingerprint_prefix(query_name: &str) -> String {
    format!("{query_name}:")
}

/// Prefix matching a single tenant's fingerprints of a query.
pub fn tenant_fingerprint_prefix(query_name: &str, tenant: &TenantId) -> String {
    format!("{}:{}:", query_name, tenant.as_str())
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
