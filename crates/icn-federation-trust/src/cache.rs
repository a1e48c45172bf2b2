/*!
# Validation Caching

Explicit memoisation around [`ValidationService`]. Nothing is recomputed
implicitly: callers decide when to ask again (typically on new-credential
arrival), and a changed credential set or manifest version simply misses.
*/

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::anchor::AnchorGrouping;
use crate::credential::{Credential, CredentialId};
use crate::error::TrustResult;
use crate::lineage::LineageGraph;
use crate::manifest::{FederationManifest, ManifestSource};
use crate::quorum::QuorumValidationResult;
use crate::service::{check_credential_set, resolve_manifest, ValidationService};

/// Default number of entries kept per cache
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Report results are keyed by `(credential_id, federation_id, manifest_version)`;
/// issued credentials are immutable under their id.
type ReportKey = (CredentialId, String, u32);

/// Statistics for cache hits/misses
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub insertions: usize,
}

/// [`ValidationService`] with LRU memoisation of each operation
pub struct CachedValidationService {
    service: ValidationService,
    reports: Mutex<LruCache<ReportKey, Arc<QuorumValidationResult>>>,
    lineages: Mutex<LruCache<String, Arc<LineageGraph>>>,
    groupings: Mutex<LruCache<String, Arc<AnchorGrouping>>>,
    stats: Mutex<CacheStats>,
}

impl Default for CachedValidationService {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl CachedValidationService {
    /// Create a cache holding up to `capacity` entries per operation
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            service: ValidationService::new(),
            reports: Mutex::new(LruCache::new(capacity)),
            lineages: Mutex::new(LruCache::new(capacity)),
            groupings: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn validate_report(
        &self,
        credential: &Credential,
        manifest: Option<&FederationManifest>,
    ) -> TrustResult<Arc<QuorumValidationResult>> {
        let Some(manifest) = manifest else {
            // Let the evaluator produce the error
            return self.service.validate_report(credential, None).map(Arc::new);
        };

        let key = (credential.id.clone(), manifest.federation_id.clone(), manifest.version);
        if let Some(hit) = lock(&self.reports).get(&key).cloned() {
            self.record(true);
            return Ok(hit);
        }
        self.record(false);

        let result = Arc::new(self.service.validate_report(credential, Some(manifest))?);
        lock(&self.reports).put(key, Arc::clone(&result));
        self.record_insert();
        Ok(result)
    }

    pub fn validate_report_from<S>(&self, credential: &Credential, source: &S) -> TrustResult<Arc<QuorumValidationResult>>
    where
        S: ManifestSource + ?Sized,
    {
        let manifest = resolve_manifest(credential, source)?;
        self.validate_report(credential, Some(manifest.as_ref()))
    }

    pub fn build_lineage(&self, credentials: &[Credential]) -> TrustResult<Arc<LineageGraph>> {
        check_credential_set(credentials)?;
        let fingerprint = credential_set_fingerprint(credentials)?;
        if let Some(hit) = lock(&self.lineages).get(&fingerprint).cloned() {
            self.record(true);
            return Ok(hit);
        }
        self.record(false);

        let graph = Arc::new(self.service.build_lineage(credentials)?);
        lock(&self.lineages).put(fingerprint, Arc::clone(&graph));
        self.record_insert();
        Ok(graph)
    }

    pub fn group_by_anchor(&self, credentials: &[Credential]) -> TrustResult<Arc<AnchorGrouping>> {
        check_credential_set(credentials)?;
        let fingerprint = credential_set_fingerprint(credentials)?;
        if let Some(hit) = lock(&self.groupings).get(&fingerprint).cloned() {
            self.record(true);
            return Ok(hit);
        }
        self.record(false);

        let grouping = Arc::new(self.service.group_by_anchor(credentials)?);
        lock(&self.groupings).put(fingerprint, Arc::clone(&grouping));
        self.record_insert();
        Ok(grouping)
    }

    /// Drop every memoised result
    pub fn clear(&self) {
        lock(&self.reports).clear();
        lock(&self.lineages).clear();
        lock(&self.groupings).clear();
        debug!("Cleared validation caches");
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    fn record(&self, hit: bool) {
        let mut stats = lock(&self.stats);
        if hit {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
    }

    fn record_insert(&self) {
        lock(&self.stats).insertions += 1;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SHA-256 over the serialized credentials, in input order.
///
/// Order is significant because duplicate ids collapse last-write-wins.
pub fn credential_set_fingerprint(credentials: &[Credential]) -> TrustResult<String> {
    let mut hasher = Sha256::new();
    for credential in credentials {
        let bytes = serde_json::to_vec(credential)?;
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialBuilder, CredentialKind};
    use crate::manifest::{FederationMemberRole, QuorumConfig, QuorumPolicyType};

    fn manifest(version: u32) -> FederationManifest {
        FederationManifest {
            federation_id: "fed:alpha".to_string(),
            name: "Alpha".to_string(),
            description: None,
            members: [(
                "did:icn:a".to_string(),
                FederationMemberRole {
                    role: "Admin".to_string(),
                    weight: 1,
                    voting_power: None,
                    can_veto: None,
                },
            )]
            .into_iter()
            .collect(),
            quorum_rules: QuorumConfig {
                policy_type: QuorumPolicyType::Majority,
                min_participants: 0,
                min_approvals: 1,
                threshold_percentage: None,
                timeout_seconds: None,
            },
            version,
            created: Default::default(),
        }
    }

    fn vote(id: &str, t: i64) -> Credential {
        CredentialBuilder::new(id, CredentialKind::Vote)
            .parent("proposal-1")
            .issued_at_secs(t)
            .build()
    }

    #[test]
    fn test_report_cache_keyed_by_manifest_version() {
        let cache = CachedValidationService::new(8);
        let credential = CredentialBuilder::new("report", CredentialKind::FederationReport)
            .federation("fed:alpha")
            .signed_by("did:icn:a")
            .build();

        let first = cache.validate_report(&credential, Some(&manifest(1))).unwrap();
        let second = cache.validate_report(&credential, Some(&manifest(1))).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let third = cache.validate_report(&credential, Some(&manifest(2))).unwrap();
        assert_eq!(third.manifest_version, 2);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 2,
                insertions: 2
            }
        );
    }

    #[test]
    fn test_missing_manifest_not_cached() {
        let cache = CachedValidationService::default();
        let credential = CredentialBuilder::new("report", CredentialKind::FederationReport)
            .federation("fed:alpha")
            .build();
        assert!(cache.validate_report(&credential, None).is_err());
        assert_eq!(cache.stats().insertions, 0);
    }

    #[test]
    fn test_fingerprint_tracks_set_contents() {
        let set = vec![vote("v1", 1), vote("v2", 2)];
        let reordered = vec![vote("v2", 2), vote("v1", 1)];
        let fingerprint = credential_set_fingerprint(&set).unwrap();

        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, credential_set_fingerprint(&set).unwrap());
        assert_ne!(fingerprint, credential_set_fingerprint(&reordered).unwrap());
        assert_ne!(fingerprint, credential_set_fingerprint(&set[..1]).unwrap());
    }

    #[test]
    fn test_lineage_and_grouping_memoised() {
        let cache = CachedValidationService::new(4);
        let set = vec![vote("v1", 1), vote("v2", 2)];

        let graph = cache.build_lineage(&set).unwrap();
        assert!(Arc::ptr_eq(&graph, &cache.build_lineage(&set).unwrap()));
        let grouping = cache.group_by_anchor(&set).unwrap();
        assert_eq!(grouping.unanchored, vec!["v1", "v2"]);

        cache.clear();
        assert!(!Arc::ptr_eq(&graph, &cache.build_lineage(&set).unwrap()));
    }
}
