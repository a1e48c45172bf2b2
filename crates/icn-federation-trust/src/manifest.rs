use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Role of a federation member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationMemberRole {
    pub role: String,
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_power: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_veto: Option<bool>,
}

impl FederationMemberRole {
    pub fn can_veto(&self) -> bool {
        self.can_veto.unwrap_or(false)
    }
}

/// Quorum policy shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum QuorumPolicyType {
    /// Counted approvals against member count
    Majority,
    /// Accumulated member weight against total weight
    Weighted,
}

impl FromStr for QuorumPolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "majority" => Ok(QuorumPolicyType::Majority),
            "weighted" => Ok(QuorumPolicyType::Weighted),
            other => Err(format!("Unknown quorum policy type: {}", other)),
        }
    }
}

impl TryFrom<String> for QuorumPolicyType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for QuorumPolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumPolicyType::Majority => write!(f, "Majority"),
            QuorumPolicyType::Weighted => write!(f, "Weighted"),
        }
    }
}

/// Quorum rules declared by a federation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumConfig {
    pub policy_type: QuorumPolicyType,
    #[serde(default)]
    pub min_participants: u32,
    #[serde(default)]
    pub min_approvals: u32,
    /// Percentage 0-100; when absent a strict majority is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_percentage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Read-only snapshot of a federation's membership and policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationManifest {
    pub federation_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Members keyed by DID
    pub members: BTreeMap<String, FederationMemberRole>,
    pub quorum_rules: QuorumConfig,
    pub version: u32,
    pub created: DateTime<Utc>,
}

impl FederationManifest {
    pub fn member(&self, did: &str) -> Option<&FederationMemberRole> {
        self.members.get(did)
    }

    pub fn member_count(&self) -> u64 {
        self.members.len() as u64
    }

    /// Sum of all member weights
    pub fn total_weight(&self) -> u64 {
        self.members.values().map(|m| u64::from(m.weight)).sum()
    }
}

/// Supplier of federation manifests (network fetch, wallet store, fixtures)
pub trait ManifestSource {
    /// Current manifest for a federation, if known
    fn get_manifest(&self, federation_id: &str) -> Option<Arc<FederationManifest>>;
}

/// In-memory manifest store keyed by `(federation_id, version)`.
///
/// Stored manifests are immutable: re-inserting an existing version is
/// rejected rather than overwriting it.
#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    manifests: BTreeMap<String, BTreeMap<u32, Arc<FederationManifest>>>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest version. Returns false if that version is already known.
    pub fn insert(&mut self, manifest: FederationManifest) -> bool {
        let versions = self.manifests.entry(manifest.federation_id.clone()).or_default();
        if versions.contains_key(&manifest.version) {
            warn!(
                "Manifest {} version {} already registered; keeping the stored snapshot",
                manifest.federation_id, manifest.version
            );
            return false;
        }
        versions.insert(manifest.version, Arc::new(manifest));
        true
    }

    pub fn with_manifest(mut self, manifest: FederationManifest) -> Self {
        self.insert(manifest);
        self
    }

    /// Highest registered version for a federation
    pub fn latest(&self, federation_id: &str) -> Option<Arc<FederationManifest>> {
        self.manifests
            .get(federation_id)?
            .values()
            .next_back()
            .cloned()
    }

    pub fn get_version(&self, federation_id: &str, version: u32) -> Option<Arc<FederationManifest>> {
        self.manifests.get(federation_id)?.get(&version).cloned()
    }

    pub fn federation_ids(&self) -> impl Iterator<Item = &str> {
        self.manifests.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

impl ManifestSource for ManifestRegistry {
    fn get_manifest(&self, federation_id: &str) -> Option<Arc<FederationManifest>> {
        self.latest(federation_id)
    }
}
