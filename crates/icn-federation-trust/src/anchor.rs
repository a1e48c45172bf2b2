/*!
# Epoch Anchor Grouping

Partitions a credential set under the epoch anchors that commit to it. An
anchor is an `EpochAnchor` credential declaring both a DAG root hash and an
epoch id; every other credential is a member that joins the group of the anchor
whose root hash matches its own, or lands in the `unanchored` bucket.

An `EpochAnchor` missing either field is not an anchor and is placed like any
other member. Groups plus `unanchored` always partition the (deduplicated)
member credentials exactly.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::credential::{Credential, CredentialId};
use crate::lineage::LineageGraph;

/// Credentials committed under one epoch anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorGroup {
    pub anchor_id: CredentialId,
    pub dag_root_hash: String,
    pub epoch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_id: Option<String>,
    pub issuance_time: DateTime<Utc>,
    /// Members ordered by issuance time (ties broken by id)
    pub member_ids: Vec<CredentialId>,
}

/// Link between consecutive anchors of one federation's epoch sequence.
/// Distinct from lineage edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_id: Option<String>,
    pub from: CredentialId,
    pub to: CredentialId,
}

/// Non-fatal findings recorded during grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorDiagnostic {
    /// Anchor credential without a root hash or epoch id; placed as a member
    InvalidAnchor { anchor_id: CredentialId },
    /// Later anchor committing to an already claimed root hash
    DuplicateAnchorHash {
        anchor_id: CredentialId,
        kept_anchor_id: CredentialId,
        dag_root_hash: String,
    },
    /// Member declares a root hash no anchor commits to
    UnanchoredCredential { credential_id: CredentialId, dag_root_hash: String },
    /// Member grouped by hash but declaring a different epoch than its anchor
    EpochMismatch {
        credential_id: CredentialId,
        anchor_id: CredentialId,
        declared_epoch: String,
        anchor_epoch: String,
    },
    /// Member whose parent is committed in a later epoch of the same federation
    LineageOrderViolation { credential_id: CredentialId, parent_id: CredentialId },
    /// Several input credentials share an id; the last one was kept
    DuplicateCredential { id: CredentialId },
}

/// Result of grouping a credential set by epoch anchor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorGrouping {
    /// One group per valid anchor, ordered by federation then epoch sequence
    pub groups: Vec<AnchorGroup>,
    /// Members matching no anchor, ordered by issuance time
    pub unanchored: Vec<CredentialId>,
    pub sequences: Vec<SequenceEdge>,
    #[serde(default)]
    pub diagnostics: Vec<AnchorDiagnostic>,
}

impl AnchorGrouping {
    pub fn group(&self, anchor_id: &str) -> Option<&AnchorGroup> {
        self.groups.iter().find(|group| group.anchor_id == anchor_id)
    }

    /// The epoch anchor covering a credential, if any
    pub fn anchor_for(&self, credential_id: &str) -> Option<&AnchorGroup> {
        self.groups
            .iter()
            .find(|group| group.member_ids.iter().any(|id| id == credential_id))
    }

    /// Credential id → covering anchor id, for bulk lookups
    pub fn membership_index(&self) -> HashMap<&str, &str> {
        self.groups
            .iter()
            .flat_map(|group| {
                group
                    .member_ids
                    .iter()
                    .map(move |id| (id.as_str(), group.anchor_id.as_str()))
            })
            .collect()
    }

    /// Anchors of one federation in epoch order
    pub fn epoch_sequence(&self, federation_id: Option<&str>) -> Vec<&AnchorGroup> {
        self.groups
            .iter()
            .filter(|group| group.federation_id.as_deref() == federation_id)
            .collect()
    }

    /// Total number of member credentials placed in groups or `unanchored`
    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|g| g.member_ids.len()).sum::<usize>() + self.unanchored.len()
    }
}

fn chronological(a: &Credential, b: &Credential) -> std::cmp::Ordering {
    a.issuance_time
        .cmp(&b.issuance_time)
        .then_with(|| a.id.cmp(&b.id))
}

/// Group credentials under the epoch anchors whose root hash they declare
pub fn group_by_anchor(credentials: &[Credential]) -> AnchorGrouping {
    let mut diagnostics = Vec::new();
    let mut by_id: BTreeMap<&str, &Credential> = BTreeMap::new();
    let mut duplicates = BTreeSet::new();
    for credential in credentials {
        if by_id.insert(credential.id.as_str(), credential).is_some() {
            duplicates.insert(credential.id.clone());
        }
    }
    diagnostics.extend(
        duplicates
            .into_iter()
            .map(|id| AnchorDiagnostic::DuplicateCredential { id }),
    );

    let (anchor_candidates, mut members): (Vec<&Credential>, Vec<&Credential>) =
        by_id.values().copied().partition(|credential| credential.is_anchor());

    let mut anchors: Vec<&Credential> = Vec::with_capacity(anchor_candidates.len());
    for anchor in anchor_candidates {
        if anchor.anchor_commitment().is_some() {
            anchors.push(anchor);
        } else {
            warn!("Epoch anchor {} lacks a root hash or epoch id; treating it as a member", anchor.id);
            diagnostics.push(AnchorDiagnostic::InvalidAnchor { anchor_id: anchor.id.clone() });
            members.push(anchor);
        }
    }

    // Epoch sequence order: federation, then issuance time, then id
    anchors.sort_by(|a, b| {
        a.federation_id()
            .cmp(&b.federation_id())
            .then_with(|| chronological(a, b))
    });

    let mut groups: Vec<AnchorGroup> = Vec::with_capacity(anchors.len());
    let mut by_hash: HashMap<&str, usize> = HashMap::with_capacity(anchors.len());
    let mut earliest_by_hash: HashMap<&str, &Credential> = HashMap::new();

    // Earliest anchor (by time, across federations) owns a contested hash
    let mut by_time = anchors.clone();
    by_time.sort_by(|a, b| chronological(a, b));
    for &anchor in &by_time {
        if let Some((hash, _)) = anchor.anchor_commitment() {
            earliest_by_hash.entry(hash).or_insert(anchor);
        }
    }

    for &anchor in &anchors {
        let Some((hash, epoch)) = anchor.anchor_commitment() else {
            continue;
        };
        let index = groups.len();
        groups.push(AnchorGroup {
            anchor_id: anchor.id.clone(),
            dag_root_hash: hash.to_string(),
            epoch_id: epoch.to_string(),
            federation_id: anchor.federation_id().map(str::to_string),
            issuance_time: anchor.issuance_time,
            member_ids: Vec::new(),
        });

        match earliest_by_hash.get(hash) {
            Some(owner) if owner.id == anchor.id => {
                by_hash.insert(hash, index);
            }
            Some(owner) => {
                warn!("Anchor {} repeats root hash {} already committed by {}", anchor.id, hash, owner.id);
                diagnostics.push(AnchorDiagnostic::DuplicateAnchorHash {
                    anchor_id: anchor.id.clone(),
                    kept_anchor_id: owner.id.clone(),
                    dag_root_hash: hash.to_string(),
                });
            }
            None => {}
        }
    }

    let sequences = groups
        .windows(2)
        .filter(|pair| pair[0].federation_id == pair[1].federation_id)
        .map(|pair| SequenceEdge {
            federation_id: pair[0].federation_id.clone(),
            from: pair[0].anchor_id.clone(),
            to: pair[1].anchor_id.clone(),
        })
        .collect();

    members.sort_by(|a, b| chronological(a, b));
    let mut unanchored = Vec::new();
    for member in members {
        let Some(hash) = member.dag_root_hash() else {
            unanchored.push(member.id.clone());
            continue;
        };

        let Some(&index) = by_hash.get(hash) else {
            debug!("Credential {} declares root hash {} with no matching anchor", member.id, hash);
            diagnostics.push(AnchorDiagnostic::UnanchoredCredential {
                credential_id: member.id.clone(),
                dag_root_hash: hash.to_string(),
            });
            unanchored.push(member.id.clone());
            continue;
        };

        let group = &mut groups[index];
        if let Some(declared) = member.epoch_id() {
            if declared != group.epoch_id {
                diagnostics.push(AnchorDiagnostic::EpochMismatch {
                    credential_id: member.id.clone(),
                    anchor_id: group.anchor_id.clone(),
                    declared_epoch: declared.to_string(),
                    anchor_epoch: group.epoch_id.clone(),
                });
            }
        }
        group.member_ids.push(member.id.clone());
    }

    let grouping = AnchorGrouping {
        groups,
        unanchored,
        sequences,
        diagnostics,
    };
    debug!(
        "Grouped credentials under {} anchors; {} unanchored",
        grouping.groups.len(),
        grouping.unanchored.len()
    );
    grouping
}

/// Group by anchor and cross-check member ordering against a lineage graph
pub fn group_by_anchor_with_lineage(credentials: &[Credential], lineage: &LineageGraph) -> AnchorGrouping {
    let mut grouping = group_by_anchor(credentials);

    // Position of each anchor within its federation's epoch sequence
    let mut positions: HashMap<&str, (Option<&str>, usize)> = HashMap::new();
    let mut counters: HashMap<Option<&str>, usize> = HashMap::new();
    for group in &grouping.groups {
        let federation = group.federation_id.as_deref();
        let counter = counters.entry(federation).or_insert(0);
        for member in &group.member_ids {
            positions.insert(member.as_str(), (federation, *counter));
        }
        *counter += 1;
    }

    let mut violations = Vec::new();
    for group in &grouping.groups {
        for member in &group.member_ids {
            let Some(&(federation, epoch)) = positions.get(member.as_str()) else {
                continue;
            };
            let Some(parents) = lineage.parents(member) else {
                continue;
            };
            for parent in parents {
                if let Some(&(parent_federation, parent_epoch)) = positions.get(parent.as_str()) {
                    if parent_federation == federation && parent_epoch > epoch {
                        violations.push(AnchorDiagnostic::LineageOrderViolation {
                            credential_id: member.clone(),
                            parent_id: parent.clone(),
                        });
                    }
                }
            }
        }
    }

    if !violations.is_empty() {
        warn!("{} lineage edges point into later epochs", violations.len());
    }
    grouping.diagnostics.extend(violations);
    grouping
}
