use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::credential::{Credential, CredentialId};
use crate::error::TrustResult;
use crate::manifest::FederationManifest;
use crate::quorum::{evaluate_quorum, QuorumDiagnostic, QuorumValidationResult};

const BASE_SCORE: i32 = 50;
const ISSUER_MEMBER_BONUS: i32 = 20;
const SIGNATURE_BONUS: i32 = 10;
const QUORUM_BONUS: i32 = 20;
const MALFORMED_PROOF_PENALTY: i32 = 30;

/// Coarse trust bucket shown to wallet users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    High,
    Medium,
    Low,
}

impl TrustLevel {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            TrustLevel::High
        } else if score >= 50 {
            TrustLevel::Medium
        } else {
            TrustLevel::Low
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustLevel::High => write!(f, "High"),
            TrustLevel::Medium => write!(f, "Medium"),
            TrustLevel::Low => write!(f, "Low"),
        }
    }
}

/// Trust score information for a credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialTrustScore {
    pub credential_id: CredentialId,
    /// 0-100
    pub score: u32,
    pub level: TrustLevel,
    pub issuer_verified: bool,
    pub signature_present: bool,
    pub quorum_met: bool,
}

/// Score a credential against its federation manifest
pub fn assess_trust(
    credential: &Credential,
    manifest: Option<&FederationManifest>,
) -> TrustResult<CredentialTrustScore> {
    let quorum = evaluate_quorum(credential, manifest)?;
    let issuer_verified = manifest
        .map(|m| m.member(&credential.issuer.did).is_some())
        .unwrap_or(false);
    Ok(score_from_quorum(credential, issuer_verified, &quorum))
}

/// Score from an already computed quorum evaluation
pub(crate) fn score_from_quorum(
    credential: &Credential,
    issuer_verified: bool,
    quorum: &QuorumValidationResult,
) -> CredentialTrustScore {
    let signature_present = !quorum.signers.is_empty() || !quorum.unresolved_signatures.is_empty();
    let malformed = quorum
        .errors
        .iter()
        .any(|e| matches!(e, QuorumDiagnostic::MalformedProof));

    let mut score = BASE_SCORE;
    if issuer_verified {
        score += ISSUER_MEMBER_BONUS;
    }
    if signature_present {
        score += SIGNATURE_BONUS;
    }
    if quorum.is_satisfied {
        score += QUORUM_BONUS;
    }
    if malformed {
        score -= MALFORMED_PROOF_PENALTY;
    }
    let score = score.clamp(0, 100) as u32;

    debug!("Trust score for {}: {}", credential.id, score);

    CredentialTrustScore {
        credential_id: credential.id.clone(),
        score,
        level: TrustLevel::from_score(score),
        issuer_verified,
        signature_present,
        quorum_met: quorum.is_satisfied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialBuilder, CredentialKind};
    use crate::error::TrustError;
    use crate::manifest::{FederationMemberRole, QuorumConfig, QuorumPolicyType};
    use serde_json::json;

    fn manifest() -> FederationManifest {
        FederationManifest {
            federation_id: "fed:alpha".to_string(),
            name: "Alpha".to_string(),
            description: None,
            members: [("did:icn:a", 1), ("did:icn:b", 1), ("did:icn:c", 1)]
                .into_iter()
                .map(|(did, weight)| {
                    (
                        did.to_string(),
                        FederationMemberRole {
                            role: "Member".to_string(),
                            weight,
                            voting_power: None,
                            can_veto: None,
                        },
                    )
                })
                .collect(),
            quorum_rules: QuorumConfig {
                policy_type: QuorumPolicyType::Majority,
                min_participants: 0,
                min_approvals: 2,
                threshold_percentage: None,
                timeout_seconds: None,
            },
            version: 3,
            created: Default::default(),
        }
    }

    fn receipt() -> CredentialBuilder {
        CredentialBuilder::new("receipt-1", CredentialKind::Finalization)
            .federation("fed:alpha")
            .issuer("did:icn:a")
    }

    #[test]
    fn test_fully_trusted() {
        let credential = receipt().signed_by("did:icn:a").signed_by("did:icn:b").build();
        let score = assess_trust(&credential, Some(&manifest())).unwrap();
        assert_eq!(score.score, 100);
        assert_eq!(score.level, TrustLevel::High);
        assert!(score.issuer_verified && score.signature_present && score.quorum_met);
    }

    #[test]
    fn test_quorum_short() {
        let credential = receipt().signed_by("did:icn:a").build();
        let score = assess_trust(&credential, Some(&manifest())).unwrap();
        assert_eq!(score.score, 80);
        assert!(!score.quorum_met);
    }

    #[test]
    fn test_outsider_issuer_without_signatures() {
        let credential = receipt().issuer("did:icn:stranger").build();
        let score = assess_trust(&credential, Some(&manifest())).unwrap();
        assert_eq!(score.score, 50);
        assert_eq!(score.level, TrustLevel::Medium);
    }

    #[test]
    fn test_malformed_proof_is_low() {
        let credential = receipt().raw_proof(json!(42)).build();
        let score = assess_trust(&credential, Some(&manifest())).unwrap();
        assert_eq!(score.score, 40);
        assert_eq!(score.level, TrustLevel::Low);
    }

    #[test]
    fn test_requires_manifest() {
        let credential = receipt().build();
        assert_eq!(
            assess_trust(&credential, None),
            Err(TrustError::MissingManifest("fed:alpha".to_string()))
        );
    }
}
