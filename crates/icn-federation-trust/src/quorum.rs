/*!
# Quorum Evaluation

Resolves the endorsements on a candidate report against a federation manifest
and applies the federation's declared quorum policy.

Only signatures whose DID is a member of the *supplied* manifest count toward
quorum. Unresolved signatures are retained for audit but never counted, and a
DID signing more than once is counted once.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::credential::{Credential, CredentialId};
use crate::error::{TrustError, TrustResult};
use crate::manifest::{FederationManifest, QuorumPolicyType};
use crate::signature::{extract_signatures_detailed, signer_did, ExtractionDiagnostic, SignatureEntry};

/// Placeholder federation id used in errors when a credential declares none
pub const UNDECLARED_FEDERATION: &str = "(undeclared)";

/// A signer resolved against the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub did: String,
    pub role: String,
    pub weight: u32,
    #[serde(default)]
    pub can_veto: bool,
}

/// Non-fatal findings recorded during evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuorumDiagnostic {
    /// Signature from a DID that is not a member of the supplied manifest
    UnresolvedSigner { verification_method: String, did: String },
    /// Verification method without a usable `did:method:id` prefix
    MalformedVerificationMethod { verification_method: String },
    /// Additional signature from an already counted DID
    DuplicateSigner { did: String },
    /// One proof entry could not be parsed
    MalformedSignatureEntry { index: usize },
    /// Proof present but nothing in it could be parsed
    MalformedProof,
    /// Credential carries no proof at all
    NoSignatures,
}

impl fmt::Display for QuorumDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumDiagnostic::UnresolvedSigner { did, .. } => {
                write!(f, "signer {} is not a member of the federation", did)
            }
            QuorumDiagnostic::MalformedVerificationMethod { verification_method } => {
                write!(f, "verification method '{}' does not name a DID", verification_method)
            }
            QuorumDiagnostic::DuplicateSigner { did } => {
                write!(f, "duplicate signature from {} ignored", did)
            }
            QuorumDiagnostic::MalformedSignatureEntry { index } => {
                write!(f, "signature entry {} could not be parsed", index)
            }
            QuorumDiagnostic::MalformedProof => write!(f, "multi-signature proof is unparsable"),
            QuorumDiagnostic::NoSignatures => write!(f, "credential carries no signatures"),
        }
    }
}

/// Outcome of a quorum evaluation. An unsatisfied quorum is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuorumValidationResult {
    pub credential_id: CredentialId,
    pub federation_id: String,
    pub manifest_version: u32,
    pub policy_type: QuorumPolicyType,
    pub is_satisfied: bool,
    /// Resolved signers in proof order, one per DID
    pub signers: Vec<SignerInfo>,
    /// Signatures that did not resolve to a member, kept for audit
    pub unresolved_signatures: Vec<SignatureEntry>,
    pub required_participants: u64,
    pub actual_participants: u64,
    pub required_approvals: u64,
    pub actual_approvals: u64,
    pub total_weight: u64,
    pub required_weight: u64,
    /// Required percentage (strict majority is reported as 50)
    pub required_threshold: u32,
    /// Achieved percentage of members (Majority) or of total weight (Weighted)
    pub actual_threshold: f64,
    /// Manifest members that did not sign, sorted by DID
    pub missing_signers: Vec<String>,
    /// Resolved signers holding a veto
    pub veto_signers: Vec<String>,
    pub errors: Vec<QuorumDiagnostic>,
}

impl QuorumValidationResult {
    /// Members of `manifest` that are not among the resolved signers
    pub fn missing_signers(&self, manifest: &FederationManifest) -> Vec<String> {
        let signed: HashSet<&str> = self.signers.iter().map(|s| s.did.as_str()).collect();
        manifest
            .members
            .keys()
            .filter(|did| !signed.contains(did.as_str()))
            .cloned()
            .collect()
    }

    /// Human readable one-line summary
    pub fn summary(&self) -> String {
        if self.errors.contains(&QuorumDiagnostic::MalformedProof) {
            return format!("quorum not met: {}", QuorumDiagnostic::MalformedProof);
        }
        if self.is_satisfied {
            return format!(
                "quorum satisfied: {} approvals, weight {} ({:.1}% against {}% required)",
                self.actual_approvals, self.total_weight, self.actual_threshold, self.required_threshold
            );
        }

        match self.policy_type {
            QuorumPolicyType::Majority => {
                let short = self.required_approvals.saturating_sub(self.actual_approvals);
                format!(
                    "quorum not met: {} of {} required signers missing",
                    short, self.required_approvals
                )
            }
            QuorumPolicyType::Weighted => {
                if self.total_weight < self.required_weight {
                    format!(
                        "quorum not met: signed weight {} of {} required",
                        self.total_weight, self.required_weight
                    )
                } else {
                    let short = self.required_participants.saturating_sub(self.actual_approvals);
                    format!(
                        "quorum not met: {} of {} required participants missing",
                        short, self.required_participants
                    )
                }
            }
        }
    }
}

impl fmt::Display for QuorumValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// `ceil(value * percentage / 100)` without floating point
fn percentage_ceil(value: u64, percentage: u32) -> u64 {
    let product = value * u64::from(percentage.min(100));
    product.div_ceil(100)
}

fn percentage_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Check that the supplied manifest covers the federation the credential declares
fn ensure_manifest<'a>(
    credential: &Credential,
    manifest: Option<&'a FederationManifest>,
) -> TrustResult<&'a FederationManifest> {
    let declared = credential.federation_id();
    match manifest {
        Some(manifest) if declared.map_or(true, |fed| fed == manifest.federation_id) => Ok(manifest),
        Some(manifest) => {
            warn!(
                "Credential {} declares federation {:?} but manifest is for {}",
                credential.id, declared, manifest.federation_id
            );
            Err(TrustError::MissingManifest(declared.unwrap_or(UNDECLARED_FEDERATION).to_string()))
        }
        None => Err(TrustError::MissingManifest(
            declared.unwrap_or(UNDECLARED_FEDERATION).to_string(),
        )),
    }
}

/// Evaluate whether a report credential satisfies the manifest's quorum policy.
///
/// Fails only with [`TrustError::MissingManifest`]. The result is a pure
/// function of `(credential, manifest)`.
pub fn evaluate_quorum(
    credential: &Credential,
    manifest: Option<&FederationManifest>,
) -> TrustResult<QuorumValidationResult> {
    let manifest = ensure_manifest(credential, manifest)?;
    let rules = &manifest.quorum_rules;

    let extraction = extract_signatures_detailed(credential);
    let mut errors = Vec::new();
    if credential.multi_signature_proof.is_none() {
        errors.push(QuorumDiagnostic::NoSignatures);
    }
    for diagnostic in &extraction.diagnostics {
        if let ExtractionDiagnostic::MalformedSignatureEntry { index } = diagnostic {
            errors.push(QuorumDiagnostic::MalformedSignatureEntry { index: *index });
        }
    }
    if extraction.malformed {
        warn!("Credential {} carries an unparsable multi-signature proof", credential.id);
        errors.push(QuorumDiagnostic::MalformedProof);
    }

    let mut signers: Vec<SignerInfo> = Vec::new();
    let mut unresolved_signatures = Vec::new();
    let mut participants: BTreeSet<&str> = BTreeSet::new();
    let mut counted: HashSet<&str> = HashSet::new();

    for entry in &extraction.entries {
        let Some(did) = signer_did(&entry.verification_method) else {
            errors.push(QuorumDiagnostic::MalformedVerificationMethod {
                verification_method: entry.verification_method.clone(),
            });
            unresolved_signatures.push(entry.clone());
            continue;
        };
        participants.insert(did);

        let Some(member) = manifest.member(did) else {
            warn!(
                "Signature on {} from {} does not resolve in manifest {} v{}",
                credential.id, did, manifest.federation_id, manifest.version
            );
            errors.push(QuorumDiagnostic::UnresolvedSigner {
                verification_method: entry.verification_method.clone(),
                did: did.to_string(),
            });
            unresolved_signatures.push(entry.clone());
            continue;
        };

        if !counted.insert(did) {
            errors.push(QuorumDiagnostic::DuplicateSigner { did: did.to_string() });
            continue;
        }

        signers.push(SignerInfo {
            did: did.to_string(),
            role: member.role.clone(),
            weight: member.weight,
            can_veto: member.can_veto(),
        });
    }

    let actual_approvals = signers.len() as u64;
    let actual_participants = participants.len() as u64;
    let total_weight: u64 = signers.iter().map(|s| u64::from(s.weight)).sum();
    let member_count = manifest.member_count();
    let member_weight = manifest.total_weight();
    let min_participants = u64::from(rules.min_participants);
    let min_approvals = u64::from(rules.min_approvals);

    let (is_satisfied, required_approvals, required_weight, actual_threshold) = match rules.policy_type {
        QuorumPolicyType::Majority => {
            let by_threshold = match rules.threshold_percentage {
                Some(percentage) => percentage_ceil(member_count, percentage),
                None => member_count / 2 + 1,
            };
            let satisfied = actual_approvals >= min_approvals && actual_approvals >= by_threshold;
            (
                satisfied,
                min_approvals.max(by_threshold),
                0,
                percentage_of(actual_approvals, member_count),
            )
        }
        QuorumPolicyType::Weighted => {
            let required_weight = match rules.threshold_percentage {
                Some(percentage) => percentage_ceil(member_weight, percentage),
                None => member_weight / 2 + 1,
            };
            let satisfied = total_weight >= required_weight && actual_approvals >= min_participants;
            (
                satisfied,
                min_participants,
                required_weight,
                percentage_of(total_weight, member_weight),
            )
        }
    };

    let mut result = QuorumValidationResult {
        credential_id: credential.id.clone(),
        federation_id: manifest.federation_id.clone(),
        manifest_version: manifest.version,
        policy_type: rules.policy_type,
        is_satisfied: is_satisfied && !extraction.malformed,
        veto_signers: signers.iter().filter(|s| s.can_veto).map(|s| s.did.clone()).collect(),
        signers,
        unresolved_signatures,
        required_participants: min_participants,
        actual_participants,
        required_approvals,
        actual_approvals,
        total_weight,
        required_weight,
        required_threshold: rules.threshold_percentage.map_or(50, |p| p.min(100)),
        actual_threshold,
        missing_signers: Vec::new(),
        errors,
    };
    result.missing_signers = result.missing_signers(manifest);

    debug!(
        "Quorum evaluation for {} against {} v{}: satisfied={} approvals={} weight={}",
        result.credential_id,
        result.federation_id,
        result.manifest_version,
        result.is_satisfied,
        result.actual_approvals,
        result.total_weight
    );

    Ok(result)
}
