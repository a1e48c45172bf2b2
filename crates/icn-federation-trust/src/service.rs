/*!
# Validation Service

Single entry point for presentation and API layers. The service only locates
the manifest a credential refers to and wraps errors consistently; all policy
lives in the quorum, lineage and anchor modules.
*/

use tracing::debug;

use crate::anchor::{self, AnchorGrouping};
use crate::credential::Credential;
use crate::error::{TrustError, TrustResult};
use crate::lineage::{self, LineageGraph};
use crate::manifest::{FederationManifest, ManifestSource};
use crate::quorum::{evaluate_quorum, QuorumValidationResult, UNDECLARED_FEDERATION};
use crate::trust::{self, CredentialTrustScore};

/// Stateless facade over the trust engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationService;

impl ValidationService {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a report credential against the manifest of its federation
    pub fn validate_report(
        &self,
        credential: &Credential,
        manifest: Option<&FederationManifest>,
    ) -> TrustResult<QuorumValidationResult> {
        evaluate_quorum(credential, manifest)
    }

    /// Evaluate a report, resolving its declared federation through `source`
    pub fn validate_report_from<S>(&self, credential: &Credential, source: &S) -> TrustResult<QuorumValidationResult>
    where
        S: ManifestSource + ?Sized,
    {
        let manifest = resolve_manifest(credential, source)?;
        evaluate_quorum(credential, Some(manifest.as_ref()))
    }

    /// Build the lineage graph for a non-empty credential set
    pub fn build_lineage(&self, credentials: &[Credential]) -> TrustResult<LineageGraph> {
        check_credential_set(credentials)?;
        Ok(lineage::extract_lineage(credentials))
    }

    /// Group a non-empty credential set under its epoch anchors
    pub fn group_by_anchor(&self, credentials: &[Credential]) -> TrustResult<AnchorGrouping> {
        check_credential_set(credentials)?;
        Ok(anchor::group_by_anchor(credentials))
    }

    /// Group under epoch anchors and cross-check against the set's lineage
    pub fn group_by_anchor_checked(&self, credentials: &[Credential]) -> TrustResult<AnchorGrouping> {
        check_credential_set(credentials)?;
        let graph = lineage::extract_lineage(credentials);
        Ok(anchor::group_by_anchor_with_lineage(credentials, &graph))
    }

    pub fn assess_trust(
        &self,
        credential: &Credential,
        manifest: Option<&FederationManifest>,
    ) -> TrustResult<CredentialTrustScore> {
        trust::assess_trust(credential, manifest)
    }

    pub fn assess_trust_from<S>(&self, credential: &Credential, source: &S) -> TrustResult<CredentialTrustScore>
    where
        S: ManifestSource + ?Sized,
    {
        let manifest = resolve_manifest(credential, source)?;
        trust::assess_trust(credential, Some(manifest.as_ref()))
    }
}

/// Locate the manifest for the federation a credential declares
pub(crate) fn resolve_manifest<S>(
    credential: &Credential,
    source: &S,
) -> TrustResult<std::sync::Arc<FederationManifest>>
where
    S: ManifestSource + ?Sized,
{
    let Some(federation_id) = credential.federation_id() else {
        return Err(TrustError::MissingManifest(UNDECLARED_FEDERATION.to_string()));
    };
    debug!("Resolving manifest for {} (federation {})", credential.id, federation_id);
    source
        .get_manifest(federation_id)
        .ok_or_else(|| TrustError::MissingManifest(federation_id.to_string()))
}

pub(crate) fn check_credential_set(credentials: &[Credential]) -> TrustResult<()> {
    if credentials.is_empty() {
        return Err(TrustError::EmptyCredentialSet);
    }
    if let Some(position) = credentials.iter().position(|c| c.id.trim().is_empty()) {
        return Err(TrustError::InvalidCredential(format!(
            "credential at position {} has an empty id",
            position
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialBuilder, CredentialKind};
    use crate::manifest::{FederationMemberRole, ManifestRegistry, QuorumConfig, QuorumPolicyType};

    fn manifest(version: u32, threshold: u32) -> FederationManifest {
        FederationManifest {
            federation_id: "fed:alpha".to_string(),
            name: "Alpha".to_string(),
            description: None,
            members: ["did:icn:a", "did:icn:b"]
                .into_iter()
                .map(|did| {
                    (
                        did.to_string(),
                        FederationMemberRole {
                            role: "Member".to_string(),
                            weight: 1,
                            voting_power: None,
                            can_veto: None,
                        },
                    )
                })
                .collect(),
            quorum_rules: QuorumConfig {
                policy_type: QuorumPolicyType::Majority,
                min_participants: 0,
                min_approvals: 1,
                threshold_percentage: Some(threshold),
                timeout_seconds: None,
            },
            version,
            created: Default::default(),
        }
    }

    #[test]
    fn test_validate_report_from_uses_latest_manifest() {
        let registry = ManifestRegistry::new()
            .with_manifest(manifest(1, 50))
            .with_manifest(manifest(2, 100));
        let credential = CredentialBuilder::new("report", CredentialKind::FederationReport)
            .federation("fed:alpha")
            .signed_by("did:icn:a")
            .build();

        let result = ValidationService::new()
            .validate_report_from(&credential, &registry)
            .unwrap();
        assert_eq!(result.manifest_version, 2);
        assert!(!result.is_satisfied);
    }

    #[test]
    fn test_unknown_or_undeclared_federation() {
        let registry = ManifestRegistry::new().with_manifest(manifest(1, 50));
        let service = ValidationService::new();

        let unknown = CredentialBuilder::new("r1", CredentialKind::FederationReport)
            .federation("fed:beta")
            .build();
        assert_eq!(
            service.validate_report_from(&unknown, &registry),
            Err(TrustError::MissingManifest("fed:beta".to_string()))
        );

        let undeclared = CredentialBuilder::new("r2", CredentialKind::FederationReport).build();
        assert_eq!(
            service.validate_report_from(&undeclared, &registry),
            Err(TrustError::MissingManifest(UNDECLARED_FEDERATION.to_string()))
        );
    }

    #[test]
    fn test_empty_and_invalid_sets_rejected() {
        let service = ValidationService::new();
        assert_eq!(service.build_lineage(&[]), Err(TrustError::EmptyCredentialSet));
        assert_eq!(service.group_by_anchor(&[]).unwrap_err(), TrustError::EmptyCredentialSet);

        let nameless = CredentialBuilder::new("  ", CredentialKind::Vote).build();
        assert!(matches!(
            service.build_lineage(&[nameless]),
            Err(TrustError::InvalidCredential(_))
        ));
    }
}
