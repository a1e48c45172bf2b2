/*!
# ICN Federation Trust

This crate implements the federation trust & quorum validation engine for the
Intercooperative Network (ICN). It decides whether a multi-party-signed report
satisfies a federation's declared quorum policy, reconstructs the lineage graph
connecting related decision credentials, and groups credentials under the epoch
anchors that commit to them.

## Architectural Tenets
- Every operation is a synchronous, pure function over caller-owned snapshots
- Manifests are immutable values keyed by `(federation_id, version)`
- Partial or malformed input degrades to a result carrying diagnostics; only a
  missing manifest or an empty/invalid credential set aborts a call
- Signature bytes are verified upstream; this crate counts signer identities
*/

pub mod anchor;
pub mod cache;
pub mod credential;
pub mod error;
pub mod lineage;
pub mod manifest;
pub mod quorum;
pub mod service;
pub mod signature;
pub mod trust;

// Re-export core types
pub use anchor::{AnchorDiagnostic, AnchorGroup, AnchorGrouping, SequenceEdge};
pub use cache::{credential_set_fingerprint, CacheStats, CachedValidationService};
pub use credential::{Credential, CredentialBuilder, CredentialId, CredentialKind, CredentialSubject, Issuer};
pub use error::{TrustError, TrustResult};
pub use lineage::{LineageDiagnostic, LineageGraph};
pub use manifest::{
    FederationManifest, FederationMemberRole, ManifestRegistry, ManifestSource, QuorumConfig, QuorumPolicyType,
};
pub use quorum::{QuorumDiagnostic, QuorumValidationResult, SignerInfo};
pub use service::ValidationService;
pub use signature::{ExtractionDiagnostic, SignatureEntry, SignatureExtraction};
pub use trust::{CredentialTrustScore, TrustLevel};

// Re-export the pure operations
pub use anchor::{group_by_anchor, group_by_anchor_with_lineage};
pub use lineage::extract_lineage;
pub use quorum::evaluate_quorum;
pub use signature::{extract_signatures, extract_signatures_detailed};
pub use trust::assess_trust;
