use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credential::Credential;

/// A single endorsement taken from a multi-signature proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEntry {
    pub verification_method: String,
    pub created: DateTime<Utc>,
}

impl SignatureEntry {
    /// DID portion of the verification method, if it is a usable DID
    pub fn signer_did(&self) -> Option<&str> {
        signer_did(&self.verification_method)
    }
}

/// Problems found while reading a proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionDiagnostic {
    /// The proof has a shape that carries no signature entries at all
    UnrecognizedProofShape,
    /// One entry of an otherwise readable proof could not be parsed
    MalformedSignatureEntry { index: usize },
}

/// Full outcome of reading a credential's proof
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureExtraction {
    /// Parsed entries in proof order
    pub entries: Vec<SignatureEntry>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
    /// A proof was present but nothing in it could be parsed
    pub malformed: bool,
}

/// Extract the ordered endorsement entries from a credential.
///
/// Returns an empty list when the credential carries no proof.
pub fn extract_signatures(credential: &Credential) -> Vec<SignatureEntry> {
    extract_signatures_detailed(credential).entries
}

/// Extract endorsement entries along with parse diagnostics
pub fn extract_signatures_detailed(credential: &Credential) -> SignatureExtraction {
    match &credential.multi_signature_proof {
        None => SignatureExtraction::default(),
        Some(proof) => extract_from_proof(proof),
    }
}

fn extract_from_proof(proof: &Value) -> SignatureExtraction {
    let raw_entries = match proof {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => match map.get("signatures").or_else(|| map.get("proofs")) {
            Some(Value::Array(entries)) => entries.as_slice(),
            // A lone proof object
            _ if map.contains_key("verificationMethod") => std::slice::from_ref(proof),
            _ => return malformed_shape(),
        },
        _ => return malformed_shape(),
    };

    let mut extraction = SignatureExtraction::default();
    for (index, raw) in raw_entries.iter().enumerate() {
        match SignatureEntry::deserialize(raw) {
            Ok(entry) => extraction.entries.push(entry),
            Err(_) => extraction
                .diagnostics
                .push(ExtractionDiagnostic::MalformedSignatureEntry { index }),
        }
    }

    extraction.malformed = !raw_entries.is_empty() && extraction.entries.is_empty();
    extraction
}

fn malformed_shape() -> SignatureExtraction {
    SignatureExtraction {
        entries: Vec::new(),
        diagnostics: vec![ExtractionDiagnostic::UnrecognizedProofShape],
        malformed: true,
    }
}

/// Text before the `#` fragment of a verification method, if it names a DID
pub fn signer_did(verification_method: &str) -> Option<&str> {
    let did = verification_method
        .split_once('#')
        .map_or(verification_method, |(did, _)| did)
        .trim();

    let mut parts = did.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("did"), Some(method), Some(id)) if !method.is_empty() && !id.is_empty() => Some(did),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialBuilder, CredentialKind};
    use serde_json::json;

    fn report() -> CredentialBuilder {
        CredentialBuilder::new("report-1", CredentialKind::FederationReport).issued_at_secs(10)
    }

    #[test]
    fn test_no_proof_yields_empty_list() {
        let credential = report().build();
        let extraction = extract_signatures_detailed(&credential);
        assert!(extraction.entries.is_empty());
        assert!(!extraction.malformed);
        assert!(extraction.diagnostics.is_empty());
    }

    #[test]
    fn test_entries_keep_proof_order() {
        let credential = report()
            .signed_by("did:icn:b")
            .signed_by("did:icn:a")
            .build();

        let methods: Vec<_> = extract_signatures(&credential)
            .into_iter()
            .map(|entry| entry.verification_method)
            .collect();
        assert_eq!(methods, vec!["did:icn:b#keys-1", "did:icn:a#keys-1"]);
    }

    #[test]
    fn test_object_wrapped_signatures() {
        let credential = report()
            .raw_proof(json!({
                "type": "MultiSignature",
                "signatures": [
                    { "verificationMethod": "did:icn:a#k", "created": "2024-01-01T00:00:00Z" }
                ]
            }))
            .build();
        assert_eq!(extract_signatures(&credential).len(), 1);
    }

    #[test]
    fn test_partially_malformed_proof() {
        let credential = report()
            .raw_proof(json!([
                { "verificationMethod": "did:icn:a#k", "created": "2024-01-01T00:00:00Z" },
                { "signer": 12 }
            ]))
            .build();

        let extraction = extract_signatures_detailed(&credential);
        assert_eq!(extraction.entries.len(), 1);
        assert!(!extraction.malformed);
        assert_eq!(
            extraction.diagnostics,
            vec![ExtractionDiagnostic::MalformedSignatureEntry { index: 1 }]
        );
    }

    #[test]
    fn test_entirely_unparsable_proof() {
        let credential = report().raw_proof(json!("not-a-proof")).build();
        let extraction = extract_signatures_detailed(&credential);
        assert!(extraction.malformed);
        assert!(extraction.entries.is_empty());

        let credential = report().raw_proof(json!([{ "bogus": true }])).build();
        assert!(extract_signatures_detailed(&credential).malformed);
    }

    #[test]
    fn test_signer_did() {
        assert_eq!(signer_did("did:icn:alice#keys-1"), Some("did:icn:alice"));
        assert_eq!(signer_did("did:key:z6Mk"), Some("did:key:z6Mk"));
        assert_eq!(signer_did("did:icn:fed:alice#a#b"), Some("did:icn:fed:alice"));
        assert_eq!(signer_did("#keys-1"), None);
        assert_eq!(signer_did("alice#keys-1"), None);
        assert_eq!(signer_did("did:icn"), None);
    }
}
