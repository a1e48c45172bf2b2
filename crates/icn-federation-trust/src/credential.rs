/*!
# Credentials

Decision artifacts issued and co-signed by federation members. Credentials are
deserialized from W3C-style JSON; the free-form `type` tag array is folded into
the closed [`CredentialKind`] enum so dispatch is exhaustively checked.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Opaque, unique credential identifier
pub type CredentialId = String;

const GENERIC_TYPE_TAG: &str = "VerifiableCredential";

/// Kind of decision artifact a credential represents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum CredentialKind {
    Proposal,
    Vote,
    Appeal,
    Finalization,
    Execution,
    FederationReport,
    EpochAnchor,
    /// Unrecognised kind, carrying the raw type tags
    Unknown(Vec<String>),
}

impl CredentialKind {
    /// Discriminate a credential kind from its type tags.
    ///
    /// The generic `VerifiableCredential` tag is skipped; the first recognised
    /// tag wins.
    pub fn from_type_tags(tags: &[String]) -> Self {
        tags.iter()
            .filter(|tag| tag.as_str() != GENERIC_TYPE_TAG)
            .find_map(|tag| Self::from_tag(tag))
            .unwrap_or_else(|| CredentialKind::Unknown(tags.to_vec()))
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let base = tag.strip_suffix("Credential").unwrap_or(tag);
        match base {
            "Proposal" | "ProposalSubmission" => Some(CredentialKind::Proposal),
            "Vote" | "ProposalVote" => Some(CredentialKind::Vote),
            "Appeal" => Some(CredentialKind::Appeal),
            "Finalization" | "FinalizationReceipt" | "ProposalFinalization" => {
                Some(CredentialKind::Finalization)
            }
            "Execution" | "ExecutionReceipt" => Some(CredentialKind::Execution),
            "FederationReport" => Some(CredentialKind::FederationReport),
            "EpochAnchor" | "DagAnchor" => Some(CredentialKind::EpochAnchor),
            _ => None,
        }
    }

    /// Canonical type tag for known kinds
    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            CredentialKind::Proposal => Some("ProposalCredential"),
            CredentialKind::Vote => Some("VoteCredential"),
            CredentialKind::Appeal => Some("AppealCredential"),
            CredentialKind::Finalization => Some("FinalizationCredential"),
            CredentialKind::Execution => Some("ExecutionReceipt"),
            CredentialKind::FederationReport => Some("FederationReportCredential"),
            CredentialKind::EpochAnchor => Some("EpochAnchorCredential"),
            CredentialKind::Unknown(_) => None,
        }
    }
}

impl From<Vec<String>> for CredentialKind {
    fn from(tags: Vec<String>) -> Self {
        CredentialKind::from_type_tags(&tags)
    }
}

impl From<CredentialKind> for Vec<String> {
    fn from(kind: CredentialKind) -> Self {
        match kind {
            CredentialKind::Unknown(tags) => tags,
            known => {
                let tag = known.type_tag().unwrap_or_default();
                vec![GENERIC_TYPE_TAG.to_string(), tag.to_string()]
            }
        }
    }
}

/// Issuer of a credential; accepts either a bare DID string or an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IssuerRepr")]
pub struct Issuer {
    pub did: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IssuerRepr {
    Did(String),
    Full {
        #[serde(alias = "id")]
        did: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<IssuerRepr> for Issuer {
    fn from(repr: IssuerRepr) -> Self {
        match repr {
            IssuerRepr::Did(did) => Issuer { did, name: None },
            IssuerRepr::Full { did, name } => Issuer { did, name },
        }
    }
}

impl From<&str> for Issuer {
    fn from(did: &str) -> Self {
        Issuer { did: did.to_string(), name: None }
    }
}

/// Subject fields the trust engine reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Federation the credential declares
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,

    /// Credentials this one supersedes or depends on
    #[serde(
        default,
        rename = "parentCredentials",
        alias = "parentCredential",
        alias = "parentIds",
        alias = "parentId",
        deserialize_with = "one_or_many",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub parent_ids: BTreeSet<CredentialId>,

    /// Content-addressed root committed by (or referenced from) an epoch anchor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag_root_hash: Option<String>,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub epoch_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => BTreeSet::new(),
        Some(OneOrMany::One(id)) => BTreeSet::from([id]),
        Some(OneOrMany::Many(ids)) => ids.into_iter().collect(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Number(u64),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
        StringOrNumber::Text(text) => text,
        StringOrNumber::Number(number) => number.to_string(),
    }))
}

/// A signed decision artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,

    #[serde(rename = "type")]
    pub kind: CredentialKind,

    pub issuer: Issuer,

    #[serde(rename = "issuanceDate")]
    pub issuance_time: DateTime<Utc>,

    #[serde(rename = "credentialSubject", default)]
    pub subject: CredentialSubject,

    /// Raw multi-signature proof; parsed lazily by the signature extractor so
    /// that an unparsable proof degrades instead of failing deserialization
    #[serde(
        rename = "multiSignatureProof",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub multi_signature_proof: Option<Value>,
}

impl Credential {
    /// Parse a credential from its JSON form
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn is_anchor(&self) -> bool {
        matches!(self.kind, CredentialKind::EpochAnchor)
    }

    pub fn is_report(&self) -> bool {
        matches!(self.kind, CredentialKind::FederationReport)
    }

    pub fn federation_id(&self) -> Option<&str> {
        self.subject.federation_id.as_deref()
    }

    pub fn parent_ids(&self) -> &BTreeSet<CredentialId> {
        &self.subject.parent_ids
    }

    pub fn dag_root_hash(&self) -> Option<&str> {
        self.subject.dag_root_hash.as_deref().filter(|hash| !hash.is_empty())
    }

    pub fn epoch_id(&self) -> Option<&str> {
        self.subject.epoch_id.as_deref().filter(|epoch| !epoch.is_empty())
    }

    /// Root hash and epoch of an anchor credential, if both are declared
    pub fn anchor_commitment(&self) -> Option<(&str, &str)> {
        if !self.is_anchor() {
            return None;
        }
        Some((self.dag_root_hash()?, self.epoch_id()?))
    }
}

/// Builder for credentials, mainly used by callers assembling fixtures
#[derive(Debug, Clone)]
pub struct CredentialBuilder {
    id: CredentialId,
    kind: CredentialKind,
    issuer: Issuer,
    issuance_time: DateTime<Utc>,
    subject: CredentialSubject,
    signatures: Vec<(String, Option<DateTime<Utc>>)>,
    raw_proof: Option<Value>,
}

impl CredentialBuilder {
    pub fn new(id: impl Into<CredentialId>, kind: CredentialKind) -> Self {
        Self {
            id: id.into(),
            kind,
            issuer: Issuer::from(""),
            issuance_time: Utc::now(),
            subject: CredentialSubject::default(),
            signatures: Vec::new(),
            raw_proof: None,
        }
    }

    pub fn issuer(mut self, did: impl Into<String>) -> Self {
        self.issuer.did = did.into();
        self
    }

    pub fn issuer_name(mut self, name: impl Into<String>) -> Self {
        self.issuer.name = Some(name.into());
        self
    }

    pub fn issued_at(mut self, time: DateTime<Utc>) -> Self {
        self.issuance_time = time;
        self
    }

    /// Set the issuance time from UNIX seconds
    pub fn issued_at_secs(mut self, secs: i64) -> Self {
        self.issuance_time = DateTime::from_timestamp(secs, 0).unwrap_or_default();
        self
    }

    pub fn federation(mut self, federation_id: impl Into<String>) -> Self {
        self.subject.federation_id = Some(federation_id.into());
        self
    }

    pub fn proposal(mut self, proposal_id: impl Into<String>) -> Self {
        self.subject.proposal_id = Some(proposal_id.into());
        self
    }

    pub fn parent(mut self, parent_id: impl Into<CredentialId>) -> Self {
        self.subject.parent_ids.insert(parent_id.into());
        self
    }

    pub fn parents<I, S>(mut self, parent_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CredentialId>,
    {
        self.subject.parent_ids.extend(parent_ids.into_iter().map(Into::into));
        self
    }

    pub fn dag_root_hash(mut self, hash: impl Into<String>) -> Self {
        self.subject.dag_root_hash = Some(hash.into());
        self
    }

    pub fn epoch_id(mut self, epoch_id: impl Into<String>) -> Self {
        self.subject.epoch_id = Some(epoch_id.into());
        self
    }

    /// Add a signature by verification method; `created` defaults to the
    /// issuance time
    pub fn signature(mut self, verification_method: impl Into<String>) -> Self {
        self.signatures.push((verification_method.into(), None));
        self
    }

    pub fn signature_at(
        mut self,
        verification_method: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        self.signatures.push((verification_method.into(), Some(created)));
        self
    }

    /// Convenience for `did#keys-1` style verification methods
    pub fn signed_by(self, did: &str) -> Self {
        self.signature(format!("{}#keys-1", did))
    }

    /// Attach a raw proof value verbatim, replacing any added signatures
    pub fn raw_proof(mut self, proof: Value) -> Self {
        self.raw_proof = Some(proof);
        self
    }

    pub fn build(self) -> Credential {
        let issuance_time = self.issuance_time;
        let multi_signature_proof = match self.raw_proof {
            Some(raw) => Some(raw),
            None if self.signatures.is_empty() => None,
            None => Some(Value::Array(
                self.signatures
                    .into_iter()
                    .map(|(method, created)| {
                        json!({
                            "verificationMethod": method,
                            "created": created.unwrap_or(issuance_time),
                        })
                    })
                    .collect(),
            )),
        };

        Credential {
            id: self.id,
            kind: self.kind,
            issuer: self.issuer,
            issuance_time,
            subject: self.subject,
            multi_signature_proof,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_type_tags() {
        let tags = vec!["VerifiableCredential".to_string(), "VoteCredential".to_string()];
        assert_eq!(CredentialKind::from_type_tags(&tags), CredentialKind::Vote);

        let tags = vec!["VerifiableCredential".to_string(), "ExecutionReceipt".to_string()];
        assert_eq!(CredentialKind::from_type_tags(&tags), CredentialKind::Execution);

        let tags = vec!["VerifiableCredential".to_string(), "BadgeCredential".to_string()];
        assert_eq!(
            CredentialKind::from_type_tags(&tags),
            CredentialKind::Unknown(tags.clone())
        );
    }

    #[test]
    fn test_parse_w3c_credential() {
        let value = json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "id": "urn:uuid:anchor-1",
            "type": ["VerifiableCredential", "EpochAnchorCredential"],
            "issuer": { "did": "did:icn:fed:admin", "name": "Federation Admin" },
            "issuanceDate": "2024-05-01T12:00:00Z",
            "credentialSubject": {
                "federationId": "fed:governance:alpha",
                "dagRootHash": "bafyroot",
                "epochId": 42,
                "parentCredential": "urn:uuid:report-1"
            }
        });

        let credential = Credential::from_json(value).unwrap();
        assert!(credential.is_anchor());
        assert_eq!(credential.issuer.name.as_deref(), Some("Federation Admin"));
        assert_eq!(credential.anchor_commitment(), Some(("bafyroot", "42")));
        assert!(credential.parent_ids().contains("urn:uuid:report-1"));
        assert!(credential.multi_signature_proof.is_none());
    }

    #[test]
    fn test_issuer_as_bare_did() {
        let value = json!({
            "id": "vote-1",
            "type": ["VoteCredential"],
            "issuer": "did:icn:alice",
            "issuanceDate": "2024-05-01T12:00:00Z",
            "credentialSubject": { "parentCredentials": ["proposal-1", "proposal-1"] }
        });

        let credential = Credential::from_json(value).unwrap();
        assert_eq!(credential.issuer.did, "did:icn:alice");
        assert_eq!(credential.parent_ids().len(), 1);
    }

    #[test]
    fn test_anchor_without_epoch_has_no_commitment() {
        let anchor = CredentialBuilder::new("anchor", CredentialKind::EpochAnchor)
            .dag_root_hash("H1")
            .build();
        assert_eq!(anchor.anchor_commitment(), None);

        let receipt = CredentialBuilder::new("receipt", CredentialKind::Execution)
            .dag_root_hash("H1")
            .epoch_id("1")
            .build();
        assert_eq!(receipt.anchor_commitment(), None);
    }

    #[test]
    fn test_builder_serializes_signatures() {
        let credential = CredentialBuilder::new("report", CredentialKind::FederationReport)
            .issued_at_secs(100)
            .signed_by("did:icn:a")
            .build();

        let value = serde_json::to_value(&credential).unwrap();
        assert_eq!(
            value["multiSignatureProof"][0]["verificationMethod"],
            "did:icn:a#keys-1"
        );
        assert_eq!(value["type"][1], "FederationReportCredential");

        let parsed: Credential = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, credential);
    }
}
