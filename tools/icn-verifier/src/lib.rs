/*!
 * ICN Federation Verifier
 *
 * Loads federation manifests and credentials from JSON files and runs the
 * quorum, lineage and epoch anchor checks of the federation trust engine.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use icn_federation_trust::{
    AnchorGrouping, CachedValidationService, Credential, CredentialTrustScore, FederationManifest, LineageGraph,
    ManifestRegistry, QuorumValidationResult, TrustError,
};

pub mod config;
pub mod render;

pub use config::{OutputFormat, VerifierConfig};

/// Error types for the verifier
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Invalid input in {path}: {message}")]
    InvalidInput { path: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Trust(#[from] TrustError),
}

impl VerifierError {
    pub(crate) fn read(path: &Path, err: std::io::Error) -> Self {
        VerifierError::ReadError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    fn invalid(path: &Path, message: impl ToString) -> Self {
        VerifierError::InvalidInput {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for VerifierError {
    fn from(err: serde_json::Error) -> Self {
        VerifierError::SerializationError(err.to_string())
    }
}

/// Quorum outcome of a report together with its trust score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub quorum: QuorumValidationResult,
    pub trust: CredentialTrustScore,
}

fn read_json(path: &Path) -> Result<Value, VerifierError> {
    let content = fs::read_to_string(path).map_err(|e| VerifierError::read(path, e))?;
    serde_json::from_str(&content).map_err(|e| VerifierError::invalid(path, e))
}

/// Load one federation manifest
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<FederationManifest, VerifierError> {
    let path = path.as_ref();
    serde_json::from_value(read_json(path)?).map_err(|e| VerifierError::invalid(path, e))
}

/// Load every `*.json` manifest in a directory into a registry.
///
/// A file may hold a single manifest or an array of manifest versions.
pub fn load_manifest_dir<P: AsRef<Path>>(dir: P) -> Result<ManifestRegistry, VerifierError> {
    let dir = dir.as_ref();
    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(|e| VerifierError::read(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut registry = ManifestRegistry::new();
    for path in paths {
        let manifests: Vec<FederationManifest> = match read_json(&path)? {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()
                .map_err(|e| VerifierError::invalid(&path, e))?,
            value => vec![serde_json::from_value(value).map_err(|e| VerifierError::invalid(&path, e))?],
        };
        for manifest in manifests {
            debug!("Loaded manifest {} v{} from {}", manifest.federation_id, manifest.version, path.display());
            registry.insert(manifest);
        }
    }
    Ok(registry)
}

/// Load one credential
pub fn load_credential<P: AsRef<Path>>(path: P) -> Result<Credential, VerifierError> {
    let path = path.as_ref();
    Credential::from_json(read_json(path)?).map_err(|e| VerifierError::invalid(path, e))
}

/// Load a credential set: a JSON array of credentials or a single credential
pub fn load_credentials<P: AsRef<Path>>(path: P) -> Result<Vec<Credential>, VerifierError> {
    let path = path.as_ref();
    match read_json(path)? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Credential::from_json(item)
                    .map_err(|e| VerifierError::invalid(path, format!("credential {}: {}", index, e)))
            })
            .collect(),
        value => Ok(vec![Credential::from_json(value).map_err(|e| VerifierError::invalid(path, e))?]),
    }
}

/// Runs the trust engine over loaded inputs
pub struct Verifier {
    service: CachedValidationService,
    registry: ManifestRegistry,
}

impl Verifier {
    pub fn new(config: &VerifierConfig) -> Result<Self, VerifierError> {
        let registry = match &config.manifests.directory {
            Some(dir) => load_manifest_dir(dir)?,
            None => ManifestRegistry::new(),
        };
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: &VerifierConfig, registry: ManifestRegistry) -> Self {
        Self {
            service: CachedValidationService::new(config.cache.capacity),
            registry,
        }
    }

    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    /// Validate a report against an explicit manifest, or the registry when none is given
    pub fn validate(
        &self,
        credential: &Credential,
        manifest: Option<&FederationManifest>,
    ) -> Result<ValidationReport, VerifierError> {
        let (quorum, trust) = match manifest {
            Some(manifest) => (
                self.service.validate_report(credential, Some(manifest))?,
                icn_federation_trust::assess_trust(credential, Some(manifest))?,
            ),
            None => {
                let quorum = self.service.validate_report_from(credential, &self.registry)?;
                let manifest = self.registry.get_version(&quorum.federation_id, quorum.manifest_version);
                let trust = icn_federation_trust::assess_trust(credential, manifest.as_deref())?;
                (quorum, trust)
            }
        };

        if quorum.is_satisfied {
            info!("{}: {}", credential.id, quorum.summary());
        } else {
            warn!("{}: {}", credential.id, quorum.summary());
        }

        Ok(ValidationReport {
            quorum: Arc::unwrap_or_clone(quorum),
            trust,
        })
    }

    pub fn lineage(&self, credentials: &[Credential]) -> Result<Arc<LineageGraph>, VerifierError> {
        Ok(self.service.build_lineage(credentials)?)
    }

    /// Group by epoch anchor, optionally cross-checking against lineage
    pub fn anchors(&self, credentials: &[Credential], check_lineage: bool) -> Result<AnchorGrouping, VerifierError> {
        if check_lineage {
            let graph = self.lineage(credentials)?;
            return Ok(icn_federation_trust::group_by_anchor_with_lineage(credentials, &graph));
        }
        Ok(Arc::unwrap_or_clone(self.service.group_by_anchor(credentials)?))
    }
}
