use serde::Serialize;
use std::fmt::Write;

use icn_federation_trust::{AnchorDiagnostic, AnchorGrouping, LineageDiagnostic, LineageGraph};

use crate::{OutputFormat, ValidationReport, VerifierError};

/// Render any result as JSON
pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, VerifierError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(rendered)
}

pub fn render_validation(report: &ValidationReport, format: OutputFormat, pretty: bool) -> Result<String, VerifierError> {
    if format == OutputFormat::Json {
        return to_json(report, pretty);
    }

    let quorum = &report.quorum;
    let mut out = String::new();
    let _ = writeln!(out, "Credential: {}", quorum.credential_id);
    let _ = writeln!(
        out,
        "Federation: {} (manifest v{}, {} policy)",
        quorum.federation_id, quorum.manifest_version, quorum.policy_type
    );
    let _ = writeln!(out, "Result:     {}", quorum.summary());
    let _ = writeln!(
        out,
        "Signers:    {}",
        quorum
            .signers
            .iter()
            .map(|s| format!("{} ({}, weight {})", s.did, s.role, s.weight))
            .collect::<Vec<_>>()
            .join(", ")
    );
    if !quorum.missing_signers.is_empty() {
        let _ = writeln!(out, "Missing:    {}", quorum.missing_signers.join(", "));
    }
    if !quorum.veto_signers.is_empty() {
        let _ = writeln!(out, "Veto:       {}", quorum.veto_signers.join(", "));
    }
    let _ = writeln!(
        out,
        "Trust:      {} ({}/100)",
        report.trust.level, report.trust.score
    );
    for diagnostic in &quorum.errors {
        let _ = writeln!(out, "  - {}", diagnostic);
    }
    Ok(out)
}

fn describe_lineage(diagnostic: &LineageDiagnostic) -> String {
    match diagnostic {
        LineageDiagnostic::DanglingReference { child, parent } => {
            format!("{} references {} which is not in the set", child, parent)
        }
        LineageDiagnostic::DuplicateCredential { id } => format!("duplicate credential id {}", id),
        LineageDiagnostic::CycleEdgeDropped { child, parent } => {
            format!("dropped {} -> {} to break a cycle", child, parent)
        }
    }
}

pub fn render_lineage(graph: &LineageGraph, format: OutputFormat, pretty: bool) -> Result<String, VerifierError> {
    if format == OutputFormat::Json {
        return to_json(graph, pretty);
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Lineage: {} credentials, {} edges",
        graph.len(),
        graph.edge_count()
    );
    for (child, parents) in graph.edges() {
        if parents.is_empty() {
            let _ = writeln!(out, "  {} (root)", child);
        } else {
            let parents: Vec<&str> = parents.iter().map(String::as_str).collect();
            let _ = writeln!(out, "  {} -> {}", child, parents.join(", "));
        }
    }
    for diagnostic in &graph.diagnostics {
        let _ = writeln!(out, "  - {}", describe_lineage(diagnostic));
    }
    Ok(out)
}

fn describe_anchor(diagnostic: &AnchorDiagnostic) -> String {
    match diagnostic {
        AnchorDiagnostic::InvalidAnchor { anchor_id } => {
            format!("anchor {} lacks a root hash or epoch id", anchor_id)
        }
        AnchorDiagnostic::DuplicateAnchorHash { anchor_id, kept_anchor_id, dag_root_hash } => format!(
            "anchor {} repeats root hash {} of {}",
            anchor_id, dag_root_hash, kept_anchor_id
        ),
        AnchorDiagnostic::UnanchoredCredential { credential_id, dag_root_hash } => {
            format!("{} declares root hash {} with no anchor", credential_id, dag_root_hash)
        }
        AnchorDiagnostic::EpochMismatch { credential_id, anchor_id, declared_epoch, anchor_epoch } => format!(
            "{} declares epoch {} but anchor {} is epoch {}",
            credential_id, declared_epoch, anchor_id, anchor_epoch
        ),
        AnchorDiagnostic::LineageOrderViolation { credential_id, parent_id } => {
            format!("{} references {} from a later epoch", credential_id, parent_id)
        }
        AnchorDiagnostic::DuplicateCredential { id } => format!("duplicate credential id {}", id),
    }
}

pub fn render_anchors(grouping: &AnchorGrouping, format: OutputFormat, pretty: bool) -> Result<String, VerifierError> {
    if format == OutputFormat::Json {
        return to_json(grouping, pretty);
    }

    let mut out = String::new();
    for group in &grouping.groups {
        let _ = writeln!(
            out,
            "Epoch {} [{}] anchor {} ({}): {} credentials",
            group.epoch_id,
            group.federation_id.as_deref().unwrap_or("-"),
            group.anchor_id,
            group.dag_root_hash,
            group.member_ids.len()
        );
        for member in &group.member_ids {
            let _ = writeln!(out, "  {}", member);
        }
    }
    if !grouping.unanchored.is_empty() {
        let _ = writeln!(out, "Unanchored: {}", grouping.unanchored.join(", "));
    }
    for edge in &grouping.sequences {
        let _ = writeln!(out, "Sequence: {} -> {}", edge.from, edge.to);
    }
    for diagnostic in &grouping.diagnostics {
        let _ = writeln!(out, "  - {}", describe_anchor(diagnostic));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use icn_federation_trust::{group_by_anchor, CredentialBuilder, CredentialKind};

    #[test]
    fn test_anchor_text_output() {
        let credentials = vec![
            CredentialBuilder::new("A1", CredentialKind::EpochAnchor)
                .dag_root_hash("H1")
                .epoch_id("1")
                .issued_at_secs(1)
                .build(),
            CredentialBuilder::new("r1", CredentialKind::Execution)
                .dag_root_hash("H1")
                .issued_at_secs(2)
                .build(),
            CredentialBuilder::new("r2", CredentialKind::Execution)
                .dag_root_hash("H9")
                .issued_at_secs(3)
                .build(),
        ];
        let text = render_anchors(&group_by_anchor(&credentials), OutputFormat::Text, true).unwrap();

        assert!(text.contains("Epoch 1 [-] anchor A1 (H1): 1 credentials"));
        assert!(text.contains("Unanchored: r2"));
        assert!(text.contains("r2 declares root hash H9 with no anchor"));
    }
}
