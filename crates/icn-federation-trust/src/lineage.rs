/*!
# Lineage Extraction

Reconstructs the child→parent reference graph over a credential set purely
from the parent references each credential embeds. No external graph store is
consulted, so a partial credential set yields a consistent partial graph:
references to credentials outside the set are kept as dangling edges.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, warn};

use crate::credential::{Credential, CredentialId};

/// Non-fatal findings recorded while building a lineage graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineageDiagnostic {
    /// Parent referenced but absent from the input set
    DanglingReference { child: CredentialId, parent: CredentialId },
    /// Several input credentials share an id; the last one was kept
    DuplicateCredential { id: CredentialId },
    /// Edge that would close a cycle; removed from the graph
    CycleEdgeDropped { child: CredentialId, parent: CredentialId },
}

/// Directed child→parent reference graph.
///
/// Nodes are exactly the ids of the input credentials; dangling parents only
/// ever appear as edge targets. The parent→children index is built once with
/// the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LineageGraphData")]
pub struct LineageGraph {
    edges: BTreeMap<CredentialId, BTreeSet<CredentialId>>,
    #[serde(skip)]
    children: BTreeMap<CredentialId, BTreeSet<CredentialId>>,
    pub diagnostics: Vec<LineageDiagnostic>,
}

#[derive(Deserialize)]
struct LineageGraphData {
    edges: BTreeMap<CredentialId, BTreeSet<CredentialId>>,
    #[serde(default)]
    diagnostics: Vec<LineageDiagnostic>,
}

impl From<LineageGraphData> for LineageGraph {
    fn from(data: LineageGraphData) -> Self {
        Self::new(data.edges, data.diagnostics)
    }
}

impl LineageGraph {
    fn new(edges: BTreeMap<CredentialId, BTreeSet<CredentialId>>, diagnostics: Vec<LineageDiagnostic>) -> Self {
        let mut children: BTreeMap<CredentialId, BTreeSet<CredentialId>> = BTreeMap::new();
        for (child, parents) in &edges {
            for parent in parents {
                children.entry(parent.clone()).or_default().insert(child.clone());
            }
        }
        Self {
            edges,
            children,
            diagnostics,
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Child → parents adjacency, keyed by every credential in the set
    pub fn edges(&self) -> &BTreeMap<CredentialId, BTreeSet<CredentialId>> {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Direct parents of a credential in the set
    pub fn parents(&self, id: &str) -> Option<&BTreeSet<CredentialId>> {
        self.edges.get(id)
    }

    /// Credentials that directly reference `id`, which may be a dangling target
    pub fn children(&self, id: &str) -> Option<&BTreeSet<CredentialId>> {
        self.children.get(id)
    }

    /// Every credential transitively referenced by `id` (chain of custody),
    /// including dangling targets
    pub fn ancestors(&self, id: &str) -> BTreeSet<CredentialId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            let Some(parents) = self.edges.get(current) else {
                continue;
            };
            for parent in parents {
                if parent != id && seen.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }
        seen
    }

    /// Credentials in the set that reference nothing
    pub fn roots(&self) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, parents)| parents.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Edges whose parent is not part of the set
    pub fn dangling_references(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(child, parents)| {
                parents
                    .iter()
                    .filter(|parent| !self.edges.contains_key(parent.as_str()))
                    .map(move |parent| (child.as_str(), parent.as_str()))
            })
            .collect()
    }
}

/// Build the lineage graph for a credential set.
///
/// Duplicate ids collapse with the last credential winning. Self-references
/// are dropped silently and would-be cycle edges are removed and flagged.
pub fn extract_lineage(credentials: &[Credential]) -> LineageGraph {
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
            .map(|id| LineageDiagnostic::DuplicateCredential { id }),
    );

    let mut edges: BTreeMap<CredentialId, BTreeSet<CredentialId>> = BTreeMap::new();
    for (&id, credential) in &by_id {
        let parents: BTreeSet<CredentialId> = credential
            .parent_ids()
            .iter()
            .filter(|parent| !parent.is_empty() && parent.as_str() != id)
            .cloned()
            .collect();

        for parent in &parents {
            if !by_id.contains_key(parent.as_str()) {
                diagnostics.push(LineageDiagnostic::DanglingReference {
                    child: id.to_string(),
                    parent: parent.clone(),
                });
            }
        }
        edges.insert(id.to_string(), parents);
    }

    for (child, parent) in drop_back_edges(&mut edges) {
        warn!("Dropping lineage edge {} -> {} that would close a cycle", child, parent);
        diagnostics.push(LineageDiagnostic::CycleEdgeDropped { child, parent });
    }

    let graph = LineageGraph::new(edges, diagnostics);
    debug!(
        "Built lineage graph: {} credentials, {} edges, {} diagnostics",
        graph.len(),
        graph.edge_count(),
        graph.diagnostics.len()
    );
    graph
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Depth-first walk in id order removing every edge that points back to a
/// node still on the walk stack. Returns the removed edges.
fn drop_back_edges(
    edges: &mut BTreeMap<CredentialId, BTreeSet<CredentialId>>,
) -> Vec<(CredentialId, CredentialId)> {
    let mut visits: HashMap<CredentialId, Visit> = HashMap::with_capacity(edges.len());
    let mut back_edges = Vec::new();

    for root in edges.keys() {
        if visits.contains_key(root) {
            continue;
        }
        visits.insert(root.clone(), Visit::InProgress);
        let mut stack: Vec<(&CredentialId, Vec<&CredentialId>, usize)> =
            vec![(root, edges[root].iter().collect(), 0)];

        while let Some((node, parents, next)) = stack.last_mut() {
            let Some(parent) = parents.get(*next).copied() else {
                visits.insert((*node).clone(), Visit::Done);
                stack.pop();
                continue;
            };
            *next += 1;

            match visits.get(parent) {
                Some(Visit::InProgress) => back_edges.push(((*node).clone(), parent.clone())),
                Some(Visit::Done) => {}
                None => {
                    visits.insert(parent.clone(), Visit::InProgress);
                    let grandparents = edges
                        .get(parent)
                        .map(|set| set.iter().collect())
                        .unwrap_or_default();
                    stack.push((parent, grandparents, 0));
                }
            }
        }
    }

    for (child, parent) in &back_edges {
        if let Some(parents) = edges.get_mut(child) {
            parents.remove(parent);
        }
    }
    back_edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialBuilder, CredentialKind};

    fn vote(id: &str, parents: &[&str]) -> Credential {
        CredentialBuilder::new(id, CredentialKind::Vote)
            .parents(parents.iter().copied())
            .build()
    }

    #[test]
    fn test_self_reference_dropped_silently() {
        let graph = extract_lineage(&[vote("a", &["a"])]);
        assert!(graph.parents("a").unwrap().is_empty());
        assert!(graph.diagnostics.is_empty());
    }

    #[test]
    fn test_dangling_reference_kept() {
        let graph = extract_lineage(&[vote("vote-1", &["proposal-9"])]);
        assert!(graph.parents("vote-1").unwrap().contains("proposal-9"));
        assert!(!graph.contains("proposal-9"));
        assert_eq!(graph.dangling_references(), vec![("vote-1", "proposal-9")]);
        assert_eq!(
            graph.diagnostics,
            vec![LineageDiagnostic::DanglingReference {
                child: "vote-1".to_string(),
                parent: "proposal-9".to_string(),
            }]
        );
    }

    #[test]
    fn test_duplicate_ids_last_write_wins() {
        let graph = extract_lineage(&[vote("x", &["p1"]), vote("p1", &[]), vote("x", &["p2"])]);
        assert_eq!(graph.len(), 2);
        let parents: Vec<_> = graph.parents("x").unwrap().iter().cloned().collect();
        assert_eq!(parents, vec!["p2"]);
        assert!(graph
            .diagnostics
            .contains(&LineageDiagnostic::DuplicateCredential { id: "x".to_string() }));
    }

    #[test]
    fn test_cycle_edge_dropped() {
        let graph = extract_lineage(&[vote("a", &["b"]), vote("b", &["c"]), vote("c", &["a"])]);
        // Walk starts at "a": a -> b -> c, and c -> a closes the cycle
        assert!(graph.parents("c").unwrap().is_empty());
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(
            graph.diagnostics,
            vec![LineageDiagnostic::CycleEdgeDropped {
                child: "c".to_string(),
                parent: "a".to_string(),
            }]
        );
        assert_eq!(graph.roots(), vec!["c"]);
    }

    #[test]
    fn test_ancestors_and_children() {
        let graph = extract_lineage(&[
            vote("proposal-1", &[]),
            vote("vote-1", &["proposal-1"]),
            vote("report-a", &["proposal-1", "vote-1"]),
            vote("exec-1", &["report-a", "missing"]),
        ]);

        let ancestors = graph.ancestors("exec-1");
        let expected: BTreeSet<CredentialId> = ["report-a", "vote-1", "proposal-1", "missing"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ancestors, expected);

        let children: Vec<&str> = graph.children("proposal-1").unwrap().iter().map(String::as_str).collect();
        assert_eq!(children, vec!["report-a", "vote-1"]);
        assert!(graph.children("missing").unwrap().contains("exec-1"));
        assert!(graph.children("exec-1").is_none());
    }

    #[test]
    fn test_child_index_survives_serde() {
        let graph = extract_lineage(&[vote("proposal-1", &[]), vote("vote-1", &["proposal-1"])]);
        let json = serde_json::to_value(&graph).unwrap();
        assert!(json.get("children").is_none());

        let restored: LineageGraph = serde_json::from_value(json).unwrap();
        assert_eq!(restored, graph);
        assert!(restored.children("proposal-1").unwrap().contains("vote-1"));
    }
}
