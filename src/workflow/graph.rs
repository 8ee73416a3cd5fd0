//! Typed directed links between documents.
//!
//! Allowed edges follow business progression:
//!
//! | source    | permitted targets            |
//! |-----------|------------------------------|
//! | quotation | contract, invoice, receipt   |
//! | contract  | invoice, receipt             |
//! | invoice   | receipt                      |
//! | receipt   | —                            |
//!
//! Because every permitted edge moves strictly forward in that order the
//! graph is acyclic by construction; [`RelationshipGraph::check_link`] still
//! verifies reachability before accepting an edge.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EdgeError, PersistenceError};
use crate::gateway::RelationshipStore;
use crate::models::{Document, DocumentType, RelationshipEdge, RelationshipType};

/// Flat edge lists keyed by document id.
///
/// Each edge is listed under both its source and its target.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: HashMap<Uuid, Vec<RelationshipEdge>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: impl IntoIterator<Item = RelationshipEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.insert(edge);
        }
        graph
    }

    /// Load every edge reachable from `roots`, in either direction.
    pub async fn load(
        store: &dyn RelationshipStore,
        roots: &[Uuid],
    ) -> Result<Self, PersistenceError> {
        let mut graph = Self::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut queue: VecDeque<Uuid> = roots.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            for edge in store.list(id).await? {
                for next in [edge.source_id, edge.target_id] {
                    if !seen.contains(&next) {
                        queue.push_back(next);
                    }
                }
                graph.insert(edge);
            }
        }

        Ok(graph)
    }

    /// Target types a document of type `source` may link to, in suggestion order.
    pub fn allowed_targets(source: DocumentType) -> &'static [DocumentType] {
        match source {
            DocumentType::Quotation => &[
                DocumentType::Contract,
                DocumentType::Invoice,
                DocumentType::Receipt,
            ],
            DocumentType::Contract => &[DocumentType::Invoice, DocumentType::Receipt],
            DocumentType::Invoice => &[DocumentType::Receipt],
            DocumentType::Receipt => &[],
        }
    }

    /// Ordered follow-up types for quick-action buttons.
    pub fn suggested_next(doc_type: DocumentType) -> Vec<DocumentType> {
        Self::allowed_targets(doc_type).to_vec()
    }

    /// Storage tag for a (source, target) pair, or `None` if the pair is not permitted.
    ///
    /// All edges into a receipt collapse to [`RelationshipType::ToReceipt`].
    pub fn relationship_type(source: DocumentType, target: DocumentType) -> Option<RelationshipType> {
        if !Self::allowed_targets(source).contains(&target) {
            return None;
        }
        match (source, target) {
            (_, DocumentType::Receipt) => Some(RelationshipType::ToReceipt),
            (DocumentType::Quotation, DocumentType::Contract) => {
                Some(RelationshipType::QuotationToContract)
            }
            (DocumentType::Quotation, DocumentType::Invoice) => {
                Some(RelationshipType::QuotationToInvoice)
            }
            (DocumentType::Contract, DocumentType::Invoice) => {
                Some(RelationshipType::ContractToInvoice)
            }
            _ => None,
        }
    }

    /// Check a prospective edge against the type table.
    pub fn validate(source: &Document, target: &Document) -> Result<RelationshipType, EdgeError> {
        if source.id == target.id {
            return Err(EdgeError::IdentityEdge);
        }
        Self::relationship_type(source.doc_type, target.doc_type)
            .ok_or_else(|| EdgeError::not_permitted(source.doc_type, target.doc_type))
    }

    /// [`validate`](Self::validate) plus checks against the edges already in the graph.
    pub fn check_link(
        &self,
        source: &Document,
        target: &Document,
    ) -> Result<RelationshipType, EdgeError> {
        let relationship_type = Self::validate(source, target)?;

        if self
            .outgoing(source.id)
            .any(|edge| edge.target_id == target.id)
        {
            return Err(EdgeError::DuplicateEdge);
        }
        if self.reaches(target.id, source.id) {
            return Err(EdgeError::CycleDetected);
        }

        Ok(relationship_type)
    }

    /// Validate and record a new edge.
    pub fn link(
        &mut self,
        source: &Document,
        target: &Document,
        now: DateTime<Utc>,
    ) -> Result<RelationshipEdge, EdgeError> {
        let relationship_type = self.check_link(source, target)?;
        let edge = RelationshipEdge {
            id: Uuid::new_v4(),
            source_id: source.id,
            target_id: target.id,
            relationship_type,
            created_at: now,
        };
        self.insert(edge.clone());
        Ok(edge)
    }

    pub fn insert(&mut self, edge: RelationshipEdge) {
        for id in [edge.source_id, edge.target_id] {
            let list = self.edges.entry(id).or_default();
            if !list.iter().any(|e| e.id == edge.id) {
                list.push(edge.clone());
            }
        }
    }

    pub fn remove(&mut self, edge_id: Uuid) -> Option<RelationshipEdge> {
        let mut removed = None;
        for list in self.edges.values_mut() {
            if let Some(pos) = list.iter().position(|e| e.id == edge_id) {
                removed = Some(list.remove(pos));
            }
        }
        self.edges.retain(|_, list| !list.is_empty());
        removed
    }

    /// All edges where `id` is the source or the target.
    pub fn edges_for(&self, id: Uuid) -> &[RelationshipEdge] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every document id that appears on at least one edge.
    pub fn document_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.edges.keys().copied()
    }

    pub fn outgoing(&self, id: Uuid) -> impl Iterator<Item = &RelationshipEdge> {
        self.edges_for(id).iter().filter(move |e| e.source_id == id)
    }

    /// Whether `to` is reachable from `from` along outgoing edges.
    pub fn reaches(&self, from: Uuid, to: Uuid) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.outgoing(id).map(|e| e.target_id));
        }
        false
    }

    /// Reconstruct the linear workflow for display.
    ///
    /// Starts at the first quotation or contract in `documents` and follows
    /// the first outgoing edge of each document. Stops when a document has no
    /// outgoing edge or an edge points at a document not in `documents`.
    pub fn workflow_path<'a>(&self, documents: &'a [Document]) -> Vec<&'a Document> {
        let by_id: HashMap<Uuid, &Document> = documents.iter().map(|d| (d.id, d)).collect();

        let Some(start) = documents
            .iter()
            .find(|d| matches!(d.doc_type, DocumentType::Quotation | DocumentType::Contract))
        else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut visited = HashSet::from([start.id]);
        let mut current = start.id;

        while let Some(edge) = self.outgoing(current).next() {
            let Some(next) = by_id.get(&edge.target_id) else {
                break;
            };
            if !visited.insert(next.id) {
                break;
            }
            path.push(next);
            current = next.id;
        }

        path
    }
}
