//! # The Symbol Interpretation Graph
//!
//! An attributed directed multigraph: vertices are interpretations (inters),
//! edges are typed relations. The graph owns all mutation and keeps the local
//! invariants honest:
//!
//! - at most one Containment edge per (ensemble, member) pair;
//! - removal is logical: a removed inter stays in the arena, stripped of its
//!   edges, and never shows up in queries again;
//! - a non-manual removal that empties an ensemble removes the ensemble too
//!   (cascading one level);
//! - every mutation invalidates the caches of the directly affected vertices
//!   and refreshes their "abnormal" status.
//!
//! Inters are stored in one arena keyed by stable ids; relations are edge
//! records of (source, target, payload). All traversal is by id lookup, so
//! there are no reference cycles to manage.

pub mod ensemble;
pub mod search;
pub mod tasks;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::model::{Inter, InterId, Relation, RelationEdge, RelId};
use crate::{Error, Result};

// ============================================================================
// Sig
// ============================================================================

/// The relation graph for one system of staves. Single-writer: the graph
/// performs no locking of its own.
#[derive(Debug, Clone)]
pub struct Sig {
    inters: HashMap<InterId, Inter>,
    edges: HashMap<RelId, RelationEdge>,
    /// inter id → incident edge ids (both directions).
    adjacency: HashMap<InterId, SmallVec<[RelId; 4]>>,
    next_inter_id: u64,
    next_rel_id: u64,
}

impl Sig {
    pub fn new() -> Self {
        Self {
            inters: HashMap::new(),
            edges: HashMap::new(),
            adjacency: HashMap::new(),
            next_inter_id: 1,
            next_rel_id: 1,
        }
    }

    // ========================================================================
    // Vertex CRUD
    // ========================================================================

    /// Add an interpretation, assigning its id.
    pub fn add(&mut self, mut inter: Inter) -> InterId {
        let id = InterId(self.next_inter_id);
        self.next_inter_id += 1;
        inter.id = id;
        self.inters.insert(id, inter);
        self.adjacency.insert(id, SmallVec::new());
        id
    }

    /// Direct arena access. Panics on an id foreign to this graph; removal
    /// never drops an inter from the arena, so ids stay valid.
    pub fn inter(&self, id: InterId) -> &Inter {
        &self.inters[&id]
    }

    pub fn get(&self, id: InterId) -> Option<&Inter> {
        self.inters.get(&id).filter(|i| !i.removed)
    }

    pub fn inter_mut(&mut self, id: InterId) -> Option<&mut Inter> {
        self.inters.get_mut(&id).filter(|i| !i.removed)
    }

    /// Whether the inter is present and not removed.
    pub fn contains(&self, id: InterId) -> bool {
        self.inters.get(&id).is_some_and(|i| !i.removed)
    }

    /// Logically remove an inter: strip its edges, then cascade to any
    /// ensemble left empty by a non-manual removal (one level only).
    pub fn remove(&mut self, id: InterId) {
        self.remove_internal(id, true);
    }

    fn remove_internal(&mut self, id: InterId, cascade: bool) {
        let Some(inter) = self.inters.get_mut(&id) else {
            return;
        };
        if inter.removed {
            return;
        }

        let manual = inter.manual;
        inter.removed = true;
        debug!(inter = %id, "removing");

        // Snapshot incident edges before mutating the adjacency
        let incident: Vec<RelId> =
            self.adjacency.get(&id).map(|v| v.to_vec()).unwrap_or_default();

        let mut containers: Vec<InterId> = Vec::new();
        for rid in &incident {
            if let Some(edge) = self.edges.get(rid) {
                if edge.relation.is_containment() && edge.dst == id {
                    containers.push(edge.src);
                }
            }
        }

        for rid in incident {
            self.remove_edge(rid);
        }

        if cascade && !manual {
            for ens in containers {
                if self.contains(ens) && self.containment_members(ens).is_empty() {
                    debug!(ensemble = %ens, "ensemble emptied, removing");
                    self.remove_internal(ens, false);
                }
            }
        }
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    /// Add a typed edge. Rejects endpoints that are missing or removed, and
    /// duplicate Containment per (ensemble, member) pair.
    pub fn add_edge(&mut self, src: InterId, dst: InterId, relation: Relation) -> Result<RelId> {
        if !self.contains(src) {
            return Err(Error::UnknownInter(src));
        }
        if !self.contains(dst) {
            return Err(Error::UnknownInter(dst));
        }

        if relation.is_containment()
            && self.get_relation(src, dst, |r| r.is_containment()).is_some()
        {
            return Err(Error::DuplicateContainment { ensemble: src, member: dst });
        }

        let id = RelId(self.next_rel_id);
        self.next_rel_id += 1;
        self.edges.insert(id, RelationEdge { id, src, dst, relation });

        self.adjacency.entry(src).or_default().push(id);
        if src != dst {
            self.adjacency.entry(dst).or_default().push(id);
        }

        self.invalidate_caches(src);
        self.invalidate_caches(dst);
        self.refresh_abnormal(src);
        self.refresh_abnormal(dst);

        Ok(id)
    }

    /// Remove an edge, invalidating both endpoint caches.
    pub fn remove_edge(&mut self, id: RelId) -> Option<RelationEdge> {
        let edge = self.edges.remove(&id)?;

        if let Some(rels) = self.adjacency.get_mut(&edge.src) {
            rels.retain(|rid| *rid != id);
        }
        if edge.src != edge.dst {
            if let Some(rels) = self.adjacency.get_mut(&edge.dst) {
                rels.retain(|rid| *rid != id);
            }
        }

        self.invalidate_caches(edge.src);
        self.invalidate_caches(edge.dst);
        self.refresh_abnormal(edge.src);
        self.refresh_abnormal(edge.dst);

        Some(edge)
    }

    pub fn edge(&self, id: RelId) -> Option<&RelationEdge> {
        self.edges.get(&id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All edges incident to `id`, in both directions, matching `pred`.
    pub fn relations_of<F>(&self, id: InterId, pred: F) -> Vec<&RelationEdge>
    where
        F: Fn(&Relation) -> bool,
    {
        let mut result: Vec<&RelationEdge> = self
            .adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.edges.get(rid))
            .filter(|e| pred(&e.relation))
            .collect();
        result.sort_by_key(|e| e.id);
        result
    }

    /// Edges whose source is `id`.
    pub fn outgoing<F>(&self, id: InterId, pred: F) -> Vec<&RelationEdge>
    where
        F: Fn(&Relation) -> bool,
    {
        let mut result: Vec<&RelationEdge> = self
            .adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.edges.get(rid))
            .filter(|e| e.src == id && pred(&e.relation))
            .collect();
        result.sort_by_key(|e| e.id);
        result
    }

    /// Edges whose target is `id`.
    pub fn incoming<F>(&self, id: InterId, pred: F) -> Vec<&RelationEdge>
    where
        F: Fn(&Relation) -> bool,
    {
        let mut result: Vec<&RelationEdge> = self
            .adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.edges.get(rid))
            .filter(|e| e.dst == id && pred(&e.relation))
            .collect();
        result.sort_by_key(|e| e.id);
        result
    }

    /// First edge from `src` to `dst` matching `pred`.
    pub fn get_relation<F>(&self, src: InterId, dst: InterId, pred: F) -> Option<RelId>
    where
        F: Fn(&Relation) -> bool,
    {
        self.outgoing(src, pred).iter().find(|e| e.dst == dst).map(|e| e.id)
    }

    /// Live inters matching the filter, ordered by id for determinism.
    pub fn inters_where<F>(&self, pred: F) -> Vec<InterId>
    where
        F: Fn(&Inter) -> bool,
    {
        let mut result: Vec<InterId> = self
            .inters
            .values()
            .filter(|i| !i.removed && pred(i))
            .map(|i| i.id)
            .collect();
        result.sort();
        result
    }

    pub fn inter_count(&self) -> usize {
        self.inters.values().filter(|i| !i.removed).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ========================================================================
    // Exclusions
    // ========================================================================

    /// Raise an Exclusion between two inters, unless a NoExclusion edge
    /// already joins the pair.
    pub fn insert_exclusion(&mut self, a: InterId, b: InterId) -> Result<Option<RelId>> {
        let suppressed = self
            .relations_of(a, |r| matches!(r, Relation::NoExclusion))
            .iter()
            .any(|e| e.opposite(a) == Some(b));

        if suppressed {
            debug!(a = %a, b = %b, "exclusion suppressed by NoExclusion");
            return Ok(None);
        }

        if self.get_relation(a, b, |r| matches!(r, Relation::Exclusion)).is_some()
            || self.get_relation(b, a, |r| matches!(r, Relation::Exclusion)).is_some()
        {
            return Ok(None);
        }

        self.add_edge(a, b, Relation::Exclusion).map(Some)
    }

    /// Add a support edge unless one of the same kind already joins the pair.
    pub fn insert_support_if_absent(
        &mut self,
        src: InterId,
        dst: InterId,
        relation: Relation,
    ) -> Result<Option<RelId>> {
        let present = self
            .relations_of(src, |r| r.same_kind(&relation))
            .iter()
            .any(|e| e.opposite(src) == Some(dst));

        if present {
            return Ok(None);
        }

        self.add_edge(src, dst, relation).map(Some)
    }

    // ========================================================================
    // Caches & abnormal status
    // ========================================================================

    /// Wipe the derived caches of one vertex. Called on every mutation that
    /// touches it; reads recompute on demand.
    pub(crate) fn invalidate_caches(&mut self, id: InterId) {
        if let Some(inter) = self.inters.get_mut(&id) {
            inter.ctx_grade = None;

            if let Some(data) = inter.chord_data_mut() {
                data.head_location = None;
                data.tail_location = None;
            }
        }
    }

    /// Contextual grade: plain inters report their intrinsic grade; an
    /// ensemble reports the mean of its member contextual grades. Cached
    /// until the next membership change.
    pub fn contextual_grade(&mut self, id: InterId) -> f64 {
        if let Some(cached) = self.inters.get(&id).and_then(|i| i.ctx_grade) {
            return cached;
        }

        let grade = if self.inter(id).kind.is_ensemble() {
            let members = self.containment_members(id);

            if members.is_empty() {
                0.0
            } else {
                let sum: f64 = members.iter().map(|m| self.contextual_grade(*m)).sum();
                sum / members.len() as f64
            }
        } else {
            self.inter(id).grade
        };

        if let Some(inter) = self.inters.get_mut(&id) {
            inter.ctx_grade = Some(grade);
        }

        grade
    }

    /// Re-evaluate the "expected connection" flag after an edge change.
    /// Manual inters are never flagged.
    fn refresh_abnormal(&mut self, id: InterId) {
        use crate::model::InterKind;

        let Some(inter) = self.inters.get(&id) else {
            return;
        };
        if inter.removed || inter.manual {
            return;
        }

        let abnormal = match &inter.kind {
            InterKind::Beam { hook: false, .. } => self
                .relations_of(id, |r| matches!(r, Relation::BeamStem(_)))
                .is_empty(),
            InterKind::Stem { .. } | InterKind::Head { .. } => self
                .relations_of(id, |r| matches!(r, Relation::HeadStem(_)))
                .is_empty(),
            _ => return,
        };

        if let Some(inter) = self.inters.get_mut(&id) {
            inter.abnormal = abnormal;
        }
    }

    /// Bounds of an inter: intrinsic for glyph-backed kinds, union of member
    /// bounds for ensembles. None for an ensemble with no boundable member.
    pub fn bounds_of(&self, id: InterId) -> Option<crate::geom::Rect> {
        let inter = self.inter(id);

        if let Some(bounds) = inter.bounds {
            return Some(bounds);
        }

        let mut union: Option<crate::geom::Rect> = None;
        for member in self.containment_members(id) {
            if let Some(b) = self.bounds_of(member) {
                union = Some(match union {
                    Some(u) => u.union(&b),
                    None => b,
                });
            }
        }
        union
    }

    /// Live members of an ensemble, in containment-edge order.
    pub(crate) fn containment_members(&self, ensemble: InterId) -> Vec<InterId> {
        self.outgoing(ensemble, Relation::is_containment)
            .iter()
            .map(|e| e.dst)
            .filter(|m| self.contains(*m))
            .collect()
    }
}

impl Default for Sig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::LineSeg;
    use crate::model::Inter;

    fn beam(y: f64) -> Inter {
        Inter::new_beam(LineSeg::new(0.0, y, 40.0, y), 4.0, 0.8)
    }

    #[test]
    fn test_add_and_get() {
        let mut sig = Sig::new();
        let id = sig.add(beam(10.0));

        assert!(sig.contains(id));
        assert_eq!(sig.inter(id).id, id);
        assert_eq!(sig.inter_count(), 1);
    }

    #[test]
    fn test_remove_strips_edges() {
        let mut sig = Sig::new();
        let a = sig.add(beam(10.0));
        let b = sig.add(beam(16.0));
        sig.add_edge(a, b, Relation::BeamBeam).unwrap();

        sig.remove(a);

        assert!(!sig.contains(a));
        assert_eq!(sig.edge_count(), 0);
        assert!(sig.relations_of(b, |_| true).is_empty());
    }

    #[test]
    fn test_duplicate_containment_rejected() {
        let mut sig = Sig::new();
        let group = sig.add(Inter::new_beam_group());
        let member = sig.add(beam(10.0));

        sig.add_edge(group, member, Relation::Containment).unwrap();
        let err = sig.add_edge(group, member, Relation::Containment);

        assert!(matches!(err, Err(Error::DuplicateContainment { .. })));
    }

    #[test]
    fn test_edge_to_removed_inter_rejected() {
        let mut sig = Sig::new();
        let a = sig.add(beam(10.0));
        let b = sig.add(beam(16.0));
        sig.remove(b);

        assert!(matches!(
            sig.add_edge(a, b, Relation::BeamBeam),
            Err(Error::UnknownInter(_))
        ));
    }

    #[test]
    fn test_cascade_removes_empty_ensemble() {
        let mut sig = Sig::new();
        let group = sig.add(Inter::new_beam_group());
        let member = sig.add(beam(10.0));
        sig.add_edge(group, member, Relation::Containment).unwrap();

        sig.remove(member);

        assert!(!sig.contains(group));
    }

    #[test]
    fn test_manual_member_removal_keeps_ensemble() {
        let mut sig = Sig::new();
        let group = sig.add(Inter::new_beam_group());
        let member = sig.add(beam(10.0).with_manual(true));
        sig.add_edge(group, member, Relation::Containment).unwrap();

        sig.remove(member);

        assert!(sig.contains(group));
    }

    #[test]
    fn test_queries_skip_removed() {
        let mut sig = Sig::new();
        let a = sig.add(beam(10.0));
        let b = sig.add(beam(16.0));
        sig.remove(b);

        let live = sig.inters_where(|i| i.kind.is_beam());
        assert_eq!(live, vec![a]);
    }

    #[test]
    fn test_no_exclusion_suppresses() {
        let mut sig = Sig::new();
        let a = sig.add(beam(10.0));
        let b = sig.add(beam(16.0));

        sig.add_edge(a, b, Relation::NoExclusion).unwrap();
        let raised = sig.insert_exclusion(a, b).unwrap();

        assert!(raised.is_none());
        assert!(sig.relations_of(a, |r| matches!(r, Relation::Exclusion)).is_empty());
    }

    #[test]
    fn test_exclusion_raised_once() {
        let mut sig = Sig::new();
        let a = sig.add(beam(10.0));
        let b = sig.add(beam(16.0));

        assert!(sig.insert_exclusion(a, b).unwrap().is_some());
        assert!(sig.insert_exclusion(b, a).unwrap().is_none());
    }

    #[test]
    fn test_contextual_grade_mean() {
        let mut sig = Sig::new();
        let group = sig.add(Inter::new_beam_group());
        let b1 = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.6));
        let b2 = sig.add(Inter::new_beam(LineSeg::new(0.0, 16.0, 40.0, 16.0), 4.0, 1.0));
        sig.add_edge(group, b1, Relation::Containment).unwrap();
        sig.add_edge(group, b2, Relation::Containment).unwrap();

        assert!((sig.contextual_grade(group) - 0.8).abs() < 1e-9);

        // Cache is invalidated by membership change
        let b3 = sig.add(Inter::new_beam(LineSeg::new(0.0, 22.0, 40.0, 22.0), 4.0, 0.2));
        sig.add_edge(group, b3, Relation::Containment).unwrap();
        assert!((sig.contextual_grade(group) - 0.6).abs() < 1e-9);
    }
}
