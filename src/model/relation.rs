//! Typed relations (edges) between interpretations.

use serde::{Deserialize, Serialize};

use crate::geom::Point;

use super::inter::InterId;

// ============================================================================
// Identity
// ============================================================================

/// Opaque relation edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Sides and portions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HorizontalSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerticalSide {
    Top,
    Bottom,
}

/// Where along a beam a stem connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeamPortion {
    Left,
    Center,
    Right,
}

// ============================================================================
// Support payloads
// ============================================================================

/// Scored beam-stem connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamStemData {
    pub grade: f64,
    /// Horizontal gap, interline fraction.
    pub dx: f64,
    /// Vertical gap, interline fraction.
    pub dy: f64,
    pub portion: BeamPortion,
    /// Point on the stem where the beam connection extends, used when the
    /// stem must be cut during a group split.
    pub extension_point: Point,
}

/// Scored head-stem connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadStemData {
    pub grade: f64,
    pub dx: f64,
    pub dy: f64,
    /// Which side of the head carries the stem.
    pub head_side: HorizontalSide,
    pub extension_point: Point,
}

// ============================================================================
// Relation
// ============================================================================

/// Edge payload. Three families: containment, exclusion, and scored support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    /// Ensemble → member ownership.
    Containment,

    /// Mutual incompatibility between two interpretations.
    Exclusion,
    /// Explicit suppression: never raise an Exclusion between this pair.
    NoExclusion,

    // Scored support kinds
    BeamStem(BeamStemData),
    HeadStem(HeadStemData),
    /// Chord → its one stem.
    ChordStem,
    /// Beam → interleaved rest, with the projection distance that won it.
    BeamRest { distance: f64 },
    /// Mutual support between beams of one group.
    BeamBeam,
    /// Alignment between a root stem and its extracted sub-stem.
    StemAlignment,
    /// Head → head tie, bound left to right.
    Tie,

    // Explicit voice edges between chords
    SameVoice,
    NextInVoice,
    SeparateVoice,
}

impl Relation {
    pub fn is_containment(&self) -> bool {
        matches!(self, Relation::Containment)
    }

    pub fn is_support(&self) -> bool {
        matches!(
            self,
            Relation::BeamStem(_)
                | Relation::HeadStem(_)
                | Relation::ChordStem
                | Relation::BeamRest { .. }
                | Relation::BeamBeam
                | Relation::StemAlignment
                | Relation::Tie
                | Relation::SameVoice
                | Relation::NextInVoice
        )
    }

    /// Grade of a scored support, when the kind carries one.
    pub fn grade(&self) -> Option<f64> {
        match self {
            Relation::BeamStem(data) => Some(data.grade),
            Relation::HeadStem(data) => Some(data.grade),
            _ => None,
        }
    }

    /// Same enum variant, payload ignored.
    pub fn same_kind(&self, other: &Relation) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Relation::Containment => "Containment",
            Relation::Exclusion => "Exclusion",
            Relation::NoExclusion => "NoExclusion",
            Relation::BeamStem(_) => "BeamStem",
            Relation::HeadStem(_) => "HeadStem",
            Relation::ChordStem => "ChordStem",
            Relation::BeamRest { .. } => "BeamRest",
            Relation::BeamBeam => "BeamBeam",
            Relation::StemAlignment => "StemAlignment",
            Relation::Tie => "Tie",
            Relation::SameVoice => "SameVoice",
            Relation::NextInVoice => "NextInVoice",
            Relation::SeparateVoice => "SeparateVoice",
        }
    }
}

// ============================================================================
// RelationEdge
// ============================================================================

/// A committed directed edge in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: RelId,
    pub src: InterId,
    pub dst: InterId,
    pub relation: Relation,
}

impl RelationEdge {
    /// The "other" end of the edge from the given inter.
    pub fn opposite(&self, from: InterId) -> Option<InterId> {
        if from == self.src {
            Some(self.dst)
        } else if from == self.dst {
            Some(self.src)
        } else {
            None
        }
    }
}

// ============================================================================
// Link
// ============================================================================

/// A candidate edge not yet committed to the graph.
///
/// `outgoing` tells whether the anchor inter would be the edge source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub partner: InterId,
    pub relation: Relation,
    pub outgoing: bool,
}

impl Link {
    pub fn new(partner: InterId, relation: Relation, outgoing: bool) -> Self {
        Self { partner, relation, outgoing }
    }

    /// (source, target) pair for the edge this link would create, anchored
    /// on `inter`.
    pub fn endpoints(&self, inter: InterId) -> (InterId, InterId) {
        if self.outgoing {
            (inter, self.partner)
        } else {
            (self.partner, inter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_opposite() {
        let edge = RelationEdge {
            id: RelId(1),
            src: InterId(10),
            dst: InterId(20),
            relation: Relation::Containment,
        };

        assert_eq!(edge.opposite(InterId(10)), Some(InterId(20)));
        assert_eq!(edge.opposite(InterId(20)), Some(InterId(10)));
        assert_eq!(edge.opposite(InterId(30)), None);
    }

    #[test]
    fn test_same_kind_ignores_payload() {
        let a = Relation::BeamRest { distance: 1.0 };
        let b = Relation::BeamRest { distance: 9.0 };
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&Relation::Containment));
    }

    #[test]
    fn test_link_endpoints() {
        let link = Link::new(InterId(5), Relation::ChordStem, true);
        assert_eq!(link.endpoints(InterId(1)), (InterId(1), InterId(5)));

        let link = Link::new(InterId(5), Relation::ChordStem, false);
        assert_eq!(link.endpoints(InterId(1)), (InterId(5), InterId(1)));
    }
}
