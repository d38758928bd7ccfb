//! # omr-sig — Symbol Interpretation Graph Engine
//!
//! The resolution core of an optical music recognition pipeline: candidate
//! symbol interpretations ("inters") live in an attributed directed
//! multigraph, typed relations connect them, and a family of
//! constraint-resolution engines turns the candidates into a consistent
//! score structure.
//!
//! ## Design Principles
//!
//! 1. **One arena, stable ids**: every inter lives in the graph's arena;
//!    relations are edge records of (source, target, payload). No reference
//!    cycles, removal is trivial.
//! 2. **Flat kinds, no hierarchy**: a single `Inter` record with an
//!    `InterKind` discriminant replaces deep inheritance; behavior is
//!    dispatched by matching on the kind.
//! 3. **Mutation owns invalidation**: every graph mutation invalidates the
//!    caches of the vertices it touches; reads recompute on demand.
//! 4. **Searches never mutate**: candidate search returns `Link`s for the
//!    caller (or the editing layer) to apply.
//!
//! ## Engines
//!
//! | Engine | Module | Role |
//! |--------|--------|------|
//! | Link scorer | `sig::search` | gap-graded candidate links |
//! | Membership | `sig::ensemble` | containment-based ensembles |
//! | Beam grouping | `beam` | transitive neighbor grouping + merge |
//! | Group splitter | `beam::split` | repair of inconsistent groups |
//! | Rest resolver | `beam::rests` | rests interleaved in beam groups |
//! | Propagation | `rhythm` | time offsets and voices across chords |
//!
//! ## Quick Start
//!
//! ```rust
//! use omr_sig::{Inter, LineSeg, Scale, Sig, Skew, System};
//!
//! // One graph per system of staves
//! let mut sig = Sig::new();
//! let system = System::new(Scale::new(20.0), Skew::new(0.0));
//!
//! // Two beams close enough to group
//! let b1 = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9));
//! let b2 = sig.add(Inter::new_beam(LineSeg::new(35.0, 16.0, 90.0, 16.0), 4.0, 0.9));
//!
//! omr_sig::beam::populate_system(&mut sig, &system);
//! assert_eq!(
//!     omr_sig::beam::group_of_beam(&sig, b1),
//!     omr_sig::beam::group_of_beam(&sig, b2),
//! );
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod beam;
pub mod chord;
pub mod geom;
pub mod model;
pub mod rhythm;
pub mod scale;
pub mod sig;
pub mod system;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    BeamPortion, ChordData, GradeImpacts, HorizontalSide, Inter, InterId, InterKind, Link,
    Rational, RelId, Relation, RelationEdge, Shape, VerticalSide,
};

// ============================================================================
// Re-exports: Geometry & context
// ============================================================================

pub use geom::{LineSeg, Point, Polygon, Rect, Skew};
pub use scale::{Profile, Scale};
pub use system::{Measure, MeasureId, Staff, StaffId, System, VoiceId};

// ============================================================================
// Re-exports: The graph
// ============================================================================

pub use sig::Sig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A local invariant was broken; the offending operation is aborted and
    /// nothing was mutated.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown or removed inter: {0}")]
    UnknownInter(InterId),

    #[error("Duplicate containment between ensemble {ensemble} and member {member}")]
    DuplicateContainment { ensemble: InterId, member: InterId },

    /// The propagation guard caught a cycle in the structural edges.
    #[error("Propagation cycle detected at chord {0}")]
    CycleDetected(InterId),
}

pub type Result<T> = std::result::Result<T, Error>;
