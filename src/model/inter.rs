//! Interpretation ("inter") records.
//!
//! One flat record carries every interpretation kind: the deep class
//! hierarchy found in legacy recognizers is replaced by an `InterKind`
//! discriminant plus per-kind payloads. Kind-specific behavior is dispatched
//! by matching on the kind, never by virtual override chains.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geom::{LineSeg, Point, Rect};
use crate::system::{MeasureId, StaffId, VoiceId};

use super::shape::Shape;
use super::Rational;

// ============================================================================
// Identity
// ============================================================================

/// Opaque interpretation identifier, stable for the life of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterId(pub u64);

impl std::fmt::Display for InterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Grade impacts
// ============================================================================

/// Itemized sub-scores combined into a grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeImpacts {
    pub items: SmallVec<[Impact; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub name: String,
    pub value: f64,
    pub weight: f64,
}

impl GradeImpacts {
    pub fn new() -> Self {
        Self { items: SmallVec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64, weight: f64) {
        self.items.push(Impact { name: name.into(), value, weight });
    }

    /// Weighted mean of the item values, clamped to [0, 1].
    pub fn grade(&self) -> f64 {
        let total: f64 = self.items.iter().map(|i| i.weight).sum();

        if total == 0.0 {
            return 0.0;
        }

        let sum: f64 = self.items.iter().map(|i| i.weight * i.value).sum();
        (sum / total).clamp(0.0, 1.0)
    }
}

impl Default for GradeImpacts {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Kind payloads
// ============================================================================

/// Chord state shared by head chords and rest chords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordData {
    /// Time offset relative to the containing measure start.
    pub time_offset: Option<Rational>,
    pub voice: Option<VoiceId>,
    /// Augmentation dots impacting every note of the chord.
    pub dots: u8,
    /// Count of individual flags on the stem.
    pub flags: u8,
    pub tuplet_factor: Option<Rational>,
    pub measure: Option<MeasureId>,
    /// Cached locations, wiped by the graph on any relevant mutation.
    pub head_location: Option<Point>,
    pub tail_location: Option<Point>,
}

impl ChordData {
    pub fn new() -> Self {
        Self {
            time_offset: None,
            voice: None,
            dots: 0,
            flags: 0,
            tuplet_factor: None,
            measure: None,
            head_location: None,
            tail_location: None,
        }
    }
}

impl Default for ChordData {
    fn default() -> Self {
        Self::new()
    }
}

/// Discriminant + payload for every interpretation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterKind {
    Beam {
        /// Median line, left to right.
        median: LineSeg,
        height: f64,
        /// Beam hooks never drive grouping decisions.
        hook: bool,
        /// Cue (ornamental small) beams group with relaxed thresholds.
        cue: bool,
    },
    Stem {
        /// Median line, top to bottom.
        median: LineSeg,
    },
    Head {
        /// Pitch step position, in half line spacings from staff mid line.
        pitch: i32,
        /// Twin interpretation sharing the same glyph, if the head is split
        /// between two chords.
        mirror: Option<InterId>,
    },
    Rest,
    HeadChord(ChordData),
    RestChord(ChordData),
    BeamGroup {
        multi_staff: bool,
    },
    Key,
    Alter,
    StaffBarline,
    Barline,
}

/// Ordering applied to ensemble members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOrder {
    /// Sorted by center abscissa (keys, chords, staff barlines).
    Abscissa,
    /// Insertion order (beam groups).
    Insertion,
}

impl InterKind {
    pub fn is_ensemble(&self) -> bool {
        matches!(
            self,
            InterKind::HeadChord(_)
                | InterKind::RestChord(_)
                | InterKind::BeamGroup { .. }
                | InterKind::Key
                | InterKind::StaffBarline
        )
    }

    /// Whether a member of kind `member` may join an ensemble of this kind.
    pub fn accepts_member(&self, member: &InterKind) -> bool {
        match self {
            InterKind::BeamGroup { .. } => matches!(member, InterKind::Beam { .. }),
            InterKind::HeadChord(_) => matches!(member, InterKind::Head { .. }),
            InterKind::RestChord(_) => matches!(member, InterKind::Rest),
            InterKind::Key => matches!(member, InterKind::Alter),
            InterKind::StaffBarline => matches!(member, InterKind::Barline),
            _ => false,
        }
    }

    pub fn member_order(&self) -> MemberOrder {
        match self {
            InterKind::BeamGroup { .. } => MemberOrder::Insertion,
            _ => MemberOrder::Abscissa,
        }
    }

    pub fn is_beam(&self) -> bool {
        matches!(self, InterKind::Beam { .. })
    }

    pub fn is_chord(&self) -> bool {
        matches!(self, InterKind::HeadChord(_) | InterKind::RestChord(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            InterKind::Beam { .. } => "Beam",
            InterKind::Stem { .. } => "Stem",
            InterKind::Head { .. } => "Head",
            InterKind::Rest => "Rest",
            InterKind::HeadChord(_) => "HeadChord",
            InterKind::RestChord(_) => "RestChord",
            InterKind::BeamGroup { .. } => "BeamGroup",
            InterKind::Key => "Key",
            InterKind::Alter => "Alter",
            InterKind::StaffBarline => "StaffBarline",
            InterKind::Barline => "Barline",
        }
    }
}

// ============================================================================
// Inter
// ============================================================================

/// A candidate interpretation of a detected symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inter {
    pub id: InterId,
    pub kind: InterKind,
    pub shape: Shape,
    /// Intrinsic quality grade in [0, 1].
    pub grade: f64,
    pub impacts: Option<GradeImpacts>,
    pub staff: Option<StaffId>,
    /// Intrinsic bounds for glyph-backed inters; ensembles derive theirs
    /// from members on demand.
    pub bounds: Option<Rect>,
    /// Failed an expected-connection check; kept for later review.
    pub abnormal: bool,
    /// Created by direct user action.
    pub manual: bool,
    /// Materialized by the engine rather than by classification.
    pub implicit: bool,
    /// Protected from automatic removal.
    pub frozen: bool,
    /// Logically deleted; stays in the arena while referenced.
    pub removed: bool,
    /// Cached contextual grade, wiped on membership changes.
    pub ctx_grade: Option<f64>,
}

impl Inter {
    pub fn new(kind: InterKind, shape: Shape, grade: f64) -> Self {
        Self {
            id: InterId(0),
            kind,
            shape,
            grade,
            impacts: None,
            staff: None,
            bounds: None,
            abnormal: false,
            manual: false,
            implicit: false,
            frozen: false,
            removed: false,
            ctx_grade: None,
        }
    }

    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_staff(mut self, staff: StaffId) -> Self {
        self.staff = Some(staff);
        self
    }

    pub fn with_manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    // ------------------------------------------------------------------
    // Convenience constructors per kind
    // ------------------------------------------------------------------

    pub fn new_beam(median: LineSeg, height: f64, grade: f64) -> Self {
        let bounds = Rect::from_corners(median.p1, median.p2).grown(0.0, height / 2.0);
        Self::new(InterKind::Beam { median, height, hook: false, cue: false }, Shape::Beam, grade)
            .with_bounds(bounds)
    }

    pub fn new_beam_hook(median: LineSeg, height: f64, grade: f64) -> Self {
        let bounds = Rect::from_corners(median.p1, median.p2).grown(0.0, height / 2.0);
        Self::new(InterKind::Beam { median, height, hook: true, cue: false }, Shape::BeamHook, grade)
            .with_bounds(bounds)
    }

    pub fn new_cue_beam(median: LineSeg, height: f64, grade: f64) -> Self {
        let bounds = Rect::from_corners(median.p1, median.p2).grown(0.0, height / 2.0);
        Self::new(InterKind::Beam { median, height, hook: false, cue: true }, Shape::BeamSmall, grade)
            .with_bounds(bounds)
    }

    pub fn new_stem(median: LineSeg, grade: f64) -> Self {
        let bounds = Rect::from_corners(median.p1, median.p2).grown(1.0, 0.0);
        Self::new(InterKind::Stem { median }, Shape::Stem, grade).with_bounds(bounds)
    }

    pub fn new_head(shape: Shape, bounds: Rect, pitch: i32, grade: f64) -> Self {
        Self::new(InterKind::Head { pitch, mirror: None }, shape, grade).with_bounds(bounds)
    }

    pub fn new_rest(shape: Shape, bounds: Rect, grade: f64) -> Self {
        Self::new(InterKind::Rest, shape, grade).with_bounds(bounds)
    }

    pub fn new_head_chord() -> Self {
        Self::new(InterKind::HeadChord(ChordData::new()), Shape::None, 1.0)
    }

    pub fn new_rest_chord() -> Self {
        Self::new(InterKind::RestChord(ChordData::new()), Shape::None, 1.0)
    }

    pub fn new_beam_group() -> Self {
        Self::new(InterKind::BeamGroup { multi_staff: false }, Shape::None, 1.0)
    }

    pub fn new_key() -> Self {
        Self::new(InterKind::Key, Shape::None, 1.0)
    }

    pub fn new_alter(shape: Shape, bounds: Rect, grade: f64) -> Self {
        Self::new(InterKind::Alter, shape, grade).with_bounds(bounds)
    }

    pub fn new_staff_barline() -> Self {
        Self::new(InterKind::StaffBarline, Shape::None, 1.0)
    }

    pub fn new_barline(shape: Shape, bounds: Rect, grade: f64) -> Self {
        Self::new(InterKind::Barline, shape, grade).with_bounds(bounds)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Center of the intrinsic bounds, when present.
    pub fn center(&self) -> Option<Point> {
        self.bounds.map(|b| b.center())
    }

    /// Median line for beams and stems.
    pub fn median(&self) -> Option<LineSeg> {
        match &self.kind {
            InterKind::Beam { median, .. } | InterKind::Stem { median } => Some(*median),
            _ => None,
        }
    }

    /// Beam hook flag; false for anything that is not a beam.
    pub fn is_hook(&self) -> bool {
        matches!(self.kind, InterKind::Beam { hook: true, .. })
    }

    pub fn chord_data(&self) -> Option<&ChordData> {
        match &self.kind {
            InterKind::HeadChord(data) | InterKind::RestChord(data) => Some(data),
            _ => None,
        }
    }

    pub fn chord_data_mut(&mut self) -> Option<&mut ChordData> {
        match &mut self.kind {
            InterKind::HeadChord(data) | InterKind::RestChord(data) => Some(data),
            _ => None,
        }
    }
}
