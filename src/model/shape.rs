//! Shape tags assigned by the upstream classifier.
//!
//! Only the shapes the graph engines reason about are listed here; the
//! classifier's full palette stays upstream.

use serde::{Deserialize, Serialize};

use super::Rational;

/// Shape tag of an interpretation, as produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    // Note heads
    NoteheadBlack,
    NoteheadVoid,
    WholeNote,

    // Rests
    RestWhole,
    RestHalf,
    RestQuarter,
    RestEighth,
    Rest16th,
    Rest32nd,

    // Beams
    Beam,
    BeamHook,
    BeamSmall,

    // Stems and alterations
    Stem,
    Sharp,
    Flat,
    Natural,

    // Barlines
    ThinBarline,
    ThickBarline,

    // Ensembles have no glyph of their own
    None,
}

impl Shape {
    /// Intrinsic duration of the shape, before beam/flag/dot/tuplet impact.
    /// None for non-note shapes.
    pub fn intrinsic_duration(self) -> Option<Rational> {
        match self {
            Shape::WholeNote | Shape::RestWhole => Some(Rational::new(1, 1)),
            Shape::NoteheadVoid | Shape::RestHalf => Some(Rational::new(1, 2)),
            Shape::NoteheadBlack | Shape::RestQuarter => Some(Rational::new(1, 4)),
            Shape::RestEighth => Some(Rational::new(1, 8)),
            Shape::Rest16th => Some(Rational::new(1, 16)),
            Shape::Rest32nd => Some(Rational::new(1, 32)),
            _ => None,
        }
    }

    pub fn is_rest(self) -> bool {
        matches!(
            self,
            Shape::RestWhole
                | Shape::RestHalf
                | Shape::RestQuarter
                | Shape::RestEighth
                | Shape::Rest16th
                | Shape::Rest32nd
        )
    }

    /// A whole rest spans its whole measure, whatever the time signature.
    pub fn is_measure_rest(self) -> bool {
        matches!(self, Shape::RestWhole)
    }

    pub fn is_head(self) -> bool {
        matches!(self, Shape::NoteheadBlack | Shape::NoteheadVoid | Shape::WholeNote)
    }

    pub fn is_beam(self) -> bool {
        matches!(self, Shape::Beam | Shape::BeamHook | Shape::BeamSmall)
    }
}
