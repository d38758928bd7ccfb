//! Read-only layout context for one system of staves.
//!
//! Staff lines, measure boundaries and sheet skew are detected by the layout
//! layer upstream; the graph engines only consume them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geom::{LineSeg, Skew};
use crate::model::InterId;
use crate::scale::Scale;
use crate::sig::Sig;
use crate::chord;

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaffId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceId(pub u32);

// ============================================================================
// Staff & Measure
// ============================================================================

/// One staff, reduced to the geometry the engines need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    /// Middle line of the staff, following the sheet skew.
    pub mid_line: LineSeg,
}

/// One measure of the system, reduced to its abscissa range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: MeasureId,
    pub left: f64,
    pub right: f64,
}

// ============================================================================
// System
// ============================================================================

/// Geometric context of one independently laid-out system of staves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub scale: Scale,
    pub skew: Skew,
    pub staves: Vec<Staff>,
    /// Measures ordered left to right.
    pub measures: Vec<Measure>,
}

impl System {
    pub fn new(scale: Scale, skew: Skew) -> Self {
        Self { scale, skew, staves: Vec::new(), measures: Vec::new() }
    }

    pub fn with_staff(mut self, staff: Staff) -> Self {
        self.staves.push(staff);
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn staff(&self, id: StaffId) -> Option<&Staff> {
        self.staves.iter().find(|s| s.id == id)
    }

    pub fn measure(&self, id: MeasureId) -> Option<&Measure> {
        self.measures.iter().find(|m| m.id == id)
    }

    /// The measure whose abscissa range covers `x`, if any.
    pub fn measure_at(&self, x: f64) -> Option<MeasureId> {
        self.measures.iter().find(|m| x >= m.left && x < m.right).map(|m| m.id)
    }
}

// ============================================================================
// Chord placement
// ============================================================================

/// Resolve the containing measure of a chord from its tail abscissa.
///
/// A chord outside every measure is logged and left unplaced; later steps
/// treat it as not yet integrated.
pub fn register_chord(sig: &mut Sig, system: &System, chord_id: InterId) {
    let Some(tail) = chord::tail_location(sig, chord_id) else {
        warn!(chord = %chord_id, "no tail location, chord left unplaced");
        return;
    };

    match system.measure_at(tail.x) {
        Some(measure) => {
            if let Some(data) = sig.inter_mut(chord_id).and_then(|i| i.chord_data_mut()) {
                data.measure = Some(measure);
            }
        }
        None => {
            warn!(chord = %chord_id, x = tail.x, "no measure found at abscissa, chord left unplaced");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Skew;

    fn system() -> System {
        System::new(Scale::new(20.0), Skew::new(0.0))
            .with_measure(Measure { id: MeasureId(0), left: 0.0, right: 200.0 })
            .with_measure(Measure { id: MeasureId(1), left: 200.0, right: 400.0 })
    }

    #[test]
    fn test_measure_at() {
        let system = system();
        assert_eq!(system.measure_at(50.0), Some(MeasureId(0)));
        assert_eq!(system.measure_at(200.0), Some(MeasureId(1)));
        assert_eq!(system.measure_at(450.0), None);
    }
}
