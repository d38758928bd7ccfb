//! Chord-level queries over the graph.
//!
//! A chord is an ensemble of notes (or one rest) sharing a time slot, plus
//! at most one stem reached through a ChordStem edge. Everything here reads
//! the graph; the only mutations are `set_stem` and `duplicate`, both used
//! by the group splitter.

use tracing::debug;

use crate::geom::Point;
use crate::model::{Inter, InterId, InterKind, Rational, RelId, Relation};
use crate::sig::{ensemble, Sig};
use crate::Result;

// ============================================================================
// Structure
// ============================================================================

/// Notes (or the single rest) of the chord, ordered by abscissa.
pub fn notes(sig: &Sig, chord: InterId) -> Vec<InterId> {
    ensemble::members(sig, chord)
}

/// The chord owning this note or rest, if any.
pub fn chord_of_note(sig: &Sig, note: InterId) -> Option<InterId> {
    ensemble::containing_ensembles(sig, note)
        .into_iter()
        .find(|e| sig.inter(*e).kind.is_chord())
}

/// The stem of the chord, reached through its ChordStem edge.
pub fn stem_of(sig: &Sig, chord: InterId) -> Option<InterId> {
    sig.outgoing(chord, |r| matches!(r, Relation::ChordStem))
        .first()
        .map(|e| e.dst)
}

/// Attach a stem to the chord, replacing any previous one.
pub fn set_stem(sig: &mut Sig, chord: InterId, stem: InterId) -> Result<RelId> {
    let previous: Vec<RelId> = sig
        .outgoing(chord, |r| matches!(r, Relation::ChordStem))
        .iter()
        .map(|e| e.id)
        .collect();

    for rel in previous {
        sig.remove_edge(rel);
    }

    sig.add_edge(chord, stem, Relation::ChordStem)
}

/// Beams linked to a stem, in edge order.
pub fn beams_of_stem(sig: &Sig, stem: InterId) -> Vec<InterId> {
    sig.relations_of(stem, |r| matches!(r, Relation::BeamStem(_)))
        .iter()
        .filter_map(|e| e.opposite(stem))
        .filter(|b| sig.contains(*b))
        .collect()
}

/// Beams of the chord, ordered from the stem tail toward the heads.
pub fn beams(sig: &Sig, chord: InterId) -> Vec<InterId> {
    let Some(stem) = stem_of(sig, chord) else {
        return Vec::new();
    };
    let mut list = beams_of_stem(sig, stem);

    if let Some(tail) = tail_location(sig, chord) {
        let stem_x = sig
            .inter(stem)
            .median()
            .map(|m| m.midpoint().x)
            .unwrap_or(tail.x);

        list.sort_by(|a, b| {
            let da = beam_tail_distance(sig, *a, stem_x, tail.y);
            let db = beam_tail_distance(sig, *b, stem_x, tail.y);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(b))
        });
    }

    list
}

fn beam_tail_distance(sig: &Sig, beam: InterId, x: f64, tail_y: f64) -> f64 {
    sig.inter(beam)
        .median()
        .map(|m| (m.y_at_x(x) - tail_y).abs())
        .unwrap_or(f64::MAX)
}

// ============================================================================
// Geometry
// ============================================================================

/// Location of the head farthest from the stem tail. Cached until the next
/// mutation touching the chord.
pub fn head_location(sig: &Sig, chord: InterId) -> Option<Point> {
    if let Some(cached) = sig.inter(chord).chord_data().and_then(|d| d.head_location) {
        return Some(cached);
    }
    compute_locations(sig, chord).map(|(head, _)| head)
}

/// Location of the stem tail; for stemless chords, the leading note center.
pub fn tail_location(sig: &Sig, chord: InterId) -> Option<Point> {
    if let Some(cached) = sig.inter(chord).chord_data().and_then(|d| d.tail_location) {
        return Some(cached);
    }
    compute_locations(sig, chord).map(|(_, tail)| tail)
}

/// Recompute and cache both locations after a structural change.
pub fn refresh_locations(sig: &mut Sig, chord: InterId) {
    let computed = compute_locations(sig, chord);

    if let Some(data) = sig.inter_mut(chord).and_then(Inter::chord_data_mut) {
        data.head_location = computed.map(|(h, _)| h);
        data.tail_location = computed.map(|(_, t)| t);
    }
}

fn compute_locations(sig: &Sig, chord: InterId) -> Option<(Point, Point)> {
    let members = notes(sig, chord);
    let centers: Vec<Point> =
        members.iter().filter_map(|n| sig.inter(*n).center()).collect();

    if centers.is_empty() {
        return None;
    }

    let Some(stem) = stem_of(sig, chord) else {
        // No stem: head and tail collapse on the leading note
        let leading = centers[0];
        return Some((leading, leading));
    };

    let median = sig.inter(stem).median()?;
    let mean_y = centers.iter().map(|c| c.y).sum::<f64>() / centers.len() as f64;

    // Tail is the stem end farther from the note heads
    let tail = if (median.p1.y - mean_y).abs() > (median.p2.y - mean_y).abs() {
        median.p1
    } else {
        median.p2
    };

    // Head is the note center farthest from the tail
    let head = centers
        .into_iter()
        .max_by(|a, b| {
            let da = (a.y - tail.y).abs();
            let db = (b.y - tail.y).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(tail);

    Some((head, tail))
}

/// Stem direction as the head-to-tail ordinate sign: -1 when the stem points
/// up, +1 down, 0 for a stemless chord.
pub fn stem_dir(sig: &Sig, chord: InterId) -> i32 {
    match (head_location(sig, chord), tail_location(sig, chord)) {
        (Some(head), Some(tail)) => {
            if tail.y < head.y {
                -1
            } else if tail.y > head.y {
                1
            } else {
                0
            }
        }
        _ => 0,
    }
}

/// Sorting abscissa of any inter: bounds center, members union for
/// ensembles.
pub fn abscissa(sig: &Sig, id: InterId) -> f64 {
    sig.bounds_of(id).map(|b| b.center().x).unwrap_or(0.0)
}

/// Chord box including its stem, the full vertical reach of the chord.
pub fn full_box(sig: &Sig, chord: InterId) -> Option<crate::geom::Rect> {
    let mut full = sig.bounds_of(chord);

    if let Some(stem) = stem_of(sig, chord) {
        if let Some(stem_box) = sig.inter(stem).bounds {
            full = Some(match full {
                Some(b) => b.union(&stem_box),
                None => stem_box,
            });
        }
    }

    full
}

// ============================================================================
// Duration
// ============================================================================

pub fn is_rest_chord(sig: &Sig, chord: InterId) -> bool {
    matches!(sig.inter(chord).kind, InterKind::RestChord(_))
}

/// Whether the chord is a measure-spanning rest.
pub fn is_whole_rest(sig: &Sig, chord: InterId) -> bool {
    is_rest_chord(sig, chord)
        && notes(sig, chord)
            .first()
            .is_some_and(|n| sig.inter(*n).shape.is_measure_rest())
}

/// Duration from note shape and beams/flags, before dots and tuplet.
///
/// All notes of one chord share the same intrinsic duration; the first
/// member speaks for all. A mirrored void head on a beamed side counts as a
/// black head.
pub fn duration_sans_dot_or_tuplet(sig: &Sig, chord: InterId) -> Option<Rational> {
    let members = notes(sig, chord);
    let note = *members.first()?;
    let inter = sig.inter(note);
    let shape = inter.shape;

    let mut dur = shape.intrinsic_duration()?;

    if !shape.is_rest() {
        let beam_count = beams(sig, chord).len() as u32;
        let flag_count = sig
            .inter(chord)
            .chord_data()
            .map(|d| d.flags as u32)
            .unwrap_or(0);
        let fbn = beam_count + flag_count;

        if fbn > 0 {
            let mirrored = matches!(inter.kind, InterKind::Head { mirror: Some(_), .. });
            if shape == crate::model::Shape::NoteheadVoid && mirrored {
                dur = crate::model::Shape::NoteheadBlack.intrinsic_duration()?;
            }

            for _ in 0..fbn {
                dur /= 2;
            }
        }
    }

    Some(dur)
}

/// Duration with dots applied, still without the tuplet factor.
pub fn duration_sans_tuplet(sig: &Sig, chord: InterId) -> Option<Rational> {
    let sans_dot = duration_sans_dot_or_tuplet(sig, chord)?;
    let dots = sig.inter(chord).chord_data().map(|d| d.dots).unwrap_or(0);

    Some(match dots {
        1 => sans_dot * Rational::new(3, 2),
        2 => sans_dot * Rational::new(7, 4),
        _ => sans_dot,
    })
}

/// Real chord duration including the tuplet impact.
/// None for a measure-spanning rest.
pub fn duration(sig: &Sig, chord: InterId) -> Option<Rational> {
    if is_whole_rest(sig, chord) {
        return None;
    }

    let sans_tuplet = duration_sans_tuplet(sig, chord)?;

    match sig.inter(chord).chord_data().and_then(|d| d.tuplet_factor) {
        Some(factor) => Some(sans_tuplet * factor),
        None => Some(sans_tuplet),
    }
}

/// Time when the chord ends, since the beginning of its measure.
pub fn end_time(sig: &Sig, chord: InterId) -> Option<Rational> {
    let offset = sig.inter(chord).chord_data()?.time_offset?;
    Some(offset + duration(sig, chord)?)
}

// ============================================================================
// Ties
// ============================================================================

/// Chords directly tied to the right of this chord, ordered by abscissa.
pub fn following_tied_chords(sig: &Sig, chord: InterId) -> Vec<InterId> {
    let mut tied: Vec<InterId> = Vec::new();

    for note in notes(sig, chord) {
        for edge in sig.outgoing(note, |r| matches!(r, Relation::Tie)) {
            if let Some(next) = chord_of_note(sig, edge.dst) {
                if !tied.contains(&next) {
                    tied.push(next);
                }
            }
        }
    }

    tied.sort_by(|a, b| {
        abscissa(sig, *a)
            .partial_cmp(&abscissa(sig, *b))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });

    tied
}

// ============================================================================
// Duplication
// ============================================================================

/// Clone a head chord for a group split: notes are duplicated and mirrored,
/// but the clone starts with no stem and no beams. Time and voice are left
/// unset on the clone.
pub fn duplicate(sig: &mut Sig, chord: InterId) -> Result<InterId> {
    debug!(chord = %chord, "duplicating chord");

    let mut clone = Inter::new_head_chord();
    if let (Some(clone_data), Some(data)) =
        (clone.chord_data_mut(), sig.inter(chord).chord_data())
    {
        clone_data.dots = data.dots;
        clone_data.flags = data.flags;
        clone_data.tuplet_factor = data.tuplet_factor;
        clone_data.measure = data.measure;
    }
    clone.staff = sig.inter(chord).staff;

    let clone_id = sig.add(clone);

    for note in notes(sig, chord) {
        let mut twin = sig.inter(note).clone();
        twin.removed = false;
        twin.ctx_grade = None;

        if let InterKind::Head { mirror, .. } = &mut twin.kind {
            *mirror = Some(note);
        }

        let twin_id = sig.add(twin);

        if let Some(original) = sig.inter_mut(note) {
            if let InterKind::Head { mirror, .. } = &mut original.kind {
                *mirror = Some(twin_id);
            }
        }

        ensemble::add_member(sig, clone_id, twin_id)?;
    }

    Ok(clone_id)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{LineSeg, Rect};
    use crate::model::Shape;

    /// A quarter-or-shorter chord: one black head at (x, y), stem going up.
    fn stemmed_chord(sig: &mut Sig, x: f64, head_y: f64, tail_y: f64) -> InterId {
        let chord = sig.add(Inter::new_head_chord());
        let head = sig.add(Inter::new_head(
            Shape::NoteheadBlack,
            Rect::new(x - 6.0, head_y - 5.0, 12.0, 10.0),
            0,
            0.9,
        ));
        ensemble::add_member(sig, chord, head).unwrap();

        let stem = sig.add(Inter::new_stem(
            LineSeg::new(x + 6.0, tail_y.min(head_y), x + 6.0, tail_y.max(head_y)),
            0.9,
        ));
        set_stem(sig, chord, stem).unwrap();
        chord
    }

    #[test]
    fn test_locations_and_direction() {
        let mut sig = Sig::new();
        let up = stemmed_chord(&mut sig, 100.0, 80.0, 20.0);

        let head = head_location(&sig, up).unwrap();
        let tail = tail_location(&sig, up).unwrap();
        assert!(tail.y < head.y);
        assert_eq!(stem_dir(&sig, up), -1);

        let down = stemmed_chord(&mut sig, 200.0, 20.0, 80.0);
        assert_eq!(stem_dir(&sig, down), 1);
    }

    #[test]
    fn test_duration_with_beams_and_dots() {
        let mut sig = Sig::new();
        let chord = stemmed_chord(&mut sig, 100.0, 80.0, 20.0);

        // Plain black head: quarter
        assert_eq!(duration(&sig, chord), Some(Rational::new(1, 4)));

        // One beam halves it
        let stem = stem_of(&sig, chord).unwrap();
        let beam = sig.add(Inter::new_beam(LineSeg::new(80.0, 22.0, 160.0, 22.0), 4.0, 0.9));
        sig.add_edge(
            beam,
            stem,
            Relation::BeamStem(crate::model::BeamStemData {
                grade: 0.9,
                dx: 0.0,
                dy: 0.0,
                portion: crate::model::BeamPortion::Left,
                extension_point: Point::new(106.0, 22.0),
            }),
        )
        .unwrap();
        assert_eq!(duration(&sig, chord), Some(Rational::new(1, 8)));

        // One dot: x 3/2
        if let Some(data) = sig.inter_mut(chord).and_then(Inter::chord_data_mut) {
            data.dots = 1;
        }
        assert_eq!(duration(&sig, chord), Some(Rational::new(3, 16)));

        // Two dots: x 7/4 of the undotted value
        if let Some(data) = sig.inter_mut(chord).and_then(Inter::chord_data_mut) {
            data.dots = 2;
        }
        assert_eq!(duration(&sig, chord), Some(Rational::new(7, 32)));
    }

    #[test]
    fn test_whole_rest_has_no_duration() {
        let mut sig = Sig::new();
        let chord = sig.add(Inter::new_rest_chord());
        let rest = sig.add(Inter::new_rest(
            Shape::RestWhole,
            Rect::new(100.0, 40.0, 12.0, 8.0),
            0.9,
        ));
        ensemble::add_member(&mut sig, chord, rest).unwrap();

        assert!(is_whole_rest(&sig, chord));
        assert_eq!(duration(&sig, chord), None);
    }

    #[test]
    fn test_following_tied_chords() {
        let mut sig = Sig::new();
        let left = stemmed_chord(&mut sig, 100.0, 80.0, 20.0);
        let right = stemmed_chord(&mut sig, 200.0, 80.0, 20.0);

        let left_note = notes(&sig, left)[0];
        let right_note = notes(&sig, right)[0];
        sig.add_edge(left_note, right_note, Relation::Tie).unwrap();

        assert_eq!(following_tied_chords(&sig, left), vec![right]);
        assert!(following_tied_chords(&sig, right).is_empty());
    }

    #[test]
    fn test_duplicate_mirrors_notes() {
        let mut sig = Sig::new();
        let chord = stemmed_chord(&mut sig, 100.0, 80.0, 20.0);
        let note = notes(&sig, chord)[0];

        let clone = duplicate(&mut sig, chord).unwrap();
        let clone_notes = notes(&sig, clone);
        assert_eq!(clone_notes.len(), 1);

        let InterKind::Head { mirror, .. } = sig.inter(clone_notes[0]).kind else {
            panic!("expected head");
        };
        assert_eq!(mirror, Some(note));

        let InterKind::Head { mirror, .. } = sig.inter(note).kind else {
            panic!("expected head");
        };
        assert_eq!(mirror, Some(clone_notes[0]));

        // Clone has no stem of its own
        assert!(stem_of(&sig, clone).is_none());
    }
}
