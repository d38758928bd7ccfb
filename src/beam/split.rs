//! Beam group splitter.
//!
//! A group is inconsistent when one of its chords sits vertically too far
//! from a beam that abscissa-overlaps it without being attached to it: two
//! separate groups were glued together by the sweep. The splitter
//! restructures the group around the pivot chord shared by both sides.

use tracing::{debug, warn};

use crate::chord;
use crate::geom::LineSeg;
use crate::model::{Inter, InterId, InterKind, Relation};
use crate::sig::{ensemble, Sig};
use crate::system::System;

use super::{chords_of_beam, group_chords, switch_to_group};

/// Maximum vertical gap between a chord and a beam, interline fraction.
const MAX_CHORD_DY: f64 = 0.5;

// ============================================================================
// Detection
// ============================================================================

/// Run the consistency check on a group and report the alien chord that
/// requires a split, if any.
pub fn check_for_split(sig: &Sig, system: &System, group: InterId) -> Option<InterId> {
    for chord_id in group_chords(sig, group) {
        let Some(chord_box) = chord::full_box(sig, chord_id) else {
            continue;
        };
        let Some(tail) = chord::tail_location(sig, chord_id) else {
            continue;
        };
        let attached = chord::beams(sig, chord_id);

        // Questionable beams: group members overlapping the chord abscissa
        // without touching it vertically, and not attached to it
        let mut questionable: Vec<InterId> = Vec::new();

        for beam in ensemble::members(sig, group) {
            let inter = sig.inter(beam);

            if inter.is_hook() || attached.contains(&beam) {
                continue;
            }
            let (Some(median), Some(beam_box)) = (inter.median(), inter.bounds) else {
                continue;
            };
            if beam_box.x_overlap(&chord_box) <= 0.0 {
                continue;
            }

            let line_y = median.y_at_x(tail.x);
            let y_overlap =
                line_y.min(chord_box.bottom()) - line_y.max(chord_box.y);

            if y_overlap < 0.0 {
                questionable.push(beam);
            }
        }

        if questionable.is_empty() {
            continue; // No problem found around the chord at hand
        }

        // Nearest questionable beam, measured at the chord tail abscissa
        questionable.sort_by(|a, b| {
            let da = tail_distance(sig, *a, tail.x, tail.y);
            let db = tail_distance(sig, *b, tail.x, tail.y);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });

        let nearest = questionable[0];
        let tail_dy = tail_distance(sig, nearest, tail.x, tail.y);
        let normed_dy = system.scale.pixels_to_frac(tail_dy);

        if normed_dy > MAX_CHORD_DY {
            debug!(
                chord = %chord_id, beam = %nearest, normed_dy,
                "vertical gap requires group split",
            );
            return Some(chord_id);
        }
    }

    None // Everything is consistent
}

fn tail_distance(sig: &Sig, beam: InterId, x: f64, tail_y: f64) -> f64 {
    sig.inter(beam)
        .median()
        .map(|m| (m.y_at_x(x) - tail_y).abs())
        .unwrap_or(f64::MAX)
}

// ============================================================================
// Split
// ============================================================================

/// Split `group` around the detected `alien_chord`: some beams move to a
/// new group, and the pivot chord shared by both sides is itself split.
pub fn split_group(sig: &mut Sig, system: &System, group: InterId, alien_chord: InterId) {
    debug!(group = %group, alien = %alien_chord, "splitting beam group");

    // 1. New group on the alien chord side: every beam attached to the
    //    alien chord moves there
    let alien_beams = chord::beams(sig, alien_chord);
    let alien_group = sig.add(Inter::new_beam_group());

    for &beam in &alien_beams {
        switch_to_group(sig, beam, alien_group);
    }

    // 2. Pivot chord: the chord still shared between the two groups
    let old_chords = group_chords(sig, group);
    let alien_chords = group_chords(sig, alien_group);
    let pivot = old_chords
        .iter()
        .find(|c| alien_chords.contains(c))
        .copied()
        .unwrap_or_else(|| {
            panic!("no pivot chord between split groups {group} and {alien_group}")
        });

    // 3. Dispatch the beams attached to the pivot chord
    dispatch_pivot_beams(sig, alien_group, &alien_beams, alien_chord, pivot);

    // 4. Any remaining beam connected to the alien side follows it
    dispatch_all_beams(sig, group, alien_group, pivot);

    // 5. Split the pivot chord between the two groups
    split_chord(sig, system, group, alien_group, &alien_beams, pivot);
}

/// Walk the pivot beams from tail to head; the alien tail beam delimits the
/// alien side, and every non-alien beam on that side moves over.
fn dispatch_pivot_beams(
    sig: &mut Sig,
    alien_group: InterId,
    alien_beams: &[InterId],
    alien_chord: InterId,
    pivot: InterId,
) {
    let Some(&alien_tail_beam) = chord::beams(sig, alien_chord).first() else {
        return;
    };
    let pivot_beams = chord::beams(sig, pivot);
    let mut on_alien_side: Option<bool> = None;

    for (ib, &beam) in pivot_beams.iter().enumerate() {
        if sig.inter(beam).is_hook() {
            continue;
        }

        if on_alien_side.is_none() {
            on_alien_side = Some(alien_beams.contains(&beam));
        }

        if beam == alien_tail_beam {
            let side = if on_alien_side == Some(true) {
                // Alien side runs from tail down to this beam
                &pivot_beams[..=ib]
            } else {
                // Alien side starts at this beam
                &pivot_beams[ib..]
            };

            for &moved in side {
                if !alien_beams.contains(&moved) {
                    switch_to_group(sig, moved, alien_group);
                }
            }

            return;
        }
    }
}

/// Move to the alien group every old-group beam, not attached to the pivot,
/// whose chords already touch an alien beam.
fn dispatch_all_beams(sig: &mut Sig, group: InterId, alien_group: InterId, pivot: InterId) {
    let pivot_beams = chord::beams(sig, pivot);

    'all: for beam in ensemble::members(sig, group) {
        if pivot_beams.contains(&beam) {
            continue;
        }

        for chord_id in chords_of_beam(sig, beam) {
            for other in chord::beams(sig, chord_id) {
                if super::group_of_beam(sig, other) == Some(alien_group) {
                    switch_to_group(sig, beam, alien_group);
                    continue 'all;
                }
            }
        }
    }
}

/// Duplicate the pivot chord between the two groups.
///
/// The group at the tail of the pivot stem keeps the original chord and
/// stem; the group closer to the heads gets a clone on a short stem cut at
/// the extension point of its tail-most beam.
fn split_chord(
    sig: &mut Sig,
    system: &System,
    group: InterId,
    alien_group: InterId,
    alien_beams: &[InterId],
    pivot: InterId,
) {
    debug!(pivot = %pivot, "splitting pivot chord");

    let Some(pivot_stem) = chord::stem_of(sig, pivot) else {
        warn!(pivot = %pivot, "pivot chord has no stem, split incomplete");
        return;
    };
    let pivot_beams = chord::beams(sig, pivot);
    if pivot_beams.is_empty() {
        return;
    }

    let short_chord = match chord::duplicate(sig, pivot) {
        Ok(id) => id,
        Err(err) => {
            warn!(pivot = %pivot, %err, "cannot duplicate pivot chord");
            return;
        }
    };

    // Beams closer to the tail stay with the pivot chord and its long stem;
    // beams closer to the heads migrate to the short chord and stem
    let aliens_at_tail = alien_beams.contains(&pivot_beams[0]);
    let mut head_beams: Vec<InterId> = if aliens_at_tail {
        ensemble::members(sig, group)
    } else {
        alien_beams.to_vec()
    };

    // Tail end of the short stem: walk the pivot beams from tail to head,
    // picking up trailing hooks along the way
    let mut first_head_beam: Option<InterId> = None;

    for (i, &beam) in pivot_beams.iter().enumerate() {
        if head_beams.contains(&beam) {
            first_head_beam = Some(beam);

            for &b in &pivot_beams[i + 1..] {
                if sig.inter(b).is_hook() && !head_beams.contains(&b) {
                    head_beams.push(b);
                }
            }

            break;
        }
    }

    let Some(first_head_beam) = first_head_beam else {
        warn!(pivot = %pivot, "no head-side beam found, split incomplete");
        return;
    };

    // Cut ordinate comes from the recorded extension point
    let y_stop = sig
        .get_relation(first_head_beam, pivot_stem, |r| matches!(r, Relation::BeamStem(_)))
        .or_else(|| {
            sig.get_relation(pivot_stem, first_head_beam, |r| {
                matches!(r, Relation::BeamStem(_))
            })
        })
        .and_then(|rel| sig.edge(rel).map(|e| e.relation.clone()))
        .and_then(|r| match r {
            Relation::BeamStem(data) => Some(data.extension_point.y),
            _ => None,
        })
        .unwrap_or_else(|| {
            let median = sig.inter(first_head_beam).median();
            let x = chord::tail_location(sig, pivot).map(|t| t.x).unwrap_or(0.0);
            median.map(|m| m.y_at_x(x)).unwrap_or(0.0)
        });

    let Some(short_stem) = extract_short_stem(sig, pivot, y_stop) else {
        warn!(pivot = %pivot, "cannot extract short stem, split incomplete");
        return;
    };

    if let Err(err) = chord::set_stem(sig, short_chord, short_stem) {
        warn!(%err, "cannot attach short stem");
        return;
    }
    let _ = sig.add_edge(short_stem, pivot_stem, Relation::StemAlignment);

    // Re-create head-stem connections of the mirrored heads on the short stem
    for note in chord::notes(sig, short_chord) {
        let InterKind::Head { mirror: Some(mirror), .. } = sig.inter(note).kind else {
            continue;
        };

        let head_stems: Vec<Relation> = sig
            .relations_of(mirror, |r| matches!(r, Relation::HeadStem(_)))
            .iter()
            .map(|e| e.relation.clone())
            .collect();

        for relation in head_stems {
            let _ = sig.add_edge(note, short_stem, relation);
        }
    }

    // Reassigned beams leave the pivot stem for the short stem, without a
    // spurious exclusion between the now-parallel interpretations
    for &beam in &head_beams {
        let _ = sig.add_edge(beam, pivot_stem, Relation::NoExclusion);

        let moved = sig
            .get_relation(beam, pivot_stem, |r| matches!(r, Relation::BeamStem(_)))
            .and_then(|rel| sig.remove_edge(rel));

        if let Some(edge) = moved {
            let _ = sig.add_edge(beam, short_stem, edge.relation);
        }
    }

    chord::refresh_locations(sig, pivot);
    chord::refresh_locations(sig, short_chord);

    crate::system::register_chord(sig, system, short_chord);

    debug!(
        pivot = %pivot, short = %short_chord, group = %group, alien = %alien_group,
        "pivot chord split",
    );
}

/// New stem spanning the head-side portion of the chord's root stem, cut at
/// `y_stop`.
fn extract_short_stem(sig: &mut Sig, chord_id: InterId, y_stop: f64) -> Option<InterId> {
    let dir = chord::stem_dir(sig, chord_id);
    let root = chord::stem_of(sig, chord_id)?;
    let median = sig.inter(root).median()?;

    // Head-side end of the root stem
    let y_start = if dir > 0 { median.y1() } else { median.y2() };

    let top = y_start.min(y_stop);
    let bottom = y_start.max(y_stop);
    let sub = LineSeg::new(median.x_at_y(top), top, median.x_at_y(bottom), bottom);

    let mut stem = Inter::new_stem(sub, sig.inter(root).grade);
    stem.implicit = true;
    stem.staff = sig.inter(root).staff;

    Some(sig.add(stem))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Rect, Skew};
    use crate::scale::Scale;

    fn test_system() -> System {
        System::new(Scale::new(20.0), Skew::new(0.0))
    }

    #[test]
    fn test_extract_short_stem_up() {
        let mut sig = Sig::new();
        let chord_id = sig.add(Inter::new_head_chord());
        let head = sig.add(Inter::new_head(
            crate::model::Shape::NoteheadBlack,
            Rect::new(294.0, 215.0, 12.0, 10.0),
            0,
            0.9,
        ));
        ensemble::add_member(&mut sig, chord_id, head).unwrap();
        let stem = sig.add(Inter::new_stem(LineSeg::new(300.0, 38.0, 300.0, 220.0), 0.9));
        chord::set_stem(&mut sig, chord_id, stem).unwrap();

        // Stem points up: the head side is the bottom end
        let short = extract_short_stem(&mut sig, chord_id, 140.0).unwrap();
        let median = sig.inter(short).median().unwrap();

        assert_eq!(median.y1(), 140.0);
        assert_eq!(median.y2(), 220.0);
        assert!(sig.inter(short).implicit);
    }

    #[test]
    fn test_consistent_group_reports_no_split() {
        let mut sig = Sig::new();
        let system = test_system();
        let group = sig.add(Inter::new_beam_group());
        let beam = sig.add(Inter::new_beam(LineSeg::new(0.0, 40.0, 100.0, 40.0), 4.0, 0.9));
        ensemble::add_member(&mut sig, group, beam).unwrap();

        assert_eq!(check_for_split(&sig, &system, group), None);
    }
}
