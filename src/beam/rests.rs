//! Interleaved rest resolver.
//!
//! Rests can sit inside a beam group, rhythmically part of the beamed voice.
//! Detection depends on any explicit voice relation between the rest chord
//! and the group's stemmed chords:
//!
//! - a direct or transitive SameVoice/NextInVoice relation white-lists the
//!   rest: it links as soon as its abscissa falls inside the group;
//! - a direct SeparateVoice relation black-lists it;
//! - anything else is a plain candidate that must fall inside the lookup
//!   area between two consecutive beamed chords.

use tracing::debug;

use crate::chord;
use crate::geom::{LineSeg, Point, Polygon};
use crate::model::{InterId, InterKind, Relation};
use crate::sig::{ensemble, Sig};
use crate::system::System;

use super::{group_chords, group_measures, main_median};

/// Detect all the interleaved rests for this beam group and commit the
/// winning beam-rest edges.
pub fn detect_interleaved_rests(sig: &mut Sig, system: &System, group: InterId) {
    let head_chords = group_chords(sig, group);

    let black = linked_rests(sig, &head_chords, false, |r| {
        matches!(r, Relation::SeparateVoice)
    });
    let mut white = linked_rests(sig, &head_chords, true, |r| {
        matches!(r, Relation::SameVoice | Relation::NextInVoice)
    });
    white.retain(|r| !black.contains(r));

    // Plain candidates: the other rest chords of the group's measures
    let measures = group_measures(sig, group);
    let mut plain: Vec<InterId> = sig.inters_where(|i| {
        matches!(i.kind, InterKind::RestChord(_))
            && i.chord_data()
                .and_then(|d| d.measure)
                .is_some_and(|m| measures.contains(&m))
    });
    plain.retain(|r| !black.contains(r) && !white.contains(r));

    let mut prev: Option<InterId> = None;

    for chord_id in head_chords {
        if let Some(prev_chord) = prev {
            // Interleaved rests between prev_chord and chord, white list first
            let prev_x = chord::tail_location(sig, prev_chord).map(|t| t.x);
            let chord_x = chord::tail_location(sig, chord_id).map(|t| t.x);

            if let (Some(prev_x), Some(chord_x)) = (prev_x, chord_x) {
                for &white_chord in &white {
                    let Some(tail) = chord::tail_location(sig, white_chord) else {
                        continue;
                    };

                    if tail.x > prev_x && tail.x < chord_x {
                        let Some(&rest) = chord::notes(sig, white_chord).first() else {
                            continue;
                        };
                        let Some(center) = sig.inter(rest).center() else {
                            continue;
                        };

                        if let Some((beam, dist)) = nearest_beam(sig, system, group, center)
                        {
                            let _ = sig.insert_support_if_absent(
                                beam,
                                rest,
                                Relation::BeamRest { distance: dist },
                            );
                        }
                    }
                }

                lookup_rests(sig, system, group, prev_chord, chord_id, &plain, &white);
            }
        }

        prev = Some(chord_id);
    }
}

// ============================================================================
// Voice-relation partition
// ============================================================================

/// Rest chords tied to the provided head chords by the given relations,
/// optionally closed transitively through other rest chords.
fn linked_rests<F>(
    sig: &Sig,
    head_chords: &[InterId],
    transitive: bool,
    pred: F,
) -> Vec<InterId>
where
    F: Fn(&Relation) -> bool,
{
    let mut all: Vec<InterId> = Vec::new();

    for &ch in head_chords {
        for edge in sig.relations_of(ch, &pred) {
            if let Some(other) = edge.opposite(ch) {
                if matches!(sig.inter(other).kind, InterKind::RestChord(_))
                    && !all.contains(&other)
                {
                    all.push(other);
                }
            }
        }
    }

    if transitive {
        // Chase rest chords linked to already collected rest chords
        let mut fresh = all.clone();

        while !fresh.is_empty() {
            let mut next: Vec<InterId> = Vec::new();

            for &ch in &fresh {
                for edge in sig.relations_of(ch, &pred) {
                    if let Some(other) = edge.opposite(ch) {
                        if matches!(sig.inter(other).kind, InterKind::RestChord(_))
                            && !all.contains(&other)
                            && !next.contains(&other)
                        {
                            next.push(other);
                        }
                    }
                }
            }

            all.extend(&next);
            fresh = next;
        }
    }

    all
}

// ============================================================================
// Nearest beam
// ============================================================================

/// The vertically nearest full beam of the group embracing the point
/// abscissa-wise, with its projection distance. Uses the sheet skew rather
/// than a plain vertical.
pub fn nearest_beam(
    sig: &Sig,
    system: &System,
    group: InterId,
    pt: Point,
) -> Option<(InterId, f64)> {
    let vertical = system.skew.skewed_vertical(pt);

    let mut best: Option<(InterId, f64)> = None;

    for beam in ensemble::members(sig, group) {
        let inter = sig.inter(beam);
        if inter.is_hook() {
            continue;
        }
        let Some(median) = inter.median() else {
            continue;
        };
        let Some(cross) = median.intersection(&vertical) else {
            continue;
        };

        if cross.x >= median.x1() && cross.x <= median.x2() {
            let dist = pt.distance_to(cross);

            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((beam, dist));
            }
        }
    }

    best
}

/// Sign of head minus tail ordinate: +1 head below tail (stem up), -1 head
/// above tail, 0 for a stemless chord.
fn ordinate_sign(head: Point, tail: Point) -> i32 {
    if head.y > tail.y {
        1
    } else if head.y < tail.y {
        -1
    } else {
        0
    }
}

// ============================================================================
// Plain candidate lookup
// ============================================================================

/// Look for plain rests interleaved between two consecutive beamed chords.
///
/// The lookup area depends on the chord stem directions: same direction
/// gives the quadrilateral spanned by the head/tail points (heads extended
/// to the staff middle line when both chords share a staff); opposite
/// directions focus on the area above the beam, bounded by the group's main
/// median line.
fn lookup_rests(
    sig: &mut Sig,
    system: &System,
    group: InterId,
    left: InterId,
    right: InterId,
    candidates: &[InterId],
    white: &[InterId],
) {
    let (Some(left_box), Some(right_box)) =
        (chord::full_box(sig, left), chord::full_box(sig, right))
    else {
        return;
    };
    let (Some(mut left_head), Some(left_tail)) =
        (chord::head_location(sig, left), chord::tail_location(sig, left))
    else {
        return;
    };
    let (Some(mut right_head), Some(right_tail)) =
        (chord::head_location(sig, right), chord::tail_location(sig, right))
    else {
        return;
    };
    let Some(median) = main_median(sig, group) else {
        return;
    };

    let left_dir = ordinate_sign(left_head, left_tail);
    let right_dir = ordinate_sign(right_head, right_tail);

    let mut polygon = Polygon::new();

    if left_dir == right_dir {
        // Same vertical direction: parallelogram defined by the two stems,
        // heads extended to the staff middle line
        let staff = sig.inter(left).staff;
        if staff.is_some() && staff == sig.inter(right).staff {
            if let Some(staff) = staff.and_then(|id| system.staff(id)) {
                let mid_left = staff.mid_line.y_at_x(left_head.x);
                let mid_right = staff.mid_line.y_at_x(right_head.x);

                if left_dir as f64 * (mid_left - left_head.y) > 0.0 {
                    left_head.y = mid_left;
                }
                if left_dir as f64 * (mid_right - right_head.y) > 0.0 {
                    right_head.y = mid_right;
                }
            }
        }

        polygon.add_point(right_head);
        polygon.add_point(right_tail);
        polygon.add_point(left_tail);
        polygon.add_point(left_head);
    } else {
        // Opposite directions: select the area above the beam only
        let mut up_head = if left_dir < 0 { left_head } else { right_head };
        let up_tail = if left_dir < 0 { left_tail } else { right_tail };
        let down_head = if left_dir > 0 { left_head } else { right_head };
        let down_tail = if left_dir > 0 { left_tail } else { right_tail };

        // Extend the up head to the middle line of the upper staff
        let up_chord = if left_dir < 0 { left } else { right };
        if let Some(staff) = sig.inter(up_chord).staff.and_then(|id| system.staff(id)) {
            let mid = staff.mid_line.y_at_x((left_head.x + right_head.x) / 2.0);
            if up_head.y > mid {
                up_head.y = mid;
            }
        }

        polygon.add_point(up_head);

        let up_side = LineSeg { p1: up_head, p2: up_tail };
        let down_side = LineSeg { p1: down_head, p2: down_tail };
        let (Some(up_median), Some(down_median)) =
            (median.intersection(&up_side), median.intersection(&down_side))
        else {
            return;
        };

        polygon.add_point(up_median);
        polygon.add_point(down_median);
        polygon.add_point(Point::new(
            down_median.x,
            down_median.y - (up_median.y - up_head.y),
        ));
    }

    'candidates: for &rest_chord in candidates {
        let Some(rest_box) = sig.bounds_of(rest_chord) else {
            continue;
        };

        if !polygon.intersects(&rest_box) {
            continue;
        }

        let Some(&rest) = chord::notes(sig, rest_chord).first() else {
            continue;
        };
        let Some(center) = sig.inter(rest).center() else {
            continue;
        };
        let vertical = system.skew.skewed_vertical(center);

        // The rest must stay horizontally away from both bounding chords
        if rest_box.x_overlap(&left_box) > 0.0 || rest_box.x_overlap(&right_box) > 0.0 {
            debug!(rest = %rest_chord, "rest overlaps a bounding chord, skipped");
            continue;
        }

        let Some((beam, dist)) = nearest_beam(sig, system, group, center) else {
            continue;
        };

        // No abscissa collision with sibling rests on the same beam: the
        // rest closer to the beam wins, a white-listed incumbent outright
        let siblings: Vec<(crate::model::RelId, InterId, f64)> = sig
            .relations_of(beam, |r| matches!(r, Relation::BeamRest { .. }))
            .iter()
            .filter_map(|e| match e.relation {
                Relation::BeamRest { distance } => {
                    e.opposite(beam).map(|o| (e.id, o, distance))
                }
                _ => None,
            })
            .collect();

        for (rel, other_rest, other_dist) in siblings {
            let Some(other_center) = sig.inter(other_rest).center() else {
                continue;
            };
            let projected = Point::new(vertical.x_at_y(other_center.y), other_center.y);
            let Some(other_box) = sig.inter(other_rest).bounds else {
                continue;
            };

            if other_box.contains(projected) {
                let other_chord = chord::chord_of_note(sig, other_rest);

                if other_chord.is_some_and(|c| white.contains(&c)) {
                    // Never displace a white-listed rest
                    continue 'candidates;
                }

                if dist > other_dist {
                    debug!(rest = %rest_chord, beam = %beam, "farther than sibling rest");
                    continue 'candidates;
                } else {
                    debug!(rest = %rest_chord, beam = %beam, "closer than sibling rest");
                    sig.remove_edge(rel);
                }
            }
        }

        // A rest already interleaved in another beam group: nearer link wins
        let existing: Vec<(crate::model::RelId, f64)> = sig
            .relations_of(rest, |r| matches!(r, Relation::BeamRest { .. }))
            .iter()
            .filter_map(|e| match e.relation {
                Relation::BeamRest { distance } => Some((e.id, distance)),
                _ => None,
            })
            .collect();

        for (rel, other_dist) in existing {
            if dist > other_dist {
                debug!(rest = %rest_chord, beam = %beam, "keeping farther group link");
                continue 'candidates;
            } else {
                sig.remove_edge(rel);
            }
        }

        let _ = sig.add_edge(beam, rest, Relation::BeamRest { distance: dist });
    }
}
