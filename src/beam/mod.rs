//! Beam grouping engine.
//!
//! Groups the beams of a system transitively, using a purely geometric
//! neighbor predicate on beam median lines. Grouping decisions are made
//! beam by beam during an ordinate-ordered sweep, so a beam can transiently
//! land in several groups; a merge pass restores single membership.
//!
//! Structural inconsistencies detected afterwards (a chord vertically too
//! far from beams that should include it) are repaired by the splitter in
//! [`split`], driven from here with an internal loop cap.

pub mod rests;
pub mod split;

use tracing::{debug, warn};

use crate::chord;
use crate::geom::LineSeg;
use crate::model::{InterId, InterKind, Inter, Rational, Relation};
use crate::scale::Scale;
use crate::sig::{ensemble, Sig};
use crate::system::{MeasureId, System};

/// Hard cap on successive split passes over one system.
const MAX_SPLIT_LOOPS: usize = 10;

// ============================================================================
// Parameters
// ============================================================================

/// Neighborhood thresholds, in pixels (slope excepted).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupingParams {
    pub min_x_overlap: f64,
    pub max_y_distance: f64,
    /// Tangent difference, dimension-less.
    pub max_slope_diff: f64,
}

impl GroupingParams {
    /// Thresholds for standard beams.
    pub fn standard(scale: &Scale) -> Self {
        Self {
            min_x_overlap: scale.to_pixels(0.7),
            max_y_distance: scale.to_pixels(1.5),
            max_slope_diff: 0.065,
        }
    }

    /// Thresholds for cue (ornamental small) beams.
    pub fn cue(scale: &Scale) -> Self {
        Self {
            min_x_overlap: scale.to_pixels(0.7),
            max_y_distance: scale.to_pixels(1.5),
            max_slope_diff: 0.2,
        }
    }
}

// ============================================================================
// Neighbor predicate
// ============================================================================

/// Whether two beams can belong to the same group, one directly above or
/// below the other. Symmetric.
pub fn can_be_neighbors(a: &Inter, b: &Inter, params: &GroupingParams) -> bool {
    let (Some(m1), Some(m2)) = (a.median(), b.median()) else {
        return false;
    };

    // Minimum x overlap between median lines
    let max_left = m1.x1().max(m2.x1());
    let min_right = m1.x2().min(m2.x2());
    let x_overlap = min_right - max_left;

    if x_overlap < params.min_x_overlap {
        return false;
    }

    // Vertical distance at middle of the overlap
    let x = (max_left + min_right) / 2.0;
    let dy = (m2.y_at_x(x) - m1.y_at_x(x)).abs();

    if dy > params.max_y_distance {
        return false;
    }

    // Slope agreement
    let slope_diff = (m2.slope() - m1.slope()).abs();

    slope_diff <= params.max_slope_diff
}

// ============================================================================
// Population
// ============================================================================

/// Gather every beam of the system into beam groups: standard beams with
/// standard thresholds, cue beams with theirs. Idempotent.
pub fn populate_system(sig: &mut Sig, system: &System) {
    let standard = sig.inters_where(
        |i| matches!(i.kind, InterKind::Beam { cue: false, .. }),
    );
    let cue = sig.inters_where(|i| matches!(i.kind, InterKind::Beam { cue: true, .. }));

    group_beams(sig, standard, &GroupingParams::standard(&system.scale));
    group_beams(sig, cue, &GroupingParams::cue(&system.scale));
}

/// Organize the provided beams into groups satisfying the neighbor
/// predicate transitively.
fn group_beams(sig: &mut Sig, mut beams: Vec<InterId>, params: &GroupingParams) {
    if beams.is_empty() {
        return;
    }

    // Top to bottom
    beams.sort_by(|a, b| {
        let ay = sig.inter(*a).bounds.map(|r| r.y).unwrap_or(0.0);
        let by = sig.inter(*b).bounds.map(|r| r.y).unwrap_or(0.0);
        ay.partial_cmp(&by).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(b))
    });

    for i in 0..beams.len() {
        let beam = beams[i];

        let group = match group_of_beam(sig, beam) {
            Some(g) => g,
            None => {
                // Not compatible with any previous beam: start a new group
                let g = sig.add(Inter::new_beam_group());
                if let Err(err) = ensemble::add_member(sig, g, beam) {
                    warn!(beam = %beam, %err, "cannot seed beam group");
                    continue;
                }
                g
            }
        };

        let Some(bounds) = sig.inter(beam).bounds else {
            continue;
        };
        let height = bounds.height;
        let lu_box = bounds.grown(0.0, (params.max_y_distance - height / 2.0).ceil());
        let y_break = lu_box.bottom();

        // Inspect all following beams until out of vertical reach
        for &other in &beams[i + 1..] {
            let Some(other_bounds) = sig.inter(other).bounds else {
                continue;
            };

            if lu_box.intersects(&other_bounds) {
                let accepted = can_be_neighbors(sig.inter(beam), sig.inter(other), params);

                if accepted && !is_member(sig, group, other) {
                    debug!(group = %group, beam = %other, "adding neighbor beam");
                    if let Err(err) = ensemble::add_member(sig, group, other) {
                        warn!(beam = %other, %err, "cannot add beam to group");
                    }
                }
            } else if other_bounds.y >= y_break {
                break; // List is ordered by ordinate
            }
        }
    }

    // A beam caught by several groups merges them all into the first one
    for &beam in &beams {
        let groups: Vec<InterId> = ensemble::containing_ensembles(sig, beam)
            .into_iter()
            .filter(|g| matches!(sig.inter(*g).kind, InterKind::BeamGroup { .. }))
            .collect();

        if groups.len() > 1 {
            let survivor = groups[0];
            debug!(beam = %beam, survivor = %survivor, "merging beam groups");

            for &other in &groups[1..] {
                for member in ensemble::members(sig, other) {
                    if !is_member(sig, survivor, member) {
                        let _ = ensemble::add_member(sig, survivor, member);
                    }
                    let _ = ensemble::remove_member(sig, other, member);
                }
                // Emptied group removes itself; make sure anyway
                if sig.contains(other) {
                    sig.remove(other);
                }
            }
        }
    }
}

fn is_member(sig: &Sig, ensemble_id: InterId, member: InterId) -> bool {
    sig.get_relation(ensemble_id, member, Relation::is_containment).is_some()
}

/// Existing group compatible with the provided beam, skipping `excluded`.
pub fn find_group_for(
    sig: &Sig,
    beam: InterId,
    params: &GroupingParams,
    excluded: Option<InterId>,
) -> Option<InterId> {
    let groups = sig.inters_where(|i| matches!(i.kind, InterKind::BeamGroup { .. }));

    for group in groups {
        if Some(group) == excluded {
            continue;
        }

        for member in ensemble::members(sig, group) {
            if can_be_neighbors(sig.inter(beam), sig.inter(member), params) {
                return Some(group);
            }
        }
    }

    None
}

// ============================================================================
// Group queries
// ============================================================================

/// The one group a beam belongs to at steady state.
pub fn group_of_beam(sig: &Sig, beam: InterId) -> Option<InterId> {
    ensemble::containing_ensembles(sig, beam)
        .into_iter()
        .find(|g| matches!(sig.inter(*g).kind, InterKind::BeamGroup { .. }))
}

/// The beam group a chord belongs to: through its beams for a stemmed
/// chord, through its interleaved beam-rest edge for a rest chord.
pub fn group_of_chord(sig: &Sig, chord_id: InterId) -> Option<InterId> {
    if let Some(&beam) = chord::beams(sig, chord_id).first() {
        return group_of_beam(sig, beam);
    }

    for note in chord::notes(sig, chord_id) {
        for edge in sig.relations_of(note, |r| matches!(r, Relation::BeamRest { .. })) {
            if let Some(beam) = edge.opposite(note) {
                if let Some(group) = group_of_beam(sig, beam) {
                    return Some(group);
                }
            }
        }
    }

    None
}

/// Head chords connected to a beam through its stems.
pub fn chords_of_beam(sig: &Sig, beam: InterId) -> Vec<InterId> {
    let mut chords: Vec<InterId> = Vec::new();

    for edge in sig.relations_of(beam, |r| matches!(r, Relation::BeamStem(_))) {
        let Some(stem) = edge.opposite(beam) else {
            continue;
        };

        for chord_edge in sig.incoming(stem, |r| matches!(r, Relation::ChordStem)) {
            if sig.contains(chord_edge.src) && !chords.contains(&chord_edge.src) {
                chords.push(chord_edge.src);
            }
        }
    }

    sort_by_abscissa(sig, &mut chords);
    chords
}

/// The x-ordered beamed head chords of the group (no interleaved rests).
pub fn group_chords(sig: &Sig, group: InterId) -> Vec<InterId> {
    let mut chords: Vec<InterId> = Vec::new();

    for beam in ensemble::members(sig, group) {
        for chord in chords_of_beam(sig, beam) {
            if !chords.contains(&chord) {
                chords.push(chord);
            }
        }
    }

    sort_by_abscissa(sig, &mut chords);
    chords
}

/// The x-ordered chords of the group, interleaved rest chords included.
pub fn group_all_chords(sig: &Sig, group: InterId) -> Vec<InterId> {
    let mut chords = group_chords(sig, group);

    for beam in ensemble::members(sig, group) {
        for edge in sig.relations_of(beam, |r| matches!(r, Relation::BeamRest { .. })) {
            let Some(rest) = edge.opposite(beam) else {
                continue;
            };
            if let Some(rest_chord) = chord::chord_of_note(sig, rest) {
                if !chords.contains(&rest_chord) {
                    chords.push(rest_chord);
                }
            }
        }
    }

    sort_by_abscissa(sig, &mut chords);
    chords
}

pub fn first_chord(sig: &Sig, group: InterId) -> Option<InterId> {
    group_chords(sig, group).into_iter().next()
}

pub fn last_chord(sig: &Sig, group: InterId) -> Option<InterId> {
    group_chords(sig, group).into_iter().last()
}

/// Median line of the longest beam in the group.
pub fn main_median(sig: &Sig, group: InterId) -> Option<LineSeg> {
    let mut main: Option<LineSeg> = None;
    let mut main_width = f64::MIN;

    for beam in ensemble::members(sig, group) {
        let Some(median) = sig.inter(beam).median() else {
            continue;
        };
        let width = median.width();

        if main.is_none() || width > main_width {
            main = Some(median);
            main_width = width;
        }
    }

    main
}

/// The measures this group is involved in, left to right.
pub fn group_measures(sig: &Sig, group: InterId) -> Vec<MeasureId> {
    let mut measures: Vec<MeasureId> = Vec::new();

    for chord_id in group_chords(sig, group) {
        if let Some(measure) = sig.inter(chord_id).chord_data().and_then(|d| d.measure) {
            if !measures.contains(&measure) {
                measures.push(measure);
            }
        }
    }

    measures.sort();
    measures
}

/// Total duration of the chord sequence grouped by this beam group.
/// None until both boundary chords carry a time offset.
pub fn group_duration(sig: &Sig, group: InterId) -> Option<Rational> {
    let first = first_chord(sig, group)?;
    let last = last_chord(sig, group)?;

    let first_offset = sig.inter(first).chord_data()?.time_offset?;
    let last_offset = sig.inter(last).chord_data()?.time_offset?;

    Some(last_offset - first_offset + chord::duration(sig, last)?)
}

/// Flag the group when its stems spread over more than one staff.
pub fn count_staves(sig: &mut Sig, group: InterId) {
    let mut staves: Vec<crate::system::StaffId> = Vec::new();

    for beam in ensemble::members(sig, group) {
        for edge in sig.relations_of(beam, |r| matches!(r, Relation::BeamStem(_))) {
            let Some(stem) = edge.opposite(beam) else {
                continue;
            };
            if let Some(staff) = sig.inter(stem).staff {
                if !staves.contains(&staff) {
                    staves.push(staff);
                }
            }
        }
    }

    if staves.len() > 1 {
        if let Some(inter) = sig.inter_mut(group) {
            if let InterKind::BeamGroup { multi_staff } = &mut inter.kind {
                *multi_staff = true;
            }
        }
    }
}

fn sort_by_abscissa(sig: &Sig, ids: &mut [InterId]) {
    ids.sort_by(|a, b| {
        chord::abscissa(sig, *a)
            .partial_cmp(&chord::abscissa(sig, *b))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });
}

// ============================================================================
// Membership moves & split driver
// ============================================================================

/// Move a beam out of its current group(s) into `target`.
pub fn switch_to_group(sig: &mut Sig, beam: InterId, target: InterId) {
    for group in ensemble::containing_ensembles(sig, beam) {
        if group != target
            && matches!(sig.inter(group).kind, InterKind::BeamGroup { .. })
        {
            let _ = ensemble::remove_member(sig, group, beam);
        }
    }

    if !is_member(sig, target, beam) {
        if let Err(err) = ensemble::add_member(sig, target, beam) {
            warn!(beam = %beam, group = %target, %err, "cannot switch beam group");
        }
    }
}

/// Check every group of the system for a structural inconsistency and split
/// until clean. The loop cap bounds pathological inputs.
pub fn check_and_split(sig: &mut Sig, system: &System) -> usize {
    let mut splits = 0;

    for _ in 0..MAX_SPLIT_LOOPS {
        let groups = sig.inters_where(|i| matches!(i.kind, InterKind::BeamGroup { .. }));
        let mut found = false;

        for group in groups {
            if !sig.contains(group) {
                continue;
            }

            if let Some(alien) = split::check_for_split(sig, system, group) {
                split::split_group(sig, system, group, alien);
                splits += 1;
                found = true;
                break; // Group set changed, restart the scan
            }
        }

        if !found {
            return splits;
        }
    }

    warn!(splits, "split loop cap reached, giving up");
    splits
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Skew;
    use crate::system::System;

    fn test_system() -> System {
        System::new(Scale::new(20.0), Skew::new(0.0))
    }

    fn pixel_params() -> GroupingParams {
        GroupingParams { min_x_overlap: 5.0, max_y_distance: 6.0, max_slope_diff: 0.065 }
    }

    #[test]
    fn test_neighbors_accepts_close_overlapping_beams() {
        let a = Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9);
        let b = Inter::new_beam(LineSeg::new(35.0, 13.0, 90.0, 13.0), 4.0, 0.9);

        assert!(can_be_neighbors(&a, &b, &pixel_params()));
        assert!(can_be_neighbors(&b, &a, &pixel_params()));
    }

    #[test]
    fn test_neighbors_rejects_large_dy() {
        let a = Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9);
        let b = Inter::new_beam(LineSeg::new(35.0, 20.0, 90.0, 20.0), 4.0, 0.9);

        assert!(!can_be_neighbors(&a, &b, &pixel_params()));
    }

    #[test]
    fn test_neighbors_rejects_slope_mismatch() {
        let a = Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9);
        let b = Inter::new_beam(LineSeg::new(0.0, 13.0, 40.0, 17.0), 4.0, 0.9);

        assert!(!can_be_neighbors(&a, &b, &pixel_params()));
    }

    #[test]
    fn test_populate_groups_neighbors() {
        let mut sig = Sig::new();
        let system = test_system();

        // Two beams 6px apart: neighbors under standard thresholds (30px)
        let b1 = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9));
        let b2 = sig.add(Inter::new_beam(LineSeg::new(35.0, 16.0, 90.0, 16.0), 4.0, 0.9));
        // A distant beam on its own
        let b3 = sig.add(Inter::new_beam(LineSeg::new(0.0, 300.0, 40.0, 300.0), 4.0, 0.9));

        populate_system(&mut sig, &system);

        let g1 = group_of_beam(&sig, b1).unwrap();
        let g2 = group_of_beam(&sig, b2).unwrap();
        let g3 = group_of_beam(&sig, b3).unwrap();

        assert_eq!(g1, g2);
        assert_ne!(g1, g3);
    }

    #[test]
    fn test_populate_is_idempotent() {
        let mut sig = Sig::new();
        let system = test_system();

        let b1 = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9));
        let b2 = sig.add(Inter::new_beam(LineSeg::new(35.0, 16.0, 90.0, 16.0), 4.0, 0.9));

        populate_system(&mut sig, &system);
        let first_run = group_of_beam(&sig, b1).unwrap();
        let group_count =
            sig.inters_where(|i| matches!(i.kind, InterKind::BeamGroup { .. })).len();

        populate_system(&mut sig, &system);

        assert_eq!(group_of_beam(&sig, b1), Some(first_run));
        assert_eq!(group_of_beam(&sig, b2), Some(first_run));
        assert_eq!(
            sig.inters_where(|i| matches!(i.kind, InterKind::BeamGroup { .. })).len(),
            group_count,
        );
    }

    #[test]
    fn test_every_beam_has_exactly_one_group() {
        let mut sig = Sig::new();
        let system = test_system();

        // A ladder of overlapping beams: all one transitive group
        let mut beams = Vec::new();
        for k in 0..4 {
            let y = 10.0 + 12.0 * k as f64;
            beams.push(sig.add(Inter::new_beam(
                LineSeg::new(10.0 * k as f64, y, 80.0 + 10.0 * k as f64, y),
                4.0,
                0.9,
            )));
        }

        populate_system(&mut sig, &system);

        let group = group_of_beam(&sig, beams[0]).unwrap();
        for &beam in &beams {
            let containers = ensemble::containing_ensembles(&sig, beam);
            assert_eq!(containers.len(), 1, "beam {beam} should have one container");
            assert_eq!(containers[0], group);
        }
    }

    #[test]
    fn test_cue_beams_group_separately() {
        let mut sig = Sig::new();
        let system = test_system();

        let standard = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9));
        // A cue beam right below: never grouped with a standard beam
        let cue = sig.add(Inter::new_cue_beam(LineSeg::new(5.0, 16.0, 45.0, 16.0), 3.0, 0.9));

        populate_system(&mut sig, &system);

        assert_ne!(group_of_beam(&sig, standard), group_of_beam(&sig, cue));
    }

    #[test]
    fn test_find_group_for() {
        let mut sig = Sig::new();
        let system = test_system();
        let params = GroupingParams::standard(&system.scale);

        let b1 = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.9));
        populate_system(&mut sig, &system);
        let group = group_of_beam(&sig, b1).unwrap();

        let lone = sig.add(Inter::new_beam(LineSeg::new(5.0, 20.0, 45.0, 20.0), 4.0, 0.9));
        assert_eq!(find_group_for(&sig, lone, &params, None), Some(group));
        assert_eq!(find_group_for(&sig, lone, &params, Some(group)), None);
    }
}
