//! End-to-end tests for the interleaved rest resolver.

use pretty_assertions::assert_eq;

use omr_sig::beam::{self, rests};
use omr_sig::chord;
use omr_sig::sig::ensemble;
use omr_sig::{
    BeamPortion, Inter, InterId, LineSeg, Measure, MeasureId, Rect, Relation, Scale, Shape, Sig,
    Skew, System,
};

// ============================================================================
// Helpers
// ============================================================================

fn test_system() -> System {
    System::new(Scale::new(20.0), Skew::new(0.0))
        .with_measure(Measure { id: MeasureId(0), left: 0.0, right: 400.0 })
}

fn quarter_chord(sig: &mut Sig, system: &System, x: f64) -> InterId {
    let chord_id = sig.add(Inter::new_head_chord());
    let head = sig.add(Inter::new_head(
        Shape::NoteheadBlack,
        Rect::new(x - 6.0, 95.0, 12.0, 10.0),
        0,
        0.9,
    ));
    ensemble::add_member(sig, chord_id, head).unwrap();

    let stem = sig.add(Inter::new_stem(LineSeg::new(x + 6.0, 40.0, x + 6.0, 100.0), 0.9));
    chord::set_stem(sig, chord_id, stem).unwrap();

    omr_sig::system::register_chord(sig, system, chord_id);
    chord_id
}

fn rest_chord_at(sig: &mut Sig, system: &System, x: f64, y: f64, shape: Shape) -> InterId {
    let chord_id = sig.add(Inter::new_rest_chord());
    let rest = sig.add(Inter::new_rest(shape, Rect::new(x - 6.0, y - 6.0, 12.0, 12.0), 0.9));
    ensemble::add_member(sig, chord_id, rest).unwrap();

    omr_sig::system::register_chord(sig, system, chord_id);
    chord_id
}

/// Two beamed quarter chords at x=100 and x=260, stems up to a beam at y=42.
fn beamed_pair(sig: &mut Sig, system: &System) -> (InterId, InterId, InterId, InterId) {
    let c1 = quarter_chord(sig, system, 100.0);
    let c2 = quarter_chord(sig, system, 260.0);

    let beam_id = sig.add(Inter::new_beam(LineSeg::new(90.0, 42.0, 276.0, 42.0), 4.0, 0.9));
    for &c in &[c1, c2] {
        let stem = chord::stem_of(sig, c).unwrap();
        let ep = sig
            .inter(beam_id)
            .median()
            .unwrap()
            .intersection(&sig.inter(stem).median().unwrap())
            .unwrap();
        sig.add_edge(
            beam_id,
            stem,
            Relation::BeamStem(omr_sig::model::BeamStemData {
                grade: 0.9,
                dx: 0.0,
                dy: 0.0,
                portion: BeamPortion::Center,
                extension_point: ep,
            }),
        )
        .unwrap();
    }

    beam::populate_system(sig, system);
    let group = beam::group_of_beam(sig, beam_id).unwrap();
    (c1, c2, beam_id, group)
}

fn beam_rest_edges(sig: &Sig, beam_id: InterId) -> Vec<InterId> {
    sig.relations_of(beam_id, |r| matches!(r, Relation::BeamRest { .. }))
        .iter()
        .filter_map(|e| e.opposite(beam_id))
        .collect()
}

// ============================================================================
// 1. Plain candidate inside the lookup area
// ============================================================================

#[test]
fn test_measure_rest_between_chords_links_to_nearest_beam() {
    let mut sig = Sig::new();
    let system = test_system();
    let (_c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    // A whole rest sitting between the two beamed chords
    let r = rest_chord_at(&mut sig, &system, 180.0, 91.0, Shape::RestWhole);
    let rest = chord::notes(&sig, r)[0];

    rests::detect_interleaved_rests(&mut sig, &system, group);

    assert_eq!(beam_rest_edges(&sig, beam_id), vec![rest]);
    assert_eq!(beam::group_of_chord(&sig, r), Some(group));

    // The group sequence now interleaves the rest
    let all = beam::group_all_chords(&sig, group);
    assert_eq!(all.len(), 3);
    assert_eq!(all[1], r);
}

#[test]
fn test_rest_overlapping_a_chord_is_not_linked() {
    let mut sig = Sig::new();
    let system = test_system();
    let (_c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    // Abscissa-overlaps the left chord: not interleaved
    rest_chord_at(&mut sig, &system, 104.0, 91.0, Shape::RestQuarter);

    rests::detect_interleaved_rests(&mut sig, &system, group);

    assert!(beam_rest_edges(&sig, beam_id).is_empty());
}

#[test]
fn test_rest_outside_polygon_is_not_linked() {
    let mut sig = Sig::new();
    let system = test_system();
    let (_c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    // Far below the chords, outside the stem parallelogram
    rest_chord_at(&mut sig, &system, 180.0, 250.0, Shape::RestQuarter);

    rests::detect_interleaved_rests(&mut sig, &system, group);

    assert!(beam_rest_edges(&sig, beam_id).is_empty());
}

// ============================================================================
// 2. Voice-relation partition
// ============================================================================

#[test]
fn test_separate_voice_rest_is_black_listed() {
    let mut sig = Sig::new();
    let system = test_system();
    let (c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    let r = rest_chord_at(&mut sig, &system, 180.0, 91.0, Shape::RestQuarter);
    sig.add_edge(c1, r, Relation::SeparateVoice).unwrap();

    rests::detect_interleaved_rests(&mut sig, &system, group);

    assert!(beam_rest_edges(&sig, beam_id).is_empty());
}

#[test]
fn test_same_voice_rest_links_even_outside_polygon() {
    let mut sig = Sig::new();
    let system = test_system();
    let (c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    // Above the beam, outside the lookup polygon, but voice-related
    let r = rest_chord_at(&mut sig, &system, 180.0, 20.0, Shape::RestQuarter);
    sig.add_edge(c1, r, Relation::SameVoice).unwrap();

    rests::detect_interleaved_rests(&mut sig, &system, group);

    let rest = chord::notes(&sig, r)[0];
    assert_eq!(beam_rest_edges(&sig, beam_id), vec![rest]);
}

#[test]
fn test_transitive_next_in_voice_white_lists() {
    let mut sig = Sig::new();
    let system = test_system();
    let (c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    // c1 -> r1 -> r2 chain of next-in-voice relations
    let r1 = rest_chord_at(&mut sig, &system, 150.0, 20.0, Shape::RestQuarter);
    let r2 = rest_chord_at(&mut sig, &system, 200.0, 20.0, Shape::RestQuarter);
    sig.add_edge(c1, r1, Relation::NextInVoice).unwrap();
    sig.add_edge(r1, r2, Relation::NextInVoice).unwrap();

    rests::detect_interleaved_rests(&mut sig, &system, group);

    let linked = beam_rest_edges(&sig, beam_id);
    assert_eq!(linked.len(), 2);
    assert!(linked.contains(&chord::notes(&sig, r1)[0]));
    assert!(linked.contains(&chord::notes(&sig, r2)[0]));
}

// ============================================================================
// 3. Conflict resolution
// ============================================================================

#[test]
fn test_colliding_rests_keep_the_closer_one() {
    let mut sig = Sig::new();
    let system = test_system();
    let (_c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    // Two plain rests nearly stacked; the upper one is closer to the beam
    let near = rest_chord_at(&mut sig, &system, 170.0, 60.0, Shape::RestQuarter);
    let far = rest_chord_at(&mut sig, &system, 175.0, 80.0, Shape::RestQuarter);

    rests::detect_interleaved_rests(&mut sig, &system, group);

    let linked = beam_rest_edges(&sig, beam_id);
    assert_eq!(linked, vec![chord::notes(&sig, near)[0]]);
    assert!(beam::group_of_chord(&sig, far).is_none());
}

#[test]
fn test_closer_group_steals_rest_from_farther_one() {
    let mut sig = Sig::new();
    let system = test_system();
    let (_c1, _c2, beam_id, group) = beamed_pair(&mut sig, &system);

    let r = rest_chord_at(&mut sig, &system, 180.0, 91.0, Shape::RestQuarter);
    let rest = chord::notes(&sig, r)[0];

    // Pretend some farther group already claimed this rest
    let far_beam = sig.add(Inter::new_beam(LineSeg::new(90.0, 350.0, 276.0, 350.0), 4.0, 0.9));
    let far_group = sig.add(Inter::new_beam_group());
    ensemble::add_member(&mut sig, far_group, far_beam).unwrap();
    sig.add_edge(far_beam, rest, Relation::BeamRest { distance: 259.0 }).unwrap();

    rests::detect_interleaved_rests(&mut sig, &system, group);

    // The nearer beam won, the farther link is gone
    assert_eq!(beam_rest_edges(&sig, beam_id), vec![rest]);
    assert!(beam_rest_edges(&sig, far_beam).is_empty());
}
