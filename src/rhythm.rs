//! Time-offset and voice propagation across chords.
//!
//! Timing and voice identity flow through three forward channels, all scoped
//! to the chord's own measure: explicit next-in-voice edges, beam-group
//! order, and ties to the right. The channels follow edges that are acyclic
//! by construction; a visited guard reports a cycle instead of looping.

use std::collections::HashSet;

use tracing::debug;

use crate::beam;
use crate::chord;
use crate::model::{Inter, InterId, Rational, Relation};
use crate::sig::Sig;
use crate::system::VoiceId;
use crate::{Error, Result};

// ============================================================================
// Time offsets
// ============================================================================

/// Assign a time offset locally, with no propagation.
///
/// Refuses to overwrite a different existing offset and says so; assigning
/// the same value again is accepted silently.
pub fn set_time_offset(sig: &mut Sig, chord_id: InterId, offset: Rational) -> bool {
    let Some(data) = sig.inter_mut(chord_id).and_then(Inter::chord_data_mut) else {
        return false;
    };

    match data.time_offset {
        None => {
            data.time_offset = Some(offset);
            true
        }
        Some(current) if current == offset => true,
        Some(current) => {
            debug!(chord = %chord_id, %current, %offset, "refusing time offset reassign");
            false
        }
    }
}

/// Assign a time offset and push it through the three forward channels, in
/// this fixed order:
///
/// 1. the explicit next-in-voice successor;
/// 2. the chord's beam group: every following chord of the group sequence
///    (interleaved rests included) gets its offset chained from its
///    predecessor's end time, and propagation continues from the group's
///    last chord through channels 1 and 3 only;
/// 3. the chords tied to the right.
///
/// All channels stay inside the chord's measure. A cycle in the structural
/// edges is reported as [`Error::CycleDetected`].
pub fn set_and_push_time(sig: &mut Sig, chord_id: InterId, offset: Rational) -> Result<()> {
    let mut visited = HashSet::new();
    push_time(sig, chord_id, offset, &mut visited, true)
}

fn push_time(
    sig: &mut Sig,
    chord_id: InterId,
    offset: Rational,
    visited: &mut HashSet<InterId>,
    follow_group: bool,
) -> Result<()> {
    let current = sig.inter(chord_id).chord_data().and_then(|d| d.time_offset);

    match current {
        // Converged: nothing left to push
        Some(t) if t == offset => return Ok(()),
        Some(_) => {
            if visited.contains(&chord_id) {
                return Err(Error::CycleDetected(chord_id));
            }
            // A conflicting offset from another initiator: keep the first
            set_time_offset(sig, chord_id, offset);
            return Ok(());
        }
        None => {}
    }

    visited.insert(chord_id);
    set_time_offset(sig, chord_id, offset);

    let measure = sig.inter(chord_id).chord_data().and_then(|d| d.measure);

    // 1. Explicit next-in-voice successor
    let successors: Vec<InterId> = sig
        .outgoing(chord_id, |r| matches!(r, Relation::NextInVoice))
        .iter()
        .map(|e| e.dst)
        .collect();

    for next in successors {
        if chord_measure(sig, next) != measure {
            continue;
        }
        if let Some(end) = chord::end_time(sig, chord_id) {
            push_time(sig, next, end, visited, true)?;
        }
    }

    // 2. Beam group: chain the rest of the ordered sequence
    if follow_group {
        if let Some(group) = beam::group_of_chord(sig, chord_id) {
            let sequence: Vec<InterId> = beam::group_all_chords(sig, group)
                .into_iter()
                .filter(|c| chord_measure(sig, *c) == measure)
                .collect();

            if let Some(pos) = sequence.iter().position(|c| *c == chord_id) {
                for i in (pos + 1)..sequence.len() {
                    let Some(end) = chord::end_time(sig, sequence[i - 1]) else {
                        break;
                    };

                    if i == sequence.len() - 1 {
                        // Last chord of the group: continue through channels
                        // 1 and 3 only, no further beam-group recursion
                        push_time(sig, sequence[i], end, visited, false)?;
                    } else {
                        set_time_offset(sig, sequence[i], end);
                    }
                }
            }
        }
    }

    // 3. Tied chords on the right
    for tied in chord::following_tied_chords(sig, chord_id) {
        if chord_measure(sig, tied) != measure {
            debug!(chord = %chord_id, tied = %tied, "tie crosses measure boundary");
            continue;
        }
        if let Some(end) = chord::end_time(sig, chord_id) {
            push_time(sig, tied, end, visited, true)?;
        }
    }

    Ok(())
}

// ============================================================================
// Voices
// ============================================================================

/// Assign a voice to a chord and extend it to the related entities: the
/// chord's beam group (interleaved rests included) and the chords tied
/// forward, all within the same measure.
///
/// Re-assigning the same voice is a no-op; a different voice re-triggers
/// the full propagation.
pub fn set_voice(sig: &mut Sig, chord_id: InterId, voice: VoiceId) {
    let Some(data) = sig.inter(chord_id).chord_data() else {
        return;
    };

    if data.voice == Some(voice) {
        return; // Idempotent
    }
    if let Some(previous) = data.voice {
        debug!(chord = %chord_id, ?previous, ?voice, "reassigning voice");
    }

    let measure = data.measure;

    if let Some(data) = sig.inter_mut(chord_id).and_then(Inter::chord_data_mut) {
        data.voice = Some(voice);
    }

    // Extend to the whole beam group
    if let Some(group) = beam::group_of_chord(sig, chord_id) {
        for other in beam::group_all_chords(sig, group) {
            if other != chord_id && chord_measure(sig, other) == measure {
                set_voice(sig, other, voice);
            }
        }
    }

    // Extend to the following tied chords
    for tied in chord::following_tied_chords(sig, chord_id) {
        if chord_measure(sig, tied) == measure {
            set_voice(sig, tied, voice);
        } else {
            debug!(chord = %chord_id, tied = %tied, "cross-measure tie, voice not extended");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn chord_measure(sig: &Sig, chord_id: InterId) -> Option<crate::system::MeasureId> {
    sig.inter(chord_id).chord_data().and_then(|d| d.measure)
}
