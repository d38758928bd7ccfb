//! Generic ensemble membership.
//!
//! Every ensemble kind (beam group, chord, key, staff barline) manages its
//! members the same way: through Containment edges in the graph. The
//! operations live here once, instead of being re-implemented per kind.

use tracing::debug;

use crate::model::{InterId, InterKind, MemberOrder, RelId, Relation};
use crate::{Error, Result};

use super::Sig;

/// Add `member` to `ensemble`.
///
/// Rejects a member whose kind the ensemble does not accept. Beam-group
/// membership also inserts the mutual support edges between the new member
/// and the existing ones.
pub fn add_member(sig: &mut Sig, ensemble: InterId, member: InterId) -> Result<RelId> {
    let ens_kind = &sig.inter(ensemble).kind;
    let member_kind = &sig.inter(member).kind;

    if !ens_kind.accepts_member(member_kind) {
        return Err(Error::InvariantViolation(format!(
            "{} cannot accept {} member {}",
            ens_kind.name(),
            member_kind.name(),
            member,
        )));
    }

    let is_beam_group = matches!(ens_kind, InterKind::BeamGroup { .. });
    let rel = sig.add_edge(ensemble, member, Relation::Containment)?;

    if is_beam_group {
        for other in members(sig, ensemble) {
            if other != member {
                sig.insert_support_if_absent(member, other, Relation::BeamBeam)?;
            }
        }
    }

    Ok(rel)
}

/// Remove `member` from `ensemble`.
///
/// A non-manual ensemble left with zero members is removed from the graph.
pub fn remove_member(sig: &mut Sig, ensemble: InterId, member: InterId) -> Result<()> {
    let rel = sig
        .get_relation(ensemble, member, Relation::is_containment)
        .ok_or_else(|| {
            Error::InvariantViolation(format!("{member} is not a member of {ensemble}"))
        })?;

    sig.remove_edge(rel);

    if members(sig, ensemble).is_empty() && !sig.inter(ensemble).manual {
        debug!(ensemble = %ensemble, "last member removed, dropping ensemble");
        sig.remove(ensemble);
    }

    Ok(())
}

/// Live members of the ensemble, in its natural order: center abscissa for
/// most kinds, insertion order for beam groups. Removed inters never appear.
pub fn members(sig: &Sig, ensemble: InterId) -> Vec<InterId> {
    let mut result = sig.containment_members(ensemble);

    match sig.inter(ensemble).kind.member_order() {
        MemberOrder::Abscissa => {
            result.sort_by(|a, b| {
                let ax = sig.inter(*a).center().map(|c| c.x).unwrap_or(0.0);
                let bx = sig.inter(*b).center().map(|c| c.x).unwrap_or(0.0);
                ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(b))
            });
        }
        MemberOrder::Insertion => {
            // Containment edges already come back in insertion order
        }
    }

    result
}

/// First ensemble containing `member`, if any.
pub fn ensemble_of(sig: &Sig, member: InterId) -> Option<InterId> {
    containing_ensembles(sig, member).into_iter().next()
}

/// Every ensemble holding a Containment edge to `member`. More than one is a
/// transient state that the grouping engines resolve by merging.
pub fn containing_ensembles(sig: &Sig, member: InterId) -> Vec<InterId> {
    sig.incoming(member, Relation::is_containment)
        .iter()
        .map(|e| e.src)
        .filter(|ens| sig.contains(*ens))
        .collect()
}

/// Key signature value: +n for n sharps, -n for n flats, naturals ignored.
///
/// Mixing sharp and flat members in one key is an invariant violation.
pub fn key_fifths(sig: &Sig, key: InterId) -> Result<i32> {
    use crate::model::Shape;

    let mut count: i32 = 0;

    for alter in members(sig, key) {
        match sig.inter(alter).shape {
            Shape::Sharp => {
                if count < 0 {
                    return Err(Error::InvariantViolation(
                        "Sharp and Flat in same Key".into(),
                    ));
                }
                count += 1;
            }
            Shape::Flat => {
                if count > 0 {
                    return Err(Error::InvariantViolation(
                        "Sharp and Flat in same Key".into(),
                    ));
                }
                count -= 1;
            }
            Shape::Natural => {}
            other => {
                return Err(Error::InvariantViolation(format!(
                    "Illegal shape in Key: {other:?}"
                )));
            }
        }
    }

    Ok(count)
}

// ============================================================================
// Tests
// ============================================================================
