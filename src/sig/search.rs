//! Spatial candidate search and link scoring.
//!
//! Everything here is side-effect-free: searches only return candidate
//! `Link`s for the caller to apply (or to hand to the editing layer).
//!
//! A search builds a lookup area from the anchor's border lines grown by
//! scale-derived gap maxima, filters candidates by bounding-box intersection
//! (with early exit on the sorted sweep axis), scores the survivors with a
//! gap-based grade, and keeps the best one. Only a strictly greater grade
//! replaces the incumbent, so equal grades resolve to the first candidate
//! seen: the lowest on the sweep axis, then the lowest id.

use crate::geom::{Point, Polygon, Rect};
use crate::model::{
    BeamPortion, BeamStemData, GradeImpacts, HeadStemData, HorizontalSide, Inter, InterId,
    InterKind, Link, Relation,
};
use crate::scale::{Profile, Scale};

use super::Sig;

// ============================================================================
// Thresholds
// ============================================================================

/// Minimum grade for a support relation to be considered at all.
pub const MIN_RELATION_GRADE: f64 = 0.1;

const X_WEIGHT: f64 = 1.0;
const Y_WEIGHT: f64 = 2.0;

/// Gap maxima for one support kind, as interline fractions.
/// `x_in` applies toward the anchor, `x_out` away from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapMaxima {
    pub x_in: f64,
    pub x_out: f64,
    pub y: f64,
}

impl GapMaxima {
    /// Beam-stem maxima, indexed by profile (strict first).
    pub fn beam_stem(profile: Profile) -> GapMaxima {
        const TABLE: [GapMaxima; 2] = [
            GapMaxima { x_in: 0.3, x_out: 0.15, y: 0.8 },
            GapMaxima { x_in: 0.45, x_out: 0.3, y: 1.2 },
        ];
        TABLE[profile.index(TABLE.len())]
    }

    /// Head-stem maxima, indexed by profile (strict first).
    pub fn head_stem(profile: Profile) -> GapMaxima {
        const TABLE: [GapMaxima; 2] = [
            GapMaxima { x_in: 0.3, x_out: 0.2, y: 0.8 },
            GapMaxima { x_in: 0.45, x_out: 0.35, y: 1.2 },
        ];
        TABLE[profile.index(TABLE.len())]
    }
}

/// Grade a candidate from its measured gaps (interline fractions).
/// None when either gap exceeds its maximum or the grade misses the floor.
pub fn gap_grade(dx: f64, dx_max: f64, dy: f64, dy_max: f64) -> Option<(f64, GradeImpacts)> {
    if dx > dx_max || dy > dy_max {
        return None;
    }

    let mut impacts = GradeImpacts::new();
    impacts.push("dx", 1.0 - dx / dx_max, X_WEIGHT);
    impacts.push("dy", 1.0 - dy / dy_max, Y_WEIGHT);

    let grade = impacts.grade();
    if grade < MIN_RELATION_GRADE {
        return None;
    }

    Some((grade, impacts))
}

// ============================================================================
// Relation-specific link checks
// ============================================================================

/// Try a beam-stem connection. The anchor beam may not be in the graph yet.
pub fn check_beam_stem(
    beam: &Inter,
    stem: &Inter,
    scale: &Scale,
    profile: Profile,
) -> Option<Link> {
    let InterKind::Beam { median, height, .. } = &beam.kind else {
        return None;
    };
    let InterKind::Stem { median: stem_median } = &stem.kind else {
        return None;
    };

    // Extension point: where the stem crosses the beam median line
    let ep = median.intersection(stem_median)?;

    let (dx_px, outside) = if ep.x < median.x1() {
        (median.x1() - ep.x, true)
    } else if ep.x > median.x2() {
        (ep.x - median.x2(), true)
    } else {
        (0.0, false)
    };

    let beam_top = median.y_at_x(ep.x) - height / 2.0;
    let beam_bottom = beam_top + height;

    let dy_px = if stem_median.y2() < beam_top {
        beam_top - stem_median.y2()
    } else if stem_median.y1() > beam_bottom {
        stem_median.y1() - beam_bottom
    } else {
        0.0
    };

    let maxima = GapMaxima::beam_stem(profile);
    let dx = scale.pixels_to_frac(dx_px);
    let dy = scale.pixels_to_frac(dy_px);
    let dx_max = if outside { maxima.x_out } else { maxima.x_in };
    let (grade, _) = gap_grade(dx, dx_max, dy, maxima.y)?;

    let x_in_px = scale.to_pixels(maxima.x_in);
    let portion = if ep.x <= median.x1() + x_in_px {
        BeamPortion::Left
    } else if ep.x >= median.x2() - x_in_px {
        BeamPortion::Right
    } else {
        BeamPortion::Center
    };

    Some(Link::new(
        stem.id,
        Relation::BeamStem(BeamStemData { grade, dx, dy, portion, extension_point: ep }),
        true,
    ))
}

/// Try a head-stem connection. The anchor head may not be in the graph yet.
pub fn check_head_stem(
    head: &Inter,
    stem: &Inter,
    scale: &Scale,
    profile: Profile,
) -> Option<Link> {
    if !matches!(head.kind, InterKind::Head { .. }) {
        return None;
    }
    let InterKind::Stem { median: stem_median } = &stem.kind else {
        return None;
    };

    let bounds = head.bounds?;
    let center = bounds.center();
    let stem_x = stem_median.x_at_y(center.y);

    let head_side =
        if stem_x < center.x { HorizontalSide::Left } else { HorizontalSide::Right };
    let ref_x = match head_side {
        HorizontalSide::Left => bounds.x,
        HorizontalSide::Right => bounds.right(),
    };
    let outside = match head_side {
        HorizontalSide::Left => stem_x < ref_x,
        HorizontalSide::Right => stem_x > ref_x,
    };
    let dx_px = (stem_x - ref_x).abs();

    let dy_px = if center.y < stem_median.y1() {
        stem_median.y1() - center.y
    } else if center.y > stem_median.y2() {
        center.y - stem_median.y2()
    } else {
        0.0
    };

    let maxima = GapMaxima::head_stem(profile);
    let dx = scale.pixels_to_frac(dx_px);
    let dy = scale.pixels_to_frac(dy_px);
    let dx_max = if outside { maxima.x_out } else { maxima.x_in };
    let (grade, _) = gap_grade(dx, dx_max, dy, maxima.y)?;

    Some(Link::new(
        stem.id,
        Relation::HeadStem(HeadStemData {
            grade,
            dx,
            dy,
            head_side,
            extension_point: Point::new(stem_x, center.y),
        }),
        true,
    ))
}

// ============================================================================
// Lookup areas
// ============================================================================

/// Polygonal lookup area around a beam for potential stems: the beam borders
/// pushed apart by the vertical gap maximum, ends extended by the out gap.
pub fn beam_lookup_area(beam: &Inter, scale: &Scale, profile: Profile) -> Option<Polygon> {
    let InterKind::Beam { median, height, .. } = &beam.kind else {
        return None;
    };

    let maxima = GapMaxima::beam_stem(profile);
    let x_out = scale.to_pixels(maxima.x_out);
    let y_gap = scale.to_pixels(maxima.y);

    let top = median.translated(0.0, -height / 2.0);
    let bottom = median.translated(0.0, height / 2.0);
    let x_min = top.x1() - x_out;
    let x_max = top.x2() + x_out;

    let mut area = Polygon::new();
    area.add_point(Point::new(x_min, top.y_at_x(x_min) - y_gap));
    area.add_point(Point::new(x_max, top.y_at_x(x_max) - y_gap));
    area.add_point(Point::new(x_max, bottom.y_at_x(x_max) + y_gap));
    area.add_point(Point::new(x_min, bottom.y_at_x(x_min) + y_gap));

    Some(area)
}

/// Sweep axis of a sorted candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Abscissa,
    Ordinate,
}

/// Scan sorted candidates against a lookup box, score the survivors, return
/// the best-scoring link.
///
/// Candidates must be sorted on `axis`; the scan stops as soon as one starts
/// beyond the box on that axis.
pub fn find_best_link<F>(
    sig: &Sig,
    candidates: &[InterId],
    lu_box: Rect,
    axis: Axis,
    mut check: F,
) -> Option<Link>
where
    F: FnMut(&Sig, InterId) -> Option<Link>,
{
    let mut best: Option<Link> = None;
    let mut best_grade = f64::NEG_INFINITY;

    for &cand in candidates {
        let Some(bounds) = sig.inter(cand).bounds else {
            continue;
        };

        match axis {
            Axis::Abscissa => {
                if bounds.x > lu_box.right() {
                    break;
                }
            }
            Axis::Ordinate => {
                if bounds.y > lu_box.bottom() {
                    break;
                }
            }
        }

        if !bounds.intersects(&lu_box) {
            continue;
        }

        if let Some(link) = check(sig, cand) {
            let grade = link.relation.grade().unwrap_or(0.0);

            if grade >= MIN_RELATION_GRADE && grade > best_grade {
                best_grade = grade;
                best = Some(link);
            }
        }
    }

    best
}

/// Best beam-stem link on the desired horizontal side of a beam.
pub fn lookup_side_link(
    sig: &Sig,
    beam: &Inter,
    side: HorizontalSide,
    stems: &[InterId],
    scale: &Scale,
    profile: Profile,
) -> Option<Link> {
    let InterKind::Beam { median, height, .. } = &beam.kind else {
        return None;
    };

    let maxima = GapMaxima::beam_stem(profile);
    let x_in = scale.to_pixels(maxima.x_in);
    let x_out = scale.to_pixels(maxima.x_out);
    let y_gap = scale.to_pixels(maxima.y);

    let end = match side {
        HorizontalSide::Left => median.p1,
        HorizontalSide::Right => median.p2,
    };
    let (x_min, x_max) = match side {
        HorizontalSide::Left => (end.x - x_out, end.x + x_in),
        HorizontalSide::Right => (end.x - x_in, end.x + x_out),
    };
    let lu_box = Rect::new(
        x_min,
        end.y - height / 2.0 - y_gap,
        x_max - x_min,
        height + 2.0 * y_gap,
    );

    find_best_link(sig, stems, lu_box, Axis::Abscissa, |sig, cand| {
        check_beam_stem(beam, sig.inter(cand), scale, profile)
    })
}

// ============================================================================
// Link search per kind
// ============================================================================

/// Live stems ordered by bounds abscissa, the order every stem sweep expects.
pub fn stems_by_abscissa(sig: &Sig) -> Vec<InterId> {
    let mut stems = sig.inters_where(|i| matches!(i.kind, InterKind::Stem { .. }));
    stems.sort_by(|a, b| {
        let ax = sig.inter(*a).bounds.map(|r| r.x).unwrap_or(0.0);
        let bx = sig.inter(*b).bounds.map(|r| r.x).unwrap_or(0.0);
        ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(b))
    });
    stems
}

/// Candidate links the anchor would want, given the current graph state.
/// The anchor need not be in the graph yet (editing-layer previews).
pub fn search_links(sig: &Sig, anchor: &Inter, scale: &Scale, profile: Profile) -> Vec<Link> {
    match &anchor.kind {
        InterKind::Beam { .. } => {
            let Some(area) = beam_lookup_area(anchor, scale, profile) else {
                return Vec::new();
            };

            let mut links = Vec::new();
            for stem in stems_by_abscissa(sig) {
                let Some(bounds) = sig.inter(stem).bounds else {
                    continue;
                };
                if !area.intersects(&bounds) {
                    continue;
                }
                if let Some(link) = check_beam_stem(anchor, sig.inter(stem), scale, profile) {
                    links.push(link);
                }
            }
            links
        }

        InterKind::Head { .. } => {
            let Some(bounds) = anchor.bounds else {
                return Vec::new();
            };
            let maxima = GapMaxima::head_stem(profile);
            let lu_box = bounds.grown(
                scale.to_pixels(maxima.x_out),
                scale.to_pixels(maxima.y),
            );

            let stems = stems_by_abscissa(sig);
            find_best_link(sig, &stems, lu_box, Axis::Abscissa, |sig, cand| {
                check_head_stem(anchor, sig.inter(cand), scale, profile)
            })
            .into_iter()
            .collect()
        }

        _ => Vec::new(),
    }
}

/// Existing support edges of the anchor's family that are no longer
/// justified by the current geometry, minus those the caller wants kept.
pub fn search_unlinks(
    sig: &Sig,
    anchor: InterId,
    keep: &[Link],
    scale: &Scale,
    profile: Profile,
) -> Vec<Link> {
    let inter = sig.inter(anchor);

    let edges: Vec<_> = match &inter.kind {
        InterKind::Beam { .. } => sig
            .relations_of(anchor, |r| matches!(r, Relation::BeamStem(_)))
            .into_iter()
            .cloned()
            .collect(),
        InterKind::Head { .. } => sig
            .relations_of(anchor, |r| matches!(r, Relation::HeadStem(_)))
            .into_iter()
            .cloned()
            .collect(),
        _ => Vec::new(),
    };

    let mut unlinks = Vec::new();

    for edge in edges {
        let Some(partner) = edge.opposite(anchor) else {
            continue;
        };

        let still_valid = match &inter.kind {
            InterKind::Beam { .. } => {
                check_beam_stem(inter, sig.inter(partner), scale, profile).is_some()
            }
            InterKind::Head { .. } => {
                check_head_stem(inter, sig.inter(partner), scale, profile).is_some()
            }
            _ => true,
        };

        let kept = keep
            .iter()
            .any(|l| l.partner == partner && l.relation.same_kind(&edge.relation));

        if !still_valid && !kept {
            unlinks.push(Link::new(partner, edge.relation.clone(), edge.src == anchor));
        }
    }

    unlinks
}

// ============================================================================
// Tests
// ============================================================================
