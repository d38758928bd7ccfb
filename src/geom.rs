//! Plane geometry primitives shared by the search and grouping engines.
//!
//! Everything here is pure data: no graph access, no state. Coordinates are
//! in sheet pixels, y growing downward.

use serde::{Deserialize, Serialize};

// ============================================================================
// Point
// ============================================================================

/// A location in sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// ============================================================================
// Rect
// ============================================================================

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest rectangle containing both corner points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self { x, y, width: (a.x - b.x).abs(), height: (a.y - b.y).abs() }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Width of the horizontal overlap, negative when disjoint.
    pub fn x_overlap(&self, other: &Rect) -> f64 {
        self.right().min(other.right()) - self.x.max(other.x)
    }

    /// Height of the vertical overlap, negative when disjoint.
    pub fn y_overlap(&self, other: &Rect) -> f64 {
        self.bottom().min(other.bottom()) - self.y.max(other.y)
    }

    /// Rectangle grown by `dx` on each horizontal side and `dy` on each
    /// vertical side.
    pub fn grown(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(
            self.x - dx,
            self.y - dy,
            self.width + 2.0 * dx,
            self.height + 2.0 * dy,
        )
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

// ============================================================================
// LineSeg
// ============================================================================

/// A line segment, typically a beam or stem median line.
///
/// For beam medians, `p1` is the left end and `p2` the right end.
/// For stem medians, `p1` is the top end and `p2` the bottom end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSeg {
    pub p1: Point,
    pub p2: Point,
}

impl LineSeg {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { p1: Point::new(x1, y1), p2: Point::new(x2, y2) }
    }

    pub fn x1(&self) -> f64 {
        self.p1.x
    }

    pub fn x2(&self) -> f64 {
        self.p2.x
    }

    pub fn y1(&self) -> f64 {
        self.p1.y
    }

    pub fn y2(&self) -> f64 {
        self.p2.y
    }

    pub fn width(&self) -> f64 {
        (self.p2.x - self.p1.x).abs()
    }

    pub fn midpoint(&self) -> Point {
        Point::new((self.p1.x + self.p2.x) / 2.0, (self.p1.y + self.p2.y) / 2.0)
    }

    /// Slope dy/dx of the supporting line. A vertical segment yields an
    /// infinite value, which callers must not feed to `y_at_x`.
    pub fn slope(&self) -> f64 {
        (self.p2.y - self.p1.y) / (self.p2.x - self.p1.x)
    }

    /// Ordinate of the supporting (infinite) line at abscissa `x`.
    pub fn y_at_x(&self, x: f64) -> f64 {
        self.p1.y + (x - self.p1.x) * self.slope()
    }

    /// Abscissa of the supporting (infinite) line at ordinate `y`.
    pub fn x_at_y(&self, y: f64) -> f64 {
        if self.p2.y == self.p1.y {
            return self.p1.x;
        }
        self.p1.x + (y - self.p1.y) * (self.p2.x - self.p1.x) / (self.p2.y - self.p1.y)
    }

    /// Intersection of the two supporting (infinite) lines.
    /// None when the lines are parallel.
    pub fn intersection(&self, other: &LineSeg) -> Option<Point> {
        let d1x = self.p2.x - self.p1.x;
        let d1y = self.p2.y - self.p1.y;
        let d2x = other.p2.x - other.p1.x;
        let d2y = other.p2.y - other.p1.y;
        let den = d1x * d2y - d1y * d2x;

        if den.abs() < 1e-12 {
            return None;
        }

        let t = ((other.p1.x - self.p1.x) * d2y - (other.p1.y - self.p1.y) * d2x) / den;
        Some(Point::new(self.p1.x + t * d1x, self.p1.y + t * d1y))
    }

    /// Same segment shifted by (dx, dy).
    pub fn translated(&self, dx: f64, dy: f64) -> LineSeg {
        LineSeg::new(self.p1.x + dx, self.p1.y + dy, self.p2.x + dx, self.p2.y + dy)
    }
}

// ============================================================================
// Polygon
// ============================================================================

/// A simple polygon used as a lookup area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn add_point(&mut self, p: Point) {
        self.points.push(p);
    }

    /// Even-odd ray-cast containment test.
    pub fn contains(&self, p: Point) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);

        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];

            if ((a.y > p.y) != (b.y > p.y))
                && (p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x)
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }

    /// Whether the polygon and the rectangle share any area: a rectangle
    /// corner inside, a vertex inside the rectangle, or crossing edges.
    pub fn intersects(&self, rect: &Rect) -> bool {
        if self.points.is_empty() {
            return false;
        }

        let corners = [
            Point::new(rect.x, rect.y),
            Point::new(rect.right(), rect.y),
            Point::new(rect.right(), rect.bottom()),
            Point::new(rect.x, rect.bottom()),
        ];

        if corners.iter().any(|c| self.contains(*c)) {
            return true;
        }

        if self.points.iter().any(|p| rect.contains(*p)) {
            return true;
        }

        let n = self.points.len();
        for i in 0..n {
            let edge = LineSeg { p1: self.points[i], p2: self.points[(i + 1) % n] };
            for k in 0..4 {
                let side = LineSeg { p1: corners[k], p2: corners[(k + 1) % 4] };
                if segments_cross(&edge, &side) {
                    return true;
                }
            }
        }

        false
    }
}

impl Default for Polygon {
    fn default() -> Self {
        Self::new()
    }
}

/// Proper segment intersection (shared endpoints count as crossing).
fn segments_cross(a: &LineSeg, b: &LineSeg) -> bool {
    fn orient(p: Point, q: Point, r: Point) -> f64 {
        (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
    }

    let d1 = orient(b.p1, b.p2, a.p1);
    let d2 = orient(b.p1, b.p2, a.p2);
    let d3 = orient(a.p1, a.p2, b.p1);
    let d4 = orient(a.p1, a.p2, b.p2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    fn on_segment(p: Point, q: Point, r: Point) -> bool {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    }

    (d1 == 0.0 && on_segment(b.p1, b.p2, a.p1))
        || (d2 == 0.0 && on_segment(b.p1, b.p2, a.p2))
        || (d3 == 0.0 && on_segment(a.p1, a.p2, b.p1))
        || (d4 == 0.0 && on_segment(a.p1, a.p2, b.p2))
}

// ============================================================================
// Skew
// ============================================================================

/// Global sheet skew. The slope is the tangent of the page rotation, as
/// measured on staff lines by the layout layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Skew {
    pub slope: f64,
}

impl Skew {
    pub fn new(slope: f64) -> Self {
        Self { slope }
    }

    /// The "vertical" line through `p`, tilted by the sheet skew.
    /// Long enough to cross any beam of the system.
    pub fn skewed_vertical(&self, p: Point) -> LineSeg {
        const REACH: f64 = 10_000.0;
        LineSeg::new(
            p.x + self.slope * REACH,
            p.y - REACH,
            p.x - self.slope * REACH,
            p.y + REACH,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_overlaps() {
        let a = Rect::new(0.0, 0.0, 40.0, 10.0);
        let b = Rect::new(35.0, 5.0, 55.0, 10.0);

        assert!(a.intersects(&b));
        assert_eq!(a.x_overlap(&b), 5.0);
        assert_eq!(a.y_overlap(&b), 5.0);

        let c = Rect::new(100.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&c));
        assert!(a.x_overlap(&c) < 0.0);
    }

    #[test]
    fn test_line_y_at_x() {
        let line = LineSeg::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(line.y_at_x(50.0), 25.0);
        assert_eq!(line.slope(), 0.5);
    }

    #[test]
    fn test_line_intersection() {
        let h = LineSeg::new(0.0, 10.0, 100.0, 10.0);
        let v = LineSeg::new(40.0, 0.0, 40.0, 100.0);
        let p = h.intersection(&v).unwrap();
        assert_eq!(p.x, 40.0);
        assert_eq!(p.y, 10.0);

        let parallel = LineSeg::new(0.0, 20.0, 100.0, 20.0);
        assert!(h.intersection(&parallel).is_none());
    }

    #[test]
    fn test_polygon_contains() {
        let mut poly = Polygon::new();
        poly.add_point(Point::new(0.0, 0.0));
        poly.add_point(Point::new(10.0, 0.0));
        poly.add_point(Point::new(10.0, 10.0));
        poly.add_point(Point::new(0.0, 10.0));

        assert!(poly.contains(Point::new(5.0, 5.0)));
        assert!(!poly.contains(Point::new(15.0, 5.0)));
    }

    #[test]
    fn test_polygon_intersects_rect() {
        let mut poly = Polygon::new();
        poly.add_point(Point::new(0.0, 0.0));
        poly.add_point(Point::new(20.0, 0.0));
        poly.add_point(Point::new(20.0, 20.0));
        poly.add_point(Point::new(0.0, 20.0));

        // Overlapping
        assert!(poly.intersects(&Rect::new(10.0, 10.0, 20.0, 20.0)));
        // Rect fully inside
        assert!(poly.intersects(&Rect::new(5.0, 5.0, 2.0, 2.0)));
        // Polygon fully inside rect
        assert!(poly.intersects(&Rect::new(-10.0, -10.0, 50.0, 50.0)));
        // Disjoint
        assert!(!poly.intersects(&Rect::new(30.0, 30.0, 5.0, 5.0)));
    }

    #[test]
    fn test_skewed_vertical() {
        let skew = Skew::new(0.0);
        let v = skew.skewed_vertical(Point::new(50.0, 50.0));
        assert_eq!(v.x_at_y(1000.0), 50.0);
    }
}
