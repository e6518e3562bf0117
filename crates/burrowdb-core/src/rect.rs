//! Module: rect
//! Responsibility: the rectangular key type used by spatial index maps.
//! Boundary: collections hand rectangles to the spatial collaborator; the
//! engine never interprets coordinates beyond the containment test.

use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Rect
///
/// Axis-aligned 2-D rectangle, closed on all edges. Degenerate rectangles
/// (zero width or height) are valid keys; a point is `Rect::point`.
///

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[must_use]
    pub const fn point(x: f32, y: f32) -> Self {
        Self::new(x, y, x, y)
    }

    /// True iff `other` lies wholly inside `self` (edges included).
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    /// True iff the two rectangles share any point.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]..[{}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_includes_edges() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0);

        assert!(outer.contains(&outer));
        assert!(outer.contains(&Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(outer.contains(&Rect::point(10.0, 10.0)));
        assert!(!outer.contains(&Rect::new(5.0, 5.0, 10.1, 10.0)));
        assert!(!outer.contains(&Rect::new(-0.1, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn intersection_is_symmetric() {
        let a = Rect::new(0.0, 0.0, 5.0, 5.0);
        let b = Rect::new(5.0, 5.0, 9.0, 9.0);
        let c = Rect::new(6.0, 6.0, 9.0, 9.0);

        assert!(a.intersects(&b), "touching edges intersect");
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
    }
}
