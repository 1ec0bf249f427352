//! Axis-aligned bounding box helpers.
//!
//! Boxes use a top-left origin: `top <= bottom` grows down the page. Layout
//! producers emit coordinates either in pixels or in a 0-1000 normalized
//! space; [`denormalize`] and [`normalize`] convert between the two.

use serde::{Deserialize, Serialize};

/// Side length of the normalized coordinate space.
pub const NORMALIZED_EXTENT: f64 = 1000.0;

/// Default gap (in coordinate units) tolerated by [`same_line`].
pub const DEFAULT_SAME_LINE_TOLERANCE: f64 = 5.0;

/// An axis-aligned bounding box `(x0, top, x1, bottom)`.
///
/// Serialized as a 4-element array, the shape layout producers emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl BBox {
    pub const fn new(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0,
            top,
            x1,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when the box violates `x0 <= x1` or `top <= bottom`.
    pub fn is_malformed(&self) -> bool {
        !(self.x0 <= self.x1 && self.top <= self.bottom)
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.top, b.x1, b.bottom]
    }
}

/// Returns true if `b` continues `a` on the same visual line.
///
/// `b` must start to the right of where `a` starts, begin within `tolerance`
/// of where `a` ends, and agree with `a` on both top and bottom within
/// `tolerance`.
pub fn same_line(a: &BBox, b: &BBox, tolerance: f64) -> bool {
    b.x0 > a.x0
        && (b.top - a.top).abs() < tolerance
        && (b.bottom - a.bottom).abs() < tolerance
        && (b.x0 - a.x1).abs() < tolerance
}

/// Smallest box containing both `a` and `b`.
pub fn union(a: &BBox, b: &BBox) -> BBox {
    BBox {
        x0: a.x0.min(b.x0),
        top: a.top.min(b.top),
        x1: a.x1.max(b.x1),
        bottom: a.bottom.max(b.bottom),
    }
}

/// Strict AABB overlap test. Touching edges do not count.
pub fn intersects(a: &BBox, b: &BBox) -> bool {
    a.x0 < b.x1 && a.x1 > b.x0 && a.top < b.bottom && a.bottom > b.top
}

/// True if `a` overlaps any box in `boxes`.
pub fn intersects_any<'a>(a: &BBox, boxes: impl IntoIterator<Item = &'a BBox>) -> bool {
    boxes.into_iter().any(|b| intersects(a, b))
}

/// Intersection over union of `a` and `b`.
///
/// Returns exactly 0.0 when the boxes do not overlap or when the union has no
/// area.
pub fn overlap_ratio(a: &BBox, b: &BBox) -> f64 {
    let x_left = a.x0.max(b.x0);
    let y_top = a.top.max(b.top);
    let x_right = a.x1.min(b.x1);
    let y_bottom = a.bottom.min(b.bottom);

    if x_right <= x_left || y_bottom <= y_top {
        return 0.0;
    }

    let intersection = (x_right - x_left) * (y_bottom - y_top);
    let union_area = a.area() + b.area() - intersection;
    if union_area <= 0.0 {
        return 0.0;
    }
    intersection / union_area
}

/// True when [`overlap_ratio`] exceeds `threshold`.
pub fn overlaps_above(a: &BBox, b: &BBox, threshold: f64) -> bool {
    overlap_ratio(a, b) > threshold
}

/// True iff `a` lies strictly inside `b` on all four sides.
pub fn contains(a: &BBox, b: &BBox) -> bool {
    a.x0 > b.x0 && a.top > b.top && a.x1 < b.x1 && a.bottom < b.bottom
}

/// Rescales a box from the 0-1000 normalized space to a `width` x `height` page.
pub fn denormalize(bbox: &BBox, width: f64, height: f64) -> BBox {
    BBox {
        x0: width * (bbox.x0 / NORMALIZED_EXTENT),
        top: height * (bbox.top / NORMALIZED_EXTENT),
        x1: width * (bbox.x1 / NORMALIZED_EXTENT),
        bottom: height * (bbox.bottom / NORMALIZED_EXTENT),
    }
}

/// Inverse of [`denormalize`]. Returns the box unchanged for a degenerate page.
pub fn normalize(bbox: &BBox, width: f64, height: f64) -> BBox {
    if width <= 0.0 || height <= 0.0 {
        return *bbox;
    }
    BBox {
        x0: bbox.x0 / width * NORMALIZED_EXTENT,
        top: bbox.top / height * NORMALIZED_EXTENT,
        x1: bbox.x1 / width * NORMALIZED_EXTENT,
        bottom: bbox.bottom / height * NORMALIZED_EXTENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_line_adjacent_spans() {
        let a = BBox::new(10.0, 100.0, 50.0, 112.0);
        let b = BBox::new(52.0, 101.0, 90.0, 113.0);
        assert!(same_line(&a, &b, DEFAULT_SAME_LINE_TOLERANCE));
    }

    #[test]
    fn test_same_line_requires_b_to_the_right() {
        let a = BBox::new(10.0, 100.0, 50.0, 112.0);
        assert!(!same_line(&a, &a, DEFAULT_SAME_LINE_TOLERANCE));

        let left = BBox::new(5.0, 100.0, 9.0, 112.0);
        assert!(!same_line(&a, &left, DEFAULT_SAME_LINE_TOLERANCE));
    }

    #[test]
    fn test_same_line_rejects_wide_gap_and_vertical_shift() {
        let a = BBox::new(10.0, 100.0, 50.0, 112.0);
        let far = BBox::new(70.0, 100.0, 90.0, 112.0);
        assert!(!same_line(&a, &far, 5.0));

        let lower = BBox::new(51.0, 120.0, 90.0, 132.0);
        assert!(!same_line(&a, &lower, 5.0));
    }

    #[test]
    fn test_union() {
        let a = BBox::new(0.0, 5.0, 10.0, 15.0);
        let b = BBox::new(5.0, 0.0, 20.0, 10.0);
        assert_eq!(union(&a, &b), BBox::new(0.0, 0.0, 20.0, 15.0));
    }

    #[test]
    fn test_intersects_is_strict() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let touching = BBox::new(10.0, 0.0, 20.0, 10.0);
        let overlapping = BBox::new(9.0, 9.0, 20.0, 20.0);
        assert!(!intersects(&a, &touching));
        assert!(intersects(&a, &overlapping));
        assert!(intersects_any(&a, [&touching, &overlapping]));
        assert!(!intersects_any(&a, [&touching]));
    }

    #[test]
    fn test_overlap_ratio() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let far = BBox::new(50.0, 50.0, 60.0, 60.0);
        assert_eq!(overlap_ratio(&a, &far), 0.0);
        assert!(!overlaps_above(&a, &far, 0.0));

        assert!((overlap_ratio(&a, &a) - 1.0).abs() < 1e-9);

        // Half of `a`, a third of the union.
        let half = BBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((overlap_ratio(&a, &half) - 1.0 / 3.0).abs() < 1e-9);
        assert!(overlaps_above(&a, &half, 0.3));
        assert!(!overlaps_above(&a, &half, 0.5));
    }

    #[test]
    fn test_overlap_ratio_degenerate_boxes() {
        let point = BBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(overlap_ratio(&point, &point), 0.0);
    }

    #[test]
    fn test_contains_is_strict() {
        let outer = BBox::new(0.0, 0.0, 100.0, 100.0);
        let inner = BBox::new(10.0, 10.0, 90.0, 90.0);
        assert!(contains(&inner, &outer));
        assert!(!contains(&outer, &inner));
        assert!(!contains(&outer, &outer));

        let flush = BBox::new(0.0, 10.0, 90.0, 90.0);
        assert!(!contains(&flush, &outer));
    }

    #[test]
    fn test_denormalize_and_normalize() {
        let b = BBox::new(100.0, 250.0, 500.0, 1000.0);
        let px = denormalize(&b, 800.0, 1200.0);
        assert_eq!(px, BBox::new(80.0, 300.0, 400.0, 1200.0));
        assert_eq!(normalize(&px, 800.0, 1200.0), b);
        assert_eq!(normalize(&px, 0.0, 1200.0), px);
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let b: BBox = serde_json::from_str("[1.0, 2.0, 3.0, 4.5]").unwrap();
        assert_eq!(b, BBox::new(1.0, 2.0, 3.0, 4.5));
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1.0,2.0,3.0,4.5]");
        assert!(!b.is_malformed());
        assert!(BBox::new(3.0, 0.0, 1.0, 1.0).is_malformed());
    }
}
