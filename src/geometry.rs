//! Rectangle and overlap math for the render pipeline.
//!
//! A [`Rect`] is an integer pixel rectangle: top-left corner `(x, y)` plus
//! `width`/`height`. The renderer classifies how a rectangle relates to a
//! container (the viewport, or a paint region) with [`classify`], which
//! returns an [`Overlap`]:
//!
//! - [`Overlap::Out`] — disjoint (or degenerate, see below)
//! - [`Overlap::In`] — the container fully contains the rectangle
//! - [`Overlap::Part`] — partial overlap, carrying the intersection
//!
//! Zero-area rectangles always classify as `Out`: a drawable with no pixels
//! can neither be visible nor dirty anything.
//!
//! # Examples
//!
//! ```
//! use inkplot::geometry::{classify, Overlap, Rect};
//!
//! let viewport = Rect::new(0, 0, 500, 500);
//! assert_eq!(classify(Rect::new(10, 10, 50, 50), viewport), Overlap::In);
//! assert_eq!(classify(Rect::new(600, 0, 50, 50), viewport), Overlap::Out);
//!
//! let Overlap::Part(isect) = classify(Rect::new(480, 480, 50, 50), viewport) else {
//!     unreachable!();
//! };
//! assert_eq!(isect, Rect::new(480, 480, 20, 20));
//! ```

/// An integer pixel rectangle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Horizontal offset of the top-left corner in pixels.
    pub x: i32,
    /// Vertical offset of the top-left corner in pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl std::fmt::Debug for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rect {{ x: {}, y: {}, width: {}, height: {} }}",
            self.x, self.y, self.width, self.height
        )
    }
}

impl Rect {
    /// Creates a new rectangle with the given position and size.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Returns true if this rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Returns the intersection with `other`, or `None` when the two do not
    /// share any pixels. Degenerate rectangles never intersect anything.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if self.is_empty() || other.is_empty() {
            return None;
        }

        let x0 = self.x.max(other.x) as i64;
        let y0 = self.y.max(other.y) as i64;
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        Some(Rect {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Returns true if `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grows the rectangle to also cover `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x0 = self.x.min(other.x) as i64;
        let y0 = self.y.min(other.y) as i64;
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());

        Rect {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }
}

/// How a rectangle relates to a containing rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlap {
    /// Disjoint, or one of the rectangles is degenerate.
    Out,
    /// Fully contained by the container.
    In,
    /// Partial overlap; the intersection is non-empty and strictly smaller
    /// than the rectangle.
    Part(Rect),
}

impl Overlap {
    /// Returns true for anything other than [`Overlap::Out`].
    pub fn is_visible(&self) -> bool {
        !matches!(self, Overlap::Out)
    }
}

/// Classifies how `rect` relates to `container`.
///
/// Total over all rectangle pairs: the result is exactly one of
/// `Out`/`In`/`Part`, and `Part` always carries a non-empty intersection
/// contained in both inputs.
pub fn classify(rect: Rect, container: Rect) -> Overlap {
    if rect.is_empty() || container.is_empty() {
        return Overlap::Out;
    }
    if container.contains(&rect) {
        return Overlap::In;
    }
    match rect.intersection(&container) {
        Some(isect) => Overlap::Part(isect),
        None => Overlap::Out,
    }
}
