//! Style attributes and the current-style table.
//!
//! Style attributes are streamed into the display list like any other
//! command, but instead of painting they mutate the [`StyleTable`]: the
//! mapping from attribute kind to the most-recently-streamed value of that
//! kind. At most one value per kind is live at a time.
//!
//! Drawables snapshot the table at the moment they are constructed
//! ([`StyleTable::snapshot`]); later style changes never retroactively
//! affect an already-built drawable.

use std::hash::{Hash, Hasher};

use crate::errors::AttributeKind;
use crate::geometry::Rect;

/// RGBA color. Channels are `f32` in `0.0 ..= 1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    /// Creates a new color from `f32` channels in `0.0 ..= 1.0`.
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Color {
        Color { r, g, b, a }
    }

    /// Creates a new color from `u8` channels in `0 ..= 255`.
    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    /// Returns the color packed as non-premultiplied RGBA8.
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0) as u8,
            (self.g.clamp(0.0, 1.0) * 255.0) as u8,
            (self.b.clamp(0.0, 1.0) * 255.0) as u8,
            (self.a.clamp(0.0, 1.0) * 255.0) as u8,
        ]
    }
}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.r.to_bits().hash(state);
        self.g.to_bits().hash(state);
        self.b.to_bits().hash(state);
        self.a.to_bits().hash(state);
    }
}

/// Paint source for fills, outlines, and the scene background.
#[derive(Debug, Clone, Copy, PartialEq, Hash)]
pub enum Brush {
    Solid(Color),
}

impl Brush {
    /// The brush's representative color (the only color, for solid brushes).
    pub fn color(&self) -> Color {
        match self {
            Brush::Solid(c) => *c,
        }
    }
}

impl Default for Brush {
    fn default() -> Self {
        Brush::Solid(Color::WHITE)
    }
}

/// Font request for text drawables. Resolution happens in the text-layout
/// collaborator; the core only carries the request.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    /// Size in pixels.
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
        }
    }
}

impl Hash for FontSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family.hash(state);
        self.size.to_bits().hash(state);
        self.bold.hash(state);
        self.italic.hash(state);
    }
}

/// Horizontal text alignment inside the coordinate box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Drop-shadow request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSpec {
    pub dx: i32,
    pub dy: i32,
    pub color: Color,
}

impl Hash for ShadowSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dx.hash(state);
        self.dy.hash(state);
        self.color.hash(state);
    }
}

/// One streamed style attribute.
///
/// Streaming one of these replaces the table's current value of the same
/// kind; it produces no pixels on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleAttr {
    /// Position and size box for the next drawable. Mandatory for every
    /// drawable kind.
    Coordinates(Rect),
    Font(FontSpec),
    Fill(Brush),
    Outline(Brush),
    Shadow(ShadowSpec),
    Alignment(Alignment),
    /// Stroke width in pixels.
    LineWidth(f32),
}

impl StyleAttr {
    /// The table slot this attribute occupies.
    pub fn kind(&self) -> AttributeKind {
        match self {
            StyleAttr::Coordinates(_) => AttributeKind::Coordinates,
            StyleAttr::Font(_) => AttributeKind::Font,
            StyleAttr::Fill(_) => AttributeKind::Fill,
            StyleAttr::Outline(_) => AttributeKind::Outline,
            StyleAttr::Shadow(_) => AttributeKind::Shadow,
            StyleAttr::Alignment(_) => AttributeKind::Alignment,
            StyleAttr::LineWidth(_) => AttributeKind::LineWidth,
        }
    }
}

impl Hash for StyleAttr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            StyleAttr::Coordinates(r) => r.hash(state),
            StyleAttr::Font(f) => f.hash(state),
            StyleAttr::Fill(b) => b.hash(state),
            StyleAttr::Outline(b) => b.hash(state),
            StyleAttr::Shadow(s) => s.hash(state),
            StyleAttr::Alignment(a) => a.hash(state),
            StyleAttr::LineWidth(w) => w.to_bits().hash(state),
        }
    }
}

/// The values a drawable captures from the table at construction time.
#[derive(Debug, Clone, PartialEq, Hash, Default)]
pub struct StyleSnapshot {
    pub coordinates: Option<Rect>,
    pub font: Option<FontSpec>,
    pub fill: Option<Brush>,
    pub outline: Option<Brush>,
    pub shadow: Option<ShadowSpec>,
    pub alignment: Option<Alignment>,
    pub line_width: Option<LineWidth>,
}

/// Stroke width wrapper so the snapshot stays `Hash`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineWidth(pub f32);

impl Hash for LineWidth {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl StyleSnapshot {
    /// Replaces the slot `attr` belongs to.
    pub fn install(&mut self, attr: StyleAttr) {
        match attr {
            StyleAttr::Coordinates(r) => self.coordinates = Some(r),
            StyleAttr::Font(f) => self.font = Some(f),
            StyleAttr::Fill(b) => self.fill = Some(b),
            StyleAttr::Outline(b) => self.outline = Some(b),
            StyleAttr::Shadow(s) => self.shadow = Some(s),
            StyleAttr::Alignment(a) => self.alignment = Some(a),
            StyleAttr::LineWidth(w) => self.line_width = Some(LineWidth(w)),
        }
    }

    /// The mandatory coordinate box, or the kind that is missing.
    pub fn require_coordinates(&self) -> Result<Rect, AttributeKind> {
        self.coordinates.ok_or(AttributeKind::Coordinates)
    }

    /// The mandatory font, or the kind that is missing.
    pub fn require_font(&self) -> Result<&FontSpec, AttributeKind> {
        self.font.as_ref().ok_or(AttributeKind::Font)
    }

    /// Fill brush, defaulting to solid black.
    pub fn fill_or_default(&self) -> Brush {
        self.fill.unwrap_or(Brush::Solid(Color::BLACK))
    }
}

/// Mapping from style-attribute kind to its most-recently-streamed value.
///
/// Insertion order is irrelevant; each kind holds at most one live value.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    snapshot: StyleSnapshot,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `attr`, replacing any prior value of the same kind.
    pub fn install(&mut self, attr: StyleAttr) {
        self.snapshot.install(attr);
    }

    /// Copies the current values. Drawables call this exactly once, at
    /// construction, so a half-updated table is never observed afterwards.
    pub fn snapshot(&self) -> StyleSnapshot {
        self.snapshot.clone()
    }

    /// Drops every live value.
    pub fn reset(&mut self) {
        self.snapshot = StyleSnapshot::default();
    }
}
