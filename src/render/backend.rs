//! Collaborator interfaces for the external 2D drawing engine, text-layout
//! engine, and image decoder.
//!
//! The core never emits vector primitives or shapes glyphs itself; it drives
//! these traits. Calls occur on the thread that owns the surface — the
//! render loop for the live window surface, a cache worker for off-screen
//! cache buffers.

use std::any::Any;
use std::path::PathBuf;

use anyhow::Result;

use crate::geometry::Rect;
use crate::style::{Alignment, Brush, FontSpec};

/// Size of a surface in pixels. It's a simple struct to hold width and height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<Rect> for SurfaceSize {
    fn from(r: Rect) -> Self {
        Self { width: r.width, height: r.height }
    }
}

/// CPU pixel snapshot in non-premultiplied RGBA8.
#[derive(Clone)]
pub struct RgbaImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl RgbaImage {
    pub fn from_raw(pixels: Vec<u8>, width: u32, height: u32, stride: u32) -> Self {
        assert!(
            pixels.len() >= (height as usize) * (stride as usize),
            "pixel buffer too small for image dimensions"
        );
        Self { pixels, width, height, stride }
    }

    /// The RGBA bytes of pixel `(x, y)`, unchecked against clip state.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let off = (y as usize) * (self.stride as usize) + (x as usize) * 4;
        [
            self.pixels[off],
            self.pixels[off + 1],
            self.pixels[off + 2],
            self.pixels[off + 3],
        ]
    }
}

impl std::fmt::Debug for RgbaImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbaImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.pixels.len())
            .finish()
    }
}

/// A surface the drawing engine can paint into. Type-erased so the core can
/// hold one without generics; backends downcast via `as_any`.
pub trait PaintSurface: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn size(&self) -> SurfaceSize;

    /// Resizes the underlying pixel storage. Content after a resize is
    /// unspecified; callers repaint.
    fn resize(&mut self, size: SurfaceSize) -> Result<()>;

    /// Translates all subsequent drawing by `(dx, dy)` device pixels. Used
    /// when painting a drawable into an off-screen cache buffer whose origin
    /// is the drawable's ink origin.
    fn set_device_offset(&mut self, dx: i32, dy: i32);

    /// Pushes a clip rectangle; drawing is restricted to the intersection of
    /// the whole clip stack.
    fn push_clip(&mut self, rect: Rect);
    fn pop_clip(&mut self);

    fn fill_rect(&mut self, rect: Rect, brush: &Brush) -> Result<()>;
    fn stroke_rect(&mut self, rect: Rect, brush: &Brush, line_width: f32) -> Result<()>;
    fn stroke_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, brush: &Brush, line_width: f32) -> Result<()>;

    /// Draws decoded image pixels scaled into `dst`.
    fn draw_image(&mut self, image: &RgbaImage, dst: Rect) -> Result<()>;

    /// Composites `src_rect` of another surface of the same backend at
    /// `(dst_x, dst_y)`. This is the cache blit path.
    fn blit(&mut self, src: &dyn PaintSurface, src_rect: Rect, dst_x: i32, dst_y: i32) -> Result<()>;

    /// Pushes pending drawing to the display target (no-op for off-screen
    /// surfaces).
    fn flush(&mut self) -> Result<()>;

    /// CPU readback, for snapshots and pixel tests.
    fn snapshot(&self) -> Result<RgbaImage>;
}

/// Factory side of the drawing engine. `Sync` so cache workers can create
/// off-screen buffers concurrently with the render loop.
pub trait DrawingEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Creates a surface with the given size.
    fn create_surface(&self, size: SurfaceSize) -> Result<Box<dyn PaintSurface>>;
}

/// A measured, paint-ready text layout.
pub trait TextLayout: Send {
    /// Pixel extents of the laid-out text.
    fn extents(&self) -> SurfaceSize;

    /// Paints the glyphs with their top-left at `(x, y)`.
    fn paint(&self, surface: &mut dyn PaintSurface, x: i32, y: i32, brush: &Brush) -> Result<()>;
}

/// Text-layout collaborator: builds [`TextLayout`] objects from a font
/// request, alignment, and a wrap width.
pub trait TextLayoutEngine: Send + Sync {
    fn layout(
        &self,
        text: &str,
        font: &FontSpec,
        alignment: Alignment,
        max_width: u32,
    ) -> Result<Box<dyn TextLayout>>;
}

/// Where image data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// Path on disk.
    Path(PathBuf),
    /// `data:` URI with base64 payload.
    DataUri(String),
    /// Raw encoded bytes.
    Bytes(Vec<u8>),
}

/// Image-decoding collaborator. Decodes a source into CPU pixels scaled to
/// `target`; the drawable then hands those to the surface.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, source: &ImageSource, target: SurfaceSize) -> Result<RgbaImage>;
}
