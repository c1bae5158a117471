//! Null backend that accepts every call and paints nothing. Useful for
//! exercising the pipeline without pixel output.

use std::any::Any;

use anyhow::Result;

use crate::geometry::Rect;
use crate::render::backend::{
    DrawingEngine, PaintSurface, RgbaImage, SurfaceSize, TextLayout, TextLayoutEngine,
};
use crate::style::{Alignment, Brush, FontSpec};

/// Drawing engine that does not perform any rendering.
pub struct NullEngine;

impl NullEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingEngine for NullEngine {
    fn name(&self) -> &str {
        "NullEngine"
    }

    fn create_surface(&self, size: SurfaceSize) -> Result<Box<dyn PaintSurface>> {
        Ok(Box::new(NullSurface { size }))
    }
}

pub struct NullSurface {
    size: SurfaceSize,
}

impl PaintSurface for NullSurface {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn size(&self) -> SurfaceSize {
        self.size
    }
    fn resize(&mut self, size: SurfaceSize) -> Result<()> {
        self.size = size;
        Ok(())
    }
    fn set_device_offset(&mut self, _dx: i32, _dy: i32) {}
    fn push_clip(&mut self, _rect: Rect) {}
    fn pop_clip(&mut self) {}
    fn fill_rect(&mut self, _rect: Rect, _brush: &Brush) -> Result<()> {
        Ok(())
    }
    fn stroke_rect(&mut self, _rect: Rect, _brush: &Brush, _line_width: f32) -> Result<()> {
        Ok(())
    }
    fn stroke_line(&mut self, _x0: i32, _y0: i32, _x1: i32, _y1: i32, _brush: &Brush, _line_width: f32) -> Result<()> {
        Ok(())
    }
    fn draw_image(&mut self, _image: &RgbaImage, _dst: Rect) -> Result<()> {
        Ok(())
    }
    fn blit(&mut self, _src: &dyn PaintSurface, _src_rect: Rect, _dst_x: i32, _dst_y: i32) -> Result<()> {
        Ok(())
    }
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
    fn snapshot(&self) -> Result<RgbaImage> {
        Ok(RgbaImage::from_raw(
            vec![0u8; (self.size.width as usize) * (self.size.height as usize) * 4],
            self.size.width,
            self.size.height,
            self.size.width * 4,
        ))
    }
}

/// Text engine with fixed metrics and no output.
pub struct NullTextEngine;

impl TextLayoutEngine for NullTextEngine {
    fn layout(
        &self,
        text: &str,
        font: &FontSpec,
        _alignment: Alignment,
        _max_width: u32,
    ) -> Result<Box<dyn TextLayout>> {
        Ok(Box::new(NullLayout {
            extents: SurfaceSize::new(
                (text.chars().count() as u32) * (font.size as u32).max(1),
                (font.size as u32).max(1),
            ),
        }))
    }
}

struct NullLayout {
    extents: SurfaceSize,
}

impl TextLayout for NullLayout {
    fn extents(&self) -> SurfaceSize {
        self.extents
    }
    fn paint(&self, _surface: &mut dyn PaintSurface, _x: i32, _y: i32, _brush: &Brush) -> Result<()> {
        Ok(())
    }
}
