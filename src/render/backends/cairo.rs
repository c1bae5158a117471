//! Cairo drawing backend.
//!
//! Adapter over `cairo::ImageSurface`/`cairo::Context`. A context is created
//! per operation; the surface's device offset and clip stack are re-applied
//! each time. Text goes through the toolkit font API (`select_font_face` /
//! `show_text`) — real shaping stays with the text-layout collaborator.

use std::any::Any;

use anyhow::{anyhow, Result};

use crate::geometry::Rect;
use crate::render::backend::{
    DrawingEngine, PaintSurface, RgbaImage, SurfaceSize, TextLayout, TextLayoutEngine,
};
use crate::style::{Alignment, Brush, Color, FontSpec};

/// Drawing engine producing [`CairoSurface`] surfaces.
pub struct CairoEngine;

impl CairoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CairoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingEngine for CairoEngine {
    fn name(&self) -> &str {
        "CairoEngine"
    }

    fn create_surface(&self, size: SurfaceSize) -> Result<Box<dyn PaintSurface>> {
        Ok(Box::new(CairoSurface::new(size)?))
    }
}

pub struct CairoSurface {
    surface: cairo::ImageSurface,
    size: SurfaceSize,
    clips: Vec<Rect>,
    offset: (i32, i32),
}

// SAFETY: the image surface is a refcounted handle whose only clone lives in
// this struct, and a surface is driven by one thread at a time (render loop
// or a cache worker).
unsafe impl Send for CairoSurface {}

impl CairoSurface {
    fn new(size: SurfaceSize) -> Result<Self> {
        let surface = cairo::ImageSurface::create(
            cairo::Format::ARgb32,
            size.width as i32,
            size.height as i32,
        )
        .map_err(|e| anyhow!("cairo surface creation failed: {e}"))?;

        Ok(Self {
            surface,
            size,
            clips: Vec::new(),
            offset: (0, 0),
        })
    }

    /// Context with the device offset and clip stack applied.
    fn ctx(&self) -> Result<cairo::Context> {
        let cr = cairo::Context::new(&self.surface)?;
        cr.translate(self.offset.0 as f64, self.offset.1 as f64);
        for clip in &self.clips {
            cr.rectangle(clip.x as f64, clip.y as f64, clip.width as f64, clip.height as f64);
            cr.clip();
        }
        Ok(cr)
    }
}

fn set_source(cr: &cairo::Context, brush: &Brush) {
    let Color { r, g, b, a } = brush.color();
    cr.set_source_rgba(r as f64, g as f64, b as f64, a as f64);
}

impl PaintSurface for CairoSurface {
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
        self.surface = cairo::ImageSurface::create(
            cairo::Format::ARgb32,
            size.width as i32,
            size.height as i32,
        )
        .map_err(|e| anyhow!("cairo surface resize failed: {e}"))?;
        self.size = size;
        Ok(())
    }

    fn set_device_offset(&mut self, dx: i32, dy: i32) {
        self.offset = (dx, dy);
    }

    fn push_clip(&mut self, rect: Rect) {
        self.clips.push(rect);
    }

    fn pop_clip(&mut self) {
        self.clips.pop();
    }

    fn fill_rect(&mut self, rect: Rect, brush: &Brush) -> Result<()> {
        let cr = self.ctx()?;
        set_source(&cr, brush);
        cr.rectangle(rect.x as f64, rect.y as f64, rect.width as f64, rect.height as f64);
        cr.fill()?;
        Ok(())
    }

    fn stroke_rect(&mut self, rect: Rect, brush: &Brush, line_width: f32) -> Result<()> {
        let cr = self.ctx()?;
        set_source(&cr, brush);
        cr.set_line_width(line_width as f64);
        cr.rectangle(rect.x as f64, rect.y as f64, rect.width as f64, rect.height as f64);
        cr.stroke()?;
        Ok(())
    }

    fn stroke_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, brush: &Brush, line_width: f32) -> Result<()> {
        let cr = self.ctx()?;
        set_source(&cr, brush);
        cr.set_line_width(line_width as f64);
        cr.move_to(x0 as f64, y0 as f64);
        cr.line_to(x1 as f64, y1 as f64);
        cr.stroke()?;
        Ok(())
    }

    fn draw_image(&mut self, image: &RgbaImage, dst: Rect) -> Result<()> {
        if dst.is_empty() || image.width == 0 || image.height == 0 {
            return Ok(());
        }

        // RGBA8 → premultiplied ARGB32 in native endianness
        let mut argb = vec![0u8; (image.height as usize) * (image.width as usize) * 4];
        for y in 0..image.height {
            for x in 0..image.width {
                let [r, g, b, a] = image.pixel(x, y);
                let mul = |c: u8| (c as u32 * a as u32 / 255) as u32;
                let off = ((y * image.width + x) * 4) as usize;
                argb[off..off + 4].copy_from_slice(&u32::to_ne_bytes(
                    ((a as u32) << 24) | (mul(r) << 16) | (mul(g) << 8) | mul(b),
                ));
            }
        }
        let src = cairo::ImageSurface::create_for_data(
            argb,
            cairo::Format::ARgb32,
            image.width as i32,
            image.height as i32,
            (image.width * 4) as i32,
        )?;

        let cr = self.ctx()?;
        cr.rectangle(dst.x as f64, dst.y as f64, dst.width as f64, dst.height as f64);
        cr.clip();
        cr.translate(dst.x as f64, dst.y as f64);
        cr.scale(
            dst.width as f64 / image.width as f64,
            dst.height as f64 / image.height as f64,
        );
        cr.set_source_surface(&src, 0.0, 0.0)?;
        cr.paint()?;
        Ok(())
    }

    fn blit(&mut self, src: &dyn PaintSurface, src_rect: Rect, dst_x: i32, dst_y: i32) -> Result<()> {
        let src = src
            .as_any()
            .downcast_ref::<CairoSurface>()
            .ok_or_else(|| anyhow!("CairoSurface blit from a non-cairo surface"))?;

        let cr = self.ctx()?;
        cr.rectangle(dst_x as f64, dst_y as f64, src_rect.width as f64, src_rect.height as f64);
        cr.clip();
        cr.set_source_surface(
            &src.surface,
            (dst_x - src_rect.x) as f64,
            (dst_y - src_rect.y) as f64,
        )?;
        cr.paint()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.surface.flush();
        Ok(())
    }

    fn snapshot(&self) -> Result<RgbaImage> {
        let mut surface = self.surface.clone();
        surface.flush();
        let stride = surface.stride() as u32;
        let (width, height) = (self.size.width, self.size.height);
        let data = surface
            .data()
            .map_err(|e| anyhow!("cairo surface readback failed: {e}"))?;

        // premultiplied ARGB32 → RGBA8
        let mut pixels = vec![0u8; (height as usize) * (width as usize) * 4];
        for y in 0..height {
            for x in 0..width {
                let src = (y * stride + x * 4) as usize;
                let px = u32::from_ne_bytes([data[src], data[src + 1], data[src + 2], data[src + 3]]);
                let a = (px >> 24) & 0xff;
                let unmul = |c: u32| if a == 0 { 0u8 } else { (c * 255 / a).min(255) as u8 };
                let off = ((y * width + x) * 4) as usize;
                pixels[off] = unmul((px >> 16) & 0xff);
                pixels[off + 1] = unmul((px >> 8) & 0xff);
                pixels[off + 2] = unmul(px & 0xff);
                pixels[off + 3] = a as u8;
            }
        }
        Ok(RgbaImage::from_raw(pixels, width, height, width * 4))
    }
}

/// Toolkit-font text engine. Measures and paints through cairo's "toy" text
/// API; adequate for labels, not a shaper.
pub struct CairoTextEngine;

impl CairoTextEngine {
    pub fn new() -> Self {
        Self
    }

    fn configure(cr: &cairo::Context, font: &FontSpec) {
        let slant = if font.italic {
            cairo::FontSlant::Italic
        } else {
            cairo::FontSlant::Normal
        };
        let weight = if font.bold {
            cairo::FontWeight::Bold
        } else {
            cairo::FontWeight::Normal
        };
        cr.select_font_face(&font.family, slant, weight);
        cr.set_font_size(font.size as f64);
    }
}

impl Default for CairoTextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine for CairoTextEngine {
    fn layout(
        &self,
        text: &str,
        font: &FontSpec,
        alignment: Alignment,
        _max_width: u32,
    ) -> Result<Box<dyn TextLayout>> {
        // measure against a scratch surface
        let scratch = cairo::ImageSurface::create(cairo::Format::ARgb32, 1, 1)
            .map_err(|e| anyhow!("cairo scratch surface failed: {e}"))?;
        let cr = cairo::Context::new(&scratch)?;
        Self::configure(&cr, font);

        let font_extents = cr.font_extents()?;
        let line_height = (font_extents.height().ceil() as u32).max(1);
        let ascent = font_extents.ascent();

        let lines: Vec<String> = text.split('\n').map(str::to_owned).collect();
        let mut widths = Vec::with_capacity(lines.len());
        let mut widest = 0u32;
        for line in &lines {
            let w = cr.text_extents(line)?.x_advance().ceil() as u32;
            widest = widest.max(w);
            widths.push(w);
        }

        Ok(Box::new(CairoLayout {
            lines,
            widths,
            font: font.clone(),
            alignment,
            line_height,
            ascent,
            width: widest,
        }))
    }
}

struct CairoLayout {
    lines: Vec<String>,
    widths: Vec<u32>,
    font: FontSpec,
    alignment: Alignment,
    line_height: u32,
    ascent: f64,
    width: u32,
}

impl TextLayout for CairoLayout {
    fn extents(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, (self.lines.len() as u32) * self.line_height)
    }

    fn paint(&self, surface: &mut dyn PaintSurface, x: i32, y: i32, brush: &Brush) -> Result<()> {
        let s = surface
            .as_any_mut()
            .downcast_mut::<CairoSurface>()
            .ok_or_else(|| anyhow!("CairoTextEngine used with a non-cairo surface"))?;

        let cr = s.ctx()?;
        CairoTextEngine::configure(&cr, &self.font);
        set_source(&cr, brush);

        for (row, line) in self.lines.iter().enumerate() {
            let indent = match self.alignment {
                Alignment::Left => 0,
                Alignment::Center => self.width.saturating_sub(self.widths[row]) / 2,
                Alignment::Right => self.width.saturating_sub(self.widths[row]),
            };
            cr.move_to(
                (x + indent as i32) as f64,
                y as f64 + (row as u32 * self.line_height) as f64 + self.ascent,
            );
            cr.show_text(line)?;
        }
        Ok(())
    }
}
