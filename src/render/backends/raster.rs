//! CPU raster backend.
//!
//! Paints into an owned premultiplied-alpha float buffer with src-over
//! blending; [`PaintSurface::snapshot`] unpremultiplies to RGBA8.
//! Premultiplied src-over is associative, so painting into a transparent
//! scratch surface and blitting it composites the same as painting
//! directly — the property the render cache relies on. Ships with a
//! deterministic block-glyph text engine (monospace metrics, one filled box
//! per visible character — no shaping) and a PNG image decoder, so the whole
//! pipeline runs headless and pixel tests are reproducible.

use std::any::Any;
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;

use crate::geometry::Rect;
use crate::render::backend::{
    DrawingEngine, ImageDecoder, ImageSource, PaintSurface, RgbaImage, SurfaceSize, TextLayout,
    TextLayoutEngine,
};
use crate::style::{Alignment, Brush, FontSpec};

/// Software drawing engine producing [`RasterSurface`] surfaces.
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RasterEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingEngine for RasterEngine {
    fn name(&self) -> &str {
        "RasterEngine"
    }

    fn create_surface(&self, size: SurfaceSize) -> Result<Box<dyn PaintSurface>> {
        Ok(Box::new(RasterSurface::new(size)))
    }
}

/// Owned pixel surface with a clip stack and a device offset. Channels are
/// premultiplied `f32` RGBA in `0.0 ..= 1.0`.
pub struct RasterSurface {
    pixels: Vec<f32>,
    size: SurfaceSize,
    clips: Vec<Rect>,
    offset: (i32, i32),
}

/// Premultiplies a brush color.
fn premult(color: crate::style::Color) -> [f32; 4] {
    let a = color.a.clamp(0.0, 1.0);
    [color.r * a, color.g * a, color.b * a, a]
}

impl RasterSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            pixels: vec![0f32; (size.width as usize) * (size.height as usize) * 4],
            size,
            clips: Vec::new(),
            offset: (0, 0),
        }
    }

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.size.width, self.size.height)
    }

    /// Intersection of the surface bounds with the whole clip stack.
    fn paint_area(&self) -> Option<Rect> {
        let mut area = self.bounds();
        for clip in &self.clips {
            area = area.intersection(clip)?;
        }
        if area.is_empty() {
            None
        } else {
            Some(area)
        }
    }

    fn shifted(&self, rect: Rect) -> Rect {
        Rect::new(rect.x + self.offset.0, rect.y + self.offset.1, rect.width, rect.height)
    }

    fn blend_pixel(&mut self, x: i32, y: i32, src: [f32; 4]) {
        debug_assert!(x >= 0 && y >= 0);
        let off = (y as usize) * (self.size.width as usize) * 4 + (x as usize) * 4;
        let sa = src[3];
        if sa >= 1.0 {
            self.pixels[off..off + 4].copy_from_slice(&src);
            return;
        }
        if sa <= 0.0 {
            return;
        }
        // src-over on premultiplied channels
        let inv = 1.0 - sa;
        for c in 0..4 {
            self.pixels[off + c] = src[c] + self.pixels[off + c] * inv;
        }
    }

    fn fill_clipped(&mut self, rect: Rect, src: [f32; 4]) {
        let Some(area) = self.paint_area() else { return };
        let Some(rect) = self.shifted(rect).intersection(&area) else { return };
        for y in rect.y..(rect.bottom() as i32) {
            for x in rect.x..(rect.right() as i32) {
                self.blend_pixel(x, y, src);
            }
        }
    }
}

impl PaintSurface for RasterSurface {
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
        self.pixels = vec![0f32; (size.width as usize) * (size.height as usize) * 4];
        self.size = size;
        Ok(())
    }

    fn set_device_offset(&mut self, dx: i32, dy: i32) {
        self.offset = (dx, dy);
    }

    fn push_clip(&mut self, rect: Rect) {
        self.clips.push(self.shifted(rect));
    }

    fn pop_clip(&mut self) {
        self.clips.pop();
    }

    fn fill_rect(&mut self, rect: Rect, brush: &Brush) -> Result<()> {
        self.fill_clipped(rect, premult(brush.color()));
        Ok(())
    }

    fn stroke_rect(&mut self, rect: Rect, brush: &Brush, line_width: f32) -> Result<()> {
        let w = (line_width.round().max(1.0) as u32).min(rect.width / 2 + 1);
        let rgba = premult(brush.color());
        // top, bottom, left, right bands
        self.fill_clipped(Rect::new(rect.x, rect.y, rect.width, w), rgba);
        self.fill_clipped(
            Rect::new(rect.x, (rect.bottom() - w as i64) as i32, rect.width, w),
            rgba,
        );
        self.fill_clipped(
            Rect::new(rect.x, rect.y + w as i32, w, rect.height.saturating_sub(2 * w)),
            rgba,
        );
        self.fill_clipped(
            Rect::new(
                (rect.right() - w as i64) as i32,
                rect.y + w as i32,
                w,
                rect.height.saturating_sub(2 * w),
            ),
            rgba,
        );
        Ok(())
    }

    fn stroke_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, brush: &Brush, line_width: f32) -> Result<()> {
        let t = line_width.round().max(1.0) as u32;
        let rgba = premult(brush.color());

        // Bresenham with a t×t stamp per step
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y) = (x0, y0);
        let mut err = dx + dy;

        loop {
            self.fill_clipped(Rect::new(x - (t as i32) / 2, y - (t as i32) / 2, t, t), rgba);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
        Ok(())
    }

    fn draw_image(&mut self, image: &RgbaImage, dst: Rect) -> Result<()> {
        if dst.is_empty() || image.width == 0 || image.height == 0 {
            return Ok(());
        }
        let Some(area) = self.paint_area() else { return Ok(()) };
        let shifted = self.shifted(dst);
        let Some(visible) = shifted.intersection(&area) else { return Ok(()) };

        // nearest-neighbor scale from image space into dst
        for y in visible.y..(visible.bottom() as i32) {
            for x in visible.x..(visible.right() as i32) {
                let u = ((x - shifted.x) as u64 * image.width as u64 / dst.width as u64) as u32;
                let v = ((y - shifted.y) as u64 * image.height as u64 / dst.height as u64) as u32;
                let p = image.pixel(u.min(image.width - 1), v.min(image.height - 1));
                let a = p[3] as f32 / 255.0;
                self.blend_pixel(
                    x,
                    y,
                    [
                        p[0] as f32 / 255.0 * a,
                        p[1] as f32 / 255.0 * a,
                        p[2] as f32 / 255.0 * a,
                        a,
                    ],
                );
            }
        }
        Ok(())
    }

    fn blit(&mut self, src: &dyn PaintSurface, src_rect: Rect, dst_x: i32, dst_y: i32) -> Result<()> {
        let src = src
            .as_any()
            .downcast_ref::<RasterSurface>()
            .ok_or_else(|| anyhow!("RasterSurface blit from a non-raster surface"))?;

        let Some(src_rect) = src_rect.intersection(&src.bounds()) else {
            return Ok(());
        };
        let Some(area) = self.paint_area() else { return Ok(()) };
        let dst = self.shifted(Rect::new(dst_x, dst_y, src_rect.width, src_rect.height));
        let Some(visible) = dst.intersection(&area) else { return Ok(()) };

        for y in visible.y..(visible.bottom() as i32) {
            for x in visible.x..(visible.right() as i32) {
                let sx = (src_rect.x + (x - dst.x)) as usize;
                let sy = (src_rect.y + (y - dst.y)) as usize;
                let off = sy * (src.size.width as usize) * 4 + sx * 4;
                // both surfaces are premultiplied; blend directly
                let rgba = [
                    src.pixels[off],
                    src.pixels[off + 1],
                    src.pixels[off + 2],
                    src.pixels[off + 3],
                ];
                self.blend_pixel(x, y, rgba);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // off-screen; nothing to push
        Ok(())
    }

    fn snapshot(&self) -> Result<RgbaImage> {
        // unpremultiply back to RGBA8
        let mut out = vec![0u8; self.pixels.len()];
        for (src, dst) in self.pixels.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
            let a = src[3].clamp(0.0, 1.0);
            if a > 0.0 {
                for c in 0..3 {
                    dst[c] = ((src[c] / a).clamp(0.0, 1.0) * 255.0).round() as u8;
                }
                dst[3] = (a * 255.0).round() as u8;
            }
        }
        Ok(RgbaImage::from_raw(
            out,
            self.size.width,
            self.size.height,
            self.size.width * 4,
        ))
    }
}

/// Monospace metrics used by the block-glyph layouter.
fn advance_for(font: &FontSpec) -> u32 {
    ((font.size * 0.6).round() as u32).max(1)
}

fn line_height_for(font: &FontSpec) -> u32 {
    ((font.size * 1.2).round() as u32).max(1)
}

/// Deterministic text-layout engine: monospace advances, one filled box per
/// visible character. Measurement and painting agree exactly, which is what
/// the cache pixel tests rely on.
pub struct RasterTextEngine;

impl RasterTextEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RasterTextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine for RasterTextEngine {
    fn layout(
        &self,
        text: &str,
        font: &FontSpec,
        alignment: Alignment,
        max_width: u32,
    ) -> Result<Box<dyn TextLayout>> {
        let advance = advance_for(font);
        let line_height = line_height_for(font);

        let wrap_cols = if max_width == 0 {
            usize::MAX
        } else {
            ((max_width / advance) as usize).max(1)
        };

        let mut lines: Vec<String> = Vec::new();
        for raw in text.split('\n') {
            let chars: Vec<char> = raw.chars().collect();
            if chars.is_empty() {
                lines.push(String::new());
                continue;
            }
            let mut start = 0;
            while start < chars.len() {
                let end = (start + wrap_cols).min(chars.len());
                lines.push(chars[start..end].iter().collect());
                start = end;
            }
        }

        let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        Ok(Box::new(BlockLayout {
            lines,
            advance,
            line_height,
            alignment,
            width: (widest as u32) * advance,
        }))
    }
}

struct BlockLayout {
    lines: Vec<String>,
    advance: u32,
    line_height: u32,
    alignment: Alignment,
    width: u32,
}

impl TextLayout for BlockLayout {
    fn extents(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, (self.lines.len() as u32) * self.line_height)
    }

    fn paint(&self, surface: &mut dyn PaintSurface, x: i32, y: i32, brush: &Brush) -> Result<()> {
        let glyph_top = (self.line_height / 6) as i32;
        let glyph_h = self.line_height.saturating_sub(2 * self.line_height / 6).max(1);

        for (row, line) in self.lines.iter().enumerate() {
            let line_w = (line.chars().count() as u32) * self.advance;
            let indent = match self.alignment {
                Alignment::Left => 0,
                Alignment::Center => (self.width.saturating_sub(line_w) / 2) as i32,
                Alignment::Right => self.width.saturating_sub(line_w) as i32,
            };
            let base_y = y + (row as u32 * self.line_height) as i32 + glyph_top;

            for (col, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                surface.fill_rect(
                    Rect::new(
                        x + indent + (col as u32 * self.advance) as i32,
                        base_y,
                        self.advance.saturating_sub(1).max(1),
                        glyph_h,
                    ),
                    brush,
                )?;
            }
        }
        Ok(())
    }
}

/// PNG decoder over file paths, raw bytes, and base64 `data:` URIs.
pub struct RasterImageDecoder;

impl RasterImageDecoder {
    pub fn new() -> Self {
        Self
    }

    fn bytes_for(&self, source: &ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Path(path) => {
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))
            }
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
            ImageSource::DataUri(uri) => {
                let payload = uri
                    .split_once(";base64,")
                    .map(|(_, p)| p)
                    .ok_or_else(|| anyhow!("data URI without base64 payload"))?;
                base64::engine::general_purpose::STANDARD
                    .decode(payload.trim())
                    .context("decoding base64 data URI")
            }
        }
    }
}

impl Default for RasterImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for RasterImageDecoder {
    fn decode(&self, source: &ImageSource, target: SurfaceSize) -> Result<RgbaImage> {
        let bytes = self.bytes_for(source)?;

        let decoder = png::Decoder::new(Cursor::new(bytes));
        let mut reader = decoder.read_info().context("reading PNG header")?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).context("decoding PNG frame")?;
        buf.truncate(info.buffer_size());

        let rgba: Vec<u8> = match info.color_type {
            png::ColorType::Rgba => buf,
            png::ColorType::Rgb => {
                let mut out = Vec::with_capacity(buf.len() / 3 * 4);
                for px in buf.chunks_exact(3) {
                    out.extend_from_slice(px);
                    out.push(255);
                }
                out
            }
            png::ColorType::Grayscale => {
                let mut out = Vec::with_capacity(buf.len() * 4);
                for &g in &buf {
                    out.extend_from_slice(&[g, g, g, 255]);
                }
                out
            }
            other => return Err(anyhow!("unsupported PNG color type {other:?}")),
        };

        let decoded = RgbaImage::from_raw(rgba, info.width, info.height, info.width * 4);
        if target.width == 0
            || target.height == 0
            || (target.width == info.width && target.height == info.height)
        {
            return Ok(decoded);
        }

        // nearest-neighbor resample to the requested size
        let mut out = vec![0u8; (target.width as usize) * (target.height as usize) * 4];
        for y in 0..target.height {
            for x in 0..target.width {
                let u = (x as u64 * decoded.width as u64 / target.width as u64) as u32;
                let v = (y as u64 * decoded.height as u64 / target.height as u64) as u32;
                let px = decoded.pixel(u.min(decoded.width - 1), v.min(decoded.height - 1));
                let off = (y as usize * target.width as usize + x as usize) * 4;
                out[off..off + 4].copy_from_slice(&px);
            }
        }
        Ok(RgbaImage::from_raw(out, target.width, target.height, target.width * 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Color;

    fn solid(r: u8, g: u8, b: u8) -> Brush {
        Brush::Solid(Color::from_u8(r, g, b, 255))
    }

    #[test]
    fn fill_rect_writes_inside_only() {
        let mut s = RasterSurface::new(SurfaceSize::new(10, 10));
        s.fill_rect(Rect::new(2, 2, 3, 3), &solid(255, 0, 0)).unwrap();

        let img = s.snapshot().unwrap();
        assert_eq!(img.pixel(2, 2), [255, 0, 0, 255]);
        assert_eq!(img.pixel(4, 4), [255, 0, 0, 255]);
        assert_eq!(img.pixel(5, 5), [0, 0, 0, 0]);
        assert_eq!(img.pixel(1, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn clip_restricts_painting() {
        let mut s = RasterSurface::new(SurfaceSize::new(10, 10));
        s.push_clip(Rect::new(0, 0, 4, 4));
        s.fill_rect(Rect::new(0, 0, 10, 10), &solid(0, 255, 0)).unwrap();
        s.pop_clip();

        let img = s.snapshot().unwrap();
        assert_eq!(img.pixel(3, 3), [0, 255, 0, 255]);
        assert_eq!(img.pixel(4, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn device_offset_translates_drawing() {
        let mut s = RasterSurface::new(SurfaceSize::new(10, 10));
        s.set_device_offset(-5, -5);
        s.fill_rect(Rect::new(5, 5, 2, 2), &solid(0, 0, 255)).unwrap();

        let img = s.snapshot().unwrap();
        assert_eq!(img.pixel(0, 0), [0, 0, 255, 255]);
        assert_eq!(img.pixel(2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn blit_copies_pixels_with_alpha() {
        let mut src = RasterSurface::new(SurfaceSize::new(4, 4));
        src.fill_rect(Rect::new(0, 0, 2, 2), &solid(9, 8, 7)).unwrap();

        let mut dst = RasterSurface::new(SurfaceSize::new(10, 10));
        dst.fill_rect(Rect::new(0, 0, 10, 10), &solid(1, 1, 1)).unwrap();
        dst.blit(&src, Rect::new(0, 0, 4, 4), 3, 3).unwrap();

        let img = dst.snapshot().unwrap();
        assert_eq!(img.pixel(3, 3), [9, 8, 7, 255]);
        // transparent source pixels leave the destination alone
        assert_eq!(img.pixel(6, 6), [1, 1, 1, 255]);
    }

    #[test]
    fn translucent_layers_composite_the_same_direct_or_blitted() {
        let all = Rect::new(0, 0, 8, 8);
        let white = solid(255, 255, 255);
        let red_half = Brush::Solid(Color::new(1.0, 0.0, 0.0, 0.5));
        let blue_quarter = Brush::Solid(Color::new(0.0, 0.0, 1.0, 0.25));

        let mut direct = RasterSurface::new(SurfaceSize::new(8, 8));
        direct.fill_rect(all, &white).unwrap();
        direct.fill_rect(all, &red_half).unwrap();
        direct.fill_rect(all, &blue_quarter).unwrap();

        // same layers into a transparent scratch, then composited in one blit
        let mut scratch = RasterSurface::new(SurfaceSize::new(8, 8));
        scratch.fill_rect(all, &red_half).unwrap();
        scratch.fill_rect(all, &blue_quarter).unwrap();
        let mut blitted = RasterSurface::new(SurfaceSize::new(8, 8));
        blitted.fill_rect(all, &white).unwrap();
        blitted.blit(&scratch, all, 0, 0).unwrap();

        assert_eq!(
            direct.snapshot().unwrap().pixels,
            blitted.snapshot().unwrap().pixels
        );
    }

    #[test]
    fn layout_extents_match_monospace_metrics() {
        let engine = RasterTextEngine::new();
        let font = FontSpec::new("Sans", 10.0);
        let layout = engine.layout("Hi", &font, Alignment::Left, 0).unwrap();

        // advance 6, line height 12
        assert_eq!(layout.extents(), SurfaceSize::new(12, 12));
    }

    #[test]
    fn layout_wraps_at_max_width() {
        let engine = RasterTextEngine::new();
        let font = FontSpec::new("Sans", 10.0);
        // 4 columns at advance 6 = 24px
        let layout = engine.layout("abcdefgh", &font, Alignment::Left, 24).unwrap();
        assert_eq!(layout.extents(), SurfaceSize::new(24, 24));
    }

    #[test]
    fn text_paint_is_deterministic() {
        let engine = RasterTextEngine::new();
        let font = FontSpec::new("Sans", 10.0);
        let layout = engine.layout("Hi", &font, Alignment::Left, 0).unwrap();

        let mut a = RasterSurface::new(SurfaceSize::new(20, 20));
        let mut b = RasterSurface::new(SurfaceSize::new(20, 20));
        layout.paint(&mut a, 0, 0, &solid(255, 255, 255)).unwrap();
        layout.paint(&mut b, 0, 0, &solid(255, 255, 255)).unwrap();

        assert_eq!(a.snapshot().unwrap().pixels, b.snapshot().unwrap().pixels);
    }

    #[test]
    fn decoder_rejects_garbage() {
        let decoder = RasterImageDecoder::new();
        let err = decoder.decode(&ImageSource::Bytes(vec![1, 2, 3]), SurfaceSize::new(4, 4));
        assert!(err.is_err());
    }

    #[test]
    fn decoder_reads_png_bytes_and_scales() {
        // 1x1 red PNG
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, 1, 1);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[255, 0, 0, 255]).unwrap();
        }

        let decoder = RasterImageDecoder::new();
        let img = decoder
            .decode(&ImageSource::Bytes(bytes), SurfaceSize::new(3, 2))
            .unwrap();
        assert_eq!(img.width, 3);
        assert_eq!(img.height, 2);
        assert_eq!(img.pixel(2, 1), [255, 0, 0, 255]);
    }

    fn tiny_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, 2, 1);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 255, 0, 0, 0, 255]).unwrap();
        }
        bytes
    }

    #[test]
    fn decoder_reads_paths_and_data_uris() {
        let decoder = RasterImageDecoder::new();
        let bytes = tiny_png();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        std::fs::write(&path, &bytes).unwrap();
        let from_path = decoder
            .decode(&ImageSource::Path(path), SurfaceSize::new(2, 1))
            .unwrap();
        assert_eq!(from_path.pixel(0, 0), [0, 255, 0, 255]);
        assert_eq!(from_path.pixel(1, 0), [0, 0, 255, 255]);

        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let from_uri = decoder
            .decode(&ImageSource::DataUri(uri), SurfaceSize::new(2, 1))
            .unwrap();
        assert_eq!(from_uri.pixels, from_path.pixels);

        let bad = decoder.decode(
            &ImageSource::DataUri("data:image/png,plain".into()),
            SurfaceSize::new(2, 1),
        );
        assert!(bad.is_err());
    }
}
