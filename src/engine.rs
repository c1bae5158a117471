//! The engine facade: owns the scene context, the render thread, and the
//! cache-priming pool, and exposes the streaming API the host calls.
//!
//! Construction is the only fatal failure point (the initial surface must
//! exist). Everything after that fails soft: unit-level errors are recorded
//! per unit and mirrored into [`Engine::errors`], and painting carries on.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cache::CachePrimer;
use crate::config::EngineConfig;
use crate::errors::RenderError;
use crate::geometry::Rect;
use crate::render::backend::{DrawingEngine, ImageDecoder, SurfaceSize, TextLayoutEngine};
use crate::render_loop::RenderLoop;
use crate::scene::{LoopState, SceneContext};
use crate::style::Brush;
use crate::unit::{Command, UnitId, UnitKey};

pub struct Engine {
    ctx: Arc<SceneContext>,
    primer: CachePrimer,
    render_thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Builds the engine around the host's collaborators: a drawing engine
    /// for surfaces, a text-layout engine, and an image decoder. Fails only
    /// when the initial surface cannot be created.
    pub fn new(
        config: EngineConfig,
        drawing: Arc<dyn DrawingEngine>,
        text: Arc<dyn TextLayoutEngine>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Result<Engine, RenderError> {
        let surface = drawing
            .create_surface(SurfaceSize::from(config.viewport))
            .map_err(RenderError::resource)?;
        log::info!(
            "engine up: {} backend, {}x{} viewport, {} cache workers",
            drawing.name(),
            config.viewport.width,
            config.viewport.height,
            config.cache.workers,
        );

        let ctx = Arc::new(SceneContext::new(surface, &config, text, decoder));
        let primer = CachePrimer::new(drawing, config.cache.workers);
        let render_thread =
            RenderLoop::spawn(ctx.clone(), primer.queue(), config.cache.threshold);

        Ok(Engine { ctx, primer, render_thread: Some(render_thread) })
    }

    /// The shared scene context, for event pumps and direct inspection.
    pub fn context(&self) -> &Arc<SceneContext> {
        &self.ctx
    }

    /// Streams an anonymous command into the display list.
    pub fn stream(&self, cmd: impl Into<Command>) -> UnitId {
        self.ctx.stream(None, cmd.into())
    }

    /// Streams a keyed command. Re-using a key updates the existing unit in
    /// place instead of appending.
    pub fn stream_keyed(&self, key: impl Into<UnitKey>, cmd: impl Into<Command>) -> UnitId {
        self.ctx.stream(Some(key.into()), cmd.into())
    }

    /// Mutates the unit behind `key`. Returns false for unknown keys.
    pub fn update_by_key(&self, key: &UnitKey, cmd: impl Into<Command>) -> bool {
        self.ctx.update_by_key(key, cmd.into())
    }

    /// Requests a surface resize. Requests are coalesced: a burst of N
    /// becomes one resize to the last size.
    pub fn resize(&self, width: u32, height: u32) {
        self.ctx.request_resize(SurfaceSize::new(width, height));
    }

    /// Moves the viewport origin (scrolling).
    pub fn scroll_to(&self, x: i32, y: i32) {
        self.ctx.set_viewport_origin(x, y);
    }

    pub fn viewport(&self) -> Rect {
        self.ctx.viewport()
    }

    pub fn set_background(&self, brush: Brush) {
        self.ctx.set_background(brush);
    }

    /// Drops the whole display list; pending window damage still repaints.
    pub fn clear(&self) {
        self.ctx.clear();
    }

    /// Every unit-level error recorded so far, oldest first.
    pub fn errors(&self) -> Vec<RenderError> {
        self.ctx.errors()
    }

    /// Blocks until the render loop drains its queue and goes idle, or the
    /// timeout passes. Returns true when idle was reached. Intended for
    /// tests and batch hosts; interactive hosts never need it.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.ctx.loop_state() == LoopState::Idle && !self.ctx.has_pending_work() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    /// Stops the render loop and the cache pool and joins their threads.
    /// Idempotent; also runs on drop. In-flight work finishes first.
    pub fn shutdown(&mut self) {
        self.ctx.shutdown();
        if let Some(handle) = self.render_thread.take() {
            if handle.join().is_err() {
                log::error!("render loop panicked");
            }
        }
        self.primer.shutdown();
        log::info!("engine down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::DrawKind;
    use crate::render::backends::raster::{RasterEngine, RasterImageDecoder, RasterTextEngine};
    use crate::style::{Color, FontSpec, StyleAttr};

    fn engine(viewport: Rect) -> Engine {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = EngineConfig { viewport, ..EngineConfig::default() };
        Engine::new(
            config,
            Arc::new(RasterEngine::new()),
            Arc::new(RasterTextEngine::new()),
            Arc::new(RasterImageDecoder::new()),
        )
        .unwrap()
    }

    fn pixel(engine: &Engine, x: u32, y: u32) -> [u8; 4] {
        engine.context().with_surface(|s| s.snapshot().unwrap().pixel(x, y))
    }

    #[test]
    fn end_to_end_text_paint() {
        let eng = engine(Rect::new(0, 0, 200, 100));
        eng.stream(StyleAttr::Coordinates(Rect::new(10, 10, 150, 40)));
        eng.stream(StyleAttr::Font(FontSpec::new("Sans", 12.0)));
        eng.stream(StyleAttr::Fill(Brush::Solid(Color::BLACK)));
        eng.stream(DrawKind::Text { content: "hello".into() });

        assert!(eng.wait_until_idle(Duration::from_secs(2)));
        let shot = eng.context().with_surface(|s| s.snapshot().unwrap());
        // block glyphs leave black somewhere inside the coordinate box
        let hit = (10..160).any(|x| (10..50).any(|y| shot.pixel(x, y) == Color::BLACK.to_rgba8()));
        assert!(hit);
        assert!(eng.errors().is_empty());
    }

    #[test]
    fn keyed_restream_replaces_not_appends() {
        let eng = engine(Rect::new(0, 0, 100, 100));
        eng.stream(StyleAttr::Coordinates(Rect::new(0, 0, 50, 50)));
        eng.stream(StyleAttr::Fill(Brush::Solid(Color::BLACK)));
        let first = eng.stream_keyed("box", DrawKind::Rect);
        let second = eng.stream_keyed("box", DrawKind::Rect);
        assert_eq!(first, second);

        assert!(eng.wait_until_idle(Duration::from_secs(2)));
        assert_eq!(pixel(&eng, 25, 25), Color::BLACK.to_rgba8());
    }

    #[test]
    fn update_by_key_recolors_on_screen() {
        let eng = engine(Rect::new(0, 0, 100, 100));
        eng.stream(StyleAttr::Coordinates(Rect::new(0, 0, 100, 100)));
        eng.stream(StyleAttr::Fill(Brush::Solid(Color::BLACK)));
        eng.stream_keyed("fill", DrawKind::Rect);
        assert!(eng.wait_until_idle(Duration::from_secs(2)));

        let red = Color::from_u8(255, 0, 0, 255);
        assert!(eng.update_by_key(&"fill".into(), StyleAttr::Fill(Brush::Solid(red))));
        assert!(eng.wait_until_idle(Duration::from_secs(2)));
        assert_eq!(pixel(&eng, 50, 50), red.to_rgba8());

        assert!(!eng.update_by_key(&"missing".into(), DrawKind::Rect));
    }

    #[test]
    fn failed_unit_is_reported_but_not_fatal() {
        let eng = engine(Rect::new(0, 0, 100, 100));
        // text without a font: unit-level error
        eng.stream(StyleAttr::Coordinates(Rect::new(0, 0, 50, 20)));
        eng.stream(DrawKind::Text { content: "no font".into() });
        // a later unit still paints
        eng.stream(StyleAttr::Fill(Brush::Solid(Color::BLACK)));
        eng.stream(DrawKind::Rect);

        assert!(eng.wait_until_idle(Duration::from_secs(2)));
        assert!(matches!(eng.errors().as_slice(), [RenderError::MissingAttribute(_)]));
        assert_eq!(pixel(&eng, 25, 10), Color::BLACK.to_rgba8());
    }

    #[test]
    fn repeated_paints_prime_the_cache() {
        let eng = engine(Rect::new(0, 0, 100, 100));
        eng.stream(StyleAttr::Coordinates(Rect::new(0, 0, 60, 60)));
        eng.stream(StyleAttr::Fill(Brush::Solid(Color::BLACK)));
        eng.stream_keyed("box", DrawKind::Rect);
        assert!(eng.wait_until_idle(Duration::from_secs(2)));

        // paint in quick succession via expose damage
        for _ in 0..3 {
            eng.context().enqueue_surface_region(Rect::new(0, 0, 100, 100));
            assert!(eng.wait_until_idle(Duration::from_secs(2)));
        }

        let d = eng.context().on_screen()[0].clone();
        let primed = (0..200).any(|_| {
            if d.is_cached() {
                true
            } else {
                std::thread::sleep(Duration::from_millis(5));
                false
            }
        });
        assert!(primed);
        // blit path still produces the same pixels
        eng.context().enqueue_surface_region(Rect::new(0, 0, 100, 100));
        assert!(eng.wait_until_idle(Duration::from_secs(2)));
        assert_eq!(pixel(&eng, 30, 30), Color::BLACK.to_rgba8());
    }

    #[test]
    fn shutdown_is_idempotent_and_joins() {
        let mut eng = engine(Rect::new(0, 0, 50, 50));
        eng.shutdown();
        eng.shutdown();
        // drop runs shutdown a third time
    }
}
