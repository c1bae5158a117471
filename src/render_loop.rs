//! The background paint thread.
//!
//! One pass per wakeup: apply the coalesced resize batch, requeue regions
//! for on-viewport drawables whose content hash moved since their last
//! paint, then drain the dirty-region queue. Each region is painted
//! independently: background fill, then every overlapping on-viewport
//! drawable in insertion (z) order. A surface fault abandons that one
//! region; the pass continues with the next.
//!
//! Painting never blocks streaming: the loop works from snapshots of the
//! shared collections and takes the surface lock only while pixels move.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hashbrown::HashSet;

use crate::cache::PrimeQueue;
use crate::drawable::Drawable;
use crate::errors::RenderError;
use crate::geometry::{classify, Overlap};
use crate::region::DirtyRegion;
use crate::scene::SceneContext;

pub struct RenderLoop {
    ctx: Arc<SceneContext>,
    primer: PrimeQueue,
    cache_threshold: Duration,
}

impl RenderLoop {
    /// Spawns the paint thread. It parks on the context's work condvar and
    /// exits when [`SceneContext::shutdown`] is called; any region being
    /// painted at that moment finishes first.
    pub fn spawn(
        ctx: Arc<SceneContext>,
        primer: PrimeQueue,
        cache_threshold: Duration,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("render-loop".into())
            .spawn(move || RenderLoop { ctx, primer, cache_threshold }.run())
            .expect("spawning render loop")
    }

    fn run(self) {
        log::debug!("render loop up");
        while self.ctx.wait_for_work() {
            self.pass();
            self.ctx.finish_painting();
        }
        log::debug!("render loop down");
    }

    /// One full pass over the pending work.
    fn pass(&self) {
        match self.ctx.apply_pending_resize() {
            Ok(true) => log::debug!("surface resized to {:?}", self.ctx.viewport()),
            Ok(false) => {}
            Err(err) => self.ctx.record_error(err),
        }

        self.requeue_stale();

        // shutdown is observed between regions, never inside one
        let mut consumed = Vec::new();
        while self.ctx.is_processing() {
            let Some(region) = self.ctx.next_region() else { break };
            match self.paint_region(&region) {
                Ok(painted) => consumed.extend(painted),
                Err(err) => {
                    // fail soft: this region is lost, the queue survives
                    log::warn!("abandoning region {:?}: {err}", region.rect);
                    self.ctx.record_error(err);
                }
            }
        }

        // a drawable may span several regions; its hash is consumed once per
        // pass, after every region it touched has painted
        let mut seen = HashSet::new();
        for drawable in consumed {
            if !seen.insert(drawable.id()) {
                continue;
            }
            drawable.commit_hash();
            if drawable.should_prime(self.cache_threshold) {
                self.primer.submit(drawable);
            }
        }
    }

    /// Queues a repaint for every on-viewport drawable mutated since its
    /// last paint. Never-painted drawables are skipped; registration
    /// already queued their region.
    fn requeue_stale(&self) {
        for drawable in self.ctx.on_screen() {
            if !drawable.has_committed_hash() || !drawable.is_stale() {
                continue;
            }
            if let Some(ink) = drawable.ink() {
                log::debug!("drawable {:?} is stale, requeueing", drawable.id());
                self.ctx.enqueue_region(DirtyRegion::object(drawable.id(), ink));
            }
        }
    }

    /// Repaints one region: background, then overlapping drawables. Returns
    /// the drawables whose state this paint consumed.
    fn paint_region(&self, region: &DirtyRegion) -> Result<Vec<Arc<Drawable>>, RenderError> {
        if region.rect.is_empty() {
            return Ok(Vec::new());
        }
        let background = self.ctx.background();
        let viewport = self.ctx.viewport();
        let on_screen = self.ctx.on_screen();

        self.ctx.with_surface(|surface| {
            // scene coordinates; the offset maps them to window pixels
            surface.set_device_offset(-viewport.x, -viewport.y);
            let result = (|| {
                surface
                    .fill_rect(region.rect, &background)
                    .map_err(RenderError::surface)?;

                let mut painted = Vec::new();
                for drawable in &on_screen {
                    let Some(ink) = drawable.ink() else { continue };
                    match classify(ink, region.rect) {
                        Overlap::Out => {}
                        Overlap::In => {
                            drawable.draw_full(surface)?;
                            painted.push(drawable.clone());
                        }
                        Overlap::Part(isect) => {
                            drawable.draw_clipped(surface, isect)?;
                            painted.push(drawable.clone());
                        }
                    }
                }

                surface.flush().map_err(RenderError::surface)?;
                Ok(painted)
            })();
            surface.set_device_offset(0, 0);
            result
        })
    }
}
