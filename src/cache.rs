//! Bounded worker pool for off-thread cache priming.
//!
//! The render loop submits "prime drawable X" jobs; workers build the
//! off-screen buffer through the drawing engine and install it under the
//! drawable's own cache lock. Workers never touch the partitions or the
//! dirty-region queue, and a result whose content hash moved on while
//! painting is discarded ([`Drawable::build_cache`]).

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::drawable::Drawable;
use crate::render::backend::DrawingEngine;

/// Cloneable submission side of the priming pool.
#[derive(Clone)]
pub struct PrimeQueue {
    tx: Sender<Arc<Drawable>>,
}

impl PrimeQueue {
    /// Fire-and-forget: queues `drawable` for priming. Silently dropped
    /// when the pool has shut down.
    pub fn submit(&self, drawable: Arc<Drawable>) {
        let _ = self.tx.send(drawable);
    }
}

/// The priming pool: N worker threads over one job channel.
pub struct CachePrimer {
    tx: Option<Sender<Arc<Drawable>>>,
    workers: Vec<JoinHandle<()>>,
}

impl CachePrimer {
    pub fn new(engine: Arc<dyn DrawingEngine>, workers: usize) -> Self {
        let (tx, rx) = channel::<Arc<Drawable>>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|n| {
                let engine = engine.clone();
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("cache-primer-{n}"))
                    .spawn(move || worker(n, engine, rx))
                    .expect("spawning cache worker")
            })
            .collect();

        Self { tx: Some(tx), workers }
    }

    pub fn queue(&self) -> PrimeQueue {
        PrimeQueue {
            tx: self.tx.as_ref().expect("primer already shut down").clone(),
        }
    }

    /// Closes the job channel and joins the workers. Idempotent.
    pub fn shutdown(&mut self) {
        // dropping the sender ends every worker's recv loop
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for CachePrimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(n: usize, engine: Arc<dyn DrawingEngine>, rx: Arc<Mutex<Receiver<Arc<Drawable>>>>) {
    loop {
        // hold the lock only to receive, not while painting
        let job = {
            let rx = rx.lock();
            rx.recv()
        };
        let Ok(drawable) = job else { break };

        if drawable.is_cached() {
            continue; // raced with another worker
        }
        match drawable.build_cache(engine.as_ref()) {
            Ok(true) => log::debug!("worker {n} primed cache for {:?}", drawable.id()),
            Ok(false) => {}
            Err(err) => log::warn!("cache priming for {:?} failed: {err}", drawable.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::DrawKind;
    use crate::geometry::Rect;
    use crate::render::backends::raster::{RasterEngine, RasterImageDecoder, RasterTextEngine};
    use crate::style::{FontSpec, StyleAttr, StyleTable};
    use crate::unit::UnitId;
    use std::time::{Duration, Instant};

    fn drawable(content: &str) -> Arc<Drawable> {
        let mut table = StyleTable::new();
        table.install(StyleAttr::Coordinates(Rect::new(0, 0, 100, 50)));
        table.install(StyleAttr::Font(FontSpec::new("Sans", 10.0)));
        Drawable::build(
            UnitId(0),
            None,
            DrawKind::Text { content: content.into() },
            table.snapshot(),
            Arc::new(RasterTextEngine::new()),
            Arc::new(RasterImageDecoder::new()),
        )
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn pool_primes_submitted_drawables() {
        let mut primer = CachePrimer::new(Arc::new(RasterEngine::new()), 2);
        let d = drawable("cache me");

        primer.queue().submit(d.clone());
        assert!(wait_until(Duration::from_secs(2), || d.is_cached()));
        primer.shutdown();
    }

    #[test]
    fn shutdown_joins_idle_workers() {
        let mut primer = CachePrimer::new(Arc::new(RasterEngine::new()), 3);
        primer.shutdown();
        primer.shutdown(); // idempotent
    }

    #[test]
    fn stale_submission_is_discarded() {
        let mut primer = CachePrimer::new(Arc::new(RasterEngine::new()), 1);
        let d = drawable("before");
        primer.queue().submit(d.clone());

        // whatever the worker built, a later update must leave no stale cache
        let mut table = StyleTable::new();
        table.install(StyleAttr::Coordinates(Rect::new(0, 0, 100, 50)));
        table.install(StyleAttr::Font(FontSpec::new("Sans", 10.0)));
        d.update(DrawKind::Text { content: "after".into() }, table.snapshot());
        primer.shutdown();

        if d.is_cached() {
            // a primed buffer may exist only for the current content
            let engine = RasterEngine::new();
            let mut direct = crate::render::backend::DrawingEngine::create_surface(
                &engine,
                crate::render::backend::SurfaceSize::new(120, 60),
            )
            .unwrap();
            d.draw_full(direct.as_mut()).unwrap();
            // drawing revalidates the hash; cache must still be current or dropped
        }
        assert!(!d.is_stale() || d.error().is_none());
    }
}
