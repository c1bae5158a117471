//! The render-state context: all state shared between the event thread and
//! the render loop.
//!
//! Every shared collection — display list, style table, visibility
//! partitions, dirty-region queue, resize queue, surface handle, error log —
//! has its own short-held lock; there is no context-wide lock, so unrelated
//! mutations never serialize against each other. The only blocking point in
//! the system is [`SceneContext::wait_for_work`], a condition-variable wait
//! the render loop parks on.
//!
//! Lock discipline: collection locks are released before the work condvar is
//! signalled, and nothing acquires a collection lock while holding another
//! collection's lock. The context state machine is `Idle → HasWork →
//! Painting → Idle`; paint errors never change the state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::EngineConfig;
use crate::drawable::{DrawKind, Drawable};
use crate::errors::RenderError;
use crate::geometry::{classify, Overlap, Rect};
use crate::region::{DirtyRegion, RegionQueue};
use crate::render::backend::{ImageDecoder, PaintSurface, SurfaceSize, TextLayoutEngine};
use crate::style::{Brush, StyleTable};
use crate::unit::{Command, DisplayList, DisplayUnit, StyleUnit, UnitId, UnitKey};

/// Render-loop state, advanced by enqueue operations and the loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    HasWork,
    Painting,
}

pub struct SceneContext {
    /// The live window surface.
    surface: Mutex<Box<dyn PaintSurface>>,
    viewport: RwLock<Rect>,
    styles: Mutex<StyleTable>,
    background: Mutex<Brush>,
    list: RwLock<DisplayList>,
    on_screen: Mutex<Vec<Arc<Drawable>>>,
    off_screen: Mutex<Vec<Arc<Drawable>>>,
    regions: Mutex<RegionQueue>,
    resizes: Mutex<Vec<SurfaceSize>>,
    errors: Mutex<Vec<RenderError>>,

    state: Mutex<LoopState>,
    work_cv: Condvar,
    processing: AtomicBool,

    text_engine: Arc<dyn TextLayoutEngine>,
    decoder: Arc<dyn ImageDecoder>,
}

impl SceneContext {
    pub fn new(
        surface: Box<dyn PaintSurface>,
        config: &EngineConfig,
        text_engine: Arc<dyn TextLayoutEngine>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            surface: Mutex::new(surface),
            viewport: RwLock::new(config.viewport),
            styles: Mutex::new(StyleTable::new()),
            background: Mutex::new(config.background),
            list: RwLock::new(DisplayList::new()),
            on_screen: Mutex::new(Vec::new()),
            off_screen: Mutex::new(Vec::new()),
            regions: Mutex::new(RegionQueue::new()),
            resizes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            state: Mutex::new(LoopState::Idle),
            work_cv: Condvar::new(),
            processing: AtomicBool::new(true),
            text_engine,
            decoder,
        }
    }

    // ------------------------------------------------------------------
    // streaming

    /// Records a command in the display list. Style commands install into
    /// the current-style table; draw commands construct a drawable from an
    /// atomic snapshot of the table and register it for painting.
    ///
    /// Re-streaming an existing key updates the unit in place instead of
    /// appending (same path as [`update_by_key`](Self::update_by_key)).
    pub fn stream(&self, key: Option<UnitKey>, cmd: Command) -> UnitId {
        if let Some(key) = &key {
            let existing = self.list.read().lookup(key);
            if let Some(id) = existing {
                self.apply_update(id, cmd);
                return id;
            }
        }

        match cmd {
            Command::Style(attr) => {
                // the unit's invoke(): install into the style table
                self.styles.lock().install(attr.clone());
                let mut list = self.list.write();
                let id = list.reserve();
                list.push(DisplayUnit::Style(StyleUnit { id, key, attr }))
            }
            Command::Draw(kind) => {
                let snapshot = self.styles.lock().snapshot();
                let id = self.list.write().reserve();
                // building may decode images or lay out text; it must not
                // hold the list lock while it does
                let drawable = Drawable::build(
                    id,
                    key,
                    kind,
                    snapshot,
                    self.text_engine.clone(),
                    self.decoder.clone(),
                );
                self.list.write().push(DisplayUnit::Drawable(drawable.clone()));

                if let Some(err) = drawable.error() {
                    self.record_error(err);
                }
                self.add_drawable(&drawable);
                drawable.mark_processed();
                id
            }
        }
    }

    /// O(1) in-place mutation of a keyed unit. Returns false when the key
    /// is unknown.
    pub fn update_by_key(&self, key: &UnitKey, cmd: Command) -> bool {
        let id = self.list.read().lookup(key);
        match id {
            Some(id) => {
                self.apply_update(id, cmd);
                true
            }
            None => false,
        }
    }

    fn apply_update(&self, id: UnitId, cmd: Command) {
        let unit = self.list.read().get(id).cloned();
        let Some(unit) = unit else { return };

        match (unit, cmd) {
            // restyle the table slot this unit occupies; future drawables
            // pick the new value up, existing snapshots stay untouched
            (DisplayUnit::Style(mut style), Command::Style(attr)) => {
                self.styles.lock().install(attr.clone());
                style.attr = attr;
                if let Some(slot) = self.list.write().get_mut(id) {
                    *slot = DisplayUnit::Style(style);
                }
            }
            // mutate one attribute inside the drawable's own snapshot
            (DisplayUnit::Drawable(d), Command::Style(attr)) => {
                let mut snapshot = d.snapshot();
                snapshot.install(attr);
                d.update(d.kind(), snapshot);
                self.reregister(&d);
            }
            // replace the drawable's payload, keeping its snapshot
            (DisplayUnit::Drawable(d), Command::Draw(kind)) => {
                d.update(kind, d.snapshot());
                self.reregister(&d);
            }
            // a style unit cannot become a drawable in place
            (DisplayUnit::Style(_), Command::Draw(_)) => {
                log::warn!("ignoring draw update for style unit {id:?}");
            }
        }
    }

    // ------------------------------------------------------------------
    // visibility partitioning

    /// Files a drawable into the on- or off-viewport partition and, when
    /// visible, queues an object-scoped dirty region for its ink rectangle.
    pub fn add_drawable(&self, drawable: &Arc<Drawable>) {
        // unknown extents are never intersected; park the unit off-screen
        let Some(ink) = drawable.ink() else {
            drawable.set_overlap(Overlap::Out);
            self.off_screen.lock().push(drawable.clone());
            return;
        };

        let overlap = classify(ink, *self.viewport.read());
        drawable.set_overlap(overlap);

        if overlap.is_visible() {
            self.on_screen.lock().push(drawable.clone());
            self.enqueue_region(DirtyRegion::object(drawable.id(), ink));
        } else {
            self.off_screen.lock().push(drawable.clone());
        }
    }

    /// Re-files an updated drawable: drops its superseded dirty regions,
    /// removes it from both partitions, and registers it afresh.
    fn reregister(&self, drawable: &Arc<Drawable>) {
        if let Some(err) = drawable.error() {
            self.record_error(err);
        }
        {
            self.regions.lock().drop_for_unit(drawable.id());
        }
        let id = drawable.id();
        self.on_screen.lock().retain(|d| d.id() != id);
        self.off_screen.lock().retain(|d| d.id() != id);
        self.add_drawable(drawable);
    }

    /// Rescans the off-viewport partition after the viewport changed and
    /// moves newly visible members on-screen (queueing their regions).
    /// Units never move on→off here; only `clear` empties the on-partition.
    pub fn partition_visibility(&self) {
        let viewport = *self.viewport.read();
        let mut moved = Vec::new();
        {
            let mut off = self.off_screen.lock();
            off.retain(|d| {
                let Some(ink) = d.ink() else { return true };
                let overlap = classify(ink, viewport);
                if overlap.is_visible() {
                    d.set_overlap(overlap);
                    moved.push((d.clone(), ink));
                    false
                } else {
                    true
                }
            });
        }
        if moved.is_empty() {
            return;
        }
        {
            let mut on = self.on_screen.lock();
            for (d, _) in &moved {
                on.push(d.clone());
            }
        }
        for (d, ink) in moved {
            log::debug!("drawable {:?} became visible", d.id());
            self.enqueue_region(DirtyRegion::object(d.id(), ink));
        }
    }

    /// Snapshot of the on-viewport partition, in insertion (paint) order.
    pub fn on_screen(&self) -> Vec<Arc<Drawable>> {
        self.on_screen.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn partition_sizes(&self) -> (usize, usize) {
        (self.on_screen.lock().len(), self.off_screen.lock().len())
    }

    // ------------------------------------------------------------------
    // dirty regions and resizes

    /// Queues an object-scoped or OS-surface region and wakes the loop.
    pub fn enqueue_region(&self, region: DirtyRegion) {
        {
            self.regions.lock().push(region);
        }
        self.signal_work();
    }

    /// Queues window-level damage (expose/resize), ordered ahead of any
    /// object-scoped repaint.
    pub fn enqueue_surface_region(&self, rect: Rect) {
        self.enqueue_region(DirtyRegion::surface(rect));
    }

    pub fn next_region(&self) -> Option<DirtyRegion> {
        self.regions.lock().pop()
    }

    /// Requests a surface resize; requests are coalesced by
    /// [`apply_pending_resize`](Self::apply_pending_resize).
    pub fn request_resize(&self, size: SurfaceSize) {
        {
            self.resizes.lock().push(size);
        }
        self.signal_work();
    }

    /// Applies the batch of pending resize requests as a single surface
    /// resize, sized to the last request. Queues full-surface damage and
    /// re-partitions. Returns true when a resize happened.
    pub fn apply_pending_resize(&self) -> Result<bool, RenderError> {
        let pending = std::mem::take(&mut *self.resizes.lock());
        let Some(size) = pending.last().copied() else {
            return Ok(false);
        };
        if pending.len() > 1 {
            log::debug!("coalesced {} resize requests into one", pending.len());
        }

        {
            let mut surface = self.surface.lock();
            surface.resize(size).map_err(RenderError::surface)?;
        }
        {
            let mut viewport = self.viewport.write();
            viewport.width = size.width;
            viewport.height = size.height;
        }
        let viewport = *self.viewport.read();
        self.enqueue_surface_region(Rect::new(viewport.x, viewport.y, size.width, size.height));
        self.partition_visibility();
        Ok(true)
    }

    /// True iff the dirty-region queue or the resize queue is non-empty.
    pub fn has_pending_work(&self) -> bool {
        !self.regions.lock().is_empty() || !self.resizes.lock().is_empty()
    }

    // ------------------------------------------------------------------
    // loop coordination

    fn signal_work(&self) {
        let mut state = self.state.lock();
        if *state == LoopState::Idle {
            *state = LoopState::HasWork;
        }
        self.work_cv.notify_one();
    }

    /// Blocks until work arrives or shutdown is requested. Returns false on
    /// shutdown. On a true return the state is `Painting`.
    pub fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if !self.is_processing() {
                return false;
            }
            if self.has_pending_work() {
                *state = LoopState::Painting;
                return true;
            }
            *state = LoopState::Idle;
            self.work_cv.wait(&mut state);
        }
    }

    /// Marks the queue drained; back to `Idle` unless new work raced in.
    pub fn finish_painting(&self) {
        let mut state = self.state.lock();
        *state = if self.has_pending_work() {
            LoopState::HasWork
        } else {
            LoopState::Idle
        };
    }

    pub fn loop_state(&self) -> LoopState {
        *self.state.lock()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Clears the processing flag and wakes the loop so it can observe the
    /// flag and exit — the flag alone would leave a dangling wait.
    pub fn shutdown(&self) {
        self.processing.store(false, Ordering::Release);
        let _state = self.state.lock();
        self.work_cv.notify_all();
    }

    // ------------------------------------------------------------------
    // surface and styles

    /// Runs `f` with the live surface locked.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut dyn PaintSurface) -> R) -> R {
        let mut surface = self.surface.lock();
        f(surface.as_mut())
    }

    pub fn viewport(&self) -> Rect {
        *self.viewport.read()
    }

    /// Moves the viewport origin (scrolling) and rescans visibility.
    pub fn set_viewport_origin(&self, x: i32, y: i32) {
        {
            let mut viewport = self.viewport.write();
            viewport.x = x;
            viewport.y = y;
        }
        let viewport = *self.viewport.read();
        self.enqueue_surface_region(viewport);
        self.partition_visibility();
    }

    pub fn background(&self) -> Brush {
        *self.background.lock()
    }

    pub fn set_background(&self, brush: Brush) {
        *self.background.lock() = brush;
        self.enqueue_surface_region(*self.viewport.read());
    }

    /// Drops all drawables, the display list, and object-scoped regions.
    /// OS-surface regions survive so pending window damage still repaints
    /// (to the background brush). The style table resets with the list.
    pub fn clear(&self) {
        self.on_screen.lock().clear();
        self.off_screen.lock().clear();
        self.list.write().clear();
        self.styles.lock().reset();
        {
            self.regions.lock().retain_surface_regions();
        }
        self.signal_work();
    }

    // ------------------------------------------------------------------
    // errors

    /// Mirrors a unit-level failure into the process-wide error log.
    pub fn record_error(&self, err: RenderError) {
        log::error!("render error recorded: {err}");
        self.errors.lock().push(err);
    }

    pub fn errors(&self) -> Vec<RenderError> {
        self.errors.lock().clone()
    }
}
