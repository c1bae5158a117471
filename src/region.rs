//! Dirty regions and the repaint queue.
//!
//! A [`DirtyRegion`] is either an OS-surface rectangle (window expose or
//! resize damage) or an object-scoped rectangle tied to one drawable's
//! identity. The [`RegionQueue`] drains FIFO with one exception: OS-surface
//! regions always sit ahead of object-scoped regions, so a freshly resized
//! or exposed surface is repainted before per-object redraw is attempted.

use std::collections::VecDeque;

use crate::geometry::Rect;
use crate::unit::UnitId;

/// One queued repaint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRegion {
    /// True for window-level damage (expose/resize), false for object damage.
    pub os_surface: bool,
    /// The owning drawable, for object-scoped regions.
    pub unit: Option<UnitId>,
    pub rect: Rect,
}

impl DirtyRegion {
    /// Window-level damage.
    pub fn surface(rect: Rect) -> Self {
        Self { os_surface: true, unit: None, rect }
    }

    /// Damage scoped to one drawable's ink rectangle.
    pub fn object(unit: UnitId, rect: Rect) -> Self {
        Self { os_surface: false, unit: Some(unit), rect }
    }
}

/// FIFO repaint queue with the OS-surface-ahead ordering rule.
#[derive(Debug, Default)]
pub struct RegionQueue {
    regions: VecDeque<DirtyRegion>,
    /// Number of OS-surface entries at the front of the queue.
    surface_len: usize,
}

impl RegionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a region. OS-surface regions are inserted behind any other
    /// OS-surface regions but ahead of every object-scoped region; object
    /// regions append at the tail.
    pub fn push(&mut self, region: DirtyRegion) {
        if region.os_surface {
            self.regions.insert(self.surface_len, region);
            self.surface_len += 1;
        } else {
            self.regions.push_back(region);
        }
    }

    /// Dequeues the next region to paint.
    pub fn pop(&mut self) -> Option<DirtyRegion> {
        let region = self.regions.pop_front()?;
        if region.os_surface {
            self.surface_len -= 1;
        }
        Some(region)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Drops object-scoped regions, keeping OS-surface damage. Used by
    /// `clear`: the drawables the object regions pointed at are gone, but
    /// window damage must still repaint (to the background brush).
    pub fn retain_surface_regions(&mut self) {
        self.regions.retain(|r| r.os_surface);
        self.surface_len = self.regions.len();
    }

    /// Drops regions owned by a specific drawable (used on indirect update,
    /// where the old ink rectangle is superseded).
    pub fn drop_for_unit(&mut self, unit: UnitId) {
        self.regions.retain(|r| r.unit != Some(unit));
        self.surface_len = self.regions.iter().take_while(|r| r.os_surface).count();
    }
}
