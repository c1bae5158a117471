use std::time::Duration;

use crate::geometry::Rect;
use crate::style::Brush;

/// Cache-priming policy.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Two paints closer together than this make a drawable eligible for
    /// off-screen cache priming. Eligibility only — staleness always
    /// invalidates regardless of timing.
    pub threshold: Duration,
    /// Worker threads in the priming pool.
    pub workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(500),
            workers: num_cpus::get().min(4),
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial viewport (also the initial surface size).
    pub viewport: Rect,
    /// Brush painted under every repainted region.
    pub background: Brush,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Rect::new(0, 0, 800, 600),
            background: Brush::default(),        // white
            cache: CacheConfig::default(),
        }
    }
}
