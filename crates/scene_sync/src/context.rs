//! Process-wide state, injected instead of global

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::render::DelayedOperations;
use crate::spatial::SpatialId;

/// Shared state every world and peer needs: configuration, the delayed
/// operations queue and the spatial id allocator
///
/// There are no globals in this crate; anything process-wide lives here and
/// is handed to constructors explicitly. Cloning is cheap (shared handles).
#[derive(Debug, Clone)]
pub struct RenderContext {
    config: Arc<SyncConfig>,
    delayed: Arc<DelayedOperations>,
    next_spatial_id: Arc<AtomicU64>,
}

impl RenderContext {
    /// Create a context with the given configuration
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config: Arc::new(config),
            delayed: Arc::new(DelayedOperations::new()),
            next_spatial_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The deferred-free queue; drain once per frame from the render thread
    pub fn delayed_operations(&self) -> &Arc<DelayedOperations> {
        &self.delayed
    }

    /// Allocate a process-unique spatial id
    pub(crate) fn next_spatial_id(&self) -> SpatialId {
        SpatialId::new(self.next_spatial_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
