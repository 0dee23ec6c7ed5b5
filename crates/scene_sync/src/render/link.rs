//! World attachment state shared by all render-side objects

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::render::world::RWorld;

/// Back-reference from a render object to its owning world plus the
/// two-phase-delete marker
///
/// The back edge is weak: worlds own their content, content never owns the
/// world. The removal marker lets the logic thread flag an object for
/// removal without unlinking it while a render pass may still be in flight;
/// the actual unlink happens in the per-category removal sweeps.
#[derive(Debug, Default)]
pub(crate) struct WorldLink {
    world: Mutex<Weak<RWorld>>,
    marked_remove: AtomicBool,
}

impl WorldLink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Owning world, if attached and still alive
    pub(crate) fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.world.lock().unwrap().upgrade()
    }

    /// True if currently attached to exactly this world
    pub(crate) fn is_parent(&self, world: &Arc<RWorld>) -> bool {
        self.world.lock().unwrap().ptr_eq(&Arc::downgrade(world))
    }

    /// True if attached to any world
    pub(crate) fn has_parent(&self) -> bool {
        self.world.lock().unwrap().strong_count() > 0
    }

    pub(crate) fn set_parent(&self, world: Option<&Arc<RWorld>>) {
        *self.world.lock().unwrap() = world.map_or_else(Weak::new, Arc::downgrade);
    }

    /// Two-phase-delete marker
    pub(crate) fn marked_remove(&self) -> bool {
        self.marked_remove.load(Ordering::Acquire)
    }

    pub(crate) fn set_marked_remove(&self, marked: bool) {
        self.marked_remove.store(marked, Ordering::Release);
    }
}
