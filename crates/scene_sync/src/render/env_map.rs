//! Render-side environment map
//!
//! Environment maps exist only on the render side. They are created by
//! env-map probes and by the world itself (the sky fallback map) and are
//! consumed by components, billboards and particle emitter instances, which
//! resolve "the environment map influencing me" during the prepare pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::foundation::math::DVec3;

/// State behind the environment map's lock
#[derive(Debug)]
struct REnvMapState {
    position: DVec3,
    influence_priority: i32,
    size: u32,
    /// Cube map content is stale and needs a re-render
    dirty: bool,
    /// Number of times the map content was (re)built
    update_count: u64,
}

/// Reference-counted render-side environment map
#[derive(Debug)]
pub struct REnvMap {
    /// Map reflects only the sky, used as the world-wide fallback
    sky_only: bool,

    /// Keep the map alive even when nothing references it
    keep_unused: bool,

    /// Set while the map is registered with a world's env-map list
    in_world: AtomicBool,

    state: RwLock<REnvMapState>,
}

impl REnvMap {
    /// Create a map at the given cube-face resolution
    pub fn new(size: u32) -> Self {
        Self {
            sky_only: false,
            keep_unused: false,
            in_world: AtomicBool::new(false),
            state: RwLock::new(REnvMapState {
                position: DVec3::zeros(),
                influence_priority: 0,
                size,
                dirty: true,
                update_count: 0,
            }),
        }
    }

    /// Create the world-wide sky fallback map
    pub(crate) fn new_sky(size: u32) -> Self {
        Self {
            sky_only: true,
            keep_unused: true,
            in_world: AtomicBool::new(false),
            state: RwLock::new(REnvMapState {
                position: DVec3::zeros(),
                influence_priority: -1,
                size,
                dirty: true,
                update_count: 0,
            }),
        }
    }

    /// True if this map reflects only the sky
    pub fn sky_only(&self) -> bool {
        self.sky_only
    }

    /// True if the map must survive without consumers
    pub fn keep_unused(&self) -> bool {
        self.keep_unused
    }

    pub(crate) fn in_world(&self) -> bool {
        self.in_world.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_world(&self, in_world: bool) {
        self.in_world.store(in_world, Ordering::Release);
    }

    /// World-space center of the map's influence
    pub fn position(&self) -> DVec3 {
        self.state.read().unwrap().position
    }

    pub(crate) fn set_position(&self, position: DVec3) {
        self.state.write().unwrap().position = position;
    }

    /// Maps with higher priority win over overlapping lower-priority maps
    pub fn influence_priority(&self) -> i32 {
        self.state.read().unwrap().influence_priority
    }

    pub(crate) fn set_influence_priority(&self, priority: i32) {
        self.state.write().unwrap().influence_priority = priority;
    }

    /// Cube-face resolution in pixels
    pub fn size(&self) -> u32 {
        self.state.read().unwrap().size
    }

    /// The sky feeding this map changed; content must be re-rendered
    pub(crate) fn sky_changed(&self) {
        self.state.write().unwrap().dirty = true;
    }

    /// Mark the map content stale
    pub(crate) fn invalidate(&self) {
        self.state.write().unwrap().dirty = true;
    }

    /// True if the content needs a re-render
    pub fn is_dirty(&self) -> bool {
        self.state.read().unwrap().dirty
    }

    /// Times the map content was rebuilt
    pub fn update_count(&self) -> u64 {
        self.state.read().unwrap().update_count
    }

    /// Rebuild the map content if stale and the frame budget allows it
    ///
    /// Returns true if a budget slot was consumed. The actual cube-map
    /// rendering is downstream of this core; what matters here is that at
    /// most `budget` maps flip from stale to current per prepared frame.
    pub(crate) fn prepare_for_render(&self, budget: &mut u32) -> bool {
        let mut state = self.state.write().unwrap();
        if !state.dirty || *budget == 0 {
            return false;
        }

        state.dirty = false;
        state.update_count += 1;
        *budget -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_respects_budget() {
        let map = REnvMap::new(128);
        let mut budget = 0;
        assert!(!map.prepare_for_render(&mut budget), "no budget, no update");
        assert!(map.is_dirty());

        let mut budget = 1;
        assert!(map.prepare_for_render(&mut budget));
        assert_eq!(budget, 0);
        assert!(!map.is_dirty());

        // clean map leaves the budget alone
        let mut budget = 1;
        assert!(!map.prepare_for_render(&mut budget));
        assert_eq!(budget, 1);
    }

    #[test]
    fn test_sky_map_defaults() {
        let map = REnvMap::new_sky(128);
        assert!(map.sky_only());
        assert!(map.keep_unused());
        assert_eq!(map.influence_priority(), -1);
    }

    #[test]
    fn test_sky_changed_marks_dirty() {
        let map = REnvMap::new(64);
        let mut budget = 4;
        map.prepare_for_render(&mut budget);
        assert!(!map.is_dirty());

        map.sky_changed();
        assert!(map.is_dirty());
    }
}
