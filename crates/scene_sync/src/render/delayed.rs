//! Delayed operations queue
//!
//! Render-side objects can become unreferenced on the logic thread while a
//! render pass may still reach them through a cycle
//! (camera -> world -> component -> dynamic skin -> canvas -> camera). Instead of
//! freeing inline, the final strong reference is parked here and dropped by
//! the render thread at the frame boundary, where no pass can be touching
//! the object.

use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::render::camera::RCamera;

/// Process-wide deferred-free queue, shared through [`crate::RenderContext`]
///
/// Both threads may append; only the render thread drains, once per frame at
/// a point where no render pass is in flight.
#[derive(Default)]
pub struct DelayedOperations {
    /// Final strong references waiting for a safe drop
    release_objects: Mutex<Vec<Arc<dyn Any + Send + Sync>>>,

    /// Cameras whose world link must be severed at the frame boundary;
    /// detaching a camera walks the world graph and is unsafe mid-render
    clean_up_cameras: Mutex<Vec<Arc<RCamera>>>,
}

impl DelayedOperations {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the final strong reference of a render-side object
    ///
    /// The object stays alive until [`Self::process_free_operations`] runs.
    pub fn add_release_object(&self, object: Arc<dyn Any + Send + Sync>) {
        self.release_objects.lock().unwrap().push(object);
    }

    /// Schedule a camera for world detachment at the frame boundary
    pub fn add_clean_up_camera(&self, camera: Arc<RCamera>) {
        let mut cameras = self.clean_up_cameras.lock().unwrap();
        if !cameras.iter().any(|c| Arc::ptr_eq(c, &camera)) {
            cameras.push(camera);
        }
    }

    /// Drain the queue; render thread only, frame boundary only
    ///
    /// Cameras are detached first: severing their world link breaks the
    /// reference cycles and can park further release objects, and appending
    /// while the release list is being processed is not allowed. The release
    /// list is therefore drained in batches until it stays empty.
    pub fn process_free_operations(&self) {
        let cameras = std::mem::take(&mut *self.clean_up_cameras.lock().unwrap());
        for camera in cameras {
            camera.set_parent_world(None);
        }

        loop {
            let batch = std::mem::take(&mut *self.release_objects.lock().unwrap());
            if batch.is_empty() {
                break;
            }
            drop(batch);
        }
    }

    /// Number of objects currently parked for release
    pub fn pending_release_count(&self) -> usize {
        self.release_objects.lock().unwrap().len()
    }

    /// Number of cameras pending detachment
    pub fn pending_camera_count(&self) -> usize {
        self.clean_up_cameras.lock().unwrap().len()
    }
}

impl std::fmt::Debug for DelayedOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedOperations")
            .field("pending_releases", &self.pending_release_count())
            .field("pending_cameras", &self.pending_camera_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_objects_survive_until_processed() {
        let ops = DelayedOperations::new();
        let object: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
        let weak = Arc::downgrade(&object);

        ops.add_release_object(object);
        assert_eq!(ops.pending_release_count(), 1);
        assert!(weak.upgrade().is_some(), "object must stay alive while parked");

        ops.process_free_operations();
        assert_eq!(ops.pending_release_count(), 0);
        assert!(weak.upgrade().is_none(), "object must be freed by the drain");
    }

    #[test]
    fn test_process_is_idempotent() {
        let ops = DelayedOperations::new();
        ops.process_free_operations();
        ops.process_free_operations();
        assert_eq!(ops.pending_release_count(), 0);
    }
}
