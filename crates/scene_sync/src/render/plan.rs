//! Render plan context handed to the prepare passes

use crate::foundation::math::{DMat4, DVec3};
use crate::scene::LayerMask;

/// Per-frame render context for the prepare passes
///
/// Carries the view the world is being prepared for. The sync core only
/// reads the camera position (environment map resolution, reference-position
/// checks) and the layer mask; everything else is passed through to the
/// downstream renderer untouched.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    /// World-space camera position
    pub camera_position: DVec3,

    /// View matrix of the camera this plan renders for
    pub camera_view: DMat4,

    /// Layers considered by this plan
    pub layer_mask: LayerMask,

    /// Target viewport in pixels
    pub viewport: (u32, u32),

    /// Seconds of game time covered by this frame
    pub elapsed: f32,
}

impl Default for RenderPlan {
    fn default() -> Self {
        Self {
            camera_position: DVec3::zeros(),
            camera_view: DMat4::identity(),
            layer_mask: LayerMask::default(),
            viewport: (1280, 720),
            elapsed: 0.0,
        }
    }
}
