//! Sky instance resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::Color;
use crate::render::sky::{RSkyInstance, RSkyLayer};
use crate::render::world::RWorld;
use crate::scene::LayerMask;

bitflags! {
    /// Aspects of a sky instance that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SkyDirty: u32 {
        const DEFINITION  = 1 << 0;
        const CONTROLLERS = 1 << 1;
        const ORDER       = 1 << 2;
        const LAYER_MASK  = 1 << 3;
    }
}

/// One layer of a sky definition
#[derive(Debug, Clone)]
pub struct SkyLayerDefinition {
    /// Light color contributed by this layer
    pub color: Color,
    /// Light intensity contributed by this layer
    pub intensity: f32,
    /// Ambient fraction of the intensity
    pub ambient_intensity: f32,
    /// Index of the controller driving this layer, if any
    pub controller: Option<usize>,
}

/// Mutable sky state owned by the logic thread
#[derive(Debug, Clone, Default)]
struct SkyData {
    layers: Vec<SkyLayerDefinition>,
    controllers: Vec<f32>,
    order: i32,
    layer_mask: LayerMask,
}

/// Logic-side sky instance
///
/// Controllers animate the sky (day-night cycles); gameplay writes values,
/// the sync pass carries them across.
#[derive(Debug)]
pub struct SkyInstance {
    data: SkyData,
    peer: SkyInstancePeer,
}

impl SkyInstance {
    /// Create an empty sky instance
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: SkyData::default(),
            peer: SkyInstancePeer::new(ctx),
        })
    }

    /// Replace the sky definition layers
    pub fn set_layers(&mut self, layers: Vec<SkyLayerDefinition>) {
        self.data.layers = layers;
        self.peer.notify_definition_changed();
    }

    /// Number of definition layers
    pub fn layer_count(&self) -> usize {
        self.data.layers.len()
    }

    /// Resize the controller table
    pub fn set_controller_count(&mut self, count: usize) {
        self.data.controllers.resize(count, 0.0);
        self.peer.notify_controllers_changed();
    }

    /// Current controller value, None if out of range
    pub fn controller(&self, index: usize) -> Option<f32> {
        self.data.controllers.get(index).copied()
    }

    /// Write a controller value; out-of-range indices are ignored
    pub fn set_controller(&mut self, index: usize, value: f32) {
        if let Some(slot) = self.data.controllers.get_mut(index) {
            *slot = value;
            self.peer.notify_controllers_changed();
        }
    }

    /// Draw order; lower orders render first
    pub fn order(&self) -> i32 {
        self.data.order
    }

    /// Change the draw order
    pub fn set_order(&mut self, order: i32) {
        self.data.order = order;
        self.peer.notify_order_changed();
    }

    /// Layers this sky applies to
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_layer_mask_changed();
    }

    /// The render mirror of this sky instance
    pub fn render_sky(&self) -> &Arc<RSkyInstance> {
        self.peer.r_sky()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut SkyInstancePeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &SkyInstancePeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of a sky instance
#[derive(Debug)]
pub(crate) struct SkyInstancePeer {
    ctx: RenderContext,
    r_sky: Arc<RSkyInstance>,
    parent_world: Option<Arc<RWorld>>,
    dirty: SkyDirty,
}

impl SkyInstancePeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_sky: Arc::new(RSkyInstance::new()),
            parent_world: None,
            dirty: SkyDirty::all(),
        }
    }

    pub(crate) fn r_sky(&self) -> &Arc<RSkyInstance> {
        &self.r_sky
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_sky.world_link().has_parent() {
            self.r_sky.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
    }

    fn notify_definition_changed(&mut self) {
        self.dirty.insert(SkyDirty::DEFINITION);
        // new layers reference controllers by index
        self.dirty.insert(SkyDirty::CONTROLLERS);
    }

    fn notify_controllers_changed(&mut self) {
        self.dirty.insert(SkyDirty::CONTROLLERS);
    }

    fn notify_order_changed(&mut self) {
        self.dirty.insert(SkyDirty::ORDER);
    }

    fn notify_layer_mask_changed(&mut self) {
        self.dirty.insert(SkyDirty::LAYER_MASK);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &SkyData) {
        if self.dirty.contains(SkyDirty::DEFINITION) {
            let layers = data
                .layers
                .iter()
                .map(|layer| RSkyLayer {
                    color: layer.color,
                    intensity: layer.intensity,
                    ambient_intensity: layer.ambient_intensity,
                    controller: layer.controller,
                })
                .collect();
            self.r_sky.set_layers(layers);
            self.dirty.remove(SkyDirty::DEFINITION);
        }

        if self.dirty.contains(SkyDirty::CONTROLLERS) {
            self.r_sky.set_controller_values(&data.controllers);
            self.dirty.remove(SkyDirty::CONTROLLERS);
        }

        if self.dirty.contains(SkyDirty::ORDER) {
            self.r_sky.set_order(data.order);
            if let Some(world) = &self.parent_world {
                world.mark_sky_order_dirty();
            }
            self.dirty.remove(SkyDirty::ORDER);
        }

        if self.dirty.contains(SkyDirty::LAYER_MASK) {
            self.r_sky.set_layer_mask(data.layer_mask);
            self.dirty.remove(SkyDirty::LAYER_MASK);
        }
    }
}

impl Drop for SkyInstancePeer {
    fn drop(&mut self) {
        if self.r_sky.world_link().has_parent() {
            self.r_sky.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_sky.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
