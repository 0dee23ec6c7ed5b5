//! Render-side world
//!
//! Owns every render object currently "in" the world, partitioned by
//! category, plus the octree indexing the spatial ones. Membership is
//! reconciled by the logic thread during the sync pass; the prepare passes
//! run on the render thread and resolve everything the logic thread must
//! not touch.
//!
//! Removal is two-phase: the logic side only marks objects
//! (`world_marked_remove`), the per-category `remove_removal_marked_*`
//! sweeps unlink at a safe point. An in-flight render pass therefore never
//! loses an object out from under it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{Color, DVec3, Mat4};
use crate::render::billboard::RBillboard;
use crate::render::component::RComponent;
use crate::render::debug_drawer::RDebugDrawer;
use crate::render::env_map::REnvMap;
use crate::render::env_map_probe::REnvMapProbe;
use crate::render::height_terrain::RHeightTerrain;
use crate::render::light::RLight;
use crate::render::lumimeter::RLumimeter;
use crate::render::particle_emitter::RParticleEmitterInstance;
use crate::render::plan::RenderPlan;
use crate::render::prop_field::RPropField;
use crate::render::sky::RSkyInstance;
use crate::scene::DAabb;
use crate::spatial::{Octree, SpatialId, SpatialLink};

/// World-level lighting parameters
#[derive(Debug)]
struct WorldLighting {
    ambient_light: Color,
    light_color_matrix: Mat4,
    disable_lights: bool,

    /// Total sky light intensity resolved at the last prepare, read by
    /// cameras for tone-map adaption
    resolved_sky_intensity: f32,
}

/// Containers and octree behind the content lock
#[derive(Debug)]
struct WorldContent {
    size: DVec3,
    octree: Octree,

    components: Vec<Arc<RComponent>>,
    billboards: Vec<Arc<RBillboard>>,
    lights: Vec<Arc<RLight>>,
    skies: Vec<Arc<RSkyInstance>>,
    debug_drawers: Vec<Arc<RDebugDrawer>>,
    env_map_probes: Vec<Arc<REnvMapProbe>>,
    lumimeters: Vec<Arc<RLumimeter>>,
    prop_fields: Vec<Arc<RPropField>>,
    particle_emitters: Vec<Arc<RParticleEmitterInstance>>,
    height_terrain: Option<Arc<RHeightTerrain>>,

    env_maps: Vec<Arc<REnvMap>>,
    sky_env_map: Option<Arc<REnvMap>>,

    prepare_components: Vec<Arc<RComponent>>,
    prepare_billboards: Vec<Arc<RBillboard>>,
    prepare_lights: Vec<Arc<RLight>>,
    prepare_prop_fields: Vec<Arc<RPropField>>,

    reference_position: DVec3,
    env_map_update_budget: u32,
}

/// Render-side world
///
/// Created through [`crate::resources::World`]; the render thread drives
/// [`Self::early_prepare_for_render`] and [`Self::prepare_for_render`] once
/// per frame after the logic thread's sync pass returned.
#[derive(Debug)]
pub struct RWorld {
    ctx: RenderContext,

    dirty_prepare_early: AtomicBool,
    dirty_prepare: AtomicBool,
    dirty_env_map_layout: AtomicBool,
    dirty_sky_order: AtomicBool,
    dirty_notify_sky_changed: AtomicBool,

    lighting: RwLock<WorldLighting>,
    content: Mutex<WorldContent>,
}

impl RWorld {
    /// Create a world spanning `size` meters
    pub fn new(ctx: &RenderContext, size: DVec3) -> Arc<Self> {
        let octree_size = sanitize_octree_size(size);
        let insert_depth = octree_insert_depth(octree_size, ctx);

        log::info!(
            "world: size=({:.0},{:.0},{:.0}) octree=({:.0},{:.0},{:.0}) insdepth={}",
            size.x, size.y, size.z,
            octree_size.x, octree_size.y, octree_size.z,
            insert_depth
        );

        Arc::new(Self {
            ctx: ctx.clone(),
            dirty_prepare_early: AtomicBool::new(true),
            dirty_prepare: AtomicBool::new(true),
            dirty_env_map_layout: AtomicBool::new(true),
            dirty_sky_order: AtomicBool::new(false),
            dirty_notify_sky_changed: AtomicBool::new(true),
            lighting: RwLock::new(WorldLighting {
                ambient_light: Color::new(0.0, 0.0, 0.0, 1.0),
                light_color_matrix: Mat4::identity(),
                disable_lights: false,
                resolved_sky_intensity: 0.0,
            }),
            content: Mutex::new(WorldContent {
                size,
                octree: Octree::new(DVec3::zeros(), octree_size * 0.5, insert_depth),
                components: Vec::new(),
                billboards: Vec::new(),
                lights: Vec::new(),
                skies: Vec::new(),
                debug_drawers: Vec::new(),
                env_map_probes: Vec::new(),
                lumimeters: Vec::new(),
                prop_fields: Vec::new(),
                particle_emitters: Vec::new(),
                height_terrain: None,
                env_maps: Vec::new(),
                sky_env_map: None,
                prepare_components: Vec::new(),
                prepare_billboards: Vec::new(),
                prepare_lights: Vec::new(),
                prepare_prop_fields: Vec::new(),
                reference_position: DVec3::zeros(),
                env_map_update_budget: 0,
            }),
        })
    }

    /// Context this world was created with
    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    // Management
    ///////////////

    /// Resize the world, rebuilding the octree and re-indexing every
    /// spatial object
    pub fn set_size(&self, size: DVec3) {
        let mut content = self.content.lock().unwrap();
        if (content.size - size).norm_squared() < f64::EPSILON {
            return;
        }
        content.size = size;

        let octree_size = sanitize_octree_size(size);
        let insert_depth = octree_insert_depth(octree_size, &self.ctx);

        log::info!(
            "world.set_size: size=({:.0},{:.0},{:.0}) octree=({:.0},{:.0},{:.0}) insdepth={}",
            size.x, size.y, size.z,
            octree_size.x, octree_size.y, octree_size.z,
            insert_depth
        );

        content.octree = Octree::new(DVec3::zeros(), octree_size * 0.5, insert_depth);

        let components = content.components.clone();
        let billboards = content.billboards.clone();
        let lights = content.lights.clone();
        let env_map_probes = content.env_map_probes.clone();
        let lumimeters = content.lumimeters.clone();
        let prop_fields = content.prop_fields.clone();
        let particle_emitters = content.particle_emitters.clone();

        for component in &components {
            reindex(&mut content.octree, component.spatial_link());
        }
        for billboard in &billboards {
            reindex(&mut content.octree, billboard.spatial_link());
        }
        for light in &lights {
            reindex(&mut content.octree, light.spatial_link());
        }
        for probe in &env_map_probes {
            reindex(&mut content.octree, probe.spatial_link());
        }
        for lumimeter in &lumimeters {
            reindex(&mut content.octree, lumimeter.spatial_link());
        }
        for prop_field in &prop_fields {
            reindex(&mut content.octree, prop_field.spatial_link());
        }
        for emitter in &particle_emitters {
            reindex(&mut content.octree, emitter.spatial_link());
        }
    }

    /// World size in meters
    pub fn size(&self) -> DVec3 {
        self.content.lock().unwrap().size
    }

    /// Request both prepare passes for the next rendered frame
    pub fn requires_prepare_for_render(&self) {
        self.dirty_prepare_early.store(true, Ordering::Release);
        self.dirty_prepare.store(true, Ordering::Release);
    }

    /// Re-sort skies by their order value before the next frame
    pub fn mark_sky_order_dirty(&self) {
        self.dirty_sky_order.store(true, Ordering::Release);
    }

    /// Recompute which environment maps influence which regions
    pub fn invalidate_env_map_layout(&self) {
        self.dirty_env_map_layout.store(true, Ordering::Release);
    }

    // Lighting
    /////////////

    /// Set the ambient light color
    pub fn set_ambient_light(&self, color: Color) {
        self.lighting.write().unwrap().ambient_light = color;
        self.dirty_notify_sky_changed.store(true, Ordering::Release);
    }

    /// Set the matrix applied to all light colors
    pub fn set_light_color_matrix(&self, matrix: Mat4) {
        self.lighting.write().unwrap().light_color_matrix = matrix;
        self.dirty_notify_sky_changed.store(true, Ordering::Release);
    }

    /// Disable every non-sky light source
    pub fn set_disable_lights(&self, disable: bool) {
        self.lighting.write().unwrap().disable_lights = disable;
        self.dirty_notify_sky_changed.store(true, Ordering::Release);
    }

    /// Ambient light color
    pub fn ambient_light(&self) -> Color {
        self.lighting.read().unwrap().ambient_light
    }

    /// Light color transformation matrix
    pub fn light_color_matrix(&self) -> Mat4 {
        self.lighting.read().unwrap().light_color_matrix
    }

    /// True if non-sky lights are disabled
    pub fn lights_disabled(&self) -> bool {
        self.lighting.read().unwrap().disable_lights
    }

    /// Total sky light intensity resolved at the last prepare
    pub fn sky_light_intensity(&self) -> f32 {
        self.lighting.read().unwrap().resolved_sky_intensity
    }

    // Reference position
    ///////////////////////

    /// Origin render-facing single-precision data is expressed relative to
    pub fn reference_position(&self) -> DVec3 {
        self.content.lock().unwrap().reference_position
    }

    /// Re-center the reference position if `position` strayed too far
    ///
    /// Keeps single-precision render data accurate in very large worlds;
    /// every spatial object is notified so staged matrices rebuild.
    pub fn check_reference_position(&self, position: DVec3) {
        let reference = self.reference_position();
        let distance = self.ctx.config().valid_reference_distance;
        if (position.x - reference.x).abs() > distance
            || (position.y - reference.y).abs() > distance
            || (position.z - reference.z).abs() > distance
        {
            self.set_reference_position((position + reference) * 0.5);
        }
    }

    fn set_reference_position(&self, position: DVec3) {
        let (components, billboards, prop_fields, particle_emitters) = {
            let mut content = self.content.lock().unwrap();
            log::info!(
                "world: reference position ({:.0},{:.0},{:.0}) -> ({:.0},{:.0},{:.0})",
                content.reference_position.x,
                content.reference_position.y,
                content.reference_position.z,
                position.x, position.y, position.z
            );
            content.reference_position = position;
            (
                content.components.clone(),
                content.billboards.clone(),
                content.prop_fields.clone(),
                content.particle_emitters.clone(),
            )
        };

        for component in &components {
            component.world_reference_point_changed();
        }
        for billboard in &billboards {
            billboard.world_reference_point_changed();
        }
        for prop_field in &prop_fields {
            prop_field.world_reference_point_changed();
        }
        for emitter in &particle_emitters {
            emitter.world_reference_point_changed();
        }
    }

    // Spatial queries
    ////////////////////

    /// Ids of all spatial objects whose bounds intersect the box
    pub fn visit_region(&self, region: &DAabb) -> Vec<SpatialId> {
        self.content
            .lock()
            .unwrap()
            .octree
            .query_box(region)
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    /// Number of octree entries (every spatial object currently linked)
    pub fn spatial_entry_count(&self) -> usize {
        self.content.lock().unwrap().octree.entry_count()
    }

    /// Lights whose influence bounds intersect the sphere
    pub fn lights_in_range(&self, center: DVec3, radius: f64) -> Vec<Arc<RLight>> {
        let content = self.content.lock().unwrap();
        let ids: HashSet<SpatialId> = content
            .octree
            .query_sphere(center, radius)
            .iter()
            .map(|entry| entry.id)
            .collect();
        content
            .lights
            .iter()
            .filter(|light| ids.contains(&light.spatial_link().id()))
            .cloned()
            .collect()
    }

    /// Update the octree entry of a spatial object after its bounds moved
    pub(crate) fn update_octree_entry(&self, link: &SpatialLink, bounds: DAabb) {
        let mut content = self.content.lock().unwrap();
        match link.indexed_bounds() {
            Some(old) => content.octree.update(link.id(), old, bounds),
            None => content.octree.insert(link.id(), bounds),
        }
        link.set_indexed_bounds(Some(bounds));
    }

    // Components
    ///////////////

    /// Number of components in the world
    pub fn component_count(&self) -> usize {
        self.content.lock().unwrap().components.len()
    }

    /// Insert a component, taking a strong reference
    ///
    /// A component still owned by another world must carry the removal mark;
    /// it is then migrated here immediately.
    pub fn add_component(
        self: &Arc<Self>,
        component: &Arc<RComponent>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = component.world_link().parent_world() {
            if !component.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_component(component)?;
        }

        // tricky problem: ensure the mark never survives an insertion
        component.world_link().set_marked_remove(false);
        component.world_link().set_parent(Some(self));

        {
            let mut content = self.content.lock().unwrap();
            attach(&mut content.octree, component.spatial_link(), component.extends());
            content.components.push(component.clone());
        }

        self.queue_component_prepare(component);
        Ok(())
    }

    /// Unlink a component and drop the world's reference
    pub fn remove_component(
        self: &Arc<Self>,
        component: &Arc<RComponent>,
    ) -> Result<(), SceneError> {
        if !component.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .components
            .iter()
            .position(|c| Arc::ptr_eq(c, component))
            .ok_or(SceneError::NotInWorld)?;

        unqueue_component(&mut content, component);
        component.world_link().set_parent(None);
        component.world_link().set_marked_remove(false);
        detach(&mut content.octree, component.spatial_link());
        content.components.remove(index);
        Ok(())
    }

    /// Unlink every component
    pub fn remove_all_components(&self) {
        let mut content = self.content.lock().unwrap();
        content.prepare_components.clear();
        while let Some(component) = content.components.pop() {
            component.prepare_queued().store(false, Ordering::Release);
            component.world_link().set_parent(None);
            component.world_link().set_marked_remove(false);
            detach(&mut content.octree, component.spatial_link());
        }
    }

    /// Sweep: unlink exactly the components flagged for removal
    pub fn remove_removal_marked_components(&self) {
        let mut content = self.content.lock().unwrap();
        let mut index = 0;
        while index < content.components.len() {
            let component = content.components[index].clone();
            if component.world_link().marked_remove() {
                unqueue_component(&mut content, &component);
                component.world_link().set_parent(None);
                component.world_link().set_marked_remove(false);
                detach(&mut content.octree, component.spatial_link());
                content.components.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Queue a component for the next prepare pass
    pub(crate) fn queue_component_prepare(&self, component: &Arc<RComponent>) {
        if !component.prepare_queued().swap(true, Ordering::AcqRel) {
            self.content
                .lock()
                .unwrap()
                .prepare_components
                .push(component.clone());
        }
    }

    // Billboards
    ///////////////

    /// Number of billboards in the world
    pub fn billboard_count(&self) -> usize {
        self.content.lock().unwrap().billboards.len()
    }

    /// Insert a billboard, taking a strong reference
    pub fn add_billboard(
        self: &Arc<Self>,
        billboard: &Arc<RBillboard>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = billboard.world_link().parent_world() {
            if !billboard.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_billboard(billboard)?;
        }

        billboard.world_link().set_marked_remove(false);
        billboard.world_link().set_parent(Some(self));

        {
            let mut content = self.content.lock().unwrap();
            attach(&mut content.octree, billboard.spatial_link(), billboard.extends());
            content.billboards.push(billboard.clone());
        }

        self.queue_billboard_prepare(billboard);
        Ok(())
    }

    /// Unlink a billboard and drop the world's reference
    pub fn remove_billboard(
        self: &Arc<Self>,
        billboard: &Arc<RBillboard>,
    ) -> Result<(), SceneError> {
        if !billboard.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .billboards
            .iter()
            .position(|b| Arc::ptr_eq(b, billboard))
            .ok_or(SceneError::NotInWorld)?;

        unqueue_billboard(&mut content, billboard);
        billboard.world_link().set_parent(None);
        billboard.world_link().set_marked_remove(false);
        detach(&mut content.octree, billboard.spatial_link());
        content.billboards.remove(index);
        Ok(())
    }

    /// Unlink every billboard
    pub fn remove_all_billboards(&self) {
        let mut content = self.content.lock().unwrap();
        content.prepare_billboards.clear();
        while let Some(billboard) = content.billboards.pop() {
            billboard.prepare_queued().store(false, Ordering::Release);
            billboard.world_link().set_parent(None);
            billboard.world_link().set_marked_remove(false);
            detach(&mut content.octree, billboard.spatial_link());
        }
    }

    /// Sweep: unlink exactly the billboards flagged for removal
    pub fn remove_removal_marked_billboards(&self) {
        let mut content = self.content.lock().unwrap();
        let mut index = 0;
        while index < content.billboards.len() {
            let billboard = content.billboards[index].clone();
            if billboard.world_link().marked_remove() {
                unqueue_billboard(&mut content, &billboard);
                billboard.world_link().set_parent(None);
                billboard.world_link().set_marked_remove(false);
                detach(&mut content.octree, billboard.spatial_link());
                content.billboards.remove(index);
            } else {
                index += 1;
            }
        }
    }

    pub(crate) fn queue_billboard_prepare(&self, billboard: &Arc<RBillboard>) {
        if !billboard.prepare_queued().swap(true, Ordering::AcqRel) {
            self.content
                .lock()
                .unwrap()
                .prepare_billboards
                .push(billboard.clone());
        }
    }

    // Lights
    ///////////

    /// Number of lights in the world
    pub fn light_count(&self) -> usize {
        self.content.lock().unwrap().lights.len()
    }

    /// Insert a light, taking a strong reference
    pub fn add_light(self: &Arc<Self>, light: &Arc<RLight>) -> Result<(), SceneError> {
        if let Some(parent) = light.world_link().parent_world() {
            if !light.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_light(light)?;
        }

        light.world_link().set_marked_remove(false);
        light.world_link().set_parent(Some(self));

        {
            let mut content = self.content.lock().unwrap();
            attach(&mut content.octree, light.spatial_link(), light.bounds());
            content.lights.push(light.clone());
        }

        self.queue_light_prepare(light);
        Ok(())
    }

    /// Unlink a light and drop the world's reference
    pub fn remove_light(self: &Arc<Self>, light: &Arc<RLight>) -> Result<(), SceneError> {
        if !light.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .lights
            .iter()
            .position(|l| Arc::ptr_eq(l, light))
            .ok_or(SceneError::NotInWorld)?;

        unqueue_light(&mut content, light);
        light.world_link().set_parent(None);
        light.world_link().set_marked_remove(false);
        detach(&mut content.octree, light.spatial_link());
        content.lights.remove(index);
        Ok(())
    }

    /// Unlink every light
    pub fn remove_all_lights(&self) {
        let mut content = self.content.lock().unwrap();
        content.prepare_lights.clear();
        while let Some(light) = content.lights.pop() {
            light.prepare_queued().store(false, Ordering::Release);
            light.world_link().set_parent(None);
            light.world_link().set_marked_remove(false);
            detach(&mut content.octree, light.spatial_link());
        }
    }

    /// Sweep: unlink exactly the lights flagged for removal
    pub fn remove_removal_marked_lights(&self) {
        let mut content = self.content.lock().unwrap();
        let mut index = 0;
        while index < content.lights.len() {
            let light = content.lights[index].clone();
            if light.world_link().marked_remove() {
                unqueue_light(&mut content, &light);
                light.world_link().set_parent(None);
                light.world_link().set_marked_remove(false);
                detach(&mut content.octree, light.spatial_link());
                content.lights.remove(index);
            } else {
                index += 1;
            }
        }
    }

    pub(crate) fn queue_light_prepare(&self, light: &Arc<RLight>) {
        if !light.prepare_queued().swap(true, Ordering::AcqRel) {
            self.content.lock().unwrap().prepare_lights.push(light.clone());
        }
    }

    // Skies
    //////////

    /// Number of sky instances in the world
    pub fn sky_count(&self) -> usize {
        self.content.lock().unwrap().skies.len()
    }

    /// Insert a sky instance, taking a strong reference
    pub fn add_sky(self: &Arc<Self>, sky: &Arc<RSkyInstance>) -> Result<(), SceneError> {
        if let Some(parent) = sky.world_link().parent_world() {
            if !sky.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_sky(sky)?;
        }

        sky.world_link().set_marked_remove(false);
        sky.world_link().set_parent(Some(self));
        self.content.lock().unwrap().skies.push(sky.clone());
        self.dirty_notify_sky_changed.store(true, Ordering::Release);
        self.dirty_sky_order.store(true, Ordering::Release);
        Ok(())
    }

    /// Unlink a sky instance and drop the world's reference
    pub fn remove_sky(self: &Arc<Self>, sky: &Arc<RSkyInstance>) -> Result<(), SceneError> {
        if !sky.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .skies
            .iter()
            .position(|s| Arc::ptr_eq(s, sky))
            .ok_or(SceneError::NotInWorld)?;

        sky.world_link().set_parent(None);
        sky.world_link().set_marked_remove(false);
        content.skies.remove(index);
        self.dirty_notify_sky_changed.store(true, Ordering::Release);
        Ok(())
    }

    /// Unlink every sky instance
    pub fn remove_all_skies(&self) {
        let mut content = self.content.lock().unwrap();
        while let Some(sky) = content.skies.pop() {
            sky.world_link().set_parent(None);
            sky.world_link().set_marked_remove(false);
        }
        self.dirty_notify_sky_changed.store(true, Ordering::Release);
    }

    /// Sweep: unlink exactly the sky instances flagged for removal
    pub fn remove_removal_marked_skies(&self) {
        let mut content = self.content.lock().unwrap();
        let mut removed = false;
        content.skies.retain(|sky| {
            if sky.world_link().marked_remove() {
                sky.world_link().set_parent(None);
                sky.world_link().set_marked_remove(false);
                removed = true;
                false
            } else {
                true
            }
        });
        if removed {
            self.dirty_notify_sky_changed.store(true, Ordering::Release);
        }
    }

    // Debug drawers
    //////////////////

    /// Number of debug drawers in the world
    pub fn debug_drawer_count(&self) -> usize {
        self.content.lock().unwrap().debug_drawers.len()
    }

    /// Insert a debug drawer, taking a strong reference
    pub fn add_debug_drawer(
        self: &Arc<Self>,
        drawer: &Arc<RDebugDrawer>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = drawer.world_link().parent_world() {
            if !drawer.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_debug_drawer(drawer)?;
        }

        drawer.world_link().set_marked_remove(false);
        drawer.world_link().set_parent(Some(self));
        self.content.lock().unwrap().debug_drawers.push(drawer.clone());
        Ok(())
    }

    /// Unlink a debug drawer and drop the world's reference
    pub fn remove_debug_drawer(
        self: &Arc<Self>,
        drawer: &Arc<RDebugDrawer>,
    ) -> Result<(), SceneError> {
        if !drawer.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .debug_drawers
            .iter()
            .position(|d| Arc::ptr_eq(d, drawer))
            .ok_or(SceneError::NotInWorld)?;

        drawer.world_link().set_parent(None);
        drawer.world_link().set_marked_remove(false);
        content.debug_drawers.remove(index);
        Ok(())
    }

    /// Unlink every debug drawer
    pub fn remove_all_debug_drawers(&self) {
        let mut content = self.content.lock().unwrap();
        while let Some(drawer) = content.debug_drawers.pop() {
            drawer.world_link().set_parent(None);
            drawer.world_link().set_marked_remove(false);
        }
    }

    /// Sweep: unlink exactly the debug drawers flagged for removal
    pub fn remove_removal_marked_debug_drawers(&self) {
        let mut content = self.content.lock().unwrap();
        content.debug_drawers.retain(|drawer| {
            if drawer.world_link().marked_remove() {
                drawer.world_link().set_parent(None);
                drawer.world_link().set_marked_remove(false);
                false
            } else {
                true
            }
        });
    }

    // Environment map probes
    ///////////////////////////

    /// Number of environment map probes in the world
    pub fn env_map_probe_count(&self) -> usize {
        self.content.lock().unwrap().env_map_probes.len()
    }

    /// Insert a probe, registering its environment map with the world
    pub fn add_env_map_probe(
        self: &Arc<Self>,
        probe: &Arc<REnvMapProbe>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = probe.world_link().parent_world() {
            if !probe.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_env_map_probe(probe)?;
        }

        probe.world_link().set_marked_remove(false);
        probe.world_link().set_parent(Some(self));

        {
            let mut content = self.content.lock().unwrap();
            attach(&mut content.octree, probe.spatial_link(), probe.influence_area());
            content.env_map_probes.push(probe.clone());
        }

        self.add_env_map(probe.env_map())?;
        Ok(())
    }

    /// Unlink a probe and deregister its environment map
    pub fn remove_env_map_probe(
        self: &Arc<Self>,
        probe: &Arc<REnvMapProbe>,
    ) -> Result<(), SceneError> {
        if !probe.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        self.remove_env_map(probe.env_map())?;

        let mut content = self.content.lock().unwrap();
        let index = content
            .env_map_probes
            .iter()
            .position(|p| Arc::ptr_eq(p, probe))
            .ok_or(SceneError::NotInWorld)?;

        probe.world_link().set_parent(None);
        probe.world_link().set_marked_remove(false);
        detach(&mut content.octree, probe.spatial_link());
        content.env_map_probes.remove(index);
        Ok(())
    }

    /// Unlink every probe
    pub fn remove_all_env_map_probes(self: &Arc<Self>) {
        let probes: Vec<Arc<REnvMapProbe>> =
            self.content.lock().unwrap().env_map_probes.clone();
        for probe in &probes {
            // errors impossible: every probe in the list is owned by us
            let _ = self.remove_env_map_probe(probe);
        }
    }

    /// Sweep: unlink exactly the probes flagged for removal
    ///
    /// Runs during [`Self::early_prepare_for_render`], not during the sync
    /// pass: destroying a probe drops its environment map, and the env-map
    /// list is read by tasks running in parallel to the main prepare pass.
    pub fn remove_removal_marked_env_map_probes(self: &Arc<Self>) {
        let marked: Vec<Arc<REnvMapProbe>> = self
            .content
            .lock()
            .unwrap()
            .env_map_probes
            .iter()
            .filter(|p| p.world_link().marked_remove())
            .cloned()
            .collect();
        for probe in &marked {
            let _ = self.remove_env_map_probe(probe);
        }
    }

    // Lumimeters
    ///////////////

    /// Number of lumimeters in the world
    pub fn lumimeter_count(&self) -> usize {
        self.content.lock().unwrap().lumimeters.len()
    }

    /// Insert a lumimeter, taking a strong reference
    pub fn add_lumimeter(
        self: &Arc<Self>,
        lumimeter: &Arc<RLumimeter>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = lumimeter.world_link().parent_world() {
            if !lumimeter.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_lumimeter(lumimeter)?;
        }

        lumimeter.world_link().set_marked_remove(false);
        lumimeter.world_link().set_parent(Some(self));

        let mut content = self.content.lock().unwrap();
        let bounds = DAabb::from_center_extents(
            lumimeter.position(),
            DVec3::new(0.1, 0.1, 0.1),
        );
        attach(&mut content.octree, lumimeter.spatial_link(), bounds);
        content.lumimeters.push(lumimeter.clone());
        Ok(())
    }

    /// Unlink a lumimeter and drop the world's reference
    pub fn remove_lumimeter(
        self: &Arc<Self>,
        lumimeter: &Arc<RLumimeter>,
    ) -> Result<(), SceneError> {
        if !lumimeter.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .lumimeters
            .iter()
            .position(|l| Arc::ptr_eq(l, lumimeter))
            .ok_or(SceneError::NotInWorld)?;

        lumimeter.world_link().set_parent(None);
        lumimeter.world_link().set_marked_remove(false);
        detach(&mut content.octree, lumimeter.spatial_link());
        content.lumimeters.remove(index);
        Ok(())
    }

    /// Unlink every lumimeter
    pub fn remove_all_lumimeters(&self) {
        let mut content = self.content.lock().unwrap();
        while let Some(lumimeter) = content.lumimeters.pop() {
            lumimeter.world_link().set_parent(None);
            lumimeter.world_link().set_marked_remove(false);
            detach(&mut content.octree, lumimeter.spatial_link());
        }
    }

    /// Sweep: unlink exactly the lumimeters flagged for removal
    pub fn remove_removal_marked_lumimeters(&self) {
        let mut content = self.content.lock().unwrap();
        let mut index = 0;
        while index < content.lumimeters.len() {
            let lumimeter = content.lumimeters[index].clone();
            if lumimeter.world_link().marked_remove() {
                lumimeter.world_link().set_parent(None);
                lumimeter.world_link().set_marked_remove(false);
                detach(&mut content.octree, lumimeter.spatial_link());
                content.lumimeters.remove(index);
            } else {
                index += 1;
            }
        }
    }

    // Prop fields
    ////////////////

    /// Number of prop fields in the world
    pub fn prop_field_count(&self) -> usize {
        self.content.lock().unwrap().prop_fields.len()
    }

    /// Insert a prop field, taking a strong reference
    pub fn add_prop_field(
        self: &Arc<Self>,
        prop_field: &Arc<RPropField>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = prop_field.world_link().parent_world() {
            if !prop_field.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_prop_field(prop_field)?;
        }

        prop_field.world_link().set_marked_remove(false);
        prop_field.world_link().set_parent(Some(self));

        {
            let mut content = self.content.lock().unwrap();
            attach(&mut content.octree, prop_field.spatial_link(), prop_field.extends());
            content.prop_fields.push(prop_field.clone());
        }

        self.queue_prop_field_prepare(prop_field);
        Ok(())
    }

    /// Unlink a prop field and drop the world's reference
    pub fn remove_prop_field(
        self: &Arc<Self>,
        prop_field: &Arc<RPropField>,
    ) -> Result<(), SceneError> {
        if !prop_field.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .prop_fields
            .iter()
            .position(|p| Arc::ptr_eq(p, prop_field))
            .ok_or(SceneError::NotInWorld)?;

        unqueue_prop_field(&mut content, prop_field);
        prop_field.world_link().set_parent(None);
        prop_field.world_link().set_marked_remove(false);
        detach(&mut content.octree, prop_field.spatial_link());
        content.prop_fields.remove(index);
        Ok(())
    }

    /// Unlink every prop field
    pub fn remove_all_prop_fields(&self) {
        let mut content = self.content.lock().unwrap();
        content.prepare_prop_fields.clear();
        while let Some(prop_field) = content.prop_fields.pop() {
            prop_field.prepare_queued().store(false, Ordering::Release);
            prop_field.world_link().set_parent(None);
            prop_field.world_link().set_marked_remove(false);
            detach(&mut content.octree, prop_field.spatial_link());
        }
    }

    /// Sweep: unlink exactly the prop fields flagged for removal
    pub fn remove_removal_marked_prop_fields(&self) {
        let mut content = self.content.lock().unwrap();
        let mut index = 0;
        while index < content.prop_fields.len() {
            let prop_field = content.prop_fields[index].clone();
            if prop_field.world_link().marked_remove() {
                unqueue_prop_field(&mut content, &prop_field);
                prop_field.world_link().set_parent(None);
                prop_field.world_link().set_marked_remove(false);
                detach(&mut content.octree, prop_field.spatial_link());
                content.prop_fields.remove(index);
            } else {
                index += 1;
            }
        }
    }

    pub(crate) fn queue_prop_field_prepare(&self, prop_field: &Arc<RPropField>) {
        if !prop_field.prepare_queued().swap(true, Ordering::AcqRel) {
            self.content
                .lock()
                .unwrap()
                .prepare_prop_fields
                .push(prop_field.clone());
        }
    }

    // Particle emitter instances
    ///////////////////////////////

    /// Number of particle emitter instances in the world
    pub fn particle_emitter_count(&self) -> usize {
        self.content.lock().unwrap().particle_emitters.len()
    }

    /// Insert a particle emitter instance, taking a strong reference
    pub fn add_particle_emitter(
        self: &Arc<Self>,
        emitter: &Arc<RParticleEmitterInstance>,
    ) -> Result<(), SceneError> {
        if let Some(parent) = emitter.world_link().parent_world() {
            if !emitter.world_link().marked_remove() {
                return Err(SceneError::AlreadyOwned);
            }
            parent.remove_particle_emitter(emitter)?;
        }

        emitter.world_link().set_marked_remove(false);
        emitter.world_link().set_parent(Some(self));

        let mut content = self.content.lock().unwrap();
        attach(&mut content.octree, emitter.spatial_link(), emitter.extends());
        content.particle_emitters.push(emitter.clone());
        Ok(())
    }

    /// Unlink a particle emitter instance and drop the world's reference
    pub fn remove_particle_emitter(
        self: &Arc<Self>,
        emitter: &Arc<RParticleEmitterInstance>,
    ) -> Result<(), SceneError> {
        if !emitter.world_link().is_parent(self) {
            return Err(SceneError::NotInWorld);
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .particle_emitters
            .iter()
            .position(|e| Arc::ptr_eq(e, emitter))
            .ok_or(SceneError::NotInWorld)?;

        emitter.world_link().set_parent(None);
        emitter.world_link().set_marked_remove(false);
        detach(&mut content.octree, emitter.spatial_link());
        content.particle_emitters.remove(index);
        Ok(())
    }

    /// Unlink every particle emitter instance
    pub fn remove_all_particle_emitters(&self) {
        let mut content = self.content.lock().unwrap();
        while let Some(emitter) = content.particle_emitters.pop() {
            emitter.world_link().set_parent(None);
            emitter.world_link().set_marked_remove(false);
            detach(&mut content.octree, emitter.spatial_link());
        }
    }

    /// Sweep: unlink exactly the particle emitters flagged for removal
    pub fn remove_removal_marked_particle_emitters(&self) {
        let mut content = self.content.lock().unwrap();
        let mut index = 0;
        while index < content.particle_emitters.len() {
            let emitter = content.particle_emitters[index].clone();
            if emitter.world_link().marked_remove() {
                emitter.world_link().set_parent(None);
                emitter.world_link().set_marked_remove(false);
                detach(&mut content.octree, emitter.spatial_link());
                content.particle_emitters.remove(index);
            } else {
                index += 1;
            }
        }
    }

    // Height terrain
    ///////////////////

    /// The current height terrain, if any
    pub fn height_terrain(&self) -> Option<Arc<RHeightTerrain>> {
        self.content.lock().unwrap().height_terrain.clone()
    }

    /// Replace the height terrain
    pub fn set_height_terrain(self: &Arc<Self>, terrain: Option<&Arc<RHeightTerrain>>) {
        let mut content = self.content.lock().unwrap();
        if let Some(old) = content.height_terrain.take() {
            old.world_link().set_parent(None);
        }
        if let Some(terrain) = terrain {
            terrain.world_link().set_parent(Some(self));
            content.height_terrain = Some(terrain.clone());
        }
    }

    // Environment maps
    /////////////////////

    /// Number of registered environment maps (probe maps plus sky map)
    pub fn env_map_count(&self) -> usize {
        self.content.lock().unwrap().env_maps.len()
    }

    /// The world's sky fallback environment map, once created
    pub fn sky_env_map(&self) -> Option<Arc<REnvMap>> {
        self.content.lock().unwrap().sky_env_map.clone()
    }

    /// Register an environment map
    pub(crate) fn add_env_map(&self, env_map: &Arc<REnvMap>) -> Result<(), SceneError> {
        if env_map.in_world() {
            return Err(SceneError::InvalidParam("env map already registered"));
        }

        self.content.lock().unwrap().env_maps.push(env_map.clone());
        env_map.set_in_world(true);
        self.invalidate_env_map_layout();
        Ok(())
    }

    /// Deregister an environment map, dropping every resolved reference
    pub(crate) fn remove_env_map(&self, env_map: &Arc<REnvMap>) -> Result<(), SceneError> {
        if !env_map.in_world() {
            return Err(SceneError::InvalidParam("env map not registered"));
        }

        let mut content = self.content.lock().unwrap();
        let index = content
            .env_maps
            .iter()
            .position(|m| Arc::ptr_eq(m, env_map))
            .ok_or(SceneError::NotInWorld)?;

        for component in &content.components {
            component.invalidate_render_env_map_if(env_map);
        }
        for billboard in &content.billboards {
            billboard.invalidate_render_env_map_if(env_map);
        }
        for emitter in &content.particle_emitters {
            emitter.invalidate_render_env_map_if(env_map);
        }

        content.env_maps.remove(index);
        env_map.set_in_world(false);
        self.invalidate_env_map_layout();
        Ok(())
    }

    /// Environment map closest to `position`, sky map as fallback
    ///
    /// Picking the closest map can switch harshly at region boundaries;
    /// grid-based blending between neighboring maps is the follow-up that
    /// would smooth this out.
    pub fn find_best_env_map(&self, position: DVec3) -> Option<Arc<REnvMap>> {
        let content = self.content.lock().unwrap();
        let mut best: Option<(&Arc<REnvMap>, f64)> = None;

        for env_map in &content.env_maps {
            if env_map.sky_only() {
                continue;
            }
            let distance = (env_map.position() - position).norm_squared();
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((env_map, distance));
            }
        }

        best.map(|(env_map, _)| env_map.clone())
            .or_else(|| content.sky_env_map.clone())
    }

    /// Reset the per-frame environment map update budget
    pub fn reset_env_map_update_budget(&self) {
        self.content.lock().unwrap().env_map_update_budget =
            self.ctx.config().env_map_update_budget;
    }

    // Prepare passes
    ///////////////////

    /// First render-thread pass of the frame
    ///
    /// Creates the sky environment map if missing (this registers an env
    /// map, which would race against parallel tasks if done later), runs
    /// light early-prepare and sweeps removal-marked env map probes.
    pub fn early_prepare_for_render(self: &Arc<Self>, _plan: &RenderPlan) {
        if !self.dirty_prepare_early.swap(false, Ordering::AcqRel) {
            return;
        }

        self.create_sky_env_map();

        let lights: Vec<Arc<RLight>> = self.content.lock().unwrap().prepare_lights.clone();
        for light in &lights {
            light.early_prepare_for_render();
        }

        self.remove_removal_marked_env_map_probes();
    }

    /// Main render-thread pass of the frame
    ///
    /// Drains the per-category prepare queues; an object may re-queue
    /// itself while being processed, the re-queued entry is handled in the
    /// next frame's drain. Then runs the deferred phase: env-map layout,
    /// skies, terrain and the second-stage staging of drained objects.
    pub fn prepare_for_render(self: &Arc<Self>, plan: &RenderPlan) {
        if !self.dirty_prepare.swap(false, Ordering::AcqRel) {
            return;
        }

        // drain components
        let batch = std::mem::take(&mut self.content.lock().unwrap().prepare_components);
        let mut render_components = Vec::with_capacity(batch.len());
        for component in batch {
            component.prepare_queued().store(false, Ordering::Release);
            if component.parent_world().is_none() {
                continue; // sanity check
            }
            if !component.visible() {
                continue; // skip if invisible
            }
            if component.prepare_for_render(self, plan) {
                self.queue_component_prepare(&component);
            }
            render_components.push(component);
        }

        // drain billboards
        let batch = std::mem::take(&mut self.content.lock().unwrap().prepare_billboards);
        let mut render_billboards = Vec::with_capacity(batch.len());
        for billboard in batch {
            billboard.prepare_queued().store(false, Ordering::Release);
            if billboard.parent_world().is_none() {
                continue;
            }
            if !billboard.visible() {
                continue;
            }
            if billboard.prepare_for_render(self, plan) {
                self.queue_billboard_prepare(&billboard);
            }
            render_billboards.push(billboard);
        }

        // drain lights
        let batch = std::mem::take(&mut self.content.lock().unwrap().prepare_lights);
        for light in batch {
            light.prepare_queued().store(false, Ordering::Release);
            if light.parent_world().is_none() || !light.active() {
                continue;
            }
            if light.prepare_for_render(plan) {
                self.queue_light_prepare(&light);
            }
        }

        // drain prop fields
        let batch = std::mem::take(&mut self.content.lock().unwrap().prepare_prop_fields);
        let mut render_prop_fields = Vec::with_capacity(batch.len());
        for prop_field in batch {
            prop_field.prepare_queued().store(false, Ordering::Release);
            if prop_field.parent_world().is_none() {
                continue;
            }
            if prop_field.prepare_for_render() {
                self.queue_prop_field_prepare(&prop_field);
            }
            render_prop_fields.push(prop_field);
        }

        // debug drawers rebuild staged vertices in place
        let drawers: Vec<Arc<RDebugDrawer>> =
            self.content.lock().unwrap().debug_drawers.clone();
        for drawer in &drawers {
            if drawer.visible() {
                drawer.update_vertices();
            }
        }

        self.prepare_render_phase(plan, &render_components, &render_billboards, &render_prop_fields);
    }

    /// Deferred phase: work that must run after every queue drained
    fn prepare_render_phase(
        self: &Arc<Self>,
        plan: &RenderPlan,
        render_components: &[Arc<RComponent>],
        render_billboards: &[Arc<RBillboard>],
        render_prop_fields: &[Arc<RPropField>],
    ) {
        // environment map layout changed: re-resolve consumers
        if self.dirty_env_map_layout.swap(false, Ordering::AcqRel) {
            let (billboards, emitters) = {
                let content = self.content.lock().unwrap();
                (content.billboards.clone(), content.particle_emitters.clone())
            };
            for billboard in &billboards {
                billboard.update_render_env_map(self);
            }
            for emitter in &emitters {
                emitter.update_render_env_map(self);
            }
        }

        // skies: resolve light, keep draw order sorted
        let skies: Vec<Arc<RSkyInstance>> = self.content.lock().unwrap().skies.clone();
        for sky in &skies {
            sky.prepare_for_render();
        }

        if self.dirty_sky_order.swap(false, Ordering::AcqRel) {
            self.content
                .lock()
                .unwrap()
                .skies
                .sort_by_key(|sky| sky.order());
        }

        // spend the env map budget: sky map first, then probes
        {
            let (sky_env_map, probes, mut budget) = {
                let content = self.content.lock().unwrap();
                (
                    content.sky_env_map.clone(),
                    content.env_map_probes.clone(),
                    content.env_map_update_budget,
                )
            };
            if let Some(sky_env_map) = &sky_env_map {
                sky_env_map.prepare_for_render(&mut budget);
            }
            for probe in &probes {
                probe.prepare_for_render(&mut budget);
            }
            self.content.lock().unwrap().env_map_update_budget = budget;
        }

        // resolve total sky light for tone mapping
        {
            let ambient = self.ambient_light();
            let ambient_luminance =
                0.2126 * ambient.x + 0.7152 * ambient.y + 0.0722 * ambient.z;
            let sky_intensity: f32 =
                skies.iter().map(|sky| sky.total_light_intensity()).sum();
            self.lighting.write().unwrap().resolved_sky_intensity =
                sky_intensity + ambient_luminance;
        }

        // fan out sky changes to the environment maps
        if self.dirty_notify_sky_changed.swap(false, Ordering::AcqRel) {
            let env_maps: Vec<Arc<REnvMap>> = self.content.lock().unwrap().env_maps.clone();
            for env_map in &env_maps {
                env_map.sky_changed();
            }
        }

        // height terrain
        if let Some(terrain) = self.height_terrain() {
            terrain.prepare_for_render();
        }

        // second stage: stage renderer-facing data
        for component in render_components {
            component.prepare_for_render_render(self, plan);
        }
        for billboard in render_billboards {
            billboard.prepare_for_render_render(self, plan);
        }
        for prop_field in render_prop_fields {
            prop_field.prepare_for_render_render();
        }

        // lumimeters measure after all lights are resolved
        let lumimeters: Vec<Arc<RLumimeter>> =
            self.content.lock().unwrap().lumimeters.clone();
        for lumimeter in &lumimeters {
            lumimeter.prepare_for_render(self);
        }
    }

    fn create_sky_env_map(&self) {
        let mut content = self.content.lock().unwrap();
        if content.sky_env_map.is_some() {
            return;
        }

        let env_map = Arc::new(REnvMap::new_sky(self.ctx.config().env_map_size));
        env_map.set_in_world(true);
        content.env_maps.push(env_map.clone());
        content.sky_env_map = Some(env_map);
        drop(content);

        self.invalidate_env_map_layout();
    }
}

/// Register a spatial object with the octree
fn attach(octree: &mut Octree, link: &SpatialLink, bounds: DAabb) {
    octree.insert(link.id(), bounds);
    link.set_indexed_bounds(Some(bounds));
}

/// Deregister a spatial object from the octree
fn detach(octree: &mut Octree, link: &SpatialLink) {
    if let Some(bounds) = link.indexed_bounds() {
        octree.remove(link.id(), bounds);
        link.set_indexed_bounds(None);
    }
}

/// Re-insert a spatial object into a freshly built octree
fn reindex(octree: &mut Octree, link: &SpatialLink) {
    if let Some(bounds) = link.indexed_bounds() {
        octree.insert(link.id(), bounds);
    }
}

fn unqueue_component(content: &mut WorldContent, component: &Arc<RComponent>) {
    if component.prepare_queued().swap(false, Ordering::AcqRel) {
        content
            .prepare_components
            .retain(|c| !Arc::ptr_eq(c, component));
    }
}

fn unqueue_billboard(content: &mut WorldContent, billboard: &Arc<RBillboard>) {
    if billboard.prepare_queued().swap(false, Ordering::AcqRel) {
        content
            .prepare_billboards
            .retain(|b| !Arc::ptr_eq(b, billboard));
    }
}

fn unqueue_light(content: &mut WorldContent, light: &Arc<RLight>) {
    if light.prepare_queued().swap(false, Ordering::AcqRel) {
        content.prepare_lights.retain(|l| !Arc::ptr_eq(l, light));
    }
}

fn unqueue_prop_field(content: &mut WorldContent, prop_field: &Arc<RPropField>) {
    if prop_field.prepare_queued().swap(false, Ordering::AcqRel) {
        content
            .prepare_prop_fields
            .retain(|p| !Arc::ptr_eq(p, prop_field));
    }
}

/// Keep the octree roughly cubic
///
/// Worlds are often broad but not tall; overly squashed nodes cannot
/// contain objects well, pushing them up into larger nodes. A 1:2 axis
/// ratio is the accepted floor.
fn sanitize_octree_size(size: DVec3) -> DVec3 {
    let largest = size.x.max(size.y).max(size.z).max(1.0);
    let smallest = largest * 0.5;
    DVec3::new(
        size.x.max(smallest),
        size.y.max(smallest),
        size.z.max(smallest),
    )
}

/// Insertion depth derived from the world extent
///
/// A 1 km world gets depth 8, the smallest node roughly 4 m across. Every
/// power of two of extra extent adds one level, floored by configuration.
fn octree_insert_depth(size: DVec3, ctx: &RenderContext) -> u32 {
    let config = ctx.config();
    let largest = size.x.max(size.y).max(size.z).max(1.0);
    let depth = (largest.log2().ceil() as i32) + config.octree_depth_bias;
    depth.max(config.octree_min_depth as i32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::spatial::SpatialLink;

    fn test_world() -> Arc<RWorld> {
        RWorld::new(
            &RenderContext::new(SyncConfig::default()),
            DVec3::new(1000.0, 1000.0, 1000.0),
        )
    }

    fn test_light(world: &Arc<RWorld>) -> Arc<RLight> {
        Arc::new(RLight::new(SpatialLink::new(
            world.context().next_spatial_id(),
        )))
    }

    #[test]
    fn test_octree_depth_follows_world_size() {
        let ctx = RenderContext::new(SyncConfig::default());
        let small = octree_insert_depth(DVec3::new(100.0, 100.0, 100.0), &ctx);
        let large = octree_insert_depth(DVec3::new(1000.0, 1000.0, 1000.0), &ctx);
        assert_eq!(large, 8);
        assert!(small < large);
        // floor kicks in for tiny worlds
        assert_eq!(octree_insert_depth(DVec3::new(2.0, 2.0, 2.0), &ctx), 4);
    }

    #[test]
    fn test_sanitize_keeps_axis_ratio() {
        let size = sanitize_octree_size(DVec3::new(1000.0, 100.0, 1000.0));
        assert_eq!(size.y, 500.0);
        assert_eq!(size.x, 1000.0);
    }

    #[test]
    fn test_add_light_takes_ownership() {
        let world = test_world();
        let light = test_light(&world);

        world.add_light(&light).unwrap();
        assert_eq!(world.light_count(), 1);
        assert_eq!(world.spatial_entry_count(), 1);
        assert!(light.world_link().is_parent(&world));

        // a second world must reject the un-marked light
        let other = test_world();
        assert!(matches!(
            other.add_light(&light),
            Err(SceneError::AlreadyOwned)
        ));

        // marked for removal the light migrates
        light.world_link().set_marked_remove(true);
        other.add_light(&light).unwrap();
        assert_eq!(world.light_count(), 0);
        assert_eq!(other.light_count(), 1);
        assert!(!light.world_marked_remove());
    }

    #[test]
    fn test_removal_marked_sweep_removes_exactly_marked() {
        let world = test_world();
        let keep = test_light(&world);
        let remove = test_light(&world);
        world.add_light(&keep).unwrap();
        world.add_light(&remove).unwrap();

        remove.world_link().set_marked_remove(true);
        world.remove_removal_marked_lights();

        assert_eq!(world.light_count(), 1);
        assert_eq!(world.spatial_entry_count(), 1);
        assert!(keep.world_link().is_parent(&world));
        assert!(!remove.world_link().has_parent());
        assert!(!remove.world_marked_remove(), "sweep clears the mark");
    }

    #[test]
    fn test_set_size_reindexes_spatial_objects() {
        let world = test_world();
        let light = test_light(&world);
        light.set_geometry(DVec3::new(40.0, 0.0, 0.0), crate::foundation::math::DQuat::identity());
        world.add_light(&light).unwrap();
        assert_eq!(world.spatial_entry_count(), 1);

        world.set_size(DVec3::new(4000.0, 4000.0, 4000.0));

        // the entry survived the octree rebuild and is still findable
        assert_eq!(world.spatial_entry_count(), 1);
        let hits = world.visit_region(&DAabb::from_center_extents(
            DVec3::new(40.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 1.0),
        ));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0], light.spatial_link().id());
    }

    #[test]
    fn test_sky_env_map_created_in_early_prepare() {
        let world = test_world();
        assert!(world.sky_env_map().is_none());

        world.early_prepare_for_render(&RenderPlan::default());
        let sky_map = world.sky_env_map().expect("sky env map created");
        assert!(sky_map.sky_only());
        assert_eq!(world.env_map_count(), 1);

        // second call is a no-op until the next sync requests a prepare
        world.early_prepare_for_render(&RenderPlan::default());
        assert_eq!(world.env_map_count(), 1);
    }

    #[test]
    fn test_find_best_env_map_prefers_closest() {
        let world = test_world();
        let near = Arc::new(REnvMap::new(128));
        near.set_position(DVec3::new(10.0, 0.0, 0.0));
        let far = Arc::new(REnvMap::new(128));
        far.set_position(DVec3::new(100.0, 0.0, 0.0));

        world.add_env_map(&near).unwrap();
        world.add_env_map(&far).unwrap();

        let best = world.find_best_env_map(DVec3::zeros()).unwrap();
        assert!(Arc::ptr_eq(&best, &near));
    }

    #[test]
    fn test_reference_position_recenters() {
        let world = test_world();
        world.check_reference_position(DVec3::new(5000.0, 0.0, 0.0));
        assert_eq!(world.reference_position(), DVec3::zeros(), "within range");

        world.check_reference_position(DVec3::new(30000.0, 0.0, 0.0));
        assert_eq!(
            world.reference_position(),
            DVec3::new(15000.0, 0.0, 0.0),
            "recentered halfway"
        );
    }
}
