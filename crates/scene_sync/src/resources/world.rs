//! World resource: the logic-side scene container and sync orchestrator
//!
//! The world owns every resource placed in it and drives the once-per-frame
//! sync pass. Category order within the pass is fixed: skies and terrain
//! first (environment map layout decisions read sky state), then components,
//! then prop fields and particle emitters (their instance counts depend on
//! component-driven callbacks run earlier in the frame), then the remaining
//! categories.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{Color, DVec3, Mat4};
use crate::render::world::RWorld;
use crate::resources::billboard::Billboard;
use crate::resources::camera::Camera;
use crate::resources::component::Component;
use crate::resources::debug_drawer::DebugDrawer;
use crate::resources::env_map_probe::EnvMapProbe;
use crate::resources::height_terrain::HeightTerrain;
use crate::resources::light::Light;
use crate::resources::lumimeter::Lumimeter;
use crate::resources::particle_emitter::ParticleEmitterInstance;
use crate::resources::prop_field::PropField;
use crate::resources::sky::SkyInstance;

new_key_type! {
    /// Key of a camera in its world
    pub struct CameraKey;
    /// Key of a light in its world
    pub struct LightKey;
    /// Key of a component in its world
    pub struct ComponentKey;
    /// Key of a billboard in its world
    pub struct BillboardKey;
    /// Key of a sky instance in its world
    pub struct SkyKey;
    /// Key of an environment map probe in its world
    pub struct EnvMapProbeKey;
    /// Key of a lumimeter in its world
    pub struct LumimeterKey;
    /// Key of a prop field in its world
    pub struct PropFieldKey;
    /// Key of a particle emitter instance in its world
    pub struct ParticleEmitterKey;
    /// Key of a debug drawer in its world
    pub struct DebugDrawerKey;
}

/// Logic-side world
///
/// All mutation happens on the logic thread. [`Self::sync_to_render`] is the
/// single point where accumulated changes cross to the render side; it must
/// run once per frame, after all mutations, before the render thread's
/// prepare passes.
#[derive(Debug)]
pub struct World {
    ctx: RenderContext,
    r_world: Arc<RWorld>,

    size: DVec3,
    dirty_size: bool,

    ambient_light: Color,
    light_color_matrix: Mat4,
    disable_lights: bool,
    dirty_lighting: bool,

    cameras: SlotMap<CameraKey, Camera>,

    skies: SlotMap<SkyKey, SkyInstance>,
    dirty_skies: bool,

    height_terrain: Option<HeightTerrain>,
    dirty_height_terrain: bool,

    components: SlotMap<ComponentKey, Component>,
    dirty_components: bool,
    sync_components: Vec<ComponentKey>,

    prop_fields: SlotMap<PropFieldKey, PropField>,
    dirty_prop_fields: bool,

    particle_emitters: SlotMap<ParticleEmitterKey, ParticleEmitterInstance>,
    dirty_particle_emitters: bool,

    lights: SlotMap<LightKey, Light>,
    dirty_lights: bool,

    env_map_probes: SlotMap<EnvMapProbeKey, EnvMapProbe>,
    dirty_env_map_probes: bool,

    lumimeters: SlotMap<LumimeterKey, Lumimeter>,
    dirty_lumimeters: bool,

    debug_drawers: SlotMap<DebugDrawerKey, DebugDrawer>,
    dirty_debug_drawers: bool,

    billboards: SlotMap<BillboardKey, Billboard>,
    dirty_billboards: bool,
    sync_billboards: Vec<BillboardKey>,

    dirty_env_map_update_budget: bool,

    /// Latch against sync loops through reference cycles
    /// (world -> component -> dynamic skin -> canvas -> world)
    syncing: bool,
}

impl World {
    /// Create a world spanning `size` meters
    pub fn new(ctx: &RenderContext, size: DVec3) -> Result<Self, SceneError> {
        if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
            return Err(SceneError::InvalidParam("world size must be positive"));
        }

        Ok(Self {
            ctx: ctx.clone(),
            r_world: RWorld::new(ctx, size),
            size,
            dirty_size: false,
            ambient_light: Color::new(0.0, 0.0, 0.0, 1.0),
            light_color_matrix: Mat4::identity(),
            disable_lights: false,
            dirty_lighting: true,
            cameras: SlotMap::with_key(),
            skies: SlotMap::with_key(),
            dirty_skies: true,
            height_terrain: None,
            dirty_height_terrain: true,
            components: SlotMap::with_key(),
            dirty_components: true,
            sync_components: Vec::new(),
            prop_fields: SlotMap::with_key(),
            dirty_prop_fields: true,
            particle_emitters: SlotMap::with_key(),
            dirty_particle_emitters: true,
            lights: SlotMap::with_key(),
            dirty_lights: true,
            env_map_probes: SlotMap::with_key(),
            dirty_env_map_probes: true,
            lumimeters: SlotMap::with_key(),
            dirty_lumimeters: true,
            debug_drawers: SlotMap::with_key(),
            dirty_debug_drawers: true,
            billboards: SlotMap::with_key(),
            dirty_billboards: true,
            sync_billboards: Vec::new(),
            dirty_env_map_update_budget: true,
            syncing: false,
        })
    }

    /// The render mirror of this world
    pub fn render_world(&self) -> &Arc<RWorld> {
        &self.r_world
    }

    /// Context this world was created with
    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    /// World size in meters
    pub fn size(&self) -> DVec3 {
        self.size
    }

    /// Resize the world
    pub fn set_size(&mut self, size: DVec3) {
        self.size = size;
        self.dirty_size = true;
    }

    /// Ambient light color
    pub fn ambient_light(&self) -> Color {
        self.ambient_light
    }

    /// Set the ambient light color
    pub fn set_ambient_light(&mut self, color: Color) {
        self.ambient_light = color;
        self.dirty_lighting = true;
    }

    /// Set the matrix applied to all light colors
    pub fn set_light_color_matrix(&mut self, matrix: Mat4) {
        self.light_color_matrix = matrix;
        self.dirty_lighting = true;
    }

    /// Disable every non-sky light source
    pub fn set_disable_lights(&mut self, disable: bool) {
        self.disable_lights = disable;
        self.dirty_lighting = true;
    }

    // Per-frame update
    /////////////////////

    /// Advance time-dependent peer state; call once per logic frame
    ///
    /// Accumulates camera adaption time, negotiates prop field LOD levels
    /// against all cameras and resets the environment map update budget for
    /// the frame.
    pub fn update(&mut self, elapsed: f32) {
        for (_, camera) in &mut self.cameras {
            camera.update(elapsed);
        }

        let camera_positions: Vec<DVec3> =
            self.cameras.iter().map(|(_, c)| c.position()).collect();
        for (_, prop_field) in &mut self.prop_fields {
            for position in &camera_positions {
                prop_field.test_lod_level(*position);
            }
        }

        self.dirty_env_map_update_budget = true;
    }

    // Cameras
    ////////////

    /// Number of cameras
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Add a camera; the world becomes its parent
    pub fn add_camera(&mut self, mut camera: Camera) -> CameraKey {
        camera.peer_mut().set_parent_world(Some(self.r_world.clone()));
        self.cameras.insert(camera)
    }

    /// Remove a camera, getting the resource back
    pub fn remove_camera(&mut self, key: CameraKey) -> Option<Camera> {
        let mut camera = self.cameras.remove(key)?;
        camera.peer_mut().set_parent_world(None);
        Some(camera)
    }

    /// Shared access to a camera
    pub fn camera(&self, key: CameraKey) -> Option<&Camera> {
        self.cameras.get(key)
    }

    /// Mutable access to a camera
    pub fn camera_mut(&mut self, key: CameraKey) -> Option<&mut Camera> {
        self.cameras.get_mut(key)
    }

    // Skies
    //////////

    /// Number of sky instances
    pub fn sky_count(&self) -> usize {
        self.skies.len()
    }

    /// Add a sky instance
    pub fn add_sky(&mut self, mut sky: SkyInstance) -> SkyKey {
        sky.peer_mut().set_parent_world(Some(self.r_world.clone()));
        self.dirty_skies = true;
        self.skies.insert(sky)
    }

    /// Remove a sky instance, getting the resource back
    ///
    /// The render mirror stays in the render world, flagged for removal,
    /// until the next sync pass sweeps it.
    pub fn remove_sky(&mut self, key: SkyKey) -> Option<SkyInstance> {
        let mut sky = self.skies.remove(key)?;
        sky.peer_mut().set_parent_world(None);
        self.dirty_skies = true;
        Some(sky)
    }

    /// Shared access to a sky instance
    pub fn sky(&self, key: SkyKey) -> Option<&SkyInstance> {
        self.skies.get(key)
    }

    /// Mutable access to a sky instance
    pub fn sky_mut(&mut self, key: SkyKey) -> Option<&mut SkyInstance> {
        self.skies.get_mut(key)
    }

    // Height terrain
    ///////////////////

    /// Install or replace the height terrain
    pub fn set_height_terrain(&mut self, terrain: Option<HeightTerrain>) {
        self.height_terrain = terrain;
        self.dirty_height_terrain = true;
    }

    /// The current height terrain
    pub fn height_terrain(&self) -> Option<&HeightTerrain> {
        self.height_terrain.as_ref()
    }

    /// Mutable access to the height terrain
    pub fn height_terrain_mut(&mut self) -> Option<&mut HeightTerrain> {
        self.height_terrain.as_mut()
    }

    // Components
    ///////////////

    /// Number of components
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Add a component; it is queued for its first sync
    pub fn add_component(&mut self, mut component: Component) -> ComponentKey {
        component
            .peer_mut()
            .set_parent_world(Some(self.r_world.clone()));
        let key = self.components.insert(component);
        self.components[key].peer_mut().queued_sync = true;
        self.sync_components.push(key);
        self.dirty_components = true;
        key
    }

    /// Remove a component, getting the resource back
    pub fn remove_component(&mut self, key: ComponentKey) -> Option<Component> {
        let mut component = self.components.remove(key)?;
        component.peer_mut().set_parent_world(None);
        // a stale key may remain in the sync list; the drain skips it
        self.dirty_components = true;
        Some(component)
    }

    /// Shared access to a component
    pub fn component(&self, key: ComponentKey) -> Option<&Component> {
        self.components.get(key)
    }

    /// Mutable access to a component
    ///
    /// Returns a guard; when it drops, the component is queued for sync if
    /// any mutation left it dirty.
    pub fn component_mut(&mut self, key: ComponentKey) -> Option<ComponentMut<'_>> {
        let component = self.components.get_mut(key)?;
        Some(ComponentMut {
            component,
            sync_list: &mut self.sync_components,
            key,
        })
    }

    // Prop fields
    ////////////////

    /// Number of prop fields
    pub fn prop_field_count(&self) -> usize {
        self.prop_fields.len()
    }

    /// Add a prop field
    pub fn add_prop_field(&mut self, mut prop_field: PropField) -> PropFieldKey {
        prop_field
            .peer_mut()
            .set_parent_world(Some(self.r_world.clone()));
        self.dirty_prop_fields = true;
        self.prop_fields.insert(prop_field)
    }

    /// Remove a prop field, getting the resource back
    pub fn remove_prop_field(&mut self, key: PropFieldKey) -> Option<PropField> {
        let mut prop_field = self.prop_fields.remove(key)?;
        prop_field.peer_mut().set_parent_world(None);
        self.dirty_prop_fields = true;
        Some(prop_field)
    }

    /// Shared access to a prop field
    pub fn prop_field(&self, key: PropFieldKey) -> Option<&PropField> {
        self.prop_fields.get(key)
    }

    /// Mutable access to a prop field
    pub fn prop_field_mut(&mut self, key: PropFieldKey) -> Option<&mut PropField> {
        self.prop_fields.get_mut(key)
    }

    // Particle emitter instances
    ///////////////////////////////

    /// Number of particle emitter instances
    pub fn particle_emitter_count(&self) -> usize {
        self.particle_emitters.len()
    }

    /// Add a particle emitter instance
    pub fn add_particle_emitter(
        &mut self,
        mut emitter: ParticleEmitterInstance,
    ) -> ParticleEmitterKey {
        emitter
            .peer_mut()
            .set_parent_world(Some(self.r_world.clone()));
        self.dirty_particle_emitters = true;
        self.particle_emitters.insert(emitter)
    }

    /// Remove a particle emitter instance, getting the resource back
    pub fn remove_particle_emitter(
        &mut self,
        key: ParticleEmitterKey,
    ) -> Option<ParticleEmitterInstance> {
        let mut emitter = self.particle_emitters.remove(key)?;
        emitter.peer_mut().set_parent_world(None);
        self.dirty_particle_emitters = true;
        Some(emitter)
    }

    /// Shared access to a particle emitter instance
    pub fn particle_emitter(&self, key: ParticleEmitterKey) -> Option<&ParticleEmitterInstance> {
        self.particle_emitters.get(key)
    }

    /// Mutable access to a particle emitter instance
    pub fn particle_emitter_mut(
        &mut self,
        key: ParticleEmitterKey,
    ) -> Option<&mut ParticleEmitterInstance> {
        self.particle_emitters.get_mut(key)
    }

    // Lights
    ///////////

    /// Number of lights
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Add a light
    pub fn add_light(&mut self, mut light: Light) -> LightKey {
        light.peer_mut().set_parent_world(Some(self.r_world.clone()));
        self.dirty_lights = true;
        self.lights.insert(light)
    }

    /// Remove a light, getting the resource back
    pub fn remove_light(&mut self, key: LightKey) -> Option<Light> {
        let mut light = self.lights.remove(key)?;
        light.peer_mut().set_parent_world(None);
        self.dirty_lights = true;
        Some(light)
    }

    /// Remove every light
    pub fn remove_all_lights(&mut self) {
        for (_, mut light) in self.lights.drain() {
            light.peer_mut().set_parent_world(None);
        }
        self.dirty_lights = true;
    }

    /// Shared access to a light
    pub fn light(&self, key: LightKey) -> Option<&Light> {
        self.lights.get(key)
    }

    /// Mutable access to a light
    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut Light> {
        self.lights.get_mut(key)
    }

    // Environment map probes
    ///////////////////////////

    /// Number of environment map probes
    pub fn env_map_probe_count(&self) -> usize {
        self.env_map_probes.len()
    }

    /// Add an environment map probe
    pub fn add_env_map_probe(&mut self, mut probe: EnvMapProbe) -> EnvMapProbeKey {
        probe.peer_mut().set_parent_world(Some(self.r_world.clone()));
        self.dirty_env_map_probes = true;
        self.env_map_probes.insert(probe)
    }

    /// Remove an environment map probe, getting the resource back
    ///
    /// The mirror is swept during the render thread's early prepare pass,
    /// where destroying its environment map is safe.
    pub fn remove_env_map_probe(&mut self, key: EnvMapProbeKey) -> Option<EnvMapProbe> {
        let mut probe = self.env_map_probes.remove(key)?;
        probe.peer_mut().set_parent_world(None);
        self.dirty_env_map_probes = true;
        Some(probe)
    }

    /// Shared access to a probe
    pub fn env_map_probe(&self, key: EnvMapProbeKey) -> Option<&EnvMapProbe> {
        self.env_map_probes.get(key)
    }

    /// Mutable access to a probe
    pub fn env_map_probe_mut(&mut self, key: EnvMapProbeKey) -> Option<&mut EnvMapProbe> {
        self.env_map_probes.get_mut(key)
    }

    // Lumimeters
    ///////////////

    /// Number of lumimeters
    pub fn lumimeter_count(&self) -> usize {
        self.lumimeters.len()
    }

    /// Add a lumimeter
    pub fn add_lumimeter(&mut self, mut lumimeter: Lumimeter) -> LumimeterKey {
        lumimeter
            .peer_mut()
            .set_parent_world(Some(self.r_world.clone()));
        self.dirty_lumimeters = true;
        self.lumimeters.insert(lumimeter)
    }

    /// Remove a lumimeter, getting the resource back
    pub fn remove_lumimeter(&mut self, key: LumimeterKey) -> Option<Lumimeter> {
        let mut lumimeter = self.lumimeters.remove(key)?;
        lumimeter.peer_mut().set_parent_world(None);
        self.dirty_lumimeters = true;
        Some(lumimeter)
    }

    /// Shared access to a lumimeter
    pub fn lumimeter(&self, key: LumimeterKey) -> Option<&Lumimeter> {
        self.lumimeters.get(key)
    }

    /// Mutable access to a lumimeter
    pub fn lumimeter_mut(&mut self, key: LumimeterKey) -> Option<&mut Lumimeter> {
        self.lumimeters.get_mut(key)
    }

    // Debug drawers
    //////////////////

    /// Number of debug drawers
    pub fn debug_drawer_count(&self) -> usize {
        self.debug_drawers.len()
    }

    /// Add a debug drawer
    pub fn add_debug_drawer(&mut self, mut drawer: DebugDrawer) -> DebugDrawerKey {
        drawer.peer_mut().set_parent_world(Some(self.r_world.clone()));
        self.dirty_debug_drawers = true;
        self.debug_drawers.insert(drawer)
    }

    /// Remove a debug drawer, getting the resource back
    pub fn remove_debug_drawer(&mut self, key: DebugDrawerKey) -> Option<DebugDrawer> {
        let mut drawer = self.debug_drawers.remove(key)?;
        drawer.peer_mut().set_parent_world(None);
        self.dirty_debug_drawers = true;
        Some(drawer)
    }

    /// Shared access to a debug drawer
    pub fn debug_drawer(&self, key: DebugDrawerKey) -> Option<&DebugDrawer> {
        self.debug_drawers.get(key)
    }

    /// Mutable access to a debug drawer
    pub fn debug_drawer_mut(&mut self, key: DebugDrawerKey) -> Option<&mut DebugDrawer> {
        self.debug_drawers.get_mut(key)
    }

    // Billboards
    ///////////////

    /// Number of billboards
    pub fn billboard_count(&self) -> usize {
        self.billboards.len()
    }

    /// Add a billboard; it is queued for its first sync
    pub fn add_billboard(&mut self, mut billboard: Billboard) -> BillboardKey {
        billboard
            .peer_mut()
            .set_parent_world(Some(self.r_world.clone()));
        let key = self.billboards.insert(billboard);
        self.billboards[key].peer_mut().queued_sync = true;
        self.sync_billboards.push(key);
        self.dirty_billboards = true;
        key
    }

    /// Remove a billboard, getting the resource back
    pub fn remove_billboard(&mut self, key: BillboardKey) -> Option<Billboard> {
        let mut billboard = self.billboards.remove(key)?;
        billboard.peer_mut().set_parent_world(None);
        self.dirty_billboards = true;
        Some(billboard)
    }

    /// Shared access to a billboard
    pub fn billboard(&self, key: BillboardKey) -> Option<&Billboard> {
        self.billboards.get(key)
    }

    /// Mutable access to a billboard
    ///
    /// Returns a guard; when it drops, the billboard is queued for sync if
    /// any mutation left it dirty.
    pub fn billboard_mut(&mut self, key: BillboardKey) -> Option<BillboardMut<'_>> {
        let billboard = self.billboards.get_mut(key)?;
        Some(BillboardMut {
            billboard,
            sync_list: &mut self.sync_billboards,
            key,
        })
    }

    // Synchronization
    ////////////////////

    /// Push all accumulated changes into the render mirror
    ///
    /// Logic thread, once per frame, after all mutations. Reentrant calls
    /// (possible through reference cycles) return immediately; the outer
    /// call completes the work. On error the dirty state of unprocessed
    /// aspects is preserved and the next frame retries.
    pub fn sync_to_render(&mut self) -> Result<(), SceneError> {
        if self.syncing {
            // quick protection against sync loops
            // world -> component -> dynamic skin -> canvas -> world
            return Ok(());
        }

        self.syncing = true;
        let result = self.sync_all();
        self.syncing = false;
        result
    }

    fn sync_all(&mut self) -> Result<(), SceneError> {
        if self.dirty_size {
            self.dirty_size = false;
            self.r_world.set_size(self.size);
        }

        self.r_world.requires_prepare_for_render();

        if self.dirty_lighting {
            self.r_world.set_disable_lights(self.disable_lights);
            self.r_world.set_ambient_light(self.ambient_light);
            self.r_world.set_light_color_matrix(self.light_color_matrix);
            self.dirty_lighting = false;
        }

        self.sync_skies()?;
        self.sync_height_terrain();
        self.sync_components()?;
        self.sync_prop_fields()?;
        self.sync_particle_emitters()?;
        self.sync_lights()?;
        self.sync_env_map_probes()?;
        self.sync_lumimeters()?;
        self.sync_debug_drawers()?;
        self.sync_billboards()?;
        self.sync_cameras();

        if self.dirty_env_map_update_budget {
            self.r_world.reset_env_map_update_budget();
            self.dirty_env_map_update_budget = false;
        }

        Ok(())
    }

    fn sync_skies(&mut self) -> Result<(), SceneError> {
        if self.dirty_skies {
            self.r_world.remove_removal_marked_skies();

            for (_, sky) in &self.skies {
                let r_sky = sky.peer().r_sky().clone();
                if !r_sky.world_link().is_parent(&self.r_world) {
                    self.r_world.add_sky(&r_sky)?;
                }
            }

            self.dirty_skies = false;
        }

        for (_, sky) in &mut self.skies {
            sky.sync_to_render();
        }
        Ok(())
    }

    fn sync_height_terrain(&mut self) {
        if let Some(terrain) = &mut self.height_terrain {
            terrain.sync_to_render();
        }

        if self.dirty_height_terrain {
            match &self.height_terrain {
                Some(terrain) => {
                    let r_terrain = terrain.render_terrain().clone();
                    self.r_world.set_height_terrain(Some(&r_terrain));
                }
                None => self.r_world.set_height_terrain(None),
            }
            self.dirty_height_terrain = false;
        }
    }

    fn sync_components(&mut self) -> Result<(), SceneError> {
        if self.dirty_components {
            self.r_world.remove_removal_marked_components();

            for (key, component) in &self.components {
                let r_component = component.peer().r_component().clone();
                if !r_component.world_link().is_parent(&self.r_world) {
                    self.r_world.add_component(&r_component)?;
                    // new members need a full sync before their first frame
                    if !component.peer().queued_sync {
                        self.sync_components.push(key);
                    }
                }
            }
            // fix up queue flags for keys pushed above
            for key in &self.sync_components {
                if let Some(component) = self.components.get_mut(*key) {
                    component.peer_mut().queued_sync = true;
                }
            }

            self.dirty_components = false;
        }

        // drain exactly the entries queued at loop start; components
        // re-queueing themselves are processed next frame
        let batch = std::mem::take(&mut self.sync_components);
        for key in batch {
            let Some(component) = self.components.get_mut(key) else {
                continue; // removed since queueing
            };
            component.peer_mut().queued_sync = false;
            if component.sync_to_render() {
                // wants another pass (animated)
                component.peer_mut().queued_sync = true;
                self.sync_components.push(key);
            }
        }
        Ok(())
    }

    fn sync_prop_fields(&mut self) -> Result<(), SceneError> {
        if self.dirty_prop_fields {
            self.r_world.remove_removal_marked_prop_fields();

            for (_, prop_field) in &self.prop_fields {
                let r_field = prop_field.peer().r_prop_field().clone();
                if !r_field.world_link().is_parent(&self.r_world) {
                    self.r_world.add_prop_field(&r_field)?;
                }
            }

            self.dirty_prop_fields = false;
        }

        for (_, prop_field) in &mut self.prop_fields {
            prop_field.sync_to_render();
        }
        Ok(())
    }

    fn sync_particle_emitters(&mut self) -> Result<(), SceneError> {
        if self.dirty_particle_emitters {
            self.r_world.remove_removal_marked_particle_emitters();

            for (_, emitter) in &self.particle_emitters {
                let r_emitter = emitter.peer().r_emitter().clone();
                if !r_emitter.world_link().is_parent(&self.r_world) {
                    self.r_world.add_particle_emitter(&r_emitter)?;
                }
            }

            self.dirty_particle_emitters = false;
        }

        for (_, emitter) in &mut self.particle_emitters {
            emitter.sync_to_render();
        }
        Ok(())
    }

    fn sync_lights(&mut self) -> Result<(), SceneError> {
        if self.dirty_lights {
            self.r_world.remove_removal_marked_lights();

            for (_, light) in &self.lights {
                let r_light = light.peer().r_light().clone();
                if !r_light.world_link().is_parent(&self.r_world) {
                    self.r_world.add_light(&r_light)?;
                }
            }

            self.dirty_lights = false;
        }

        for (_, light) in &mut self.lights {
            light.sync_to_render();
        }
        Ok(())
    }

    fn sync_env_map_probes(&mut self) -> Result<(), SceneError> {
        if self.dirty_env_map_probes {
            // no sweep here: destroying a probe releases its environment
            // map, unsafe while parallel tasks read the env-map list; the
            // sweep runs in the render thread's early prepare pass

            for (_, probe) in &self.env_map_probes {
                let r_probe = probe.peer().r_probe().clone();
                if r_probe.world_link().is_parent(&self.r_world) {
                    // removed and re-added between syncs: without a sweep
                    // here the stale mark must be cleared by hand, or the
                    // early prepare pass would sweep a live probe
                    r_probe.world_link().set_marked_remove(false);
                } else {
                    self.r_world.add_env_map_probe(&r_probe)?;
                }
            }

            self.dirty_env_map_probes = false;
        }

        for (_, probe) in &mut self.env_map_probes {
            probe.sync_to_render();
        }
        Ok(())
    }

    fn sync_lumimeters(&mut self) -> Result<(), SceneError> {
        if self.dirty_lumimeters {
            self.r_world.remove_removal_marked_lumimeters();

            for (_, lumimeter) in &self.lumimeters {
                let r_lumimeter = lumimeter.peer().r_lumimeter().clone();
                if !r_lumimeter.world_link().is_parent(&self.r_world) {
                    self.r_world.add_lumimeter(&r_lumimeter)?;
                }
            }

            self.dirty_lumimeters = false;
        }

        for (_, lumimeter) in &mut self.lumimeters {
            lumimeter.sync_to_render();
        }
        Ok(())
    }

    fn sync_debug_drawers(&mut self) -> Result<(), SceneError> {
        if self.dirty_debug_drawers {
            self.r_world.remove_removal_marked_debug_drawers();

            for (_, drawer) in &self.debug_drawers {
                let r_drawer = drawer.peer().r_drawer().clone();
                if !r_drawer.world_link().is_parent(&self.r_world) {
                    self.r_world.add_debug_drawer(&r_drawer)?;
                }
            }

            self.dirty_debug_drawers = false;
        }

        for (_, drawer) in &mut self.debug_drawers {
            drawer.sync_to_render();
        }
        Ok(())
    }

    fn sync_billboards(&mut self) -> Result<(), SceneError> {
        if self.dirty_billboards {
            self.r_world.remove_removal_marked_billboards();

            for (key, billboard) in &self.billboards {
                let r_billboard = billboard.peer().r_billboard().clone();
                if !r_billboard.world_link().is_parent(&self.r_world) {
                    self.r_world.add_billboard(&r_billboard)?;
                    if !billboard.peer().queued_sync {
                        self.sync_billboards.push(key);
                    }
                }
            }
            for key in &self.sync_billboards {
                if let Some(billboard) = self.billboards.get_mut(*key) {
                    billboard.peer_mut().queued_sync = true;
                }
            }

            self.dirty_billboards = false;
        }

        let batch = std::mem::take(&mut self.sync_billboards);
        for key in batch {
            let Some(billboard) = self.billboards.get_mut(key) else {
                continue;
            };
            billboard.peer_mut().queued_sync = false;
            if billboard.sync_to_render() {
                billboard.peer_mut().queued_sync = true;
                self.sync_billboards.push(key);
            }
        }
        Ok(())
    }

    fn sync_cameras(&mut self) {
        for (_, camera) in &mut self.cameras {
            camera.sync_to_render();
        }
    }
}

/// Mutable component access guard
///
/// Queues the component for the next sync pass on drop if mutations left
/// dirty flags set.
pub struct ComponentMut<'a> {
    component: &'a mut Component,
    sync_list: &'a mut Vec<ComponentKey>,
    key: ComponentKey,
}

impl Deref for ComponentMut<'_> {
    type Target = Component;

    fn deref(&self) -> &Component {
        self.component
    }
}

impl DerefMut for ComponentMut<'_> {
    fn deref_mut(&mut self) -> &mut Component {
        self.component
    }
}

impl Drop for ComponentMut<'_> {
    fn drop(&mut self) {
        if self.component.requires_sync() && !self.component.peer().queued_sync {
            self.component.peer_mut().queued_sync = true;
            self.sync_list.push(self.key);
        }
    }
}

/// Mutable billboard access guard
///
/// Queues the billboard for the next sync pass on drop if mutations left
/// dirty flags set.
pub struct BillboardMut<'a> {
    billboard: &'a mut Billboard,
    sync_list: &'a mut Vec<BillboardKey>,
    key: BillboardKey,
}

impl Deref for BillboardMut<'_> {
    type Target = Billboard;

    fn deref(&self) -> &Billboard {
        self.billboard
    }
}

impl DerefMut for BillboardMut<'_> {
    fn deref_mut(&mut self) -> &mut Billboard {
        self.billboard
    }
}

impl Drop for BillboardMut<'_> {
    fn drop(&mut self) {
        if self.billboard.requires_sync() && !self.billboard.peer().queued_sync {
            self.billboard.peer_mut().queued_sync = true;
            self.sync_list.push(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::render::plan::RenderPlan;

    fn test_world() -> World {
        let ctx = RenderContext::new(SyncConfig::default());
        World::new(&ctx, DVec3::new(1000.0, 1000.0, 1000.0)).unwrap()
    }

    #[test]
    fn test_light_membership_sync() {
        let mut world = test_world();
        let ctx = world.context().clone();
        let key = world.add_light(Light::new(&ctx).unwrap());

        // before any sync the render container is empty
        assert_eq!(world.render_world().light_count(), 0);
        assert!(world.dirty_lights);

        world.sync_to_render().unwrap();

        assert_eq!(world.render_world().light_count(), 1);
        assert!(!world.dirty_lights);
        let light = world.light(key).unwrap();
        assert!(light.peer().is_clean());
        assert!(light
            .render_light()
            .world_link()
            .is_parent(world.render_world()));
    }

    #[test]
    fn test_removed_light_swept_on_next_sync() {
        let mut world = test_world();
        let ctx = world.context().clone();
        let key = world.add_light(Light::new(&ctx).unwrap());
        world.sync_to_render().unwrap();
        assert_eq!(world.render_world().light_count(), 1);

        let light = world.remove_light(key).unwrap();
        assert!(light.render_light().world_marked_remove());
        // still linked until the sweep
        assert_eq!(world.render_world().light_count(), 1);

        world.sync_to_render().unwrap();
        assert_eq!(world.render_world().light_count(), 0);
    }

    #[test]
    fn test_reentrant_sync_is_benign() {
        let mut world = test_world();
        let ctx = world.context().clone();
        world.add_light(Light::new(&ctx).unwrap());

        world.syncing = true;
        world.sync_to_render().unwrap();
        // nothing was processed, dirty state is intact
        assert!(world.dirty_lights);
        assert_eq!(world.render_world().light_count(), 0);

        world.syncing = false;
        world.sync_to_render().unwrap();
        assert_eq!(world.render_world().light_count(), 1);
    }

    #[test]
    fn test_component_guard_queues_sync() {
        let mut world = test_world();
        let ctx = world.context().clone();
        let key = world.add_component(Component::new(&ctx).unwrap());
        world.sync_to_render().unwrap();
        assert!(world.sync_components.is_empty());

        world
            .component_mut(key)
            .unwrap()
            .set_position(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(world.sync_components.len(), 1);

        // mutating again does not queue twice
        world
            .component_mut(key)
            .unwrap()
            .set_position(DVec3::new(4.0, 5.0, 6.0));
        assert_eq!(world.sync_components.len(), 1);

        world.sync_to_render().unwrap();
        assert!(world.sync_components.is_empty());
        let component = world.component(key).unwrap();
        assert!(component.peer().is_clean());
    }

    #[test]
    fn test_debug_drawer_two_phase_delete() {
        let mut world = test_world();
        let ctx = world.context().clone();
        let key = world.add_debug_drawer(DebugDrawer::new(&ctx).unwrap());
        world.sync_to_render().unwrap();
        assert_eq!(world.render_world().debug_drawer_count(), 1);

        let drawer = world.remove_debug_drawer(key).unwrap();
        let r_drawer = drawer.render_drawer().clone();
        assert!(r_drawer.world_marked_remove());
        assert_eq!(
            world.render_world().debug_drawer_count(),
            1,
            "unlink deferred to the sweep"
        );

        world.render_world().remove_removal_marked_debug_drawers();
        assert_eq!(world.render_world().debug_drawer_count(), 0);
        assert!(!r_drawer.world_marked_remove());
        assert!(r_drawer.parent_world().is_none());
    }

    #[test]
    fn test_full_frame_cycle() {
        let mut world = test_world();
        let ctx = world.context().clone();

        world.add_light(Light::new(&ctx).unwrap());
        world.add_component(Component::new(&ctx).unwrap());
        let camera_key = world.add_camera(Camera::new(&ctx).unwrap());

        world.update(0.016);
        world.sync_to_render().unwrap();

        let r_world = world.render_world().clone();
        let plan = RenderPlan::default();
        r_world.early_prepare_for_render(&plan);
        r_world.prepare_for_render(&plan);
        ctx.delayed_operations().process_free_operations();

        // the component resolved an environment map (the sky fallback)
        let component_key = world.components.keys().next().unwrap();
        let component = world.component(component_key).unwrap();
        assert!(component.render_component().render_env_map().is_some());

        // camera adaption snapped on first prepare
        let camera = world.camera(camera_key).unwrap();
        assert!(camera.render_camera().adapted_intensity() > 0.0);
    }
}
