//! Logic-thread side of the scene: resources and their render peers
//!
//! Resources are the gameplay-owned scene objects. Every resource carries a
//! peer: a shadow object translating mutations into dirty flags and, during
//! the once-per-frame sync pass, pushing the accumulated state into the
//! render mirror. Mutators never perform cross-thread work themselves.

pub mod billboard;
pub mod camera;
pub mod component;
pub mod debug_drawer;
pub mod env_map_probe;
pub mod height_terrain;
pub mod light;
pub mod lumimeter;
pub mod particle_emitter;
pub mod prop_field;
pub mod sky;
pub mod world;

pub use billboard::Billboard;
pub use camera::Camera;
pub use component::Component;
pub use debug_drawer::{DebugDrawer, DebugDrawerShape};
pub use env_map_probe::EnvMapProbe;
pub use height_terrain::{HeightTerrain, HeightTerrainSector};
pub use light::Light;
pub use lumimeter::Lumimeter;
pub use particle_emitter::ParticleEmitterInstance;
pub use prop_field::{PropField, PropFieldListener, PropFieldType, PropInstance};
pub use sky::{SkyInstance, SkyLayerDefinition};
pub use world::{
    BillboardKey, BillboardMut, CameraKey, ComponentKey, ComponentMut, DebugDrawerKey,
    EnvMapProbeKey, LightKey, LumimeterKey, ParticleEmitterKey, PropFieldKey, SkyKey, World,
};
