//! Render-thread side of the scene: reference-counted mirror objects
//!
//! Every logic-side resource has a render mirror (`R`-prefixed) holding only
//! resolved, render-ready data. Mirrors are written by their peer during the
//! once-per-frame sync pass and read by the render thread during the prepare
//! passes; the two windows never overlap in time. Reference counts are the
//! only state touched concurrently, which `Arc` handles.

mod link;

pub(crate) use link::WorldLink;

pub mod billboard;
pub mod camera;
pub mod component;
pub mod debug_drawer;
pub mod delayed;
pub mod env_map;
pub mod env_map_probe;
pub mod height_terrain;
pub mod light;
pub mod lumimeter;
pub mod particle_emitter;
pub mod plan;
pub mod prop_field;
pub mod sky;
pub mod world;

pub use billboard::RBillboard;
pub use camera::RCamera;
pub use component::RComponent;
pub use debug_drawer::RDebugDrawer;
pub use delayed::DelayedOperations;
pub use env_map::REnvMap;
pub use env_map_probe::REnvMapProbe;
pub use height_terrain::RHeightTerrain;
pub use light::RLight;
pub use lumimeter::RLumimeter;
pub use particle_emitter::RParticleEmitterInstance;
pub use plan::RenderPlan;
pub use prop_field::RPropField;
pub use sky::RSkyInstance;
pub use world::RWorld;
