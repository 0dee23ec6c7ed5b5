//! # Scene Sync
//!
//! A dual-thread scene synchronization core for game engines.
//!
//! Two parallel object graphs are kept consistent through an explicit,
//! dirty-flag-driven protocol:
//!
//! - **Resources and Peers** (logic thread): gameplay-owned scene objects
//!   ([`resources::World`], [`resources::Camera`], [`resources::Light`], ...)
//!   each carry a peer that accumulates dirty flags as the object mutates.
//! - **R-objects** (render thread): reference-counted mirrors
//!   ([`render::RWorld`], [`render::RCamera`], ...) holding only resolved,
//!   render-ready data.
//!
//! Once per frame the logic thread calls [`resources::World::sync_to_render`],
//! which pushes every dirty aspect into the render mirror and reconciles world
//! membership. The render thread then calls
//! [`render::RWorld::early_prepare_for_render`] and
//! [`render::RWorld::prepare_for_render`] to finish resolving cross-references
//! before drawing. The two windows never overlap in time; the sync pass itself
//! is the atomicity boundary.
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_sync::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let ctx = RenderContext::new(SyncConfig::default());
//!     let mut world = World::new(&ctx, DVec3::new(1000.0, 1000.0, 1000.0))?;
//!
//!     let key = world.add_light(Light::new(&ctx)?);
//!     world.light_mut(key).unwrap().set_intensity(20.0);
//!
//!     // logic thread, once per frame:
//!     world.sync_to_render()?;
//!
//!     // render thread, once per frame:
//!     let rworld = world.render_world().clone();
//!     let plan = RenderPlan::default();
//!     rworld.early_prepare_for_render(&plan);
//!     rworld.prepare_for_render(&plan);
//!     ctx.delayed_operations().process_free_operations();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod resources;
pub mod scene;
pub mod spatial;

mod context;
mod error;

pub use context::RenderContext;
pub use error::SceneError;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::SyncConfig,
        context::RenderContext,
        error::SceneError,
        foundation::math::{Color, DMat4, DQuat, DVec3, Mat4, Vec3},
        render::{RenderPlan, RWorld},
        resources::{
            Billboard, Camera, Component, DebugDrawer, EnvMapProbe, Light, Lumimeter,
            ParticleEmitterInstance, PropField, SkyInstance, World,
        },
        scene::{DAabb, LayerMask},
    };
}
