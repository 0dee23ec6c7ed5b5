//! Headless stress harness for the scene synchronization core
//!
//! Runs the real two-thread frame loop without a GPU: the logic thread
//! mutates a synthetic scene and syncs once per frame, the render thread
//! runs the prepare passes and drains the delayed operations queue. The
//! rendezvous channels enforce the temporal separation the engine
//! guarantees: the render thread touches the mirror graph only between one
//! sync pass and the next.

use std::sync::mpsc;
use std::thread;

use scene_sync::prelude::*;
use scene_sync::resources::{PropFieldListener, PropFieldType, PropInstance, SkyLayerDefinition};

const FRAMES: u32 = 600;
const FRAME_TIME: f32 = 1.0 / 60.0;
const LIGHT_GRID: i32 = 4;
const COMPONENT_GRID: i32 = 8;

struct GrassListener;

impl PropFieldListener for GrassListener {
    fn create_instances(&self, types: &mut Vec<PropFieldType>, density: f32) {
        log::info!("prop field entered range, density {density:.2}");
        let instances = (0..512)
            .map(|i| PropInstance {
                position: DVec3::new(f64::from(i % 32) * 2.0, 0.0, f64::from(i / 32) * 2.0),
                rotation: [0.0, (i as f32) * 0.37, 0.0],
                scaling: 1.0,
                bend_state: (i % 16) as u32,
            })
            .collect();
        types.push(PropFieldType {
            density,
            instances,
            bend_states: vec![0.0; 16],
        });
    }
}

fn build_scene(ctx: &RenderContext, world: &mut World) -> Result<CameraAndKeys, SceneError> {
    let mut sky = scene_sync::resources::SkyInstance::new(ctx)?;
    sky.set_layers(vec![SkyLayerDefinition {
        color: Color::new(0.6, 0.7, 1.0, 1.0),
        intensity: 8.0,
        ambient_intensity: 1.0,
        controller: Some(0),
    }]);
    sky.set_controller_count(1);
    sky.set_controller(0, 1.0);
    let sky_key = world.add_sky(sky);

    for x in 0..LIGHT_GRID {
        for z in 0..LIGHT_GRID {
            let mut light = Light::new(ctx)?;
            light.set_position(DVec3::new(
                f64::from(x) * 50.0 - 75.0,
                10.0,
                f64::from(z) * 50.0 - 75.0,
            ));
            light.set_range(40.0);
            world.add_light(light);
        }
    }

    let mut component_keys = Vec::new();
    for x in 0..COMPONENT_GRID {
        for z in 0..COMPONENT_GRID {
            let mut component = Component::new(ctx)?;
            component.set_position(DVec3::new(
                f64::from(x) * 20.0 - 70.0,
                0.0,
                f64::from(z) * 20.0 - 70.0,
            ));
            component_keys.push(world.add_component(component));
        }
    }

    let mut probe = EnvMapProbe::new(ctx)?;
    probe.set_position(DVec3::new(0.0, 5.0, 0.0));
    probe.set_influence_extents(DVec3::new(100.0, 50.0, 100.0));
    world.add_env_map_probe(probe);

    let mut lumimeter = Lumimeter::new(ctx)?;
    lumimeter.set_position(DVec3::new(0.0, 2.0, 0.0));
    let lumimeter_key = world.add_lumimeter(lumimeter);

    let mut field = PropField::new(ctx)?;
    field.set_position(DVec3::new(0.0, 0.0, 100.0));
    field.set_listener(Box::new(GrassListener));
    world.add_prop_field(field);

    let mut drawer = DebugDrawer::new(ctx)?;
    drawer.add_shape(scene_sync::resources::DebugDrawerShape {
        edge_color: Color::new(1.0, 0.2, 0.2, 1.0),
        fill_color: Color::new(1.0, 0.2, 0.2, 0.1),
        volumes: vec![DAabb::from_center_extents(
            DVec3::zeros(),
            DVec3::new(5.0, 5.0, 5.0),
        )],
    });
    world.add_debug_drawer(drawer);

    let camera_key = world.add_camera(Camera::new(ctx)?);

    Ok(CameraAndKeys {
        camera_key,
        sky_key,
        lumimeter_key,
        component_keys,
    })
}

struct CameraAndKeys {
    camera_key: scene_sync::resources::CameraKey,
    sky_key: scene_sync::resources::SkyKey,
    lumimeter_key: scene_sync::resources::LumimeterKey,
    component_keys: Vec<scene_sync::resources::ComponentKey>,
}

fn main() -> Result<(), SceneError> {
    scene_sync::foundation::logging::init();

    let ctx = RenderContext::new(SyncConfig::default());
    let mut world = World::new(&ctx, DVec3::new(2000.0, 500.0, 2000.0))?;
    let keys = build_scene(&ctx, &mut world)?;

    // render thread: waits for the frame fence, prepares, signals back
    let render_world = world.render_world().clone();
    let render_ctx = ctx.clone();
    let (frame_tx, frame_rx) = mpsc::sync_channel::<RenderPlan>(0);
    let (done_tx, done_rx) = mpsc::sync_channel::<()>(0);

    let render_thread = thread::spawn(move || {
        while let Ok(plan) = frame_rx.recv() {
            render_world.early_prepare_for_render(&plan);
            render_world.prepare_for_render(&plan);
            render_ctx.delayed_operations().process_free_operations();
            if done_tx.send(()).is_err() {
                break;
            }
        }
    });

    for frame in 0..FRAMES {
        let time = f64::from(frame) * f64::from(FRAME_TIME);

        // orbit the camera through the scene and out toward the prop field
        let camera_position = DVec3::new(
            (time * 0.4).cos() * 60.0,
            8.0,
            (time * 0.4).sin() * 60.0 + time * 2.0,
        );
        if let Some(camera) = world.camera_mut(keys.camera_key) {
            camera.set_position(camera_position);
        }

        // day-night controller drift
        if let Some(sky) = world.sky_mut(keys.sky_key) {
            sky.set_controller(0, 0.5 + 0.5 * (time * 0.1).sin() as f32);
        }

        // a quarter of the components wiggle every frame
        for (index, key) in keys.component_keys.iter().enumerate() {
            if index % 4 == frame as usize % 4 {
                if let Some(mut component) = world.component_mut(*key) {
                    let base = component.position();
                    component.set_position(DVec3::new(
                        base.x,
                        (time * 2.0 + index as f64).sin().abs() * 2.0,
                        base.z,
                    ));
                }
            }
        }

        world.update(FRAME_TIME);
        world.sync_to_render()?;

        let plan = RenderPlan {
            camera_position,
            camera_view: world
                .camera(keys.camera_key)
                .map_or_else(DMat4::identity, Camera::view_matrix),
            ..RenderPlan::default()
        };

        // fence: the render thread runs strictly between two sync passes
        frame_tx
            .send(plan)
            .expect("render thread terminated early");
        done_rx.recv().expect("render thread terminated early");

        if frame % 120 == 0 {
            let luminance = world
                .lumimeter(keys.lumimeter_key)
                .map_or(0.0, Lumimeter::measured_luminance);
            log::info!(
                "frame {frame}: {} spatial entries, lumimeter {luminance:.3}",
                world.render_world().spatial_entry_count()
            );
        }
    }

    drop(frame_tx);
    render_thread.join().expect("render thread panicked");

    log::info!(
        "done: {} components, {} lights, {} env maps",
        world.render_world().component_count(),
        world.render_world().light_count(),
        world.render_world().env_map_count()
    );
    Ok(())
}
