//! Integration tests for the sync protocol through the public API

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use scene_sync::prelude::*;
use scene_sync::resources::SkyLayerDefinition;

fn test_context() -> RenderContext {
    RenderContext::new(SyncConfig::default())
}

fn test_world(ctx: &RenderContext) -> World {
    World::new(ctx, DVec3::new(1000.0, 1000.0, 1000.0)).unwrap()
}

#[test]
fn world_light_scenario() {
    let ctx = test_context();
    let mut world = test_world(&ctx);
    let key = world.add_light(Light::new(&ctx).unwrap());

    // before any sync the render container is empty
    assert_eq!(world.render_world().light_count(), 0);

    world.sync_to_render().unwrap();

    // one entry, bound to the light's render mirror
    assert_eq!(world.render_world().light_count(), 1);
    let light = world.light(key).unwrap();
    assert!(Arc::ptr_eq(
        &light.render_light().parent_world().unwrap(),
        world.render_world()
    ));
}

#[test]
fn camera_position_last_write_wins() {
    let ctx = test_context();
    let mut world = test_world(&ctx);
    let key = world.add_camera(Camera::new(&ctx).unwrap());

    {
        let camera = world.camera_mut(key).unwrap();
        camera.set_position(DVec3::new(0.0, 0.0, 0.0));
        camera.set_position(DVec3::new(5.0, 0.0, 0.0));
    }
    world.sync_to_render().unwrap();

    let camera = world.camera(key).unwrap();
    assert_eq!(
        camera.render_camera().position(),
        DVec3::new(5.0, 0.0, 0.0),
        "no averaging, exactly the last written value"
    );

    // the derived matrices followed the move
    let view = camera.render_camera().view_matrix();
    let expected = camera.view_matrix();
    assert_eq!(view, expected);
}

#[test]
fn debug_drawer_removal_is_two_phase() {
    let ctx = test_context();
    let mut world = test_world(&ctx);
    let keep_key = world.add_debug_drawer(DebugDrawer::new(&ctx).unwrap());
    let remove_key = world.add_debug_drawer(DebugDrawer::new(&ctx).unwrap());
    world.sync_to_render().unwrap();
    assert_eq!(world.render_world().debug_drawer_count(), 2);

    let removed = world.remove_debug_drawer(remove_key).unwrap();
    let r_removed = removed.render_drawer().clone();

    // destructor-side: marked, not unlinked
    assert!(r_removed.world_marked_remove());
    assert_eq!(world.render_world().debug_drawer_count(), 2);

    // the sweep removes exactly the marked entry
    world.render_world().remove_removal_marked_debug_drawers();
    assert_eq!(world.render_world().debug_drawer_count(), 1);
    assert!(r_removed.parent_world().is_none());
    assert!(!r_removed.world_marked_remove());

    let keep = world.debug_drawer(keep_key).unwrap();
    assert!(keep.render_drawer().parent_world().is_some());
}

#[test]
fn membership_is_single_world() {
    let ctx = test_context();
    let mut world_a = test_world(&ctx);
    let mut world_b = test_world(&ctx);

    let key = world_a.add_light(Light::new(&ctx).unwrap());
    world_a.sync_to_render().unwrap();
    assert_eq!(world_a.render_world().light_count(), 1);

    // move the resource: remove from A, add to B, sync both
    let light = world_a.remove_light(key).unwrap();
    world_b.add_light(light);
    world_b.sync_to_render().unwrap();

    // B's sync migrated the mirror out of A's container immediately
    assert_eq!(world_a.render_world().light_count(), 0);
    assert_eq!(world_b.render_world().light_count(), 1);

    world_a.sync_to_render().unwrap();
    assert_eq!(world_a.render_world().light_count(), 0);
}

#[test]
fn dropped_world_defers_camera_teardown() {
    let ctx = test_context();
    let mut world = test_world(&ctx);
    let key = world.add_camera(Camera::new(&ctx).unwrap());
    world.sync_to_render().unwrap();

    let r_camera = world.camera(key).unwrap().render_camera().clone();
    let weak = Arc::downgrade(&r_camera);
    drop(r_camera);

    drop(world);

    // the camera survives its owner inside the delayed queue
    assert!(weak.upgrade().is_some());
    assert!(ctx.delayed_operations().pending_release_count() > 0);

    ctx.delayed_operations().process_free_operations();
    assert!(weak.upgrade().is_none(), "freed at the frame boundary");
    assert_eq!(ctx.delayed_operations().pending_release_count(), 0);
}

#[test]
fn prepare_resolves_environment_maps() {
    let ctx = test_context();
    let mut world = test_world(&ctx);

    let mut sky = SkyInstance::new(&ctx).unwrap();
    sky.set_layers(vec![SkyLayerDefinition {
        color: Color::new(1.0, 1.0, 1.0, 1.0),
        intensity: 10.0,
        ambient_intensity: 1.0,
        controller: None,
    }]);
    world.add_sky(sky);

    let component_key = world.add_component(Component::new(&ctx).unwrap());
    world.sync_to_render().unwrap();

    let plan = RenderPlan::default();
    world.render_world().early_prepare_for_render(&plan);
    world.render_world().prepare_for_render(&plan);

    // the only environment map is the sky fallback; the component uses it
    let env_map = world
        .component(component_key)
        .unwrap()
        .render_component()
        .render_env_map()
        .expect("component resolved an environment map");
    assert!(env_map.sky_only());

    // and the sky light reached the world's resolved intensity
    assert!(world.render_world().sky_light_intensity() >= 10.0);
}

#[test]
fn probe_env_map_wins_over_sky_fallback() {
    let ctx = test_context();
    let mut world = test_world(&ctx);

    let mut probe = EnvMapProbe::new(&ctx).unwrap();
    probe.set_position(DVec3::new(0.0, 0.0, 0.0));
    world.add_env_map_probe(probe);

    let mut component = Component::new(&ctx).unwrap();
    component.set_position(DVec3::new(2.0, 0.0, 0.0));
    let component_key = world.add_component(component);

    world.sync_to_render().unwrap();
    let plan = RenderPlan::default();
    world.render_world().early_prepare_for_render(&plan);
    world.render_world().prepare_for_render(&plan);

    let env_map = world
        .component(component_key)
        .unwrap()
        .render_component()
        .render_env_map()
        .expect("resolved");
    assert!(!env_map.sky_only(), "probe map beats the sky fallback");
}

#[test]
fn two_thread_frame_cycle() {
    let ctx = test_context();
    let mut world = test_world(&ctx);

    let camera_key = world.add_camera(Camera::new(&ctx).unwrap());
    for i in 0..16 {
        let mut light = Light::new(&ctx).unwrap();
        light.set_position(DVec3::new(f64::from(i) * 10.0, 5.0, 0.0));
        world.add_light(light);
    }
    let mut lumimeter = Lumimeter::new(&ctx).unwrap();
    lumimeter.set_position(DVec3::new(0.0, 5.0, 0.0));
    let lumimeter_key = world.add_lumimeter(lumimeter);

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

    for frame in 0..30 {
        if let Some(camera) = world.camera_mut(camera_key) {
            camera.set_position(DVec3::new(f64::from(frame), 5.0, 0.0));
        }
        world.update(1.0 / 60.0);
        world.sync_to_render().unwrap();

        frame_tx.send(RenderPlan::default()).unwrap();
        done_rx.recv().unwrap();
    }

    drop(frame_tx);
    render_thread.join().unwrap();

    // the lumimeter measured the nearby lights on the render thread
    assert!(world.lumimeter(lumimeter_key).unwrap().measured_luminance() > 0.0);
    assert_eq!(world.render_world().light_count(), 16);
}
