// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shadow casters, the three map kinds and the renderers that request them.

mod common;

use std::sync::Arc;

use common::{add, camera, cube, light, Harness};
use ember_core::math::{Mat4, Vec3};
use ember_core::renderer::{
    BaseShaderFlags, BaseShaderType, BasicMaterial, BlendMode, Camera, ConstantSlot,
    DirectionalLightEntry, GlobalShaderFlags, LightShadowFlags, MaterialShaderId, PointLightEntry,
    RenderError, RendererOptions,
};
use ember_infra::GpuCommand;
use ember_lanes::render_lane::shadow::{CubeShadowRenderer, SingleShadowRenderer};
use ember_lanes::render_lane::{
    ForwardRenderer, FrameRenderer, LightEntry, MeshBuffers, MeshProxy, SceneList,
    ShaderProgramCache,
};

const LEAVES: MaterialShaderId = MaterialShaderId(7);

/// An orthographic light looking straight down on the origin.
fn overhead_camera() -> Camera {
    Camera::orthographic(
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::ZERO,
        Vec3::Z,
        10.0,
        10.0,
        0.1,
        20.0,
    )
}

fn masked_cube(h: &mut Harness, position: Vec3) -> MeshProxy {
    let mesh = MeshBuffers::unit_cube(&mut h.gpu).expect("cube buffers");
    let leaves = BasicMaterial::new("leaves", LEAVES).with_blend_mode(BlendMode::Masked);
    MeshProxy::new(mesh, Arc::new(leaves), Mat4::from_translation(position))
}

fn sun() -> LightEntry {
    LightEntry::Directional(DirectionalLightEntry::new(
        Vec3::new(0.3, -1.0, -0.2),
        Vec3::ONE,
        1.0,
    ))
}

fn programs(h: &Harness) -> Arc<ShaderProgramCache> {
    Arc::new(ShaderProgramCache::new(h.library.clone()))
}

fn depth_clears(h: &Harness) -> usize {
    h.gpu
        .device()
        .commands()
        .iter()
        .filter(|c| matches!(c, GpuCommand::ClearDepthStencil(_)))
        .count()
}

/// Depth-only draws whose program matches `flags` and `material`.
fn depth_draws(h: &Harness, flags: BaseShaderFlags, material: Option<MaterialShaderId>) -> usize {
    h.library
        .programs_for(BaseShaderType::DepthOnly)
        .into_iter()
        .filter(|program| {
            h.library.key_of(*program).is_some_and(|key| {
                key.base_shader.flags == flags && key.material_shader == material
            })
        })
        .map(|program| h.gpu.device().draws_with_program(program))
        .sum()
}

#[test]
fn masked_casters_clip_with_their_material() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::new(2.0, 0.0, 0.0)));
    let leaves = masked_cube(&mut h, Vec3::ZERO);
    add(&mut scene, leaves);

    let options = RendererOptions::default();
    let mut shadows = SingleShadowRenderer::new(&options, programs(&h), GlobalShaderFlags::empty());
    let job = shadows.prepare(&mut h.gpu, overhead_camera()).expect("shadow map");
    h.gpu.device().reset_log();
    let drawn = shadows.render_job(&mut h.gpu, &scene, &job);

    assert_eq!(drawn.draws, 2);
    assert_eq!(drawn.skipped, 0);
    assert_eq!(depth_draws(&h, BaseShaderFlags::ALPHA_CLIP, Some(LEAVES)), 1);
    assert_eq!(depth_draws(&h, BaseShaderFlags::empty(), None), 1);
    let material_writes = h
        .gpu
        .device()
        .commands()
        .iter()
        .filter(|c| matches!(c, GpuCommand::WriteConstants { slot: ConstantSlot::Material, .. }))
        .count();
    assert_eq!(material_writes, 1);
}

#[test]
fn empty_caster_queue_stops_after_the_clear() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO));

    // Looks up, away from the only caster.
    let away = Camera::orthographic(
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::new(0.0, 20.0, 0.0),
        Vec3::Z,
        4.0,
        4.0,
        0.1,
        5.0,
    );
    let options = RendererOptions::default();
    let mut shadows = SingleShadowRenderer::new(&options, programs(&h), GlobalShaderFlags::empty());
    let job = shadows.prepare(&mut h.gpu, away).expect("shadow map");
    h.gpu.device().reset_log();
    let drawn = shadows.render_job(&mut h.gpu, &scene, &job);

    assert_eq!(drawn.draws, 0);
    assert_eq!(depth_clears(&h), 1);
    assert!(!h.gpu.device().commands().iter().any(GpuCommand::is_draw));
}

#[test]
fn requested_single_shadow_is_drawn_with_the_frame() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO));
    scene.add(light(sun()));
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    renderer.initialize(&mut h.gpu).expect("initialize");

    let frame = |h: &mut Harness, renderer: &mut ForwardRenderer| {
        h.gpu.device().reset_log();
        renderer
            .draw_world(&mut h.gpu, &scene, &camera(), &h.output)
            .expect("frame");
        renderer.on_frame_complete(&mut h.gpu);
        (depth_clears(h), h.draws_of(BaseShaderType::DepthOnly))
    };

    frame(&mut h, &mut renderer);
    let (plain_clears, plain_depth_draws) = frame(&mut h, &mut renderer);
    assert_eq!(renderer.render_stats().spot_shadow_maps, 0);

    renderer
        .world_renderer_mut()
        .request_single_shadow(overhead_camera());
    let (clears, depth_draws) = frame(&mut h, &mut renderer);
    assert_eq!(renderer.render_stats().spot_shadow_maps, 1);
    assert_eq!(clears, plain_clears + 1);
    assert_eq!(depth_draws, plain_depth_draws + 1);

    // Requests last one frame.
    frame(&mut h, &mut renderer);
    assert_eq!(renderer.render_stats().spot_shadow_maps, 0);
}

#[test]
fn shadowed_point_light_gets_a_cube_map() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO));
    scene.add(light(LightEntry::Point(
        PointLightEntry::new(Vec3::new(0.0, 2.0, 0.0), 6.0, Vec3::ONE, 2.0)
            .with_shadows(LightShadowFlags::CAST_SHADOWS),
    )));
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    renderer.initialize(&mut h.gpu).expect("initialize");
    renderer
        .draw_world(&mut h.gpu, &scene, &camera(), &h.output)
        .expect("frame");

    let stats = renderer.render_stats();
    assert_eq!(stats.point_shadow_maps, 1);
    assert_eq!(stats.directional_shadow_maps, 0);
}

#[test]
fn cube_map_clears_every_face() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO));

    let options = RendererOptions::default();
    let mut shadows = CubeShadowRenderer::new(&options, programs(&h), GlobalShaderFlags::empty());
    let mut point = PointLightEntry::new(Vec3::new(0.0, 2.0, 0.0), 6.0, Vec3::ONE, 2.0)
        .with_shadows(LightShadowFlags::CAST_SHADOWS);
    let job = shadows.prepare(&mut h.gpu, &mut point).expect("cube map");
    assert_eq!(job.passes.len(), 6);
    assert_eq!(point.shadow_map_index, job.map_index as i32);

    h.gpu.device().reset_log();
    let drawn = shadows.render_job(&mut h.gpu, &scene, &job);
    assert_eq!(depth_clears(&h), 6);
    // At least the face looking down sees the cube.
    assert!(drawn.draws >= 1);
}

#[test]
fn invalid_options_fail_initialization_instead_of_the_frame() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO));
    scene.add(light(LightEntry::Directional(
        DirectionalLightEntry::new(Vec3::NEG_Y, Vec3::ONE, 1.0)
            .with_shadows(LightShadowFlags::CAST_SHADOWS),
    )));
    let options = RendererOptions {
        cascade_count: 0,
        ..RendererOptions::default()
    };
    let mut renderer = ForwardRenderer::new(options, h.library.clone());

    let result = renderer.initialize(&mut h.gpu);
    assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    let frame = renderer.draw_world(&mut h.gpu, &scene, &camera(), &h.output);
    assert!(matches!(frame, Err(RenderError::NotInitialized)));
}
