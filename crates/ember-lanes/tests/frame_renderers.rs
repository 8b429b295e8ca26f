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

//! Whole frames through each concrete renderer on the headless backend.

mod common;

use std::sync::Arc;

use common::{add, camera, cube, light, Harness};
use ember_core::math::{Mat4, Vec3};
use ember_core::renderer::{
    BaseShaderFlags, BaseShaderType, BasicMaterial, BlendMode, DepthStencilState,
    DirectionalLightEntry, LightShadowFlags, MaterialShaderId, PointLightEntry, RenderError,
    RendererOptions, ShaderLibrary,
};
use ember_infra::GpuCommand;
use ember_lanes::render_lane::{
    ComposePath, DeferredRenderer, ForwardRenderer, FrameRenderer, LightEntry, MeshBuffers,
    MeshProxy, MobileRenderer, SceneList, SingleShaderRenderer,
};

fn sun() -> LightEntry {
    LightEntry::Directional(DirectionalLightEntry::new(
        Vec3::new(0.3, -1.0, -0.2),
        Vec3::ONE,
        1.0,
    ))
}

fn shadowed_sun() -> LightEntry {
    LightEntry::Directional(
        DirectionalLightEntry::new(Vec3::new(0.3, -1.0, -0.2), Vec3::ONE, 1.0)
            .with_shadows(LightShadowFlags::CAST_SHADOWS),
    )
}

fn point(x: f32) -> LightEntry {
    LightEntry::Point(PointLightEntry::new(Vec3::new(x, 1.0, 0.0), 4.0, Vec3::ONE, 2.0))
}

fn lit_cube_scene(h: &mut Harness, sun: LightEntry) -> SceneList {
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO));
    scene.add(light(sun));
    scene
}

fn render_one(h: &mut Harness, renderer: &mut dyn FrameRenderer, scene: &SceneList) {
    renderer.initialize(&mut h.gpu).expect("initialize");
    renderer
        .draw_world(&mut h.gpu, scene, &camera(), &h.output)
        .expect("frame");
    renderer.on_frame_complete(&mut h.gpu);
}

#[test]
fn forward_frame_with_one_cube_and_one_sun() {
    let mut h = Harness::new();
    let scene = lit_cube_scene(&mut h, sun());
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    let queue = renderer.world_renderer().queue();
    assert_eq!(queue.opaque_entries().len(), 1);
    let stats = renderer.render_stats();
    assert_eq!(stats.opaque_drawn, 1);
    assert_eq!(stats.shadow_maps_drawn(), 0);
    assert_eq!(stats.directional_shadow_maps, 0);
    assert_eq!(h.draws_of(BaseShaderType::ForwardBase), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardLight), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardLightList), 0);
    assert_eq!(renderer.compositing().last_path(), Some(ComposePath::Bloom));
}

#[test]
fn forward_batches_unshadowed_point_lights() {
    let mut h = Harness::new();
    let mut scene = lit_cube_scene(&mut h, sun());
    scene.add(light(point(1.0)));
    scene.add(light(point(-1.0)));
    scene.add(light(point(0.5)));
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    // The sun alone, then the three points in one list.
    assert_eq!(h.draws_of(BaseShaderType::ForwardLight), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardLightList), 1);
    assert_eq!(renderer.render_stats().lights_drawn, 4);
}

#[test]
fn forward_lights_translucent_objects_without_depth_equal() {
    let mut h = Harness::new();
    let mut scene = SceneList::new();
    let mesh = MeshBuffers::unit_cube(&mut h.gpu).expect("cube buffers");
    let glass = BasicMaterial::new("glass", MaterialShaderId(3)).with_blend_mode(BlendMode::Translucent);
    add(&mut scene, MeshProxy::new(mesh, Arc::new(glass), Mat4::IDENTITY));
    scene.add(light(sun()));
    scene.add(light(LightEntry::Directional(DirectionalLightEntry::new(
        Vec3::new(-0.5, -1.0, 0.0),
        Vec3::ONE,
        0.5,
    ))));
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    let stats = renderer.render_stats();
    assert_eq!(stats.translucent_drawn, 1);
    assert_eq!(stats.lights_drawn, 2);
    assert_eq!(h.draws_of(BaseShaderType::ForwardBase), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardLight), 2);
    assert_eq!(h.draws_of(BaseShaderType::Unlit), 0);

    // Every light pass over the glass tests depth read-only.
    let light_programs = h.library.programs_for(BaseShaderType::ForwardLight);
    let mut depth = DepthStencilState::Default;
    for command in h.gpu.device().commands() {
        match command {
            GpuCommand::SetDepthStencilState(state) => depth = state,
            ref draw if draw.draw_program().is_some_and(|p| light_programs.contains(&p)) => {
                assert_eq!(depth, DepthStencilState::ReadOnly);
            }
            _ => {}
        }
    }
}

#[test]
fn draw_before_initialize_is_rejected() {
    let mut h = Harness::new();
    let scene = lit_cube_scene(&mut h, sun());
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    let result = renderer.draw_world(&mut h.gpu, &scene, &camera(), &h.output);
    assert!(matches!(result, Err(RenderError::NotInitialized)));
}

#[test]
fn missing_required_program_fails_initialization() {
    let mut h = Harness::new();
    h.library.deny_base_shader(BaseShaderType::DeferredAmbient);
    let mut renderer = DeferredRenderer::new(RendererOptions::default(), h.library.clone());
    let result = renderer.initialize(&mut h.gpu);
    assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    assert!(!renderer.world_renderer().is_initialized());
}

#[test]
fn shadowed_sun_draws_a_cascaded_map() {
    let mut h = Harness::new();
    let scene = lit_cube_scene(&mut h, shadowed_sun());
    let mut renderer = ForwardRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    assert_eq!(renderer.render_stats().directional_shadow_maps, 1);
    let shadowed_light_draws = h
        .library
        .programs_for(BaseShaderType::ForwardLight)
        .into_iter()
        .filter(|program| {
            h.library.key_of(*program).is_some_and(|key| {
                key.base_shader
                    .flags
                    .contains(BaseShaderFlags::SHADOWED | BaseShaderFlags::CASCADED)
            })
        })
        .map(|program| h.gpu.device().draws_with_program(program))
        .sum::<usize>();
    assert_eq!(shadowed_light_draws, 1);
}

#[test]
fn threaded_frame_executes_shadows_before_the_scene() {
    let mut h = Harness::new();
    let scene = lit_cube_scene(&mut h, shadowed_sun());
    let options = RendererOptions {
        multithreaded_rendering: true,
        ..RendererOptions::default()
    };
    let mut renderer = ForwardRenderer::new(options, h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    let device = h.gpu.device();
    assert_eq!(device.stats().command_lists_executed, 2);
    let commands = device.commands();
    let executes: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, command)| matches!(command, GpuCommand::ExecuteCommandList(_)))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(executes.len(), 2);

    let base_programs = h.library.programs_for(BaseShaderType::ForwardBase);
    let first_base_draw = commands
        .iter()
        .position(|command| {
            command
                .draw_program()
                .is_some_and(|program| base_programs.contains(&program))
        })
        .expect("base pass drawn");
    assert!(first_base_draw > executes[1]);
    assert_eq!(renderer.render_stats().opaque_drawn, 1);
}

#[test]
fn threaded_option_without_command_lists_renders_inline() {
    let mut h = Harness::new();
    h.gpu.device().set_supports_command_lists(false);
    let scene = lit_cube_scene(&mut h, shadowed_sun());
    let options = RendererOptions {
        multithreaded_rendering: true,
        ..RendererOptions::default()
    };
    let mut renderer = ForwardRenderer::new(options, h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    assert_eq!(h.gpu.device().stats().command_lists_executed, 0);
    assert_eq!(renderer.render_stats().directional_shadow_maps, 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardBase), 1);
}

#[test]
fn deferred_frame_runs_every_lighting_stage() {
    let mut h = Harness::new();
    let mut scene = lit_cube_scene(&mut h, sun());
    scene.add(light(point(1.0)));
    scene.add(light(point(-1.0)));
    let mut renderer = DeferredRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    assert_eq!(h.draws_of(BaseShaderType::GBuffer), 1);
    assert_eq!(h.draws_of(BaseShaderType::DeferredAmbient), 1);
    assert_eq!(h.draws_of(BaseShaderType::DeferredDirectionalLight), 1);
    assert_eq!(h.draws_of(BaseShaderType::DeferredPointLightList), 1);
    assert_eq!(h.draws_of(BaseShaderType::Ssao), 1);
    assert_eq!(h.draws_of(BaseShaderType::SsaoUpsample), 1);
    assert_eq!(h.draws_of(BaseShaderType::ToneMap), 1);
    assert_eq!(renderer.render_stats().lights_drawn, 3);

    renderer.shutdown(&mut h.gpu);
    assert_eq!(renderer.world_renderer().pool().len(), 0);
}

#[test]
fn deferred_single_point_light_uses_a_volume() {
    let mut h = Harness::new();
    let mut scene = lit_cube_scene(&mut h, sun());
    scene.add(light(point(1.0)));
    let mut renderer = DeferredRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    assert_eq!(h.draws_of(BaseShaderType::DeferredPointLightList), 0);
    assert_eq!(h.draws_of(BaseShaderType::DeferredPointLight), 1);
}

#[test]
fn mobile_frame_folds_the_sun_into_the_base_pass() {
    let mut h = Harness::new();
    let mut scene = lit_cube_scene(&mut h, sun());
    scene.add(light(point(1.0)));
    let mut renderer = MobileRenderer::new(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    assert_eq!(h.draws_of(BaseShaderType::MobileBase), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardLight), 0);
    assert_eq!(h.draws_of(BaseShaderType::DepthOnly), 0);
    assert_eq!(renderer.render_stats().lights_drawn, 1);
}

fn check_single_shader(
    build: fn(RendererOptions, Arc<dyn ShaderLibrary>) -> SingleShaderRenderer,
    base: BaseShaderType,
) {
    let mut h = Harness::new();
    let scene = lit_cube_scene(&mut h, shadowed_sun());
    let mut renderer = build(RendererOptions::default(), h.library.clone());
    render_one(&mut h, &mut renderer, &scene);

    assert_eq!(renderer.passes().base_shader(), base);
    assert_eq!(h.draws_of(base), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardBase), 0);
    let stats = renderer.render_stats();
    assert_eq!(stats.opaque_drawn, 1);
    assert_eq!(stats.shadow_maps_drawn(), 0);
    assert_eq!(stats.lights_drawn, 0);
}

#[test]
fn debug_normals_draws_with_its_shader_only() {
    check_single_shader(SingleShaderRenderer::debug_normals, BaseShaderType::DebugNormals);
}

#[test]
fn full_bright_draws_with_its_shader_only() {
    check_single_shader(SingleShaderRenderer::full_bright, BaseShaderType::FullBright);
}
