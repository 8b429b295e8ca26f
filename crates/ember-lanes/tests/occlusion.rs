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

//! Occluder boxes, queries and their effect on the scene passes.

mod common;

use common::{add, camera, cube, light, Harness};
use ember_core::math::Vec3;
use ember_core::renderer::{
    BaseShaderType, DirectionalLightEntry, OcclusionCullingMode, RendererOptions,
};
use ember_lanes::render_lane::{ForwardRenderer, FrameRenderer, LightEntry, SceneList};

fn occluder_scene(h: &mut Harness) -> SceneList {
    let mut scene = SceneList::new();
    add(&mut scene, cube(&mut h.gpu, Vec3::ZERO).as_occluder());
    scene.add(light(LightEntry::Directional(DirectionalLightEntry::new(
        Vec3::NEG_Y,
        Vec3::ONE,
        1.0,
    ))));
    scene
}

fn renderer(h: &Harness, mode: OcclusionCullingMode) -> ForwardRenderer {
    ForwardRenderer::new(
        RendererOptions {
            occlusion_culling: mode,
            ..RendererOptions::default()
        },
        h.library.clone(),
    )
}

fn render(h: &mut Harness, renderer: &mut ForwardRenderer, scene: &SceneList) {
    renderer.initialize(&mut h.gpu).expect("initialize");
    renderer
        .draw_world(&mut h.gpu, scene, &camera(), &h.output)
        .expect("frame");
}

#[test]
fn blocking_mode_drops_hidden_objects() {
    let mut h = Harness::new();
    let scene = occluder_scene(&mut h);
    h.gpu.device().script_query_results([0]);
    let mut renderer = renderer(&h, OcclusionCullingMode::Blocking);
    render(&mut h, &mut renderer, &scene);

    let stats = renderer.render_stats();
    assert_eq!(stats.occluders_tested, 1);
    assert_eq!(stats.occlusion_culled, 1);
    assert_eq!(stats.opaque_drawn, 0);
    assert_eq!(h.draws_of(BaseShaderType::OcclusionBox), 1);
    assert_eq!(h.draws_of(BaseShaderType::ForwardBase), 0);
    assert_eq!(h.draws_of(BaseShaderType::ForwardLight), 0);
}

#[test]
fn blocking_mode_waits_for_pending_queries() {
    let mut h = Harness::new();
    let scene = occluder_scene(&mut h);
    h.gpu.device().set_query_pending_polls(3);
    let mut renderer = renderer(&h, OcclusionCullingMode::Blocking);
    render(&mut h, &mut renderer, &scene);

    let device = h.gpu.device().stats();
    assert_eq!(device.pending_query_polls, 3);
    assert_eq!(renderer.render_stats().occlusion_culled, 0);
    assert_eq!(h.draws_of(BaseShaderType::ForwardBase), 1);
}

#[test]
fn predicated_mode_lets_the_gpu_skip_hidden_draws() {
    let mut h = Harness::new();
    let scene = occluder_scene(&mut h);
    h.gpu.device().script_query_results([0]);
    let mut renderer = renderer(&h, OcclusionCullingMode::Predicated);
    render(&mut h, &mut renderer, &scene);

    let stats = renderer.render_stats();
    assert_eq!(stats.occluders_tested, 1);
    // Nothing is culled on the CPU side.
    assert_eq!(stats.occlusion_culled, 0);
    assert_eq!(stats.opaque_drawn, 1);
    assert!(h.gpu.device().stats().predicated_draws_skipped > 0);
}

#[test]
fn occluder_prepass_replaces_the_scene_prepass() {
    let mut h = Harness::new();
    let scene = occluder_scene(&mut h);
    let mut renderer = renderer(&h, OcclusionCullingMode::Blocking);
    render(&mut h, &mut renderer, &scene);

    assert_eq!(h.draws_of(BaseShaderType::DepthOnly), 1);
}

#[test]
fn disabled_mode_draws_no_boxes() {
    let mut h = Harness::new();
    let scene = occluder_scene(&mut h);
    let mut renderer = renderer(&h, OcclusionCullingMode::Disabled);
    render(&mut h, &mut renderer, &scene);

    assert_eq!(renderer.render_stats().occluders_tested, 0);
    assert_eq!(h.draws_of(BaseShaderType::OcclusionBox), 0);
    assert_eq!(h.gpu.device().stats().queries_created, 0);
}
