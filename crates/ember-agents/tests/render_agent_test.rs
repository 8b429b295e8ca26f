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

//! The render thread handshake, driven the way a game loop drives it.

use std::sync::Arc;

use ember_agents::{RenderAgent, RenderAgentConfig};
use ember_core::math::{Mat4, Vec3};
use ember_core::renderer::{
    BaseShaderType, BasicMaterial, Camera, DirectionalLightEntry, MaterialShaderId, RenderError,
    RendererOptions,
};
use ember_infra::{HeadlessDevice, HeadlessGpuContext, InMemoryShaderLibrary};
use ember_lanes::render_lane::{
    LightEntry, LightProxy, MeshBuffers, MeshProxy, RendererKind, SceneList,
};

struct Fixture {
    device: HeadlessDevice,
    library: Arc<InMemoryShaderLibrary>,
    agent: RenderAgent,
}

fn camera() -> Camera {
    Camera::perspective(
        Vec3::new(0.0, 1.0, 6.0),
        Vec3::ZERO,
        Vec3::Y,
        1.0,
        16.0 / 9.0,
        0.1,
        200.0,
    )
}

fn spawn(kind: RendererKind, threaded: bool, library: InMemoryShaderLibrary) -> Fixture {
    let mut gpu = HeadlessGpuContext::new();
    let device = gpu.device().clone();
    let mut scene = SceneList::new();
    let mesh = MeshBuffers::unit_cube(&mut gpu).unwrap();
    scene.add(Arc::new(MeshProxy::new(
        mesh,
        Arc::new(BasicMaterial::new("lit", MaterialShaderId(1))),
        Mat4::IDENTITY,
    )));
    scene.add(Arc::new(LightProxy::new(LightEntry::Directional(
        DirectionalLightEntry::new(Vec3::NEG_Y, Vec3::ONE, 1.0),
    ))));

    let library = Arc::new(library);
    let agent = RenderAgent::spawn(
        RenderAgentConfig {
            kind,
            options: RendererOptions::default(),
            width: 320,
            height: 180,
            threaded,
        },
        Box::new(gpu),
        library.clone(),
        Arc::new(scene),
    )
    .unwrap();
    Fixture {
        device,
        library,
        agent,
    }
}

fn run_frames(agent: &mut RenderAgent, count: usize) {
    for _ in 0..count {
        agent.begin_frame(1.0 / 60.0, camera()).unwrap();
        agent.wait_events_ready();
        agent.wait_frame_complete();
    }
}

#[test]
fn threaded_frames_complete_in_order() {
    let mut fixture = spawn(RendererKind::Forward, true, InMemoryShaderLibrary::new());
    run_frames(&mut fixture.agent, 3);

    assert_eq!(fixture.agent.frames_rendered(), 3);
    let stats = fixture.agent.last_stats();
    assert_eq!(stats.frame_number, 2);
    assert_eq!(stats.opaque_drawn, 1);
    fixture.agent.shutdown();
    assert!(!fixture.agent.is_running());
}

#[test]
fn inline_mode_runs_the_same_protocol() {
    let mut fixture = spawn(RendererKind::Deferred, false, InMemoryShaderLibrary::new());
    run_frames(&mut fixture.agent, 2);

    assert_eq!(fixture.agent.frames_rendered(), 2);
    assert_eq!(fixture.agent.last_stats().opaque_drawn, 1);
    let gbuffer_draws: usize = fixture
        .library
        .programs_for(BaseShaderType::GBuffer)
        .into_iter()
        .map(|program| fixture.device.draws_with_program(program))
        .sum();
    assert_eq!(gbuffer_draws, 2);
}

#[test]
fn failed_renderer_falls_back_to_forward() {
    let library = InMemoryShaderLibrary::new();
    library.deny_base_shader(BaseShaderType::MobileBase);
    library.deny_base_shader(BaseShaderType::DeferredAmbient);
    let mut fixture = spawn(RendererKind::Deferred, true, library);
    assert_eq!(fixture.agent.renderer_kind(), RendererKind::Forward);
    run_frames(&mut fixture.agent, 1);
    assert_eq!(fixture.agent.last_stats().opaque_drawn, 1);
}

#[test]
fn recreated_renderer_is_used_by_the_next_frame() {
    let mut fixture = spawn(RendererKind::Forward, true, InMemoryShaderLibrary::new());
    run_frames(&mut fixture.agent, 1);
    fixture
        .agent
        .recreate_renderer(Some(RendererKind::Mobile), RendererOptions::conservative())
        .unwrap();
    fixture.agent.resize(640, 360).unwrap();
    run_frames(&mut fixture.agent, 1);

    assert_eq!(fixture.agent.renderer_kind(), RendererKind::Mobile);
    let mobile_draws: usize = fixture
        .library
        .programs_for(BaseShaderType::MobileBase)
        .into_iter()
        .map(|program| fixture.device.draws_with_program(program))
        .sum();
    assert_eq!(mobile_draws, 1);
}

#[test]
fn shutdown_releases_every_texture() {
    let mut fixture = spawn(RendererKind::Forward, true, InMemoryShaderLibrary::new());
    run_frames(&mut fixture.agent, 2);
    fixture.agent.shutdown();

    assert_eq!(fixture.device.live_textures(), 0);
    assert_eq!(fixture.device.live_views(), 0);
    let result = fixture.agent.begin_frame(0.016, camera());
    assert!(matches!(result, Err(RenderError::ThreadDisconnected)));
    // A second shutdown is harmless.
    fixture.agent.shutdown();
}
