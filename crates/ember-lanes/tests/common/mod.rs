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

//! Shared fixtures for the render-lane integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ember_core::math::{Mat4, Vec3};
use ember_core::renderer::{
    BaseShaderType, BasicMaterial, Camera, GpuContext, Material, MaterialShaderId, TextureDescriptor,
    TextureFormat, TextureUsage, TextureViewDescriptor,
};
use ember_infra::{HeadlessGpuContext, InMemoryShaderLibrary};
use ember_lanes::render_lane::{LightEntry, LightProxy, MeshBuffers, MeshProxy, OutputTarget, SceneList};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 180;

/// A headless device, an in-memory shader library and an output target.
pub struct Harness {
    pub gpu: HeadlessGpuContext,
    pub library: Arc<InMemoryShaderLibrary>,
    pub output: OutputTarget,
}

impl Harness {
    pub fn new() -> Self {
        let mut gpu = HeadlessGpuContext::new();
        let texture = gpu
            .create_texture(&TextureDescriptor::d2(
                "backbuffer",
                WIDTH,
                HEIGHT,
                TextureFormat::Rgba8UnormSrgb,
                1,
                TextureUsage::RENDER_TARGET | TextureUsage::COPY_DST,
            ))
            .expect("backbuffer");
        let view = gpu
            .create_render_target_view(texture, &TextureViewDescriptor::layer(0))
            .expect("backbuffer view");
        Self {
            gpu,
            library: Arc::new(InMemoryShaderLibrary::new()),
            output: OutputTarget {
                texture,
                view,
                width: WIDTH,
                height: HEIGHT,
                format: TextureFormat::Rgba8UnormSrgb,
            },
        }
    }

    /// Draws executed on the immediate context with any program of `base`.
    pub fn draws_of(&self, base: BaseShaderType) -> usize {
        self.library
            .programs_for(base)
            .into_iter()
            .map(|program| self.gpu.device().draws_with_program(program))
            .sum()
    }
}

/// Looks down -z from `z = 5` at the origin.
pub fn camera() -> Camera {
    Camera::perspective(
        Vec3::new(0.0, 0.0, 5.0),
        Vec3::ZERO,
        Vec3::Y,
        60f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    )
}

pub fn lit_material() -> Arc<dyn Material> {
    Arc::new(BasicMaterial::new("default lit", MaterialShaderId(1)))
}

/// A unit cube at `position`.
pub fn cube(gpu: &mut HeadlessGpuContext, position: Vec3) -> MeshProxy {
    let mesh = MeshBuffers::unit_cube(gpu).expect("cube buffers");
    MeshProxy::new(mesh, lit_material(), Mat4::from_translation(position))
}

pub fn light(entry: LightEntry) -> Arc<LightProxy> {
    Arc::new(LightProxy::new(entry))
}

/// Adds `proxy` to `scene`.
pub fn add<P: ember_lanes::render_lane::RenderProxy + 'static>(scene: &mut SceneList, proxy: P) {
    scene.add(Arc::new(proxy));
}
