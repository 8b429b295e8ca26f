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

//! Renderers that draw every object with one base shader and no lighting.

use std::sync::Arc;

use ember_core::renderer::{
    BaseShader, BaseShaderType, BlendMode, BlendState, DepthStencilState, GlobalShaderFlags,
    RasterizerState, RendererOptions, ShaderLibrary, ShaderProgramKey,
};

use super::compositing::CompositingRenderer;
use super::forward_renderer::clip_flags;
use super::queue::RenderPassMask;
use super::world::{SceneFrame, ScenePasses};
use super::RendererKind;

/// A renderer drawing the whole scene with a single base shader.
pub type SingleShaderRenderer = CompositingRenderer<SingleShaderPasses>;

impl SingleShaderRenderer {
    /// View-space normals of every object.
    pub fn debug_normals(options: RendererOptions, library: Arc<dyn ShaderLibrary>) -> Self {
        Self::with_passes(
            RendererKind::DebugNormals,
            options,
            library,
            GlobalShaderFlags::empty(),
            SingleShaderPasses::new("DebugNormalsRenderer", BaseShaderType::DebugNormals),
        )
    }

    /// Unlit diffuse color of every object.
    pub fn full_bright(options: RendererOptions, library: Arc<dyn ShaderLibrary>) -> Self {
        Self::with_passes(
            RendererKind::FullBright,
            options,
            library,
            GlobalShaderFlags::empty(),
            SingleShaderPasses::new("FullBrightRenderer", BaseShaderType::FullBright),
        )
    }
}

/// Scene passes drawing opaque then translucent entries with one shader.
#[derive(Debug, Clone, Copy)]
pub struct SingleShaderPasses {
    name: &'static str,
    base: BaseShaderType,
}

impl SingleShaderPasses {
    /// Creates passes drawing with `base`.
    pub fn new(name: &'static str, base: BaseShaderType) -> Self {
        Self { name, base }
    }

    /// The shader every entry is drawn with.
    pub fn base_shader(&self) -> BaseShaderType {
        self.base
    }
}

impl ScenePasses for SingleShaderPasses {
    fn name(&self) -> &'static str {
        self.name
    }

    fn required_programs(&self, _global_flags: GlobalShaderFlags) -> Vec<ShaderProgramKey> {
        Vec::new()
    }

    fn draws_shadows(&self) -> bool {
        false
    }

    fn draw_scene(&mut self, frame: &mut SceneFrame<'_>) {
        let queue = frame.queue;
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
        frame.gpu.set_rasterizer_state(RasterizerState::CullBack);
        for entry in queue.opaque_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            if frame.draw_entry(entry, BaseShader::with_flags(self.base, clip_flags(entry))) {
                frame.stats.opaque_drawn += 1;
            }
        }

        frame.gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
        for entry in queue.translucent_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            let blend = match entry.material.as_ref().map(|material| material.blend_mode()) {
                Some(BlendMode::Additive) => BlendState::Additive,
                _ => BlendState::AlphaBlend,
            };
            frame.gpu.set_blend_state(blend);
            if frame.draw_entry(entry, BaseShader::new(self.base)) {
                frame.stats.translucent_drawn += 1;
            }
        }
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
    }
}
