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

//! Single-pass forward shading for low-end targets.
//!
//! The first directional light, with its shadow map, is folded into the base
//! pass. Other lights are ignored and there is no depth prepass.

use std::sync::Arc;

use ember_core::renderer::{
    BaseShader, BaseShaderFlags, BaseShaderType, BlendState, DepthStencilState, GlobalShaderFlags,
    RasterizerState, RendererOptions, ShaderLibrary, ShaderProgramKey,
};

use super::compositing::CompositingRenderer;
use super::forward_renderer::{clip_flags, is_unlit};
use super::queue::RenderPassMask;
use super::world::{LightSlot, SceneFrame, ScenePasses};
use super::RendererKind;

/// Mobile renderer: the frame skeleton, [`MobilePasses`] and compositing.
pub type MobileRenderer = CompositingRenderer<MobilePasses>;

impl MobileRenderer {
    /// Builds a mobile renderer. Programs are selected with
    /// [`GlobalShaderFlags::MOBILE`].
    pub fn new(options: RendererOptions, library: Arc<dyn ShaderLibrary>) -> Self {
        Self::with_passes(
            RendererKind::Mobile,
            options,
            library,
            GlobalShaderFlags::MOBILE,
            MobilePasses,
        )
    }
}

/// The scene passes of [`MobileRenderer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MobilePasses;

impl ScenePasses for MobilePasses {
    fn name(&self) -> &'static str {
        "MobileRenderer"
    }

    fn required_programs(&self, _global_flags: GlobalShaderFlags) -> Vec<ShaderProgramKey> {
        Vec::new()
    }

    fn wants_depth_prepass(&self) -> bool {
        false
    }

    fn draw_scene(&mut self, frame: &mut SceneFrame<'_>) {
        let queue = frame.queue;
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
        frame.gpu.set_rasterizer_state(RasterizerState::CullBack);

        // The sun is bound once for the whole pass.
        let sun = if queue.directional_lights().is_empty() {
            None
        } else {
            frame.bind_light_slot(LightSlot::Directional(0))
        };
        if sun.is_some() {
            frame.stats.lights_drawn += 1;
        }

        for entry in queue.opaque_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            let mut flags = clip_flags(entry);
            if !is_unlit(entry) {
                flags |= sun.unwrap_or(BaseShaderFlags::empty());
            }
            if frame.draw_entry(entry, BaseShader::with_flags(BaseShaderType::MobileBase, flags)) {
                frame.stats.opaque_drawn += 1;
            }
        }

        frame.draw_translucent_entries();
        frame.draw_post_process_entries();
    }
}
