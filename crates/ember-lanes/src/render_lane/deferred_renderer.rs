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

//! Deferred shading.
//!
//! After the depth prepass the scene is drawn in these steps:
//!
//! 1. G-buffer fill into three targets; objects with emissive or lightmap
//!    output also write scene color as a fourth target.
//! 2. Lights accumulate into scene color: ambient, directional lights as
//!    full-screen passes, unshadowed point lights as one light-list pass, the
//!    remaining point lights and spot lights as light volumes, then
//!    volumetric shafts.
//! 3. Half-resolution SSAO, upsampled and blended onto scene color.
//! 4. Fog.
//! 5. Translucent and post-process objects.

use std::sync::Arc;

use ember_core::math::{Mat4, Quat, Sphere, Vec3};
use ember_core::renderer::{
    BaseShader, BaseShaderFlags, BaseShaderType, BlendState, ConstantSlot, DepthStencilState,
    GlobalShaderFlags, GpuContext, RasterizerState, RenderError, RendererOptions, ShaderLibrary,
    ShaderProgramKey, ShadingModel, TextureFormat, VertexFactoryDesc, Viewport, CLEAR_BLACK,
};

use super::compositing::CompositingRenderer;
use super::constants::{
    LightConstants, LightListConstants, ObjectConstants, PostProcessConstants,
    MAX_LIGHTS_PER_LIST, SCREEN_INPUT_SLOT,
};
use super::forward_renderer::clip_flags;
use super::proxies::MeshBuffers;
use super::queue::RenderPassMask;
use super::world::{IntermediateBuffer, LightSlot, SceneFrame, ScenePasses};
use super::RendererKind;

/// Formats of the three G-buffer targets: albedo, normal, material
/// properties.
pub const GBUFFER_FORMATS: [TextureFormat; 3] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgb10A2Unorm,
    TextureFormat::Rgba8Unorm,
];

/// Format of the half-resolution ambient-occlusion buffer.
pub const SSAO_FORMAT: TextureFormat = TextureFormat::R16Float;

/// Texture slot of the scene depth in screen passes, after the G-buffer.
const DEPTH_INPUT_SLOT: u32 = SCREEN_INPUT_SLOT + GBUFFER_FORMATS.len() as u32;

/// Deferred renderer: the frame skeleton, [`DeferredPasses`] and compositing.
pub type DeferredRenderer = CompositingRenderer<DeferredPasses>;

impl DeferredRenderer {
    /// Builds a deferred renderer.
    pub fn new(options: RendererOptions, library: Arc<dyn ShaderLibrary>) -> Self {
        Self::with_passes(
            RendererKind::Deferred,
            options,
            library,
            GlobalShaderFlags::empty(),
            DeferredPasses::new(),
        )
    }
}

/// Returns `true` if the camera at `eye` is inside the volume of a light at
/// `center` with `radius`, with `near` of slack so the near plane cannot
/// clip the front faces.
pub fn camera_inside_volume(eye: Vec3, near: f32, center: Vec3, radius: f32) -> bool {
    eye.distance(center) <= radius + near
}

/// The scene passes of [`DeferredRenderer`].
#[derive(Debug, Default)]
pub struct DeferredPasses {
    volume: Option<MeshBuffers>,
    overflow: Vec<LightSlot>,
}

impl DeferredPasses {
    /// Creates the passes; the light-volume mesh is made by `initialize`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The light-volume mesh, once initialized.
    pub fn light_volume(&self) -> Option<&MeshBuffers> {
        self.volume.as_ref()
    }

    fn draw_gbuffer(frame: &mut SceneFrame<'_>, gbuffer: &[Arc<IntermediateBuffer>]) {
        let queue = frame.queue;
        let layers: Vec<_> = gbuffer.iter().filter_map(|buffer| buffer.rtv).collect();
        let mut with_output = layers.clone();
        with_output.push(frame.targets.color_view);

        frame.bind_targets(&layers);
        for &layer in &layers {
            frame.gpu.clear_render_target(layer, CLEAR_BLACK);
        }
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
        frame.gpu.set_rasterizer_state(RasterizerState::CullBack);

        let mut output_bound = false;
        for entry in queue.opaque_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            let needs_output = entry.material.as_ref().is_some_and(|material| {
                material.requires_base_pass_output() || material.shading_model() == ShadingModel::Unlit
            });
            if needs_output != output_bound {
                frame.bind_targets(if needs_output { &with_output } else { &layers });
                output_bound = needs_output;
            }
            let mut flags = clip_flags(entry);
            if needs_output {
                flags |= BaseShaderFlags::BASE_PASS_OUTPUT;
            }
            if frame.draw_entry(entry, BaseShader::with_flags(BaseShaderType::GBuffer, flags)) {
                frame.stats.opaque_drawn += 1;
            }
        }
    }

    fn bind_screen_inputs(frame: &mut SceneFrame<'_>, gbuffer: &[Arc<IntermediateBuffer>]) {
        for (slot, buffer) in (SCREEN_INPUT_SLOT..).zip(gbuffer) {
            frame.gpu.set_texture(slot, Some(buffer.texture));
        }
        frame.gpu.set_texture(DEPTH_INPUT_SLOT, Some(frame.targets.depth_texture));
    }

    fn unbind_screen_inputs(frame: &mut SceneFrame<'_>) {
        for slot in SCREEN_INPUT_SLOT..=DEPTH_INPUT_SLOT {
            frame.gpu.set_texture(slot, None);
        }
    }

    /// Draws the light-volume mesh scaled to a box around `center`,
    /// choosing faces and depth test by where the camera is.
    fn draw_volume(&self, frame: &mut SceneFrame<'_>, center: Vec3, radius: f32, base: BaseShader) -> bool {
        let Some(volume) = self.volume else {
            frame.stats.skipped_draws += 1;
            return false;
        };
        if camera_inside_volume(frame.camera.position(), frame.camera.near(), center, radius) {
            frame.gpu.set_rasterizer_state(RasterizerState::CullFront);
            frame
                .gpu
                .set_depth_stencil_state(DepthStencilState::GreaterEqualReadOnly);
        } else {
            frame.gpu.set_rasterizer_state(RasterizerState::CullBack);
            frame.gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
        }

        frame.selector.set_base_shader(base);
        frame.selector.set_vertex_factory(VertexFactoryDesc::STATIC_MESH);
        frame.selector.set_material(None);
        if frame.selector.make_active(frame.gpu).is_none() {
            frame.stats.skipped_draws += 1;
            return false;
        }
        let world = Mat4::from_scale_rotation_translation(
            Vec3::splat(radius * 2.0),
            Quat::IDENTITY,
            center,
        );
        let constants = ObjectConstants::new(world, Vec3::ONE.extend(1.0), [0; 4]);
        frame
            .gpu
            .write_constants(ConstantSlot::Object, bytemuck::bytes_of(&constants));
        volume.bind(frame.gpu);
        frame.gpu.draw_indexed(volume.index_count, 0, 0);
        frame.stats.draw_calls += 1;
        true
    }

    fn draw_lights(&mut self, frame: &mut SceneFrame<'_>) {
        let queue = frame.queue;
        frame.bind_scene_targets();
        frame.gpu.set_blend_state(BlendState::Additive);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Disabled);
        frame.gpu.set_rasterizer_state(RasterizerState::CullNone);

        frame.draw_fullscreen(BaseShader::new(BaseShaderType::DeferredAmbient));

        for index in 0..queue.directional_lights().len() {
            let Some(flags) = frame.bind_light_slot(LightSlot::Directional(index)) else {
                continue;
            };
            if frame.draw_fullscreen(BaseShader::with_flags(BaseShaderType::DeferredDirectionalLight, flags)) {
                frame.stats.lights_drawn += 1;
            }
        }

        // Unshadowed point lights up to the list size go in one pass, the
        // rest get volumes.
        let per_list = (frame.options.max_point_lights_per_pass as usize).clamp(1, MAX_LIGHTS_PER_LIST);
        let mut listed = Vec::with_capacity(per_list);
        self.overflow.clear();
        for (index, light) in queue.point_lights().iter().enumerate() {
            if !light.has_shadow_map() && listed.len() < per_list {
                listed.push(index);
            } else {
                self.overflow.push(LightSlot::Point(index));
            }
        }
        if let [index] = listed[..] {
            self.overflow.push(LightSlot::Point(index));
        } else if !listed.is_empty() {
            LightListConstants::from_point_lights(listed.iter().map(|&index| &queue.point_lights()[index]))
                .upload(frame.gpu);
            frame.lights.invalidate();
            let base = BaseShader::with_flags(
                BaseShaderType::DeferredPointLightList,
                BaseShaderFlags::POINT_LIGHT,
            );
            if frame.draw_fullscreen(base) {
                frame.stats.lights_drawn += listed.len() as u32;
            }
        }
        self.overflow
            .extend((0..queue.spot_lights().len()).map(LightSlot::Spot));

        let overflow = std::mem::take(&mut self.overflow);
        for &slot in &overflow {
            let sphere = match slot {
                LightSlot::Point(index) => queue.point_lights()[index].bounding_sphere(),
                LightSlot::Spot(index) => {
                    let light = &queue.spot_lights()[index];
                    Sphere::new(light.position, light.range)
                }
                _ => continue,
            };
            let Some(flags) = frame.bind_light_slot(slot) else {
                continue;
            };
            let base = BaseShader::with_flags(BaseShaderType::DeferredPointLight, flags);
            if self.draw_volume(frame, sphere.center, sphere.radius, base) {
                frame.stats.lights_drawn += 1;
            }
        }
        self.overflow = overflow;

        for (index, light) in queue.volumetric_lights().iter().enumerate() {
            frame.bind_light(LightSlot::Volumetric(index), &LightConstants::volumetric(light));
            let half = light.range * 0.5;
            let center = light.position + light.direction.normalize_or_zero() * half;
            if self.draw_volume(frame, center, half, BaseShader::new(BaseShaderType::VolumetricLight)) {
                frame.stats.lights_drawn += 1;
            }
        }

        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
        frame.gpu.set_rasterizer_state(RasterizerState::CullBack);
    }

    /// Half-resolution SSAO blended onto scene color. Skipped, with a
    /// warning, if its buffer cannot be allocated.
    fn draw_ssao(frame: &mut SceneFrame<'_>) {
        let (width, height) = (frame.targets.width, frame.targets.height);
        let half = ((width / 2).max(1), (height / 2).max(1));
        let Some(occlusion) = frame.request_buffer(half.0, half.1, SSAO_FORMAT) else {
            log::warn!("DeferredRenderer: no SSAO buffer, ambient occlusion skipped");
            return;
        };

        frame.gpu.set_render_targets(&occlusion.color_targets(), None);
        frame.gpu.set_viewport(&Viewport::from_size(half.0, half.1));
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Disabled);
        PostProcessConstants::new((width, height), half, [0.0; 4]).upload(frame.gpu);
        if frame.draw_fullscreen(BaseShader::new(BaseShaderType::Ssao)) {
            frame.bind_scene_targets();
            frame.gpu.set_blend_state(BlendState::AlphaBlend);
            frame.gpu.set_depth_stencil_state(DepthStencilState::Disabled);
            frame
                .gpu
                .set_texture(DEPTH_INPUT_SLOT + 1, Some(occlusion.texture));
            PostProcessConstants::new(half, (width, height), [0.0; 4]).upload(frame.gpu);
            frame.draw_fullscreen(BaseShader::new(BaseShaderType::SsaoUpsample));
            frame.gpu.set_texture(DEPTH_INPUT_SLOT + 1, None);
        } else {
            frame.bind_scene_targets();
        }
        frame.release_buffer(occlusion);
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
    }

    fn draw_fog(frame: &mut SceneFrame<'_>) {
        frame.bind_scene_targets();
        frame.gpu.set_blend_state(BlendState::AlphaBlend);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Disabled);
        frame.draw_fullscreen(BaseShader::new(BaseShaderType::Fog));
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
    }
}

impl ScenePasses for DeferredPasses {
    fn name(&self) -> &'static str {
        "DeferredRenderer"
    }

    fn required_programs(&self, global_flags: GlobalShaderFlags) -> Vec<ShaderProgramKey> {
        [
            BaseShaderType::DeferredAmbient,
            BaseShaderType::DeferredDirectionalLight,
        ]
        .into_iter()
        .map(|ty| ShaderProgramKey::screen_pass(global_flags, BaseShader::new(ty)))
        .collect()
    }

    fn initialize(&mut self, gpu: &mut dyn GpuContext) -> Result<(), RenderError> {
        if self.volume.is_none() {
            let volume = MeshBuffers::unit_cube(gpu).map_err(|err| {
                RenderError::InitializationFailed(format!("light volume mesh: {err}"))
            })?;
            self.volume = Some(volume);
        }
        Ok(())
    }

    fn release(&mut self, gpu: &mut dyn GpuContext) {
        if let Some(volume) = self.volume.take() {
            volume.destroy(gpu);
        }
    }

    fn draw_scene(&mut self, frame: &mut SceneFrame<'_>) {
        let (width, height) = (frame.targets.width, frame.targets.height);
        let mut gbuffer = Vec::with_capacity(GBUFFER_FORMATS.len());
        for format in GBUFFER_FORMATS {
            match frame.request_buffer(width, height, format) {
                Some(buffer) => gbuffer.push(buffer),
                None => {
                    log::error!("DeferredRenderer: no {format:?} G-buffer layer, scene skipped");
                    for buffer in gbuffer {
                        frame.release_buffer(buffer);
                    }
                    return;
                }
            }
        }

        // 1. G-buffer.
        Self::draw_gbuffer(frame, &gbuffer);

        // 2. Lights.
        Self::bind_screen_inputs(frame, &gbuffer);
        self.draw_lights(frame);

        // 3. Ambient occlusion.
        if frame.options.ssao {
            Self::draw_ssao(frame);
        }

        // 4. Fog.
        if frame.options.fog {
            Self::draw_fog(frame);
        }

        Self::unbind_screen_inputs(frame);
        for buffer in gbuffer {
            frame.release_buffer(buffer);
        }

        // 5. Translucent and post-process objects.
        frame.draw_translucent_entries();
        frame.draw_post_process_entries();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_side_depends_on_eye_distance() {
        let center = Vec3::new(0.0, 0.0, -10.0);
        assert!(camera_inside_volume(Vec3::ZERO, 0.1, center, 10.0));
        assert!(camera_inside_volume(Vec3::ZERO, 0.1, center, 9.95));
        assert!(!camera_inside_volume(Vec3::ZERO, 0.1, center, 5.0));
    }

    #[test]
    fn screen_passes_are_required() {
        let required = DeferredPasses::new().required_programs(GlobalShaderFlags::SHADOWS);
        assert_eq!(required.len(), 2);
        assert!(required
            .iter()
            .all(|key| key.vertex_factory == VertexFactoryDesc::SCREEN_QUAD
                && key.global_flags == GlobalShaderFlags::SHADOWS));
    }

    #[test]
    fn depth_follows_gbuffer_inputs() {
        assert_eq!(DEPTH_INPUT_SLOT, SCREEN_INPUT_SLOT + 3);
    }
}
