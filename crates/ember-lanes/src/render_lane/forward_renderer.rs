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

//! Forward shading.
//!
//! Each opaque object is drawn once with its base pass (ambient, emissive,
//! lightmap), then once per affecting light, additively. An object lit by a
//! single light takes the single-light shader. With several lights, shadowed
//! lights and non-point lights still go one by one, while unshadowed point
//! lights are batched into light-list draws.
//!
//! Lit translucent objects take the same base and light passes, blended over
//! the scene with a read-only depth test throughout.

use std::sync::Arc;

use ember_core::math::{Aabb, Sphere};
use ember_core::renderer::{
    BaseShader, BaseShaderFlags, BaseShaderType, BlendMode, BlendState, DepthStencilState,
    GlobalShaderFlags, RasterizerState, RendererOptions, ShaderLibrary, ShaderProgramKey,
    ShadingModel,
};

use super::compositing::CompositingRenderer;
use super::constants::{LightListConstants, MAX_LIGHTS_PER_LIST};
use super::queue::{RenderPassMask, RenderQueue, RenderableEntry};
use super::world::{LightPhase, LightSlot, SceneFrame, ScenePasses};
use super::RendererKind;

/// Forward renderer: the frame skeleton, [`ForwardPasses`] and compositing.
pub type ForwardRenderer = CompositingRenderer<ForwardPasses>;

impl ForwardRenderer {
    /// Builds a forward renderer.
    pub fn new(options: RendererOptions, library: Arc<dyn ShaderLibrary>) -> Self {
        Self::with_passes(
            RendererKind::Forward,
            options,
            library,
            GlobalShaderFlags::empty(),
            ForwardPasses::new(),
        )
    }
}

/// `ALPHA_CLIP` for masked materials.
pub(crate) fn clip_flags(entry: &RenderableEntry) -> BaseShaderFlags {
    match entry.material.as_ref().map(|material| material.blend_mode()) {
        Some(BlendMode::Masked) => BaseShaderFlags::ALPHA_CLIP,
        _ => BaseShaderFlags::empty(),
    }
}

/// Returns `true` if lights have no effect on the entry.
pub(crate) fn is_unlit(entry: &RenderableEntry) -> bool {
    entry
        .material
        .as_ref()
        .is_some_and(|material| material.shading_model() == ShadingModel::Unlit)
}

/// Collects the lights that reach `bounds`: every directional light, and
/// point and spot lights whose range touches the box.
pub fn collect_affecting_lights(queue: &RenderQueue, bounds: &Aabb, out: &mut Vec<LightSlot>) {
    out.clear();
    out.extend((0..queue.directional_lights().len()).map(LightSlot::Directional));
    out.extend(
        queue
            .point_lights()
            .iter()
            .enumerate()
            .filter(|(_, light)| bounds.intersects_sphere(&light.bounding_sphere()))
            .map(|(index, _)| LightSlot::Point(index)),
    );
    out.extend(
        queue
            .spot_lights()
            .iter()
            .enumerate()
            .filter(|(_, light)| bounds.intersects_sphere(&Sphere::new(light.position, light.range)))
            .map(|(index, _)| LightSlot::Spot(index)),
    );
}

/// The scene passes of [`ForwardRenderer`].
#[derive(Debug, Default)]
pub struct ForwardPasses {
    affecting: Vec<LightSlot>,
    batched: Vec<usize>,
}

impl ForwardPasses {
    /// Creates the passes.
    pub fn new() -> Self {
        Self::default()
    }

    fn draw_light(
        frame: &mut SceneFrame<'_>,
        entry: &RenderableEntry,
        clip: BaseShaderFlags,
        slot: LightSlot,
        phase: &mut LightPhase,
        translucent: bool,
    ) {
        let Some(flags) = frame.bind_light_slot(slot) else {
            return;
        };
        Self::begin_light(frame, phase, translucent);
        let base = BaseShader::with_flags(BaseShaderType::ForwardLight, clip | flags);
        if frame.draw_entry(entry, base) {
            frame.stats.lights_drawn += 1;
        }
    }

    fn begin_light(frame: &mut SceneFrame<'_>, phase: &mut LightPhase, translucent: bool) {
        phase.begin_light(frame.gpu);
        // Translucent surfaces leave no depth to match.
        if translucent {
            frame.gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
        }
    }

    fn draw_lights(
        &mut self,
        frame: &mut SceneFrame<'_>,
        entry: &RenderableEntry,
        clip: BaseShaderFlags,
        translucent: bool,
    ) {
        let queue = frame.queue;
        let mut phase = LightPhase::default();

        if let [slot] = self.affecting.as_slice() {
            Self::draw_light(frame, entry, clip, *slot, &mut phase, translucent);
            phase.finish(frame.gpu);
            return;
        }

        self.batched.clear();
        for &slot in &self.affecting {
            match slot {
                LightSlot::Point(index) if !queue.point_lights()[index].has_shadow_map() => {
                    self.batched.push(index)
                }
                _ => Self::draw_light(frame, entry, clip, slot, &mut phase, translucent),
            }
        }

        let per_list = (frame.options.max_point_lights_per_pass as usize).clamp(1, MAX_LIGHTS_PER_LIST);
        for chunk in self.batched.chunks(per_list) {
            if let [index] = chunk {
                Self::draw_light(
                    frame,
                    entry,
                    clip,
                    LightSlot::Point(*index),
                    &mut phase,
                    translucent,
                );
                continue;
            }
            Self::begin_light(frame, &mut phase, translucent);
            LightListConstants::from_point_lights(chunk.iter().map(|&index| &queue.point_lights()[index]))
                .upload(frame.gpu);
            // The list overwrote the light slot.
            frame.lights.invalidate();
            let base = BaseShader::with_flags(
                BaseShaderType::ForwardLightList,
                clip | BaseShaderFlags::POINT_LIGHT,
            );
            if frame.draw_entry(entry, base) {
                frame.stats.lights_drawn += chunk.len() as u32;
            }
        }
        phase.finish(frame.gpu);
    }
}

impl ScenePasses for ForwardPasses {
    fn name(&self) -> &'static str {
        "ForwardRenderer"
    }

    fn required_programs(&self, _global_flags: GlobalShaderFlags) -> Vec<ShaderProgramKey> {
        // Every forward pass is a material program.
        Vec::new()
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
            let clip = clip_flags(entry);
            if !frame.draw_entry(entry, BaseShader::with_flags(BaseShaderType::ForwardBase, clip)) {
                continue;
            }
            frame.stats.opaque_drawn += 1;
            if is_unlit(entry) {
                continue;
            }

            collect_affecting_lights(queue, &entry.bounds, &mut self.affecting);
            if !self.affecting.is_empty() {
                self.draw_lights(frame, entry, clip, false);
            }
        }

        self.draw_translucent(frame);
        frame.draw_post_process_entries();
    }
}

impl ForwardPasses {
    /// Draws the translucent bucket back to front. Lit entries get a base
    /// pass and their light passes, unlit entries a single unlit draw.
    fn draw_translucent(&mut self, frame: &mut SceneFrame<'_>) {
        let queue = frame.queue;
        if queue.translucent_entries().is_empty() {
            return;
        }
        frame.bind_scene_targets();
        frame.gpu.set_rasterizer_state(RasterizerState::CullBack);
        for entry in queue.translucent_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            let blend = match entry.material.as_ref().map(|m| m.blend_mode()) {
                Some(BlendMode::Additive) => BlendState::Additive,
                _ => BlendState::AlphaBlend,
            };
            frame.gpu.set_blend_state(blend);
            frame.gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);

            if is_unlit(entry) {
                if frame.draw_entry(entry, BaseShader::new(BaseShaderType::Unlit)) {
                    frame.stats.translucent_drawn += 1;
                }
                continue;
            }
            if !frame.draw_entry(entry, BaseShader::new(BaseShaderType::ForwardBase)) {
                continue;
            }
            frame.stats.translucent_drawn += 1;
            collect_affecting_lights(queue, &entry.bounds, &mut self.affecting);
            if !self.affecting.is_empty() {
                self.draw_lights(frame, entry, BaseShaderFlags::empty(), true);
            }
        }
        frame.gpu.set_blend_state(BlendState::Opaque);
        frame.gpu.set_depth_stencil_state(DepthStencilState::Default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::math::Vec3;
    use ember_core::renderer::{DirectionalLightEntry, PointLightEntry, SpotLightEntry};

    use crate::render_lane::queue::LightEntry;

    fn queue_with_lights() -> RenderQueue {
        let mut queue = RenderQueue::new();
        queue.add_light(LightEntry::Directional(DirectionalLightEntry::new(
            Vec3::NEG_Y,
            Vec3::ONE,
            1.0,
        )));
        queue.add_light(LightEntry::Point(PointLightEntry::new(
            Vec3::new(3.0, 0.0, 0.0),
            2.5,
            Vec3::ONE,
            1.0,
        )));
        queue.add_light(LightEntry::Point(PointLightEntry::new(
            Vec3::new(30.0, 0.0, 0.0),
            2.0,
            Vec3::ONE,
            1.0,
        )));
        queue.add_light(LightEntry::Spot(SpotLightEntry::new(
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::NEG_Y,
            5.0,
            0.5,
            Vec3::ONE,
            1.0,
        )));
        queue
    }

    #[test]
    fn lights_are_filtered_by_range() {
        let queue = queue_with_lights();
        let bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let mut affecting = Vec::new();
        collect_affecting_lights(&queue, &bounds, &mut affecting);
        assert_eq!(
            affecting,
            vec![LightSlot::Directional(0), LightSlot::Point(0), LightSlot::Spot(0)]
        );
    }

    #[test]
    fn far_object_sees_only_directional_lights() {
        let queue = queue_with_lights();
        let bounds = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 100.0), Vec3::ONE);
        let mut affecting = vec![LightSlot::Point(7)];
        collect_affecting_lights(&queue, &bounds, &mut affecting);
        assert_eq!(affecting, vec![LightSlot::Directional(0)]);
    }
}
