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

//! Helpers shared by the per-light passes of the frame renderers.

use ember_core::renderer::{BlendState, DepthStencilState, GpuContext};

use crate::render_lane::constants::LightConstants;

/// Identifies the light whose constants are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightSlot {
    /// Index into the queue's directional lights.
    Directional(usize),
    /// Index into the queue's point lights.
    Point(usize),
    /// Index into the queue's spot lights.
    Spot(usize),
    /// Index into the queue's volumetric lights.
    Volumetric(usize),
}

/// Remembers the last light uploaded so a light shared by consecutive
/// objects is uploaded once.
///
/// Objects, not lights, drive the draw loop, so the same light comes back
/// often. The cache must be reset when the frame completes or the state is
/// cleared.
#[derive(Debug, Default)]
pub struct LightBindingCache {
    last: Option<LightSlot>,
    uploads: u32,
    skipped: u32,
}

impl LightBindingCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads `constants` unless `slot` is the light already bound. Returns
    /// `true` if an upload happened.
    pub fn bind(&mut self, gpu: &mut dyn GpuContext, slot: LightSlot, constants: &LightConstants) -> bool {
        if self.last == Some(slot) {
            self.skipped += 1;
            return false;
        }
        constants.upload(gpu);
        self.last = Some(slot);
        self.uploads += 1;
        true
    }

    /// Forgets the bound light. Call after anything else writes the light slot.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Forgets the bound light and the counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Uploads done since the last reset.
    pub fn uploads(&self) -> u32 {
        self.uploads
    }

    /// Uploads avoided since the last reset.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}

/// Where an object is in its sequence of additive light passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightPhase {
    /// No light drawn yet for this object.
    #[default]
    First,
    /// One light drawn.
    Second,
    /// Two or more lights drawn.
    Subsequent,
}

impl LightPhase {
    /// Sets the state the next light pass needs and advances the phase.
    ///
    /// The first light switches to additive blending on top of the base pass
    /// with a read-only depth test; from the second light on the depth test
    /// is `Equal` so only the surface laid down by the base pass is lit.
    /// Later lights need no change.
    pub fn begin_light(&mut self, gpu: &mut dyn GpuContext) {
        *self = match self {
            LightPhase::First => {
                gpu.set_blend_state(BlendState::Additive);
                gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
                LightPhase::Second
            }
            LightPhase::Second => {
                gpu.set_depth_stencil_state(DepthStencilState::Equal);
                LightPhase::Subsequent
            }
            LightPhase::Subsequent => LightPhase::Subsequent,
        };
    }

    /// Returns `true` if at least one light was drawn.
    pub fn any_drawn(&self) -> bool {
        *self != LightPhase::First
    }

    /// Restores the base-pass state if any light pass changed it.
    pub fn finish(self, gpu: &mut dyn GpuContext) {
        if self.any_drawn() {
            gpu.set_blend_state(BlendState::Opaque);
            gpu.set_depth_stencil_state(DepthStencilState::Default);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::math::Vec3;
    use ember_core::renderer::{ConstantSlot, DirectionalLightEntry};
    use ember_infra::{GpuCommand, HeadlessGpuContext};

    #[test]
    fn same_light_is_uploaded_once() {
        let mut gpu = HeadlessGpuContext::new();
        let sun = LightConstants::directional(&DirectionalLightEntry::new(Vec3::NEG_Y, Vec3::ONE, 1.0));
        let mut cache = LightBindingCache::new();

        assert!(cache.bind(&mut gpu, LightSlot::Directional(0), &sun));
        assert!(!cache.bind(&mut gpu, LightSlot::Directional(0), &sun));
        assert!(cache.bind(&mut gpu, LightSlot::Point(0), &sun));
        assert_eq!(cache.uploads(), 2);
        assert_eq!(cache.skipped(), 1);

        let light_writes = gpu
            .device()
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::WriteConstants { slot: ConstantSlot::Light, .. }))
            .count();
        assert_eq!(light_writes, 2);
    }

    #[test]
    fn reset_forces_upload() {
        let mut gpu = HeadlessGpuContext::new();
        let sun = LightConstants::directional(&DirectionalLightEntry::new(Vec3::NEG_Y, Vec3::ONE, 1.0));
        let mut cache = LightBindingCache::new();
        cache.bind(&mut gpu, LightSlot::Directional(0), &sun);
        cache.reset();
        assert!(cache.bind(&mut gpu, LightSlot::Directional(0), &sun));
    }

    #[test]
    fn light_phases_set_state_once_each() {
        let mut gpu = HeadlessGpuContext::new();
        let mut phase = LightPhase::default();
        for _ in 0..4 {
            phase.begin_light(&mut gpu);
        }
        assert_eq!(phase, LightPhase::Subsequent);

        let states: Vec<_> = gpu
            .device()
            .commands()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    GpuCommand::SetBlendState(_) | GpuCommand::SetDepthStencilState(_)
                )
            })
            .collect();
        assert_eq!(
            states,
            vec![
                GpuCommand::SetBlendState(BlendState::Additive),
                GpuCommand::SetDepthStencilState(DepthStencilState::ReadOnly),
                GpuCommand::SetDepthStencilState(DepthStencilState::Equal),
            ]
        );
    }
}
