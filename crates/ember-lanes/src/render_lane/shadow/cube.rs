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

//! Cube shadow maps for point lights.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use ember_core::math::Vec3;
use ember_core::renderer::{
    Camera, GlobalShaderFlags, GpuContext, PointLightEntry, RendererOptions, TextureFormat,
    TextureKind,
};

use super::cache::{ShadowMapCache, ShadowMapData};
use super::{ShadowCasterPass, ShadowDrawStats, ShadowJob, ShadowKind, ShadowPass};
use crate::render_lane::program_cache::ShaderProgramCache;
use crate::render_lane::scene::RenderWorld;

/// Look direction and up vector of each cube face, in layer order
/// `+X, -X, +Y, -Y, +Z, -Z`.
pub const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

/// The six 90 degree cameras of a point light at `position` reaching `range`.
pub fn cube_face_cameras(position: Vec3, range: f32) -> [Camera; 6] {
    let far = range.max(0.01);
    let near = (far * 0.001).max(0.001);
    CUBE_FACES.map(|(forward, up)| {
        Camera::perspective(position, position + forward, up, FRAC_PI_2, 1.0, near, far)
    })
}

/// Draws cube shadow maps for point lights.
#[derive(Debug)]
pub struct CubeShadowRenderer {
    pass: ShadowCasterPass,
    cache: ShadowMapCache,
    resolution: u32,
    format: TextureFormat,
}

impl CubeShadowRenderer {
    /// Creates the renderer from the options.
    pub fn new(
        options: &RendererOptions,
        programs: Arc<ShaderProgramCache>,
        global_flags: GlobalShaderFlags,
    ) -> Self {
        Self {
            pass: ShadowCasterPass::new(programs, global_flags),
            cache: ShadowMapCache::new(options.max_shadow_maps_per_type as usize),
            resolution: options.cube_shadow_map_resolution,
            format: options.shadow_map_format,
        }
    }

    /// The map cache.
    pub fn cache(&self) -> &ShadowMapCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut ShadowMapCache {
        &mut self.cache
    }

    /// Assigns a cube map to `light` and builds its face cameras.
    ///
    /// Returns `None`, leaving the light unshadowed, when the cache is full or
    /// the map cannot be allocated.
    pub fn prepare(&mut self, gpu: &mut dyn GpuContext, light: &mut PointLightEntry) -> Option<ShadowJob> {
        let (resolution, format) = (self.resolution, self.format);
        let index = self.cache.acquire(|| {
            ShadowMapData::allocate(gpu, "cube shadow map", TextureKind::Cube, resolution, format).ok()
        });
        let Some(index) = index else {
            log::debug!("CubeShadowRenderer: no shadow map available, light stays unshadowed");
            return None;
        };

        let data = self.cache.get_mut(index)?;
        let passes = cube_face_cameras(light.position, light.range)
            .into_iter()
            .zip(&data.views)
            .map(|(camera, target)| ShadowPass {
                camera,
                target: *target,
                resolution,
            })
            .collect::<Vec<_>>();
        for (slot, pass) in data.view_projections.iter_mut().zip(&passes) {
            *slot = *pass.camera.view_projection();
        }
        light.shadow_map_index = index as i32;

        Some(ShadowJob {
            kind: ShadowKind::Cube,
            map_index: index,
            passes,
        })
    }

    /// Draws a prepared job into `gpu`.
    pub fn render_job(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        job: &ShadowJob,
    ) -> ShadowDrawStats {
        self.pass.render_job(gpu, world, job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_face_sees_its_axis() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let cameras = cube_face_cameras(position, 10.0);
        for ((forward, _), camera) in CUBE_FACES.iter().zip(&cameras) {
            assert!(camera.frustum().contains_point(position + *forward * 5.0));
            assert!(!camera.frustum().contains_point(position - *forward * 5.0));
        }
    }

    #[test]
    fn faces_cover_every_direction() {
        let cameras = cube_face_cameras(Vec3::ZERO, 10.0);
        let probes = [
            Vec3::new(3.0, 1.0, -2.0),
            Vec3::new(-1.0, -4.0, 0.5),
            Vec3::new(0.2, 0.3, 4.0),
        ];
        for probe in probes {
            assert!(cameras.iter().any(|c| c.frustum().contains_point(probe)));
        }
    }
}
