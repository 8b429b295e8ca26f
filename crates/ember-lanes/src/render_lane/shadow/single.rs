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

//! Single 2D shadow maps rendered from an explicit camera.

use std::sync::Arc;

use ember_core::renderer::{
    Camera, GlobalShaderFlags, GpuContext, RendererOptions, TextureFormat, TextureKind,
};

use super::cache::{ShadowMapCache, ShadowMapData};
use super::{ShadowCasterPass, ShadowDrawStats, ShadowJob, ShadowKind, ShadowPass};
use crate::render_lane::program_cache::ShaderProgramCache;
use crate::render_lane::scene::RenderWorld;

/// Draws one depth map per explicit light camera.
#[derive(Debug)]
pub struct SingleShadowRenderer {
    pass: ShadowCasterPass,
    cache: ShadowMapCache,
    resolution: u32,
    format: TextureFormat,
}

impl SingleShadowRenderer {
    /// Creates the renderer from the options.
    pub fn new(
        options: &RendererOptions,
        programs: Arc<ShaderProgramCache>,
        global_flags: GlobalShaderFlags,
    ) -> Self {
        Self {
            pass: ShadowCasterPass::new(programs, global_flags),
            cache: ShadowMapCache::new(options.max_shadow_maps_per_type as usize),
            resolution: options.shadow_map_resolution,
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

    /// Assigns a map to `camera`. Returns `None` when none is available.
    pub fn prepare(&mut self, gpu: &mut dyn GpuContext, camera: Camera) -> Option<ShadowJob> {
        let (resolution, format) = (self.resolution, self.format);
        let index = self.cache.acquire(|| {
            ShadowMapData::allocate(gpu, "single shadow map", TextureKind::D2, resolution, format).ok()
        })?;
        let data = self.cache.get_mut(index)?;
        data.view_projections[0] = *camera.view_projection();

        Some(ShadowJob {
            kind: ShadowKind::Single,
            map_index: index,
            passes: vec![ShadowPass {
                camera,
                target: data.views[0],
                resolution,
            }],
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
