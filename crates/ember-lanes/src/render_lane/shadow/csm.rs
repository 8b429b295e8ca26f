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

//! Cascaded shadow maps for directional lights.

use std::sync::Arc;

use ember_core::math::{Vec3, Vec4};
use ember_core::renderer::{
    Camera, DirectionalLightEntry, GlobalShaderFlags, GpuContext, RendererOptions, TextureFormat,
    TextureKind, MAX_SHADOW_CASCADES,
};

use super::cache::{ShadowMapCache, ShadowMapData};
use super::{ShadowCasterPass, ShadowDrawStats, ShadowJob, ShadowKind, ShadowPass};
use crate::render_lane::program_cache::ShaderProgramCache;
use crate::render_lane::scene::RenderWorld;

/// Computes `count + 1` cascade boundaries between `near` and
/// `min(far, shadow_distance)`.
///
/// `lambda` blends the logarithmic scheme (`1.0`) with the linear one
/// (`0.0`). The first boundary is `near` and the last is exactly the capped
/// distance.
///
/// ```
/// use ember_lanes::render_lane::shadow::compute_cascade_splits;
///
/// let splits = compute_cascade_splits(0.1, 500.0, 500.0, 3, 0.95);
/// assert_eq!(splits.len(), 4);
/// assert_eq!(splits[3], 500.0);
/// ```
pub fn compute_cascade_splits(
    near: f32,
    far: f32,
    shadow_distance: f32,
    count: u32,
    lambda: f32,
) -> Vec<f32> {
    let count = count.max(1);
    let near = near.max(f32::EPSILON);
    let far = far.min(shadow_distance).max(near);
    let ratio = far / near;
    let range = far - near;

    let mut splits = Vec::with_capacity(count as usize + 1);
    splits.push(near);
    for i in 1..count {
        let p = i as f32 / count as f32;
        let log = near * ratio.powf(p);
        let linear = near + range * p;
        splits.push(lambda * log + (1.0 - lambda) * linear);
    }
    splits.push(far);
    splits
}

/// Moves the projection so the world origin lands on a whole texel of a
/// `resolution` sized map.
///
/// Without this the map is resampled at sub-texel offsets as the view moves
/// and shadow edges shimmer.
pub fn snap_to_texel(camera: &mut Camera, resolution: u32) {
    let half = resolution.max(1) as f32 * 0.5;
    let origin = *camera.view_projection() * Vec4::W;
    let texels_x = origin.x * half;
    let texels_y = origin.y * half;
    let mut projection = *camera.projection();
    projection.w_axis.x += (texels_x.round() - texels_x) / half;
    projection.w_axis.y += (texels_y.round() - texels_y) / half;
    camera.set_projection(projection);
}

/// Builds the orthographic light camera covering a cascade's frustum
/// corners, texel-snapped for `resolution`.
pub fn build_cascade_camera(corners: &[Vec3; 8], light_direction: Vec3, resolution: u32) -> Camera {
    let direction = light_direction.normalize_or(Vec3::NEG_Y);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(center))
        .fold(0.0f32, f32::max);
    // Quantized so the extent does not change as the view rotates.
    let radius = ((radius * 16.0).ceil() / 16.0).max(1.0 / 16.0);

    let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let eye = center - direction * radius * 2.0;
    let mut camera = Camera::orthographic(
        eye,
        center,
        up,
        radius * 2.0,
        radius * 2.0,
        0.0,
        radius * 4.0,
    );
    snap_to_texel(&mut camera, resolution);
    camera
}

/// Draws cascaded shadow maps for directional lights.
#[derive(Debug)]
pub struct CascadedShadowRenderer {
    pass: ShadowCasterPass,
    cache: ShadowMapCache,
    resolution: u32,
    format: TextureFormat,
    cascade_count: u32,
    lambda: f32,
    shadow_distance: f32,
}

impl CascadedShadowRenderer {
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
            cascade_count: options.cascade_count.clamp(1, MAX_SHADOW_CASCADES),
            lambda: options.cascade_lambda,
            shadow_distance: options.shadow_distance,
        }
    }

    /// The map cache.
    pub fn cache(&self) -> &ShadowMapCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut ShadowMapCache {
        &mut self.cache
    }

    /// Number of cascades per map.
    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    /// Assigns a map to `light` and computes its cascade cameras for `view`.
    ///
    /// Returns `None`, leaving the light unshadowed, when the cache is full or
    /// the map cannot be allocated.
    pub fn prepare(
        &mut self,
        gpu: &mut dyn GpuContext,
        view: &Camera,
        light: &mut DirectionalLightEntry,
    ) -> Option<ShadowJob> {
        let (resolution, format, layers) = (self.resolution, self.format, self.cascade_count);
        let index = self.cache.acquire(|| {
            ShadowMapData::allocate(
                gpu,
                "cascaded shadow map",
                TextureKind::D2Array { layers },
                resolution,
                format,
            )
            .ok()
        });
        let Some(index) = index else {
            log::debug!("CascadedShadowRenderer: no shadow map available, light stays unshadowed");
            return None;
        };

        let splits = compute_cascade_splits(
            view.near(),
            view.far(),
            self.shadow_distance,
            self.cascade_count,
            self.lambda,
        );
        let data = self.cache.get_mut(index)?;
        let mut passes = Vec::with_capacity(self.cascade_count as usize);
        for (cascade, bounds) in splits.windows(2).enumerate() {
            let corners = view.frustum_corners(bounds[0], bounds[1]);
            let camera = build_cascade_camera(&corners, light.direction, resolution);
            data.view_projections[cascade] = *camera.view_projection();
            passes.push(ShadowPass {
                camera,
                target: data.views[cascade],
                resolution,
            });
        }
        data.split_depths = splits[1..].to_vec();
        light.shadow_map_index = index as i32;

        Some(ShadowJob {
            kind: ShadowKind::Cascaded,
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
    use approx::assert_relative_eq;

    #[test]
    fn splits_are_monotonic_and_capped() {
        let splits = compute_cascade_splits(0.1, 500.0, 500.0, 3, 0.95);
        assert_eq!(splits.len(), 4);
        assert!(splits[0] < splits[1]);
        assert!(splits[1] < splits[2]);
        assert!(splits[2] < splits[3]);
        assert_eq!(splits[3], 500.0);
    }

    #[test]
    fn shadow_distance_caps_far_plane() {
        let splits = compute_cascade_splits(0.5, 1000.0, 120.0, 4, 0.5);
        assert_eq!(*splits.last().unwrap(), 120.0);
        assert_eq!(splits[0], 0.5);
    }

    #[test]
    fn linear_scheme_spaces_evenly() {
        let splits = compute_cascade_splits(0.0, 100.0, 100.0, 4, 0.0);
        assert_relative_eq!(splits[1], 25.0, epsilon = 1e-3);
        assert_relative_eq!(splits[2], 50.0, epsilon = 1e-3);
    }

    #[test]
    fn cascade_camera_snaps_origin_to_texels() {
        let view = Camera::perspective(
            Vec3::new(13.37, 4.2, 21.9),
            Vec3::new(0.3, 0.0, -7.1),
            Vec3::Y,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            500.0,
        );
        let resolution = 1024;
        let corners = view.frustum_corners(0.1, 40.0);
        let camera = build_cascade_camera(&corners, Vec3::new(-0.4, -1.0, 0.3), resolution);

        let origin = *camera.view_projection() * Vec4::W;
        let texel = 2.0 / resolution as f32;
        for coordinate in [origin.x, origin.y] {
            let steps = coordinate / texel;
            assert_relative_eq!(steps, steps.round(), epsilon = 1e-2);
        }
    }

    #[test]
    fn out_of_range_cascade_count_still_gets_one_layer_per_split() {
        let mut gpu = ember_infra::HeadlessGpuContext::new();
        let programs = Arc::new(ShaderProgramCache::new(Arc::new(
            ember_infra::InMemoryShaderLibrary::new(),
        )));
        let options = RendererOptions {
            cascade_count: 0,
            ..RendererOptions::default()
        };
        let mut renderer = CascadedShadowRenderer::new(&options, programs, GlobalShaderFlags::empty());
        assert_eq!(renderer.cascade_count(), 1);

        let view = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0, 0.1, 50.0);
        let mut sun = DirectionalLightEntry::new(Vec3::NEG_Y, Vec3::ONE, 1.0);
        let job = renderer.prepare(&mut gpu, &view, &mut sun).unwrap();
        assert_eq!(job.passes.len(), 1);
        assert_eq!(renderer.cache().get(job.map_index).unwrap().views.len(), 1);
    }

    #[test]
    fn cascade_camera_contains_corners() {
        let view = Camera::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 1.0, 1.0, 0.1, 50.0);
        let corners = view.frustum_corners(0.1, 10.0);
        let camera = build_cascade_camera(&corners, Vec3::NEG_Y, 1024);
        for corner in corners {
            assert!(camera.frustum().contains_point(corner));
        }
    }
}
