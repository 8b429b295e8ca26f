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

//! Shadow-map renderers.
//!
//! There is one renderer per technique: cascaded maps for directional
//! lights, cube maps for point lights and single maps for explicit cameras.
//! Each owns a private [`RenderQueue`] that only accepts the shadow-map pass
//! and a [`ShadowMapCache`] of depth targets.
//!
//! Rendering happens in two steps so the draws can move to worker threads:
//! `prepare` runs on the render thread, assigns a map to the light and
//! computes the light cameras, and returns a [`ShadowJob`]; `render_job`
//! fills the queue and records the draws into whatever context it is given.

mod cache;
mod csm;
mod cube;
mod single;

pub use cache::{ShadowMapCache, ShadowMapData};
pub use csm::{build_cascade_camera, compute_cascade_splits, snap_to_texel, CascadedShadowRenderer};
pub use cube::{cube_face_cameras, CubeShadowRenderer, CUBE_FACES};
pub use single::SingleShadowRenderer;

use std::sync::Arc;

use ember_core::math::Mat4;
use ember_core::renderer::{
    BaseShader, BaseShaderFlags, BaseShaderType, BlendMode, BlendState, Camera, DepthClear,
    DepthStencilState, DepthStencilViewId, GlobalShaderFlags, GpuContext, RasterizerState,
    RendererOptions, SpotLightEntry, TextureId, Viewport,
};

use super::constants::{ShadowConstants, ViewConstants, SHADOW_MAP_SLOT};
use super::program_cache::ShaderProgramCache;
use super::queue::{RenderPassMask, RenderQueue};
use super::scene::{fill_queue, RenderWorld};
use super::shader_selector::ShaderProgramSelector;

/// The technique a shadow map uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowKind {
    /// Cascaded directional-light map.
    Cascaded,
    /// Point-light cube map.
    Cube,
    /// Single map for an explicit camera.
    Single,
}

/// One depth pass into one layer of a shadow map.
#[derive(Debug, Clone)]
pub struct ShadowPass {
    /// Light camera.
    pub camera: Camera,
    /// Layer to draw into.
    pub target: DepthStencilViewId,
    /// Layer size in texels.
    pub resolution: u32,
}

/// Everything needed to draw one light's shadow map.
#[derive(Debug, Clone)]
pub struct ShadowJob {
    /// Technique.
    pub kind: ShadowKind,
    /// Index of the map in its renderer's cache.
    pub map_index: usize,
    /// One pass per cascade or face.
    pub passes: Vec<ShadowPass>,
}

/// Counters from drawing shadow jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowDrawStats {
    /// Draw calls issued.
    pub draws: u32,
    /// Entries skipped for a missing program.
    pub skipped: u32,
}

impl std::ops::AddAssign for ShadowDrawStats {
    fn add_assign(&mut self, other: Self) {
        self.draws += other.draws;
        self.skipped += other.skipped;
    }
}

/// The queue and selector a shadow renderer draws casters with.
#[derive(Debug)]
pub struct ShadowCasterPass {
    queue: RenderQueue,
    selector: ShaderProgramSelector,
    global_flags: GlobalShaderFlags,
}

impl ShadowCasterPass {
    /// Creates a pass with a shadow-only queue.
    pub fn new(programs: Arc<ShaderProgramCache>, global_flags: GlobalShaderFlags) -> Self {
        Self {
            queue: RenderQueue::shadow_caster_queue(),
            selector: ShaderProgramSelector::new(programs),
            global_flags,
        }
    }

    /// The private queue, as filled by the last pass.
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    /// Draws every pass of `job` into `gpu`.
    pub fn render_job(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        job: &ShadowJob,
    ) -> ShadowDrawStats {
        // Another context may have been used since the last job.
        self.selector.invalidate();
        self.selector.set_global_flags(self.global_flags);

        let mut stats = ShadowDrawStats::default();
        for pass in &job.passes {
            stats += self.render_pass(gpu, world, pass);
        }
        stats
    }

    fn render_pass(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        pass: &ShadowPass,
    ) -> ShadowDrawStats {
        let mut stats = ShadowDrawStats::default();

        // 1. Clear the target.
        gpu.set_render_targets(&[], Some(pass.target));
        gpu.set_viewport(&Viewport::from_size(pass.resolution, pass.resolution));
        gpu.clear_depth_stencil(pass.target, DepthClear::FAR);

        // 2. Collect casters; nothing to draw means nothing else to do.
        self.queue.clear();
        fill_queue(world, &pass.camera, &mut self.queue);
        if self.queue.is_empty() {
            return stats;
        }
        self.queue.sort();

        // 3. Draw depth.
        gpu.set_blend_state(BlendState::NoColorWrite);
        gpu.set_depth_stencil_state(DepthStencilState::Default);
        gpu.set_rasterizer_state(RasterizerState::ShadowBias);
        ViewConstants::new(&pass.camera, pass.resolution, pass.resolution).upload(gpu);

        let entries = self
            .queue
            .opaque_entries()
            .iter()
            .chain(self.queue.translucent_entries());
        for entry in entries {
            if !entry.is_in_pass(RenderPassMask::SHADOW_MAP) {
                continue;
            }
            // Alpha-tested casters need their real material to clip.
            let masked = entry
                .material
                .as_ref()
                .filter(|material| material.blend_mode() == BlendMode::Masked);
            match masked {
                Some(material) => {
                    self.selector.set_base_shader(BaseShader::with_flags(
                        BaseShaderType::DepthOnly,
                        BaseShaderFlags::ALPHA_CLIP,
                    ));
                    self.selector.set_material(Some(material));
                }
                None => {
                    self.selector
                        .set_base_shader(BaseShader::new(BaseShaderType::DepthOnly));
                    self.selector.set_material(None);
                }
            }
            self.selector.set_vertex_factory(entry.vertex_factory);

            let Some(program) = self.selector.make_active(gpu) else {
                stats.skipped += 1;
                continue;
            };
            entry.proxy.setup_for_draw(&pass.camera, entry, gpu, program);
            entry.proxy.draw_queue_entry(&pass.camera, entry, gpu);
            stats.draws += 1;
        }
        stats
    }
}

/// What a light pass needs to sample one shadow map.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMapBinding {
    /// The depth texture.
    pub texture: TextureId,
    /// Edge length of one layer.
    pub resolution: u32,
    /// One matrix per cascade or face.
    pub view_projections: Vec<Mat4>,
    /// Cascade far distances; empty for non-cascaded maps.
    pub split_depths: Vec<f32>,
}

impl ShadowMapBinding {
    fn from_data(data: &ShadowMapData) -> Self {
        Self {
            texture: data.texture,
            resolution: data.resolution,
            view_projections: data.view_projections.clone(),
            split_depths: data.split_depths.clone(),
        }
    }

    /// Binds the texture and uploads the shadow constants.
    pub fn bind(&self, gpu: &mut dyn GpuContext) {
        gpu.set_texture(SHADOW_MAP_SLOT, Some(self.texture));
        ShadowConstants::new(&self.view_projections, &self.split_depths, self.resolution)
            .upload(gpu);
    }
}

/// Snapshot of the shadow maps acquired this frame, indexed like the
/// `shadow_map_index` of the lights.
///
/// Taken once the jobs are prepared, so light passes can read it while the
/// renderers themselves are busy on worker threads.
#[derive(Debug, Clone, Default)]
pub struct FrameShadows {
    cascaded: Vec<Option<ShadowMapBinding>>,
    cube: Vec<Option<ShadowMapBinding>>,
    single: Vec<Option<ShadowMapBinding>>,
}

impl FrameShadows {
    fn snapshot(cache: &ShadowMapCache) -> Vec<Option<ShadowMapBinding>> {
        (0..cache.allocated())
            .map(|index| {
                cache
                    .get(index)
                    .filter(|_| cache.is_active(index))
                    .map(ShadowMapBinding::from_data)
            })
            .collect()
    }

    /// The map a light with `shadow_map_index` samples, if it has one.
    pub fn get(&self, kind: ShadowKind, shadow_map_index: i32) -> Option<&ShadowMapBinding> {
        let index = usize::try_from(shadow_map_index).ok()?;
        let maps = match kind {
            ShadowKind::Cascaded => &self.cascaded,
            ShadowKind::Cube => &self.cube,
            ShadowKind::Single => &self.single,
        };
        maps.get(index)?.as_ref()
    }

    /// Number of maps in the snapshot.
    pub fn len(&self) -> usize {
        [&self.cascaded, &self.cube, &self.single]
            .iter()
            .map(|maps| maps.iter().flatten().count())
            .sum()
    }

    /// Returns `true` if no map is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The jobs prepared for one frame, per technique.
#[derive(Debug, Clone, Default)]
pub struct ShadowJobs {
    /// Directional-light jobs.
    pub cascaded: Vec<ShadowJob>,
    /// Point-light jobs.
    pub cube: Vec<ShadowJob>,
    /// Explicit-camera jobs.
    pub single: Vec<ShadowJob>,
}

impl ShadowJobs {
    /// Returns `true` if there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.cascaded.is_empty() && self.cube.is_empty() && self.single.is_empty()
    }
}

/// One shadow renderer borrowed for a worker thread.
#[derive(Debug)]
pub enum ShadowWorker<'a> {
    /// Draws cascaded jobs.
    Cascaded(&'a mut CascadedShadowRenderer),
    /// Draws cube jobs.
    Cube(&'a mut CubeShadowRenderer),
    /// Draws single jobs.
    Single(&'a mut SingleShadowRenderer),
}

impl ShadowWorker<'_> {
    /// Name used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ShadowWorker::Cascaded(_) => "cascaded",
            ShadowWorker::Cube(_) => "cube",
            ShadowWorker::Single(_) => "single",
        }
    }

    /// Draws every job in `jobs` into `gpu`.
    pub fn render_jobs(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        jobs: &[ShadowJob],
    ) -> ShadowDrawStats {
        let mut stats = ShadowDrawStats::default();
        for job in jobs {
            stats += match self {
                ShadowWorker::Cascaded(renderer) => renderer.render_job(gpu, world, job),
                ShadowWorker::Cube(renderer) => renderer.render_job(gpu, world, job),
                ShadowWorker::Single(renderer) => renderer.render_job(gpu, world, job),
            };
        }
        stats
    }
}

/// The three shadow renderers of a frame renderer.
#[derive(Debug)]
pub struct ShadowRenderers {
    /// Directional lights.
    pub cascaded: CascadedShadowRenderer,
    /// Point lights.
    pub cube: CubeShadowRenderer,
    /// Explicit cameras.
    pub single: SingleShadowRenderer,
}

impl ShadowRenderers {
    /// Creates the renderers from the options.
    pub fn new(options: &RendererOptions, programs: Arc<ShaderProgramCache>) -> Self {
        let flags = options.global_shader_flags();
        Self {
            cascaded: CascadedShadowRenderer::new(options, programs.clone(), flags),
            cube: CubeShadowRenderer::new(options, programs.clone(), flags),
            single: SingleShadowRenderer::new(options, programs, flags),
        }
    }

    /// Spot-light shadow maps are not supported; always returns `false` and
    /// leaves the light without a map.
    pub fn draw_spot_shadow_map(&mut self, light: &SpotLightEntry) -> bool {
        log::trace!(
            "ShadowRenderers: no spot shadow map for light at {:?}",
            light.position
        );
        false
    }

    /// Assigns maps to the shadow-casting lights of `queue` and to each
    /// explicit camera, in the order directional, point, spot, single.
    ///
    /// Lights that get a map have their `shadow_map_index` set; the others
    /// stay unshadowed.
    pub fn prepare_jobs(
        &mut self,
        gpu: &mut dyn GpuContext,
        view: &Camera,
        queue: &mut RenderQueue,
        single_cameras: &[Camera],
    ) -> ShadowJobs {
        let mut jobs = ShadowJobs::default();
        for light in queue.directional_lights_mut() {
            if light.casts_shadows() {
                jobs.cascaded.extend(self.cascaded.prepare(gpu, view, light));
            }
        }
        for light in queue.point_lights_mut() {
            if light.casts_shadows() {
                jobs.cube.extend(self.cube.prepare(gpu, light));
            }
        }
        for light in queue.spot_lights_mut() {
            if light.casts_shadows() {
                self.draw_spot_shadow_map(light);
            }
        }
        for camera in single_cameras {
            jobs.single.extend(self.single.prepare(gpu, *camera));
        }
        jobs
    }

    /// Draws every job on `gpu`, in preparation order.
    pub fn render_jobs(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        jobs: &ShadowJobs,
    ) -> ShadowDrawStats {
        let mut stats = ShadowDrawStats::default();
        for (mut worker, jobs) in self.workers(jobs) {
            stats += worker.render_jobs(gpu, world, jobs);
        }
        stats
    }

    /// Splits the renderers so each can draw its jobs on its own thread.
    pub fn workers<'a, 'j>(
        &'a mut self,
        jobs: &'j ShadowJobs,
    ) -> [(ShadowWorker<'a>, &'j [ShadowJob]); 3] {
        [
            (ShadowWorker::Cascaded(&mut self.cascaded), &jobs.cascaded),
            (ShadowWorker::Cube(&mut self.cube), &jobs.cube),
            (ShadowWorker::Single(&mut self.single), &jobs.single),
        ]
    }

    /// The maps acquired this frame.
    pub fn bindings(&self) -> FrameShadows {
        FrameShadows {
            cascaded: FrameShadows::snapshot(self.cascaded.cache()),
            cube: FrameShadows::snapshot(self.cube.cache()),
            single: FrameShadows::snapshot(self.single.cache()),
        }
    }

    /// Returns every map to its cache.
    pub fn end_frame(&mut self) {
        self.cascaded.cache_mut().end_frame();
        self.cube.cache_mut().end_frame();
        self.single.cache_mut().end_frame();
    }

    /// Destroys every map.
    pub fn release_all(&mut self, gpu: &mut dyn GpuContext) {
        self.cascaded.cache_mut().release_all(gpu);
        self.cube.cache_mut().release_all(gpu);
        self.single.cache_mut().release_all(gpu);
    }
}
