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

//! The per-frame skeleton shared by every frame renderer.
//!
//! [`WorldRenderer`] owns the services a frame needs (render queue, shader
//! selection, intermediate buffers, shadow renderers, occlusion culling,
//! command-list scheduling) and runs the fixed sequence of a frame:
//!
//! 1. fill and sort the render queue,
//! 2. draw shadow maps,
//! 3. draw occluders and consume the occlusion results,
//! 4. draw the scene through a [`ScenePasses`] implementation,
//! 5. composite into the output,
//! 6. draw the debug overlays.
//!
//! What happens inside step 4 is up to the concrete renderer.

mod buffer_pool;
mod lighting;
mod occlusion;
mod scheduler;

pub use buffer_pool::{IntermediateBuffer, IntermediateBufferPool};
pub use lighting::{LightBindingCache, LightPhase, LightSlot};
pub use occlusion::{OcclusionCuller, OcclusionStats, PendingOcclusionQuery};
pub use scheduler::{CommandListScheduler, SecondaryReservation};

use std::sync::Arc;
use std::time::Instant;

use ember_core::renderer::{
    BaseShader, BaseShaderFlags, BaseShaderType, BlendMode, BlendState, Camera, DepthClear,
    DepthStencilState, DepthStencilViewId, GlobalShaderFlags, GpuContext, OcclusionCullingMode,
    RasterizerState, RenderError, RenderStats, RenderTargetViewId, RendererOptions, ShaderLibrary,
    ShaderProgramKey, TextureFormat, TextureId, VertexFactoryDesc, Viewport, CLEAR_BLACK,
};

use super::compositing::CompositingStage;
use super::constants::{LightConstants, ViewConstants, SCREEN_INPUT_SLOT};
use super::debug_overlay::DebugOverlay;
use super::program_cache::ShaderProgramCache;
use super::queue::{RenderPassMask, RenderQueue, RenderableEntry};
use super::scene::{fill_queue, RenderWorld};
use super::shader_selector::ShaderProgramSelector;
use super::shadow::{FrameShadows, ShadowDrawStats, ShadowJobs, ShadowKind, ShadowMapBinding, ShadowRenderers};
use super::OutputTarget;

/// Format of the scene depth buffer.
pub const SCENE_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

/// The color and depth targets the scene passes draw into.
///
/// Color is a pooled HDR buffer when the frame is composited, the output
/// otherwise.
#[derive(Debug)]
pub struct SceneTargets {
    /// Target width.
    pub width: u32,
    /// Target height.
    pub height: u32,
    /// Scene color texture.
    pub color_texture: TextureId,
    /// Scene color view.
    pub color_view: RenderTargetViewId,
    /// Scene color format.
    pub color_format: TextureFormat,
    /// Scene depth texture.
    pub depth_texture: TextureId,
    /// Scene depth view.
    pub depth_view: DepthStencilViewId,
    hdr: Option<Arc<IntermediateBuffer>>,
    depth: Arc<IntermediateBuffer>,
}

impl SceneTargets {
    fn acquire(
        gpu: &mut dyn GpuContext,
        pool: &mut IntermediateBufferPool,
        output: &OutputTarget,
        hdr_format: Option<TextureFormat>,
    ) -> Option<Self> {
        let (width, height) = (output.width, output.height);
        let depth = pool.request(gpu, width, height, SCENE_DEPTH_FORMAT, 1)?;
        let Some(depth_view) = depth.dsv else {
            pool.release(depth);
            return None;
        };

        let hdr = hdr_format.and_then(|format| {
            let buffer = pool.request(gpu, width, height, format, 1);
            if buffer.is_none() {
                log::warn!("WorldRenderer: no HDR scene color, drawing straight to the output");
            }
            buffer
        });
        let color = hdr
            .as_ref()
            .and_then(|buffer| buffer.rtv.map(|rtv| (buffer.texture, rtv, buffer.format)));
        let (color_texture, color_view, color_format) =
            color.unwrap_or((output.texture, output.view, output.format));

        Some(Self {
            width,
            height,
            color_texture,
            color_view,
            color_format,
            depth_texture: depth.texture,
            depth_view,
            hdr,
            depth,
        })
    }

    /// The pooled HDR color buffer, `None` when drawing to the output.
    pub fn hdr(&self) -> Option<&Arc<IntermediateBuffer>> {
        self.hdr.as_ref()
    }

    fn release(self, pool: &mut IntermediateBufferPool) {
        if let Some(hdr) = self.hdr {
            pool.release(hdr);
        }
        pool.release(self.depth);
    }
}

/// The scene-pass ordering of a concrete renderer.
pub trait ScenePasses: Send {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Material-less programs that must exist for this renderer to work.
    /// Checked once by [`WorldRenderer::initialize`].
    fn required_programs(&self, global_flags: GlobalShaderFlags) -> Vec<ShaderProgramKey>;

    /// Creates GPU resources the passes own, such as light-volume meshes.
    ///
    /// ## Errors
    ///
    /// `RenderError::InitializationFailed` if a resource cannot be created.
    fn initialize(&mut self, _gpu: &mut dyn GpuContext) -> Result<(), RenderError> {
        Ok(())
    }

    /// Destroys what [`initialize`](Self::initialize) created.
    fn release(&mut self, _gpu: &mut dyn GpuContext) {}

    /// Whether step 2 draws shadow maps for this renderer.
    fn draws_shadows(&self) -> bool {
        true
    }

    /// Whether a depth prepass runs before [`draw_scene`](Self::draw_scene).
    fn wants_depth_prepass(&self) -> bool {
        true
    }

    /// Draws the queued scene into `frame.targets`.
    ///
    /// The targets are bound and cleared, the view constants uploaded and the
    /// depth prepass, if any, drawn before this is called.
    fn draw_scene(&mut self, frame: &mut SceneFrame<'_>);
}

/// Issues one queue entry with `base` selected.
///
/// Returns `false`, counting a skipped draw, when no program exists for the
/// selection or the material fails to bind. A predicated entry is drawn
/// under its query.
pub fn draw_entry(
    gpu: &mut dyn GpuContext,
    selector: &mut ShaderProgramSelector,
    camera: &Camera,
    entry: &RenderableEntry,
    base: BaseShader,
    bind_material: bool,
    stats: &mut RenderStats,
) -> bool {
    selector.set_base_shader(base);
    selector.set_vertex_factory(entry.vertex_factory);
    selector.set_material(if bind_material { entry.material.as_ref() } else { None });
    let Some(program) = selector.make_active(gpu) else {
        stats.skipped_draws += 1;
        return false;
    };

    entry.proxy.setup_for_draw(camera, entry, gpu, program);
    if entry.predicate.is_some() {
        gpu.set_predication(entry.predicate);
    }
    entry.proxy.draw_queue_entry(camera, entry, gpu);
    if entry.predicate.is_some() {
        gpu.set_predication(None);
    }
    stats.draw_calls += 1;
    true
}

/// Draws depth for every opaque entry in the prepass.
///
/// Masked materials keep their material so they clip; everything else uses
/// the plain depth-only program.
pub fn draw_depth_prepass(
    gpu: &mut dyn GpuContext,
    selector: &mut ShaderProgramSelector,
    camera: &Camera,
    queue: &RenderQueue,
    stats: &mut RenderStats,
) {
    gpu.set_blend_state(BlendState::NoColorWrite);
    gpu.set_depth_stencil_state(DepthStencilState::Default);
    gpu.set_rasterizer_state(RasterizerState::CullBack);
    for entry in queue.opaque_entries() {
        if !entry.is_in_pass(RenderPassMask::DEPTH_PREPASS) {
            continue;
        }
        let masked = entry
            .material
            .as_ref()
            .is_some_and(|material| material.blend_mode() == BlendMode::Masked);
        let base = if masked {
            BaseShader::with_flags(BaseShaderType::DepthOnly, BaseShaderFlags::ALPHA_CLIP)
        } else {
            BaseShader::new(BaseShaderType::DepthOnly)
        };
        draw_entry(gpu, selector, camera, entry, base, masked, stats);
    }
    gpu.set_blend_state(BlendState::Opaque);
}

/// Everything a [`ScenePasses`] implementation draws with.
#[derive(Debug)]
pub struct SceneFrame<'a> {
    /// The context the scene is recorded on.
    pub gpu: &'a mut dyn GpuContext,
    /// The view.
    pub camera: &'a Camera,
    /// Renderer options.
    pub options: &'a RendererOptions,
    /// Frame-wide shader switches.
    pub global_flags: GlobalShaderFlags,
    /// The sorted queue, after occlusion culling.
    pub queue: &'a RenderQueue,
    /// Program selection for this context.
    pub selector: &'a mut ShaderProgramSelector,
    /// Intermediate buffers.
    pub pool: &'a mut IntermediateBufferPool,
    /// Last uploaded light.
    pub lights: &'a mut LightBindingCache,
    /// This frame's shadow maps.
    pub shadows: &'a FrameShadows,
    /// Scene color and depth.
    pub targets: &'a SceneTargets,
    /// Counters for this frame.
    pub stats: &'a mut RenderStats,
}

impl SceneFrame<'_> {
    /// Binds scene color and depth with a full viewport and uploads the view
    /// constants.
    pub fn bind_scene_targets(&mut self) {
        self.bind_targets(&[self.targets.color_view]);
    }

    /// Binds `colors` with the scene depth.
    pub fn bind_targets(&mut self, colors: &[RenderTargetViewId]) {
        self.gpu.set_render_targets(colors, Some(self.targets.depth_view));
        self.gpu
            .set_viewport(&Viewport::from_size(self.targets.width, self.targets.height));
        ViewConstants::new(self.camera, self.targets.width, self.targets.height).upload(self.gpu);
    }

    /// Draws `entry` with `base` and the entry's material.
    pub fn draw_entry(&mut self, entry: &RenderableEntry, base: BaseShader) -> bool {
        draw_entry(self.gpu, self.selector, self.camera, entry, base, true, self.stats)
    }

    /// Draws a full-screen pass with `base`. Returns `false`, counting a
    /// skipped draw, if the program is missing.
    pub fn draw_fullscreen(&mut self, base: BaseShader) -> bool {
        self.selector.set_base_shader(base);
        self.selector.set_vertex_factory(VertexFactoryDesc::SCREEN_QUAD);
        self.selector.set_material(None);
        if self.selector.make_active(self.gpu).is_none() {
            self.stats.skipped_draws += 1;
            return false;
        }
        self.gpu.draw_fullscreen_quad();
        self.stats.draw_calls += 1;
        true
    }

    /// Uploads a light unless it is the one already bound.
    pub fn bind_light(&mut self, slot: LightSlot, constants: &LightConstants) {
        self.lights.bind(self.gpu, slot, constants);
    }

    /// Uploads the light in `slot` and binds its shadow map if it got one
    /// this frame.
    ///
    /// Returns the base-shader flags describing the light, or `None` for
    /// volumetric lights and indices past the end of the queue.
    pub fn bind_light_slot(&mut self, slot: LightSlot) -> Option<BaseShaderFlags> {
        let queue = self.queue;
        let shadows = self.shadows;
        let (constants, mut flags, shadow) = match slot {
            LightSlot::Directional(index) => {
                let light = queue.directional_lights().get(index)?;
                (
                    LightConstants::directional(light),
                    BaseShaderFlags::DIRECTIONAL_LIGHT,
                    shadows
                        .get(ShadowKind::Cascaded, light.shadow_map_index)
                        .map(|map| (map, BaseShaderFlags::CASCADED)),
                )
            }
            LightSlot::Point(index) => {
                let light = queue.point_lights().get(index)?;
                (
                    LightConstants::point(light),
                    BaseShaderFlags::POINT_LIGHT,
                    shadows
                        .get(ShadowKind::Cube, light.shadow_map_index)
                        .map(|map| (map, BaseShaderFlags::CUBE_SHADOW)),
                )
            }
            LightSlot::Spot(index) => {
                let light = queue.spot_lights().get(index)?;
                (
                    LightConstants::spot(light),
                    BaseShaderFlags::SPOT_LIGHT,
                    shadows
                        .get(ShadowKind::Single, light.shadow_map_index)
                        .map(|map| (map, BaseShaderFlags::empty())),
                )
            }
            LightSlot::Volumetric(_) => return None,
        };
        if let Some((map, technique)) = shadow {
            map.bind(self.gpu);
            flags |= BaseShaderFlags::SHADOWED | technique;
        }
        self.lights.bind(self.gpu, slot, &constants);
        Some(flags)
    }

    /// The shadow map of a light, if it got one this frame.
    pub fn shadow_map(&self, kind: ShadowKind, shadow_map_index: i32) -> Option<&ShadowMapBinding> {
        self.shadows.get(kind, shadow_map_index)
    }

    /// Checks out an intermediate buffer.
    pub fn request_buffer(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Option<Arc<IntermediateBuffer>> {
        self.pool.request(self.gpu, width, height, format, 1)
    }

    /// Returns an intermediate buffer.
    pub fn release_buffer(&mut self, buffer: Arc<IntermediateBuffer>) {
        self.pool.release(buffer);
    }

    /// Draws the translucent bucket back to front, unlit, over the scene.
    pub fn draw_translucent_entries(&mut self) {
        let queue = self.queue;
        if queue.translucent_entries().is_empty() {
            return;
        }
        self.bind_scene_targets();
        self.gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
        self.gpu.set_rasterizer_state(RasterizerState::CullBack);
        for entry in queue.translucent_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            let blend = match entry.material.as_ref().map(|m| m.blend_mode()) {
                Some(BlendMode::Additive) => BlendState::Additive,
                _ => BlendState::AlphaBlend,
            };
            self.gpu.set_blend_state(blend);
            if self.draw_entry(entry, BaseShader::new(BaseShaderType::Unlit)) {
                self.stats.translucent_drawn += 1;
            }
        }
        self.gpu.set_blend_state(BlendState::Opaque);
        self.gpu.set_depth_stencil_state(DepthStencilState::Default);
    }

    /// Draws the post-process bucket.
    ///
    /// Each entry gets its own snapshot of scene color and depth, bound at
    /// [`SCREEN_INPUT_SLOT`] and the slot after, so it can sample the scene
    /// it is drawn over. An entry whose snapshot cannot be allocated is
    /// skipped.
    pub fn draw_post_process_entries(&mut self) {
        let queue = self.queue;
        let (width, height) = (self.targets.width, self.targets.height);
        for entry in queue.post_process_entries() {
            if !entry.is_in_pass(RenderPassMask::BASE) {
                continue;
            }
            let Some(color) = self.request_buffer(width, height, self.targets.color_format) else {
                log::debug!("WorldRenderer: no scene color snapshot, post-process entry skipped");
                self.stats.skipped_draws += 1;
                continue;
            };
            let Some(depth) = self.request_buffer(width, height, SCENE_DEPTH_FORMAT) else {
                log::debug!("WorldRenderer: no scene depth snapshot, post-process entry skipped");
                self.release_buffer(color);
                self.stats.skipped_draws += 1;
                continue;
            };

            self.gpu.copy_texture(self.targets.color_texture, color.texture);
            self.gpu.copy_texture(self.targets.depth_texture, depth.texture);
            self.bind_scene_targets();
            self.gpu.set_texture(SCREEN_INPUT_SLOT, Some(color.texture));
            self.gpu.set_texture(SCREEN_INPUT_SLOT + 1, Some(depth.texture));
            self.gpu.set_blend_state(BlendState::Opaque);
            self.gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
            if self.draw_entry(entry, BaseShader::new(BaseShaderType::Unlit)) {
                self.stats.post_process_drawn += 1;
            }
            self.gpu.set_texture(SCREEN_INPUT_SLOT, None);
            self.gpu.set_texture(SCREEN_INPUT_SLOT + 1, None);

            self.release_buffer(color);
            self.release_buffer(depth);
        }
        self.gpu.set_depth_stencil_state(DepthStencilState::Default);
    }

    fn begin(&mut self, depth_prepass: bool) {
        // The context may be a fresh deferred one.
        self.selector.invalidate();
        self.selector.set_global_flags(self.global_flags);
        self.lights.invalidate();
        self.bind_scene_targets();
        if depth_prepass {
            draw_depth_prepass(self.gpu, self.selector, self.camera, self.queue, self.stats);
        }
    }
}

#[derive(Debug)]
struct SceneServices {
    options: RendererOptions,
    global_flags: GlobalShaderFlags,
    programs: Arc<ShaderProgramCache>,
    queue: RenderQueue,
    selector: ShaderProgramSelector,
    pool: IntermediateBufferPool,
    lights: LightBindingCache,
}

impl SceneServices {
    fn frame<'a>(
        &'a mut self,
        gpu: &'a mut dyn GpuContext,
        camera: &'a Camera,
        shadows: &'a FrameShadows,
        targets: &'a SceneTargets,
        stats: &'a mut RenderStats,
    ) -> SceneFrame<'a> {
        SceneFrame {
            gpu,
            camera,
            options: &self.options,
            global_flags: self.global_flags,
            queue: &self.queue,
            selector: &mut self.selector,
            pool: &mut self.pool,
            lights: &mut self.lights,
            shadows,
            targets,
            stats,
        }
    }
}

fn add_shadow_stats(stats: &mut RenderStats, drawn: ShadowDrawStats) {
    stats.draw_calls += drawn.draws;
    stats.skipped_draws += drawn.skipped;
}

/// Runs the frame skeleton and owns the services shared by its steps.
#[derive(Debug)]
pub struct WorldRenderer {
    services: SceneServices,
    shadows: ShadowRenderers,
    occlusion: OcclusionCuller,
    scheduler: CommandListScheduler,
    single_shadow_cameras: Vec<Camera>,
    stats: RenderStats,
    frame_number: u64,
    initialized: bool,
}

impl WorldRenderer {
    /// Creates the services from `options`. `extra_flags` are added to the
    /// global shader flags the options imply.
    pub fn new(
        options: RendererOptions,
        library: Arc<dyn ShaderLibrary>,
        extra_flags: GlobalShaderFlags,
    ) -> Self {
        let programs = Arc::new(ShaderProgramCache::new(library));
        let global_flags = options.global_shader_flags() | extra_flags;
        let mut selector = ShaderProgramSelector::new(programs.clone());
        selector.set_global_flags(global_flags);
        Self {
            shadows: ShadowRenderers::new(&options, programs.clone()),
            occlusion: OcclusionCuller::new(
                options.occlusion_culling,
                options.occlusion_objects_per_batch,
            ),
            scheduler: CommandListScheduler::new(),
            single_shadow_cameras: Vec::new(),
            stats: RenderStats::default(),
            frame_number: 0,
            initialized: false,
            services: SceneServices {
                options,
                global_flags,
                programs,
                queue: RenderQueue::new(),
                selector,
                pool: IntermediateBufferPool::new(),
                lights: LightBindingCache::new(),
            },
        }
    }

    /// Validates the options, checks that every program in `required` exists
    /// and creates the occlusion buffers.
    ///
    /// ## Errors
    ///
    /// `RenderError::InitializationFailed` naming the rejected option, the
    /// first missing program, or the buffer that could not be created.
    pub fn initialize(
        &mut self,
        gpu: &mut dyn GpuContext,
        required: &[ShaderProgramKey],
    ) -> Result<(), RenderError> {
        self.services
            .options
            .validate()
            .map_err(|err| RenderError::InitializationFailed(err.to_string()))?;
        let flags = self.services.global_flags;
        let mut keys = vec![ShaderProgramKey {
            global_flags: flags,
            base_shader: BaseShader::new(BaseShaderType::DepthOnly),
            vertex_factory: VertexFactoryDesc::STATIC_MESH,
            material_shader: None,
            static_switch_mask: 0,
        }];
        if self.occlusion.is_enabled() {
            keys.push(ShaderProgramKey {
                vertex_factory: VertexFactoryDesc::DEBUG_GEOMETRY,
                base_shader: BaseShader::new(BaseShaderType::OcclusionBox),
                ..keys[0]
            });
        }
        keys.extend_from_slice(required);
        for key in &keys {
            self.services.programs.require(key)?;
        }

        self.occlusion.initialize(gpu).map_err(|err| {
            RenderError::InitializationFailed(format!("occlusion culling buffers: {err}"))
        })?;
        self.initialized = true;
        log::debug!(
            "WorldRenderer: initialized with {} required programs",
            keys.len()
        );
        Ok(())
    }

    /// Returns `true` once [`initialize`](Self::initialize) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The options the renderer was built with.
    pub fn options(&self) -> &RendererOptions {
        &self.services.options
    }

    /// Frame-wide shader switches.
    pub fn global_flags(&self) -> GlobalShaderFlags {
        self.services.global_flags
    }

    /// The shared program cache.
    pub fn programs(&self) -> &Arc<ShaderProgramCache> {
        &self.services.programs
    }

    /// The queue as filled by the last frame.
    pub fn queue(&self) -> &RenderQueue {
        &self.services.queue
    }

    /// The intermediate buffer pool.
    pub fn pool(&self) -> &IntermediateBufferPool {
        &self.services.pool
    }

    /// The shadow renderers.
    pub fn shadows(&self) -> &ShadowRenderers {
        &self.shadows
    }

    /// The occlusion culler.
    pub fn occlusion(&self) -> &OcclusionCuller {
        &self.occlusion
    }

    /// Statistics of the last frame.
    pub fn render_stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Draws a single shadow map from `camera` during the next frame.
    pub fn request_single_shadow(&mut self, camera: Camera) {
        self.single_shadow_cameras.push(camera);
    }

    /// Renders one frame into `output`.
    ///
    /// Per-draw and per-effect failures are logged and skipped; the frame
    /// always completes.
    ///
    /// ## Errors
    ///
    /// `RenderError::NotInitialized` before a successful
    /// [`initialize`](Self::initialize).
    pub fn render_frame(
        &mut self,
        passes: &mut dyn ScenePasses,
        compositing: Option<&mut CompositingStage>,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        camera: &Camera,
        output: &OutputTarget,
    ) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        let started = Instant::now();
        let mut stats = RenderStats {
            frame_number: self.frame_number,
            ..RenderStats::default()
        };
        self.frame_number += 1;

        // 1. Fill the queue.
        let queue = &mut self.services.queue;
        queue.clear();
        fill_queue(world, camera, queue);
        queue.sort();

        // 2. Shadow maps.
        let single_cameras = std::mem::take(&mut self.single_shadow_cameras);
        let jobs = if passes.draws_shadows() {
            self.shadows
                .prepare_jobs(gpu, camera, &mut self.services.queue, &single_cameras)
        } else {
            ShadowJobs::default()
        };
        stats.directional_shadow_maps = jobs.cascaded.len() as u32;
        stats.point_shadow_maps = jobs.cube.len() as u32;
        stats.spot_shadow_maps = jobs.single.len() as u32;
        let frame_shadows = self.shadows.bindings();
        let threaded = self.services.options.multithreaded_rendering
            && gpu.supports_command_lists()
            && !jobs.is_empty();
        if !threaded {
            add_shadow_stats(&mut stats, self.shadows.render_jobs(gpu, world, &jobs));
        }

        let hdr_format = compositing
            .is_some()
            .then_some(self.services.options.scene_color_format);
        let Some(targets) = SceneTargets::acquire(gpu, &mut self.services.pool, output, hdr_format)
        else {
            log::error!(
                "WorldRenderer: no scene depth buffer, scene of frame {} skipped",
                stats.frame_number
            );
            self.finish_frame(stats, started);
            return Ok(());
        };

        // 3. Occlusion culling.
        let prepass_done = self.draw_occlusion(gpu, camera, &targets, &mut stats);
        let depth_prepass = passes.wants_depth_prepass() && !prepass_done;

        // 4. Scene passes.
        if threaded {
            self.draw_scene_threaded(
                passes,
                gpu,
                world,
                camera,
                (&targets, &frame_shadows, &jobs),
                depth_prepass,
                &mut stats,
            );
        } else {
            let mut frame = self
                .services
                .frame(gpu, camera, &frame_shadows, &targets, &mut stats);
            frame.begin(depth_prepass);
            passes.draw_scene(&mut frame);
        }

        // 5. Composite.
        self.services.selector.invalidate();
        self.services.lights.invalidate();
        if let (Some(stage), Some(scene_color)) = (compositing, targets.hdr()) {
            stage.compose(
                gpu,
                &mut self.services.pool,
                &mut self.services.selector,
                scene_color,
                output,
                &mut stats,
            );
        }

        // 6. Debug overlays.
        DebugOverlay {
            options: &self.services.options.debug,
            camera,
            queue: &self.services.queue,
            pool: &self.services.pool,
            output,
        }
        .draw(gpu, &mut self.services.selector, &mut stats);

        targets.release(&mut self.services.pool);
        self.finish_frame(stats, started);
        Ok(())
    }

    fn draw_occlusion(
        &mut self,
        gpu: &mut dyn GpuContext,
        camera: &Camera,
        targets: &SceneTargets,
        stats: &mut RenderStats,
    ) -> bool {
        gpu.set_render_targets(&[targets.color_view], Some(targets.depth_view));
        gpu.set_viewport(&Viewport::from_size(targets.width, targets.height));
        gpu.clear_render_target(targets.color_view, CLEAR_BLACK);
        gpu.clear_depth_stencil(targets.depth_view, DepthClear::FAR);

        let services = &mut self.services;
        if !self.occlusion.is_enabled() || services.queue.occluders().is_empty() {
            return false;
        }

        // Boxes are tested against scene depth, so the prepass runs here.
        ViewConstants::new(camera, targets.width, targets.height).upload(gpu);
        services.selector.invalidate();
        services.selector.set_global_flags(services.global_flags);
        draw_depth_prepass(gpu, &mut services.selector, camera, &services.queue, stats);

        let result = self
            .occlusion
            .run(gpu, &mut services.selector, camera, &mut services.queue);
        stats.occluders_tested = result.tested;
        stats.draw_calls += result.tested;
        if self.occlusion.mode() == OcclusionCullingMode::Blocking {
            stats.occlusion_culled = result.culled;
        }
        gpu.set_blend_state(BlendState::Opaque);
        gpu.set_depth_stencil_state(DepthStencilState::Default);
        gpu.set_rasterizer_state(RasterizerState::CullBack);
        true
    }

    /// Records shadow jobs on worker threads and the scene on the render
    /// thread, then executes shadows before the scene.
    #[allow(clippy::too_many_arguments)]
    fn draw_scene_threaded(
        &mut self,
        passes: &mut dyn ScenePasses,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        camera: &Camera,
        (targets, frame_shadows, jobs): (&SceneTargets, &FrameShadows, &ShadowJobs),
        depth_prepass: bool,
        stats: &mut RenderStats,
    ) {
        let Self {
            services,
            shadows,
            scheduler,
            ..
        } = self;
        let scheduler = &*scheduler;
        let mut shadow_stats = ShadowDrawStats::default();

        std::thread::scope(|scope| {
            let mut workers = Vec::new();
            for (mut worker, jobs) in shadows.workers(jobs) {
                if jobs.is_empty() {
                    continue;
                }
                let mut context = match gpu.create_deferred_context() {
                    Ok(context) => context,
                    Err(err) => {
                        log::warn!(
                            "WorldRenderer: no deferred context for {} shadows, drawing inline: {err}",
                            worker.label()
                        );
                        shadow_stats += worker.render_jobs(gpu, world, jobs);
                        continue;
                    }
                };
                let reservation = scheduler.reserve_secondary();
                workers.push(scope.spawn(move || {
                    let drawn = worker.render_jobs(context.as_mut(), world, jobs);
                    match context.finish_command_list() {
                        Ok(list) => reservation.submit(list),
                        Err(err) => {
                            log::error!("WorldRenderer: {} shadow list lost: {err}", worker.label())
                        }
                    }
                    drawn
                }));
            }

            match gpu.create_deferred_context() {
                Ok(mut context) => {
                    let mut frame =
                        services.frame(context.as_mut(), camera, frame_shadows, targets, stats);
                    frame.begin(depth_prepass);
                    passes.draw_scene(&mut frame);
                    match context.finish_command_list() {
                        Ok(list) => scheduler.push_primary(list),
                        Err(err) => log::error!("WorldRenderer: scene list lost: {err}"),
                    }
                    scheduler.execute_render_passes(gpu);
                }
                Err(err) => {
                    log::warn!("WorldRenderer: recording the scene inline: {err}");
                    scheduler.execute_render_passes(gpu);
                    let mut frame = services.frame(gpu, camera, frame_shadows, targets, stats);
                    frame.begin(depth_prepass);
                    passes.draw_scene(&mut frame);
                }
            }

            for worker in workers {
                match worker.join() {
                    Ok(drawn) => shadow_stats += drawn,
                    Err(_) => log::error!("WorldRenderer: a shadow worker panicked"),
                }
            }
        });
        add_shadow_stats(stats, shadow_stats);
    }

    fn finish_frame(&mut self, mut stats: RenderStats, started: Instant) {
        stats.intermediate_buffers_allocated = self.services.pool.len() as u32;
        stats.cpu_frame_time_ms = started.elapsed().as_secs_f32() * 1000.0;
        log::trace!(
            "WorldRenderer: frame {} drew {} calls, skipped {}",
            stats.frame_number,
            stats.draw_calls,
            stats.skipped_draws
        );
        self.stats = stats;
    }

    /// Resets per-frame state: GPU bindings, the bound program and light,
    /// shadow maps and occlusion queries.
    pub fn on_frame_complete(&mut self, gpu: &mut dyn GpuContext) {
        gpu.clear_state();
        self.services.selector.invalidate();
        self.services.lights.reset();
        self.shadows.end_frame();
        self.occlusion.end_frame();
    }

    /// Destroys every GPU resource the services own.
    pub fn shutdown(&mut self, gpu: &mut dyn GpuContext) {
        self.shadows.release_all(gpu);
        self.occlusion.release(gpu);
        self.services.pool.release_all(gpu);
        self.initialized = false;
    }
}
