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

//! Tone mapping and bloom, from the HDR scene color to the output.
//!
//! The bloom chain works on a quarter-resolution copy of the bright parts of
//! the scene:
//!
//! 1. luminance extraction,
//! 2. bright pass,
//! 3. three steps of downsample followed by a separable gaussian blur,
//! 4. upsample-accumulate back up the chain,
//! 5. tone map of scene color plus bloom into the output.
//!
//! Each level degrades to the next: without bloom a direct tone map is used,
//! without a tone-map program the scene color is copied.

use std::sync::Arc;

use ember_core::renderer::{
    BaseShader, BaseShaderType, BlendState, Camera, DepthStencilState, GlobalShaderFlags,
    GpuContext, RasterizerState, RenderError, RenderStats, RendererOptions, ShaderLibrary,
    TextureFormat, ToneMapOptions, VertexFactoryDesc, Viewport,
};

use super::constants::{PostProcessConstants, SCREEN_INPUT_SLOT};
use super::scene::RenderWorld;
use super::shader_selector::ShaderProgramSelector;
use super::world::{IntermediateBuffer, IntermediateBufferPool, ScenePasses, WorldRenderer};
use super::{FrameRenderer, OutputTarget, RendererKind};

/// Number of downsample/blur steps in the bloom chain.
pub const BLOOM_STEPS: usize = 3;

/// Format of the luminance buffer.
pub const LUMINANCE_FORMAT: TextureFormat = TextureFormat::R32Float;

/// How the last frame reached the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposePath {
    /// Tone map with bloom.
    Bloom,
    /// Tone map of scene color alone.
    ToneMap,
    /// Plain copy of scene color.
    Copy,
}

fn bind_buffer(gpu: &mut dyn GpuContext, buffer: &IntermediateBuffer) {
    gpu.set_render_targets(&buffer.color_targets(), None);
    gpu.set_viewport(&Viewport::from_size(buffer.width, buffer.height));
}

fn size_of(buffer: &IntermediateBuffer) -> (u32, u32) {
    (buffer.width, buffer.height)
}

/// Draws one full-screen pass with `ty`. Returns `false`, counting a skipped
/// draw, if no program exists.
fn screen_pass(
    gpu: &mut dyn GpuContext,
    selector: &mut ShaderProgramSelector,
    ty: BaseShaderType,
    stats: &mut RenderStats,
) -> bool {
    selector.set_base_shader(BaseShader::new(ty));
    selector.set_vertex_factory(VertexFactoryDesc::SCREEN_QUAD);
    selector.set_material(None);
    if selector.make_active(gpu).is_none() {
        log::trace!("CompositingStage: no program for {ty:?}");
        stats.skipped_draws += 1;
        return false;
    }
    gpu.draw_fullscreen_quad();
    stats.draw_calls += 1;
    true
}

/// Consumes the HDR scene color and produces the final image.
#[derive(Debug, Clone)]
pub struct CompositingStage {
    tone_map: ToneMapOptions,
    bloom: bool,
    last_path: Option<ComposePath>,
}

impl CompositingStage {
    /// Creates the stage for `options`.
    pub fn new(options: &RendererOptions) -> Self {
        Self {
            tone_map: options.tone_map,
            bloom: options.bloom,
            last_path: None,
        }
    }

    /// Whether bloom is attempted.
    pub fn bloom_enabled(&self) -> bool {
        self.bloom
    }

    /// The path the last [`compose`](Self::compose) took.
    pub fn last_path(&self) -> Option<ComposePath> {
        self.last_path
    }

    fn params(&self) -> [f32; 4] {
        [
            self.tone_map.exposure,
            self.tone_map.bloom_threshold,
            self.tone_map.bloom_intensity,
            0.0,
        ]
    }

    /// Tone maps `scene_color` into `output`, with bloom if enabled.
    ///
    /// Every buffer taken from `pool` is returned before this returns.
    pub fn compose(
        &mut self,
        gpu: &mut dyn GpuContext,
        pool: &mut IntermediateBufferPool,
        selector: &mut ShaderProgramSelector,
        scene_color: &Arc<IntermediateBuffer>,
        output: &OutputTarget,
        stats: &mut RenderStats,
    ) -> ComposePath {
        gpu.set_blend_state(BlendState::Opaque);
        gpu.set_depth_stencil_state(DepthStencilState::Disabled);
        gpu.set_rasterizer_state(RasterizerState::CullNone);

        let mut path = None;
        if self.bloom {
            let mut held = Vec::new();
            if let Some(bloom) = self.draw_bloom(gpu, pool, selector, scene_color, &mut held, stats) {
                let bloom = held[bloom].clone();
                if self.draw_tone_map(gpu, selector, scene_color, Some(&bloom), output, stats) {
                    path = Some(ComposePath::Bloom);
                }
            } else {
                log::warn!("CompositingStage: bloom unavailable this frame, tone mapping without it");
            }
            for buffer in held {
                pool.release(buffer);
            }
        }

        let path = path.unwrap_or_else(|| {
            if self.draw_tone_map(gpu, selector, scene_color, None, output, stats) {
                ComposePath::ToneMap
            } else {
                log::warn!("CompositingStage: no tone-map program, copying scene color");
                gpu.copy_texture(scene_color.texture, output.texture);
                ComposePath::Copy
            }
        });

        gpu.set_texture(SCREEN_INPUT_SLOT, None);
        gpu.set_texture(SCREEN_INPUT_SLOT + 1, None);
        gpu.set_depth_stencil_state(DepthStencilState::Default);
        gpu.set_rasterizer_state(RasterizerState::CullBack);
        self.last_path = Some(path);
        path
    }

    /// Runs the bloom chain. Every buffer it takes is pushed to `held`;
    /// returns the index of the final bloom buffer there.
    fn draw_bloom(
        &self,
        gpu: &mut dyn GpuContext,
        pool: &mut IntermediateBufferPool,
        selector: &mut ShaderProgramSelector,
        scene_color: &Arc<IntermediateBuffer>,
        held: &mut Vec<Arc<IntermediateBuffer>>,
        stats: &mut RenderStats,
    ) -> Option<usize> {
        let scene_size = size_of(scene_color);
        let quarter = ((scene_size.0 / 4).max(1), (scene_size.1 / 4).max(1));
        let format = scene_color.format;
        let mut request = |gpu: &mut dyn GpuContext,
                           held: &mut Vec<Arc<IntermediateBuffer>>,
                           (width, height): (u32, u32),
                           format: TextureFormat| {
            let buffer = pool.request(gpu, width, height, format, 1)?;
            held.push(buffer);
            Some(held.len() - 1)
        };

        // 1. Luminance.
        let luminance = request(&mut *gpu, &mut *held, quarter, LUMINANCE_FORMAT)?;
        bind_buffer(gpu, &held[luminance]);
        gpu.set_texture(SCREEN_INPUT_SLOT, Some(scene_color.texture));
        PostProcessConstants::new(scene_size, quarter, self.params()).upload(gpu);
        if !screen_pass(gpu, selector, BaseShaderType::Luminance, stats) {
            return None;
        }

        // 2. Bright pass.
        let bright = request(&mut *gpu, &mut *held, quarter, format)?;
        bind_buffer(gpu, &held[bright]);
        gpu.set_texture(SCREEN_INPUT_SLOT + 1, Some(held[luminance].texture));
        if !screen_pass(gpu, selector, BaseShaderType::BrightPass, stats) {
            return None;
        }
        gpu.set_texture(SCREEN_INPUT_SLOT + 1, None);

        // 3. Downsample and blur.
        let mut chain = Vec::with_capacity(BLOOM_STEPS);
        let mut source = bright;
        for _ in 0..BLOOM_STEPS {
            let from = size_of(&held[source]);
            let to = ((from.0 / 2).max(1), (from.1 / 2).max(1));
            let down = request(&mut *gpu, &mut *held, to, format)?;
            let scratch = request(&mut *gpu, &mut *held, to, format)?;

            bind_buffer(gpu, &held[down]);
            gpu.set_texture(SCREEN_INPUT_SLOT, Some(held[source].texture));
            PostProcessConstants::new(from, to, self.params()).upload(gpu);
            if !screen_pass(gpu, selector, BaseShaderType::Downsample, stats) {
                return None;
            }

            PostProcessConstants::new(to, to, self.params()).upload(gpu);
            for (input, target, ty) in [
                (down, scratch, BaseShaderType::BlurHorizontal),
                (scratch, down, BaseShaderType::BlurVertical),
            ] {
                bind_buffer(gpu, &held[target]);
                gpu.set_texture(SCREEN_INPUT_SLOT, Some(held[input].texture));
                if !screen_pass(gpu, selector, ty, stats) {
                    return None;
                }
            }
            chain.push(down);
            source = down;
        }

        // 4. Upsample-accumulate, smallest level first, ending in the bright
        // pass buffer.
        gpu.set_blend_state(BlendState::Additive);
        let mut targets = vec![bright];
        targets.extend_from_slice(&chain);
        for pair in targets.windows(2).rev() {
            let (target, input) = (pair[0], pair[1]);
            bind_buffer(gpu, &held[target]);
            gpu.set_texture(SCREEN_INPUT_SLOT, Some(held[input].texture));
            PostProcessConstants::new(size_of(&held[input]), size_of(&held[target]), self.params())
                .upload(gpu);
            if !screen_pass(gpu, selector, BaseShaderType::Upsample, stats) {
                gpu.set_blend_state(BlendState::Opaque);
                return None;
            }
        }
        gpu.set_blend_state(BlendState::Opaque);
        gpu.set_texture(SCREEN_INPUT_SLOT, None);
        Some(bright)
    }

    fn draw_tone_map(
        &self,
        gpu: &mut dyn GpuContext,
        selector: &mut ShaderProgramSelector,
        scene_color: &IntermediateBuffer,
        bloom: Option<&Arc<IntermediateBuffer>>,
        output: &OutputTarget,
        stats: &mut RenderStats,
    ) -> bool {
        gpu.set_render_targets(&[output.view], None);
        gpu.set_viewport(&Viewport::from_size(output.width, output.height));
        gpu.set_blend_state(BlendState::Opaque);
        gpu.set_texture(SCREEN_INPUT_SLOT, Some(scene_color.texture));
        gpu.set_texture(SCREEN_INPUT_SLOT + 1, bloom.map(|buffer| buffer.texture));
        PostProcessConstants::new(size_of(scene_color), (output.width, output.height), self.params())
            .upload(gpu);
        let ty = if bloom.is_some() {
            BaseShaderType::ToneMap
        } else {
            BaseShaderType::ToneMapNoBloom
        };
        screen_pass(gpu, selector, ty, stats)
    }
}

/// A frame renderer made of the shared frame skeleton, a set of scene
/// passes and the compositing stage.
///
/// Every concrete renderer is one of these; they differ only in `P`.
#[derive(Debug)]
pub struct CompositingRenderer<P> {
    kind: RendererKind,
    world: WorldRenderer,
    passes: P,
    compositing: CompositingStage,
}

impl<P: ScenePasses> CompositingRenderer<P> {
    /// Builds a renderer drawing its scene with `passes`.
    pub fn with_passes(
        kind: RendererKind,
        options: RendererOptions,
        library: Arc<dyn ShaderLibrary>,
        extra_flags: GlobalShaderFlags,
        passes: P,
    ) -> Self {
        let compositing = CompositingStage::new(&options);
        Self {
            kind,
            world: WorldRenderer::new(options, library, extra_flags),
            passes,
            compositing,
        }
    }

    /// The scene passes.
    pub fn passes(&self) -> &P {
        &self.passes
    }

    /// The compositing stage.
    pub fn compositing(&self) -> &CompositingStage {
        &self.compositing
    }
}

impl<P: ScenePasses> FrameRenderer for CompositingRenderer<P> {
    fn kind(&self) -> RendererKind {
        self.kind
    }

    fn renderer_name(&self) -> &'static str {
        self.passes.name()
    }

    fn initialize(&mut self, gpu: &mut dyn GpuContext) -> Result<(), RenderError> {
        let required = self.passes.required_programs(self.world.global_flags());
        if let Err(err) = self.world.initialize(gpu, &required) {
            log::error!("{}: {err}", self.passes.name());
            return Err(err);
        }
        if let Err(err) = self.passes.initialize(gpu) {
            log::error!("{}: {err}", self.passes.name());
            self.world.shutdown(gpu);
            return Err(err);
        }
        log::info!(
            "{}: initialized with {:?}",
            self.passes.name(),
            self.world.global_flags()
        );
        Ok(())
    }

    fn draw_world(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        camera: &Camera,
        output: &OutputTarget,
    ) -> Result<(), RenderError> {
        self.world.render_frame(
            &mut self.passes,
            Some(&mut self.compositing),
            gpu,
            world,
            camera,
            output,
        )
    }

    fn world_renderer(&self) -> &WorldRenderer {
        &self.world
    }

    fn world_renderer_mut(&mut self) -> &mut WorldRenderer {
        &mut self.world
    }

    fn shutdown(&mut self, gpu: &mut dyn GpuContext) {
        self.passes.release(gpu);
        self.world.shutdown(gpu);
        log::debug!("{}: shut down", self.passes.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::program_cache::ShaderProgramCache;
    use ember_core::renderer::{TextureDescriptor, TextureUsage, TextureViewDescriptor};
    use ember_infra::{GpuCommand, HeadlessGpuContext, InMemoryShaderLibrary};

    struct Fixture {
        gpu: HeadlessGpuContext,
        library: Arc<InMemoryShaderLibrary>,
        selector: ShaderProgramSelector,
        pool: IntermediateBufferPool,
        scene_color: Arc<IntermediateBuffer>,
        output: OutputTarget,
    }

    fn fixture() -> Fixture {
        let mut gpu = HeadlessGpuContext::new();
        let library = Arc::new(InMemoryShaderLibrary::new());
        let selector = ShaderProgramSelector::new(Arc::new(ShaderProgramCache::new(library.clone())));
        let mut pool = IntermediateBufferPool::new();
        let scene_color = pool
            .request(&mut gpu, 256, 128, TextureFormat::Rgba16Float, 1)
            .expect("scene color");
        let texture = gpu
            .create_texture(&TextureDescriptor::d2(
                "output",
                256,
                128,
                TextureFormat::Rgba8UnormSrgb,
                1,
                TextureUsage::RENDER_TARGET | TextureUsage::COPY_DST,
            ))
            .expect("output texture");
        let view = gpu
            .create_render_target_view(texture, &TextureViewDescriptor::layer(0))
            .expect("output view");
        Fixture {
            gpu,
            library,
            selector,
            pool,
            scene_color,
            output: OutputTarget {
                texture,
                view,
                width: 256,
                height: 128,
                format: TextureFormat::Rgba8UnormSrgb,
            },
        }
    }

    fn draws_of(f: &Fixture, ty: BaseShaderType) -> usize {
        f.library
            .programs_for(ty)
            .into_iter()
            .map(|program| f.gpu.device().draws_with_program(program))
            .sum()
    }

    fn compose(f: &mut Fixture, stage: &mut CompositingStage) -> (ComposePath, RenderStats) {
        let mut stats = RenderStats::default();
        let path = stage.compose(
            &mut f.gpu,
            &mut f.pool,
            &mut f.selector,
            &f.scene_color,
            &f.output,
            &mut stats,
        );
        (path, stats)
    }

    #[test]
    fn bloom_chain_runs_three_steps() {
        let mut f = fixture();
        let mut stage = CompositingStage::new(&RendererOptions::default());
        assert!(stage.bloom_enabled());

        let (path, _) = compose(&mut f, &mut stage);
        assert_eq!(path, ComposePath::Bloom);
        assert_eq!(draws_of(&f, BaseShaderType::Luminance), 1);
        assert_eq!(draws_of(&f, BaseShaderType::BrightPass), 1);
        assert_eq!(draws_of(&f, BaseShaderType::Downsample), BLOOM_STEPS);
        assert_eq!(draws_of(&f, BaseShaderType::BlurHorizontal), BLOOM_STEPS);
        assert_eq!(draws_of(&f, BaseShaderType::BlurVertical), BLOOM_STEPS);
        assert_eq!(draws_of(&f, BaseShaderType::Upsample), BLOOM_STEPS);
        assert_eq!(draws_of(&f, BaseShaderType::ToneMap), 1);
        // Only the scene color stays checked out.
        assert_eq!(f.pool.in_use(), 1);
    }

    #[test]
    fn luminance_is_quarter_resolution() {
        let mut f = fixture();
        let mut stage = CompositingStage::new(&RendererOptions::default());
        compose(&mut f, &mut stage);
        let luminance = f
            .pool
            .buffers()
            .iter()
            .find(|buffer| buffer.format == LUMINANCE_FORMAT)
            .cloned()
            .expect("luminance buffer");
        assert_eq!((luminance.width, luminance.height), (64, 32));
    }

    #[test]
    fn failed_allocation_falls_back_to_plain_tone_map() {
        let mut f = fixture();
        f.gpu.device().fail_textures_with_format(LUMINANCE_FORMAT);
        let mut stage = CompositingStage::new(&RendererOptions::default());

        let (path, _) = compose(&mut f, &mut stage);
        assert_eq!(path, ComposePath::ToneMap);
        assert_eq!(draws_of(&f, BaseShaderType::ToneMapNoBloom), 1);
        assert_eq!(draws_of(&f, BaseShaderType::ToneMap), 0);
        assert_eq!(f.pool.in_use(), 1);
    }

    #[test]
    fn missing_tone_map_copies_scene_color() {
        let mut f = fixture();
        f.library.deny_base_shader(BaseShaderType::ToneMapNoBloom);
        let options = RendererOptions {
            bloom: false,
            ..RendererOptions::default()
        };
        let mut stage = CompositingStage::new(&options);

        let (path, stats) = compose(&mut f, &mut stage);
        assert_eq!(path, ComposePath::Copy);
        assert_eq!(stage.last_path(), Some(ComposePath::Copy));
        assert_eq!(stats.skipped_draws, 1);
        let copies: Vec<_> = f
            .gpu
            .device()
            .commands()
            .into_iter()
            .filter(|c| matches!(c, GpuCommand::CopyTexture { .. }))
            .collect();
        assert_eq!(
            copies,
            vec![GpuCommand::CopyTexture {
                src: f.scene_color.texture,
                dst: f.output.texture,
            }]
        );
    }
}
