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

//! The render lane: everything the render thread runs per frame.

pub mod compositing;
pub mod constants;
pub mod debug_overlay;
pub mod deferred_renderer;
pub mod forward_renderer;
pub mod mobile_renderer;
pub mod program_cache;
pub mod proxies;
pub mod queue;
pub mod scene;
pub mod shader_selector;
pub mod shadow;
pub mod single_shader_renderer;
pub mod world;

pub use self::compositing::{ComposePath, CompositingRenderer, CompositingStage};
pub use self::deferred_renderer::{DeferredPasses, DeferredRenderer};
pub use self::forward_renderer::{ForwardPasses, ForwardRenderer};
pub use self::mobile_renderer::{MobilePasses, MobileRenderer};
pub use self::program_cache::ShaderProgramCache;
pub use self::proxies::{LightProxy, MeshBuffers, MeshProxy};
pub use self::queue::{
    DebugInfoEntry, LightEntry, OccluderEntry, RenderPassMask, RenderQueue, RenderableEntry,
};
pub use self::scene::{fill_queue, ProxyId, RenderProxy, RenderWorld, SceneList};
pub use self::shader_selector::{SelectorDirty, ShaderProgramSelector};
pub use self::single_shader_renderer::{SingleShaderPasses, SingleShaderRenderer};
pub use self::world::{ScenePasses, SceneFrame, WorldRenderer};

use std::fmt;
use std::str::FromStr;

use ember_core::renderer::{
    Camera, GpuContext, RenderError, RenderStats, RenderTargetViewId, TextureFormat, TextureId,
};

/// The render target a frame ends up in, usually the swap-chain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTarget {
    /// The output texture.
    pub texture: TextureId,
    /// Its render-target view.
    pub view: RenderTargetViewId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Texel format.
    pub format: TextureFormat,
}

/// The frame renderers the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    /// Forward shading with per-light passes.
    Forward,
    /// Deferred shading through a G-buffer.
    Deferred,
    /// Forward shading with one directional light folded into the base pass.
    Mobile,
    /// View-space normals, no lighting.
    DebugNormals,
    /// Unlit diffuse color.
    FullBright,
}

impl RendererKind {
    /// Every kind, in factory order.
    pub const ALL: [RendererKind; 5] = [
        RendererKind::Forward,
        RendererKind::Deferred,
        RendererKind::Mobile,
        RendererKind::DebugNormals,
        RendererKind::FullBright,
    ];

    /// Lower-case name, as accepted by [`FromStr`].
    pub const fn name(&self) -> &'static str {
        match self {
            RendererKind::Forward => "forward",
            RendererKind::Deferred => "deferred",
            RendererKind::Mobile => "mobile",
            RendererKind::DebugNormals => "debug-normals",
            RendererKind::FullBright => "full-bright",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        RendererKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown renderer '{s}'"))
    }
}

/// A complete frame renderer, as driven by the render thread.
///
/// Implementations compose a [`WorldRenderer`] with their own scene passes.
pub trait FrameRenderer: Send {
    /// Which renderer this is.
    fn kind(&self) -> RendererKind;

    /// Name used in log lines.
    fn renderer_name(&self) -> &'static str;

    /// Creates the renderer's GPU resources and checks its programs.
    ///
    /// ## Errors
    ///
    /// `RenderError::InitializationFailed` if a required program or buffer is
    /// missing. The renderer is unusable afterwards.
    fn initialize(&mut self, gpu: &mut dyn GpuContext) -> Result<(), RenderError>;

    /// Renders `world` as seen from `camera` into `output`.
    ///
    /// ## Errors
    ///
    /// `RenderError::NotInitialized` before a successful `initialize`.
    fn draw_world(
        &mut self,
        gpu: &mut dyn GpuContext,
        world: &dyn RenderWorld,
        camera: &Camera,
        output: &OutputTarget,
    ) -> Result<(), RenderError>;

    /// The shared frame skeleton.
    fn world_renderer(&self) -> &WorldRenderer;

    /// The shared frame skeleton, mutably.
    fn world_renderer_mut(&mut self) -> &mut WorldRenderer;

    /// Statistics of the last frame.
    fn render_stats(&self) -> &RenderStats {
        self.world_renderer().render_stats()
    }

    /// Resets per-frame state once the frame is presented.
    fn on_frame_complete(&mut self, gpu: &mut dyn GpuContext) {
        self.world_renderer_mut().on_frame_complete(gpu);
    }

    /// Releases every GPU resource.
    fn shutdown(&mut self, gpu: &mut dyn GpuContext);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_their_names() {
        for kind in RendererKind::ALL {
            assert_eq!(kind.name().parse::<RendererKind>(), Ok(kind));
        }
        assert_eq!("Full_Bright".parse::<RendererKind>(), Ok(RendererKind::FullBright));
        assert!("raytraced".parse::<RendererKind>().is_err());
    }
}
