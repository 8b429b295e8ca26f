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

//! Builds frame renderers by kind.

use std::sync::Arc;

use ember_core::renderer::{GpuContext, RenderError, RendererOptions, ShaderLibrary};
use ember_lanes::render_lane::{
    DeferredRenderer, ForwardRenderer, FrameRenderer, MobileRenderer, RendererKind,
    SingleShaderRenderer,
};

/// Builds an uninitialized renderer of `kind`.
pub fn build_renderer(
    kind: RendererKind,
    options: RendererOptions,
    library: Arc<dyn ShaderLibrary>,
) -> Box<dyn FrameRenderer> {
    match kind {
        RendererKind::Forward => Box::new(ForwardRenderer::new(options, library)),
        RendererKind::Deferred => Box::new(DeferredRenderer::new(options, library)),
        RendererKind::Mobile => Box::new(MobileRenderer::new(options, library)),
        RendererKind::DebugNormals => {
            Box::new(SingleShaderRenderer::debug_normals(options, library))
        }
        RendererKind::FullBright => Box::new(SingleShaderRenderer::full_bright(options, library)),
    }
}

/// Builds and initializes a renderer of `kind`.
///
/// ## Errors
///
/// The initialization error of the renderer. Whatever it created before
/// failing is released.
pub fn create_renderer(
    kind: RendererKind,
    options: RendererOptions,
    library: Arc<dyn ShaderLibrary>,
    gpu: &mut dyn GpuContext,
) -> Result<Box<dyn FrameRenderer>, RenderError> {
    let mut renderer = build_renderer(kind, options, library);
    match renderer.initialize(gpu) {
        Ok(()) => {
            log::info!("RenderAgent: {} renderer ready", renderer.renderer_name());
            Ok(renderer)
        }
        Err(err) => {
            log::error!("RenderAgent: {kind} renderer failed to initialize: {err}");
            renderer.shutdown(gpu);
            Err(err)
        }
    }
}

/// Like [`create_renderer`], but on failure tries once more with a forward
/// renderer and [`RendererOptions::conservative`].
///
/// ## Errors
///
/// The error of the fallback attempt if it fails too.
pub fn create_renderer_with_fallback(
    kind: RendererKind,
    options: RendererOptions,
    library: Arc<dyn ShaderLibrary>,
    gpu: &mut dyn GpuContext,
) -> Result<Box<dyn FrameRenderer>, RenderError> {
    match create_renderer(kind, options, Arc::clone(&library), gpu) {
        Ok(renderer) => Ok(renderer),
        Err(err) => {
            log::warn!("RenderAgent: falling back to a conservative forward renderer after: {err}");
            create_renderer(
                RendererKind::Forward,
                RendererOptions::conservative(),
                library,
                gpu,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::renderer::BaseShaderType;
    use ember_infra::{HeadlessGpuContext, InMemoryShaderLibrary};

    #[test]
    fn builds_every_kind() {
        let library = Arc::new(InMemoryShaderLibrary::new());
        for kind in RendererKind::ALL {
            let renderer = build_renderer(kind, RendererOptions::default(), library.clone());
            assert_eq!(renderer.kind(), kind);
        }
    }

    #[test]
    fn falls_back_to_conservative_forward() {
        let mut gpu = HeadlessGpuContext::new();
        let library = Arc::new(InMemoryShaderLibrary::new());
        library.deny_base_shader(BaseShaderType::DeferredAmbient);
        let renderer = create_renderer_with_fallback(
            RendererKind::Deferred,
            RendererOptions::default(),
            library,
            &mut gpu,
        )
        .unwrap();
        assert_eq!(renderer.kind(), RendererKind::Forward);
        assert_eq!(
            renderer.world_renderer().options(),
            &RendererOptions::conservative()
        );
    }

    #[test]
    fn invalid_options_fall_back_instead_of_rendering() {
        let mut gpu = HeadlessGpuContext::new();
        let library = Arc::new(InMemoryShaderLibrary::new());
        let options = RendererOptions {
            cascade_count: 0,
            ..RendererOptions::default()
        };
        assert!(matches!(
            create_renderer(RendererKind::Forward, options.clone(), library.clone(), &mut gpu),
            Err(RenderError::InitializationFailed(_))
        ));

        let renderer =
            create_renderer_with_fallback(RendererKind::Forward, options, library, &mut gpu).unwrap();
        assert_eq!(
            renderer.world_renderer().options(),
            &RendererOptions::conservative()
        );
        assert!(renderer.world_renderer().is_initialized());
    }

    #[test]
    fn fallback_is_tried_only_once() {
        let mut gpu = HeadlessGpuContext::new();
        let library = Arc::new(InMemoryShaderLibrary::new());
        library.deny_base_shader(BaseShaderType::DepthOnly);
        let result = create_renderer_with_fallback(
            RendererKind::Forward,
            RendererOptions::default(),
            library.clone(),
            &mut gpu,
        );
        assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
    }
}
