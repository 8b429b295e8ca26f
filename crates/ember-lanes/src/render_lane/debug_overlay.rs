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

//! Debug overlays drawn straight into the output after compositing.

use ember_core::renderer::{
    BaseShader, BaseShaderType, BlendState, Camera, DebugOverlayOptions, DepthStencilState,
    GpuContext, RasterizerState, RenderStats, VertexFactoryDesc, Viewport,
};

use super::constants::{ViewConstants, SCREEN_INPUT_SLOT};
use super::queue::RenderQueue;
use super::shader_selector::ShaderProgramSelector;
use super::world::{draw_entry, IntermediateBufferPool};
use super::OutputTarget;

/// Splits a `width` x `height` target into `count` equal cells, row by row,
/// in a grid as close to square as possible.
pub fn thumbnail_grid(count: usize, width: u32, height: u32) -> Vec<Viewport> {
    if count == 0 {
        return Vec::new();
    }
    let columns = (count as f32).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);
    let cell_width = width as f32 / columns as f32;
    let cell_height = height as f32 / rows as f32;
    (0..count)
        .map(|index| Viewport {
            x: (index % columns) as f32 * cell_width,
            y: (index / columns) as f32 * cell_height,
            width: cell_width,
            height: cell_height,
            min_depth: 0.0,
            max_depth: 1.0,
        })
        .collect()
}

/// The overlays of one frame.
#[derive(Debug)]
pub struct DebugOverlay<'a> {
    /// Which overlays to draw.
    pub options: &'a DebugOverlayOptions,
    /// The view.
    pub camera: &'a Camera,
    /// The frame's queue.
    pub queue: &'a RenderQueue,
    /// Buffers shown in the thumbnail grid.
    pub pool: &'a IntermediateBufferPool,
    /// Where the overlays go.
    pub output: &'a OutputTarget,
}

impl DebugOverlay<'_> {
    /// Returns `true` if any overlay is switched on.
    pub fn is_active(&self) -> bool {
        self.options.wireframe || self.options.intermediate_buffers || self.options.object_debug_info
    }

    /// Draws every enabled overlay.
    pub fn draw(
        &self,
        gpu: &mut dyn GpuContext,
        selector: &mut ShaderProgramSelector,
        stats: &mut RenderStats,
    ) {
        if !self.is_active() {
            return;
        }
        let full = Viewport::from_size(self.output.width, self.output.height);
        gpu.set_render_targets(&[self.output.view], None);
        gpu.set_viewport(&full);
        gpu.set_blend_state(BlendState::Opaque);
        gpu.set_depth_stencil_state(DepthStencilState::Disabled);
        ViewConstants::new(self.camera, self.output.width, self.output.height).upload(gpu);

        if self.options.wireframe {
            gpu.set_rasterizer_state(RasterizerState::Wireframe);
            let wireframe = BaseShader::new(BaseShaderType::Wireframe);
            for entry in self.queue.opaque_entries() {
                draw_entry(gpu, selector, self.camera, entry, wireframe, false, stats);
            }
        }

        if self.options.object_debug_info && !self.queue.debug_info_objects().is_empty() {
            gpu.set_rasterizer_state(RasterizerState::Wireframe);
            selector.set_base_shader(BaseShader::new(BaseShaderType::Wireframe));
            selector.set_vertex_factory(VertexFactoryDesc::DEBUG_GEOMETRY);
            selector.set_material(None);
            if selector.make_active(gpu).is_some() {
                for object in self.queue.debug_info_objects() {
                    object.proxy.draw_debug_info(self.camera, gpu);
                    stats.draw_calls += 1;
                }
            } else {
                stats.skipped_draws += self.queue.debug_info_objects().len() as u32;
            }
        }

        if self.options.intermediate_buffers {
            gpu.set_rasterizer_state(RasterizerState::CullNone);
            let buffers = self.pool.buffers();
            for (buffer, cell) in buffers
                .iter()
                .zip(thumbnail_grid(buffers.len(), self.output.width, self.output.height))
            {
                gpu.set_viewport(&cell);
                gpu.set_texture(SCREEN_INPUT_SLOT, Some(buffer.texture));
                selector.set_base_shader(BaseShader::new(BaseShaderType::DebugThumbnail));
                selector.set_vertex_factory(VertexFactoryDesc::SCREEN_QUAD);
                selector.set_material(None);
                if selector.make_active(gpu).is_none() {
                    stats.skipped_draws += 1;
                    continue;
                }
                gpu.draw_fullscreen_quad();
                stats.draw_calls += 1;
            }
            gpu.set_texture(SCREEN_INPUT_SLOT, None);
            gpu.set_viewport(&full);
        }

        gpu.set_rasterizer_state(RasterizerState::CullBack);
        gpu.set_depth_stencil_state(DepthStencilState::Default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_close_to_square() {
        let cells = thumbnail_grid(5, 300, 200);
        assert_eq!(cells.len(), 5);
        // 3 columns, 2 rows.
        assert_eq!(cells[0].width, 100.0);
        assert_eq!(cells[0].height, 100.0);
        assert_eq!((cells[3].x, cells[3].y), (0.0, 100.0));
        assert_eq!((cells[4].x, cells[4].y), (100.0, 100.0));
    }

    #[test]
    fn empty_grid() {
        assert!(thumbnail_grid(0, 64, 64).is_empty());
        let single = thumbnail_grid(1, 64, 32);
        assert_eq!((single[0].width, single[0].height), (64.0, 32.0));
    }
}
