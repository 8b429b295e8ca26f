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

use ember_core::renderer::api::*;

/// One recorded GPU command.
///
/// Bulk data (constants, buffer contents) is reduced to its size; tests assert
/// on ordering and bindings, not on bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// `clear_state`.
    ClearState,
    /// `set_render_targets`.
    SetRenderTargets {
        /// Bound color views.
        colors: Vec<RenderTargetViewId>,
        /// Bound depth view.
        depth_stencil: Option<DepthStencilViewId>,
    },
    /// `clear_render_target`.
    ClearRenderTarget(RenderTargetViewId),
    /// `clear_depth_stencil`.
    ClearDepthStencil(DepthStencilViewId),
    /// `set_viewport`.
    SetViewport {
        /// Viewport width.
        width: u32,
        /// Viewport height.
        height: u32,
    },
    /// `set_blend_state`.
    SetBlendState(BlendState),
    /// `set_depth_stencil_state`.
    SetDepthStencilState(DepthStencilState),
    /// `set_rasterizer_state`.
    SetRasterizerState(RasterizerState),
    /// `bind_program`.
    BindProgram(ProgramId),
    /// `write_constants`.
    WriteConstants {
        /// Target slot.
        slot: ConstantSlot,
        /// Bytes written.
        size: usize,
    },
    /// `set_texture`.
    SetTexture {
        /// Shader slot.
        slot: u32,
        /// Bound texture.
        texture: Option<TextureId>,
    },
    /// `set_vertex_buffer`.
    SetVertexBuffer(BufferId),
    /// `set_index_buffer`.
    SetIndexBuffer(BufferId),
    /// `write_buffer_discard`.
    WriteBuffer {
        /// Target buffer.
        buffer: BufferId,
        /// Bytes written.
        size: usize,
    },
    /// `draw` or `draw_fullscreen_quad`.
    Draw {
        /// Vertices drawn.
        vertex_count: u32,
        /// Program bound at draw time.
        program: Option<ProgramId>,
        /// Predicate active at draw time.
        predicate: Option<QueryId>,
    },
    /// `draw_indexed`.
    DrawIndexed {
        /// Indices drawn.
        index_count: u32,
        /// First index.
        first_index: u32,
        /// Program bound at draw time.
        program: Option<ProgramId>,
        /// Predicate active at draw time.
        predicate: Option<QueryId>,
    },
    /// `begin_query`.
    BeginQuery(QueryId),
    /// `end_query`.
    EndQuery(QueryId),
    /// `set_predication`.
    SetPredication(Option<QueryId>),
    /// `copy_texture`.
    CopyTexture {
        /// Source.
        src: TextureId,
        /// Destination.
        dst: TextureId,
    },
    /// `execute_command_list`; the list's commands follow this marker.
    ExecuteCommandList(CommandListId),
}

impl GpuCommand {
    /// Returns `true` for draw commands.
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. })
    }

    /// The program a draw command used.
    pub fn draw_program(&self) -> Option<ProgramId> {
        match self {
            GpuCommand::Draw { program, .. } | GpuCommand::DrawIndexed { program, .. } => *program,
            _ => None,
        }
    }
}
