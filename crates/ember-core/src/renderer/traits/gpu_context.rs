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

use crate::math::Vec4;
use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use std::fmt::Debug;

/// The GPU capability interface the render core is written against.
///
/// A `GpuContext` is either the immediate context owned by the render thread or
/// a deferred context created from it, which records into a command list that
/// the immediate context later executes. Resource handles are shared between
/// an immediate context and its deferred contexts.
///
/// Binding and draw methods never fail: an invalid handle is a programmer error
/// that the backend reports through its own debug layer. Only creation returns
/// a [`ResourceError`].
pub trait GpuContext: Send + Debug {
    /// Creates a texture.
    /// ## Arguments
    /// * `descriptor` - Size, format, shape and usage of the texture.
    /// ## Errors
    /// * `ResourceError` - If the backend cannot allocate the texture.
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a texture. Views created from it must be destroyed first.
    fn destroy_texture(&mut self, id: TextureId);

    /// Creates a color attachment view of one subresource of `texture`.
    /// ## Errors
    /// * `ResourceError::UnsupportedFormat` - If the texture has a depth format.
    fn create_render_target_view(
        &mut self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<RenderTargetViewId, ResourceError>;

    /// Creates a depth-stencil attachment view of one subresource of `texture`.
    /// ## Errors
    /// * `ResourceError::UnsupportedFormat` - If the texture has a color format.
    fn create_depth_stencil_view(
        &mut self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<DepthStencilViewId, ResourceError>;

    /// Destroys a render-target view.
    fn destroy_render_target_view(&mut self, id: RenderTargetViewId);

    /// Destroys a depth-stencil view.
    fn destroy_depth_stencil_view(&mut self, id: DepthStencilViewId);

    /// Creates a buffer, optionally filled with `initial_data`.
    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a buffer.
    fn destroy_buffer(&mut self, id: BufferId);

    /// Maps a dynamic buffer with write-discard semantics and overwrites it
    /// from offset zero. Previous contents are lost.
    fn write_buffer_discard(&mut self, id: BufferId, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a query object.
    fn create_query(&mut self, kind: QueryKind) -> Result<QueryId, ResourceError>;

    /// Destroys a query object.
    fn destroy_query(&mut self, id: QueryId);

    /// Starts counting samples into `query`.
    fn begin_query(&mut self, query: QueryId);

    /// Stops counting samples into `query`.
    fn end_query(&mut self, query: QueryId);

    /// Polls `query` without blocking.
    fn try_get_query_result(&mut self, query: QueryId) -> QueryResult;

    /// Makes subsequent draws conditional on `query` having passed samples,
    /// or removes the condition when `None`.
    fn set_predication(&mut self, query: Option<QueryId>);

    /// Unbinds every resource and resets every state to its default.
    fn clear_state(&mut self);

    /// Binds color and depth attachments.
    fn set_render_targets(
        &mut self,
        colors: &[RenderTargetViewId],
        depth_stencil: Option<DepthStencilViewId>,
    );

    /// Clears a color attachment.
    fn clear_render_target(&mut self, view: RenderTargetViewId, color: Vec4);

    /// Clears a depth-stencil attachment.
    fn clear_depth_stencil(&mut self, view: DepthStencilViewId, clear: DepthClear);

    /// Sets the viewport.
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Binds one of the shared blend states.
    fn set_blend_state(&mut self, state: BlendState);

    /// Binds one of the shared depth-stencil states.
    fn set_depth_stencil_state(&mut self, state: DepthStencilState);

    /// Binds one of the shared rasterizer states.
    fn set_rasterizer_state(&mut self, state: RasterizerState);

    /// Binds a linked shader program.
    fn bind_program(&mut self, program: ProgramId);

    /// Uploads the contents of a constant-buffer slot.
    fn write_constants(&mut self, slot: ConstantSlot, data: &[u8]);

    /// Binds a texture to a shader resource slot, or unbinds the slot.
    fn set_texture(&mut self, slot: u32, texture: Option<TextureId>);

    /// Binds a vertex buffer.
    fn set_vertex_buffer(&mut self, buffer: BufferId, stride: u32);

    /// Binds an index buffer.
    fn set_index_buffer(&mut self, buffer: BufferId, format: IndexFormat);

    /// Draws non-indexed primitives.
    fn draw(&mut self, vertex_count: u32, first_vertex: u32);

    /// Draws indexed primitives.
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32);

    /// Draws the full-screen triangle generated from vertex ids.
    fn draw_fullscreen_quad(&mut self) {
        self.draw(3, 0);
    }

    /// Copies the full contents of `src` into `dst`. Both must match in size
    /// and format.
    fn copy_texture(&mut self, src: TextureId, dst: TextureId);

    /// Returns `true` if [`GpuContext::create_deferred_context`] is available.
    fn supports_command_lists(&self) -> bool;

    /// Creates a deferred context that records a command list.
    /// ## Errors
    /// * `ResourceError::Unsupported` - If the backend has no command lists.
    fn create_deferred_context(&mut self) -> Result<Box<dyn GpuContext>, ResourceError>;

    /// Closes the commands recorded on a deferred context into a list and
    /// starts a new empty recording.
    fn finish_command_list(&mut self) -> Result<CommandListId, ResourceError>;

    /// Plays a finished command list back on this context and releases it.
    fn execute_command_list(&mut self, list: CommandListId);
}
