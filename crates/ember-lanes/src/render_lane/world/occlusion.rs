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

//! Occlusion culling with hardware queries.
//!
//! Occluder bounding boxes are drawn against the scene depth with color
//! writes off, one query per box. The results are then either waited for
//! and applied to the render queue ([`OcclusionCuller::collect_results`]) or
//! attached to the queue entries as predicates so the GPU skips hidden draws
//! by itself ([`OcclusionCuller::bind_to_queue_entries`]).

use ember_core::renderer::{
    BaseShaderType, BlendState, BufferDescriptor, BufferId, BufferUsage, Camera,
    DepthStencilState, GpuContext, IndexFormat, OcclusionCullingMode, QueryId, QueryKind,
    QueryResult, RasterizerState, ResourceError, VertexFactoryDesc,
};

use crate::render_lane::proxies::{BOX_INDICES, POSITION_STRIDE};
use crate::render_lane::queue::{OccluderEntry, RenderQueue};
use crate::render_lane::scene::ProxyId;
use crate::render_lane::shader_selector::ShaderProgramSelector;

const VERTICES_PER_BOX: usize = 8;
const INDICES_PER_BOX: u32 = BOX_INDICES.len() as u32;

/// An occluder whose visibility is being determined this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOcclusionQuery {
    /// The proxy the result applies to.
    pub proxy: ProxyId,
    /// Restricts the result to entries with this first user-data value.
    pub user_data: Option<u32>,
    /// The issued query; `None` when the occluder was assumed visible.
    pub query: Option<QueryId>,
    /// Resolved visibility.
    pub visible: bool,
}

/// Results of one occlusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    /// Occluders whose box was drawn with a query.
    pub tested: u32,
    /// Occluders found hidden (blocking mode) or predicated (predicated mode).
    pub culled: u32,
}

/// Draws occluder boxes with queries and feeds the results back.
#[derive(Debug)]
pub struct OcclusionCuller {
    mode: OcclusionCullingMode,
    objects_per_batch: u32,
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    queries: Vec<QueryId>,
    pending: Vec<PendingOcclusionQuery>,
}

impl OcclusionCuller {
    /// Creates a culler that batches up to `objects_per_batch` boxes per
    /// buffer upload.
    pub fn new(mode: OcclusionCullingMode, objects_per_batch: u32) -> Self {
        Self {
            mode,
            objects_per_batch: objects_per_batch.max(1),
            vertex_buffer: None,
            index_buffer: None,
            queries: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// The consumption mode.
    pub fn mode(&self) -> OcclusionCullingMode {
        self.mode
    }

    /// Returns `true` unless the mode is `Disabled`.
    pub fn is_enabled(&self) -> bool {
        self.mode != OcclusionCullingMode::Disabled
    }

    /// Creates the box buffers.
    ///
    /// ## Errors
    ///
    /// Returns the backend error if a buffer cannot be created.
    pub fn initialize(&mut self, gpu: &mut dyn GpuContext) -> Result<(), ResourceError> {
        if !self.is_enabled() || self.vertex_buffer.is_some() {
            return Ok(());
        }
        let boxes = self.objects_per_batch as usize;
        let vertex_buffer = gpu.create_buffer(
            &BufferDescriptor {
                label: Some("occlusion boxes".into()),
                size: (boxes * VERTICES_PER_BOX * POSITION_STRIDE as usize) as u64,
                usage: BufferUsage::VERTEX | BufferUsage::DYNAMIC,
            },
            None,
        )?;

        // Box `j` of a batch uses vertices `8j..8j + 8`.
        let indices: Vec<u32> = (0..boxes as u32)
            .flat_map(|j| {
                BOX_INDICES
                    .iter()
                    .map(move |i| u32::from(*i) + j * VERTICES_PER_BOX as u32)
            })
            .collect();
        let index_buffer = match gpu.create_buffer(
            &BufferDescriptor {
                label: Some("occlusion box indices".into()),
                size: std::mem::size_of_val(indices.as_slice()) as u64,
                usage: BufferUsage::INDEX,
            },
            Some(bytemuck::cast_slice(&indices)),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                gpu.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        Ok(())
    }

    fn query(&mut self, gpu: &mut dyn GpuContext, index: usize) -> Option<QueryId> {
        while self.queries.len() <= index {
            let kind = match self.mode {
                OcclusionCullingMode::Predicated => QueryKind::OcclusionPredicate,
                _ => QueryKind::Occlusion,
            };
            match gpu.create_query(kind) {
                Ok(query) => self.queries.push(query),
                Err(err) => {
                    log::warn!("OcclusionCuller: cannot create query: {err}");
                    return None;
                }
            }
        }
        Some(self.queries[index])
    }

    /// Draws every occluder box of `queue` with a query.
    ///
    /// Expects the scene depth and view constants to be bound. Occluders
    /// containing the camera are assumed visible and get no query. Returns
    /// the number of boxes drawn.
    pub fn draw_occluders(
        &mut self,
        gpu: &mut dyn GpuContext,
        selector: &mut ShaderProgramSelector,
        camera: &Camera,
        queue: &RenderQueue,
    ) -> u32 {
        self.pending.clear();
        let occluders = queue.occluders();
        if !self.is_enabled() || occluders.is_empty() {
            return 0;
        }
        let (Some(vertex_buffer), Some(index_buffer)) = (self.vertex_buffer, self.index_buffer)
        else {
            log::warn!("OcclusionCuller: not initialized, every occluder stays visible");
            return 0;
        };

        selector.set_base_shader_type(BaseShaderType::OcclusionBox);
        selector.set_vertex_factory(VertexFactoryDesc::DEBUG_GEOMETRY);
        selector.set_material(None);
        if selector.make_active(gpu).is_none() {
            return 0;
        }
        gpu.set_blend_state(BlendState::NoColorWrite);
        gpu.set_depth_stencil_state(DepthStencilState::ReadOnly);
        gpu.set_rasterizer_state(RasterizerState::CullNone);
        gpu.set_vertex_buffer(vertex_buffer, POSITION_STRIDE);
        gpu.set_index_buffer(index_buffer, IndexFormat::Uint32);

        let eye = camera.position();
        let mut tested = 0;
        for batch in occluders.chunks(self.objects_per_batch as usize) {
            // The whole buffer is rewritten for every batch.
            let corners: Vec<[f32; 3]> = batch
                .iter()
                .flat_map(|occluder| occluder.bounds.corners())
                .map(|corner| corner.to_array())
                .collect();
            if let Err(err) = gpu.write_buffer_discard(vertex_buffer, bytemuck::cast_slice(&corners)) {
                log::warn!("OcclusionCuller: box upload failed, skipping batch: {err}");
                self.pending.extend(batch.iter().map(|o| Self::assumed_visible(o)));
                continue;
            }

            for (slot, occluder) in batch.iter().enumerate() {
                if occluder.bounds.contains_point(eye) {
                    self.pending.push(Self::assumed_visible(occluder));
                    continue;
                }
                let Some(query) = self.query(gpu, tested as usize) else {
                    self.pending.push(Self::assumed_visible(occluder));
                    continue;
                };
                gpu.begin_query(query);
                gpu.draw_indexed(INDICES_PER_BOX, slot as u32 * INDICES_PER_BOX, 0);
                gpu.end_query(query);
                self.pending.push(PendingOcclusionQuery {
                    proxy: occluder.proxy.proxy_id(),
                    user_data: occluder.user_data,
                    query: Some(query),
                    visible: true,
                });
                tested += 1;
            }
        }
        tested
    }

    fn assumed_visible(occluder: &OccluderEntry) -> PendingOcclusionQuery {
        PendingOcclusionQuery {
            proxy: occluder.proxy.proxy_id(),
            user_data: occluder.user_data,
            query: None,
            visible: true,
        }
    }

    /// Waits for every query and invalidates the queue entries of hidden
    /// occluders. Returns the number of occluders found hidden.
    ///
    /// The wait is a busy poll with no timeout.
    pub fn collect_results(&mut self, gpu: &mut dyn GpuContext, queue: &mut RenderQueue) -> u32 {
        let mut culled = 0;
        for pending in &mut self.pending {
            let Some(query) = pending.query else {
                continue;
            };
            let samples = loop {
                match gpu.try_get_query_result(query) {
                    QueryResult::Ready(samples) => break samples,
                    QueryResult::Pending => std::hint::spin_loop(),
                }
            };
            pending.visible = samples > 0;
            if !pending.visible {
                queue.invalidate_opaque_render_proxy(pending.proxy, pending.user_data);
                culled += 1;
            }
        }
        culled
    }

    /// Attaches each issued query to the matching queue entries as a draw
    /// predicate. Returns the number of occluders bound.
    pub fn bind_to_queue_entries(&self, queue: &mut RenderQueue) -> u32 {
        let mut bound = 0;
        for pending in &self.pending {
            if let Some(query) = pending.query {
                queue.mark_render_proxy_with_predicate(pending.proxy, pending.user_data, query);
                bound += 1;
            }
        }
        bound
    }

    /// Draws the occluders and consumes the results the way the mode asks.
    pub fn run(
        &mut self,
        gpu: &mut dyn GpuContext,
        selector: &mut ShaderProgramSelector,
        camera: &Camera,
        queue: &mut RenderQueue,
    ) -> OcclusionStats {
        let tested = self.draw_occluders(gpu, selector, camera, queue);
        let culled = match self.mode {
            OcclusionCullingMode::Disabled => 0,
            OcclusionCullingMode::Blocking => self.collect_results(gpu, queue),
            OcclusionCullingMode::Predicated => self.bind_to_queue_entries(queue),
        };
        OcclusionStats { tested, culled }
    }

    /// This frame's queries.
    pub fn pending(&self) -> &[PendingOcclusionQuery] {
        &self.pending
    }

    /// Forgets this frame's queries. The query objects are kept for reuse.
    pub fn end_frame(&mut self) {
        self.pending.clear();
    }

    /// Number of query objects in the cache.
    pub fn query_cache_len(&self) -> usize {
        self.queries.len()
    }

    /// Destroys the buffers and queries.
    pub fn release(&mut self, gpu: &mut dyn GpuContext) {
        if let Some(buffer) = self.vertex_buffer.take() {
            gpu.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            gpu.destroy_buffer(buffer);
        }
        for query in self.queries.drain(..) {
            gpu.destroy_query(query);
        }
        self.pending.clear();
    }
}
