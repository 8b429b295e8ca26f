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

//! A headless, recording implementation of [`GpuContext`].
//!
//! The device keeps a registry of every live resource, an execution log of
//! every command that reached the immediate context, and a set of counters.
//! Occlusion queries resolve from a script when they are ended, and creation
//! calls can be told to fail, so the renderers' failure paths can be driven
//! without a GPU.

mod command;
mod state;

pub use command::GpuCommand;
pub use state::{HeadlessStats, TextureRecord};

use std::sync::{Arc, Mutex, MutexGuard};

use ember_core::math::Vec4;
use ember_core::renderer::api::*;
use ember_core::renderer::{GpuContext, ResourceError};

use state::{take_budget, DeviceState, QueryRecord};

/// A shared handle to a headless device, used to create contexts, script
/// failures and inspect what was executed.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl HeadlessDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates the immediate context of this device.
    pub fn immediate_context(&self) -> HeadlessGpuContext {
        HeadlessGpuContext {
            device: self.clone(),
            deferred: false,
            recording: Vec::new(),
            program: None,
            predicate: None,
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> HeadlessStats {
        self.lock().stats.clone()
    }

    /// Every command executed on the immediate context so far.
    pub fn commands(&self) -> Vec<GpuCommand> {
        self.lock().log.clone()
    }

    /// Empties the execution log and resets the counters.
    pub fn reset_log(&self) {
        let mut state = self.lock();
        state.log.clear();
        state.stats = HeadlessStats::default();
    }

    /// Number of textures currently alive.
    pub fn live_textures(&self) -> usize {
        self.lock().textures.len()
    }

    /// Number of views (both kinds) currently alive.
    pub fn live_views(&self) -> usize {
        let state = self.lock();
        state.render_target_views.len() + state.depth_stencil_views.len()
    }

    /// Description of a live texture.
    pub fn texture(&self, id: TextureId) -> Option<TextureRecord> {
        self.lock().textures.get(&id).cloned()
    }

    /// Descriptions of every live texture, in creation order.
    pub fn textures(&self) -> Vec<(TextureId, TextureRecord)> {
        let mut textures: Vec<_> = self
            .lock()
            .textures
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        textures.sort_by_key(|(id, _)| *id);
        textures
    }

    /// Draw commands executed with `program` bound.
    pub fn draws_with_program(&self, program: ProgramId) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|c| c.is_draw() && c.draw_program() == Some(program))
            .count()
    }

    /// Lets the next `count` texture creations succeed, then fails every
    /// later one with `OutOfMemory`.
    pub fn fail_textures_after(&self, count: u32) {
        self.lock().failures.textures_before_failure = Some(count);
    }

    /// Fails every texture creation with `format`.
    pub fn fail_textures_with_format(&self, format: TextureFormat) {
        self.lock().failures.failing_formats.push(format);
    }

    /// Lets the next `count` render-target views succeed, then fails.
    pub fn fail_render_target_views_after(&self, count: u32) {
        self.lock().failures.render_target_views_before_failure = Some(count);
    }

    /// Lets the next `count` depth-stencil views succeed, then fails.
    pub fn fail_depth_stencil_views_after(&self, count: u32) {
        self.lock().failures.depth_stencil_views_before_failure = Some(count);
    }

    /// Fails every query creation.
    pub fn fail_queries(&self) {
        self.lock().failures.queries = true;
    }

    /// Removes every scripted failure.
    pub fn clear_failures(&self) {
        self.lock().failures = Default::default();
    }

    /// Sample counts handed to the next ended queries, in order. Queries ended
    /// after the script runs out use the default count.
    pub fn script_query_results(&self, samples: impl IntoIterator<Item = u64>) {
        self.lock().query_script.extend(samples);
    }

    /// Sample count of unscripted queries.
    pub fn set_default_query_samples(&self, samples: u64) {
        self.lock().default_query_samples = samples;
    }

    /// Number of `Pending` answers a query gives before its result.
    pub fn set_query_pending_polls(&self, polls: u32) {
        self.lock().query_pending_polls = polls;
    }

    /// Enables or disables deferred contexts.
    pub fn set_supports_command_lists(&self, supported: bool) {
        self.lock().supports_command_lists = supported;
    }
}

/// A context of a [`HeadlessDevice`], immediate or deferred.
#[derive(Debug)]
pub struct HeadlessGpuContext {
    device: HeadlessDevice,
    deferred: bool,
    recording: Vec<GpuCommand>,
    program: Option<ProgramId>,
    predicate: Option<QueryId>,
}

impl HeadlessGpuContext {
    /// Creates a new device and returns its immediate context.
    pub fn new() -> Self {
        HeadlessDevice::new().immediate_context()
    }

    /// The device this context belongs to.
    pub fn device(&self) -> &HeadlessDevice {
        &self.device
    }

    /// Returns `true` for deferred contexts.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    fn record(&mut self, command: GpuCommand) {
        if self.deferred {
            self.recording.push(command);
        } else {
            self.device.lock().apply(command);
        }
    }
}

impl Default for HeadlessGpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext for HeadlessGpuContext {
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = self.device.lock();
        if state.failures.failing_formats.contains(&descriptor.format)
            || !take_budget(&mut state.failures.textures_before_failure)
        {
            log::debug!(
                "HeadlessGpuContext: failing texture '{}' as scripted",
                descriptor.label.as_deref().unwrap_or_default()
            );
            return Err(ResourceError::OutOfMemory);
        }
        if descriptor.format.is_depth() && descriptor.usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(ResourceError::UnsupportedFormat(descriptor.format));
        }
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.mip_levels == 0 {
            return Err(ResourceError::BackendError(format!(
                "degenerate texture {}x{} with {} mips",
                descriptor.width, descriptor.height, descriptor.mip_levels
            )));
        }
        let id = TextureId(state.next_id());
        state.textures.insert(
            id,
            TextureRecord {
                label: descriptor.label.as_ref().map(|l| l.to_string()),
                width: descriptor.width,
                height: descriptor.height,
                mip_levels: descriptor.mip_levels,
                format: descriptor.format,
                kind: descriptor.kind,
            },
        );
        state.stats.textures_created += 1;
        log::trace!("HeadlessGpuContext: created texture {id:?}");
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        let mut state = self.device.lock();
        let dangling = state.render_target_views.values().any(|t| *t == id)
            || state.depth_stencil_views.values().any(|t| *t == id);
        if dangling {
            log::warn!("HeadlessGpuContext: texture {id:?} destroyed while views are alive");
        }
        if state.textures.remove(&id).is_some() {
            state.stats.textures_destroyed += 1;
        } else {
            log::warn!("HeadlessGpuContext: destroy of unknown texture {id:?}");
        }
    }

    fn create_render_target_view(
        &mut self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<RenderTargetViewId, ResourceError> {
        let mut state = self.device.lock();
        let record = state
            .textures
            .get(&texture)
            .ok_or(ResourceError::InvalidHandle)?;
        if record.format.is_depth() {
            return Err(ResourceError::UnsupportedFormat(record.format));
        }
        if descriptor.base_layer >= record.kind.layer_count() || descriptor.mip_level >= record.mip_levels {
            return Err(ResourceError::InvalidHandle);
        }
        if !take_budget(&mut state.failures.render_target_views_before_failure) {
            return Err(ResourceError::OutOfMemory);
        }
        let id = RenderTargetViewId(state.next_id());
        state.render_target_views.insert(id, texture);
        state.stats.render_target_views_created += 1;
        Ok(id)
    }

    fn create_depth_stencil_view(
        &mut self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<DepthStencilViewId, ResourceError> {
        let mut state = self.device.lock();
        let record = state
            .textures
            .get(&texture)
            .ok_or(ResourceError::InvalidHandle)?;
        if !record.format.is_depth() {
            return Err(ResourceError::UnsupportedFormat(record.format));
        }
        if descriptor.base_layer >= record.kind.layer_count() || descriptor.mip_level >= record.mip_levels {
            return Err(ResourceError::InvalidHandle);
        }
        if !take_budget(&mut state.failures.depth_stencil_views_before_failure) {
            return Err(ResourceError::OutOfMemory);
        }
        let id = DepthStencilViewId(state.next_id());
        state.depth_stencil_views.insert(id, texture);
        state.stats.depth_stencil_views_created += 1;
        Ok(id)
    }

    fn destroy_render_target_view(&mut self, id: RenderTargetViewId) {
        self.device.lock().render_target_views.remove(&id);
    }

    fn destroy_depth_stencil_view(&mut self, id: DepthStencilViewId) {
        self.device.lock().depth_stencil_views.remove(&id);
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<BufferId, ResourceError> {
        if let Some(data) = initial_data {
            if data.len() as u64 > descriptor.size {
                return Err(ResourceError::BackendError(format!(
                    "{} bytes of initial data for a {} byte buffer",
                    data.len(),
                    descriptor.size
                )));
            }
        }
        let mut state = self.device.lock();
        let id = BufferId(state.next_id());
        state.buffers.insert(id, descriptor.size);
        state.stats.buffers_created += 1;
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.device.lock().buffers.remove(&id);
    }

    fn write_buffer_discard(&mut self, id: BufferId, data: &[u8]) -> Result<(), ResourceError> {
        {
            let state = self.device.lock();
            let size = state.buffers.get(&id).ok_or(ResourceError::InvalidHandle)?;
            if data.len() as u64 > *size {
                return Err(ResourceError::BackendError(format!(
                    "write of {} bytes overflows a {size} byte buffer",
                    data.len()
                )));
            }
        }
        self.record(GpuCommand::WriteBuffer {
            buffer: id,
            size: data.len(),
        });
        Ok(())
    }

    fn create_query(&mut self, _kind: QueryKind) -> Result<QueryId, ResourceError> {
        let mut state = self.device.lock();
        if state.failures.queries {
            return Err(ResourceError::Unsupported("occlusion queries".to_string()));
        }
        let id = QueryId(state.next_id());
        state.queries.insert(
            id,
            QueryRecord {
                result: None,
                pending_polls_left: 0,
            },
        );
        state.stats.queries_created += 1;
        Ok(id)
    }

    fn destroy_query(&mut self, id: QueryId) {
        self.device.lock().queries.remove(&id);
    }

    fn begin_query(&mut self, query: QueryId) {
        self.record(GpuCommand::BeginQuery(query));
    }

    fn end_query(&mut self, query: QueryId) {
        self.record(GpuCommand::EndQuery(query));
    }

    fn try_get_query_result(&mut self, query: QueryId) -> QueryResult {
        let mut state = self.device.lock();
        state.stats.query_polls += 1;
        let Some(record) = state.queries.get_mut(&query) else {
            log::warn!("HeadlessGpuContext: poll of unknown query {query:?}");
            return QueryResult::Ready(0);
        };
        let result = match record.result {
            None => QueryResult::Pending,
            Some(_) if record.pending_polls_left > 0 => {
                record.pending_polls_left -= 1;
                QueryResult::Pending
            }
            Some(samples) => QueryResult::Ready(samples),
        };
        if result == QueryResult::Pending {
            state.stats.pending_query_polls += 1;
        }
        result
    }

    fn set_predication(&mut self, query: Option<QueryId>) {
        self.predicate = query;
        self.record(GpuCommand::SetPredication(query));
    }

    fn clear_state(&mut self) {
        self.program = None;
        self.predicate = None;
        self.record(GpuCommand::ClearState);
    }

    fn set_render_targets(
        &mut self,
        colors: &[RenderTargetViewId],
        depth_stencil: Option<DepthStencilViewId>,
    ) {
        self.record(GpuCommand::SetRenderTargets {
            colors: colors.to_vec(),
            depth_stencil,
        });
    }

    fn clear_render_target(&mut self, view: RenderTargetViewId, _color: Vec4) {
        self.record(GpuCommand::ClearRenderTarget(view));
    }

    fn clear_depth_stencil(&mut self, view: DepthStencilViewId, _clear: DepthClear) {
        self.record(GpuCommand::ClearDepthStencil(view));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(GpuCommand::SetViewport {
            width: viewport.width as u32,
            height: viewport.height as u32,
        });
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.record(GpuCommand::SetBlendState(state));
    }

    fn set_depth_stencil_state(&mut self, state: DepthStencilState) {
        self.record(GpuCommand::SetDepthStencilState(state));
    }

    fn set_rasterizer_state(&mut self, state: RasterizerState) {
        self.record(GpuCommand::SetRasterizerState(state));
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.program = Some(program);
        self.record(GpuCommand::BindProgram(program));
    }

    fn write_constants(&mut self, slot: ConstantSlot, data: &[u8]) {
        self.record(GpuCommand::WriteConstants {
            slot,
            size: data.len(),
        });
    }

    fn set_texture(&mut self, slot: u32, texture: Option<TextureId>) {
        self.record(GpuCommand::SetTexture { slot, texture });
    }

    fn set_vertex_buffer(&mut self, buffer: BufferId, _stride: u32) {
        self.record(GpuCommand::SetVertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _format: IndexFormat) {
        self.record(GpuCommand::SetIndexBuffer(buffer));
    }

    fn draw(&mut self, vertex_count: u32, _first_vertex: u32) {
        let command = GpuCommand::Draw {
            vertex_count,
            program: self.program,
            predicate: self.predicate,
        };
        self.record(command);
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, _base_vertex: i32) {
        let command = GpuCommand::DrawIndexed {
            index_count,
            first_index,
            program: self.program,
            predicate: self.predicate,
        };
        self.record(command);
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId) {
        self.record(GpuCommand::CopyTexture { src, dst });
    }

    fn supports_command_lists(&self) -> bool {
        self.device.lock().supports_command_lists
    }

    fn create_deferred_context(&mut self) -> Result<Box<dyn GpuContext>, ResourceError> {
        if self.deferred || !self.supports_command_lists() {
            return Err(ResourceError::Unsupported("deferred contexts".to_string()));
        }
        Ok(Box::new(HeadlessGpuContext {
            device: self.device.clone(),
            deferred: true,
            recording: Vec::new(),
            program: None,
            predicate: None,
        }))
    }

    fn finish_command_list(&mut self) -> Result<CommandListId, ResourceError> {
        if !self.deferred {
            return Err(ResourceError::Unsupported(
                "finish_command_list on the immediate context".to_string(),
            ));
        }
        let commands = std::mem::take(&mut self.recording);
        self.program = None;
        self.predicate = None;
        let mut state = self.device.lock();
        let id = CommandListId(state.next_id());
        state.command_lists.insert(id, commands);
        state.stats.command_lists_finished += 1;
        Ok(id)
    }

    fn execute_command_list(&mut self, list: CommandListId) {
        let commands = self.device.lock().command_lists.remove(&list);
        let Some(commands) = commands else {
            log::warn!("HeadlessGpuContext: execute of unknown command list {list:?}");
            return;
        };
        if self.deferred {
            self.recording.extend(commands);
            return;
        }
        let mut state = self.device.lock();
        state.stats.command_lists_executed += 1;
        state.apply(GpuCommand::ExecuteCommandList(list));
        for command in commands {
            state.apply(command);
        }
        drop(state);
        // Command lists do not inherit state from the executing context.
        self.program = None;
        self.predicate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_desc() -> TextureDescriptor<'static> {
        TextureDescriptor::d2(
            "color",
            64,
            64,
            TextureFormat::Rgba16Float,
            1,
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        )
    }

    #[test]
    fn textures_are_tracked_until_destroyed() {
        let mut gpu = HeadlessGpuContext::new();
        let texture = gpu.create_texture(&color_desc()).unwrap();
        assert_eq!(gpu.device().live_textures(), 1);
        assert_eq!(gpu.device().texture(texture).unwrap().width, 64);
        gpu.destroy_texture(texture);
        assert_eq!(gpu.device().live_textures(), 0);
    }

    #[test]
    fn scripted_texture_failure() {
        let mut gpu = HeadlessGpuContext::new();
        gpu.device().fail_textures_after(1);
        assert!(gpu.create_texture(&color_desc()).is_ok());
        assert_eq!(
            gpu.create_texture(&color_desc()),
            Err(ResourceError::OutOfMemory)
        );
    }

    #[test]
    fn depth_view_of_color_texture_is_rejected() {
        let mut gpu = HeadlessGpuContext::new();
        let texture = gpu.create_texture(&color_desc()).unwrap();
        assert!(gpu
            .create_depth_stencil_view(texture, &TextureViewDescriptor::layer(0))
            .is_err());
        assert!(gpu
            .create_render_target_view(texture, &TextureViewDescriptor::layer(0))
            .is_ok());
    }

    #[test]
    fn queries_resolve_from_script_after_pending_polls() {
        let mut gpu = HeadlessGpuContext::new();
        gpu.device().script_query_results([0]);
        gpu.device().set_query_pending_polls(2);
        let query = gpu.create_query(QueryKind::Occlusion).unwrap();
        assert_eq!(gpu.try_get_query_result(query), QueryResult::Pending);
        gpu.begin_query(query);
        gpu.end_query(query);
        assert_eq!(gpu.try_get_query_result(query), QueryResult::Pending);
        assert_eq!(gpu.try_get_query_result(query), QueryResult::Pending);
        assert_eq!(gpu.try_get_query_result(query), QueryResult::Ready(0));
        assert_eq!(gpu.device().stats().pending_query_polls, 3);
    }

    #[test]
    fn deferred_commands_run_when_executed() {
        let mut gpu = HeadlessGpuContext::new();
        let mut deferred = gpu.create_deferred_context().unwrap();
        deferred.bind_program(ProgramId(9));
        deferred.draw(3, 0);
        let list = deferred.finish_command_list().unwrap();
        assert_eq!(gpu.device().stats().draw_calls, 0);

        gpu.draw(3, 0);
        gpu.execute_command_list(list);
        let stats = gpu.device().stats();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.command_lists_executed, 1);
        assert_eq!(gpu.device().draws_with_program(ProgramId(9)), 1);
    }

    #[test]
    fn predicated_draw_with_zero_samples_is_counted() {
        let mut gpu = HeadlessGpuContext::new();
        gpu.device().script_query_results([0]);
        let query = gpu.create_query(QueryKind::OcclusionPredicate).unwrap();
        gpu.begin_query(query);
        gpu.end_query(query);
        gpu.set_predication(Some(query));
        gpu.draw_indexed(36, 0, 0);
        gpu.set_predication(None);
        assert_eq!(gpu.device().stats().predicated_draws_skipped, 1);
    }

    #[test]
    fn command_lists_can_be_disabled() {
        let mut gpu = HeadlessGpuContext::new();
        gpu.device().set_supports_command_lists(false);
        assert!(!gpu.supports_command_lists());
        assert!(gpu.create_deferred_context().is_err());
    }
}
