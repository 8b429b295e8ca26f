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

use std::collections::{HashMap, VecDeque};

use ember_core::renderer::api::*;

use super::command::GpuCommand;

/// Counters accumulated by a headless device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Textures successfully created.
    pub textures_created: u32,
    /// Textures destroyed.
    pub textures_destroyed: u32,
    /// Render-target views created.
    pub render_target_views_created: u32,
    /// Depth-stencil views created.
    pub depth_stencil_views_created: u32,
    /// Buffers created.
    pub buffers_created: u32,
    /// Write-discard buffer updates executed.
    pub buffer_writes: u32,
    /// Constant-slot uploads executed.
    pub constant_writes: u32,
    /// Query objects created.
    pub queries_created: u32,
    /// Queries ended on the immediate context.
    pub queries_issued: u32,
    /// Calls to `try_get_query_result`.
    pub query_polls: u32,
    /// Polls that answered `Pending`.
    pub pending_query_polls: u32,
    /// Draws executed on the immediate context.
    pub draw_calls: u32,
    /// Executed draws whose predicate reported zero samples.
    pub predicated_draws_skipped: u32,
    /// Command lists closed by deferred contexts.
    pub command_lists_finished: u32,
    /// Command lists executed on the immediate context.
    pub command_lists_executed: u32,
}

/// What a created texture looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRecord {
    /// Debug label.
    pub label: Option<String>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Mip levels.
    pub mip_levels: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Shape.
    pub kind: TextureKind,
}

#[derive(Debug, Clone)]
pub(crate) struct QueryRecord {
    pub(crate) result: Option<u64>,
    pub(crate) pending_polls_left: u32,
}

/// Scripted creation failures.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailurePlan {
    pub(crate) textures_before_failure: Option<u32>,
    pub(crate) failing_formats: Vec<TextureFormat>,
    pub(crate) render_target_views_before_failure: Option<u32>,
    pub(crate) depth_stencil_views_before_failure: Option<u32>,
    pub(crate) queries: bool,
}

/// Consumes one success from a countdown; `false` once it has run out.
pub(crate) fn take_budget(budget: &mut Option<u32>) -> bool {
    match budget {
        None => true,
        Some(0) => false,
        Some(n) => {
            *n -= 1;
            true
        }
    }
}

#[derive(Debug)]
pub(crate) struct DeviceState {
    next_id: u64,
    pub(crate) textures: HashMap<TextureId, TextureRecord>,
    pub(crate) render_target_views: HashMap<RenderTargetViewId, TextureId>,
    pub(crate) depth_stencil_views: HashMap<DepthStencilViewId, TextureId>,
    pub(crate) buffers: HashMap<BufferId, u64>,
    pub(crate) queries: HashMap<QueryId, QueryRecord>,
    pub(crate) command_lists: HashMap<CommandListId, Vec<GpuCommand>>,
    pub(crate) log: Vec<GpuCommand>,
    pub(crate) stats: HeadlessStats,
    pub(crate) failures: FailurePlan,
    pub(crate) query_script: VecDeque<u64>,
    pub(crate) default_query_samples: u64,
    pub(crate) query_pending_polls: u32,
    pub(crate) supports_command_lists: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            next_id: 1,
            textures: HashMap::new(),
            render_target_views: HashMap::new(),
            depth_stencil_views: HashMap::new(),
            buffers: HashMap::new(),
            queries: HashMap::new(),
            command_lists: HashMap::new(),
            log: Vec::new(),
            stats: HeadlessStats::default(),
            failures: FailurePlan::default(),
            query_script: VecDeque::new(),
            default_query_samples: 1024,
            query_pending_polls: 0,
            supports_command_lists: true,
        }
    }
}

impl DeviceState {
    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Executes a command on the immediate timeline.
    pub(crate) fn apply(&mut self, command: GpuCommand) {
        match &command {
            GpuCommand::EndQuery(query) => {
                let samples = self
                    .query_script
                    .pop_front()
                    .unwrap_or(self.default_query_samples);
                let pending = self.query_pending_polls;
                if let Some(record) = self.queries.get_mut(query) {
                    record.result = Some(samples);
                    record.pending_polls_left = pending;
                }
                self.stats.queries_issued += 1;
            }
            GpuCommand::BeginQuery(query) => {
                if let Some(record) = self.queries.get_mut(query) {
                    record.result = None;
                }
            }
            GpuCommand::Draw { predicate, .. } | GpuCommand::DrawIndexed { predicate, .. } => {
                self.stats.draw_calls += 1;
                let hidden = predicate
                    .and_then(|q| self.queries.get(&q))
                    .is_some_and(|record| record.result == Some(0));
                if hidden {
                    self.stats.predicated_draws_skipped += 1;
                }
            }
            GpuCommand::WriteConstants { .. } => self.stats.constant_writes += 1,
            GpuCommand::WriteBuffer { .. } => self.stats.buffer_writes += 1,
            _ => {}
        }
        self.log.push(command);
    }
}
