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

//! Per-frame statistics for the rendering system.

/// A collection of statistics for a single rendered frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// A sequential counter for rendered frames.
    pub frame_number: u64,
    /// The CPU time spent drawing the world, in milliseconds.
    pub cpu_frame_time_ms: f32,
    /// Draw calls issued for the frame, shadow passes included.
    pub draw_calls: u32,
    /// Opaque queue entries drawn in the main view.
    pub opaque_drawn: u32,
    /// Translucent queue entries drawn in the main view.
    pub translucent_drawn: u32,
    /// Post-process queue entries drawn in the main view.
    pub post_process_drawn: u32,
    /// Lights shaded in the main view.
    pub lights_drawn: u32,
    /// Cascaded directional shadow maps drawn.
    pub directional_shadow_maps: u32,
    /// Cube point-light shadow maps drawn.
    pub point_shadow_maps: u32,
    /// Single spot-light shadow maps drawn.
    pub spot_shadow_maps: u32,
    /// Occluder boxes submitted with a query.
    pub occluders_tested: u32,
    /// Entries removed because their occlusion query reported no samples.
    pub occlusion_culled: u32,
    /// Intermediate buffers owned by the pool at frame end.
    pub intermediate_buffers_allocated: u32,
    /// Draws skipped for a missing permutation or a failed material bind.
    pub skipped_draws: u32,
}

impl RenderStats {
    /// Total number of shadow maps drawn this frame.
    pub fn shadow_maps_drawn(&self) -> u32 {
        self.directional_shadow_maps + self.point_shadow_maps + self.spot_shadow_maps
    }
}
