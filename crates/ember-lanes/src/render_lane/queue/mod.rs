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

//! The per-frame render queue.
//!
//! Proxies push draw requests, lights, occluders and debug objects into a
//! [`RenderQueue`] while the scene is enumerated. The queue filters them
//! against what it currently accepts, splits draws into opaque, translucent
//! and post-process buckets, and stores a [`sort_key`] on each entry so the
//! renderers can walk the buckets in draw order after [`RenderQueue::sort`].

mod entry;
pub mod sort_key;

pub use entry::{DebugInfoEntry, OccluderEntry, RenderPassMask, RenderableEntry};

use ember_core::renderer::{
    DirectionalLightEntry, PointLightEntry, QueryId, SpotLightEntry, VolumetricLightEntry,
    NO_SHADOW_MAP,
};

use crate::render_lane::scene::ProxyId;
use sort_key::{sort_key_for, transparency_key, TRANSPARENCY_BLENDED};

/// A light as it is queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightEntry {
    /// A directional light.
    Directional(DirectionalLightEntry),
    /// A point light.
    Point(PointLightEntry),
    /// A spot light.
    Spot(SpotLightEntry),
    /// A volumetric light shaft.
    Volumetric(VolumetricLightEntry),
}

/// Collects one view's visible draws, lights, occluders and debug objects.
///
/// Clearing keeps every backing allocation, so a queue that lives across
/// frames stops allocating once it has seen its largest frame.
#[derive(Debug)]
pub struct RenderQueue {
    opaque: Vec<RenderableEntry>,
    translucent: Vec<RenderableEntry>,
    post_process: Vec<RenderableEntry>,
    directional_lights: Vec<DirectionalLightEntry>,
    point_lights: Vec<PointLightEntry>,
    spot_lights: Vec<SpotLightEntry>,
    volumetric_lights: Vec<VolumetricLightEntry>,
    occluders: Vec<OccluderEntry>,
    debug_info: Vec<DebugInfoEntry>,
    queue_size: usize,
    accepting_render_pass_mask: RenderPassMask,
    accepting_lights: bool,
    accepting_occluders: bool,
    accepting_debug_info: bool,
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderQueue {
    /// Creates a queue that accepts every pass and every kind of entry.
    pub fn new() -> Self {
        Self {
            opaque: Vec::new(),
            translucent: Vec::new(),
            post_process: Vec::new(),
            directional_lights: Vec::new(),
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
            volumetric_lights: Vec::new(),
            occluders: Vec::new(),
            debug_info: Vec::new(),
            queue_size: 0,
            accepting_render_pass_mask: RenderPassMask::all(),
            accepting_lights: true,
            accepting_occluders: true,
            accepting_debug_info: true,
        }
    }

    /// Creates the queue a shadow renderer owns: shadow-map pass only, no
    /// lights, occluders or debug objects.
    pub fn shadow_caster_queue() -> Self {
        let mut queue = Self::new();
        queue.set_accepting_render_pass_mask(RenderPassMask::SHADOW_MAP);
        queue.set_accepting_lights(false);
        queue.set_accepting_occluders(false);
        queue.set_accepting_debug_info(false);
        queue
    }

    /// Sets the passes the queue keeps. Entries outside this mask are dropped.
    pub fn set_accepting_render_pass_mask(&mut self, mask: RenderPassMask) {
        self.accepting_render_pass_mask = mask;
    }

    /// The passes the queue keeps.
    pub fn accepting_render_pass_mask(&self) -> RenderPassMask {
        self.accepting_render_pass_mask
    }

    /// Enables or disables light collection.
    pub fn set_accepting_lights(&mut self, accepting: bool) {
        self.accepting_lights = accepting;
    }

    /// Returns `true` if lights are collected.
    pub fn is_accepting_lights(&self) -> bool {
        self.accepting_lights
    }

    /// Enables or disables occluder collection.
    pub fn set_accepting_occluders(&mut self, accepting: bool) {
        self.accepting_occluders = accepting;
    }

    /// Returns `true` if occluders are collected.
    pub fn is_accepting_occluders(&self) -> bool {
        self.accepting_occluders
    }

    /// Enables or disables debug-object collection.
    pub fn set_accepting_debug_info(&mut self, accepting: bool) {
        self.accepting_debug_info = accepting;
    }

    /// Returns `true` if debug objects are collected.
    pub fn is_accepting_debug_info(&self) -> bool {
        self.accepting_debug_info
    }

    /// Queues a light. Ignored unless the queue accepts lights.
    ///
    /// Shadow-casting light types must arrive without a shadow map assigned.
    pub fn add_light(&mut self, light: LightEntry) {
        if !self.accepting_lights {
            return;
        }
        match light {
            LightEntry::Directional(light) => {
                debug_assert_eq!(light.shadow_map_index, NO_SHADOW_MAP);
                self.directional_lights.push(light);
            }
            LightEntry::Point(light) => {
                debug_assert_eq!(light.shadow_map_index, NO_SHADOW_MAP);
                self.point_lights.push(light);
            }
            LightEntry::Spot(light) => {
                debug_assert_eq!(light.shadow_map_index, NO_SHADOW_MAP);
                self.spot_lights.push(light);
            }
            LightEntry::Volumetric(light) => self.volumetric_lights.push(light),
        }
    }

    /// Queues a draw request.
    ///
    /// The entry keeps only the passes the queue accepts and is dropped when
    /// none remain. Entries tinted with a zero alpha are dropped as well.
    /// Returns `true` if the entry was stored.
    pub fn add_renderable(&mut self, mut entry: RenderableEntry) -> bool {
        if entry.render_pass_mask.contains(RenderPassMask::TINT) && entry.tint_color.a == 0 {
            return false;
        }

        let mask = entry.render_pass_mask & self.accepting_render_pass_mask;
        if mask.is_empty() {
            return false;
        }
        entry.render_pass_mask = mask;
        // A tint only counts when the queue keeps the tint pass.
        let transparency = transparency_key(&entry);
        entry.sort_key = sort_key_for(&entry, transparency);

        let is_post_process = entry
            .material
            .as_ref()
            .is_some_and(|material| material.is_post_process());
        if is_post_process {
            self.post_process.push(entry);
        } else if transparency == TRANSPARENCY_BLENDED {
            self.translucent.push(entry);
        } else {
            self.opaque.push(entry);
        }
        self.queue_size += 1;
        true
    }

    /// Queues an occluder. Ignored unless the queue accepts occluders.
    pub fn add_occluder(&mut self, occluder: OccluderEntry) {
        if self.accepting_occluders {
            self.occluders.push(occluder);
        }
    }

    /// Queues a debug-info callback. Ignored unless the queue accepts them.
    pub fn add_debug_info_object(&mut self, entry: DebugInfoEntry) {
        if self.accepting_debug_info {
            self.debug_info.push(entry);
        }
    }

    /// Zeroes the pass mask of every opaque and translucent entry owned by
    /// `proxy` (and carrying `user_data`, when given).
    ///
    /// Sort keys are left as they are; traversal skips entries with an empty
    /// mask. Returns the number of entries invalidated.
    pub fn invalidate_opaque_render_proxy(&mut self, proxy: ProxyId, user_data: Option<u32>) -> usize {
        let mut invalidated = 0;
        for entry in self.opaque.iter_mut().chain(self.translucent.iter_mut()) {
            if entry.matches(proxy, user_data) && !entry.render_pass_mask.is_empty() {
                entry.render_pass_mask = RenderPassMask::empty();
                invalidated += 1;
            }
        }
        invalidated
    }

    /// Attaches a GPU predicate to every opaque and translucent entry owned by
    /// `proxy` (and carrying `user_data`, when given).
    ///
    /// An entry carries at most one predicate per frame. Returns the number of
    /// entries marked.
    pub fn mark_render_proxy_with_predicate(
        &mut self,
        proxy: ProxyId,
        user_data: Option<u32>,
        predicate: QueryId,
    ) -> usize {
        let mut marked = 0;
        for entry in self.opaque.iter_mut().chain(self.translucent.iter_mut()) {
            if entry.matches(proxy, user_data) {
                debug_assert!(
                    entry.predicate.is_none(),
                    "entry of {proxy:?} already carries a predicate"
                );
                entry.predicate = Some(predicate);
                marked += 1;
            }
        }
        marked
    }

    /// Sorts the opaque and translucent buckets by sort key.
    pub fn sort(&mut self) {
        self.opaque.sort_unstable_by_key(|entry| entry.sort_key);
        self.translucent.sort_unstable_by_key(|entry| entry.sort_key);
    }

    /// Empties every bucket and resets the counters, keeping allocations.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.translucent.clear();
        self.post_process.clear();
        self.directional_lights.clear();
        self.point_lights.clear();
        self.spot_lights.clear();
        self.volumetric_lights.clear();
        self.occluders.clear();
        self.debug_info.clear();
        self.queue_size = 0;
    }

    /// Number of draw requests stored since the last clear.
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Returns `true` if no draw request is stored.
    pub fn is_empty(&self) -> bool {
        self.queue_size == 0
    }

    /// Opaque and masked entries.
    pub fn opaque_entries(&self) -> &[RenderableEntry] {
        &self.opaque
    }

    /// Blended entries.
    pub fn translucent_entries(&self) -> &[RenderableEntry] {
        &self.translucent
    }

    /// Entries with a post-process material.
    pub fn post_process_entries(&self) -> &[RenderableEntry] {
        &self.post_process
    }

    /// Queued directional lights.
    pub fn directional_lights(&self) -> &[DirectionalLightEntry] {
        &self.directional_lights
    }

    /// Queued directional lights, for shadow-map assignment.
    pub fn directional_lights_mut(&mut self) -> &mut [DirectionalLightEntry] {
        &mut self.directional_lights
    }

    /// Queued point lights.
    pub fn point_lights(&self) -> &[PointLightEntry] {
        &self.point_lights
    }

    /// Queued point lights, for shadow-map assignment.
    pub fn point_lights_mut(&mut self) -> &mut [PointLightEntry] {
        &mut self.point_lights
    }

    /// Queued spot lights.
    pub fn spot_lights(&self) -> &[SpotLightEntry] {
        &self.spot_lights
    }

    /// Queued spot lights, for shadow-map assignment.
    pub fn spot_lights_mut(&mut self) -> &mut [SpotLightEntry] {
        &mut self.spot_lights
    }

    /// Queued volumetric lights.
    pub fn volumetric_lights(&self) -> &[VolumetricLightEntry] {
        &self.volumetric_lights
    }

    /// Queued occluders.
    pub fn occluders(&self) -> &[OccluderEntry] {
        &self.occluders
    }

    /// Queued debug-info objects.
    pub fn debug_info_objects(&self) -> &[DebugInfoEntry] {
        &self.debug_info
    }
}
