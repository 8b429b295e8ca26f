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

//! Entries stored by the render queue.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use ember_core::math::{Aabb, Color32};
use ember_core::renderer::{Material, QueryId, VertexFactoryDesc};

use crate::render_lane::scene::{ProxyId, RenderProxy};

bitflags! {
    /// The passes an entry takes part in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderPassMask: u32 {
        /// Base pass (forward base, G-buffer fill, mobile base).
        const BASE = 1 << 0;
        /// Depth prepass.
        const DEPTH_PREPASS = 1 << 1;
        /// Shadow-map depth pass.
        const SHADOW_MAP = 1 << 2;
        /// Lightmap output in the base pass.
        const LIGHTMAP = 1 << 3;
        /// Emissive output in the base pass.
        const EMISSIVE = 1 << 4;
        /// The tint color modulates the draw.
        const TINT = 1 << 5;
        /// Drawn as a post-process object.
        const POST_PROCESS = 1 << 6;
        /// Stand-in geometry for occlusion queries.
        const OCCLUSION_PROXY = 1 << 7;
        /// Debug-only draws.
        const DEBUG = 1 << 8;
    }
}

/// A single draw request for one frame.
#[derive(Clone)]
pub struct RenderableEntry {
    /// The proxy that queued the entry and draws it.
    pub proxy: Arc<dyn RenderProxy>,
    /// Material, `None` for material-less draws.
    pub material: Option<Arc<dyn Material>>,
    /// How vertices reach the vertex shader.
    pub vertex_factory: VertexFactoryDesc,
    /// World-space bounds.
    pub bounds: Aabb,
    /// Passes the entry takes part in. Zero means the entry was invalidated.
    pub render_pass_mask: RenderPassMask,
    /// Render layer; only the low three bits are sorted on.
    pub layer: u8,
    /// Distance from the camera, used for depth sorting.
    pub view_distance: f32,
    /// Tint color.
    pub tint_color: Color32,
    /// Proxy-defined values, uploaded with the object constants.
    pub user_data: [u32; 4],
    /// Proxy-defined attachments.
    pub user_data_ptrs: [Option<Arc<dyn Any + Send + Sync>>; 2],
    /// GPU predicate that lets the hardware skip the draw.
    pub predicate: Option<QueryId>,
    /// Composite sort key, computed when the entry is queued.
    pub sort_key: u64,
}

impl RenderableEntry {
    /// Creates an entry with a white tint and no user data.
    pub fn new(
        proxy: Arc<dyn RenderProxy>,
        material: Option<Arc<dyn Material>>,
        bounds: Aabb,
        render_pass_mask: RenderPassMask,
    ) -> Self {
        Self {
            proxy,
            material,
            vertex_factory: VertexFactoryDesc::STATIC_MESH,
            bounds,
            render_pass_mask,
            layer: 0,
            view_distance: 0.0,
            tint_color: Color32::WHITE,
            user_data: [0; 4],
            user_data_ptrs: [None, None],
            predicate: None,
            sort_key: 0,
        }
    }

    /// Id of the owning proxy.
    pub fn proxy_id(&self) -> ProxyId {
        self.proxy.proxy_id()
    }

    /// Returns `true` if the entry belongs to `proxy` and, when given, carries
    /// `user_data` in its first user-data slot.
    pub fn matches(&self, proxy: ProxyId, user_data: Option<u32>) -> bool {
        self.proxy_id() == proxy && user_data.is_none_or(|value| self.user_data[0] == value)
    }

    /// Returns `true` if the entry takes part in `pass`.
    pub fn is_in_pass(&self, pass: RenderPassMask) -> bool {
        self.render_pass_mask.intersects(pass)
    }
}

impl fmt::Debug for RenderableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableEntry")
            .field("proxy", &self.proxy_id())
            .field("material", &self.material)
            .field("render_pass_mask", &self.render_pass_mask)
            .field("layer", &self.layer)
            .field("view_distance", &self.view_distance)
            .field("tint_color", &self.tint_color)
            .field("predicate", &self.predicate)
            .field("sort_key", &format_args!("{:#018x}", self.sort_key))
            .finish_non_exhaustive()
    }
}

/// A potential occluder: only its bounding box is ever drawn.
#[derive(Clone)]
pub struct OccluderEntry {
    /// The proxy whose queue entries the query result applies to.
    pub proxy: Arc<dyn RenderProxy>,
    /// World-space bounds drawn as a box.
    pub bounds: Aabb,
    /// Restricts the result to entries with this first user-data value.
    pub user_data: Option<u32>,
}

impl fmt::Debug for OccluderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OccluderEntry")
            .field("proxy", &self.proxy.proxy_id())
            .field("bounds", &self.bounds)
            .field("user_data", &self.user_data)
            .finish()
    }
}

/// A proxy that wants its debug-info callback run this frame.
#[derive(Clone)]
pub struct DebugInfoEntry {
    /// The proxy to call back.
    pub proxy: Arc<dyn RenderProxy>,
}

impl fmt::Debug for DebugInfoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugInfoEntry")
            .field("proxy", &self.proxy.proxy_id())
            .finish()
    }
}
