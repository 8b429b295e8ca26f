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

//! Fixed-function pipeline state shared by every renderer.
//!
//! The backend owns one state object per variant and binds it on request, so
//! the render core only ever names them.

use glam::Vec4;

/// Output-merger blend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendState {
    /// Source replaces destination.
    #[default]
    Opaque,
    /// Classic `src * a + dst * (1 - a)`.
    AlphaBlend,
    /// `src + dst`, used for light accumulation and additive materials.
    Additive,
    /// Color writes disabled (depth-only passes, occlusion boxes).
    NoColorWrite,
}

/// Depth-stencil state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthStencilState {
    /// Less-equal test with depth writes.
    #[default]
    Default,
    /// Less-equal test, no writes.
    ReadOnly,
    /// Equal test, no writes. Used by forward light passes after the base pass.
    Equal,
    /// Greater-equal test, no writes. Used for light volumes the camera is inside.
    GreaterEqualReadOnly,
    /// No depth test and no writes.
    Disabled,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RasterizerState {
    /// Back faces culled.
    #[default]
    CullBack,
    /// Front faces culled.
    CullFront,
    /// No culling.
    CullNone,
    /// Wireframe, no culling.
    Wireframe,
    /// Back faces culled with slope-scaled depth bias, for shadow passes.
    ShadowBias,
}

/// A viewport rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Minimum depth, usually 0.
    pub min_depth: f32,
    /// Maximum depth, usually 1.
    pub max_depth: f32,
}

impl Viewport {
    /// A full-depth-range viewport covering `width` x `height` pixels.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Width of the indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

/// Constant-buffer slots the shaders agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantSlot {
    /// Per-view data: matrices, camera position, screen size.
    View,
    /// Per-object data: world matrix, tint, user data.
    Object,
    /// Per-light data.
    Light,
    /// Per-material parameters.
    Material,
    /// Post-process and compositing parameters.
    PostProcess,
    /// Shadow-map matrices and cascade splits.
    Shadow,
}

/// Clear values for a depth-stencil view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthClear {
    /// Depth to write, `None` to leave depth alone.
    pub depth: Option<f32>,
    /// Stencil to write, `None` to leave stencil alone.
    pub stencil: Option<u8>,
}

impl DepthClear {
    /// Clears depth to the far plane and stencil to zero.
    pub const FAR: Self = Self {
        depth: Some(1.0),
        stencil: Some(0),
    };
}

/// The transparent-black clear color.
pub const CLEAR_BLACK: Vec4 = Vec4::ZERO;
