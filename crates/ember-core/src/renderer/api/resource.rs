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

//! Opaque GPU resource handles and the descriptors used to create them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// An opaque handle to a render-target (color attachment) view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetViewId(pub u64);

/// An opaque handle to a depth-stencil attachment view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepthStencilViewId(pub u64);

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// An opaque handle to a GPU query object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

/// An opaque handle to a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

/// An opaque handle to a recorded command list, ready to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandListId(pub u64);

/// Texel formats understood by the render core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA.
    Rgba8Unorm,
    /// 8-bit normalized RGBA in sRGB space.
    Rgba8UnormSrgb,
    /// 10:10:10:2 normalized RGBA, used for packed normals.
    Rgb10A2Unorm,
    /// 16-bit float RGBA, the HDR scene color format.
    Rgba16Float,
    /// 32-bit float RGBA.
    Rgba32Float,
    /// Single-channel 16-bit float.
    R16Float,
    /// Single-channel 32-bit float, used for luminance.
    R32Float,
    /// Two-channel 16-bit float.
    Rg16Float,
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Returns `true` for formats that can only back depth-stencil views.
    pub const fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32Float
        )
    }

    /// Returns `true` if the format carries a stencil aspect.
    pub const fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    /// Size of one texel in bytes.
    pub const fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R16Float | TextureFormat::Depth16Unorm => 2,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Rgb10A2Unorm
            | TextureFormat::R32Float
            | TextureFormat::Rg16Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// The shape of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// A plain 2D texture.
    D2,
    /// An array of 2D layers (used for shadow cascades).
    D2Array {
        /// Number of layers.
        layers: u32,
    },
    /// A cube map with six 2D faces.
    Cube,
}

impl TextureKind {
    /// Number of addressable 2D layers.
    pub const fn layer_count(&self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::D2Array { layers } => *layers,
            TextureKind::Cube => 6,
        }
    }
}

bitflags! {
    /// How a texture will be bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Sampled from shaders.
        const SAMPLED = 1 << 0;
        /// Rendered to as a color target.
        const RENDER_TARGET = 1 << 1;
        /// Rendered to as a depth-stencil target.
        const DEPTH_STENCIL = 1 << 2;
        /// Source of a copy.
        const COPY_SRC = 1 << 3;
        /// Destination of a copy.
        const COPY_DST = 1 << 4;
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Shape of the resource.
    pub kind: TextureKind,
    /// Allowed usages.
    pub usage: TextureUsage,
}

impl<'a> TextureDescriptor<'a> {
    /// Describes a single-layer 2D texture.
    pub fn d2(
        label: &'a str,
        width: u32,
        height: u32,
        format: TextureFormat,
        mip_levels: u32,
        usage: TextureUsage,
    ) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            width,
            height,
            mip_levels,
            format,
            kind: TextureKind::D2,
            usage,
        }
    }
}

/// Selects the subresource a render-target or depth-stencil view addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureViewDescriptor {
    /// The mip level the view renders into.
    pub mip_level: u32,
    /// First array layer (cascade index or cube face).
    pub base_layer: u32,
    /// Number of layers visible through the view.
    pub layer_count: u32,
}

impl TextureViewDescriptor {
    /// A view of a single layer at mip 0.
    pub const fn layer(layer: u32) -> Self {
        Self {
            mip_level: 0,
            base_layer: layer,
            layer_count: 1,
        }
    }
}

bitflags! {
    /// How a buffer will be bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Bound as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Bound as an index buffer.
        const INDEX = 1 << 1;
        /// Bound as a constant buffer.
        const CONSTANT = 1 << 2;
        /// CPU-writable with write-discard mapping.
        const DYNAMIC = 1 << 3;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size of the buffer in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
}

/// The kind of GPU query to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Counts samples that passed the depth test.
    Occlusion,
    /// Boolean occlusion query usable for hardware predication.
    OcclusionPredicate,
}

/// The outcome of polling a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryResult {
    /// The GPU has not produced the data yet.
    Pending,
    /// Number of samples that passed the depth test.
    Ready(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_are_detected() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(TextureFormat::Depth24PlusStencil8.is_depth());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert!(!TextureFormat::Rgba16Float.is_depth());
        assert!(!TextureFormat::R32Float.is_depth());
    }

    #[test]
    fn texture_kind_layers() {
        assert_eq!(TextureKind::D2.layer_count(), 1);
        assert_eq!(TextureKind::Cube.layer_count(), 6);
        assert_eq!(TextureKind::D2Array { layers: 4 }.layer_count(), 4);
    }
}
