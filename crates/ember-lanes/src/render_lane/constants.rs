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

//! Constant-buffer layouts shared with the shaders.
//!
//! All structs are `#[repr(C)]` and padded to 16-byte rows.

use bytemuck::{Pod, Zeroable};
use ember_core::math::{Mat4, Vec3, Vec4};
use ember_core::renderer::{
    Camera, ConstantSlot, DirectionalLightEntry, GpuContext, PointLightEntry, SpotLightEntry,
    VolumetricLightEntry, MAX_SHADOW_CASCADES,
};

/// Upper bound on lights in one light-list draw.
pub const MAX_LIGHTS_PER_LIST: usize = 16;

/// Texture slot of the shadow map sampled by shadowed light passes.
pub const SHADOW_MAP_SLOT: u32 = 4;

/// First texture slot of screen-pass inputs: G-buffer layers, scene color,
/// bloom. Material textures live below [`SHADOW_MAP_SLOT`].
pub const SCREEN_INPUT_SLOT: u32 = 8;

/// Per-view constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ViewConstants {
    /// World to clip.
    pub view_projection: [[f32; 4]; 4],
    /// Clip to world.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Camera position in xyz, near plane in w.
    pub camera_position_near: [f32; 4],
    /// Render-target size in xy, inverse size in zw.
    pub target_size: [f32; 4],
}

impl ViewConstants {
    /// Builds the view block for `camera` rendering into a `width` x `height`
    /// target.
    pub fn new(camera: &Camera, width: u32, height: u32) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view_projection: camera.view_projection().to_cols_array_2d(),
            inverse_view_projection: camera.inverse_view_projection().to_cols_array_2d(),
            camera_position_near: camera.position().extend(camera.near()).to_array(),
            target_size: [w, h, 1.0 / w, 1.0 / h],
        }
    }

    /// Uploads the block to the view slot.
    pub fn upload(&self, gpu: &mut dyn GpuContext) {
        gpu.write_constants(ConstantSlot::View, bytemuck::bytes_of(self));
    }
}

/// Per-object constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object to world.
    pub world: [[f32; 4]; 4],
    /// Tint color, normalized.
    pub tint: [f32; 4],
    /// Proxy-defined user data.
    pub user_data: [u32; 4],
}

impl ObjectConstants {
    /// Builds the object block.
    pub fn new(world: Mat4, tint: Vec4, user_data: [u32; 4]) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            tint: tint.to_array(),
            user_data,
        }
    }
}

/// Constants for a single light.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    /// Position in xyz, range in w. Zero for directional lights.
    pub position_range: [f32; 4],
    /// Normalized direction in xyz, falloff exponent in w.
    pub direction_falloff: [f32; 4],
    /// Color premultiplied by intensity in xyz, shadow-map index in w.
    pub color_shadow: [f32; 4],
    /// Spot cosines of inner and outer angles in xy, density in z.
    pub cone_density: [f32; 4],
}

fn premultiplied(color: Vec3, intensity: f32) -> Vec3 {
    color * intensity
}

impl LightConstants {
    /// Constants for a directional light.
    pub fn directional(light: &DirectionalLightEntry) -> Self {
        Self {
            position_range: [0.0; 4],
            direction_falloff: light.direction.normalize_or_zero().extend(0.0).to_array(),
            color_shadow: premultiplied(light.color, light.intensity)
                .extend(light.shadow_map_index as f32)
                .to_array(),
            cone_density: [0.0; 4],
        }
    }

    /// Constants for a point light.
    pub fn point(light: &PointLightEntry) -> Self {
        Self {
            position_range: light.position.extend(light.range).to_array(),
            direction_falloff: [0.0, 0.0, 0.0, light.falloff],
            color_shadow: premultiplied(light.color, light.intensity)
                .extend(light.shadow_map_index as f32)
                .to_array(),
            cone_density: [0.0; 4],
        }
    }

    /// Constants for a spot light.
    pub fn spot(light: &SpotLightEntry) -> Self {
        Self {
            position_range: light.position.extend(light.range).to_array(),
            direction_falloff: light.direction.normalize_or_zero().extend(1.0).to_array(),
            color_shadow: premultiplied(light.color, light.intensity)
                .extend(light.shadow_map_index as f32)
                .to_array(),
            cone_density: [light.inner_angle.cos(), light.outer_angle.cos(), 0.0, 0.0],
        }
    }

    /// Constants for a volumetric light shaft.
    pub fn volumetric(light: &VolumetricLightEntry) -> Self {
        Self {
            position_range: light.position.extend(light.range).to_array(),
            direction_falloff: light.direction.normalize_or_zero().extend(1.0).to_array(),
            color_shadow: light.color.extend(-1.0).to_array(),
            cone_density: [0.0, 0.0, light.density, 0.0],
        }
    }

    /// Uploads the block to the light slot.
    pub fn upload(&self, gpu: &mut dyn GpuContext) {
        gpu.write_constants(ConstantSlot::Light, bytemuck::bytes_of(self));
    }
}

/// A batch of unshadowed lights for light-list shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightListConstants {
    /// Number of valid lights in x.
    pub count: [u32; 4],
    /// The lights.
    pub lights: [LightConstants; MAX_LIGHTS_PER_LIST],
}

impl LightListConstants {
    /// Packs up to [`MAX_LIGHTS_PER_LIST`] point lights.
    pub fn from_point_lights<'a>(lights: impl IntoIterator<Item = &'a PointLightEntry>) -> Self {
        let mut block = Self::zeroed();
        let mut count = 0;
        for (slot, light) in block.lights.iter_mut().zip(lights) {
            *slot = LightConstants::point(light);
            count += 1;
        }
        block.count[0] = count;
        block
    }

    /// Uploads the block to the light slot.
    pub fn upload(&self, gpu: &mut dyn GpuContext) {
        gpu.write_constants(ConstantSlot::Light, bytemuck::bytes_of(self));
    }
}

/// Shadow-map matrices for the light being drawn.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowConstants {
    /// World to shadow clip space, one per cascade or face.
    pub matrices: [[[f32; 4]; 4]; MAX_SHADOW_CASCADES as usize],
    /// Far distance of each cascade.
    pub split_depths: [f32; MAX_SHADOW_CASCADES as usize],
    /// Cascade count in x, texel size in y.
    pub params: [f32; 4],
}

impl ShadowConstants {
    /// Builds the block from light cameras and cascade far distances.
    pub fn new(view_projections: &[Mat4], split_depths: &[f32], resolution: u32) -> Self {
        let mut block = Self::zeroed();
        for (slot, matrix) in block.matrices.iter_mut().zip(view_projections) {
            *slot = matrix.to_cols_array_2d();
        }
        for (slot, split) in block.split_depths.iter_mut().zip(split_depths) {
            *slot = *split;
        }
        let count = view_projections.len().min(MAX_SHADOW_CASCADES as usize);
        block.params = [count as f32, 1.0 / resolution.max(1) as f32, 0.0, 0.0];
        block
    }

    /// Uploads the block to the shadow slot.
    pub fn upload(&self, gpu: &mut dyn GpuContext) {
        gpu.write_constants(ConstantSlot::Shadow, bytemuck::bytes_of(self));
    }
}

/// Parameters for full-screen post-process passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PostProcessConstants {
    /// Source texel size in xy, destination texel size in zw.
    pub texel_sizes: [f32; 4],
    /// Exposure, bloom threshold, bloom intensity, blur radius.
    pub params: [f32; 4],
}

impl PostProcessConstants {
    /// Builds the block for a pass from a `src` sized input to a `dst` sized
    /// output.
    pub fn new(src: (u32, u32), dst: (u32, u32), params: [f32; 4]) -> Self {
        let inv = |v: u32| 1.0 / v.max(1) as f32;
        Self {
            texel_sizes: [inv(src.0), inv(src.1), inv(dst.0), inv(dst.1)],
            params,
        }
    }

    /// Uploads the block to the post-process slot.
    pub fn upload(&self, gpu: &mut dyn GpuContext) {
        gpu.write_constants(ConstantSlot::PostProcess, bytemuck::bytes_of(self));
    }
}
