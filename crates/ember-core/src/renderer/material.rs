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

//! Defines the material contract consumed by the render queue and renderers.

use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

use crate::math::{Vec3, Vec4};
use crate::renderer::api::{ConstantSlot, MaterialShaderId, ProgramId, TextureId};
use crate::renderer::traits::GpuContext;

/// How a material's output combines with what is already in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Fully opaque.
    #[default]
    Opaque,
    /// Opaque with alpha-test clipping.
    Masked,
    /// Alpha blended.
    Translucent,
    /// Added to the target.
    Additive,
}

impl BlendMode {
    /// Returns `true` for modes drawn back-to-front after the opaque pass.
    pub const fn is_blended(&self) -> bool {
        matches!(self, BlendMode::Translucent | BlendMode::Additive)
    }
}

/// Lighting model of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadingModel {
    /// Receives scene lighting.
    #[default]
    Lit,
    /// Outputs its color unchanged.
    Unlit,
}

/// A material instance: a material shader plus per-instance parameters.
pub trait Material: Send + Sync + Debug {
    /// Blend mode of the material.
    fn blend_mode(&self) -> BlendMode;

    /// Post-process materials sample a snapshot of the scene and are drawn
    /// after everything else.
    fn is_post_process(&self) -> bool {
        false
    }

    /// Lighting model.
    fn shading_model(&self) -> ShadingModel {
        ShadingModel::Lit
    }

    /// The compiled material graph.
    fn shader_id(&self) -> MaterialShaderId;

    /// Static-switch permutation bits.
    fn static_switch_mask(&self) -> u32 {
        0
    }

    /// A hash grouping instances that share state; only the low 27 bits are
    /// used for sorting.
    fn sort_hash(&self) -> u32;

    /// Returns `true` if the base pass must also write emissive or lightmap
    /// output to the light-accumulation target.
    fn requires_base_pass_output(&self) -> bool {
        false
    }

    /// Uploads per-instance constants and textures for `program`.
    ///
    /// Returns `false` if the instance cannot be bound; the caller skips the
    /// draw.
    fn bind(&self, gpu: &mut dyn GpuContext, program: ProgramId) -> bool;
}

/// Constants uploaded by [`BasicMaterial`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BasicMaterialConstants {
    /// Base color, alpha in `w`.
    pub base_color: [f32; 4],
    /// Emissive color in `xyz`, alpha cutoff in `w`.
    pub emissive_cutoff: [f32; 4],
}

/// Texture slot of the albedo map.
pub const ALBEDO_TEXTURE_SLOT: u32 = 0;
/// Texture slot of the normal map.
pub const NORMAL_TEXTURE_SLOT: u32 = 1;

/// A parameterized material covering the common surface types.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    /// Debug name.
    pub name: String,
    /// Material graph.
    pub shader: MaterialShaderId,
    /// Blend mode.
    pub blend_mode: BlendMode,
    /// Lighting model.
    pub shading_model: ShadingModel,
    /// Drawn in the post-process bucket.
    pub post_process: bool,
    /// Base color multiplier.
    pub base_color: Vec4,
    /// Emissive color; non-zero requires base-pass output.
    pub emissive: Vec3,
    /// Alpha-test threshold for masked materials.
    pub alpha_cutoff: f32,
    /// Albedo map.
    pub albedo: Option<TextureId>,
    /// Tangent-space normal map.
    pub normal_map: Option<TextureId>,
    /// Samples a baked lightmap; requires base-pass output.
    pub lightmapped: bool,
    /// Static switches.
    pub static_switch_mask: u32,
}

impl BasicMaterial {
    /// An opaque, lit, untextured material.
    pub fn new(name: impl Into<String>, shader: MaterialShaderId) -> Self {
        Self {
            name: name.into(),
            shader,
            blend_mode: BlendMode::Opaque,
            shading_model: ShadingModel::Lit,
            post_process: false,
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            alpha_cutoff: 0.5,
            albedo: None,
            normal_map: None,
            lightmapped: false,
            static_switch_mask: 0,
        }
    }

    /// Sets the blend mode.
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Sets the base color.
    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    /// Sets the albedo map.
    pub fn with_albedo(mut self, texture: TextureId) -> Self {
        self.albedo = Some(texture);
        self
    }

    /// Marks the material as a post-process material.
    pub fn as_post_process(mut self) -> Self {
        self.post_process = true;
        self
    }

    /// Sets the emissive color.
    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }
}

impl Material for BasicMaterial {
    fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    fn is_post_process(&self) -> bool {
        self.post_process
    }

    fn shading_model(&self) -> ShadingModel {
        self.shading_model
    }

    fn shader_id(&self) -> MaterialShaderId {
        self.shader
    }

    fn static_switch_mask(&self) -> u32 {
        self.static_switch_mask
    }

    fn sort_hash(&self) -> u32 {
        material_sort_hash(&[
            self.shader.0 as u64,
            self.static_switch_mask as u64,
            self.albedo.map_or(u64::MAX, |t| t.0),
            self.normal_map.map_or(u64::MAX, |t| t.0),
        ])
    }

    fn requires_base_pass_output(&self) -> bool {
        self.lightmapped || self.emissive != Vec3::ZERO
    }

    fn bind(&self, gpu: &mut dyn GpuContext, _program: ProgramId) -> bool {
        let constants = BasicMaterialConstants {
            base_color: self.base_color.to_array(),
            emissive_cutoff: [self.emissive.x, self.emissive.y, self.emissive.z, self.alpha_cutoff],
        };
        gpu.write_constants(ConstantSlot::Material, bytemuck::bytes_of(&constants));
        gpu.set_texture(ALBEDO_TEXTURE_SLOT, self.albedo);
        gpu.set_texture(NORMAL_TEXTURE_SLOT, self.normal_map);
        true
    }
}

/// FNV-1a over the given words, folded to 27 bits.
pub fn material_sort_hash(parts: &[u64]) -> u32 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let hash = parts.iter().fold(OFFSET, |hash, part| {
        part.to_le_bytes()
            .iter()
            .fold(hash, |h, byte| (h ^ *byte as u64).wrapping_mul(PRIME))
    });
    ((hash ^ (hash >> 32)) as u32) & ((1 << 27) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_hash_fits_in_27_bits() {
        let material = BasicMaterial::new("rock", MaterialShaderId(7)).with_albedo(TextureId(42));
        assert!(material.sort_hash() < (1 << 27));
    }

    #[test]
    fn sort_hash_groups_identical_state() {
        let a = BasicMaterial::new("a", MaterialShaderId(1)).with_albedo(TextureId(3));
        let b = BasicMaterial::new("b", MaterialShaderId(1)).with_albedo(TextureId(3));
        let c = BasicMaterial::new("c", MaterialShaderId(1)).with_albedo(TextureId(4));
        assert_eq!(a.sort_hash(), b.sort_hash());
        assert_ne!(a.sort_hash(), c.sort_hash());
    }

    #[test]
    fn emissive_requires_base_pass_output() {
        let plain = BasicMaterial::new("plain", MaterialShaderId(1));
        assert!(!plain.requires_base_pass_output());
        let glowing = plain.clone().with_emissive(Vec3::X);
        assert!(glowing.requires_base_pass_output());
    }

    #[test]
    fn blended_modes() {
        assert!(BlendMode::Translucent.is_blended());
        assert!(BlendMode::Additive.is_blended());
        assert!(!BlendMode::Masked.is_blended());
    }
}
