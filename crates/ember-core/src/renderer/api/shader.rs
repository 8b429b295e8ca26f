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

//! Identifies shader permutations.
//!
//! A linked program is selected by the tuple
//! `(global flags, base shader + flags, vertex factory + flags, material shader, static switches)`.
//! The tuple is a [`ShaderProgramKey`]; a [`crate::ShaderLibrary`] resolves it.

use bitflags::bitflags;

bitflags! {
    /// Frame-wide permutation switches, derived from renderer options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GlobalShaderFlags: u32 {
        /// Low shader-quality tier.
        const QUALITY_LOW = 1 << 0;
        /// High shader-quality tier.
        const QUALITY_HIGH = 1 << 1;
        /// Shadow maps are sampled.
        const SHADOWS = 1 << 2;
        /// Distance fog is applied.
        const FOG = 1 << 3;
        /// Mobile feature level.
        const MOBILE = 1 << 4;
    }
}

/// The pass-level shader a draw is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseShaderType {
    /// Depth only: depth prepass and shadow maps.
    DepthOnly,
    /// Deferred G-buffer fill.
    GBuffer,
    /// Forward base pass (ambient, emissive, lightmap).
    ForwardBase,
    /// Forward additive pass for one light.
    ForwardLight,
    /// Forward additive pass for a batch of unshadowed point lights.
    ForwardLightList,
    /// Mobile base pass with one directional light folded in.
    MobileBase,
    /// Unlit translucent and post-process materials.
    Unlit,
    /// Full-screen directional light for the deferred light pass.
    DeferredDirectionalLight,
    /// Light-volume mesh for one point light.
    DeferredPointLight,
    /// Full-screen pass shading a list of point lights.
    DeferredPointLightList,
    /// Ambient term and lightmap composite.
    DeferredAmbient,
    /// Light-shaft volume for a volumetric light.
    VolumetricLight,
    /// Half-resolution screen-space ambient occlusion.
    Ssao,
    /// Bilateral upsample and blend of the SSAO result.
    SsaoUpsample,
    /// Height/distance fog.
    Fog,
    /// Plain texture copy.
    Copy,
    /// Log-luminance extraction.
    Luminance,
    /// Bloom bright pass.
    BrightPass,
    /// 2x box downsample.
    Downsample,
    /// Horizontal gaussian blur.
    BlurHorizontal,
    /// Vertical gaussian blur.
    BlurVertical,
    /// Upsample and accumulate.
    Upsample,
    /// Tone map with bloom.
    ToneMap,
    /// Tone map without bloom.
    ToneMapNoBloom,
    /// Occluder bounding boxes.
    OcclusionBox,
    /// Solid-color wireframe overlay.
    Wireframe,
    /// Textured quad for the intermediate-buffer grid.
    DebugThumbnail,
    /// View-space normals as color.
    DebugNormals,
    /// Unlit diffuse color.
    FullBright,
}

bitflags! {
    /// Per-pass variations of a base shader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BaseShaderFlags: u32 {
        /// Alpha-tested material: clip in the pixel shader.
        const ALPHA_CLIP = 1 << 0;
        /// Emissive/lightmap output to the light-accumulation target.
        const BASE_PASS_OUTPUT = 1 << 1;
        /// The light casts a shadow map that is sampled.
        const SHADOWED = 1 << 2;
        /// Directional light variant.
        const DIRECTIONAL_LIGHT = 1 << 3;
        /// Point light variant.
        const POINT_LIGHT = 1 << 4;
        /// Spot light variant.
        const SPOT_LIGHT = 1 << 5;
        /// Cascaded shadow sampling.
        const CASCADED = 1 << 6;
        /// Cube shadow sampling.
        const CUBE_SHADOW = 1 << 7;
    }
}

/// A base shader plus its pass flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseShader {
    /// The pass-level shader.
    pub ty: BaseShaderType,
    /// Pass variations.
    pub flags: BaseShaderFlags,
}

impl BaseShader {
    /// A base shader with no flags.
    pub const fn new(ty: BaseShaderType) -> Self {
        Self {
            ty,
            flags: BaseShaderFlags::empty(),
        }
    }

    /// A base shader with flags.
    pub const fn with_flags(ty: BaseShaderType, flags: BaseShaderFlags) -> Self {
        Self { ty, flags }
    }
}

/// How vertices reach the vertex shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexFactoryType {
    /// Rigid mesh with a world matrix.
    StaticMesh,
    /// GPU-skinned mesh.
    SkinnedMesh,
    /// Camera-facing quads.
    Billboard,
    /// Full-screen triangle/quad.
    ScreenQuad,
    /// Position-only debug geometry (occluder boxes, wireframes).
    DebugGeometry,
}

/// A vertex factory plus its feature flags (lightmap UVs, vertex colors...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexFactoryDesc {
    /// The factory type.
    pub ty: VertexFactoryType,
    /// Factory-specific feature bits.
    pub flags: u32,
}

impl VertexFactoryDesc {
    /// The static-mesh factory with no flags.
    pub const STATIC_MESH: Self = Self::new(VertexFactoryType::StaticMesh);
    /// The screen-quad factory used by full-screen passes.
    pub const SCREEN_QUAD: Self = Self::new(VertexFactoryType::ScreenQuad);
    /// The debug-geometry factory.
    pub const DEBUG_GEOMETRY: Self = Self::new(VertexFactoryType::DebugGeometry);

    /// A factory with no flags.
    pub const fn new(ty: VertexFactoryType) -> Self {
        Self { ty, flags: 0 }
    }
}

/// Identifies a compiled material shader graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialShaderId(pub u32);

/// The full permutation tuple used to look up a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProgramKey {
    /// Frame-wide switches.
    pub global_flags: GlobalShaderFlags,
    /// Pass-level shader.
    pub base_shader: BaseShader,
    /// Vertex input path.
    pub vertex_factory: VertexFactoryDesc,
    /// Material graph, `None` for global passes.
    pub material_shader: Option<MaterialShaderId>,
    /// Static-switch permutation bits of the material shader.
    pub static_switch_mask: u32,
}

impl ShaderProgramKey {
    /// A key for a material-less full-screen pass.
    pub fn screen_pass(global_flags: GlobalShaderFlags, base_shader: BaseShader) -> Self {
        Self {
            global_flags,
            base_shader,
            vertex_factory: VertexFactoryDesc::SCREEN_QUAD,
            material_shader: None,
            static_switch_mask: 0,
        }
    }
}
