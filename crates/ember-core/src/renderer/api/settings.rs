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

//! Construction-time options for a world renderer.
//!
//! Options are read once when a renderer is built. Changing them at runtime
//! means building a new renderer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::resource::TextureFormat;
use super::shader::GlobalShaderFlags;

/// Upper bound on directional shadow cascades.
pub const MAX_SHADOW_CASCADES: u32 = 4;

/// How occlusion query results are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OcclusionCullingMode {
    /// No occluders are drawn.
    #[default]
    Disabled,
    /// Results are waited on and invisible entries are invalidated this frame.
    Blocking,
    /// Queries are attached to entries and the GPU skips hidden draws.
    Predicated,
}

/// Shader-quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShaderQuality {
    /// Cheapest permutations.
    Low,
    /// Default permutations.
    #[default]
    Medium,
    /// Most expensive permutations.
    High,
}

/// Debug overlays drawn straight to the output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugOverlayOptions {
    /// Re-draw opaque entries as wireframe.
    pub wireframe: bool,
    /// Show every pooled intermediate buffer as a thumbnail grid.
    pub intermediate_buffers: bool,
    /// Call the debug-info callback of every debug object.
    pub object_debug_info: bool,
}

/// Tone-map and bloom parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapOptions {
    /// Linear exposure multiplier.
    pub exposure: f32,
    /// Luminance above which pixels contribute to bloom.
    pub bloom_threshold: f32,
    /// Weight of the bloom result in the final image.
    pub bloom_intensity: f32,
}

impl Default for ToneMapOptions {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            bloom_threshold: 1.0,
            bloom_intensity: 0.25,
        }
    }
}

/// The named tunables a world renderer is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Edge length of directional and spot shadow maps.
    pub shadow_map_resolution: u32,
    /// Edge length of each point-light cube face.
    pub cube_shadow_map_resolution: u32,
    /// Depth format of every shadow map.
    pub shadow_map_format: TextureFormat,
    /// Number of directional cascades, `1..=4`.
    pub cascade_count: u32,
    /// Blend between linear (0) and logarithmic (1) cascade splits.
    pub cascade_lambda: f32,
    /// Cascades never extend past this view distance.
    pub shadow_distance: f32,
    /// Shadow maps per light type that can be alive in one frame.
    pub max_shadow_maps_per_type: u32,
    /// Screen-space ambient occlusion in the deferred renderer.
    pub ssao: bool,
    /// Bloom in the compositing stage.
    pub bloom: bool,
    /// Distance fog in the deferred renderer.
    pub fog: bool,
    /// How occlusion queries are consumed.
    pub occlusion_culling: OcclusionCullingMode,
    /// Occluder boxes written per vertex-buffer batch.
    pub occlusion_objects_per_batch: u32,
    /// Shader-quality tier.
    pub shader_quality: ShaderQuality,
    /// Generate shadow command lists on worker threads.
    pub multithreaded_rendering: bool,
    /// Point lights shaded by one pass of the light-list shader.
    pub max_point_lights_per_pass: u32,
    /// Format of the HDR scene-color buffer.
    pub scene_color_format: TextureFormat,
    /// Debug overlays.
    pub debug: DebugOverlayOptions,
    /// Tone mapping.
    pub tone_map: ToneMapOptions,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            shadow_map_resolution: 2048,
            cube_shadow_map_resolution: 512,
            shadow_map_format: TextureFormat::Depth32Float,
            cascade_count: 3,
            cascade_lambda: 0.95,
            shadow_distance: 500.0,
            max_shadow_maps_per_type: 4,
            ssao: true,
            bloom: true,
            fog: false,
            occlusion_culling: OcclusionCullingMode::Disabled,
            occlusion_objects_per_batch: 128,
            shader_quality: ShaderQuality::Medium,
            multithreaded_rendering: false,
            max_point_lights_per_pass: 8,
            scene_color_format: TextureFormat::Rgba16Float,
            debug: DebugOverlayOptions::default(),
            tone_map: ToneMapOptions::default(),
        }
    }
}

/// An error raised while loading or validating [`RendererOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The RON text could not be parsed.
    #[error("failed to parse renderer options: {0}")]
    Parse(String),
    /// A field is outside its allowed range.
    #[error("invalid renderer option `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl RendererOptions {
    /// The parameter set used when a renderer fails to initialize with the
    /// requested options: small shadow maps, no optional effects, no
    /// occlusion queries, single-threaded, low quality.
    pub fn conservative() -> Self {
        Self {
            shadow_map_resolution: 1024,
            cube_shadow_map_resolution: 256,
            cascade_count: 1,
            max_shadow_maps_per_type: 1,
            ssao: false,
            bloom: false,
            fog: false,
            occlusion_culling: OcclusionCullingMode::Disabled,
            shader_quality: ShaderQuality::Low,
            multithreaded_rendering: false,
            max_point_lights_per_pass: 4,
            debug: DebugOverlayOptions::default(),
            ..Self::default()
        }
    }

    /// Parses options from RON text and validates them. Missing fields take
    /// their default values.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let options: Self = ron::from_str(text).map_err(|e| {
            log::warn!("Renderer options rejected: {e}");
            ConfigError::Parse(e.to_string())
        })?;
        if let Err(err) = options.validate() {
            log::warn!("{err}");
            return Err(err);
        }
        log::debug!(
            "Renderer options: {} cascades, occlusion {:?}, quality {:?}",
            options.cascade_count,
            options.occlusion_culling,
            options.shader_quality
        );
        Ok(options)
    }

    /// Serializes the options to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if !self.shadow_map_resolution.is_power_of_two() || self.shadow_map_resolution < 64 {
            return Err(invalid(
                "shadow_map_resolution",
                format!("{} is not a power of two >= 64", self.shadow_map_resolution),
            ));
        }
        if !self.cube_shadow_map_resolution.is_power_of_two()
            || self.cube_shadow_map_resolution < 16
        {
            return Err(invalid(
                "cube_shadow_map_resolution",
                format!(
                    "{} is not a power of two >= 16",
                    self.cube_shadow_map_resolution
                ),
            ));
        }
        if !self.shadow_map_format.is_depth() {
            return Err(invalid(
                "shadow_map_format",
                format!("{:?} is not a depth format", self.shadow_map_format),
            ));
        }
        if self.cascade_count == 0 || self.cascade_count > MAX_SHADOW_CASCADES {
            return Err(invalid(
                "cascade_count",
                format!("must be in 1..={MAX_SHADOW_CASCADES}"),
            ));
        }
        if !(0.0..=1.0).contains(&self.cascade_lambda) {
            return Err(invalid("cascade_lambda", "must be in [0, 1]"));
        }
        if !(self.shadow_distance > 0.0) {
            return Err(invalid("shadow_distance", "must be positive"));
        }
        if self.max_shadow_maps_per_type == 0 {
            return Err(invalid("max_shadow_maps_per_type", "must be at least 1"));
        }
        if self.occlusion_objects_per_batch == 0 {
            return Err(invalid("occlusion_objects_per_batch", "must be at least 1"));
        }
        if self.max_point_lights_per_pass == 0 {
            return Err(invalid("max_point_lights_per_pass", "must be at least 1"));
        }
        if self.scene_color_format.is_depth() {
            return Err(invalid("scene_color_format", "must be a color format"));
        }
        if !(self.tone_map.exposure > 0.0) {
            return Err(invalid("tone_map.exposure", "must be positive"));
        }
        Ok(())
    }

    /// The frame-wide shader switches these options imply.
    pub fn global_shader_flags(&self) -> GlobalShaderFlags {
        let mut flags = match self.shader_quality {
            ShaderQuality::Low => GlobalShaderFlags::QUALITY_LOW,
            ShaderQuality::Medium => GlobalShaderFlags::empty(),
            ShaderQuality::High => GlobalShaderFlags::QUALITY_HIGH,
        };
        flags.set(GlobalShaderFlags::FOG, self.fog);
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(RendererOptions::default().validate().is_ok());
        assert!(RendererOptions::conservative().validate().is_ok());
    }

    #[test]
    fn conservative_disables_optional_work() {
        let options = RendererOptions::conservative();
        assert!(!options.ssao);
        assert!(!options.bloom);
        assert!(!options.multithreaded_rendering);
        assert_eq!(options.occlusion_culling, OcclusionCullingMode::Disabled);
        assert_eq!(options.cascade_count, 1);
    }

    #[test]
    fn parses_partial_ron() {
        let options = RendererOptions::from_ron_str(
            "(cascade_count: 2, occlusion_culling: Predicated, debug: (wireframe: true))",
        )
        .unwrap();
        assert_eq!(options.cascade_count, 2);
        assert_eq!(options.occlusion_culling, OcclusionCullingMode::Predicated);
        assert!(options.debug.wireframe);
        assert_eq!(options.shadow_map_resolution, 2048);
    }

    #[test]
    fn rejects_out_of_range_cascades() {
        let err = RendererOptions::from_ron_str("(cascade_count: 9)").unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "cascade_count"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_color_shadow_format() {
        let options = RendererOptions {
            shadow_map_format: TextureFormat::Rgba8Unorm,
            ..RendererOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn reports_parse_errors() {
        assert!(matches!(
            RendererOptions::from_ron_str("(cascade_count: )"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn ron_output_parses_back() {
        let options = RendererOptions::conservative();
        let text = options.to_ron_string().unwrap();
        assert_eq!(RendererOptions::from_ron_str(&text).unwrap(), options);
    }

    #[test]
    fn quality_maps_to_global_flags() {
        let mut options = RendererOptions::default();
        options.shader_quality = ShaderQuality::High;
        options.fog = true;
        let flags = options.global_shader_flags();
        assert!(flags.contains(GlobalShaderFlags::QUALITY_HIGH));
        assert!(flags.contains(GlobalShaderFlags::FOG));
    }
}
