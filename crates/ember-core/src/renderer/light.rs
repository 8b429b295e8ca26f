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

//! Defines the per-frame light entries collected by the render queue.
//!
//! Entries are fixed-size values populated by scene enumeration each frame.
//! The shadow-map index starts at [`NO_SHADOW_MAP`] and is set in place once
//! a shadow renderer assigns a map to the light.

use bitflags::bitflags;

use crate::math::{Sphere, Vec3};

/// Shadow-map index of a light without a shadow map.
pub const NO_SHADOW_MAP: i32 = -1;

bitflags! {
    /// Shadow behavior of a light.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LightShadowFlags: u32 {
        /// The light renders a shadow map.
        const CAST_SHADOWS = 1 << 0;
        /// Percentage-closer filtering when sampling.
        const SOFT_SHADOWS = 1 << 1;
        /// Only static geometry contributes to the map.
        const STATIC_ONLY = 1 << 2;
    }
}

/// A directional light such as the sun.
///
/// # Examples
///
/// ```
/// use ember_core::renderer::{DirectionalLightEntry, LightShadowFlags};
/// use ember_core::math::Vec3;
///
/// let sun = DirectionalLightEntry::new(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE, 3.0)
///     .with_shadows(LightShadowFlags::CAST_SHADOWS);
/// assert!(sun.casts_shadows());
/// assert!(!sun.has_shadow_map());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLightEntry {
    /// Normalized direction the light travels in.
    pub direction: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Shadow behavior.
    pub shadow_flags: LightShadowFlags,
    /// Index into the cascaded shadow-map cache, or [`NO_SHADOW_MAP`].
    pub shadow_map_index: i32,
}

impl DirectionalLightEntry {
    /// A non-shadowing directional light.
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
            shadow_flags: LightShadowFlags::empty(),
            shadow_map_index: NO_SHADOW_MAP,
        }
    }

    /// Sets the shadow flags.
    pub fn with_shadows(mut self, flags: LightShadowFlags) -> Self {
        self.shadow_flags = flags;
        self
    }

    /// Returns `true` if the light asks for a shadow map.
    pub fn casts_shadows(&self) -> bool {
        self.shadow_flags.contains(LightShadowFlags::CAST_SHADOWS)
    }

    /// Returns `true` once a shadow map has been assigned.
    pub fn has_shadow_map(&self) -> bool {
        self.shadow_map_index != NO_SHADOW_MAP
    }
}

/// An omnidirectional light with a finite range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLightEntry {
    /// World-space position.
    pub position: Vec3,
    /// Distance at which the light contributes nothing.
    pub range: f32,
    /// Attenuation exponent.
    pub falloff: f32,
    /// Linear RGB color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Shadow behavior.
    pub shadow_flags: LightShadowFlags,
    /// Index into the cube shadow-map cache, or [`NO_SHADOW_MAP`].
    pub shadow_map_index: i32,
}

impl PointLightEntry {
    /// A non-shadowing point light.
    pub fn new(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            range,
            falloff: 2.0,
            color,
            intensity,
            shadow_flags: LightShadowFlags::empty(),
            shadow_map_index: NO_SHADOW_MAP,
        }
    }

    /// Sets the shadow flags.
    pub fn with_shadows(mut self, flags: LightShadowFlags) -> Self {
        self.shadow_flags = flags;
        self
    }

    /// Returns `true` if the light asks for a shadow map.
    pub fn casts_shadows(&self) -> bool {
        self.shadow_flags.contains(LightShadowFlags::CAST_SHADOWS)
    }

    /// Returns `true` once a shadow map has been assigned.
    pub fn has_shadow_map(&self) -> bool {
        self.shadow_map_index != NO_SHADOW_MAP
    }

    /// The sphere of influence.
    pub fn bounding_sphere(&self) -> Sphere {
        Sphere::new(self.position, self.range)
    }
}

/// A cone light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLightEntry {
    /// World-space position.
    pub position: Vec3,
    /// Normalized direction of the cone axis.
    pub direction: Vec3,
    /// Distance at which the light contributes nothing.
    pub range: f32,
    /// Full-intensity half angle, radians.
    pub inner_angle: f32,
    /// Zero-intensity half angle, radians.
    pub outer_angle: f32,
    /// Linear RGB color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Shadow behavior.
    pub shadow_flags: LightShadowFlags,
    /// Index into the single shadow-map cache, or [`NO_SHADOW_MAP`].
    pub shadow_map_index: i32,
}

impl SpotLightEntry {
    /// A non-shadowing spot light.
    pub fn new(
        position: Vec3,
        direction: Vec3,
        range: f32,
        outer_angle: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            range,
            inner_angle: outer_angle * 0.8,
            outer_angle,
            color,
            intensity,
            shadow_flags: LightShadowFlags::empty(),
            shadow_map_index: NO_SHADOW_MAP,
        }
    }

    /// Returns `true` if the light asks for a shadow map.
    pub fn casts_shadows(&self) -> bool {
        self.shadow_flags.contains(LightShadowFlags::CAST_SHADOWS)
    }
}

/// A light shaft rendered as a participating-media volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumetricLightEntry {
    /// World-space position.
    pub position: Vec3,
    /// Normalized direction of the shaft.
    pub direction: Vec3,
    /// Length of the shaft.
    pub range: f32,
    /// Linear RGB color.
    pub color: Vec3,
    /// Scattering density.
    pub density: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lights_have_no_shadow_map() {
        let point = PointLightEntry::new(Vec3::ZERO, 10.0, Vec3::ONE, 1.0);
        assert_eq!(point.shadow_map_index, NO_SHADOW_MAP);
        assert!(!point.casts_shadows());
        let spot = SpotLightEntry::new(Vec3::ZERO, Vec3::NEG_Y, 5.0, 0.5, Vec3::ONE, 1.0);
        assert_eq!(spot.shadow_map_index, NO_SHADOW_MAP);
    }

    #[test]
    fn directional_direction_is_normalized() {
        let light = DirectionalLightEntry::new(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 1.0);
        assert_eq!(light.direction, Vec3::NEG_Y);
    }

    #[test]
    fn point_light_sphere_matches_range() {
        let light = PointLightEntry::new(Vec3::X, 4.0, Vec3::ONE, 1.0)
            .with_shadows(LightShadowFlags::CAST_SHADOWS);
        assert!(light.casts_shadows());
        assert!(light.bounding_sphere().contains_point(Vec3::new(4.0, 0.0, 0.0)));
        assert!(!light.bounding_sphere().contains_point(Vec3::new(6.0, 0.0, 0.0)));
    }
}
