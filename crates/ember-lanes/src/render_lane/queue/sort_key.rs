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

//! Sort-key encoding for render-queue entries.
//!
//! A key is a single `u64` so the queue can sort with one integer compare.
//! The bit layout depends on the transparency class:
//!
//! ```text
//! opaque / masked   [class:2][layer:3][depth int:16][material:27][depth frac:16]
//! translucent       [class:2][layer:3][inverted depth 16.16:32][material:27]
//! ```
//!
//! Opaque entries sort front-to-back by whole depth units, then by material
//! within one unit so equal-depth draws batch. Translucent entries sort
//! back-to-front and only fall back to material for identical depths.

use ember_core::renderer::BlendMode;

use super::entry::{RenderPassMask, RenderableEntry};

/// Transparency class of fully opaque entries.
pub const TRANSPARENCY_OPAQUE: u8 = 0;
/// Transparency class of alpha-tested entries.
pub const TRANSPARENCY_MASKED: u8 = 1;
/// Transparency class of blended entries.
pub const TRANSPARENCY_BLENDED: u8 = 2;

const MATERIAL_BITS: u32 = 27;
const MATERIAL_MASK: u64 = (1 << MATERIAL_BITS) - 1;
const LAYER_MASK: u64 = 0b111;
const MAX_DEPTH: f32 = 65536.0;

/// Classifies an entry: masked materials are `1`, blended materials are `2`,
/// and an opaque material with a partially transparent tint is `2` as well.
pub fn transparency_key(entry: &RenderableEntry) -> u8 {
    match entry.material.as_ref().map(|m| m.blend_mode()) {
        Some(BlendMode::Masked) => TRANSPARENCY_MASKED,
        Some(mode) if mode.is_blended() => TRANSPARENCY_BLENDED,
        _ if entry.render_pass_mask.contains(RenderPassMask::TINT)
            && entry.tint_color.a < u8::MAX =>
        {
            TRANSPARENCY_BLENDED
        }
        _ => TRANSPARENCY_OPAQUE,
    }
}

/// Converts a view distance to unsigned 16.16 fixed point.
///
/// Negative and NaN distances clamp to zero, distances past the 16-bit range
/// clamp to the largest representable value.
pub fn depth_to_fixed(view_distance: f32) -> u32 {
    let clamped = if view_distance.is_nan() {
        0.0
    } else {
        view_distance.clamp(0.0, MAX_DEPTH)
    };
    // `as` saturates, so MAX_DEPTH lands on u32::MAX.
    (f64::from(clamped) * 65536.0) as u32
}

/// Builds the sort key for an entry of the given transparency class.
pub fn make_sort_key(transparency: u8, layer: u8, material_hash: u32, view_distance: f32) -> u64 {
    let class = u64::from(transparency & 0b11) << 62;
    let layer = (u64::from(layer) & LAYER_MASK) << 59;
    let material = u64::from(material_hash) & MATERIAL_MASK;
    let depth = depth_to_fixed(view_distance);

    if transparency == TRANSPARENCY_BLENDED {
        let inverted = u64::from(u32::MAX - depth);
        class | layer | (inverted << MATERIAL_BITS) | material
    } else {
        let whole = u64::from(depth >> 16);
        let fraction = u64::from(depth & 0xFFFF);
        class | layer | (whole << 43) | (material << 16) | fraction
    }
}

/// Computes the key of a queued entry from its own fields.
pub fn sort_key_for(entry: &RenderableEntry, transparency: u8) -> u64 {
    let material_hash = entry.material.as_ref().map_or(0, |m| m.sort_hash());
    make_sort_key(transparency, entry.layer, material_hash, entry.view_distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_keys_sort_front_to_back() {
        let near = make_sort_key(TRANSPARENCY_OPAQUE, 0, 42, 3.25);
        let far = make_sort_key(TRANSPARENCY_OPAQUE, 0, 42, 17.5);
        assert!(near < far);
    }

    #[test]
    fn translucent_keys_sort_back_to_front() {
        let near = make_sort_key(TRANSPARENCY_BLENDED, 0, 42, 3.25);
        let far = make_sort_key(TRANSPARENCY_BLENDED, 0, 42, 17.5);
        assert!(far < near);
    }

    #[test]
    fn opaque_equal_depth_bucket_orders_by_material() {
        // Same whole depth unit, the material decides before the fraction.
        let a = make_sort_key(TRANSPARENCY_OPAQUE, 0, 1, 5.9);
        let b = make_sort_key(TRANSPARENCY_OPAQUE, 0, 2, 5.1);
        assert!(a < b);
    }

    #[test]
    fn translucent_depth_dominates_material() {
        let a = make_sort_key(TRANSPARENCY_BLENDED, 0, MATERIAL_MASK as u32, 10.0);
        let b = make_sort_key(TRANSPARENCY_BLENDED, 0, 0, 9.5);
        assert!(a < b);
    }

    #[test]
    fn class_and_layer_dominate_depth() {
        let opaque_far = make_sort_key(TRANSPARENCY_OPAQUE, 0, 0, 60000.0);
        let masked_near = make_sort_key(TRANSPARENCY_MASKED, 0, 0, 0.0);
        let layer_one = make_sort_key(TRANSPARENCY_OPAQUE, 1, 0, 0.0);
        assert!(opaque_far < masked_near);
        assert!(opaque_far < layer_one);
    }

    #[test]
    fn depth_clamps_out_of_range_values() {
        assert_eq!(depth_to_fixed(-4.0), 0);
        assert_eq!(depth_to_fixed(f32::NAN), 0);
        assert_eq!(depth_to_fixed(1.0e9), depth_to_fixed(MAX_DEPTH));
        assert_eq!(depth_to_fixed(1.5), 0x0001_8000);
    }
}
