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

//! Provides the public, backend-agnostic rendering contracts.
//!
//! This module defines the "common language" for all rendering operations: the
//! [`GpuContext`] and [`ShaderLibrary`] traits, the resource handles and
//! descriptors they exchange, and the per-frame data (lights, cameras,
//! materials). The render queue and the frame renderers in `ember-lanes` are
//! written purely against these contracts, so they can run against a recording
//! backend in tests just as well as against a real device.

pub mod api;
pub mod camera;
pub mod error;
pub mod light;
pub mod material;
pub mod traits;

pub use self::api::*;
pub use self::camera::{Camera, Projection};
pub use self::error::{RenderError, ResourceError};
pub use self::light::{
    DirectionalLightEntry, LightShadowFlags, PointLightEntry, SpotLightEntry,
    VolumetricLightEntry, NO_SHADOW_MAP,
};
pub use self::material::{BasicMaterial, BlendMode, Material, ShadingModel};
pub use self::traits::{GpuContext, ShaderLibrary};
