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

//! Math types used by the render core.
//!
//! Vector and matrix types come from `glam`; this module adds the bounding
//! volumes and the packed color type the render queue works with.

pub mod color;
pub mod geometry;

pub use color::Color32;
pub use geometry::{Aabb, Frustum, Plane, Sphere};
pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

/// A small value used for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;
