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

//! Foundational contracts for the Ember render core.
//!
//! This crate defines the "what" of rendering: the [`GpuContext`] capability
//! interface every backend implements, the opaque resource handles it hands out,
//! the per-frame data types (lights, cameras, materials), the renderer options
//! and the error hierarchy. The hot-path algorithms live in `ember-lanes`, and
//! concrete backends live in `ember-infra`.
//!
//! [`GpuContext`]: renderer::traits::GpuContext

#![warn(missing_docs)]

pub mod math;
pub mod renderer;

pub use renderer::traits::{GpuContext, ShaderLibrary};
