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

//! Concrete backends for the Ember render core.
//!
//! - [`graphics::headless::HeadlessGpuContext`]: a recording `GpuContext` that
//!   tracks resources, resolves occlusion queries from a script and logs every
//!   command. It drives the runtime demo and every GPU-facing test.
//! - [`graphics::shader_library::InMemoryShaderLibrary`]: a `ShaderLibrary` that
//!   hands out program ids on demand and can be told which permutations are
//!   missing.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::headless::{GpuCommand, HeadlessDevice, HeadlessGpuContext, HeadlessStats};
pub use graphics::shader_library::InMemoryShaderLibrary;
