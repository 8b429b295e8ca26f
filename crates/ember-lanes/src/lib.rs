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

//! Hot-path rendering pipelines for the Ember render core.
//!
//! Everything here is written against the contracts in `ember-core` and runs on
//! the render thread (or on shadow worker threads it spawns):
//!
//! - [`render_lane::RenderQueue`] collects, classifies and sorts a frame's draws.
//! - [`render_lane::ShaderProgramSelector`] avoids redundant program lookups.
//! - [`render_lane::shadow`] renders cascaded, cube and single shadow maps.
//! - [`render_lane::world::WorldRenderer`] owns the per-frame skeleton and its
//!   shared services (buffer pool, occlusion culling, command-list scheduling).
//! - The frame renderers (forward, deferred, mobile, single-shader) plug their
//!   pass ordering into that skeleton.

#![warn(missing_docs)]

pub mod render_lane;
