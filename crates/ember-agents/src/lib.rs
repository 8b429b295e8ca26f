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

//! Drives the render lanes from the main thread.
//!
//! The [`render_agent`] owns a frame renderer on a dedicated render thread,
//! feeds it typed commands, and paces the main thread with a two-event
//! frame barrier. It also hosts the renderer factory and its fallback path.

#![warn(missing_docs)]

pub mod render_agent;

pub use render_agent::{
    build_renderer, create_renderer, create_renderer_with_fallback, ManualResetEvent, RenderAgent,
    RenderAgentConfig, RenderCommand,
};
