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

use ember_core::renderer::{Camera, RendererOptions};
use ember_lanes::render_lane::RendererKind;

/// Work sent from the main thread to the render thread.
#[derive(Debug, Clone)]
pub enum RenderCommand {
    /// Render one frame of the shared world.
    RenderFrame {
        /// Seconds since the previous frame.
        delta_time: f32,
        /// The view to render.
        camera: Camera,
    },
    /// Recreate the back buffer at a new size.
    Resize {
        /// New width in pixels.
        width: u32,
        /// New height in pixels.
        height: u32,
    },
    /// Replace the renderer with one built from new options. `kind` keeps
    /// the current renderer kind when `None`.
    RecreateRenderer {
        /// Renderer to build.
        kind: Option<RendererKind>,
        /// Options for the new renderer.
        options: RendererOptions,
    },
    /// Release every GPU resource and stop the render thread.
    Shutdown,
}

impl RenderCommand {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            RenderCommand::RenderFrame { .. } => "RenderFrame",
            RenderCommand::Resize { .. } => "Resize",
            RenderCommand::RecreateRenderer { .. } => "RecreateRenderer",
            RenderCommand::Shutdown => "Shutdown",
        }
    }
}
