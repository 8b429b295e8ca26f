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

//! The render agent: render thread, command channel and renderer factory.
//!
//! One frame follows a strict handshake. The main thread calls
//! [`RenderAgent::begin_frame`], waits for `events_ready` before touching
//! input, runs its own update, then waits for `frame_complete` before
//! starting the next iteration. At most one frame of main-thread work
//! overlaps one frame of render-thread work.

mod agent;
mod command;
mod event;
mod factory;

pub use agent::{RenderAgent, RenderAgentConfig};
pub use command::RenderCommand;
pub use event::ManualResetEvent;
pub use factory::{build_renderer, create_renderer, create_renderer_with_fallback};
