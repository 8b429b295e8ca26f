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

//! Defines the RenderAgent, which owns the render thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use ember_core::renderer::{
    Camera, GpuContext, RenderError, RenderStats, RendererOptions, ResourceError, ShaderLibrary,
    TextureDescriptor, TextureFormat, TextureUsage, TextureViewDescriptor,
};
use ember_lanes::render_lane::{FrameRenderer, OutputTarget, RenderWorld, RendererKind};

use super::command::RenderCommand;
use super::event::ManualResetEvent;
use super::factory::create_renderer_with_fallback;

const BACKBUFFER_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// How a [`RenderAgent`] starts.
#[derive(Debug, Clone)]
pub struct RenderAgentConfig {
    /// Renderer to build first.
    pub kind: RendererKind,
    /// Options of that renderer.
    pub options: RendererOptions,
    /// Back-buffer width in pixels.
    pub width: u32,
    /// Back-buffer height in pixels.
    pub height: u32,
    /// Run frames on a dedicated thread. When `false` every command runs
    /// on the calling thread, with the same handshake.
    pub threaded: bool,
}

impl Default for RenderAgentConfig {
    fn default() -> Self {
        Self {
            kind: RendererKind::Forward,
            options: RendererOptions::default(),
            width: 1280,
            height: 720,
            threaded: true,
        }
    }
}

/// State visible to both threads.
#[derive(Debug)]
struct SharedState {
    events_ready: ManualResetEvent,
    frame_complete: ManualResetEvent,
    stats: Mutex<RenderStats>,
    kind: Mutex<RendererKind>,
    frames_rendered: AtomicU64,
}

impl SharedState {
    fn stats(&self) -> MutexGuard<'_, RenderStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn kind(&self) -> MutexGuard<'_, RendererKind> {
        self.kind.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Releases anyone waiting on the barrier.
    fn open_barrier(&self) {
        self.events_ready.set();
        self.frame_complete.set();
    }
}

/// Opens the barrier when the render thread exits, even by panic.
struct OpenBarrierOnExit(Arc<SharedState>);

impl Drop for OpenBarrierOnExit {
    fn drop(&mut self) {
        self.0.open_barrier();
    }
}

fn create_backbuffer(
    gpu: &mut dyn GpuContext,
    width: u32,
    height: u32,
) -> Result<OutputTarget, ResourceError> {
    let texture = gpu.create_texture(&TextureDescriptor::d2(
        "backbuffer",
        width,
        height,
        BACKBUFFER_FORMAT,
        1,
        TextureUsage::RENDER_TARGET | TextureUsage::COPY_DST,
    ))?;
    let view = match gpu.create_render_target_view(texture, &TextureViewDescriptor::layer(0)) {
        Ok(view) => view,
        Err(err) => {
            gpu.destroy_texture(texture);
            return Err(err);
        }
    };
    Ok(OutputTarget {
        texture,
        view,
        width,
        height,
        format: BACKBUFFER_FORMAT,
    })
}

fn destroy_backbuffer(gpu: &mut dyn GpuContext, output: &OutputTarget) {
    gpu.destroy_render_target_view(output.view);
    gpu.destroy_texture(output.texture);
}

/// Everything the render thread owns.
struct RenderLoop {
    gpu: Box<dyn GpuContext>,
    library: Arc<dyn ShaderLibrary>,
    world: Arc<dyn RenderWorld>,
    renderer: Box<dyn FrameRenderer>,
    backbuffer: OutputTarget,
    shared: Arc<SharedState>,
    released: bool,
}

impl RenderLoop {
    /// Executes one command. Returns `false` once the loop must stop.
    fn handle(&mut self, command: RenderCommand) -> bool {
        log::trace!("RenderAgent: executing {}", command.name());
        match command {
            RenderCommand::RenderFrame { delta_time, camera } => {
                self.render_frame(delta_time, &camera);
                true
            }
            RenderCommand::Resize { width, height } => {
                self.resize(width, height);
                true
            }
            RenderCommand::RecreateRenderer { kind, options } => {
                self.recreate_renderer(kind, options);
                true
            }
            RenderCommand::Shutdown => {
                self.release();
                false
            }
        }
    }

    fn render_frame(&mut self, delta_time: f32, camera: &Camera) {
        // Every command sent before this frame has been applied.
        self.shared.events_ready.set();

        let gpu = self.gpu.as_mut();
        if let Err(err) = self
            .renderer
            .draw_world(gpu, self.world.as_ref(), camera, &self.backbuffer)
        {
            log::error!("RenderAgent: frame dropped: {err}");
        }
        self.renderer.on_frame_complete(gpu);

        let stats = self.renderer.render_stats().clone();
        log::trace!(
            "RenderAgent: frame {} done in {:.3} ms (dt {:.4} s)",
            stats.frame_number,
            stats.cpu_frame_time_ms,
            delta_time
        );
        *self.shared.stats() = stats;
        self.shared.frames_rendered.fetch_add(1, Ordering::Release);
        self.shared.frame_complete.set();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("RenderAgent: ignoring resize to {width}x{height}");
            return;
        }
        if (width, height) == (self.backbuffer.width, self.backbuffer.height) {
            return;
        }
        match create_backbuffer(self.gpu.as_mut(), width, height) {
            Ok(backbuffer) => {
                destroy_backbuffer(self.gpu.as_mut(), &self.backbuffer);
                self.backbuffer = backbuffer;
                log::info!("RenderAgent: back buffer resized to {width}x{height}");
            }
            Err(err) => log::error!(
                "RenderAgent: cannot resize back buffer to {width}x{height}, keeping {}x{}: {err}",
                self.backbuffer.width,
                self.backbuffer.height
            ),
        }
    }

    fn recreate_renderer(&mut self, kind: Option<RendererKind>, options: RendererOptions) {
        let kind = kind.unwrap_or_else(|| self.renderer.kind());
        let gpu = self.gpu.as_mut();
        match create_renderer_with_fallback(kind, options, Arc::clone(&self.library), gpu) {
            Ok(renderer) => {
                let mut previous = std::mem::replace(&mut self.renderer, renderer);
                previous.shutdown(gpu);
                *self.shared.kind() = self.renderer.kind();
            }
            Err(err) => log::error!(
                "RenderAgent: keeping the {} renderer, replacement failed: {err}",
                self.renderer.kind()
            ),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let gpu = self.gpu.as_mut();
        self.renderer.shutdown(gpu);
        destroy_backbuffer(gpu, &self.backbuffer);
        log::info!("RenderAgent: renderer shut down");
    }

    fn run(mut self, commands: Receiver<RenderCommand>) {
        let _barrier = OpenBarrierOnExit(Arc::clone(&self.shared));
        log::info!("RenderAgent: render thread started");
        while let Ok(command) = commands.recv() {
            if !self.handle(command) {
                break;
            }
        }
        // The channel may close without a Shutdown.
        self.release();
        log::info!("RenderAgent: render thread stopped");
    }
}

enum Mode {
    Threaded {
        commands: Sender<RenderCommand>,
        thread: Option<JoinHandle<()>>,
    },
    Inline(Option<Box<RenderLoop>>),
}

/// Owns a frame renderer and runs it on the render thread.
///
/// The main thread drives frames through [`begin_frame`](Self::begin_frame),
/// [`wait_events_ready`](Self::wait_events_ready) and
/// [`wait_frame_complete`](Self::wait_frame_complete).
pub struct RenderAgent {
    shared: Arc<SharedState>,
    mode: Mode,
}

impl RenderAgent {
    /// Creates the renderer and the back buffer on `gpu`, then starts the
    /// render thread (or keeps everything on this thread, see
    /// [`RenderAgentConfig::threaded`]).
    ///
    /// ## Errors
    ///
    /// * `RenderError::InitializationFailed` - If neither the requested
    ///   renderer nor the conservative fallback could be initialized.
    /// * `RenderError::ResourceError` - If the back buffer cannot be created.
    /// * `RenderError::Internal` - If the render thread cannot be spawned.
    pub fn spawn(
        config: RenderAgentConfig,
        mut gpu: Box<dyn GpuContext>,
        library: Arc<dyn ShaderLibrary>,
        world: Arc<dyn RenderWorld>,
    ) -> Result<Self, RenderError> {
        let mut renderer =
            create_renderer_with_fallback(config.kind, config.options, Arc::clone(&library), gpu.as_mut())?;
        let backbuffer = match create_backbuffer(gpu.as_mut(), config.width, config.height) {
            Ok(backbuffer) => backbuffer,
            Err(err) => {
                renderer.shutdown(gpu.as_mut());
                return Err(err.into());
            }
        };

        let shared = Arc::new(SharedState {
            // No frame is in flight yet.
            events_ready: ManualResetEvent::new(true),
            frame_complete: ManualResetEvent::new(true),
            stats: Mutex::new(RenderStats::default()),
            kind: Mutex::new(renderer.kind()),
            frames_rendered: AtomicU64::new(0),
        });
        let state = RenderLoop {
            gpu,
            library,
            world,
            renderer,
            backbuffer,
            shared: Arc::clone(&shared),
            released: false,
        };

        let mode = if config.threaded {
            let (sender, receiver) = crossbeam_channel::unbounded();
            let thread = thread::Builder::new()
                .name("ember-render".to_string())
                .spawn(move || state.run(receiver))
                .map_err(|err| RenderError::Internal(format!("cannot spawn render thread: {err}")))?;
            Mode::Threaded {
                commands: sender,
                thread: Some(thread),
            }
        } else {
            Mode::Inline(Some(Box::new(state)))
        };
        Ok(Self { shared, mode })
    }

    fn send(&mut self, command: RenderCommand) -> Result<(), RenderError> {
        match &mut self.mode {
            Mode::Threaded { commands, thread } => {
                if thread.is_none() {
                    return Err(RenderError::ThreadDisconnected);
                }
                commands.send(command).map_err(|_| {
                    self.shared.open_barrier();
                    RenderError::ThreadDisconnected
                })
            }
            Mode::Inline(state) => {
                let Some(running) = state.as_mut() else {
                    return Err(RenderError::ThreadDisconnected);
                };
                if !running.handle(command) {
                    *state = None;
                    self.shared.open_barrier();
                }
                Ok(())
            }
        }
    }

    /// Starts a frame: resets both events and hands the frame to the
    /// render thread.
    ///
    /// ## Errors
    ///
    /// `RenderError::ThreadDisconnected` after shutdown or if the render
    /// thread died.
    pub fn begin_frame(&mut self, delta_time: f32, camera: Camera) -> Result<(), RenderError> {
        if !self.is_running() {
            return Err(RenderError::ThreadDisconnected);
        }
        self.shared.events_ready.reset();
        self.shared.frame_complete.reset();
        self.send(RenderCommand::RenderFrame { delta_time, camera })
    }

    /// Blocks until the render thread has applied every earlier command
    /// and started the current frame.
    pub fn wait_events_ready(&self) {
        self.shared.events_ready.wait();
    }

    /// Blocks until the current frame is finished.
    pub fn wait_frame_complete(&self) {
        self.shared.frame_complete.wait();
    }

    /// Recreates the back buffer at the next command boundary.
    ///
    /// ## Errors
    ///
    /// `RenderError::ThreadDisconnected` after shutdown.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.send(RenderCommand::Resize { width, height })
    }

    /// Replaces the renderer. A failed replacement keeps the current one.
    ///
    /// ## Errors
    ///
    /// `RenderError::ThreadDisconnected` after shutdown.
    pub fn recreate_renderer(
        &mut self,
        kind: Option<RendererKind>,
        options: RendererOptions,
    ) -> Result<(), RenderError> {
        self.send(RenderCommand::RecreateRenderer { kind, options })
    }

    /// Statistics of the last completed frame.
    pub fn last_stats(&self) -> RenderStats {
        self.shared.stats().clone()
    }

    /// Frames completed since the agent started.
    pub fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }

    /// The renderer currently in use.
    pub fn renderer_kind(&self) -> RendererKind {
        *self.shared.kind()
    }

    /// Returns `true` until [`shutdown`](Self::shutdown).
    pub fn is_running(&self) -> bool {
        match &self.mode {
            Mode::Threaded { thread, .. } => thread.is_some(),
            Mode::Inline(state) => state.is_some(),
        }
    }

    /// Releases the renderer and joins the render thread. Does nothing the
    /// second time.
    pub fn shutdown(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(err) = self.send(RenderCommand::Shutdown) {
            log::warn!("RenderAgent: shutdown not delivered: {err}");
        }
        if let Mode::Threaded { thread, .. } = &mut self.mode {
            if let Some(handle) = thread.take() {
                if handle.join().is_err() {
                    log::error!("RenderAgent: render thread panicked");
                }
            }
        }
    }
}

impl Drop for RenderAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}
