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

// Ember headless runtime
// Renders the demo scene for a number of frames and prints what was drawn.

mod scene;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use ember_agents::{RenderAgent, RenderAgentConfig};
use ember_core::renderer::{RenderStats, RendererOptions};
use ember_infra::{HeadlessGpuContext, InMemoryShaderLibrary};
use ember_lanes::render_lane::RendererKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Renderer to start with (forward, deferred, mobile, debug-normals, full-bright)
    #[arg(short, long, default_value = "forward")]
    renderer: RendererKind,

    /// Number of frames to render
    #[arg(short, long, default_value_t = 120)]
    frames: u32,

    /// RON file with renderer options
    #[arg(short, long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Back-buffer width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Back-buffer height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Run every frame on the main thread
    #[arg(long)]
    inline: bool,

    /// Switch to this renderer halfway through the run
    #[arg(long, value_name = "RENDERER")]
    switch_to: Option<RendererKind>,
}

fn load_options(path: Option<&PathBuf>) -> Result<RendererOptions> {
    let Some(path) = path else {
        return Ok(RendererOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read options file {}", path.display()))?;
    let options = RendererOptions::from_ron_str(&text)
        .with_context(|| format!("invalid options file {}", path.display()))?;
    log::info!("Options loaded from {}", path.display());
    Ok(options)
}

fn print_summary(kind: RendererKind, frames: u64, totals: &RenderStats, last: &RenderStats, seconds: f32) {
    let per_frame = |value: u32| value as f32 / frames.max(1) as f32;
    println!("renderer            {kind}");
    println!("frames              {frames} in {seconds:.2} s");
    println!("draw calls / frame  {:.1}", per_frame(totals.draw_calls));
    println!("skipped / frame     {:.1}", per_frame(totals.skipped_draws));
    println!("opaque / frame      {:.1}", per_frame(totals.opaque_drawn));
    println!("translucent / frame {:.1}", per_frame(totals.translucent_drawn));
    println!("lights / frame      {:.1}", per_frame(totals.lights_drawn));
    println!(
        "shadow maps         {} cascaded, {} cube, {} single (last frame)",
        last.directional_shadow_maps, last.point_shadow_maps, last.spot_shadow_maps
    );
    println!(
        "occlusion           {} tested, {} culled (last frame)",
        last.occluders_tested, last.occlusion_culled
    );
    println!("intermediate bufs   {}", last.intermediate_buffers_allocated);
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let options = load_options(args.options.as_ref())?;

    let mut gpu = HeadlessGpuContext::new();
    let device = gpu.device().clone();
    let world = Arc::new(scene::build(&mut gpu)?);
    let library = Arc::new(InMemoryShaderLibrary::new());

    let mut agent = RenderAgent::spawn(
        RenderAgentConfig {
            kind: args.renderer,
            options: options.clone(),
            width: args.width,
            height: args.height,
            threaded: !args.inline,
        },
        Box::new(gpu),
        library,
        world,
    )
    .context("cannot start the renderer")?;

    let aspect = args.width as f32 / args.height.max(1) as f32;
    let frame_time = 1.0 / 60.0;
    let started = Instant::now();
    let mut totals = RenderStats::default();
    for frame in 0..args.frames {
        if frame == args.frames / 2 {
            if let Some(kind) = args.switch_to {
                log::info!("Switching to the {kind} renderer");
                agent.recreate_renderer(Some(kind), options.clone())?;
            }
        }

        let camera = scene::orbit_camera(frame as f32 * frame_time, aspect);
        agent.begin_frame(frame_time, camera)?;
        agent.wait_events_ready();
        // Game update would run here, overlapping the render thread.
        agent.wait_frame_complete();

        let stats = agent.last_stats();
        log::debug!(
            "Frame {}: {} draws, {} skipped",
            stats.frame_number,
            stats.draw_calls,
            stats.skipped_draws
        );
        totals.draw_calls += stats.draw_calls;
        totals.skipped_draws += stats.skipped_draws;
        totals.opaque_drawn += stats.opaque_drawn;
        totals.translucent_drawn += stats.translucent_drawn;
        totals.lights_drawn += stats.lights_drawn;
    }

    let last = agent.last_stats();
    let kind = agent.renderer_kind();
    let frames = agent.frames_rendered();
    agent.shutdown();

    print_summary(kind, frames, &totals, &last, started.elapsed().as_secs_f32());
    let gpu_stats = device.stats();
    println!(
        "device              {} draws executed, {} predicated skips, {} command lists",
        gpu_stats.draw_calls, gpu_stats.predicated_draws_skipped, gpu_stats.command_lists_executed
    );
    if device.live_textures() > 0 {
        log::warn!("{} textures still alive after shutdown", device.live_textures());
    }
    Ok(())
}
