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

//! Pooled render targets for multi-pass effects.

use std::sync::Arc;

use ember_core::renderer::{
    DepthStencilViewId, GpuContext, RenderTargetViewId, TextureDescriptor, TextureFormat,
    TextureId, TextureKind, TextureUsage, TextureViewDescriptor,
};

/// A pooled 2D texture with the view matching its format.
///
/// Contents are whatever the last user left; nothing is cleared on reuse.
#[derive(Debug, PartialEq, Eq)]
pub struct IntermediateBuffer {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Mip levels.
    pub mip_levels: u32,
    /// The texture.
    pub texture: TextureId,
    /// Render-target view, for color formats.
    pub rtv: Option<RenderTargetViewId>,
    /// Depth-stencil view, for depth formats.
    pub dsv: Option<DepthStencilViewId>,
}

impl IntermediateBuffer {
    fn matches(&self, width: u32, height: u32, format: TextureFormat, mip_levels: u32) -> bool {
        self.width == width
            && self.height == height
            && self.format == format
            && self.mip_levels == mip_levels
    }

    /// The render-target views to bind this buffer as color output.
    pub fn color_targets(&self) -> Vec<RenderTargetViewId> {
        self.rtv.into_iter().collect()
    }

    fn destroy(&self, gpu: &mut dyn GpuContext) {
        if let Some(rtv) = self.rtv {
            gpu.destroy_render_target_view(rtv);
        }
        if let Some(dsv) = self.dsv {
            gpu.destroy_depth_stencil_view(dsv);
        }
        gpu.destroy_texture(self.texture);
    }
}

/// Hands out [`IntermediateBuffer`]s, reusing released ones with the exact
/// same size, format and mip count.
///
/// Every requested buffer must be released before the pool is torn down.
#[derive(Debug, Default)]
pub struct IntermediateBufferPool {
    all: Vec<Arc<IntermediateBuffer>>,
    free: Vec<Arc<IntermediateBuffer>>,
    allocations: u32,
}

impl IntermediateBufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks out a buffer, allocating one if no free buffer matches.
    ///
    /// Returns `None` if the texture or its view cannot be created; nothing
    /// stays allocated in that case.
    pub fn request(
        &mut self,
        gpu: &mut dyn GpuContext,
        width: u32,
        height: u32,
        format: TextureFormat,
        mip_levels: u32,
    ) -> Option<Arc<IntermediateBuffer>> {
        if let Some(position) = self
            .free
            .iter()
            .position(|buffer| buffer.matches(width, height, format, mip_levels))
        {
            return Some(self.free.swap_remove(position));
        }

        let buffer = Arc::new(Self::allocate(gpu, width, height, format, mip_levels)?);
        self.all.push(buffer.clone());
        self.allocations += 1;
        Some(buffer)
    }

    fn allocate(
        gpu: &mut dyn GpuContext,
        width: u32,
        height: u32,
        format: TextureFormat,
        mip_levels: u32,
    ) -> Option<IntermediateBuffer> {
        let usage = if format.is_depth() {
            TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED
        } else {
            TextureUsage::RENDER_TARGET
                | TextureUsage::SAMPLED
                | TextureUsage::COPY_SRC
                | TextureUsage::COPY_DST
        };
        let texture = match gpu.create_texture(&TextureDescriptor {
            label: Some(format!("intermediate {width}x{height} {format:?}").into()),
            width,
            height,
            mip_levels,
            format,
            kind: TextureKind::D2,
            usage,
        }) {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!("IntermediateBufferPool: {width}x{height} {format:?} failed: {err}");
                return None;
            }
        };

        let view = TextureViewDescriptor::layer(0);
        let views = if format.is_depth() {
            gpu.create_depth_stencil_view(texture, &view)
                .map(|dsv| (None, Some(dsv)))
        } else {
            gpu.create_render_target_view(texture, &view)
                .map(|rtv| (Some(rtv), None))
        };
        let (rtv, dsv) = match views {
            Ok(views) => views,
            Err(err) => {
                log::warn!("IntermediateBufferPool: view for {format:?} failed: {err}");
                gpu.destroy_texture(texture);
                return None;
            }
        };

        Some(IntermediateBuffer {
            width,
            height,
            format,
            mip_levels,
            texture,
            rtv,
            dsv,
        })
    }

    /// Returns a buffer to the pool.
    pub fn release(&mut self, buffer: Arc<IntermediateBuffer>) {
        debug_assert!(
            self.all.iter().any(|known| Arc::ptr_eq(known, &buffer)),
            "buffer does not belong to this pool"
        );
        debug_assert!(
            !self.free.iter().any(|free| Arc::ptr_eq(free, &buffer)),
            "buffer released twice"
        );
        self.free.push(buffer);
    }

    /// Number of buffers ever allocated.
    pub fn allocation_count(&self) -> u32 {
        self.allocations
    }

    /// Number of buffers currently alive.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Returns `true` if no buffer is alive.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Number of buffers checked out.
    pub fn in_use(&self) -> usize {
        self.all.len() - self.free.len()
    }

    /// Every live buffer, for the debug view.
    pub fn buffers(&self) -> &[Arc<IntermediateBuffer>] {
        &self.all
    }

    /// Destroys every buffer. All of them must have been released.
    pub fn release_all(&mut self, gpu: &mut dyn GpuContext) {
        debug_assert_eq!(
            self.all.len(),
            self.free.len(),
            "intermediate buffers still checked out"
        );
        self.free.clear();
        for buffer in self.all.drain(..) {
            buffer.destroy(gpu);
        }
    }
}

impl Drop for IntermediateBufferPool {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.all.len(),
                self.free.len(),
                "intermediate buffers leaked past pool teardown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_infra::HeadlessGpuContext;

    #[test]
    fn released_buffer_is_reused() {
        let mut gpu = HeadlessGpuContext::new();
        let mut pool = IntermediateBufferPool::new();

        let first = pool
            .request(&mut gpu, 256, 128, TextureFormat::Rgba16Float, 1)
            .unwrap();
        assert_eq!(pool.allocation_count(), 1);
        pool.release(first.clone());

        let second = pool
            .request(&mut gpu, 256, 128, TextureFormat::Rgba16Float, 1)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.allocation_count(), 1);

        pool.release(second);
        pool.release_all(&mut gpu);
    }

    #[test]
    fn different_key_allocates() {
        let mut gpu = HeadlessGpuContext::new();
        let mut pool = IntermediateBufferPool::new();
        let a = pool.request(&mut gpu, 64, 64, TextureFormat::Rgba8Unorm, 1).unwrap();
        pool.release(a);
        let b = pool.request(&mut gpu, 64, 64, TextureFormat::Rgba8Unorm, 2).unwrap();
        let c = pool.request(&mut gpu, 64, 32, TextureFormat::Rgba8Unorm, 1).unwrap();
        assert_eq!(pool.allocation_count(), 3);
        assert_eq!(pool.in_use(), 2);
        pool.release(b);
        pool.release(c);
        pool.release_all(&mut gpu);
        assert_eq!(gpu.device().live_textures(), 0);
    }

    #[test]
    fn depth_formats_get_depth_views() {
        let mut gpu = HeadlessGpuContext::new();
        let mut pool = IntermediateBufferPool::new();
        let depth = pool
            .request(&mut gpu, 32, 32, TextureFormat::Depth24PlusStencil8, 1)
            .unwrap();
        assert!(depth.dsv.is_some());
        assert!(depth.rtv.is_none());
        pool.release(depth);
        pool.release_all(&mut gpu);
    }

    #[test]
    fn failed_view_releases_texture() {
        let mut gpu = HeadlessGpuContext::new();
        gpu.device().fail_render_target_views_after(0);
        let mut pool = IntermediateBufferPool::new();
        assert!(pool.request(&mut gpu, 32, 32, TextureFormat::Rgba8Unorm, 1).is_none());
        assert_eq!(gpu.device().live_textures(), 0);
        assert_eq!(pool.allocation_count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic(expected = "released twice")]
    #[cfg(debug_assertions)]
    fn double_release_is_caught() {
        let mut gpu = HeadlessGpuContext::new();
        let mut pool = IntermediateBufferPool::new();
        let buffer = pool.request(&mut gpu, 8, 8, TextureFormat::R32Float, 1).unwrap();
        pool.release(buffer.clone());
        pool.release(buffer);
    }
}
