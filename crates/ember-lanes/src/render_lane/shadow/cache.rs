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

//! Shadow-map storage and its per-type cache.

use ember_core::math::Mat4;
use ember_core::renderer::{
    DepthStencilViewId, GpuContext, ResourceError, TextureDescriptor, TextureFormat, TextureId,
    TextureKind, TextureUsage, TextureViewDescriptor,
};

/// A depth texture with one view per cascade or cube face.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMapData {
    /// The depth texture.
    pub texture: TextureId,
    /// One depth-stencil view per layer.
    pub views: Vec<DepthStencilViewId>,
    /// Width and height of each layer.
    pub resolution: u32,
    /// World to light clip space, one per layer, as of the last preparation.
    pub view_projections: Vec<Mat4>,
    /// Far view distance of each cascade. Empty for cube and single maps.
    pub split_depths: Vec<f32>,
}

impl ShadowMapData {
    /// Creates the depth texture and its per-layer views.
    ///
    /// ## Errors
    ///
    /// Returns the first creation error. Everything created before it is
    /// destroyed, so a failed allocation leaves nothing behind.
    pub fn allocate(
        gpu: &mut dyn GpuContext,
        label: &str,
        kind: TextureKind,
        resolution: u32,
        format: TextureFormat,
    ) -> Result<Self, ResourceError> {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some(label.into()),
            width: resolution,
            height: resolution,
            mip_levels: 1,
            format,
            kind,
            usage: TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
        })?;

        let layers = kind.layer_count();
        let mut views = Vec::with_capacity(layers as usize);
        for layer in 0..layers {
            match gpu.create_depth_stencil_view(texture, &TextureViewDescriptor::layer(layer)) {
                Ok(view) => views.push(view),
                Err(err) => {
                    log::warn!("ShadowMapData: failed to create view {layer} of {label}: {err}");
                    for view in views {
                        gpu.destroy_depth_stencil_view(view);
                    }
                    gpu.destroy_texture(texture);
                    return Err(err);
                }
            }
        }

        Ok(Self {
            texture,
            views,
            resolution,
            view_projections: vec![Mat4::IDENTITY; layers as usize],
            split_depths: Vec::new(),
        })
    }

    /// Destroys the views and the texture.
    pub fn release(self, gpu: &mut dyn GpuContext) {
        for view in self.views {
            gpu.destroy_depth_stencil_view(view);
        }
        gpu.destroy_texture(self.texture);
    }
}

#[derive(Debug)]
struct Slot {
    data: ShadowMapData,
    active: bool,
}

/// A bounded pool of shadow maps of one type.
///
/// Maps are handed out to lights for one frame. At frame end every map goes
/// inactive and is reused next frame; maps are only destroyed by
/// [`release_all`](Self::release_all).
#[derive(Debug)]
pub struct ShadowMapCache {
    slots: Vec<Slot>,
    capacity: usize,
}

impl ShadowMapCache {
    /// Creates an empty cache holding at most `capacity` maps.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Marks a free map active and returns its index, allocating a new one
    /// through `allocate` if none is free and the cache is not full.
    ///
    /// Returns `None` when the cache is exhausted or the allocation fails.
    pub fn acquire<F>(&mut self, allocate: F) -> Option<usize>
    where
        F: FnOnce() -> Option<ShadowMapData>,
    {
        if let Some(index) = self.slots.iter().position(|slot| !slot.active) {
            self.slots[index].active = true;
            return Some(index);
        }
        if self.slots.len() >= self.capacity {
            return None;
        }
        let data = allocate()?;
        self.slots.push(Slot { data, active: true });
        Some(self.slots.len() - 1)
    }

    /// The map at `index`.
    pub fn get(&self, index: usize) -> Option<&ShadowMapData> {
        self.slots.get(index).map(|slot| &slot.data)
    }

    /// The map at `index`, mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ShadowMapData> {
        self.slots.get_mut(index).map(|slot| &mut slot.data)
    }

    /// Returns `true` if the map at `index` was acquired this frame.
    pub fn is_active(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.active)
    }

    /// Number of maps acquired this frame.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.active).count()
    }

    /// Number of maps allocated.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    /// Maximum number of maps.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks every map inactive.
    pub fn end_frame(&mut self) {
        for slot in &mut self.slots {
            slot.active = false;
        }
    }

    /// Destroys every map.
    pub fn release_all(&mut self, gpu: &mut dyn GpuContext) {
        for slot in self.slots.drain(..) {
            slot.data.release(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_infra::HeadlessGpuContext;

    fn allocate(gpu: &mut HeadlessGpuContext) -> Option<ShadowMapData> {
        ShadowMapData::allocate(gpu, "test", TextureKind::Cube, 64, TextureFormat::Depth32Float).ok()
    }

    #[test]
    fn maps_are_reused_across_frames() {
        let mut gpu = HeadlessGpuContext::new();
        let mut cache = ShadowMapCache::new(2);

        assert_eq!(cache.acquire(|| allocate(&mut gpu)), Some(0));
        assert_eq!(cache.acquire(|| allocate(&mut gpu)), Some(1));
        assert_eq!(cache.acquire(|| allocate(&mut gpu)), None);

        cache.end_frame();
        assert_eq!(cache.active_count(), 0);
        assert_eq!(cache.acquire(|| allocate(&mut gpu)), Some(0));
        assert_eq!(cache.allocated(), 2);
        assert_eq!(gpu.device().stats().textures_created, 2);

        cache.release_all(&mut gpu);
        assert_eq!(gpu.device().live_textures(), 0);
    }

    #[test]
    fn partial_allocation_failure_leaves_nothing() {
        let mut gpu = HeadlessGpuContext::new();
        gpu.device().fail_depth_stencil_views_after(3);
        let result =
            ShadowMapData::allocate(&mut gpu, "cube", TextureKind::Cube, 64, TextureFormat::Depth32Float);
        assert!(result.is_err());
        assert_eq!(gpu.device().live_textures(), 0);
        assert_eq!(gpu.device().live_views(), 0);
    }
}
