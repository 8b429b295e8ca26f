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

//! The boundary between the scene and the renderers.
//!
//! The renderers never look inside scene objects. A [`RenderWorld`] pushes
//! every [`RenderProxy`] that may be visible from a frustum, and each proxy
//! queues its own draw requests and later issues its own draw calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ember_core::math::{Aabb, Frustum};
use ember_core::renderer::{Camera, GpuContext, ProgramId};

use super::queue::{RenderQueue, RenderableEntry};

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a render proxy for invalidation and predication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub u64);

impl ProxyId {
    /// Returns a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A scene object as the renderers see it.
///
/// The renderer calls `queue_for_render` once per view per frame, then
/// `setup_for_draw` followed by `draw_queue_entry` for every queued entry that
/// survives culling and has a program.
pub trait RenderProxy: Send + Sync {
    /// Stable id of this proxy.
    fn proxy_id(&self) -> ProxyId;

    /// World-space bounds used for frustum tests.
    fn bounds(&self) -> Aabb;

    /// Proxies that return `true` are enumerated regardless of the frustum.
    fn ignores_culling(&self) -> bool {
        false
    }

    /// Pushes this proxy's draw requests, lights and occluders into `queue`.
    ///
    /// ## Arguments
    ///
    /// * `camera` - The view the queue is being filled for.
    /// * `queue` - The queue to fill; it drops whatever it does not accept.
    fn queue_for_render(self: Arc<Self>, camera: &Camera, queue: &mut RenderQueue);

    /// Uploads per-object state (object constants, buffers) for `entry`.
    /// Called after `program` has been made active.
    fn setup_for_draw(
        &self,
        camera: &Camera,
        entry: &RenderableEntry,
        gpu: &mut dyn GpuContext,
        program: ProgramId,
    );

    /// Issues the draw call for `entry`.
    fn draw_queue_entry(&self, camera: &Camera, entry: &RenderableEntry, gpu: &mut dyn GpuContext);

    /// Draws debug geometry for this proxy. Does nothing by default.
    fn draw_debug_info(&self, _camera: &Camera, _gpu: &mut dyn GpuContext) {}
}

/// A collection of proxies that can be enumerated by frustum.
pub trait RenderWorld: Send + Sync {
    /// Calls `visit` for every proxy that may intersect `frustum`.
    fn enumerate_renderables_in_frustum(
        &self,
        frustum: &Frustum,
        visit: &mut dyn FnMut(&Arc<dyn RenderProxy>),
    );
}

/// Fills `queue` with everything `world` reports inside `camera`'s frustum.
pub fn fill_queue(world: &dyn RenderWorld, camera: &Camera, queue: &mut RenderQueue) {
    world.enumerate_renderables_in_frustum(camera.frustum(), &mut |proxy| {
        Arc::clone(proxy).queue_for_render(camera, queue);
    });
}

/// A flat list of proxies, tested one by one.
#[derive(Default)]
pub struct SceneList {
    proxies: Vec<Arc<dyn RenderProxy>>,
}

impl SceneList {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a proxy.
    pub fn add(&mut self, proxy: Arc<dyn RenderProxy>) {
        self.proxies.push(proxy);
    }

    /// Removes the proxy with the given id. Returns `true` if it was present.
    pub fn remove(&mut self, id: ProxyId) -> bool {
        let before = self.proxies.len();
        self.proxies.retain(|proxy| proxy.proxy_id() != id);
        self.proxies.len() != before
    }

    /// Number of proxies.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Returns `true` if the scene holds no proxy.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

impl RenderWorld for SceneList {
    fn enumerate_renderables_in_frustum(
        &self,
        frustum: &Frustum,
        visit: &mut dyn FnMut(&Arc<dyn RenderProxy>),
    ) {
        for proxy in &self.proxies {
            if proxy.ignores_culling() {
                visit(proxy);
                continue;
            }
            // Cheap sphere rejection first, then the tighter box test.
            let bounds = proxy.bounds();
            if frustum.intersects_sphere(&bounds.bounding_sphere()) && frustum.intersects_aabb(&bounds) {
                visit(proxy);
            }
        }
    }
}

impl std::fmt::Debug for SceneList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneList")
            .field("proxies", &self.proxies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::math::Vec3;

    struct Marker {
        id: ProxyId,
        bounds: Aabb,
        always: bool,
    }

    impl RenderProxy for Marker {
        fn proxy_id(&self) -> ProxyId {
            self.id
        }
        fn bounds(&self) -> Aabb {
            self.bounds
        }
        fn ignores_culling(&self) -> bool {
            self.always
        }
        fn queue_for_render(self: Arc<Self>, _camera: &Camera, _queue: &mut RenderQueue) {}
        fn setup_for_draw(&self, _: &Camera, _: &RenderableEntry, _: &mut dyn GpuContext, _: ProgramId) {}
        fn draw_queue_entry(&self, _: &Camera, _: &RenderableEntry, _: &mut dyn GpuContext) {}
    }

    fn marker(center: Vec3, always: bool) -> Arc<dyn RenderProxy> {
        Arc::new(Marker {
            id: ProxyId::next(),
            bounds: Aabb::from_center_half_extents(center, Vec3::splat(0.5)),
            always,
        })
    }

    fn camera() -> Camera {
        Camera::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            1.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn enumerates_only_proxies_in_frustum() {
        let mut scene = SceneList::new();
        let visible = marker(Vec3::ZERO, false);
        scene.add(visible.clone());
        scene.add(marker(Vec3::new(0.0, 0.0, 50.0), false));
        scene.add(marker(Vec3::new(0.0, 0.0, 50.0), true));

        let mut seen = Vec::new();
        scene.enumerate_renderables_in_frustum(camera().frustum(), &mut |proxy| {
            seen.push(proxy.proxy_id());
        });
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], visible.proxy_id());
    }

    #[test]
    fn remove_by_id() {
        let mut scene = SceneList::new();
        let proxy = marker(Vec3::ZERO, false);
        scene.add(proxy.clone());
        assert!(scene.remove(proxy.proxy_id()));
        assert!(!scene.remove(proxy.proxy_id()));
        assert!(scene.is_empty());
    }
}
