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

//! Ready-made render proxies for meshes and lights.

use std::sync::Arc;

use ember_core::math::{Aabb, Color32, Mat4, Quat, Vec3};
use ember_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, Camera, ConstantSlot, GpuContext, IndexFormat,
    Material, ProgramId, ResourceError,
};

use super::constants::ObjectConstants;
use super::queue::{
    DebugInfoEntry, LightEntry, OccluderEntry, RenderPassMask, RenderQueue, RenderableEntry,
};
use super::scene::{ProxyId, RenderProxy};

/// Triangle list of a box whose corners follow [`Aabb::corners`] order.
pub const BOX_INDICES: [u16; 36] = [
    0, 4, 6, 0, 6, 2, // -x
    1, 3, 7, 1, 7, 5, // +x
    0, 1, 5, 0, 5, 4, // -y
    2, 6, 7, 2, 7, 3, // +y
    0, 2, 3, 0, 3, 1, // -z
    4, 5, 7, 4, 7, 6, // +z
];

/// Bytes per position-only vertex.
pub const POSITION_STRIDE: u32 = 12;

/// GPU buffers of an indexed triangle mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBuffers {
    /// Vertex buffer.
    pub vertex_buffer: BufferId,
    /// 16-bit index buffer.
    pub index_buffer: BufferId,
    /// Indices to draw.
    pub index_count: u32,
    /// Bytes per vertex.
    pub vertex_stride: u32,
    /// Object-space bounds.
    pub local_bounds: Aabb,
}

impl MeshBuffers {
    /// Creates a unit cube centered on the origin.
    ///
    /// ## Errors
    ///
    /// Returns the backend error if either buffer cannot be created. Nothing
    /// is left allocated in that case.
    pub fn unit_cube(gpu: &mut dyn GpuContext) -> Result<Self, ResourceError> {
        let local_bounds = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));
        let positions: Vec<[f32; 3]> = local_bounds.corners().iter().map(|c| c.to_array()).collect();

        let vertex_buffer = gpu.create_buffer(
            &BufferDescriptor {
                label: Some("unit cube vertices".into()),
                size: (positions.len() * POSITION_STRIDE as usize) as u64,
                usage: BufferUsage::VERTEX,
            },
            Some(bytemuck::cast_slice(&positions)),
        )?;
        let index_buffer = match gpu.create_buffer(
            &BufferDescriptor {
                label: Some("unit cube indices".into()),
                size: std::mem::size_of_val(&BOX_INDICES) as u64,
                usage: BufferUsage::INDEX,
            },
            Some(bytemuck::cast_slice(&BOX_INDICES)),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                gpu.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: BOX_INDICES.len() as u32,
            vertex_stride: POSITION_STRIDE,
            local_bounds,
        })
    }

    /// Binds both buffers.
    pub fn bind(&self, gpu: &mut dyn GpuContext) {
        gpu.set_vertex_buffer(self.vertex_buffer, self.vertex_stride);
        gpu.set_index_buffer(self.index_buffer, IndexFormat::Uint16);
    }

    /// Destroys both buffers.
    pub fn destroy(self, gpu: &mut dyn GpuContext) {
        gpu.destroy_buffer(self.vertex_buffer);
        gpu.destroy_buffer(self.index_buffer);
    }
}

/// A static mesh with one material.
#[derive(Debug)]
pub struct MeshProxy {
    id: ProxyId,
    mesh: MeshBuffers,
    material: Arc<dyn Material>,
    transform: Mat4,
    bounds: Aabb,
    render_pass_mask: RenderPassMask,
    tint: Color32,
    layer: u8,
    user_data: [u32; 4],
    occluder: bool,
    debug_info: bool,
}

impl MeshProxy {
    /// Creates a proxy drawn in the base pass, the depth prepass and the
    /// shadow pass.
    pub fn new(mesh: MeshBuffers, material: Arc<dyn Material>, transform: Mat4) -> Self {
        let mut render_pass_mask =
            RenderPassMask::BASE | RenderPassMask::DEPTH_PREPASS | RenderPassMask::SHADOW_MAP;
        if material.is_post_process() {
            render_pass_mask |= RenderPassMask::POST_PROCESS;
        }
        if material.requires_base_pass_output() {
            render_pass_mask |= RenderPassMask::EMISSIVE;
        }
        Self {
            id: ProxyId::next(),
            bounds: mesh.local_bounds.transform(&transform),
            mesh,
            material,
            transform,
            render_pass_mask,
            tint: Color32::WHITE,
            layer: 0,
            user_data: [0; 4],
            occluder: false,
            debug_info: false,
        }
    }

    /// Sets whether the mesh casts shadows.
    pub fn with_shadow_casting(mut self, casts: bool) -> Self {
        self.render_pass_mask.set(RenderPassMask::SHADOW_MAP, casts);
        self
    }

    /// Tints the mesh. A tint makes the entry take part in the tint pass.
    pub fn with_tint(mut self, tint: Color32) -> Self {
        self.tint = tint;
        self.render_pass_mask |= RenderPassMask::TINT;
        self
    }

    /// Sets the render layer.
    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    /// Sets the user data uploaded with the object constants.
    pub fn with_user_data(mut self, user_data: [u32; 4]) -> Self {
        self.user_data = user_data;
        self
    }

    /// Makes the mesh queue an occluder for its bounds.
    pub fn as_occluder(mut self) -> Self {
        self.occluder = true;
        self
    }

    /// Makes the mesh queue a debug-info callback.
    pub fn with_debug_info(mut self) -> Self {
        self.debug_info = true;
        self
    }

    /// The pass mask queued entries start from.
    pub fn render_pass_mask(&self) -> RenderPassMask {
        self.render_pass_mask
    }

    /// The mesh buffers.
    pub fn mesh(&self) -> &MeshBuffers {
        &self.mesh
    }
}

impl RenderProxy for MeshProxy {
    fn proxy_id(&self) -> ProxyId {
        self.id
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn queue_for_render(self: Arc<Self>, camera: &Camera, queue: &mut RenderQueue) {
        let handle: Arc<dyn RenderProxy> = self.clone();
        let mut entry = RenderableEntry::new(
            handle.clone(),
            Some(self.material.clone()),
            self.bounds,
            self.render_pass_mask,
        );
        entry.view_distance = (self.bounds.center() - camera.position()).length();
        entry.tint_color = self.tint;
        entry.layer = self.layer;
        entry.user_data = self.user_data;
        queue.add_renderable(entry);

        if self.occluder {
            queue.add_occluder(OccluderEntry {
                proxy: handle.clone(),
                bounds: self.bounds,
                user_data: None,
            });
        }
        if self.debug_info {
            queue.add_debug_info_object(DebugInfoEntry { proxy: handle });
        }
    }

    fn setup_for_draw(
        &self,
        _camera: &Camera,
        entry: &RenderableEntry,
        gpu: &mut dyn GpuContext,
        _program: ProgramId,
    ) {
        let constants =
            ObjectConstants::new(self.transform, entry.tint_color.to_vec4(), entry.user_data);
        gpu.write_constants(ConstantSlot::Object, bytemuck::bytes_of(&constants));
        self.mesh.bind(gpu);
    }

    fn draw_queue_entry(&self, _camera: &Camera, _entry: &RenderableEntry, gpu: &mut dyn GpuContext) {
        gpu.draw_indexed(self.mesh.index_count, 0, 0);
    }

    fn draw_debug_info(&self, _camera: &Camera, gpu: &mut dyn GpuContext) {
        // Bounds as a box: the unit cube scaled onto the world bounds.
        let world = Mat4::from_scale_rotation_translation(
            self.bounds.half_extents() * 2.0,
            Quat::IDENTITY,
            self.bounds.center(),
        );
        let constants = ObjectConstants::new(world, Color32::WHITE.to_vec4(), self.user_data);
        gpu.write_constants(ConstantSlot::Object, bytemuck::bytes_of(&constants));
        self.mesh.bind(gpu);
        gpu.draw_indexed(self.mesh.index_count, 0, 0);
    }
}

/// A light in the scene.
#[derive(Debug)]
pub struct LightProxy {
    id: ProxyId,
    light: LightEntry,
}

impl LightProxy {
    /// Wraps a light.
    pub fn new(light: LightEntry) -> Self {
        Self {
            id: ProxyId::next(),
            light,
        }
    }

    /// The wrapped light.
    pub fn light(&self) -> &LightEntry {
        &self.light
    }
}

impl RenderProxy for LightProxy {
    fn proxy_id(&self) -> ProxyId {
        self.id
    }

    fn bounds(&self) -> Aabb {
        let (center, radius) = match &self.light {
            LightEntry::Directional(_) => return Aabb::INVALID,
            LightEntry::Point(light) => (light.position, light.range),
            LightEntry::Spot(light) => (light.position, light.range),
            LightEntry::Volumetric(light) => (light.position, light.range),
        };
        Aabb::from_center_half_extents(center, Vec3::splat(radius))
    }

    fn ignores_culling(&self) -> bool {
        matches!(self.light, LightEntry::Directional(_))
    }

    fn queue_for_render(self: Arc<Self>, _camera: &Camera, queue: &mut RenderQueue) {
        queue.add_light(self.light);
    }

    fn setup_for_draw(&self, _: &Camera, _: &RenderableEntry, _: &mut dyn GpuContext, _: ProgramId) {}

    fn draw_queue_entry(&self, _: &Camera, _: &RenderableEntry, _: &mut dyn GpuContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::renderer::{BasicMaterial, DirectionalLightEntry, MaterialShaderId};
    use ember_infra::HeadlessGpuContext;

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0, 0.1, 100.0)
    }

    #[test]
    fn mesh_queues_entry_occluder_and_debug_info() {
        let mut gpu = HeadlessGpuContext::new();
        let mesh = MeshBuffers::unit_cube(&mut gpu).unwrap();
        let material: Arc<dyn Material> = Arc::new(BasicMaterial::new("m", MaterialShaderId(1)));
        let proxy = Arc::new(
            MeshProxy::new(mesh, material, Mat4::IDENTITY)
                .as_occluder()
                .with_debug_info(),
        );

        let mut queue = RenderQueue::new();
        proxy.clone().queue_for_render(&camera(), &mut queue);
        assert_eq!(queue.opaque_entries().len(), 1);
        assert_eq!(queue.occluders().len(), 1);
        assert_eq!(queue.debug_info_objects().len(), 1);
        approx::assert_relative_eq!(queue.opaque_entries()[0].view_distance, 5.0);
    }

    #[test]
    fn directional_light_ignores_culling() {
        let proxy = Arc::new(LightProxy::new(LightEntry::Directional(
            DirectionalLightEntry::new(Vec3::NEG_Y, Vec3::ONE, 1.0),
        )));
        assert!(proxy.ignores_culling());
        let mut queue = RenderQueue::new();
        proxy.queue_for_render(&camera(), &mut queue);
        assert_eq!(queue.directional_lights().len(), 1);
    }

    #[test]
    fn unit_cube_allocates_two_buffers() {
        let mut gpu = HeadlessGpuContext::new();
        let before = gpu.device().stats().buffers_created;
        let mesh = MeshBuffers::unit_cube(&mut gpu).unwrap();
        assert_eq!(gpu.device().stats().buffers_created, before + 2);
        mesh.destroy(&mut gpu);
    }
}
