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

//! The demo scene: a floor, a grid of cubes and a handful of lights.

use std::sync::Arc;

use anyhow::Result;
use ember_core::math::{Mat4, Quat, Vec3, Vec4};
use ember_core::renderer::{
    BasicMaterial, BlendMode, Camera, DirectionalLightEntry, GpuContext, LightShadowFlags,
    Material, MaterialShaderId, PointLightEntry, SpotLightEntry,
};
use ember_lanes::render_lane::{LightEntry, LightProxy, MeshBuffers, MeshProxy, SceneList};

/// Cubes per side of the grid.
const GRID: i32 = 6;
const SPACING: f32 = 2.5;

/// Builds the scene. Mesh buffers are created on `gpu`.
pub fn build(gpu: &mut dyn GpuContext) -> Result<SceneList> {
    let cube = MeshBuffers::unit_cube(gpu)?;
    let stone: Arc<dyn Material> = Arc::new(
        BasicMaterial::new("stone", MaterialShaderId(1)).with_base_color(Vec4::new(0.6, 0.6, 0.55, 1.0)),
    );
    let foliage: Arc<dyn Material> = Arc::new(
        BasicMaterial::new("foliage", MaterialShaderId(2)).with_blend_mode(BlendMode::Masked),
    );
    let glass: Arc<dyn Material> = Arc::new(
        BasicMaterial::new("glass", MaterialShaderId(3))
            .with_blend_mode(BlendMode::Translucent)
            .with_base_color(Vec4::new(0.4, 0.7, 1.0, 0.35)),
    );
    let lamp: Arc<dyn Material> = Arc::new(
        BasicMaterial::new("lamp", MaterialShaderId(4)).with_emissive(Vec3::new(4.0, 3.0, 1.5)),
    );
    let grade: Arc<dyn Material> =
        Arc::new(BasicMaterial::new("color grade", MaterialShaderId(5)).as_post_process());

    let mut scene = SceneList::new();
    let floor = Mat4::from_scale_rotation_translation(
        Vec3::new(40.0, 0.2, 40.0),
        Quat::IDENTITY,
        Vec3::new(0.0, -0.6, 0.0),
    );
    scene.add(Arc::new(MeshProxy::new(cube, stone.clone(), floor)));

    let half = (GRID - 1) as f32 * SPACING * 0.5;
    for x in 0..GRID {
        for z in 0..GRID {
            let position = Vec3::new(x as f32 * SPACING - half, 0.0, z as f32 * SPACING - half);
            let material = match (x + z) % 4 {
                0 => foliage.clone(),
                1 => glass.clone(),
                _ => stone.clone(),
            };
            let mut proxy = MeshProxy::new(cube, material, Mat4::from_translation(position));
            // The inner ring hides what stands behind it.
            if (x == 1 || x == GRID - 2) && (1..GRID - 1).contains(&z) {
                proxy = proxy.as_occluder();
            }
            if x == 0 && z == 0 {
                proxy = proxy.with_debug_info();
            }
            scene.add(Arc::new(proxy));
        }
    }

    let lamp_position = Vec3::new(0.0, 3.0, 0.0);
    scene.add(Arc::new(
        MeshProxy::new(
            cube,
            lamp,
            Mat4::from_scale_rotation_translation(Vec3::splat(0.3), Quat::IDENTITY, lamp_position),
        )
        .with_shadow_casting(false),
    ));
    scene.add(Arc::new(MeshProxy::new(cube, grade, Mat4::IDENTITY)));

    scene.add(Arc::new(LightProxy::new(LightEntry::Directional(
        DirectionalLightEntry::new(Vec3::new(-0.4, -1.0, -0.3), Vec3::new(1.0, 0.95, 0.85), 3.0)
            .with_shadows(LightShadowFlags::CAST_SHADOWS),
    ))));
    scene.add(Arc::new(LightProxy::new(LightEntry::Point(
        PointLightEntry::new(lamp_position, 8.0, Vec3::new(1.0, 0.7, 0.4), 6.0)
            .with_shadows(LightShadowFlags::CAST_SHADOWS),
    ))));
    for (index, color) in [
        Vec3::new(1.0, 0.2, 0.2),
        Vec3::new(0.2, 1.0, 0.2),
        Vec3::new(0.2, 0.2, 1.0),
        Vec3::new(1.0, 1.0, 0.2),
    ]
    .into_iter()
    .enumerate()
    {
        let angle = index as f32 * std::f32::consts::FRAC_PI_2;
        let position = Vec3::new(angle.cos() * half, 1.5, angle.sin() * half);
        scene.add(Arc::new(LightProxy::new(LightEntry::Point(PointLightEntry::new(
            position, 5.0, color, 2.0,
        )))));
    }
    scene.add(Arc::new(LightProxy::new(LightEntry::Spot(SpotLightEntry::new(
        Vec3::new(half, 6.0, half),
        Vec3::new(-1.0, -1.5, -1.0).normalize(),
        15.0,
        0.6,
        Vec3::ONE,
        4.0,
    )))));

    log::info!("Scene: {} proxies", scene.len());
    Ok(scene)
}

/// A camera orbiting the grid, `t` seconds into the run.
pub fn orbit_camera(t: f32, aspect: f32) -> Camera {
    let radius = GRID as f32 * SPACING;
    let eye = Vec3::new((t * 0.3).cos() * radius, 6.0, (t * 0.3).sin() * radius);
    Camera::perspective(eye, Vec3::ZERO, Vec3::Y, 55f32.to_radians(), aspect, 0.1, 300.0)
}
