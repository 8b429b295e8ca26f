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

//! The render camera: view and projection transforms plus the derived frustum.
//!
//! Conventions are right-handed with clip-space depth in `[0, 1]`.

use crate::math::{Frustum, Mat4, Vec3, Vec4};

/// The projection a [`Camera`] was built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// A perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width over height.
        aspect: f32,
    },
    /// An orthographic projection centered on the view axis.
    Orthographic {
        /// Width of the view volume.
        width: f32,
        /// Height of the view volume.
        height: f32,
    },
    /// A projection given directly as a matrix.
    Custom,
}

/// A camera with cached view-projection matrix and frustum planes.
///
/// # Examples
///
/// ```
/// use ember_core::renderer::Camera;
/// use ember_core::math::Vec3;
///
/// let camera = Camera::perspective(
///     Vec3::new(0.0, 2.0, 10.0),
///     Vec3::ZERO,
///     Vec3::Y,
///     60f32.to_radians(),
///     16.0 / 9.0,
///     0.1,
///     500.0,
/// );
/// assert!(camera.frustum().contains_point(Vec3::ZERO));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    position: Vec3,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    inverse_view_projection: Mat4,
    frustum: Frustum,
    near: f32,
    far: f32,
    kind: Projection,
}

impl Camera {
    /// Builds a perspective camera looking from `eye` at `target`.
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let projection = Mat4::perspective_rh(fov_y, aspect, near, far);
        Self::build(view, projection, near, far, Projection::Perspective { fov_y, aspect })
    }

    /// Builds an orthographic camera looking from `eye` at `target`.
    #[allow(clippy::too_many_arguments)]
    pub fn orthographic(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        width: f32,
        height: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let (hw, hh) = (width * 0.5, height * 0.5);
        let projection = Mat4::orthographic_rh(-hw, hw, -hh, hh, near, far);
        Self::build(view, projection, near, far, Projection::Orthographic { width, height })
    }

    /// Builds a camera from explicit matrices.
    pub fn from_matrices(view: Mat4, projection: Mat4, near: f32, far: f32) -> Self {
        Self::build(view, projection, near, far, Projection::Custom)
    }

    fn build(view: Mat4, projection: Mat4, near: f32, far: f32, kind: Projection) -> Self {
        let view_projection = projection * view;
        let position = view.inverse().w_axis.truncate();
        Self {
            position,
            view,
            projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            frustum: Frustum::from_view_projection(&view_projection),
            near,
            far,
            kind,
        }
    }

    /// Replaces the projection matrix, keeping the view, and refreshes every
    /// derived value.
    pub fn set_projection(&mut self, projection: Mat4) {
        *self = Self::build(self.view, projection, self.near, self.far, self.kind);
    }

    /// World-space eye position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// World-space forward direction.
    pub fn forward(&self) -> Vec3 {
        // Third row of the view rotation is the camera's +Z; right-handed
        // cameras look down -Z.
        -Vec3::new(self.view.x_axis.z, self.view.y_axis.z, self.view.z_axis.z)
    }

    /// World-to-view transform.
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View-to-clip transform.
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// World-to-clip transform.
    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Clip-to-world transform.
    pub fn inverse_view_projection(&self) -> &Mat4 {
        &self.inverse_view_projection
    }

    /// The six world-space frustum planes.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Near plane distance.
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far plane distance.
    pub fn far(&self) -> f32 {
        self.far
    }

    /// How the projection was built.
    pub fn kind(&self) -> Projection {
        self.kind
    }

    /// Distance along the view axis from the eye to `point`.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -(self.view * Vec4::from((point, 1.0))).z
    }

    /// World-space corners of the view frustum slice between view distances
    /// `near` and `far`. Only meaningful for perspective cameras.
    ///
    /// The first four corners lie on the near slice, the last four on the far
    /// slice.
    pub fn frustum_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        let (tan_half_y, aspect) = match self.kind {
            Projection::Perspective { fov_y, aspect } => ((fov_y * 0.5).tan(), aspect),
            _ => {
                // Derive from the matrix: proj[1][1] = 1 / tan(fov/2).
                let y_scale = self.projection.y_axis.y;
                let x_scale = self.projection.x_axis.x;
                let tan_half_y = if y_scale != 0.0 { 1.0 / y_scale } else { 1.0 };
                let aspect = if x_scale != 0.0 { y_scale / x_scale } else { 1.0 };
                (tan_half_y, aspect)
            }
        };
        let inverse_view = self.view.inverse();
        let mut corners = [Vec3::ZERO; 8];
        for (slice, distance) in [near, far].into_iter().enumerate() {
            let half_h = distance * tan_half_y;
            let half_w = half_h * aspect;
            let local = [
                Vec3::new(-half_w, -half_h, -distance),
                Vec3::new(half_w, -half_h, -distance),
                Vec3::new(half_w, half_h, -distance),
                Vec3::new(-half_w, half_h, -distance),
            ];
            for (i, corner) in local.iter().enumerate() {
                corners[slice * 4 + i] = inverse_view.transform_point3(*corner);
            }
        }
        corners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn position_is_recovered_from_view() {
        let camera = camera();
        assert_relative_eq!(camera.position().z, 5.0, epsilon = 1e-4);
        assert_relative_eq!(camera.forward().z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn view_depth_is_positive_in_front() {
        let camera = camera();
        assert_relative_eq!(camera.view_depth(Vec3::ZERO), 5.0, epsilon = 1e-4);
        assert!(camera.view_depth(Vec3::new(0.0, 0.0, 10.0)) < 0.0);
    }

    #[test]
    fn frustum_corners_lie_on_slices() {
        let camera = camera();
        let corners = camera.frustum_corners(1.0, 10.0);
        for corner in &corners[..4] {
            assert_relative_eq!(camera.view_depth(*corner), 1.0, epsilon = 1e-4);
        }
        for corner in &corners[4..] {
            assert_relative_eq!(camera.view_depth(*corner), 10.0, epsilon = 1e-3);
        }
        // 90 degree fov, aspect 1: half extent equals depth.
        assert_relative_eq!(corners[6].x, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn set_projection_refreshes_frustum() {
        let mut camera = camera();
        let before = *camera.frustum();
        camera.set_projection(Mat4::perspective_rh(0.3, 1.0, 0.1, 100.0));
        assert_ne!(before, *camera.frustum());
    }
}
