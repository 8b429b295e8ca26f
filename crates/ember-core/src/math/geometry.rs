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

//! Bounding volumes and the view frustum used for visibility culling.

use super::{Mat4, Vec3, Vec4};

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// Render-queue entries and occluders carry one of these; the occlusion
/// culler draws them as cubes, and the scene enumerates proxies by testing
/// them against camera frustums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that acts as the identity for [`Aabb::merge`].
    pub const INVALID: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Creates a box from two corners given in any order.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a box from its center and half extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half_extents = half_extents.abs();
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Returns the center point of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half extents of the box.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns `true` if `min <= max` on every axis.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Returns `true` if the point lies inside or on the box.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Returns `true` if the two boxes overlap.
    #[inline]
    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns `true` if the sphere touches the box.
    #[inline]
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let closest = sphere.center.clamp(self.min, self.max);
        closest.distance_squared(sphere.center) <= sphere.radius * sphere.radius
    }

    /// Returns the smallest box containing both boxes.
    #[inline]
    pub fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the eight corners of the box.
    ///
    /// Bit 0 of the index selects x, bit 1 selects y and bit 2 selects z.
    pub fn corners(&self) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            *corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
        }
        out
    }

    /// Transforms the box by a matrix, returning the axis-aligned box that
    /// encloses the transformed corners.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        self.corners()
            .iter()
            .map(|c| matrix.transform_point3(*c))
            .fold(Self::INVALID, |acc, p| Self {
                min: acc.min.min(p),
                max: acc.max.max(p),
            })
    }

    /// Returns the bounding sphere of the box.
    pub fn bounding_sphere(&self) -> Sphere {
        Sphere {
            center: self.center(),
            radius: self.half_extents().length(),
        }
    }
}

/// A sphere, used as the cheap first test during scene enumeration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// Creates a new sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Returns `true` if the point lies inside or on the sphere.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }
}

/// A plane in the form `normal . p + d = 0`; the positive side is "inside".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Plane normal (unit length once normalized).
    pub normal: Vec3,
    /// Signed distance term.
    pub d: f32,
}

impl Plane {
    /// Builds a plane from a `(a, b, c, d)` vector and normalizes it.
    pub fn from_vec4(v: Vec4) -> Self {
        let normal = v.truncate();
        let length = normal.length();
        if length > 0.0 {
            Self {
                normal: normal / length,
                d: v.w / length,
            }
        } else {
            Self { normal, d: v.w }
        }
    }

    /// Signed distance from the plane to a point.
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// A six-plane view frustum extracted from a view-projection matrix.
///
/// Planes are ordered left, right, bottom, top, near, far. Clip-space depth is
/// assumed to be in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// The six bounding planes, normals pointing inward.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum planes from a view-projection matrix.
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                Plane::from_vec4(r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    /// Returns `true` if the sphere is at least partially inside.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.distance(sphere.center) >= -sphere.radius)
    }

    /// Returns `true` if the box is at least partially inside.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|p| {
            let positive = Vec3::new(
                if p.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if p.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if p.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            p.distance(positive) >= 0.0
        })
    }

    /// Returns `true` if the point is inside all six planes.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn aabb_from_min_max_orders_corners() {
        let aabb = Aabb::from_min_max(Vec3::new(1.0, -1.0, 2.0), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(aabb.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 1.0, 2.0));
        assert!(aabb.is_valid());
    }

    #[test]
    fn aabb_merge_with_invalid_is_identity() {
        let aabb = Aabb::from_center_half_extents(Vec3::ONE, Vec3::splat(0.5));
        assert_eq!(Aabb::INVALID.merge(&aabb), aabb);
    }

    #[test]
    fn aabb_sphere_test_uses_closest_point() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.intersects_sphere(&Sphere::new(Vec3::new(2.0, 0.5, 0.5), 1.0)));
        // Near the corner but outside the radius.
        assert!(!aabb.intersects_sphere(&Sphere::new(Vec3::splat(2.0), 1.5)));
        assert!(aabb.intersects_sphere(&Sphere::new(Vec3::splat(0.5), 0.1)));
    }

    #[test]
    fn aabb_corners_cover_extremes() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        let corners = aabb.corners();
        assert_eq!(corners[0], Vec3::ZERO);
        assert_eq!(corners[7], Vec3::ONE);
    }

    #[test]
    fn frustum_accepts_box_in_front() {
        let frustum = test_frustum();
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE);
        assert!(frustum.intersects_aabb(&aabb));
        assert!(frustum.intersects_sphere(&aabb.bounding_sphere()));
    }

    #[test]
    fn frustum_rejects_box_behind() {
        let frustum = test_frustum();
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE);
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn frustum_rejects_box_beyond_far_plane() {
        let frustum = test_frustum();
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -200.0), Vec3::ONE);
        assert!(!frustum.intersects_aabb(&aabb));
    }
}
