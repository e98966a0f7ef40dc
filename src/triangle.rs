//! Triangle representation in 3D space and the packed leaf record the traversal reads.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3A};

use crate::{aabb::Aabb, Boundable};

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Triangle {
    pub v0: Vec3A,
    pub v1: Vec3A,
    pub v2: Vec3A,
}

unsafe impl Pod for Triangle {}
unsafe impl Zeroable for Triangle {}

impl Triangle {
    #[inline(always)]
    pub const fn new(v0: Vec3A, v1: Vec3A, v2: Vec3A) -> Self {
        Self { v0, v1, v2 }
    }

    /// Geometric normal in the orientation used by the intersector: `(v1 - v0) x (v0 - v2)`. Not normalized.
    #[inline(always)]
    pub fn geometric_normal(&self) -> Vec3A {
        (self.v1 - self.v0).cross(self.v0 - self.v2)
    }

    /// Compute the bounding box of the triangle.
    #[inline(always)]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&[self.v0, self.v1, self.v2])
    }

    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            v0: matrix.transform_point3a(self.v0),
            v1: matrix.transform_point3a(self.v1),
            v2: matrix.transform_point3a(self.v2),
        }
    }
}

impl Boundable for Triangle {
    fn aabb(&self) -> Aabb {
        self.aabb()
    }
}

/// A triangle as stored in BVH4 leaves. repr(C), Pod, 64 bytes.
///
/// Each vertex row is padded to 16 bytes and the padding carries the per-triangle ids, so one leaf record
/// fits a cache line: `v0` + geometry id, `v1` + primitive id, `v2` + visibility mask, normal + spare.
#[derive(Clone, Copy, Default, Debug, PartialEq, Pod, Zeroable)]
#[repr(C, align(16))]
pub struct LeafTriangle {
    pub v0: [f32; 3],
    pub geom_id: u32,
    pub v1: [f32; 3],
    pub prim_id: u32,
    pub v2: [f32; 3],
    /// Visibility mask, see [`crate::ray::Ray::mask`].
    pub mask: u32,
    /// Precomputed geometric normal, `(v1 - v0) x (v0 - v2)`.
    pub ng: [f32; 3],
    pub _pad: u32,
}

impl LeafTriangle {
    pub fn new(tri: &Triangle, geom_id: u32, prim_id: u32) -> Self {
        Self {
            v0: tri.v0.into(),
            geom_id,
            v1: tri.v1.into(),
            prim_id,
            v2: tri.v2.into(),
            mask: u32::MAX,
            ng: tri.geometric_normal().into(),
            _pad: 0,
        }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    #[inline(always)]
    pub fn v0(&self) -> Vec3A {
        Vec3A::from(self.v0)
    }

    #[inline(always)]
    pub fn v1(&self) -> Vec3A {
        Vec3A::from(self.v1)
    }

    #[inline(always)]
    pub fn v2(&self) -> Vec3A {
        Vec3A::from(self.v2)
    }

    #[inline(always)]
    pub fn ng(&self) -> Vec3A {
        Vec3A::from(self.ng)
    }

    pub fn triangle(&self) -> Triangle {
        Triangle::new(self.v0(), self.v1(), self.v2())
    }
}

impl Boundable for LeafTriangle {
    fn aabb(&self) -> Aabb {
        Aabb::from_points(&[self.v0(), self.v1(), self.v2()])
    }
}
