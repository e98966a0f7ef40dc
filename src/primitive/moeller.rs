//! Möller–Trumbore ray/triangle test, 4 triangles per call.

use std::ops::Sub;

use glam::{Vec3A, Vec4};

use crate::{
    mask::Mask4,
    primitive::PrimitiveIntersector,
    ray::{Ray, RayHit},
    triangle::LeafTriangle,
};

const CULL_BACKFACE: bool = cfg!(feature = "backface-culling");

/// 4 vectors in structure-of-arrays form, lane `i` of `x`, `y` and `z` is vector `i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3x4 {
    pub x: Vec4,
    pub y: Vec4,
    pub z: Vec4,
}

impl Vec3x4 {
    #[inline(always)]
    pub fn splat(v: Vec3A) -> Self {
        Self {
            x: Vec4::splat(v.x),
            y: Vec4::splat(v.y),
            z: Vec4::splat(v.z),
        }
    }

    #[inline(always)]
    pub fn from_fn(f: impl Fn(usize) -> [f32; 3]) -> Self {
        let (a, b, c, d) = (f(0), f(1), f(2), f(3));
        Self {
            x: Vec4::new(a[0], b[0], c[0], d[0]),
            y: Vec4::new(a[1], b[1], c[1], d[1]),
            z: Vec4::new(a[2], b[2], c[2], d[2]),
        }
    }

    #[inline(always)]
    pub fn dot(self, rhs: Self) -> Vec4 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline(always)]
    pub fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }
}

impl Sub for Vec3x4 {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

/// Distances and barycentrics for up to 4 triangles, with the mask of the accepted ones.
#[derive(Clone, Copy, Debug)]
pub struct TriangleHits4 {
    pub valid: Mask4,
    pub t: Vec4,
    pub u: Vec4,
    pub v: Vec4,
}

impl TriangleHits4 {
    /// Accepted lane with the smallest `t`, lowest lane on ties.
    #[inline(always)]
    pub fn nearest(&self) -> Option<usize> {
        let t = Vec4::from_array(std::array::from_fn(|i| {
            if self.valid.test(i) {
                self.t[i]
            } else {
                f32::INFINITY
            }
        }));
        let min = t.min_element();
        (Mask4::from_bits(t.cmpeq(Vec4::splat(min)).bitmask()) & self.valid).first()
    }
}

/// Möller–Trumbore test of [`LeafTriangle`] leaves.
///
/// For edges `e1 = v1 - v0`, `e2 = v0 - v2` and the stored normal `ng = e1 x e2`, with `c = v0 - origin` and
/// `r = c x dir`:
/// `den = dir . ng`, `u = (e2 . r) / den`, `v = (e1 . r) / den`, `t = (c . ng) / den`.
/// `u` weights `v1` and `v` weights `v2`. A hit needs `den != 0` (`den > 0` with the `backface-culling`
/// feature), `u >= 0`, `v >= 0`, `u + v <= 1` and `tmin <= t <= tmax`.
///
/// Only an exactly zero `den` is rejected up front. A nearly zero `den` blows `u`, `v` and `t` up to huge or
/// non-finite values, which the range checks then reject, so no epsilon is needed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoellerTrumbore {
    /// Drop triangles whose `mask` shares no bit with the ray's before picking the nearest.
    pub ray_mask: bool,
}

impl MoellerTrumbore {
    #[must_use]
    pub fn with_ray_mask(mut self, ray_mask: bool) -> Self {
        self.ray_mask = ray_mask;
        self
    }

    /// Tests 1 to 4 triangles at once.
    #[inline(always)]
    pub fn intersect4(&self, ray: &Ray, prims: &[LeafTriangle]) -> TriangleHits4 {
        debug_assert!((1..=4).contains(&prims.len()));
        let last = prims.len() - 1;
        // Missing lanes repeat the last triangle and are masked off below.
        let tri = |i: usize| &prims[i.min(last)];

        let v0 = Vec3x4::from_fn(|i| tri(i).v0);
        let v1 = Vec3x4::from_fn(|i| tri(i).v1);
        let v2 = Vec3x4::from_fn(|i| tri(i).v2);
        let ng = Vec3x4::from_fn(|i| tri(i).ng);

        let e1 = v1 - v0;
        let e2 = v0 - v2;
        let c = v0 - Vec3x4::splat(ray.origin);
        let dir = Vec3x4::splat(ray.direction);
        let r = c.cross(dir);

        let den = dir.dot(ng);
        let u = e2.dot(r) / den;
        let v = e1.dot(r) / den;
        let t = c.dot(ng) / den;

        let facing = if CULL_BACKFACE {
            den.cmpgt(Vec4::ZERO)
        } else {
            den.cmpne(Vec4::ZERO)
        };
        let inside = u.cmpge(Vec4::ZERO) & v.cmpge(Vec4::ZERO) & (u + v).cmple(Vec4::ONE);
        let in_range = t.cmpge(Vec4::splat(ray.tmin)) & t.cmple(Vec4::splat(ray.tmax));

        let mut valid = Mask4::from_bits((facing & inside & in_range).bitmask())
            & Mask4::first_n(prims.len());
        if self.ray_mask {
            valid &= Mask4::from_fn(|i| i <= last && prims[i].mask & ray.mask != 0);
        }

        TriangleHits4 { valid, t, u, v }
    }
}

impl PrimitiveIntersector for MoellerTrumbore {
    type Primitive = LeafTriangle;

    #[inline(always)]
    fn intersect(&self, ray: &Ray, prims: &[LeafTriangle]) -> Option<RayHit> {
        let hits = self.intersect4(ray, prims);
        let i = hits.nearest()?;
        let tri = &prims[i];
        Some(RayHit {
            t: hits.t[i],
            u: hits.u[i],
            v: hits.v[i],
            ng: tri.ng(),
            geometry_id: tri.geom_id,
            primitive_id: tri.prim_id,
        })
    }

    #[inline(always)]
    fn occluded(&self, ray: &Ray, prims: &[LeafTriangle]) -> bool {
        self.intersect4(ray, prims).valid.any()
    }
}
