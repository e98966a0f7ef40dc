//! An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.

use std::ops::BitAnd;

use bytemuck::{Pod, Zeroable};
use glam::Vec3A;

use crate::{ray::Ray, Boundable};

/// An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.
#[derive(Default, Clone, Copy, Debug, PartialEq, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub min: Vec3A,
    pub max: Vec3A,
}

unsafe impl Pod for Aabb {}

impl Aabb {
    /// An empty AABB, min at +infinity and max at -infinity. This is also what the empty child slots of a
    /// BVH4 node hold: a ray can never enter it, whatever its direction.
    pub const EMPTY: Self = Self {
        min: Vec3A::splat(f32::INFINITY),
        max: Vec3A::splat(f32::NEG_INFINITY),
    };

    /// Creates a new AABB with the given minimum and maximum points.
    #[inline(always)]
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    /// Creates an AABB that bounds the given set of points. Empty for an empty slice.
    #[inline(always)]
    pub fn from_points(points: &[Vec3A]) -> Self {
        points.iter().fold(Self::EMPTY, |mut aabb, p| {
            aabb.extend(*p);
            aabb
        })
    }

    /// Extends the AABB to include the given point.
    #[inline(always)]
    pub fn extend(&mut self, point: Vec3A) -> &mut Self {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
        self
    }

    /// Returns the union of this AABB and another AABB.
    #[inline(always)]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the diagonal vector of the AABB.
    #[inline(always)]
    pub fn diagonal(&self) -> Vec3A {
        self.max - self.min
    }

    /// Returns the center point of the AABB.
    #[inline(always)]
    pub fn center(&self) -> Vec3A {
        (self.max + self.min) * 0.5
    }

    /// Checks if the AABB is valid (i.e., min <= max on all axes).
    #[inline(always)]
    pub fn valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Checks if the AABB contains the given point.
    #[inline(always)]
    pub fn contains_point(&self, point: Vec3A) -> bool {
        (point.cmpge(self.min).bitand(point.cmple(self.max))).all()
    }

    /// Checks if `other` lies entirely inside this AABB.
    #[inline(always)]
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        (other.min.cmpge(self.min).bitand(other.max.cmple(self.max))).all()
    }

    /// Slab test clipped to the ray interval `[ray.tmin, ray.tmax]`.
    /// Returns the entry and exit distances, or `None` if the clipped interval is empty.
    ///
    /// The planes are picked per axis by the sign of the reciprocal direction instead of taking min/max of
    /// both slab distances, so an inverted (empty) box is never entered.
    #[inline(always)]
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let t_lo = self.min * ray.inv_direction - ray.origin_inv;
        let t_hi = self.max * ray.inv_direction - ray.origin_inv;
        let negative = ray.inv_direction.cmplt(Vec3A::ZERO);
        let t_near = Vec3A::select(negative, t_hi, t_lo);
        let t_far = Vec3A::select(negative, t_lo, t_hi);

        let near = t_near.max_element().max(ray.tmin);
        let far = t_far.min_element().min(ray.tmax);
        (near <= far).then_some((near, far))
    }
}

impl Boundable for Aabb {
    #[inline(always)]
    fn aabb(&self) -> Aabb {
        *self
    }
}
