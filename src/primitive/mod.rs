//! Leaf primitive tests plugged into the BVH4 traversal.
//!
//! The traversal hands each leaf's primitives to a [`PrimitiveIntersector`] together with the ray and its
//! current interval. [`moeller::MoellerTrumbore`] handles [`crate::triangle::LeafTriangle`] leaves 4 at a
//! time, [`FnIntersector`] wraps a closure for any other primitive type.

pub mod moeller;

use std::marker::PhantomData;

use crate::ray::{Ray, RayHit};

pub trait PrimitiveIntersector {
    type Primitive: Copy;

    /// Nearest accepted hit among `prims` with `t` in `[ray.tmin, ray.tmax]`, lowest index on ties.
    fn intersect(&self, ray: &Ray, prims: &[Self::Primitive]) -> Option<RayHit>;

    /// Whether any of `prims` is hit within `[ray.tmin, ray.tmax]`.
    fn occluded(&self, ray: &Ray, prims: &[Self::Primitive]) -> bool {
        self.intersect(ray, prims).is_some()
    }
}

/// Intersects one primitive at a time with a closure.
///
/// The closure returns the hit for a single primitive, or `None`. Hits outside the ray interval are dropped,
/// so the closure does not need to check `tmin`/`tmax` itself.
/// ```
/// use bvh4_packet::{primitive::{FnIntersector, PrimitiveIntersector}, ray::{Ray, RayHit}};
/// use glam::Vec3A;
///
/// // Planes facing +Z at the given depth, one per primitive.
/// let planes = FnIntersector::new(|ray: &Ray, depth: &f32| {
///     let t = (depth - ray.origin.z) / ray.direction.z;
///     Some(RayHit { t, u: 0.0, v: 0.0, ng: Vec3A::Z, geometry_id: 0, primitive_id: *depth as u32 })
/// });
/// let ray = Ray::new_inf(Vec3A::ZERO, Vec3A::Z);
/// let hit = planes.intersect(&ray, &[3.0, -1.0, 2.0]).unwrap();
/// assert_eq!(hit.t, 2.0);
/// ```
pub struct FnIntersector<P, F> {
    f: F,
    _primitive: PhantomData<fn(&P)>,
}

impl<P, F> FnIntersector<P, F>
where
    F: Fn(&Ray, &P) -> Option<RayHit>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _primitive: PhantomData,
        }
    }
}

impl<P, F> PrimitiveIntersector for FnIntersector<P, F>
where
    P: Copy,
    F: Fn(&Ray, &P) -> Option<RayHit>,
{
    type Primitive = P;

    #[inline(always)]
    fn intersect(&self, ray: &Ray, prims: &[P]) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;
        for prim in prims {
            if let Some(hit) = (self.f)(ray, prim) {
                let within = hit.t >= ray.tmin && hit.t <= ray.tmax;
                if within && closest.is_none_or(|c| hit.t < c.t) {
                    closest = Some(hit);
                }
            }
        }
        closest
    }

    #[inline(always)]
    fn occluded(&self, ray: &Ray, prims: &[P]) -> bool {
        prims.iter().any(|prim| {
            (self.f)(ray, prim).is_some_and(|hit| hit.t >= ray.tmin && hit.t <= ray.tmax)
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use super::*;

    fn plane_hit(ray: &Ray, depth: &f32) -> Option<RayHit> {
        let t = (depth - ray.origin.z) / ray.direction.z;
        Some(RayHit {
            t,
            u: 0.0,
            v: 0.0,
            ng: Vec3A::Z,
            geometry_id: 1,
            primitive_id: *depth as u32,
        })
    }

    #[test]
    fn test_fn_intersector_interval() {
        let planes = FnIntersector::new(plane_hit);
        let ray = Ray::new(Vec3A::ZERO, Vec3A::Z, 2.5, 10.0);
        let hit = planes.intersect(&ray, &[1.0, 4.0, 3.0, 12.0]).unwrap();
        assert_eq!(hit.t, 3.0);
        assert_eq!(hit.primitive_id, 3);
        assert!(planes.occluded(&ray, &[1.0, 4.0]));
        assert!(!planes.occluded(&ray, &[1.0, 12.0]));
        assert!(planes.intersect(&ray, &[1.0, 2.0]).is_none());
    }
}
