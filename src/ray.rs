//! A single ray and its hit record.

use glam::{vec3a, Vec3A};

/// Magnitudes at or below this are treated as zero by [`safe_inverse`].
pub const MIN_INVERSE_INPUT: f32 = 1e-18;

/// Computes the inverse of `x` avoiding division by zero.
///
/// Zero (or nearly zero) components map to `±1e18` with the sign of `x`, so slab distances stay finite and
/// ordered instead of turning into NaN when multiplied with a box plane sitting on the origin. The value has to
/// be large enough that the slab of an axis the ray is parallel to never ends before any real hit distance,
/// even when the origin lies very close to one of its planes.
#[inline(always)]
pub fn safe_inverse(x: f32) -> f32 {
    if x.abs() <= MIN_INVERSE_INPUT {
        if x.is_sign_negative() {
            -1.0 / MIN_INVERSE_INPUT
        } else {
            1.0 / MIN_INVERSE_INPUT
        }
    } else {
        1.0 / x
    }
}

/// Geometry/primitive id value meaning "no hit".
pub const INVALID_ID: u32 = u32::MAX;

/// Geometry id written by the occlusion query into rays found occluded.
pub const OCCLUDED_GEOM_ID: u32 = 0;

/// One ray prepared for traversal.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Ray {
    /// The starting point of the ray.
    pub origin: Vec3A,
    /// The direction vector of the ray. Does not need to be normalized.
    pub direction: Vec3A,
    /// Direction-safe reciprocal of the direction, see [`safe_inverse`].
    pub inv_direction: Vec3A,
    /// `origin * inv_direction`, so a box plane `p` maps to the ray distance `p * inv_direction - origin_inv`.
    pub origin_inv: Vec3A,
    /// The minimum `t` (distance) value for intersection tests.
    pub tmin: f32,
    /// The maximum `t` (distance) value for intersection tests.
    pub tmax: f32,
    /// Visibility mask, a primitive is only visible if `primitive.mask & ray.mask != 0`.
    pub mask: u32,
}

impl Ray {
    /// Creates a new `Ray` with the given origin, direction, and `t` (distance) range.
    pub fn new(origin: Vec3A, direction: Vec3A, min: f32, max: f32) -> Self {
        let inv_direction = vec3a(
            safe_inverse(direction.x),
            safe_inverse(direction.y),
            safe_inverse(direction.z),
        );
        let ray = Ray {
            origin,
            direction,
            inv_direction,
            origin_inv: origin * inv_direction,
            tmin: min,
            tmax: max,
            mask: u32::MAX,
        };

        debug_assert!(ray.inv_direction.is_finite());
        debug_assert!(ray.direction.is_finite());
        debug_assert!(origin.is_finite());

        ray
    }

    /// Creates a new infinite `Ray` with the given origin, direction.
    pub fn new_inf(origin: Vec3A, direction: Vec3A) -> Self {
        Self::new(origin, direction, 0.0, f32::INFINITY)
    }

    #[must_use]
    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Point along the ray at distance `t`.
    #[inline(always)]
    pub fn at(&self, t: f32) -> Vec3A {
        self.origin + self.direction * t
    }
}

/// Closest hit output of one ray.
///
/// `ng` is the unnormalized geometric normal `(v1 - v0) x (v0 - v2)` of the hit triangle, `u`/`v` are the
/// barycentric weights of `v1`/`v2`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct RayHit {
    pub t: f32,
    pub u: f32,
    pub v: f32,
    pub ng: Vec3A,
    pub geometry_id: u32,
    pub primitive_id: u32,
}

impl RayHit {
    /// Creates a new `RayHit` instance representing no hit.
    pub fn none() -> Self {
        Self {
            t: f32::INFINITY,
            u: 0.0,
            v: 0.0,
            ng: Vec3A::ZERO,
            geometry_id: INVALID_ID,
            primitive_id: INVALID_ID,
        }
    }

    #[inline(always)]
    pub fn is_hit(&self) -> bool {
        self.geometry_id != INVALID_ID
    }
}
