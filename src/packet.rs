//! 16-wide ray packet in structure-of-arrays layout.

use glam::{vec3a, Vec3A};

use crate::{
    mask::Mask16,
    ray::{Ray, RayHit, INVALID_ID},
};

/// Number of rays in a [`RayPacket16`].
pub const PACKET_WIDTH: usize = 16;

/// 16 rays and their hit records, one array per component.
///
/// The traversal reads origin, direction, `tnear`, `tfar` and `mask`. The closest hit query overwrites
/// `tfar`, `u`, `v`, `ng_*`, `geom_id` and `prim_id` of rays that hit something, the occlusion query only
/// `geom_id` of rays found occluded.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C, align(64))]
pub struct RayPacket16 {
    pub org_x: [f32; PACKET_WIDTH],
    pub org_y: [f32; PACKET_WIDTH],
    pub org_z: [f32; PACKET_WIDTH],
    pub dir_x: [f32; PACKET_WIDTH],
    pub dir_y: [f32; PACKET_WIDTH],
    pub dir_z: [f32; PACKET_WIDTH],
    pub tnear: [f32; PACKET_WIDTH],
    /// Far bound on input, hit distance on output.
    pub tfar: [f32; PACKET_WIDTH],
    pub mask: [u32; PACKET_WIDTH],

    pub u: [f32; PACKET_WIDTH],
    pub v: [f32; PACKET_WIDTH],
    pub ng_x: [f32; PACKET_WIDTH],
    pub ng_y: [f32; PACKET_WIDTH],
    pub ng_z: [f32; PACKET_WIDTH],
    pub geom_id: [u32; PACKET_WIDTH],
    pub prim_id: [u32; PACKET_WIDTH],
}

impl Default for RayPacket16 {
    fn default() -> Self {
        Self {
            org_x: [0.0; PACKET_WIDTH],
            org_y: [0.0; PACKET_WIDTH],
            org_z: [0.0; PACKET_WIDTH],
            dir_x: [0.0; PACKET_WIDTH],
            dir_y: [0.0; PACKET_WIDTH],
            dir_z: [1.0; PACKET_WIDTH],
            tnear: [0.0; PACKET_WIDTH],
            tfar: [f32::INFINITY; PACKET_WIDTH],
            mask: [u32::MAX; PACKET_WIDTH],
            u: [0.0; PACKET_WIDTH],
            v: [0.0; PACKET_WIDTH],
            ng_x: [0.0; PACKET_WIDTH],
            ng_y: [0.0; PACKET_WIDTH],
            ng_z: [0.0; PACKET_WIDTH],
            geom_id: [INVALID_ID; PACKET_WIDTH],
            prim_id: [INVALID_ID; PACKET_WIDTH],
        }
    }
}

impl RayPacket16 {
    /// Packet with the given rays in its first lanes. Remaining lanes keep the default ray. Returns the packet
    /// and the mask of the lanes that were filled.
    ///
    /// # Panics
    /// If more than 16 rays are given.
    pub fn new(rays: &[Ray]) -> (Self, Mask16) {
        assert!(rays.len() <= PACKET_WIDTH);
        let mut packet = Self::default();
        for (lane, ray) in rays.iter().enumerate() {
            packet.set_ray(lane, ray);
        }
        (packet, Mask16::first_n(rays.len()))
    }

    /// Writes the input fields of `lane` and resets its hit record.
    pub fn set_ray(&mut self, lane: usize, ray: &Ray) {
        self.org_x[lane] = ray.origin.x;
        self.org_y[lane] = ray.origin.y;
        self.org_z[lane] = ray.origin.z;
        self.dir_x[lane] = ray.direction.x;
        self.dir_y[lane] = ray.direction.y;
        self.dir_z[lane] = ray.direction.z;
        self.tnear[lane] = ray.tmin;
        self.tfar[lane] = ray.tmax;
        self.mask[lane] = ray.mask;
        self.reset_hit(lane);
    }

    /// Clears the hit record of `lane` without touching its interval.
    pub fn reset_hit(&mut self, lane: usize) {
        self.u[lane] = 0.0;
        self.v[lane] = 0.0;
        self.ng_x[lane] = 0.0;
        self.ng_y[lane] = 0.0;
        self.ng_z[lane] = 0.0;
        self.geom_id[lane] = INVALID_ID;
        self.prim_id[lane] = INVALID_ID;
    }

    #[inline(always)]
    pub fn origin(&self, lane: usize) -> Vec3A {
        vec3a(self.org_x[lane], self.org_y[lane], self.org_z[lane])
    }

    #[inline(always)]
    pub fn direction(&self, lane: usize) -> Vec3A {
        vec3a(self.dir_x[lane], self.dir_y[lane], self.dir_z[lane])
    }

    /// Loads `lane` as a [`Ray`], computing the safe reciprocal direction.
    #[inline(always)]
    pub fn ray(&self, lane: usize) -> Ray {
        Ray::new(
            self.origin(lane),
            self.direction(lane),
            self.tnear[lane],
            self.tfar[lane],
        )
        .with_mask(self.mask[lane])
    }

    /// Hit record of `lane`. `t` is the current far bound.
    pub fn hit(&self, lane: usize) -> RayHit {
        RayHit {
            t: self.tfar[lane],
            u: self.u[lane],
            v: self.v[lane],
            ng: vec3a(self.ng_x[lane], self.ng_y[lane], self.ng_z[lane]),
            geometry_id: self.geom_id[lane],
            primitive_id: self.prim_id[lane],
        }
    }

    /// Stores a closest hit into `lane`.
    #[inline(always)]
    pub fn store_hit(&mut self, lane: usize, hit: &RayHit) {
        self.tfar[lane] = hit.t;
        self.u[lane] = hit.u;
        self.v[lane] = hit.v;
        self.ng_x[lane] = hit.ng.x;
        self.ng_y[lane] = hit.ng.y;
        self.ng_z[lane] = hit.ng.z;
        self.geom_id[lane] = hit.geometry_id;
        self.prim_id[lane] = hit.primitive_id;
    }
}
