//! Meshes, generators, sampling functions, a reference builder and brute force queries for testing & examples.

pub mod sampling {
    use std::f32::consts::TAU;

    use glam::*;

    #[inline(always)]
    pub fn uhash(x: u32) -> u32 {
        // from https://nullprogram.com/blog/2018/07/31/
        let mut x = x ^ (x >> 16);
        x = x.overflowing_mul(0x7feb352d).0;
        x = x ^ (x >> 15);
        x = x.overflowing_mul(0x846ca68b).0;
        x = x ^ (x >> 16);
        x
    }

    #[inline(always)]
    pub fn uhash2(a: u32, b: u32) -> u32 {
        uhash((a.overflowing_mul(1597334673).0) ^ (b.overflowing_mul(3812015801).0))
    }

    #[inline(always)]
    pub fn unormf(n: u32) -> f32 {
        n as f32 * (1.0 / 0xffffffffu32 as f32)
    }

    /// Hash based value in 0..=1, deterministic for a given coord and frame.
    #[inline(always)]
    pub fn hash_noise(coord: UVec2, frame: u32) -> f32 {
        let urnd = uhash2(coord.x, (coord.y << 11) + frame);
        unormf(urnd)
    }

    #[inline(always)]
    pub fn uniform_sample_sphere(urand: Vec2) -> Vec3A {
        let z = 1.0 - 2.0 * urand.x;
        let r = (1.0 - z * z).max(0.0).sqrt();
        let theta = urand.y * TAU;
        vec3a(r * theta.cos(), r * theta.sin(), z)
    }

    #[inline(always)]
    fn cubic(v0: f32, v1: f32, v2: f32, v3: f32, x: f32) -> f32 {
        let p = (v3 - v2) - (v0 - v1);
        let q = (v0 - v1) - p;
        let r = v2 - v0;
        p * x.powi(3) + q * x.powi(2) + r * x + v1
    }

    #[inline(always)]
    pub fn bicubic_noise(coord: Vec2, seed: u32) -> f32 {
        let ix = coord.x.floor() as u32;
        let iy = coord.y.floor() as u32;
        let fx = coord.x - ix as f32;
        let fy = coord.y - iy as f32;
        let row = |j: u32| {
            cubic(
                hash_noise(uvec2(ix, iy + j), seed),
                hash_noise(uvec2(ix + 1, iy + j), seed),
                hash_noise(uvec2(ix + 2, iy + j), seed),
                hash_noise(uvec2(ix + 3, iy + j), seed),
                fx,
            )
        };
        cubic(row(0), row(1), row(2), row(3), fy)
    }
}

pub mod geometry {
    use crate::{test_util::sampling::bicubic_noise, triangle::Triangle};
    use glam::*;

    #[inline(always)]
    const fn vec(a: f32, b: f32, c: f32) -> Vec3A {
        Vec3A::new(a, b, c)
    }
    #[inline(always)]
    const fn tri(v0: Vec3A, v1: Vec3A, v2: Vec3A) -> Triangle {
        Triangle::new(v0, v1, v2)
    }

    /// Cube triangle mesh with side length of 2 centered at 0,0,0
    pub const CUBE: [Triangle; 12] = [
        tri(vec(-1., 1., -1.), vec(1., 1., 1.), vec(1., 1., -1.)),
        tri(vec(1., 1., 1.), vec(-1., -1., 1.), vec(1., -1., 1.)),
        tri(vec(-1., 1., 1.), vec(-1., -1., -1.), vec(-1., -1., 1.)),
        tri(vec(1., -1., -1.), vec(-1., -1., 1.), vec(-1., -1., -1.)),
        tri(vec(1., 1., -1.), vec(1., -1., 1.), vec(1., -1., -1.)),
        tri(vec(-1., 1., -1.), vec(1., -1., -1.), vec(-1., -1., -1.)),
        tri(vec(-1., 1., -1.), vec(-1., 1., 1.), vec(1., 1., 1.)),
        tri(vec(1., 1., 1.), vec(-1., 1., 1.), vec(-1., -1., 1.)),
        tri(vec(-1., 1., 1.), vec(-1., 1., -1.), vec(-1., -1., -1.)),
        tri(vec(1., -1., -1.), vec(1., -1., 1.), vec(-1., -1., 1.)),
        tri(vec(1., 1., -1.), vec(1., 1., 1.), vec(1., -1., 1.)),
        tri(vec(-1., 1., -1.), vec(1., 1., -1.), vec(1., -1., -1.)),
    ];

    /// Plane triangle mesh in XZ with side length of 2 centered at 0,0,0
    pub const PLANE: [Triangle; 2] = [
        tri(vec(1., 0., 1.), vec(-1., 0., -1.), vec(-1., 0., 1.)),
        tri(vec(1., 0., 1.), vec(1., 0., -1.), vec(-1., 0., -1.)),
    ];

    /// Icosphere mesh with radius of 1, 20 * 4^subdivisions triangles
    pub fn icosphere(subdivisions: u32) -> Vec<Triangle> {
        let phi = (1.0 + 5.0_f32.sqrt()) / 2.0; // golden ratio
        let (a, b, c, d, e) = (1.0, -1.0, 0.0, phi, -phi);

        #[rustfmt::skip]
        let mut p = [vec(b,d,c),vec(a,d,c),vec(b,e,c),vec(a,e,c),vec(c,b,d),vec(c,a,d),vec(c,b,e),vec(c,a,e),vec(d,c,b),vec(d,c,a),vec(e,c,b),vec(e,c,a)];
        p.iter_mut().for_each(|v| *v = v.normalize());

        #[rustfmt::skip]
        let faces = [
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];
        let mut tris: Vec<Triangle> = faces
            .iter()
            .map(|f| tri(p[f[0]], p[f[1]], p[f[2]]))
            .collect();

        for _ in 0..subdivisions {
            tris = tris
                .iter()
                .flat_map(|t| {
                    let mid01 = ((t.v0 + t.v1) * 0.5).normalize();
                    let mid12 = ((t.v1 + t.v2) * 0.5).normalize();
                    let mid20 = ((t.v2 + t.v0) * 0.5).normalize();
                    [
                        tri(t.v0, mid01, mid20),
                        tri(t.v1, mid12, mid01),
                        tri(t.v2, mid20, mid12),
                        tri(mid01, mid12, mid20),
                    ]
                })
                .collect();
        }

        tris
    }

    /// Convert height map to triangles with 2x2x2 size given -1.0..=1.0 output from height_map: F
    pub fn height_to_triangles<F>(
        height_map: F,
        x_resolution: usize,
        z_resolution: usize,
    ) -> Vec<Triangle>
    where
        F: Fn(usize, usize) -> f32,
    {
        let mut triangles = Vec::with_capacity(x_resolution * z_resolution * 2);
        let grid = |x: usize, z: usize| {
            vec(
                (x as f32 / x_resolution as f32) * 2.0 - 1.0,
                height_map(x, z),
                (z as f32 / z_resolution as f32) * 2.0 - 1.0,
            )
        };
        for z in 0..z_resolution {
            for x in 0..x_resolution {
                let (v00, v10) = (grid(x, z), grid(x + 1, z));
                let (v01, v11) = (grid(x, z + 1), grid(x + 1, z + 1));
                triangles.push(tri(v00, v01, v10));
                triangles.push(tri(v10, v01, v11));
            }
        }
        triangles
    }

    /// Noise terrain, a dense scene with lots of nearly coplanar neighbors.
    pub fn terrain(resolution: usize, seed: u32) -> Vec<Triangle> {
        let height_map = |x: usize, y: usize| -> f32 {
            let coord = vec2(x as f32, y as f32) / resolution as f32;
            let (mut cs, mut ns) = (1.579, 0.579);
            (1..9)
                .map(|i| {
                    (cs, ns) = (cs * 1.579, ns * -0.579);
                    bicubic_noise(coord * cs, seed + i) * ns
                })
                .sum::<f32>()
        };
        height_to_triangles(height_map, resolution, resolution)
    }
}

/// A simple Morton order BVH4 builder. Quality is not a goal, it exists to give the traversal realistic input.
pub mod builder {
    use glam::DVec3;
    use rdst::{RadixKey, RadixSort};

    use crate::{
        aabb::Aabb,
        bvh4::{
            node::{Bvh4Node, NodeRef},
            Bvh4, BRANCHING,
        },
        error::Bvh4Error,
        triangle::{LeafTriangle, Triangle},
        Boundable,
    };

    #[inline]
    pub fn split_by_3_u64(a: u32) -> u64 {
        let mut x = a as u64 & 0x1fffff; // we only look at the first 21 bits
        x = (x | x << 32) & 0x1f00000000ffff;
        x = (x | x << 16) & 0x1f0000ff0000ff;
        x = (x | x << 8) & 0x100f00f00f00f00f;
        x = (x | x << 4) & 0x10c30c30c30c30c3;
        x = (x | x << 2) & 0x1249249249249249;
        x
    }

    /// Encode a position in 0.0..=1.0 into a 63 bit morton code.
    #[inline]
    pub fn morton_encode_u64_unorm(p: DVec3) -> u64 {
        let max = ((1u32 << 21) - 1) as f64;
        let p = (p * (1u32 << 21) as f64).clamp(DVec3::ZERO, DVec3::splat(max));
        split_by_3_u64(p.x as u32) | split_by_3_u64(p.y as u32) << 1 | split_by_3_u64(p.z as u32) << 2
    }

    #[derive(Clone, Copy)]
    struct Morton64 {
        code: u64,
        index: u64,
    }

    impl RadixKey for Morton64 {
        const LEVELS: usize = 8;

        #[inline(always)]
        fn get_level(&self, level: usize) -> u8 {
            self.code.get_level(level)
        }
    }

    /// Indices of `prims` sorted along a Morton curve through their box centers.
    pub fn morton_order<P: Boundable>(prims: &[P]) -> Vec<usize> {
        crate::scope!("morton_order");
        let centers: Vec<_> = prims.iter().map(|p| p.aabb().center()).collect();
        let bounds = Aabb::from_points(&centers);
        let scale = 1.0 / bounds.diagonal().as_dvec3().max(DVec3::splat(1e-12));
        let offset = -bounds.min.as_dvec3() * scale;

        let mut mortons: Vec<Morton64> = centers
            .iter()
            .enumerate()
            .map(|(index, c)| Morton64 {
                code: morton_encode_u64_unorm(c.as_dvec3() * scale + offset),
                index: index as u64,
            })
            .collect();
        match mortons.len() {
            0..=250_000 => mortons.sort_unstable_by_key(|m| m.code),
            _ => mortons.radix_sort_unstable(),
        }
        mortons.iter().map(|m| m.index as usize).collect()
    }

    struct Builder<'a, P> {
        prims: &'a [P],
        order: Vec<usize>,
        max_leaf_size: usize,
        nodes: Vec<Bvh4Node>,
        primitives: Vec<P>,
    }

    impl<P: Boundable + Copy> Builder<'_, P> {
        /// Builds the subtree over `order[start..end]` and returns its reference and bounds.
        fn build_range(&mut self, start: usize, end: usize) -> Result<(NodeRef, Aabb), Bvh4Error> {
            let count = end - start;
            if count <= self.max_leaf_size {
                let offset = self.primitives.len() as u32;
                let mut aabb = Aabb::EMPTY;
                for &i in &self.order[start..end] {
                    aabb = aabb.union(&self.prims[i].aabb());
                    self.primitives.push(self.prims[i]);
                }
                return Ok((NodeRef::leaf(offset, count as u32)?, aabb));
            }

            let index = self.nodes.len();
            self.nodes.push(Bvh4Node::EMPTY);
            let node_ref = NodeRef::inner(index as u32)?;
            let chunk = count.div_ceil(BRANCHING);
            let mut aabb = Aabb::EMPTY;
            for (slot, chunk_start) in (start..end).step_by(chunk).enumerate() {
                let chunk_end = (chunk_start + chunk).min(end);
                let (child, child_aabb) = self.build_range(chunk_start, chunk_end)?;
                self.nodes[index].set_child(slot, &child_aabb, child);
                aabb = aabb.union(&child_aabb);
            }
            Ok((node_ref, aabb))
        }
    }

    /// Builds a BVH4 whose leaves hold up to `max_leaf_size` (1..=4) primitives. Primitives are copied into
    /// leaf order.
    pub fn build_bvh4<P: Boundable + Copy>(
        prims: &[P],
        max_leaf_size: usize,
    ) -> Result<Bvh4<P>, Bvh4Error> {
        crate::scope!("build_bvh4");
        if !(1..=NodeRef::MAX_LEAF_COUNT as usize).contains(&max_leaf_size) {
            return Err(Bvh4Error::LeafCount(max_leaf_size as u32));
        }
        if prims.is_empty() {
            return Ok(Bvh4::default());
        }
        crate::timeit!["build_bvh4",
        let mut builder = Builder {
            prims,
            order: morton_order(prims),
            max_leaf_size,
            nodes: Vec::with_capacity(prims.len().div_ceil(max_leaf_size)),
            primitives: Vec::with_capacity(prims.len()),
        };
        let (root, _) = builder.build_range(0, prims.len())?;
        ];
        Ok(Bvh4::new(builder.nodes, builder.primitives, root))
    }

    /// Builds a BVH4 of [`LeafTriangle`]s, primitive ids being the index into `tris`.
    pub fn build_bvh4_from_tris(
        tris: &[Triangle],
        geom_id: u32,
        max_leaf_size: usize,
    ) -> Result<Bvh4<LeafTriangle>, Bvh4Error> {
        let leaves: Vec<_> = tris
            .iter()
            .enumerate()
            .map(|(i, t)| LeafTriangle::new(t, geom_id, i as u32))
            .collect();
        build_bvh4(&leaves, max_leaf_size)
    }
}

/// Exhaustive single-primitive queries to check the traversal against.
pub mod reference {
    use std::slice;

    use crate::{
        primitive::PrimitiveIntersector,
        ray::{Ray, RayHit},
    };

    /// Nearest hit over all of `prims`, the lowest index on equal distances.
    pub fn closest_hit<I: PrimitiveIntersector>(
        intersector: &I,
        prims: &[I::Primitive],
        ray: &Ray,
    ) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;
        for prim in prims {
            if let Some(hit) = intersector.intersect(ray, slice::from_ref(prim)) {
                if closest.is_none_or(|c| hit.t < c.t) {
                    closest = Some(hit);
                }
            }
        }
        closest
    }

    pub fn any_hit<I: PrimitiveIntersector>(
        intersector: &I,
        prims: &[I::Primitive],
        ray: &Ray,
    ) -> bool {
        prims
            .iter()
            .any(|prim| intersector.occluded(ray, slice::from_ref(prim)))
    }
}

/// Random rays and packets.
pub mod rays {
    use glam::*;

    use crate::{
        mask::Mask16,
        packet::{RayPacket16, PACKET_WIDTH},
        ray::Ray,
        test_util::sampling::{hash_noise, uniform_sample_sphere},
    };

    /// Rays starting on a sphere of `radius` around the origin, aimed at random points inside the unit cube.
    pub fn random_rays(count: usize, radius: f32, seed: u32) -> Vec<Ray> {
        (0..count as u32)
            .map(|i| {
                let r = |j: u32| hash_noise(uvec2(i, j), seed);
                let origin = uniform_sample_sphere(vec2(r(0), r(1))) * radius;
                let target = vec3a(r(2), r(3), r(4)) * 2.0 - 1.0;
                Ray::new_inf(origin, (target - origin).normalize())
            })
            .collect()
    }

    /// Splits `rays` into packets, the last one partially filled.
    pub fn packets(rays: &[Ray]) -> (Vec<Mask16>, Vec<RayPacket16>) {
        rays.chunks(PACKET_WIDTH).map(RayPacket16::new).map(|(p, m)| (m, p)).unzip()
    }
}
