#[cfg(test)]
mod tests {

    use glam::*;
    use bvh4_packet::{
        aabb::Aabb,
        bvh4::{
            node::{Bvh4Node, NodeRef},
            traverse::{Intersector16, TraversalParams},
            Bvh4,
        },
        mask::Mask16,
        packet::RayPacket16,
        primitive::{moeller::MoellerTrumbore, FnIntersector, PrimitiveIntersector},
        ray::{Ray, RayHit, INVALID_ID, OCCLUDED_GEOM_ID},
        test_util::{
            builder::{build_bvh4, build_bvh4_from_tris},
            geometry::{height_to_triangles, icosphere, terrain, CUBE, PLANE},
            reference,
            rays::{packets, random_rays},
            sampling::{hash_noise, uniform_sample_sphere},
        },
        triangle::{LeafTriangle, Triangle},
        Boundable,
    };

    fn unit_triangle() -> Triangle {
        Triangle::new(Vec3A::ZERO, Vec3A::X, Vec3A::Y)
    }

    /// One inner node with a single leaf holding one triangle.
    fn single_triangle_bvh() -> Bvh4 {
        let prim = LeafTriangle::new(&unit_triangle(), 0, 0);
        let mut root = Bvh4Node::EMPTY;
        root.set_child(0, &prim.aabb(), NodeRef::leaf(0, 1).unwrap());
        Bvh4::new(vec![root], vec![prim], NodeRef::inner(0).unwrap())
    }

    fn scene(seed: u32) -> Vec<Triangle> {
        let mut tris = icosphere(2);
        tris.extend(CUBE.iter().map(|t| t.transformed(&Mat4::from_scale(Vec3::splat(0.5)))));
        tris.extend(PLANE.iter().map(|t| {
            t.transformed(&Mat4::from_translation(vec3(0.0, -1.0, 0.0)))
        }));
        tris.extend(
            terrain(12, seed)
                .iter()
                .map(|t| t.transformed(&Mat4::from_translation(vec3(0.0, -1.5, 0.0)))),
        );
        tris
    }

    /// All fields of a lane as raw bits.
    fn lane_bits(packet: &RayPacket16, lane: usize) -> [u32; 16] {
        [
            packet.org_x[lane].to_bits(),
            packet.org_y[lane].to_bits(),
            packet.org_z[lane].to_bits(),
            packet.dir_x[lane].to_bits(),
            packet.dir_y[lane].to_bits(),
            packet.dir_z[lane].to_bits(),
            packet.tnear[lane].to_bits(),
            packet.tfar[lane].to_bits(),
            packet.mask[lane],
            packet.u[lane].to_bits(),
            packet.v[lane].to_bits(),
            packet.ng_x[lane].to_bits(),
            packet.ng_y[lane].to_bits(),
            packet.ng_z[lane].to_bits(),
            packet.geom_id[lane],
            packet.prim_id[lane],
        ]
    }

    #[test]
    #[cfg_attr(feature = "backface-culling", ignore)]
    pub fn single_triangle_closest_hit() {
        let bvh = single_triangle_bvh();
        bvh.validate().unwrap();
        let (mut packet, valid) =
            RayPacket16::new(&[Ray::new_inf(vec3a(0.5, 0.5, -1.0), Vec3A::Z)]);
        bvh.intersect16(valid, &mut packet);
        assert_eq!(packet.tfar[0], 1.0);
        assert_eq!(packet.u[0], 0.5);
        assert_eq!(packet.v[0], 0.5);
        assert_eq!(packet.hit(0).ng, vec3a(0.0, 0.0, -1.0));
        assert_eq!(packet.geom_id[0], 0);
        assert_eq!(packet.prim_id[0], 0);
    }

    #[test]
    pub fn boxes_behind_origin_leave_packet_unchanged() {
        let bvh = single_triangle_bvh();
        let rays: Vec<_> = (0..16)
            .map(|i| Ray::new_inf(vec3a(0.25, 0.25, 1.0 + i as f32), Vec3A::Z))
            .collect();
        let (mut packet, valid) = RayPacket16::new(&rays);
        let before = packet;
        bvh.intersect16(valid, &mut packet);
        assert_eq!(packet, before);
        bvh.occluded16(valid, &mut packet);
        assert_eq!(packet, before);
    }

    #[test]
    pub fn two_leaves_behind_origin() {
        // Disjoint boxes, both behind every ray.
        let prims = vec![
            LeafTriangle::new(&unit_triangle().transformed(&Mat4::from_translation(vec3(0.0, 0.0, -2.0))), 0, 0),
            LeafTriangle::new(&unit_triangle().transformed(&Mat4::from_translation(vec3(3.0, 0.0, -5.0))), 0, 1),
        ];
        let mut root = Bvh4Node::EMPTY;
        root.set_child(0, &prims[0].aabb(), NodeRef::leaf(0, 1).unwrap());
        root.set_child(1, &prims[1].aabb(), NodeRef::leaf(1, 1).unwrap());
        let bvh = Bvh4::new(vec![root], prims, NodeRef::inner(0).unwrap());
        assert_eq!(bvh.validate().unwrap().leaf_count, 2);

        let rays: Vec<_> = (0..16)
            .map(|i| {
                let x = if i % 2 == 0 { 0.25 } else { 3.25 };
                Ray::new_inf(vec3a(x, 0.25, i as f32 * 0.5), Vec3A::Z)
            })
            .collect();
        let (mut packet, valid) = RayPacket16::new(&rays);
        let before = packet;
        bvh.intersect16(valid, &mut packet);
        assert_eq!(packet, before);
        bvh.occluded16(valid, &mut packet);
        assert_eq!(packet, before);

        // Turned around, every ray hits the leaf in front of it.
        let flipped: Vec<_> = rays.iter().map(|r| Ray::new_inf(r.origin, -Vec3A::Z)).collect();
        let (mut packet, valid) = RayPacket16::new(&flipped);
        bvh.occluded16(valid, &mut packet);
        assert!(packet.geom_id.iter().all(|&id| id == OCCLUDED_GEOM_ID));
    }

    #[test]
    pub fn ray_parallel_to_box_faces() {
        // The leaf box is flat in z. The ray is parallel to its x and y slabs and starts just inside x = 1.
        let tri = Triangle::new(vec3a(-1.0, -1.0, 100.0), vec3a(1.0, 1.0, 100.0), vec3a(1.0, -1.0, 100.0));
        let prim = LeafTriangle::new(&tri, 4, 0);
        let mut root = Bvh4Node::EMPTY;
        root.set_child(0, &prim.aabb(), NodeRef::leaf(0, 1).unwrap());
        let bvh = Bvh4::new(vec![root], vec![prim], NodeRef::inner(0).unwrap());
        let ray = Ray::new_inf(vec3a(0.99999, 0.0, 0.0), Vec3A::Z);
        let expected = reference::closest_hit(&MoellerTrumbore::default(), &bvh.primitives, &ray).unwrap();
        assert_eq!(expected.t, 100.0);

        let (mut packet, valid) = RayPacket16::new(&[ray, Ray::new_inf(vec3a(-0.5, -0.99999, 0.0), Vec3A::Z)]);
        let mut occluded = packet;
        bvh.intersect16(valid, &mut packet);
        assert_eq!(packet.hit(0), expected);
        assert_eq!(packet.geom_id[1], 4);
        assert_eq!(packet.tfar[1], 100.0);
        bvh.occluded16(valid, &mut occluded);
        assert_eq!(occluded.geom_id[..2], [OCCLUDED_GEOM_ID; 2]);
    }

    #[test]
    #[cfg_attr(feature = "backface-culling", ignore)]
    pub fn inactive_lanes_are_untouched() {
        let tris = scene(0);
        let bvh = build_bvh4_from_tris(&tris, 3, 4).unwrap();
        let mut rays = random_rays(16, 4.0, 7);
        rays[0] = Ray::new_inf(vec3a(0.13, 0.07, 4.0), -Vec3A::Z);
        rays[5] = Ray::new_inf(vec3a(4.0, 0.11, 0.17), -Vec3A::X);
        let (mut packet, _) = RayPacket16::new(&rays);
        let before = packet;
        let valid = Mask16::lane(0) | Mask16::lane(5);

        bvh.intersect16(valid, &mut packet);
        for lane in 0..16 {
            if valid.test(lane) {
                assert_eq!(packet.geom_id[lane], 3);
                assert!(packet.tfar[lane] > 2.9 && packet.tfar[lane] < 3.1);
            } else {
                assert_eq!(lane_bits(&packet, lane), lane_bits(&before, lane));
            }
        }

        let mut occluded = before;
        bvh.occluded16(valid, &mut occluded);
        for lane in 0..16 {
            if valid.test(lane) {
                assert_eq!(occluded.geom_id[lane], OCCLUDED_GEOM_ID);
                assert_eq!(occluded.tfar[lane], before.tfar[lane]);
            } else {
                assert_eq!(lane_bits(&occluded, lane), lane_bits(&before, lane));
            }
        }
    }

    #[test]
    pub fn closest_hit_matches_brute_force() {
        let tris = scene(1);
        let mt = MoellerTrumbore::default();
        let rays = random_rays(512, 4.0, 1);
        for leaf_size in [1, 2, 4] {
            let bvh = build_bvh4_from_tris(&tris, 0, leaf_size).unwrap();
            bvh.validate().unwrap();
            let (valid, mut pkts) = packets(&rays);
            Intersector16::new(mt).intersect_packets(&bvh, &valid, &mut pkts);

            for (i, ray) in rays.iter().enumerate() {
                let hit = pkts[i / 16].hit(i % 16);
                match reference::closest_hit(&mt, &bvh.primitives, ray) {
                    Some(expected) => {
                        assert_eq!(hit.t, expected.t, "ray {i}");
                        // The reported primitive reproduces the hit on its own.
                        let prim = bvh
                            .primitives
                            .iter()
                            .find(|p| p.prim_id == hit.primitive_id)
                            .unwrap();
                        let again = mt
                            .intersect(&Ray { tmax: hit.t, ..*ray }, std::slice::from_ref(prim))
                            .unwrap();
                        assert_eq!(again, hit);
                    }
                    None => {
                        assert_eq!(hit.geometry_id, INVALID_ID, "ray {i}");
                        assert_eq!(hit.t, f32::INFINITY);
                    }
                }
            }
        }
    }

    #[test]
    pub fn occluded_agrees_with_closest_hit() {
        let tris = scene(2);
        let bvh = build_bvh4_from_tris(&tris, 1, 3).unwrap();
        let mut rays = random_rays(256, 3.0, 2);
        // Short rays, some of which stop before reaching anything.
        for (i, ray) in rays.iter_mut().enumerate() {
            ray.tmax = 1.0 + hash_noise(uvec2(i as u32, 0), 2) * 2.0;
        }
        let (valid, mut closest) = packets(&rays);
        let mut occluded = closest.clone();
        let intersector = Intersector16::new(MoellerTrumbore::default());
        intersector.intersect_packets(&bvh, &valid, &mut closest);
        intersector.occluded_packets(&bvh, &valid, &mut occluded);

        let mut hits = 0;
        for (i, ray) in rays.iter().enumerate() {
            let (p, lane) = (i / 16, i % 16);
            let hit = closest[p].geom_id[lane] != INVALID_ID;
            let blocked = occluded[p].geom_id[lane] == OCCLUDED_GEOM_ID;
            assert_eq!(hit, blocked, "ray {i}");
            assert_eq!(
                blocked,
                reference::any_hit(&intersector.primitive, &bvh.primitives, ray)
            );
            hits += hit as usize;
        }
        assert!(hits > 0 && hits < rays.len());
    }

    #[test]
    pub fn compaction_does_not_change_results() {
        let tris = scene(3);
        let bvh = build_bvh4_from_tris(&tris, 0, 1).unwrap();
        let rays = random_rays(320, 5.0, 3);
        let (valid, mut with) = packets(&rays);
        let mut without = with.clone();
        let intersector = Intersector16::new(MoellerTrumbore::default());
        intersector.intersect_packets(&bvh, &valid, &mut with);
        intersector
            .with_params(TraversalParams::no_compaction())
            .intersect_packets(&bvh, &valid, &mut without);
        assert_eq!(with, without);
    }

    #[test]
    pub fn empty_interval_never_hits() {
        let bvh = build_bvh4_from_tris(&scene(4), 0, 4).unwrap();
        let rays: Vec<_> = random_rays(16, 4.0, 4)
            .into_iter()
            .map(|r| Ray::new(r.origin, r.direction, 3.0, 2.0))
            .collect();
        let (mut packet, valid) = RayPacket16::new(&rays);
        let before = packet;
        bvh.intersect16(valid, &mut packet);
        bvh.occluded16(valid, &mut packet);
        assert_eq!(packet, before);
    }

    #[test]
    #[cfg_attr(feature = "backface-culling", ignore)]
    pub fn integer_valid_vector() {
        let bvh = single_triangle_bvh();
        let ray = Ray::new_inf(vec3a(0.25, 0.25, -1.0), Vec3A::Z);
        let (mut packet, _) = RayPacket16::new(&[ray; 16]);
        let mut valid = [0i32; 16];
        valid[3] = -1;
        valid[9] = 1;
        bvh.intersect16(Mask16::from_valid(&valid), &mut packet);
        for lane in 0..16 {
            let expected = if lane == 3 || lane == 9 { 0 } else { INVALID_ID };
            assert_eq!(packet.geom_id[lane], expected);
        }
    }

    #[test]
    pub fn flat_terrain_normals() {
        let tris = height_to_triangles(|_x, _z| 0.0, 4, 4);
        let bvh = build_bvh4_from_tris(&tris, 0, 2).unwrap();
        let rays: Vec<_> = (0..16)
            .map(|i| {
                let p = vec2(hash_noise(uvec2(i, 0), 5), hash_noise(uvec2(i, 1), 5)) * 1.8 - 0.9;
                Ray::new_inf(vec3a(p.x, 1.0, p.y), -Vec3A::Y)
            })
            .collect();
        let (mut packet, valid) = RayPacket16::new(&rays);
        bvh.intersect16(valid, &mut packet);
        for lane in valid {
            assert!((packet.tfar[lane] - 1.0).abs() < 1e-6);
            // (v1 - v0) x (v0 - v2) of this winding points down, towards -Y.
            assert!(packet.hit(lane).ng.normalize().abs_diff_eq(-Vec3A::Y, 1e-6));
        }
    }

    #[derive(Clone, Copy, Debug)]
    struct Sphere {
        center: Vec3A,
        radius: f32,
        id: u32,
    }

    impl Boundable for Sphere {
        fn aabb(&self) -> Aabb {
            Aabb::new(self.center - self.radius, self.center + self.radius)
        }
    }

    fn intersect_sphere(ray: &Ray, sphere: &Sphere) -> Option<RayHit> {
        let oc = ray.origin - sphere.center;
        let a = ray.direction.length_squared();
        let b = oc.dot(ray.direction);
        let c = oc.length_squared() - sphere.radius * sphere.radius;
        let disc = b * b - a * c;
        if disc < 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        let t0 = (-b - sq) / a;
        let t = if t0 >= ray.tmin { t0 } else { (-b + sq) / a };
        Some(RayHit {
            t,
            u: 0.0,
            v: 0.0,
            ng: ray.at(t) - sphere.center,
            geometry_id: 9,
            primitive_id: sphere.id,
        })
    }

    #[test]
    pub fn user_primitives() {
        let spheres: Vec<_> = (0..100)
            .map(|i| {
                let r = |j: u32| hash_noise(uvec2(i, j), 6);
                Sphere {
                    center: uniform_sample_sphere(vec2(r(0), r(1))) * (0.5 + r(2)),
                    radius: 0.05 + r(3) * 0.1,
                    id: i,
                }
            })
            .collect();
        let bvh = build_bvh4(&spheres, 2).unwrap();
        bvh.validate().unwrap();

        let intersector = Intersector16::new(FnIntersector::new(intersect_sphere));
        let rays = random_rays(128, 3.0, 6);
        let (valid, mut pkts) = packets(&rays);
        let mut occluded = pkts.clone();
        intersector.intersect_packets(&bvh, &valid, &mut pkts);
        intersector.occluded_packets(&bvh, &valid, &mut occluded);

        let mut hits = 0;
        for (i, ray) in rays.iter().enumerate() {
            let hit = pkts[i / 16].hit(i % 16);
            let expected = reference::closest_hit(&intersector.primitive, &bvh.primitives, ray);
            assert_eq!(hit.is_hit(), expected.is_some(), "ray {i}");
            if let Some(expected) = expected {
                assert_eq!(hit.t, expected.t);
                assert_eq!(hit.primitive_id, expected.primitive_id);
                hits += 1;
            }
            assert_eq!(
                occluded[i / 16].geom_id[i % 16] == OCCLUDED_GEOM_ID,
                hit.is_hit()
            );
        }
        assert!(hits > 0);
    }

    #[test]
    #[cfg_attr(feature = "backface-culling", ignore)]
    pub fn random_directions_from_inside() {
        // Every ray starting at the center of a closed sphere hits it near t = 1.
        let bvh = build_bvh4_from_tris(&icosphere(3), 0, 4).unwrap();
        let rays: Vec<_> = (0..64)
            .map(|i| {
                let dir = uniform_sample_sphere(vec2(
                    hash_noise(uvec2(i, 0), 8),
                    hash_noise(uvec2(i, 1), 8),
                ));
                Ray::new_inf(Vec3A::ZERO, dir)
            })
            .collect();
        let (valid, mut pkts) = packets(&rays);
        let intersector = Intersector16::new(MoellerTrumbore::default());
        intersector.intersect_packets(&bvh, &valid, &mut pkts);
        for (p, packet) in pkts.iter().enumerate() {
            for lane in valid[p] {
                assert!(packet.geom_id[lane] == 0, "lane {lane} of packet {p} escaped");
                assert!(packet.tfar[lane] > 0.98 && packet.tfar[lane] <= 1.0 + 1e-5);
            }
        }
    }
}
