//! Single-ray traversal of the lanes of a 16-wide packet.
//!
//! Each active lane is traversed on its own, lowest lane first, with a private stack. The closest hit and
//! occlusion queries share the descent loop in [`descend`] and differ only in what happens at leaves.

#[cfg(feature = "parallel")]
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};

use crate::{
    bvh4::{
        node::{Bvh4Node, NodeRef},
        stack::{NearStack, NodeStack, TraversalStack},
        Bvh4, STACK_SIZE,
    },
    mask::{Mask16, Mask4},
    packet::RayPacket16,
    primitive::PrimitiveIntersector,
    ray::{Ray, RayHit, OCCLUDED_GEOM_ID},
};

/// Runtime settings of the traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraversalParams {
    /// After each closer hit, drop stack entries whose entry distance is beyond the new hit distance.
    /// Results are identical either way, this only skips popping nodes that would miss.
    pub stack_compaction: bool,
}

impl Default for TraversalParams {
    fn default() -> Self {
        Self {
            stack_compaction: true,
        }
    }
}

impl TraversalParams {
    /// Default settings with stack compaction turned off.
    pub fn no_compaction() -> Self {
        Self {
            stack_compaction: false,
        }
    }
}

/// Traverses 16-wide packets through a [`Bvh4`], testing leaves with `I`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Intersector16<I> {
    pub primitive: I,
    pub params: TraversalParams,
}

impl<I: PrimitiveIntersector> Intersector16<I> {
    pub fn new(primitive: I) -> Self {
        Self {
            primitive,
            params: TraversalParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: TraversalParams) -> Self {
        self.params = params;
        self
    }

    /// Finds the closest hit of every lane set in `valid`.
    ///
    /// Lanes that hit get `tfar`, `u`, `v`, `ng_*`, `geom_id` and `prim_id` overwritten with the nearest hit
    /// in `[tnear, tfar]`. Lanes that miss, and lanes not in `valid`, are left untouched.
    pub fn intersect(&self, valid: Mask16, bvh: &Bvh4<I::Primitive>, packet: &mut RayPacket16) {
        crate::scope!("intersect16");
        if bvh.is_empty() {
            return;
        }
        let mut stack = NearStack::<STACK_SIZE>::default();
        for lane in valid {
            let ray = packet.ray(lane);
            if let Some(hit) = self.intersect_ray(bvh, ray, &mut stack) {
                packet.store_hit(lane, &hit);
            }
        }
    }

    /// Closest hit of one ray.
    #[inline(always)]
    pub fn intersect_ray(
        &self,
        bvh: &Bvh4<I::Primitive>,
        mut ray: Ray,
        stack: &mut NearStack<STACK_SIZE>,
    ) -> Option<RayHit> {
        let mut closest = None;
        stack.reset(bvh.root);
        loop {
            let node = descend(&bvh.nodes, stack.pop(), &ray, stack);
            let Some(prims) = bvh.leaf_primitives(node) else {
                // Popped the sentinel.
                break;
            };
            if let Some(hit) = self.primitive.intersect(&ray, prims) {
                debug_assert!(hit.t >= ray.tmin && hit.t <= ray.tmax);
                ray.tmax = hit.t;
                closest = Some(hit);
                if self.params.stack_compaction {
                    stack.compact(ray.tmax);
                }
            }
        }
        closest
    }

    /// Finds which lanes set in `valid` hit anything in `[tnear, tfar]`.
    ///
    /// Occluded lanes get `geom_id` set to [`OCCLUDED_GEOM_ID`]. Nothing else in the packet is written.
    pub fn occluded(&self, valid: Mask16, bvh: &Bvh4<I::Primitive>, packet: &mut RayPacket16) {
        crate::scope!("occluded16");
        if bvh.is_empty() {
            return;
        }
        let mut terminated = !valid;
        let mut stack = NodeStack::<STACK_SIZE>::default();
        for lane in valid {
            if self.occluded_ray(bvh, &packet.ray(lane), &mut stack) {
                terminated.set(lane);
            }
            if terminated.all() {
                break;
            }
        }
        for lane in valid & terminated {
            packet.geom_id[lane] = OCCLUDED_GEOM_ID;
        }
    }

    /// Whether one ray hits anything. Stops at the first accepted primitive.
    #[inline(always)]
    pub fn occluded_ray(
        &self,
        bvh: &Bvh4<I::Primitive>,
        ray: &Ray,
        stack: &mut NodeStack<STACK_SIZE>,
    ) -> bool {
        stack.reset(bvh.root);
        loop {
            let node = descend(&bvh.nodes, stack.pop(), ray, stack);
            let Some(prims) = bvh.leaf_primitives(node) else {
                return false;
            };
            if self.primitive.occluded(ray, prims) {
                return true;
            }
        }
    }
}

#[cfg(not(feature = "parallel"))]
impl<I: PrimitiveIntersector> Intersector16<I> {
    /// [`Intersector16::intersect`] for each packet, `valid[i]` being the active lanes of `packets[i]`.
    pub fn intersect_packets(
        &self,
        bvh: &Bvh4<I::Primitive>,
        valid: &[Mask16],
        packets: &mut [RayPacket16],
    ) {
        crate::scope!("intersect_packets");
        assert_eq!(valid.len(), packets.len());
        for (valid, packet) in valid.iter().zip(packets.iter_mut()) {
            self.intersect(*valid, bvh, packet);
        }
    }

    /// [`Intersector16::occluded`] for each packet, `valid[i]` being the active lanes of `packets[i]`.
    pub fn occluded_packets(
        &self,
        bvh: &Bvh4<I::Primitive>,
        valid: &[Mask16],
        packets: &mut [RayPacket16],
    ) {
        crate::scope!("occluded_packets");
        assert_eq!(valid.len(), packets.len());
        for (valid, packet) in valid.iter().zip(packets.iter_mut()) {
            self.occluded(*valid, bvh, packet);
        }
    }
}

#[cfg(feature = "parallel")]
impl<I> Intersector16<I>
where
    I: PrimitiveIntersector + Sync,
    I::Primitive: Sync,
{
    /// [`Intersector16::intersect`] for each packet in parallel, `valid[i]` being the active lanes of
    /// `packets[i]`.
    pub fn intersect_packets(
        &self,
        bvh: &Bvh4<I::Primitive>,
        valid: &[Mask16],
        packets: &mut [RayPacket16],
    ) {
        crate::scope!("intersect_packets");
        assert_eq!(valid.len(), packets.len());
        packets
            .par_iter_mut()
            .zip(valid)
            .for_each(|(packet, valid)| self.intersect(*valid, bvh, packet));
    }

    /// [`Intersector16::occluded`] for each packet in parallel, `valid[i]` being the active lanes of
    /// `packets[i]`.
    pub fn occluded_packets(
        &self,
        bvh: &Bvh4<I::Primitive>,
        valid: &[Mask16],
        packets: &mut [RayPacket16],
    ) {
        crate::scope!("occluded_packets");
        assert_eq!(valid.len(), packets.len());
        packets
            .par_iter_mut()
            .zip(valid)
            .for_each(|(packet, valid)| self.occluded(*valid, bvh, packet));
    }
}

/// Walks down from `node` until reaching a leaf, or the stack sentinel, and returns it.
///
/// At each inner node the next stack entry is popped before looking at the box test result, so the miss
/// path does no further stack work. With one child hit the traversal descends into it, with two it pushes
/// the farther one (the higher index on equal distances), with three or four it descends into the nearest
/// and pushes the rest in slot order.
#[inline(always)]
pub fn descend<S: TraversalStack>(
    nodes: &[Bvh4Node],
    mut node: NodeRef,
    ray: &Ray,
    stack: &mut S,
) -> NodeRef {
    while let Some(index) = node.inner_index() {
        let bvh_node = &nodes[index as usize];
        let hits = bvh_node.intersect_ray(ray);

        node = stack.pop();
        let Some(first) = hits.mask.first() else {
            continue;
        };
        stack.unpop();

        let rest = hits.mask.without_lowest();
        let Some(second) = rest.first() else {
            node = bvh_node.child(first);
            continue;
        };

        if rest.without_lowest().none() {
            let (near, far) = if hits.near[first] <= hits.near[second] {
                (first, second)
            } else {
                (second, first)
            };
            stack.push(bvh_node.child(far), hits.near[far]);
            node = bvh_node.child(near);
            continue;
        }

        let nearest = hits.nearest();
        stack.push_masked(
            hits.mask.and_not(Mask4::lane(nearest)),
            &bvh_node.children(),
            &hits.near,
        );
        node = bvh_node.child(nearest);
    }
    node
}
