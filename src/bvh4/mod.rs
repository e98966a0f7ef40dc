//! A four-way BVH whose rays are traversed one at a time out of 16-wide packets.

pub mod node;
#[cfg(all(
    any(target_arch = "x86", target_arch = "x86_64"),
    target_feature = "sse2"
))]
pub mod simd;
pub mod stack;
pub mod traverse;

use std::{collections::HashMap, fmt};

use node::{Bvh4Node, NodeKind, NodeRef};

use crate::{
    aabb::Aabb, error::Bvh4Error, mask::Mask16, packet::RayPacket16,
    primitive::moeller::MoellerTrumbore, triangle::LeafTriangle, Boundable,
};
use traverse::Intersector16;

pub const BRANCHING: usize = 4;

/// Deepest hierarchy the traversal supports. `Bvh4::validate` rejects anything deeper.
pub const MAX_DEPTH: usize = 32;

/// Each inner node on the current path pushes at most 3 siblings, plus the sentinel.
pub const STACK_SIZE: usize = 3 * MAX_DEPTH + 1;

/// A BVH4 over primitives of type `P`.
///
/// Leaves reference contiguous runs of 1 to 4 entries of `primitives`. The hierarchy is read only during
/// traversal, so one `Bvh4` can be queried from many threads at once.
#[derive(Clone, PartialEq, Debug)]
pub struct Bvh4<P = LeafTriangle> {
    pub nodes: Vec<Bvh4Node>,
    pub primitives: Vec<P>,
    /// Inner node, leaf, or `NodeRef::EMPTY` for an empty hierarchy.
    pub root: NodeRef,
}

impl<P> Default for Bvh4<P> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            primitives: Vec::new(),
            root: NodeRef::EMPTY,
        }
    }
}

impl<P> Bvh4<P> {
    pub fn new(nodes: Vec<Bvh4Node>, primitives: Vec<P>, root: NodeRef) -> Self {
        Self {
            nodes,
            primitives,
            root,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Primitives referenced by a leaf, `None` for inner nodes and `NodeRef::EMPTY`.
    #[inline(always)]
    pub fn leaf_primitives(&self, node: NodeRef) -> Option<&[P]> {
        let (offset, count) = node.leaf_range()?;
        let start = offset as usize;
        Some(&self.primitives[start..start + count as usize])
    }

    /// Checks that the hierarchy is a well formed tree the traversal can walk: references in range, leaf
    /// runs inside `primitives`, empty slots really empty, every child box enclosing what is below it, no
    /// node reachable twice and depth at most [`MAX_DEPTH`].
    pub fn validate(&self) -> Result<Bvh4Stats, Bvh4Error>
    where
        P: Boundable,
    {
        let mut stats = Bvh4Stats::default();
        if self.root.is_empty() {
            return Ok(stats);
        }
        let mut visited = vec![false; self.nodes.len()];
        self.validate_ref(self.root, 0, &mut visited, &mut stats)?;
        Ok(stats)
    }

    /// Validates the subtree at `node` and returns its bounds.
    fn validate_ref(
        &self,
        node: NodeRef,
        depth: u32,
        visited: &mut [bool],
        stats: &mut Bvh4Stats,
    ) -> Result<Aabb, Bvh4Error>
    where
        P: Boundable,
    {
        if depth as usize > MAX_DEPTH {
            return Err(Bvh4Error::TooDeep {
                depth,
                max_depth: MAX_DEPTH as u32,
            });
        }
        stats.max_depth = stats.max_depth.max(depth);

        match node.kind() {
            NodeKind::Empty => Ok(Aabb::EMPTY),
            NodeKind::Leaf { offset, count } => {
                let end = offset as usize + count as usize;
                if end > self.primitives.len() {
                    return Err(Bvh4Error::LeafOutOfRange {
                        offset,
                        count,
                        primitive_count: self.primitives.len(),
                    });
                }
                stats.leaf_count += 1;
                stats.prim_count += count as usize;
                *stats.leaves_at_depth.entry(depth).or_default() += 1;
                Ok(self.primitives[offset as usize..end]
                    .iter()
                    .fold(Aabb::EMPTY, |aabb, p| aabb.union(&p.aabb())))
            }
            NodeKind::Inner(index) => {
                let Some(seen) = visited.get_mut(index as usize) else {
                    return Err(Bvh4Error::NodeOutOfRange {
                        node: index,
                        slot: 0,
                        child: index,
                        node_count: self.nodes.len(),
                    });
                };
                if *seen {
                    return Err(Bvh4Error::NodeRevisited(index));
                }
                *seen = true;
                stats.node_count += 1;
                *stats.nodes_at_depth.entry(depth).or_default() += 1;

                let bvh_node = &self.nodes[index as usize];
                let mut bounds = Aabb::EMPTY;
                for slot in 0..BRANCHING {
                    let child = bvh_node.child(slot);
                    let child_aabb = bvh_node.child_aabb(slot);
                    if child.is_empty() {
                        if child_aabb != Aabb::EMPTY {
                            return Err(Bvh4Error::EmptySlotBounds { node: index, slot });
                        }
                        continue;
                    }
                    if !child_aabb.valid() {
                        return Err(Bvh4Error::EmptyChildBounds { node: index, slot });
                    }
                    if let Some(child_index) = child.inner_index() {
                        if child_index as usize >= self.nodes.len() {
                            return Err(Bvh4Error::NodeOutOfRange {
                                node: index,
                                slot,
                                child: child_index,
                                node_count: self.nodes.len(),
                            });
                        }
                    }
                    stats.child_count += 1;
                    let content = self.validate_ref(child, depth + 1, visited, stats)?;
                    if content.valid() && !child_aabb.contains_aabb(&content) {
                        return Err(Bvh4Error::ChildNotEnclosed { node: index, slot });
                    }
                    bounds = bounds.union(&child_aabb);
                }
                Ok(bounds)
            }
        }
    }
}

impl Bvh4<LeafTriangle> {
    /// Closest hit of the active lanes of `packet` against this triangle BVH, with default settings.
    /// See [`Intersector16::intersect`].
    pub fn intersect16(&self, valid: Mask16, packet: &mut RayPacket16) {
        Intersector16::new(MoellerTrumbore::default()).intersect(valid, self, packet);
    }

    /// Occlusion of the active lanes of `packet` against this triangle BVH, with default settings.
    /// See [`Intersector16::occluded`].
    pub fn occluded16(&self, valid: Mask16, packet: &mut RayPacket16) {
        Intersector16::new(MoellerTrumbore::default()).occluded(valid, self, packet);
    }
}

/// Counts gathered by [`Bvh4::validate`].
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Bvh4Stats {
    /// Inner nodes reachable from the root.
    pub node_count: usize,
    /// Non-empty child slots of those nodes.
    pub child_count: usize,
    pub leaf_count: usize,
    /// Primitive references in leaves.
    pub prim_count: usize,
    /// Depth of the deepest node or leaf, the root being at depth 0.
    pub max_depth: u32,
    pub nodes_at_depth: HashMap<u32, u32>,
    pub leaves_at_depth: HashMap<u32, u32>,
}

impl fmt::Display for Bvh4Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "BVH4 Avg children/node: {:.3}, primitives/leaf: {:.3}",
            self.child_count as f64 / self.node_count.max(1) as f64,
            self.prim_count as f64 / self.leaf_count.max(1) as f64
        )?;
        writeln!(
            f,
            "node_count: {}, leaf_count: {}, prim_count: {}, max_depth: {}",
            self.node_count, self.leaf_count, self.prim_count, self.max_depth
        )?;

        let mut depths: Vec<_> = self.nodes_at_depth.keys().copied().collect();
        depths.extend(self.leaves_at_depth.keys());
        depths.sort_unstable();
        depths.dedup();
        for depth in depths {
            writeln!(
                f,
                "depth {depth}: nodes {}, leaves {}",
                self.nodes_at_depth.get(&depth).unwrap_or(&0),
                self.leaves_at_depth.get(&depth).unwrap_or(&0)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::{vec3a, Vec3A};

    use super::*;
    use crate::triangle::Triangle;

    fn tri_at(z: f32, prim_id: u32) -> LeafTriangle {
        LeafTriangle::new(
            &Triangle::new(vec3a(0.0, 0.0, z), vec3a(1.0, 0.0, z), vec3a(0.0, 1.0, z)),
            0,
            prim_id,
        )
    }

    /// Root with two leaves, each with one triangle.
    fn two_leaf_bvh() -> Bvh4 {
        let prims = vec![tri_at(1.0, 0), tri_at(2.0, 1)];
        let mut root = Bvh4Node::EMPTY;
        root.set_child(0, &prims[0].aabb(), NodeRef::leaf(0, 1).unwrap());
        root.set_child(2, &prims[1].aabb(), NodeRef::leaf(1, 1).unwrap());
        Bvh4::new(vec![root], prims, NodeRef::inner(0).unwrap())
    }

    #[test]
    fn test_validate() {
        let bvh = two_leaf_bvh();
        let stats = bvh.validate().unwrap();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.child_count, 2);
        assert_eq!(stats.leaf_count, 2);
        assert_eq!(stats.prim_count, 2);
        assert_eq!(stats.max_depth, 1);
        assert!(format!("{stats}").contains("depth 1: nodes 0, leaves 2"));

        assert_eq!(Bvh4::<LeafTriangle>::default().validate(), Ok(Bvh4Stats::default()));
    }

    #[test]
    fn test_validate_errors() {
        let mut bvh = two_leaf_bvh();
        bvh.nodes[0].set_child(1, &Aabb::new(Vec3A::ZERO, Vec3A::ONE), NodeRef::EMPTY);
        assert_eq!(
            bvh.validate(),
            Err(Bvh4Error::EmptySlotBounds { node: 0, slot: 1 })
        );

        let mut bvh = two_leaf_bvh();
        bvh.nodes[0].set_child(0, &Aabb::EMPTY, NodeRef::leaf(0, 1).unwrap());
        assert_eq!(
            bvh.validate(),
            Err(Bvh4Error::EmptyChildBounds { node: 0, slot: 0 })
        );

        let mut bvh = two_leaf_bvh();
        bvh.nodes[0].set_child(2, &bvh.primitives[1].aabb(), NodeRef::leaf(1, 2).unwrap());
        assert!(matches!(
            bvh.validate(),
            Err(Bvh4Error::LeafOutOfRange { offset: 1, count: 2, .. })
        ));

        let mut bvh = two_leaf_bvh();
        bvh.nodes[0].set_child(3, &Aabb::new(Vec3A::ZERO, Vec3A::ONE), NodeRef::inner(7).unwrap());
        assert!(matches!(
            bvh.validate(),
            Err(Bvh4Error::NodeOutOfRange { node: 0, slot: 3, child: 7, .. })
        ));

        let mut bvh = two_leaf_bvh();
        let small = Aabb::new(Vec3A::ZERO, vec3a(1.0, 1.0, 1.5));
        bvh.nodes[0].set_child(2, &small, NodeRef::leaf(1, 1).unwrap());
        assert_eq!(
            bvh.validate(),
            Err(Bvh4Error::ChildNotEnclosed { node: 0, slot: 2 })
        );
    }

    #[test]
    fn test_validate_cycle() {
        let mut bvh = two_leaf_bvh();
        let bounds = Aabb::new(Vec3A::ZERO, Vec3A::splat(2.0));
        bvh.nodes[0].set_child(3, &bounds, NodeRef::inner(0).unwrap());
        assert_eq!(bvh.validate(), Err(Bvh4Error::NodeRevisited(0)));
    }

    #[test]
    fn test_validate_depth() {
        // A chain of single child nodes one level deeper than supported.
        let prim = tri_at(0.0, 0);
        let aabb = prim.aabb();
        let depth = MAX_DEPTH + 1;
        let mut nodes = vec![Bvh4Node::EMPTY; depth];
        for (i, node) in nodes.iter_mut().enumerate() {
            let child = if i + 1 < depth {
                NodeRef::inner(i as u32 + 1).unwrap()
            } else {
                NodeRef::leaf(0, 1).unwrap()
            };
            node.set_child(0, &aabb, child);
        }
        let bvh = Bvh4::new(nodes, vec![prim], NodeRef::inner(0).unwrap());
        assert_eq!(
            bvh.validate(),
            Err(Bvh4Error::TooDeep {
                depth: MAX_DEPTH as u32 + 1,
                max_depth: MAX_DEPTH as u32
            })
        );

        let mut shallow = bvh.clone();
        shallow.root = NodeRef::inner(1).unwrap();
        assert_eq!(shallow.validate().unwrap().max_depth, MAX_DEPTH as u32);
    }

    #[test]
    fn test_leaf_primitives() {
        let bvh = two_leaf_bvh();
        assert_eq!(bvh.leaf_primitives(NodeRef::leaf(1, 1).unwrap()).unwrap()[0].prim_id, 1);
        assert!(bvh.leaf_primitives(NodeRef::EMPTY).is_none());
        assert!(bvh.leaf_primitives(bvh.root).is_none());
    }
}
