use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3A, Vec4};

use crate::{aabb::Aabb, error::Bvh4Error, mask::Mask4, ray::Ray};

/// Packed child reference. repr(transparent) u32.
///
/// - `u32::MAX`: empty, no node. Also the stack-empty sentinel.
/// - high bit clear: inner node, the low 31 bits index `Bvh4::nodes`.
/// - high bit set: leaf, bits 2..31 hold the offset into `Bvh4::primitives` and bits 0..2 hold the number of
///   primitives minus one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct NodeRef(pub u32);

/// Unpacked form of a [`NodeRef`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Inner(u32),
    Leaf { offset: u32, count: u32 },
    Empty,
}

const LEAF_BIT: u32 = 1 << 31;
const COUNT_BITS: u32 = 0b11;

impl NodeRef {
    pub const EMPTY: Self = Self(u32::MAX);
    /// Largest leaf offset. One less than what the bits could hold, so a leaf can never alias `EMPTY`.
    pub const MAX_LEAF_OFFSET: u32 = (1 << 29) - 2;
    pub const MAX_NODE_INDEX: u32 = LEAF_BIT - 1;
    /// Most primitives a leaf can reference.
    pub const MAX_LEAF_COUNT: u32 = 4;

    #[inline(always)]
    pub fn inner(index: u32) -> Result<Self, Bvh4Error> {
        if index > Self::MAX_NODE_INDEX {
            return Err(Bvh4Error::NodeIndex(index));
        }
        Ok(Self(index))
    }

    #[inline(always)]
    pub fn leaf(offset: u32, count: u32) -> Result<Self, Bvh4Error> {
        if count == 0 || count > Self::MAX_LEAF_COUNT {
            return Err(Bvh4Error::LeafCount(count));
        }
        if offset > Self::MAX_LEAF_OFFSET {
            return Err(Bvh4Error::LeafOffset(offset));
        }
        Ok(Self(LEAF_BIT | offset << 2 | (count - 1)))
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }

    /// True for leaves and for `EMPTY`, which shares the leaf bit.
    #[inline(always)]
    pub fn is_leaf(self) -> bool {
        self.0 & LEAF_BIT != 0
    }

    #[inline(always)]
    pub fn inner_index(self) -> Option<u32> {
        (!self.is_leaf()).then_some(self.0)
    }

    /// Offset and primitive count of a leaf.
    #[inline(always)]
    pub fn leaf_range(self) -> Option<(u32, u32)> {
        if self.is_leaf() && !self.is_empty() {
            Some(((self.0 & !LEAF_BIT) >> 2, (self.0 & COUNT_BITS) + 1))
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn kind(self) -> NodeKind {
        if self.is_empty() {
            NodeKind::Empty
        } else if let Some((offset, count)) = self.leaf_range() {
            NodeKind::Leaf { offset, count }
        } else {
            NodeKind::Inner(self.0)
        }
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            NodeKind::Inner(index) => write!(f, "Inner({index})"),
            NodeKind::Leaf { offset, count } => write!(f, "Leaf({offset}, {count})"),
            NodeKind::Empty => write!(f, "Empty"),
        }
    }
}

impl From<NodeRef> for NodeKind {
    fn from(node: NodeRef) -> Self {
        node.kind()
    }
}

impl TryFrom<NodeKind> for NodeRef {
    type Error = Bvh4Error;

    fn try_from(kind: NodeKind) -> Result<Self, Bvh4Error> {
        match kind {
            NodeKind::Inner(index) => NodeRef::inner(index),
            NodeKind::Leaf { offset, count } => NodeRef::leaf(offset, count),
            NodeKind::Empty => Ok(NodeRef::EMPTY),
        }
    }
}

/// Minimum corner of a child box. The fourth lane carries the child reference, so one 16 byte load gets both.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ChildLower {
    pub min: [f32; 3],
    pub child: NodeRef,
}

/// Maximum corner of a child box.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ChildUpper {
    pub max: [f32; 3],
    pub _pad: u32,
}

/// A BVH4 inner node. repr(C), Pod, 128 bytes.
///
/// `lower` holds the 4 minimum corners (plus references) back to back and `upper` the 4 maximum corners, so
/// each half of the node is one 64 byte load. Empty slots have [`Aabb::EMPTY`] bounds and an
/// [`NodeRef::EMPTY`] reference.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C, align(64))]
pub struct Bvh4Node {
    pub lower: [ChildLower; 4],
    pub upper: [ChildUpper; 4],
}

/// Result of intersecting one ray with the 4 children of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxHits {
    /// Children whose box overlaps the ray interval.
    pub mask: Mask4,
    /// Entry distance per child, clamped to `tmin`. `f32::INFINITY` for children that were missed.
    pub near: [f32; 4],
}

impl BoxHits {
    /// Index of the hit child with the smallest entry distance, lowest index on ties.
    /// Must only be called with at least one hit.
    #[inline(always)]
    pub fn nearest(&self) -> usize {
        debug_assert!(self.mask.any());
        let near = Vec4::from_array(std::array::from_fn(|i| {
            if self.mask.test(i) {
                self.near[i]
            } else {
                f32::INFINITY
            }
        }));
        let min = near.min_element();
        let closest = Mask4::from_bits(near.cmpeq(Vec4::splat(min)).bitmask()) & self.mask;
        closest.first().unwrap_or(0)
    }
}

impl Bvh4Node {
    /// A node with all 4 slots empty.
    pub const EMPTY: Self = Self {
        lower: [ChildLower {
            min: [f32::INFINITY; 3],
            child: NodeRef::EMPTY,
        }; 4],
        upper: [ChildUpper {
            max: [f32::NEG_INFINITY; 3],
            _pad: 0,
        }; 4],
    };

    #[inline(always)]
    pub fn set_child(&mut self, slot: usize, aabb: &Aabb, child: NodeRef) {
        self.lower[slot] = ChildLower {
            min: aabb.min.into(),
            child,
        };
        self.upper[slot] = ChildUpper {
            max: aabb.max.into(),
            _pad: 0,
        };
    }

    #[inline(always)]
    pub fn child(&self, slot: usize) -> NodeRef {
        self.lower[slot].child
    }

    #[inline(always)]
    pub fn children(&self) -> [NodeRef; 4] {
        [
            self.lower[0].child,
            self.lower[1].child,
            self.lower[2].child,
            self.lower[3].child,
        ]
    }

    #[inline(always)]
    pub fn child_aabb(&self, slot: usize) -> Aabb {
        Aabb::new(
            Vec3A::from(self.lower[slot].min),
            Vec3A::from(self.upper[slot].max),
        )
    }

    /// Number of non-empty slots.
    pub fn child_count(&self) -> usize {
        self.lower.iter().filter(|c| !c.child.is_empty()).count()
    }

    /// Slab test of the ray against all 4 children, clipped to `[ray.tmin, ray.tmax]`.
    #[inline(always)]
    pub fn intersect_ray(&self, ray: &Ray) -> BoxHits {
        #[cfg(all(
            any(target_arch = "x86", target_arch = "x86_64"),
            target_feature = "sse2"
        ))]
        {
            self.intersect_ray_simd(ray)
        }

        #[cfg(not(all(
            any(target_arch = "x86", target_arch = "x86_64"),
            target_feature = "sse2"
        )))]
        {
            self.intersect_ray_basic(ray)
        }
    }

    /// Tests one child at a time, vectorized only across the 3 axes. Exists for reference & compatibility.
    #[inline(always)]
    pub fn intersect_ray_basic(&self, ray: &Ray) -> BoxHits {
        let mut hits = BoxHits {
            mask: Mask4::NONE,
            near: [f32::INFINITY; 4],
        };
        for slot in 0..4 {
            if let Some((near, _far)) = self.child_aabb(slot).intersect_ray(ray) {
                hits.mask.set(slot);
                hits.near[slot] = near;
            }
        }
        hits
    }
}
