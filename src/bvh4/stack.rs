//! Fixed capacity traversal stacks, stored inline so a traversal never allocates.

use glam::Vec4;

use crate::{bvh4::node::NodeRef, mask::Mask16, mask::Mask4};

/// Operations the shared descent loop needs from a stack.
pub trait TraversalStack {
    /// Drops everything and pushes the bottom sentinel followed by `root`.
    fn reset(&mut self, root: NodeRef);
    /// Removes and returns the top entry. Must not be called on an empty stack.
    fn pop(&mut self) -> NodeRef;
    /// Puts back the entry returned by the last `pop`.
    fn unpop(&mut self);
    fn push(&mut self, node: NodeRef, near: f32);
    /// Pushes the selected lanes of `nodes`, lowest lane first.
    fn push_masked(&mut self, mask: Mask4, nodes: &[NodeRef; 4], near: &[f32; 4]);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of entries the compaction pass looks at per step.
const COMPACT_CHUNK: usize = 16;

/// Stack of node references with the entry distance each was pushed with. Slot 0 always holds
/// [`NodeRef::EMPTY`] at distance `f32::INFINITY`, popping it ends the traversal.
#[derive(Clone)]
pub struct NearStack<const N: usize> {
    nodes: [NodeRef; N],
    dists: [f32; N],
    len: usize,
}

impl<const N: usize> Default for NearStack<N> {
    fn default() -> Self {
        Self {
            nodes: [NodeRef::EMPTY; N],
            dists: [f32::INFINITY; N],
            len: 0,
        }
    }
}

impl<const N: usize> NearStack<N> {
    #[inline(always)]
    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes[..self.len]
    }

    #[inline(always)]
    pub fn dists(&self) -> &[f32] {
        &self.dists[..self.len]
    }

    /// Removes entries whose distance is greater than `far`, keeping the order of the rest.
    /// The bottom sentinel and the top entry are always kept. Does nothing with fewer than 2 entries.
    pub fn compact(&mut self, far: f32) {
        let len = self.len;
        if len < 2 {
            return;
        }
        let top = len - 1;
        let far4 = Vec4::splat(far);
        let mut written = 0;
        let mut base = 0;
        while base < len {
            let n = (len - base).min(COMPACT_CHUNK);
            let mut nodes = [NodeRef::EMPTY; COMPACT_CHUNK];
            let mut dists = [f32::INFINITY; COMPACT_CHUNK];
            nodes[..n].copy_from_slice(&self.nodes[base..base + n]);
            dists[..n].copy_from_slice(&self.dists[base..base + n]);

            let quad = |i: usize| Vec4::from_slice(&dists[i * 4..i * 4 + 4]).cmple(far4).bitmask();
            let mut keep =
                Mask16::from_quads([quad(0), quad(1), quad(2), quad(3)]) & Mask16::first_n(n);
            if base == 0 {
                keep.set(0);
            }
            if top - base < COMPACT_CHUNK {
                keep.set(top - base);
            }

            // written <= base, so this never overwrites entries of a later chunk.
            keep.compress(&nodes, &mut self.nodes[written..]);
            written += keep.compress(&dists, &mut self.dists[written..]);
            base += COMPACT_CHUNK;
        }
        self.len = written;
    }
}

impl<const N: usize> TraversalStack for NearStack<N> {
    #[inline(always)]
    fn reset(&mut self, root: NodeRef) {
        self.nodes[0] = NodeRef::EMPTY;
        self.dists[0] = f32::INFINITY;
        self.nodes[1] = root;
        self.dists[1] = f32::NEG_INFINITY;
        self.len = 2;
    }

    #[inline(always)]
    fn pop(&mut self) -> NodeRef {
        debug_assert!(self.len > 0, "pop on an empty traversal stack");
        self.len -= 1;
        self.nodes[self.len]
    }

    #[inline(always)]
    fn unpop(&mut self) {
        debug_assert!(self.len < N);
        self.len += 1;
    }

    #[inline(always)]
    fn push(&mut self, node: NodeRef, near: f32) {
        debug_assert!(self.len < N, "traversal stack overflow, the BVH is too deep");
        self.nodes[self.len] = node;
        self.dists[self.len] = near;
        self.len += 1;
    }

    #[inline(always)]
    fn push_masked(&mut self, mask: Mask4, nodes: &[NodeRef; 4], near: &[f32; 4]) {
        debug_assert!(self.len + mask.count() as usize <= N);
        mask.compress(nodes, &mut self.nodes[self.len..]);
        self.len += mask.compress(near, &mut self.dists[self.len..]);
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.len
    }
}

/// Stack of node references without distances, used by the occlusion query.
#[derive(Clone)]
pub struct NodeStack<const N: usize> {
    nodes: [NodeRef; N],
    len: usize,
}

impl<const N: usize> Default for NodeStack<N> {
    fn default() -> Self {
        Self {
            nodes: [NodeRef::EMPTY; N],
            len: 0,
        }
    }
}

impl<const N: usize> NodeStack<N> {
    #[inline(always)]
    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes[..self.len]
    }
}

impl<const N: usize> TraversalStack for NodeStack<N> {
    #[inline(always)]
    fn reset(&mut self, root: NodeRef) {
        self.nodes[0] = NodeRef::EMPTY;
        self.nodes[1] = root;
        self.len = 2;
    }

    #[inline(always)]
    fn pop(&mut self) -> NodeRef {
        debug_assert!(self.len > 0, "pop on an empty traversal stack");
        self.len -= 1;
        self.nodes[self.len]
    }

    #[inline(always)]
    fn unpop(&mut self) {
        debug_assert!(self.len < N);
        self.len += 1;
    }

    #[inline(always)]
    fn push(&mut self, node: NodeRef, _near: f32) {
        debug_assert!(self.len < N, "traversal stack overflow, the BVH is too deep");
        self.nodes[self.len] = node;
        self.len += 1;
    }

    #[inline(always)]
    fn push_masked(&mut self, mask: Mask4, nodes: &[NodeRef; 4], _near: &[f32; 4]) {
        debug_assert!(self.len + mask.count() as usize <= N);
        self.len += mask.compress(nodes, &mut self.nodes[self.len..]);
    }

    #[inline(always)]
    fn len(&self) -> usize {
        self.len
    }
}
