//! Errors reported when encoding node references or validating a [`crate::bvh4::Bvh4`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bvh4Error {
    #[error("leaf primitive count {0} is outside 1..=4")]
    LeafCount(u32),
    #[error("leaf offset {0} does not fit the packed reference")]
    LeafOffset(u32),
    #[error("inner node index {0} does not fit the packed reference")]
    NodeIndex(u32),
    #[error("node {node} child {slot} references node {child}, but there are only {node_count} nodes")]
    NodeOutOfRange {
        node: u32,
        slot: usize,
        child: u32,
        node_count: usize,
    },
    #[error("leaf [{offset}, {offset}+{count}) is outside the {primitive_count} primitives")]
    LeafOutOfRange {
        offset: u32,
        count: u32,
        primitive_count: usize,
    },
    #[error("node {0} is reachable more than once")]
    NodeRevisited(u32),
    #[error("depth {depth} exceeds the traversal limit of {max_depth}")]
    TooDeep { depth: u32, max_depth: u32 },
    #[error("node {node} child {slot} has empty bounds but a child reference")]
    EmptyChildBounds { node: u32, slot: usize },
    #[error("node {node} child {slot} is empty but has non-empty bounds")]
    EmptySlotBounds { node: u32, slot: usize },
    #[error("node {node} child {slot} does not enclose its contents")]
    ChildNotEnclosed { node: u32, slot: usize },
}
