//! The pull-based audio object graph.
//!
//! Audio objects produce blocks of samples on demand. Nodes are shared
//! through reference-counted handles so a producer may feed several
//! consumers; a per-block request id lets a node that is pulled along more
//! than one edge within a single block replay its cached output instead of
//! advancing its state again.

use super::control::ControlObject;
use super::sample::Sample;
use super::Error;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to a node in the audio graph.
pub type NodeRc = Rc<RefCell<dyn AudioObject>>;

/// Non-owning handle used by back-references.
pub type NodeWeak = Weak<RefCell<dyn AudioObject>>;

static NEXT_BLOCK: AtomicU64 = AtomicU64::new(1);
static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

/// Identifies one block pull. Globally unique per block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockId(u64);

impl BlockId {
    /// Allocate a fresh block id.
    pub fn next() -> BlockId {
        BlockId(NEXT_BLOCK.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a node, used for cycle detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeTag(u64);

impl NodeTag {
    pub fn next() -> NodeTag {
        NodeTag(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node of the audio graph.
///
/// `get_samples` must write every element of every channel buffer and must
/// not fail: on an internal fault the node zeroes the block and latches a
/// one-shot diagnostic instead. Channel count mismatches are resolved by
/// broadcasting channel 0.
pub trait AudioObject {
    /// Produce the next `bufs[0].len()` samples into the channel buffers.
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, block: BlockId);

    /// Natural channel count of this node.
    fn channels(&self) -> usize {
        1
    }

    /// Identity for reachability checks.
    fn tag(&self) -> NodeTag;

    /// Whether `target` is this node or reachable through its inputs.
    /// An input that is currently mutably borrowed is the node being
    /// connected to, which also means a cycle.
    fn reaches(&self, target: NodeTag) -> bool {
        self.tag() == target
    }

    /// The node's control object, when it has schedulable parameters.
    fn control(&mut self) -> Option<&mut ControlObject> {
        None
    }

    /// Attach an input. Fails with [`Error::CyclicGraph`] when the input
    /// already reaches this node, or [`Error::InvalidNode`] when the node
    /// accepts no inputs.
    fn add_input(&mut self, _input: NodeRc) -> Result<(), Error> {
        Err(Error::InvalidNode)
    }

    /// Detach the first matching input. Returns whether one was removed.
    fn remove_input(&mut self, _input: &NodeRc) -> bool {
        false
    }

    /// Move latched diagnostics (this node's and its inputs') into `out`.
    fn collect_faults(&mut self, _out: &mut Vec<String>) {}
}

/// Guard for the cycle check performed by `add_input` implementations.
pub(crate) fn input_reaches(input: &NodeRc, tag: NodeTag) -> Result<(), Error> {
    match input.try_borrow() {
        // A borrow failure means `input` is the node currently being
        // mutated, i.e. a direct self-edge.
        Err(_) => Err(Error::CyclicGraph),
        Ok(node) => {
            if node.reaches(tag) {
                Err(Error::CyclicGraph)
            } else {
                Ok(())
            }
        }
    }
}

/// Reachability step through a shared input handle.
pub(crate) fn node_reaches(input: &NodeRc, target: NodeTag) -> bool {
    match input.try_borrow() {
        // The mutably borrowed node is the one the traversal started from.
        Err(_) => true,
        Ok(node) => node.reaches(target),
    }
}

/// Per-node cache of the output produced for one block id.
///
/// A node pulled twice with the same id replays the cached block so its
/// state advances exactly once per block.
pub struct BlockMemo {
    block: Option<BlockId>,
    data: Vec<Vec<Sample>>,
}

impl Default for BlockMemo {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockMemo {
    pub fn new() -> Self {
        BlockMemo {
            block: None,
            data: Vec::new(),
        }
    }

    /// Copy the cached output into `bufs` if `block` matches the stored id.
    pub fn replay(&self, block: BlockId, bufs: &mut [&mut [Sample]]) -> bool {
        if self.block != Some(block) || self.data.is_empty() {
            return false;
        }
        for (channel, buf) in bufs.iter_mut().enumerate() {
            let source = if channel < self.data.len() {
                &self.data[channel]
            } else {
                &self.data[0]
            };
            for (i, sample) in buf.iter_mut().enumerate() {
                *sample = if i < source.len() {
                    source[i]
                } else {
                    Sample::ZERO
                };
            }
        }
        true
    }

    /// Record the output just produced for `block`.
    pub fn store(&mut self, block: BlockId, bufs: &[&mut [Sample]]) {
        self.block = Some(block);
        self.data.truncate(bufs.len());
        while self.data.len() < bufs.len() {
            self.data.push(Vec::new());
        }
        for (channel, buf) in bufs.iter().enumerate() {
            self.data[channel].clear();
            self.data[channel].extend_from_slice(buf);
        }
    }
}

/// Zero every element of every channel buffer.
pub(crate) fn zero_block(bufs: &mut [&mut [Sample]]) {
    for buf in bufs.iter_mut() {
        for sample in buf.iter_mut() {
            *sample = Sample::ZERO;
        }
    }
}
