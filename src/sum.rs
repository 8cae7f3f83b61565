//! Summing mix nodes.

use super::audionode::{
    input_reaches, node_reaches, zero_block, AudioObject, BlockId, BlockMemo, NodeRc, NodeTag,
    NodeWeak,
};
use super::buffer::Buffer;
use super::sample::Sample;
use super::Error;
use std::rc::Rc;

/// Owning mix node: sums any number of shared inputs.
///
/// `add_input` is an idempotent insert, `remove_input` removes the first
/// match. Saturation of the mixed signal is deferred to the final encoder.
pub struct AudioSum {
    inputs: Vec<NodeRc>,
    scratch: Buffer,
    memo: BlockMemo,
    tag: NodeTag,
}

impl Default for AudioSum {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSum {
    pub fn new() -> Self {
        AudioSum {
            inputs: Vec::new(),
            scratch: Buffer::new(),
            memo: BlockMemo::new(),
            tag: NodeTag::next(),
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }
}

impl AudioObject for AudioSum {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, block: BlockId) {
        if bufs.is_empty() {
            return;
        }
        if self.memo.replay(block, bufs) {
            return;
        }
        zero_block(bufs);
        let channels = bufs.len();
        let len = bufs[0].len();
        for input in &self.inputs {
            let scratch = self.scratch.get_mut(channels, len);
            input.borrow_mut().get_samples(scratch, sample_rate, block);
            for channel in 0..channels {
                for i in 0..len {
                    bufs[channel][i] += scratch[channel][i];
                }
            }
        }
        self.memo.store(block, bufs);
    }

    fn channels(&self) -> usize {
        self.inputs
            .iter()
            .map(|input| input.borrow().channels())
            .max()
            .unwrap_or(1)
    }

    fn tag(&self) -> NodeTag {
        self.tag
    }

    fn reaches(&self, target: NodeTag) -> bool {
        self.tag == target || self.inputs.iter().any(|input| node_reaches(input, target))
    }

    fn add_input(&mut self, input: NodeRc) -> Result<(), Error> {
        input_reaches(&input, self.tag)?;
        if self.inputs.iter().any(|node| Rc::ptr_eq(node, &input)) {
            return Ok(());
        }
        self.inputs.push(input);
        Ok(())
    }

    fn remove_input(&mut self, input: &NodeRc) -> bool {
        if let Some(position) = self.inputs.iter().position(|node| Rc::ptr_eq(node, input)) {
            self.inputs.remove(position);
            true
        } else {
            false
        }
    }

    fn collect_faults(&mut self, out: &mut Vec<String>) {
        for input in &self.inputs {
            input.borrow_mut().collect_faults(out);
        }
    }
}

/// Non-owning mix node used for composition roots.
///
/// Inputs are weak back-references that never extend a node's lifetime;
/// dropped inputs fall silent and are pruned on the next block.
pub struct BasicAudioSum {
    inputs: Vec<NodeWeak>,
    scratch: Buffer,
    memo: BlockMemo,
    tag: NodeTag,
}

impl Default for BasicAudioSum {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicAudioSum {
    pub fn new() -> Self {
        BasicAudioSum {
            inputs: Vec::new(),
            scratch: Buffer::new(),
            memo: BlockMemo::new(),
            tag: NodeTag::next(),
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }
}

impl AudioObject for BasicAudioSum {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, block: BlockId) {
        if bufs.is_empty() {
            return;
        }
        if self.memo.replay(block, bufs) {
            return;
        }
        zero_block(bufs);
        let channels = bufs.len();
        let len = bufs[0].len();
        self.inputs.retain(|input| input.strong_count() > 0);
        for input in &self.inputs {
            let Some(input) = input.upgrade() else {
                continue;
            };
            let scratch = self.scratch.get_mut(channels, len);
            input.borrow_mut().get_samples(scratch, sample_rate, block);
            for channel in 0..channels {
                for i in 0..len {
                    bufs[channel][i] += scratch[channel][i];
                }
            }
        }
        self.memo.store(block, bufs);
    }

    fn channels(&self) -> usize {
        self.inputs
            .iter()
            .filter_map(|input| input.upgrade())
            .map(|input| input.borrow().channels())
            .max()
            .unwrap_or(1)
    }

    fn tag(&self) -> NodeTag {
        self.tag
    }

    fn reaches(&self, target: NodeTag) -> bool {
        self.tag == target
            || self
                .inputs
                .iter()
                .filter_map(|input| input.upgrade())
                .any(|input| node_reaches(&input, target))
    }

    fn add_input(&mut self, input: NodeRc) -> Result<(), Error> {
        input_reaches(&input, self.tag)?;
        if self
            .inputs
            .iter()
            .filter_map(|node| node.upgrade())
            .any(|node| Rc::ptr_eq(&node, &input))
        {
            return Ok(());
        }
        self.inputs.push(Rc::downgrade(&input));
        Ok(())
    }

    fn remove_input(&mut self, input: &NodeRc) -> bool {
        if let Some(position) = self.inputs.iter().position(|node| {
            node.upgrade()
                .map(|node| Rc::ptr_eq(&node, input))
                .unwrap_or(false)
        }) {
            self.inputs.remove(position);
            true
        } else {
            false
        }
    }

    fn collect_faults(&mut self, out: &mut Vec<String>) {
        for input in &self.inputs {
            if let Some(input) = input.upgrade() {
                input.borrow_mut().collect_faults(out);
            }
        }
    }
}
