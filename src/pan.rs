//! Per-voice equal power panning.

use super::audionode::{input_reaches, AudioObject, BlockId, BlockMemo, NodeRc, NodeTag};
use super::buffer::Buffer;
use super::control::ControlObject;
use super::event::Param;
use super::math::clamp11;
use super::sample::Sample;
use super::sum::AudioSum;
use super::Error;

/// Equal power pan weights for a pan value in -1...1.
#[inline]
pub fn pan_weights(value: f32) -> (f32, f32) {
    let angle = (clamp11(value) + 1.0) * (core::f32::consts::PI * 0.25);
    (angle.cos(), angle.sin())
}

/// Mono-to-stereo equal power panner with a scheduled pan parameter.
///
/// Inputs are mixed by an internal sum; channel 0 of the mix feeds both
/// outputs. Pan -1 is full left, +1 full right.
pub struct Panner {
    inputs: AudioSum,
    ctrl: ControlObject,
    counter: u64,
    scratch: Buffer,
    memo: BlockMemo,
    tag: NodeTag,
}

impl Panner {
    pub fn new(pan: f32) -> Self {
        Panner {
            inputs: AudioSum::new(),
            ctrl: ControlObject::new(&[(Param::Pan, pan)]),
            counter: 0,
            scratch: Buffer::new(),
            memo: BlockMemo::new(),
            tag: NodeTag::next(),
        }
    }
}

impl AudioObject for Panner {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, block: BlockId) {
        if bufs.is_empty() {
            return;
        }
        if self.memo.replay(block, bufs) {
            return;
        }
        let len = bufs[0].len();
        let scratch = self.scratch.get_mut(1, len);
        self.inputs.get_samples(scratch, sample_rate, block);
        for i in 0..len {
            self.ctrl.tick(self.counter + i as u64);
            let (left_weight, right_weight) = pan_weights(self.ctrl.value(Param::Pan));
            let x = scratch[0][i];
            if bufs.len() == 1 {
                bufs[0][i] = x;
            } else {
                bufs[0][i] = x * left_weight;
                bufs[1][i] = x * right_weight;
            }
        }
        // Channels past the stereo pair broadcast the left output.
        if bufs.len() > 2 {
            let (first, rest) = bufs.split_at_mut(1);
            for channel in rest.iter_mut().skip(1) {
                channel.copy_from_slice(&first[0]);
            }
        }
        self.counter += len as u64;
        self.memo.store(block, bufs);
    }

    fn channels(&self) -> usize {
        2
    }

    fn tag(&self) -> NodeTag {
        self.tag
    }

    fn reaches(&self, target: NodeTag) -> bool {
        self.tag == target || self.inputs.reaches(target)
    }

    fn control(&mut self) -> Option<&mut ControlObject> {
        Some(&mut self.ctrl)
    }

    fn add_input(&mut self, input: NodeRc) -> Result<(), Error> {
        input_reaches(&input, self.tag)?;
        self.inputs.add_input(input)
    }

    fn remove_input(&mut self, input: &NodeRc) -> bool {
        self.inputs.remove_input(input)
    }

    fn collect_faults(&mut self, out: &mut Vec<String>) {
        self.inputs.collect_faults(out);
    }
}
