//! One-pole lowpass effect with a scheduled cutoff.

use super::audionode::{input_reaches, AudioObject, BlockId, BlockMemo, NodeRc, NodeTag};
use super::buffer::Buffer;
use super::control::ControlObject;
use super::event::Param;
use super::sample::Sample;
use super::sum::AudioSum;
use super::Error;

/// One-pole lowpass over the mix of its inputs. Cutoff in Hz is a
/// scheduled parameter.
pub struct Lowpole {
    inputs: AudioSum,
    ctrl: ControlObject,
    counter: u64,
    state: f32,
    scratch: Buffer,
    memo: BlockMemo,
    tag: NodeTag,
}

impl Lowpole {
    pub fn new(cutoff: f32) -> Self {
        Lowpole {
            inputs: AudioSum::new(),
            ctrl: ControlObject::new(&[(Param::Cutoff, cutoff)]),
            counter: 0,
            state: 0.0,
            scratch: Buffer::new(),
            memo: BlockMemo::new(),
            tag: NodeTag::next(),
        }
    }
}

impl AudioObject for Lowpole {
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
        let delta_time = 1.0 / sample_rate as f32;
        for i in 0..len {
            self.ctrl.tick(self.counter + i as u64);
            let cutoff = self.ctrl.value(Param::Cutoff).max(0.0);
            let coeff = 1.0 - (-core::f32::consts::TAU * cutoff * delta_time).exp();
            self.state += coeff * (scratch[0][i].as_float32() - self.state);
            bufs[0][i] = Sample::new(self.state);
        }
        let (first, rest) = bufs.split_at_mut(1);
        for channel in rest.iter_mut() {
            channel.copy_from_slice(&first[0]);
        }
        self.counter += len as u64;
        self.memo.store(block, bufs);
    }

    fn channels(&self) -> usize {
        1
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
