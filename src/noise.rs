//! Pink-filtered noise synth.

use super::audionode::{AudioObject, BlockId, BlockMemo, NodeTag};
use super::control::ControlObject;
use super::sample::Sample;
use super::synth::SynthCore;
use funutd::Rnd;
use std::sync::atomic::{AtomicU64, Ordering};

static NOISE_SEED: AtomicU64 = AtomicU64::new(0x243F_6A88_85A3_08D3);

/// Draw the next generator seed from the process-global seed source.
pub fn next_seed() -> u64 {
    NOISE_SEED.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed)
}

/// Reset the process-global seed source.
pub fn set_global_seed(seed: u64) {
    NOISE_SEED.store(seed, Ordering::Relaxed);
}

/** The -3 dB/8ve "pinking" filter below has a bass boost of a few dB under
 *  100 Hz and is cheap because a zero at the complex origin removes the
 *  third feedforward term:
 *  Poles:  1-(1/6)^3, 1-(3/6)^3, 1-(5/6)^3
 *  Zeroes: 1-(2/6)^3, 1-(4/6)^3, 1-(6/6)^3
 */
const AMP_NORM: f32 = 6.0;
const A1: f32 = -2.291_666_6;
const A2: f32 = 1.658_929_2;
const A3: f32 = -0.366_927_62;
const B0: f32 = 0.030_517_578 * AMP_NORM;
const B1: f32 = -0.050_862_63 * AMP_NORM;
const B2: f32 = 0.020_679_95 * AMP_NORM;

/// Pink noise generator with a scheduled amplitude.
pub struct Noise {
    core: SynthCore,
    rnd: Rnd,
    z1: f32,
    z2: f32,
    z3: f32,
    memo: BlockMemo,
    tag: NodeTag,
}

impl Noise {
    /// Create a noise synth seeded from the global seed source.
    pub fn new(amplitude: f32) -> Self {
        Noise::with_seed(amplitude, next_seed())
    }

    /// Create a noise synth with an explicit seed, for reproducible output.
    pub fn with_seed(amplitude: f32, seed: u64) -> Self {
        Noise {
            core: SynthCore::new(1000.0, amplitude, 0.0),
            rnd: Rnd::from_u64(seed),
            z1: 0.0,
            z2: 0.0,
            z3: 0.0,
            memo: BlockMemo::new(),
            tag: NodeTag::next(),
        }
    }
}

impl AudioObject for Noise {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, block: BlockId) {
        if bufs.is_empty() {
            return;
        }
        if self.memo.replay(block, bufs) {
            return;
        }
        let delta_time = 1.0 / sample_rate as f64;
        let len = bufs[0].len();
        for i in 0..len {
            let frame = self.core.advance(delta_time);
            let white = frame.amplitude * self.rnd.f32_in(-1.0, 1.0);
            let mid = white - A1 * self.z1 - A2 * self.z2 - A3 * self.z3;
            let pink = B0 * mid + B1 * self.z1 + B2 * self.z2;
            self.z3 = self.z2;
            self.z2 = self.z1;
            self.z1 = mid;
            bufs[0][i] = Sample::new(pink);
        }
        let (first, rest) = bufs.split_at_mut(1);
        for channel in rest.iter_mut() {
            channel.copy_from_slice(&first[0]);
        }
        self.memo.store(block, bufs);
    }

    fn channels(&self) -> usize {
        1
    }

    fn tag(&self) -> NodeTag {
        self.tag
    }

    fn control(&mut self) -> Option<&mut ControlObject> {
        Some(self.core.control())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(noise: &mut Noise, len: usize) -> Vec<f32> {
        let mut buf = vec![Sample::ZERO; len];
        let mut bufs: Vec<&mut [Sample]> = vec![&mut buf];
        noise.get_samples(&mut bufs, 44_100, BlockId::next());
        buf.iter().map(|s| s.as_float32()).collect()
    }

    #[test]
    fn test_deterministic_with_seed() {
        let a = render(&mut Noise::with_seed(0.5, 42), 4096);
        let b = render(&mut Noise::with_seed(0.5, 42), 4096);
        assert_eq!(a, b);
        let c = render(&mut Noise::with_seed(0.5, 43), 4096);
        assert_ne!(a, c);
    }

    #[test]
    fn test_energy_is_bounded_and_nonzero() {
        let samples = render(&mut Noise::with_seed(0.5, 7), 44_100);
        let peak = samples.iter().fold(0.0f32, |a, &s| a.max(s.abs()));
        assert!(peak > 0.01 && peak <= 1.0, "peak {}", peak);
        let rms = (samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
            / samples.len() as f64)
            .sqrt();
        assert!(rms > 0.01 && rms < 0.5, "rms {}", rms);
    }

    #[test]
    fn test_zero_amplitude_is_silent() {
        let samples = render(&mut Noise::with_seed(0.0, 1), 1024);
        assert!(samples.iter().all(|&s| s == 0.0));
    }
}
