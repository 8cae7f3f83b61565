//! Shared synth state: phase accumulator plus amplitude and frequency
//! controls.

use super::control::ControlObject;
use super::event::Param;

/// Per-sample synth state advanced by the generic sample loop.
///
/// Each advance ticks the control object at the synth's running sample
/// counter, then steps the phase accumulator by `frequency / sample_rate`
/// and wraps it into 0...1.
pub struct SynthCore {
    ctrl: ControlObject,
    phase: f64,
    counter: u64,
}

/// Parameter values in effect for one sample.
#[derive(Clone, Copy, Debug)]
pub struct SynthFrame {
    pub phase: f64,
    pub amplitude: f32,
    pub frequency: f32,
}

impl SynthCore {
    pub fn new(frequency: f32, amplitude: f32, phase: f64) -> Self {
        SynthCore {
            ctrl: ControlObject::new(&[(Param::Frequency, frequency), (Param::Amplitude, amplitude)]),
            phase: phase - phase.floor(),
            counter: 0,
        }
    }

    #[inline]
    pub fn control(&mut self) -> &mut ControlObject {
        &mut self.ctrl
    }

    /// Current normalized phase in 0...1.
    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Force the phase accumulator. Used by hard sync.
    #[inline]
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase - phase.floor();
    }

    /// Number of samples advanced so far, including look-ahead.
    #[inline]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Advance one sample and return the frame of parameter values.
    #[inline]
    pub fn advance(&mut self, delta_time: f64) -> SynthFrame {
        self.ctrl.tick(self.counter);
        self.counter += 1;
        let frequency = self.ctrl.value(Param::Frequency);
        let amplitude = self.ctrl.value(Param::Amplitude);
        self.phase += frequency as f64 * delta_time;
        self.phase -= self.phase.floor();
        SynthFrame {
            phase: self.phase,
            amplitude,
            frequency,
        }
    }

    /// Drain pending trigger events from the control object.
    pub fn take_triggers(&mut self) -> Vec<(Param, u64)> {
        self.ctrl.take_triggers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::RampShape;

    #[test]
    fn test_phase_stays_normalized() {
        let mut core = SynthCore::new(10_000.0, 1.0, 0.9);
        let dt = 1.0 / 44_100.0;
        for _ in 0..10_000 {
            let frame = core.advance(dt);
            assert!(frame.phase >= 0.0 && frame.phase < 1.0);
        }
    }

    #[test]
    fn test_frequency_event_changes_rate() {
        let mut core = SynthCore::new(0.0, 1.0, 0.0);
        core.control()
            .add_event(5, Param::Frequency, 44_100.0 / 4.0, 0, RampShape::Instant)
            .unwrap();
        let dt = 1.0 / 44_100.0;
        for _ in 0..5 {
            assert_eq!(core.advance(dt).frequency, 0.0);
        }
        // From sample 5 on, each step advances a quarter period.
        let frame = core.advance(dt);
        assert_eq!(frame.frequency, 44_100.0 / 4.0);
        assert!((frame.phase - 0.25).abs() < 1e-9);
    }
}
