//! Note-level envelope translation.
//!
//! An [`Enveloper`] wraps one controlled node and expands a list of notes
//! `{start, end, amp, freq}` into amplitude attack/decay/release events
//! and log-domain frequency sweeps between consecutive notes. Committed
//! events go through the wrapped node's own control object, so they obey
//! the usual activation and replacement semantics.

use super::audionode::{AudioObject, BlockId, NodeRc, NodeTag};
use super::event::Param;
use super::ramp::RampShape;
use super::sample::Sample;
use super::Error;

/// Default duration of the frequency sweep between consecutive notes,
/// in seconds.
pub const DEFAULT_SWEEP_TIME: f32 = 0.005;

/// Attack/decay/release amplitude contour.
#[derive(Clone, Copy, Debug)]
pub struct Envelope {
    /// Attack time in seconds.
    pub attack: f32,
    /// Decay time in seconds.
    pub decay: f32,
    /// Release time in seconds.
    pub release: f32,
    /// Peak level reached at the end of the attack, as a factor of the
    /// note amplitude.
    pub attack_level: f32,
    /// Held level after the decay, as a factor of the note amplitude.
    pub sustain_level: f32,
    pub attack_ramp: RampShape,
    pub decay_ramp: RampShape,
    pub release_ramp: RampShape,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            attack: 0.01,
            decay: 0.05,
            release: 0.1,
            attack_level: 1.0,
            sustain_level: 0.7,
            attack_ramp: RampShape::SCurve,
            decay_ramp: RampShape::SCurve,
            release_ramp: RampShape::SCurve,
        }
    }
}

/// One scheduled note.
#[derive(Clone, Copy, Debug)]
pub struct Note {
    pub start: u64,
    pub end: u64,
    pub amp: f32,
    pub freq: f32,
}

/// Wraps a controlled node and turns notes into parameter events.
///
/// Notes are kept sorted by start sample; adding a note at an existing
/// start replaces it. The expansion is committed lazily on the first block
/// after a change.
pub struct Enveloper {
    node: NodeRc,
    env: Envelope,
    notes: Vec<Note>,
    sweep_time: f32,
    detune: f32,
    dirty: bool,
    fault: Option<String>,
    tag: NodeTag,
}

impl Enveloper {
    pub fn new(node: NodeRc, env: Envelope) -> Self {
        Enveloper {
            node,
            env,
            notes: Vec::new(),
            sweep_time: DEFAULT_SWEEP_TIME,
            detune: 1.0,
            dirty: false,
            fault: None,
            tag: NodeTag::next(),
        }
    }

    pub fn set_envelope(&mut self, env: Envelope) {
        self.env = env;
        self.dirty = true;
    }

    /// Detune factor applied to every note frequency.
    pub fn set_detune_factor(&mut self, detune: f32) {
        self.detune = detune;
    }

    pub fn set_sweep_time(&mut self, sweep_time: f32) {
        self.sweep_time = sweep_time;
    }

    /// Longest release tail of the envelope, in seconds.
    pub fn release(&self) -> f32 {
        self.env.release
    }

    /// Schedule a note. A note starting at an already scheduled start
    /// sample replaces the earlier one.
    pub fn add_note(&mut self, start: u64, end: u64, amp: f32, freq: f32) {
        let note = Note {
            start,
            end,
            amp,
            freq: freq * self.detune,
        };
        match self.notes.binary_search_by_key(&start, |n| n.start) {
            Ok(position) => self.notes[position] = note,
            Err(position) => self.notes.insert(position, note),
        }
        self.dirty = true;
    }

    /// Expand the note list into control events on the wrapped node.
    pub fn commit(&mut self, sample_rate: u32) -> Result<(), Error> {
        if !self.dirty {
            return Ok(());
        }
        let sr = sample_rate as f32;
        let mut node = self.node.borrow_mut();
        let ctrl = node.control().ok_or(Error::InvalidNode)?;
        let env = self.env;
        let default_sweep = (DEFAULT_SWEEP_TIME * sr) as u64;
        let attack_samples = (env.attack * sr) as u64;
        let release_samples = (env.release * sr).floor() as u64;

        let Some((last, rest)) = self.notes.split_last() else {
            self.dirty = false;
            return Ok(());
        };

        for (i, note) in rest.iter().enumerate() {
            let next = &self.notes[i + 1];
            // Amplitude contour of this note.
            ctrl.add_event(
                note.start,
                Param::Amplitude,
                note.amp * env.attack_level,
                attack_samples,
                env.attack_ramp,
            )?;
            let attack_peak = note.start + attack_samples;
            if attack_peak < note.end {
                ctrl.add_event(
                    attack_peak,
                    Param::Amplitude,
                    note.amp * env.sustain_level,
                    (env.decay * sr) as u64,
                    env.decay_ramp,
                )?;
            }
            // Frequency sweep toward the next note. When the next note
            // starts inside this note's release tail, the sweep is pulled
            // back so the glide lands on time.
            let mut sweep = DEFAULT_SWEEP_TIME;
            let mut freq_start = next.start;
            if next.start >= note.end {
                ctrl.add_event(
                    note.end,
                    Param::Amplitude,
                    0.0,
                    (env.release * sr) as u64,
                    env.release_ramp,
                )?;
                if next.start < note.end + release_samples {
                    let release_sweep = (next.start - note.end) as f32 / sr;
                    if release_sweep < sweep {
                        sweep = release_sweep;
                        freq_start = note.end;
                    } else {
                        sweep = self.sweep_time;
                        freq_start = next.start - (sweep * sr).floor() as u64;
                    }
                }
            }
            ctrl.add_event(
                freq_start,
                Param::Frequency,
                next.freq,
                (sweep * sr) as u64,
                RampShape::LogScaleSCurve,
            )?;
        }

        // The first note sets the starting frequency; the last note gets
        // the full amplitude contour.
        let first = self.notes[0];
        ctrl.add_event(
            first.start,
            Param::Frequency,
            first.freq,
            default_sweep,
            RampShape::SCurve,
        )?;
        ctrl.add_event(
            last.start,
            Param::Amplitude,
            last.amp * env.attack_level,
            attack_samples,
            env.attack_ramp,
        )?;
        let attack_peak = last.start + attack_samples;
        if attack_peak < last.end {
            ctrl.add_event(
                attack_peak,
                Param::Amplitude,
                last.amp * env.sustain_level,
                (env.decay * sr) as u64,
                env.decay_ramp,
            )?;
        }
        ctrl.add_event(
            last.end,
            Param::Amplitude,
            0.0,
            (env.release * sr) as u64,
            env.release_ramp,
        )?;

        self.dirty = false;
        Ok(())
    }
}

impl AudioObject for Enveloper {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, block: BlockId) {
        if self.dirty {
            if let Err(error) = self.commit(sample_rate) {
                if self.fault.is_none() {
                    self.fault = Some(format!("enveloper: {}", error));
                }
                self.dirty = false;
            }
        }
        self.node.borrow_mut().get_samples(bufs, sample_rate, block);
    }

    fn channels(&self) -> usize {
        self.node.borrow().channels()
    }

    fn tag(&self) -> NodeTag {
        self.tag
    }

    fn reaches(&self, target: NodeTag) -> bool {
        self.tag == target || super::audionode::node_reaches(&self.node, target)
    }

    fn collect_faults(&mut self, out: &mut Vec<String>) {
        out.extend(self.fault.take());
        self.node.borrow_mut().collect_faults(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blep::Precision;
    use crate::control::ControlObject;
    use crate::infinisaw::InfiniSaw;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn wrapped_saw() -> (Enveloper, Rc<RefCell<InfiniSaw>>) {
        let saw = Rc::new(RefCell::new(InfiniSaw::saw(
            100.0,
            0.0,
            0.0,
            Precision::default(),
        )));
        let node: NodeRc = saw.clone();
        (Enveloper::new(node, Envelope::default()), saw)
    }

    fn value_at(ctrl: &mut ControlObject, sample: u64, param: Param) -> f32 {
        ctrl.tick(sample);
        ctrl.value(param)
    }

    #[test]
    fn test_single_note_contour() {
        let (mut enveloper, saw) = wrapped_saw();
        // 0.5 s note at 44.1 kHz: attack 441, decay to sustain, release.
        enveloper.add_note(0, 22_050, 0.8, 220.0);
        enveloper.commit(44_100).unwrap();
        let mut saw = saw.borrow_mut();
        let ctrl = saw.control().unwrap();
        // End of attack reaches the attack level.
        assert!((value_at(ctrl, 441, Param::Amplitude) - 0.8).abs() < 1e-3);
        // After the decay the sustain level holds.
        assert!((value_at(ctrl, 441 + 2205, Param::Amplitude) - 0.56).abs() < 1e-3);
        assert!((value_at(ctrl, 20_000, Param::Amplitude) - 0.56).abs() < 1e-3);
        // Past the release the note is silent.
        assert!(value_at(ctrl, 22_050 + 4410, Param::Amplitude).abs() < 1e-6);
        // The starting frequency swept in.
        assert!((value_at(ctrl, 1000, Param::Frequency) - 220.0).abs() < 1e-3);
    }

    #[test]
    fn test_two_notes_sweep_frequency() {
        let (mut enveloper, saw) = wrapped_saw();
        enveloper.add_note(0, 11_025, 0.5, 220.0);
        enveloper.add_note(22_050, 33_075, 0.5, 440.0);
        enveloper.commit(44_100).unwrap();
        let mut saw = saw.borrow_mut();
        let ctrl = saw.control().unwrap();
        assert!((value_at(ctrl, 5000, Param::Frequency) - 220.0).abs() < 1e-3);
        assert!((value_at(ctrl, 30_000, Param::Frequency) - 440.0).abs() < 1e-3);
    }

    #[test]
    fn test_note_replacement_at_same_start() {
        let (mut enveloper, _saw) = wrapped_saw();
        enveloper.add_note(100, 200, 0.5, 220.0);
        enveloper.add_note(100, 300, 0.9, 330.0);
        assert_eq!(enveloper.notes.len(), 1);
        assert_eq!(enveloper.notes[0].end, 300);
    }

    #[test]
    fn test_commit_requires_a_controlled_node() {
        let sum: NodeRc = Rc::new(RefCell::new(crate::sum::AudioSum::new()));
        let mut enveloper = Enveloper::new(sum, Envelope::default());
        enveloper.add_note(0, 100, 0.5, 220.0);
        assert_eq!(enveloper.commit(44_100), Err(Error::InvalidNode));
    }
}
