//! Scheduled per-sample parameter values for a host object.
//!
//! A `ControlObject` owns one event queue and one active ramp segment per
//! parameter. Ticking it to a sample index activates every event due at or
//! before that index and interpolates the current value of each parameter.

use super::event::{Event, EventQueue, Param};
use super::ramp::{Ramp, RampShape};
use super::Error;

const EVENT_QUEUE_CAPACITY: usize = 4096;

/// Active ramp segment of one parameter.
#[derive(Clone, Copy)]
struct ControlState {
    ramp: Ramp,
    start: u64,
    current: f32,
}

impl ControlState {
    fn constant(value: f32) -> Self {
        ControlState {
            ramp: Ramp::constant(value),
            start: 0,
            current: value,
        }
    }

    /// Interpolated value at sample `s`, clamped at the segment endpoints.
    #[inline]
    fn value_at(&self, s: u64) -> f32 {
        if s <= self.start {
            // Before (or at) the segment start only an instant step has
            // taken effect yet.
            self.ramp.value_at(0)
        } else {
            self.ramp.value_at(s - self.start)
        }
    }
}

/// Converts timestamped events into sample-rate parameter values.
pub struct ControlObject {
    states: [ControlState; Param::SLOTS],
    queue: EventQueue,
    triggers: Vec<(Param, u64)>,
    current_sample: u64,
}

impl ControlObject {
    /// Create a control object with the given initial parameter values.
    /// Unlisted parameters start at zero.
    pub fn new(initial: &[(Param, f32)]) -> Self {
        let mut states = [ControlState::constant(0.0); Param::SLOTS];
        for &(param, value) in initial {
            if let Some(slot) = param.slot() {
                states[slot] = ControlState::constant(value);
            }
        }
        ControlObject {
            states,
            queue: EventQueue::new(EVENT_QUEUE_CAPACITY),
            triggers: Vec::new(),
            current_sample: 0,
        }
    }

    /// Schedule a parameter change. Fails with [`Error::EventInPast`] when
    /// `target_sample` lies strictly before the control's current sample.
    pub fn add_event(
        &mut self,
        target_sample: u64,
        param: Param,
        value: f32,
        duration: u64,
        shape: RampShape,
    ) -> Result<(), Error> {
        if target_sample < self.current_sample {
            return Err(Error::EventInPast {
                target: target_sample,
                current: self.current_sample,
            });
        }
        self.queue.push(Event {
            target_sample,
            param,
            value,
            duration,
            shape,
        })
    }

    /// Advance to `sample`: activate all events due at or before it, then
    /// refresh every parameter's current value.
    pub fn tick(&mut self, sample: u64) {
        self.current_sample = sample;
        while let Some(event) = self.queue.pop_due(sample) {
            self.activate(event);
        }
        for state in self.states.iter_mut() {
            state.current = state.value_at(sample);
        }
    }

    fn activate(&mut self, event: Event) {
        let Some(slot) = event.param.slot() else {
            self.triggers.push((event.param, event.target_sample));
            return;
        };
        let state = &mut self.states[slot];
        // The new segment starts at the event's target sample; if it
        // replaces an unfinished segment, it departs from the replaced
        // segment's value at that instant.
        let from = state.value_at(event.target_sample);
        let shape = if event.duration == 0 {
            RampShape::Instant
        } else {
            event.shape
        };
        state.ramp = Ramp::new(from, event.value, event.duration, shape);
        state.start = event.target_sample;
    }

    /// The most recently computed value of `param`. Triggers read zero.
    #[inline]
    pub fn value(&self, param: Param) -> f32 {
        match param.slot() {
            Some(slot) => self.states[slot].current,
            None => 0.0,
        }
    }

    /// Sample index of the latest `tick`.
    #[inline]
    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    /// Drain trigger events (such as `HardSync`) activated since the last
    /// call, as `(param, target_sample)` pairs.
    pub fn take_triggers(&mut self) -> Vec<(Param, u64)> {
        core::mem::take(&mut self.triggers)
    }

    /// Number of events still queued.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }
}
