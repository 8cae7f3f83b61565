//! Shaped scalar interpolation between two values over a span of samples.

use super::math::{lerp, smooth3};

/// Easing shape of a parameter ramp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RampShape {
    /// Step to the target immediately.
    Instant,
    #[default]
    Linear,
    /// Cubic smoothstep 3t² - 2t³.
    SCurve,
    /// Linear in log₂ of the value. Sounds linear for frequencies.
    LogScaleLinear,
    /// Smoothstep in log₂ of the value.
    LogScaleSCurve,
}

/// A pure interpolation value: `from` to `to` over `duration` samples.
///
/// Ramps hold no mutable state; [`Ramp::value_at`] may be queried for any
/// offset and is constant (equal to `to`) past the end of the span.
/// The logarithmic shapes require both endpoints strictly positive and
/// fall back to their non-log variant otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ramp {
    from: f32,
    to: f32,
    duration: u64,
    shape: RampShape,
}

impl Ramp {
    pub fn new(from: f32, to: f32, duration: u64, shape: RampShape) -> Self {
        Ramp {
            from,
            to,
            duration,
            shape,
        }
    }

    /// A ramp that is already at `value`.
    pub fn constant(value: f32) -> Self {
        Ramp::new(value, value, 0, RampShape::Instant)
    }

    #[inline]
    pub fn from(&self) -> f32 {
        self.from
    }

    #[inline]
    pub fn to(&self) -> f32 {
        self.to
    }

    #[inline]
    pub fn duration(&self) -> u64 {
        self.duration
    }

    #[inline]
    pub fn shape(&self) -> RampShape {
        self.shape
    }

    /// Value `offset` samples after the start of the ramp.
    pub fn value_at(&self, offset: u64) -> f32 {
        if self.duration == 0 || offset >= self.duration {
            return self.to;
        }
        let t = offset as f64 / self.duration as f64;
        self.interpolate(t as f32)
    }

    fn interpolate(&self, t: f32) -> f32 {
        match self.shape {
            RampShape::Instant => self.to,
            RampShape::Linear => lerp(self.from, self.to, t),
            RampShape::SCurve => lerp(self.from, self.to, smooth3(t)),
            RampShape::LogScaleLinear => self.log_lerp(t),
            RampShape::LogScaleSCurve => self.log_lerp(smooth3(t)),
        }
    }

    fn log_lerp(&self, t: f32) -> f32 {
        if self.from > 0.0 && self.to > 0.0 {
            lerp(self.from.log2(), self.to.log2(), t).exp2()
        } else {
            lerp(self.from, self.to, t)
        }
    }
}
