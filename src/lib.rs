//! Scripted multi-voice synthesis rendered to PCM WAV.
//!
//! The crate evaluates a pull-based graph of audio objects in fixed-size
//! sample blocks. Each object owns a control subsystem that turns
//! timestamped parameter events into sample-rate values via shaped ramps.
//! The flagship oscillator, [`InfiniSaw`](infinisaw::InfiniSaw), sums
//! arbitrarily placed sawtooth jumps and suppresses aliasing by injecting
//! polynomial band-limited-step (BLEP) residues, carrying corrections
//! across block boundaries.
//!
//! A minimal render:
//!
//! ```no_run
//! use infinisaw::prelude::*;
//!
//! let mut graph = Graph::new();
//! let _saw = graph.add_synth(SynthKind::saw(220.0, 0.5));
//! graph.add_effect(EffectKind::Panner { pan: -0.3 }).unwrap();
//! let rendered = graph.render(44_100, 44_100, SampleFormat::Int16).unwrap();
//! rendered.save_wav("saw.wav").unwrap();
//! ```

use core::fmt;

pub mod audionode;
pub mod blep;
pub mod buffer;
pub mod control;
pub mod envelope;
pub mod event;
pub mod filter;
pub mod graph;
pub mod infinisaw;
pub mod math;
pub mod noise;
pub mod pan;
pub mod queue;
pub mod ramp;
pub mod render;
pub mod sample;
pub mod sum;
pub mod synth;
pub mod wav;

/// Default sample rate in Hz.
pub const DEFAULT_SR: u32 = 44_100;

/// Default number of samples pulled from the root node per block.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Errors surfaced by fallible operations.
///
/// The audio path itself (`get_samples`) never fails; internal faults zero
/// the affected block and latch a diagnostic instead (see
/// [`audionode::AudioObject::collect_faults`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An event was scheduled before the control's current sample.
    EventInPast { target: u64, current: u64 },
    /// Connecting these nodes would create a cycle in the graph.
    CyclicGraph,
    /// The sample rate, channel count or bit depth cannot be encoded.
    UnsupportedFormat,
    /// A fixed-capacity queue is full.
    QueueOverflow,
    /// The target node does not support the requested operation.
    InvalidNode,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::EventInPast { target, current } => write!(
                f,
                "event targets sample {} but the control is already at sample {}",
                target, current
            ),
            Error::CyclicGraph => write!(f, "connection would make the audio graph cyclic"),
            Error::UnsupportedFormat => {
                write!(f, "unsupported sample rate, channel count or bit depth")
            }
            Error::QueueOverflow => write!(f, "fixed-capacity queue is full"),
            Error::InvalidNode => write!(f, "node does not support this operation"),
        }
    }
}

impl std::error::Error for Error {}

pub mod prelude {
    //! Common imports for building and rendering graphs.
    pub use super::audionode::{AudioObject, BlockId, NodeRc};
    pub use super::blep::{BlepFamily, BlepSpeed, Precision};
    pub use super::envelope::{Envelope, Enveloper};
    pub use super::event::Param;
    pub use super::filter::Lowpole;
    pub use super::graph::{EffectKind, Graph, NodeId, SynthKind};
    pub use super::infinisaw::{InfiniSaw, Jump};
    pub use super::noise::Noise;
    pub use super::pan::Panner;
    pub use super::ramp::RampShape;
    pub use super::render::{Rendered, Renderer};
    pub use super::sample::{Sample, SampleFormat};
    pub use super::sum::{AudioSum, BasicAudioSum};
    pub use super::{Error, DEFAULT_BLOCK_SIZE, DEFAULT_SR};
}
