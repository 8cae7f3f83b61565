//! Graph construction API.
//!
//! A [`Graph`] owns the nodes of one render job behind shared handles and
//! wires them with the routing conventions of the synthesis engine: every
//! synth feeds the first effect, every new effect chains after the
//! previous one, and with no effects installed a non-owning sum over the
//! synths acts as the root.

use super::audionode::{AudioObject, NodeRc};
use super::blep::Precision;
use super::event::Param;
use super::filter::Lowpole;
use super::infinisaw::{InfiniSaw, Jump};
use super::noise::Noise;
use super::pan::Panner;
use super::ramp::RampShape;
use super::render::{Rendered, Renderer};
use super::sample::SampleFormat;
use super::sum::{AudioSum, BasicAudioSum};
use super::Error;
use std::cell::RefCell;
use std::rc::Rc;

/// Handle to a node owned by a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(usize);

/// Synth constructors recognized by the graph builder.
#[derive(Clone, Debug)]
pub enum SynthKind {
    InfiniSaw {
        jumps: Vec<Jump>,
        frequency: f32,
        amplitude: f32,
        phase: f64,
        precision: Precision,
    },
    Noise {
        amplitude: f32,
    },
}

impl SynthKind {
    /// A plain sawtooth voice.
    pub fn saw(frequency: f32, amplitude: f32) -> Self {
        SynthKind::InfiniSaw {
            jumps: vec![Jump::new(0.0, 1.0)],
            frequency,
            amplitude,
            phase: 0.0,
            precision: Precision::default(),
        }
    }
}

/// Effect constructors recognized by the graph builder.
#[derive(Clone, Copy, Debug)]
pub enum EffectKind {
    Sum,
    Panner { pan: f32 },
    Lowpole { cutoff: f32 },
}

pub struct Graph {
    nodes: Vec<NodeRc>,
    synths: Vec<NodeId>,
    effects: Vec<NodeId>,
    root_sum: Rc<RefCell<BasicAudioSum>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            nodes: Vec::new(),
            synths: Vec::new(),
            effects: Vec::new(),
            root_sum: Rc::new(RefCell::new(BasicAudioSum::new())),
        }
    }

    /// Shared handle of a node, e.g. for wiring outside the builder
    /// conventions.
    pub fn node(&self, id: NodeId) -> NodeRc {
        self.nodes[id.0].clone()
    }

    /// Create a synth and route it into the first effect (or the implicit
    /// root sum while no effect is installed).
    pub fn add_synth(&mut self, kind: SynthKind) -> NodeId {
        let node: NodeRc = match kind {
            SynthKind::InfiniSaw {
                jumps,
                frequency,
                amplitude,
                phase,
                precision,
            } => Rc::new(RefCell::new(InfiniSaw::new(
                jumps, frequency, amplitude, phase, precision,
            ))),
            SynthKind::Noise { amplitude } => Rc::new(RefCell::new(Noise::new(amplitude))),
        };
        let id = self.push(node.clone());
        self.synths.push(id);
        if let Some(&first_effect) = self.effects.first() {
            // A fresh synth cannot reach the effect, so this cannot cycle.
            let _ = self.nodes[first_effect.0].borrow_mut().add_input(node);
        } else {
            let _ = self.root_sum.borrow_mut().add_input(node);
        }
        id
    }

    /// Create an effect, feed it the previous chain output (or every synth
    /// when it is the first effect) and make it the new chain output.
    pub fn add_effect(&mut self, kind: EffectKind) -> Result<NodeId, Error> {
        let node: NodeRc = match kind {
            EffectKind::Sum => Rc::new(RefCell::new(AudioSum::new())),
            EffectKind::Panner { pan } => Rc::new(RefCell::new(Panner::new(pan))),
            EffectKind::Lowpole { cutoff } => Rc::new(RefCell::new(Lowpole::new(cutoff))),
        };
        if let Some(&last) = self.effects.last() {
            node.borrow_mut().add_input(self.nodes[last.0].clone())?;
        } else {
            for &synth in &self.synths {
                node.borrow_mut().add_input(self.nodes[synth.0].clone())?;
            }
        }
        let id = self.push(node);
        self.effects.push(id);
        Ok(id)
    }

    /// Connect `from`'s output into `to`. Fails with
    /// [`Error::CyclicGraph`] when `from` already reaches `to`, and with
    /// [`Error::InvalidNode`] when `to` accepts no inputs.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), Error> {
        let input = self.nodes[from.0].clone();
        self.nodes[to.0].borrow_mut().add_input(input)
    }

    /// Detach `from` from `to`.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> bool {
        let input = self.nodes[from.0].clone();
        self.nodes[to.0].borrow_mut().remove_input(&input)
    }

    /// Schedule a parameter event on a node.
    pub fn add_event(
        &mut self,
        node: NodeId,
        target_sample: u64,
        param: Param,
        value: f32,
        duration: u64,
        shape: RampShape,
    ) -> Result<(), Error> {
        let mut node = self.nodes[node.0].borrow_mut();
        let ctrl = node.control().ok_or(Error::InvalidNode)?;
        ctrl.add_event(target_sample, param, value, duration, shape)
    }

    /// The node the renderer pulls from: the last effect, or the implicit
    /// sum over the synths.
    pub fn root(&self) -> NodeRc {
        match self.effects.last() {
            Some(&last) => self.nodes[last.0].clone(),
            None => self.root_sum.clone(),
        }
    }

    /// Render the graph to interleaved PCM with a default stereo renderer.
    pub fn render(
        &mut self,
        total_samples: u64,
        sample_rate: u32,
        format: SampleFormat,
    ) -> Result<Rendered, Error> {
        self.render_with(&Renderer::new().with_format(format), total_samples, sample_rate)
    }

    /// Render the graph with an explicitly configured renderer.
    pub fn render_with(
        &mut self,
        renderer: &Renderer,
        total_samples: u64,
        sample_rate: u32,
    ) -> Result<Rendered, Error> {
        renderer.render(&self.root(), total_samples, sample_rate)
    }

    fn push(&mut self, node: NodeRc) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }
}
