#![allow(clippy::float_cmp)]

//! End-to-end render scenarios.

extern crate infinisaw;

use infinisaw::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Decode one channel of interleaved Int16 stereo PCM into floats.
fn decode_int16(bytes: &[u8], channels: usize, channel: usize) -> Vec<f32> {
    bytes
        .chunks_exact(2 * channels)
        .map(|frame| {
            let offset = channel * 2;
            i16::from_le_bytes([frame[offset], frame[offset + 1]]) as f32 / 32767.0
        })
        .collect()
}

fn decode_float32(bytes: &[u8], channels: usize, channel: usize) -> Vec<f32> {
    bytes
        .chunks_exact(4 * channels)
        .map(|frame| {
            let offset = channel * 4;
            f32::from_le_bytes([
                frame[offset],
                frame[offset + 1],
                frame[offset + 2],
                frame[offset + 3],
            ])
        })
        .collect()
}

fn rms(samples: &[f32]) -> f64 {
    (samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / samples.len() as f64).sqrt()
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |a, &s| a.max(s.abs()))
}

fn precise() -> Precision {
    Precision::new(BlepFamily::Perfect, BlepSpeed::Precise)
}

#[test]
fn test_silence_from_empty_graph() {
    let _ = env_logger::builder().is_test(true).try_init();
    // 4410 stereo Int16 samples of silence are 17640 zero bytes.
    let mut graph = Graph::new();
    let rendered = graph.render(4410, 44_100, SampleFormat::Int16).unwrap();
    assert_eq!(rendered.bytes.len(), 17_640);
    assert!(rendered.bytes.iter().all(|&b| b == 0));
    assert!(rendered.diagnostics.is_empty());
}

#[test]
fn test_saw_peak_and_rms() {
    let mut graph = Graph::new();
    let _saw = graph.add_synth(SynthKind::InfiniSaw {
        jumps: vec![Jump::new(0.0, 1.0)],
        frequency: 100.0,
        amplitude: 0.5,
        phase: 0.0,
        precision: precise(),
    });
    let rendered = graph.render(44_100, 44_100, SampleFormat::Int16).unwrap();
    let samples = decode_int16(&rendered.bytes, 2, 0);
    assert_eq!(samples.len(), 44_100);
    // A unit jump spans -0.5...0.5; amplitude 0.5 scales that to 0.25.
    assert!(peak(&samples) <= 0.25 + 2e-3, "peak {}", peak(&samples));
    let ideal = 0.25 / 3.0f64.sqrt();
    let measured = rms(&samples);
    assert!(
        (measured - ideal).abs() / ideal < 0.01,
        "rms {} vs {}",
        measured,
        ideal
    );
    // Both stereo channels carry the same voice.
    assert_eq!(samples, decode_int16(&rendered.bytes, 2, 1));
}

/// Frequency of the strongest spectral line in `samples`, ignoring
/// everything below 20 Hz.
fn dominant_frequency(samples: &[f32], sample_rate: u32) -> f32 {
    let mut planner = realfft::RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(samples.len());
    let mut input = samples.to_vec();
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut input, &mut spectrum).unwrap();
    let bin_width = sample_rate as f32 / samples.len() as f32;
    let first_bin = (20.0 / bin_width).ceil() as usize;
    let mut best = first_bin;
    for (bin, value) in spectrum.iter().enumerate().skip(first_bin) {
        if value.norm() > spectrum[best].norm() {
            best = bin;
        }
    }
    best as f32 * bin_width
}

#[test]
fn test_instant_frequency_step() {
    let mut graph = Graph::new();
    let saw = graph.add_synth(SynthKind::InfiniSaw {
        jumps: vec![Jump::new(0.0, 1.0)],
        frequency: 100.0,
        amplitude: 0.5,
        phase: 0.0,
        precision: precise(),
    });
    graph
        .add_event(saw, 11_025, Param::Frequency, 800.0, 0, RampShape::Instant)
        .unwrap();
    let rendered = graph.render(22_050, 44_100, SampleFormat::Int16).unwrap();
    let samples = decode_int16(&rendered.bytes, 2, 0);

    let early = dominant_frequency(&samples[0..8192], 44_100);
    assert!((early - 100.0).abs() < 15.0, "early peak at {} Hz", early);
    // Window clear of the transition.
    let late = dominant_frequency(&samples[12_049..12_049 + 8192], 44_100);
    assert!((late - 800.0).abs() < 15.0, "late peak at {} Hz", late);
}

#[test]
fn test_hard_sync_stays_band_limited() {
    let mut graph = Graph::new();
    let saw = graph.add_synth(SynthKind::InfiniSaw {
        jumps: vec![Jump::new(0.0, 1.0)],
        frequency: 220.0,
        amplitude: 0.5,
        phase: 0.0,
        precision: precise(),
    });
    graph
        .add_event(saw, 10_000, Param::HardSync, 0.0, 0, RampShape::Instant)
        .unwrap();
    let renderer = Renderer::new()
        .with_channels(1)
        .with_format(SampleFormat::Float32);
    let rendered = graph.render_with(&renderer, 20_000, 44_100).unwrap();
    let samples = decode_float32(&rendered.bytes, 1, 0);
    let pre = peak(&samples[..10_000]);
    let post = peak(&samples[10_000..]);
    // The reset is band limited: a 60-sample BLEP window bounds the
    // overshoot to 1/60 of full scale.
    assert!(post <= pre + 1.0 / 60.0, "pre {} post {}", pre, post);
    // The sync actually changed the waveform around the reset point.
    assert!(samples[9_990..10_040].iter().any(|&s| s != 0.0));
}

#[test]
fn test_split_render_concatenation_is_byte_identical() {
    let build = || {
        let mut graph = Graph::new();
        graph.add_synth(SynthKind::InfiniSaw {
            jumps: vec![Jump::new(0.0, 0.7), Jump::new(0.37, 0.3)],
            frequency: 773.0,
            amplitude: 0.5,
            phase: 0.0,
            precision: Precision::default(),
        });
        graph
    };
    let mut whole = build();
    let reference = whole.render(2048, 44_100, SampleFormat::Int16).unwrap();

    // Same graph rendered in two calls: the second picks up exactly where
    // the first ended, anti-alias carry included.
    let mut split = build();
    let mut first = split.render(1024, 44_100, SampleFormat::Int16).unwrap().bytes;
    let second = split.render(1024, 44_100, SampleFormat::Int16).unwrap().bytes;
    first.extend(second);
    assert_eq!(reference.bytes, first);
}

#[test]
fn test_rendering_twice_is_idempotent() {
    let build = || {
        let mut graph = Graph::new();
        graph.add_synth(SynthKind::saw(331.0, 0.4));
        graph.add_effect(EffectKind::Panner { pan: 0.25 }).unwrap();
        graph
    };
    let a = build().render(4096, 44_100, SampleFormat::Int24).unwrap();
    let b = build().render(4096, 44_100, SampleFormat::Int24).unwrap();
    assert_eq!(a.bytes, b.bytes);
}

#[test]
fn test_shared_oscillator_advances_once_per_block() {
    // One oscillator pulled along two graph edges must produce each block
    // exactly once; the duplicate pull replays the cached block.
    let saw = Rc::new(RefCell::new(InfiniSaw::saw(
        440.0,
        0.5,
        0.0,
        Precision::default(),
    )));
    let saw_node: NodeRc = saw.clone();

    let left = Rc::new(RefCell::new(AudioSum::new()));
    let right = Rc::new(RefCell::new(AudioSum::new()));
    left.borrow_mut().add_input(saw_node.clone()).unwrap();
    right.borrow_mut().add_input(saw_node.clone()).unwrap();

    let root = Rc::new(RefCell::new(AudioSum::new()));
    let left_node: NodeRc = left;
    let right_node: NodeRc = right;
    root.borrow_mut().add_input(left_node).unwrap();
    root.borrow_mut().add_input(right_node).unwrap();
    let root_node: NodeRc = root;

    let renderer = Renderer::new()
        .with_channels(1)
        .with_format(SampleFormat::Float32);
    let rendered = renderer.render(&root_node, 2048, 44_100).unwrap();
    assert_eq!(saw.borrow().samples_emitted(), 2048);

    // The diamond sums the voice twice.
    let doubled = decode_float32(&rendered.bytes, 1, 0);
    let mut solo_graph = Graph::new();
    solo_graph.add_synth(SynthKind::saw(440.0, 0.5));
    let solo = solo_graph
        .render_with(&renderer, 2048, 44_100)
        .unwrap();
    let single = decode_float32(&solo.bytes, 1, 0);
    for (d, s) in doubled.iter().zip(single.iter()) {
        assert!((d - 2.0 * s).abs() < 1e-6);
    }
}

#[test]
fn test_wav_round_trip() -> anyhow::Result<()> {
    let mut graph = Graph::new();
    graph.add_synth(SynthKind::saw(220.0, 0.5));
    for format in [SampleFormat::Int16, SampleFormat::Int24, SampleFormat::Float32] {
        let rendered = graph.render(1000, 44_100, format)?;
        let mut first = Vec::new();
        rendered.write_wav(&mut first)?;
        let (spec, data) = infinisaw::wav::read_wav(&mut &first[..])?;
        assert_eq!(spec, rendered.spec());
        assert_eq!(data, rendered.bytes);
        let mut second = Vec::new();
        infinisaw::wav::write_wav(&mut second, spec, &data)?;
        assert_eq!(first, second);
    }
    Ok(())
}

#[test]
fn test_unsupported_rate_rounds_up() {
    let mut graph = Graph::new();
    graph.add_synth(SynthKind::saw(220.0, 0.5));
    let rendered = graph.render(100, 45_000, SampleFormat::Int16).unwrap();
    assert_eq!(rendered.sample_rate, 48_000);
    assert_eq!(
        graph.render(100, 500_000, SampleFormat::Int16).err(),
        Some(Error::UnsupportedFormat)
    );
}

#[test]
fn test_panned_voice_weights_channels() {
    let mut graph = Graph::new();
    graph.add_synth(SynthKind::saw(220.0, 0.5));
    graph.add_effect(EffectKind::Panner { pan: -1.0 }).unwrap();
    let renderer = Renderer::new().with_format(SampleFormat::Float32);
    let rendered = graph.render_with(&renderer, 2048, 44_100).unwrap();
    let left = decode_float32(&rendered.bytes, 2, 0);
    let right = decode_float32(&rendered.bytes, 2, 1);
    assert!(rms(&left) > 0.05);
    // Full left: the right channel is silent.
    assert!(rms(&right) < 1e-6);
}

#[test]
fn test_enveloped_voice_renders_notes() {
    let saw = Rc::new(RefCell::new(InfiniSaw::saw(
        220.0,
        0.0,
        0.0,
        Precision::default(),
    )));
    let saw_node: NodeRc = saw;
    let mut enveloper = Enveloper::new(saw_node, Envelope::default());
    enveloper.add_note(0, 8000, 0.5, 220.0);
    enveloper.add_note(12_000, 20_000, 0.5, 440.0);
    let enveloper_node: NodeRc = Rc::new(RefCell::new(enveloper));

    let renderer = Renderer::new()
        .with_channels(1)
        .with_format(SampleFormat::Float32);
    let rendered = renderer.render(&enveloper_node, 24_000, 44_100).unwrap();
    assert!(rendered.diagnostics.is_empty());
    let samples = decode_float32(&rendered.bytes, 1, 0);
    // Sound during the notes, near silence in the gap tail and at the end.
    assert!(rms(&samples[2000..6000]) > 0.05);
    assert!(rms(&samples[14_000..18_000]) > 0.05);
    assert!(rms(&samples[23_500..]) < 0.02);
}
