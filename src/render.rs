//! Drives a root node in fixed-size chunks and encodes the PCM stream.

use super::audionode::{BlockId, NodeRc};
use super::buffer::Buffer;
use super::sample::{write_sample, SampleFormat};
use super::wav::{self, WavSpec};
use super::{Error, DEFAULT_BLOCK_SIZE, DEFAULT_SR};
use log::{info, warn};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Sample rates the encoder accepts.
pub const SUPPORTED_RATES: [u32; 15] = [
    8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000, 128000,
    176400, 192000,
];

/// Round a requested rate up to the nearest supported one. Zero selects
/// the default rate; rates beyond the highest supported are not encodable.
pub fn supported_rate(rate: u32) -> Result<u32, Error> {
    if rate == 0 {
        return Ok(DEFAULT_SR);
    }
    SUPPORTED_RATES
        .iter()
        .copied()
        .find(|&supported| supported >= rate)
        .ok_or(Error::UnsupportedFormat)
}

/// Renders a root node to interleaved PCM bytes.
pub struct Renderer {
    chunk_size: usize,
    channels: usize,
    format: SampleFormat,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            chunk_size: DEFAULT_BLOCK_SIZE,
            channels: 2,
            format: SampleFormat::Int16,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    /// Pull `total_samples` from `root` and encode them.
    ///
    /// Progress is reported through `log` at 4% granularity. Diagnostics
    /// latched by nodes during the render are collected afterwards and
    /// returned with the audio.
    pub fn render(
        &self,
        root: &NodeRc,
        total_samples: u64,
        sample_rate: u32,
    ) -> Result<Rendered, Error> {
        if self.channels == 0 {
            return Err(Error::UnsupportedFormat);
        }
        let sample_rate = supported_rate(sample_rate)?;
        let mut bytes = Vec::with_capacity(
            (total_samples as usize)
                .saturating_mul(self.channels)
                .saturating_mul(self.format.bytes_per_sample()),
        );
        let mut buffer = Buffer::new();
        let started = Instant::now();
        let mut done = 0u64;
        let mut progress_step = -1i32;
        while done < total_samples {
            let step = (25.0 * (done as f64 / total_samples as f64)).floor() as i32;
            if step > progress_step {
                progress_step = step;
                info!("render {:.1}%", step as f64 * 4.0);
            }
            let n = (total_samples - done).min(self.chunk_size as u64) as usize;
            let bufs = buffer.get_mut(self.channels, n);
            root.borrow_mut()
                .get_samples(bufs, sample_rate, BlockId::next());
            for i in 0..n {
                for channel in 0..self.channels {
                    write_sample(&mut bytes, bufs[channel][i], self.format);
                }
            }
            done += n as u64;
        }
        info!(
            "render 100.0% ({} samples in {:.3} s)",
            total_samples,
            started.elapsed().as_secs_f64()
        );

        let mut diagnostics = Vec::new();
        root.borrow_mut().collect_faults(&mut diagnostics);
        for diagnostic in &diagnostics {
            warn!("render diagnostic: {}", diagnostic);
        }

        Ok(Rendered {
            bytes,
            channels: self.channels,
            sample_rate,
            format: self.format,
            diagnostics,
        })
    }
}

/// The product of one render call.
pub struct Rendered {
    /// Interleaved little-endian PCM.
    pub bytes: Vec<u8>,
    pub channels: usize,
    pub sample_rate: u32,
    pub format: SampleFormat,
    /// Faults latched by graph nodes during the render.
    pub diagnostics: Vec<String>,
}

impl Rendered {
    pub fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels as u16,
            sample_rate: self.sample_rate,
            format: self.format,
        }
    }

    /// Wrap the PCM data in a RIFF/WAVE envelope.
    pub fn write_wav<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        wav::write_wav(writer, self.spec(), &self.bytes)
    }

    /// Save the render as a WAV file.
    pub fn save_wav<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path.as_ref())?;
        self.write_wav(&mut file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sum::AudioSum;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_supported_rates_round_up() {
        assert_eq!(supported_rate(0).unwrap(), 44_100);
        assert_eq!(supported_rate(44_100).unwrap(), 44_100);
        assert_eq!(supported_rate(44_101).unwrap(), 48_000);
        assert_eq!(supported_rate(7000).unwrap(), 8000);
        assert_eq!(supported_rate(200_000), Err(Error::UnsupportedFormat));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let root: NodeRc = Rc::new(RefCell::new(AudioSum::new()));
        let renderer = Renderer::new().with_channels(0);
        assert_eq!(
            renderer.render(&root, 16, 44_100).err(),
            Some(Error::UnsupportedFormat)
        );
    }

    #[test]
    fn test_silence_byte_count() {
        let root: NodeRc = Rc::new(RefCell::new(AudioSum::new()));
        let rendered = Renderer::new().render(&root, 4410, 44_100).unwrap();
        assert_eq!(rendered.bytes.len(), 4410 * 2 * 2);
        assert!(rendered.bytes.iter().all(|&b| b == 0));
        assert!(rendered.diagnostics.is_empty());
    }
}
