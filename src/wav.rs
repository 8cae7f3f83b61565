//! RIFF/WAVE writing and reading.
//!
//! The writer emits a canonical 44-byte header (16-byte fmt chunk) plus
//! the data chunk, padded to word alignment. The reader understands the
//! files the writer produces; a parse followed by a re-serialize is byte
//! identical.

use super::sample::SampleFormat;
use std::io::{Error, ErrorKind, Read, Result, Write};

/// Format description of a WAV stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub format: SampleFormat,
}

/// Write a 32-bit value, little endian.
#[inline]
fn write32<W: Write>(writer: &mut W, x: u32) -> Result<()> {
    writer.write_all(&[x as u8, (x >> 8) as u8, (x >> 16) as u8, (x >> 24) as u8])
}

/// Write a 16-bit value, little endian.
#[inline]
fn write16<W: Write>(writer: &mut W, x: u16) -> Result<()> {
    writer.write_all(&[x as u8, (x >> 8) as u8])
}

/// Wrap interleaved PCM `data` in a RIFF/WAVE envelope.
pub fn write_wav<W: Write>(writer: &mut W, spec: WavSpec, data: &[u8]) -> Result<()> {
    let pad = (data.len() & 1) as u32;
    writer.write_all(b"RIFF")?;
    write32(writer, data.len() as u32 + pad + 36)?;
    writer.write_all(b"WAVE")?;
    writer.write_all(b"fmt ")?;
    // Length of the fmt chunk.
    write32(writer, 16)?;
    write16(writer, spec.format.wave_format_code())?;
    write16(writer, spec.channels)?;
    write32(writer, spec.sample_rate)?;
    // Data rate in bytes per second.
    let frame_bytes = spec.channels as u32 * spec.format.bytes_per_sample() as u32;
    write32(writer, spec.sample_rate * frame_bytes)?;
    // Sample frame length in bytes.
    write16(writer, frame_bytes as u16)?;
    write16(writer, spec.format.bits())?;
    writer.write_all(b"data")?;
    write32(writer, data.len() as u32)?;
    writer.write_all(data)?;
    if pad == 1 {
        writer.write_all(&[0])?;
    }
    Ok(())
}

fn read_exact<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read16<R: Read>(reader: &mut R) -> Result<u16> {
    let b = read_exact(reader, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn read32<R: Read>(reader: &mut R) -> Result<u32> {
    let b = read_exact(reader, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidData, message.to_string())
}

/// Parse a WAV stream into its format description and PCM data.
///
/// Understands the canonical layout produced by [`write_wav`]; unknown
/// chunks before the data chunk are skipped.
pub fn read_wav<R: Read>(reader: &mut R) -> Result<(WavSpec, Vec<u8>)> {
    if &read_exact(reader, 4)?[..] != b"RIFF" {
        return Err(invalid("missing RIFF tag"));
    }
    let _riff_len = read32(reader)?;
    if &read_exact(reader, 4)?[..] != b"WAVE" {
        return Err(invalid("missing WAVE tag"));
    }

    let mut spec: Option<WavSpec> = None;
    loop {
        let tag = read_exact(reader, 4)?;
        let len = read32(reader)? as usize;
        match &tag[..] {
            b"fmt " => {
                if len < 16 {
                    return Err(invalid("fmt chunk too short"));
                }
                let body = read_exact(reader, len + (len & 1))?;
                let code = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                let format = match (code, bits) {
                    (1, 16) => SampleFormat::Int16,
                    (1, 24) => SampleFormat::Int24,
                    (3, 32) => SampleFormat::Float32,
                    _ => return Err(invalid("unsupported sample format")),
                };
                spec = Some(WavSpec {
                    channels,
                    sample_rate,
                    format,
                });
            }
            b"data" => {
                let spec = spec.ok_or_else(|| invalid("data chunk before fmt chunk"))?;
                let data = read_exact(reader, len)?;
                if len & 1 == 1 {
                    // Consume the pad byte if present; the stream may
                    // also end here.
                    let mut pad = [0u8; 1];
                    let _ = reader.read(&mut pad)?;
                }
                return Ok((spec, data));
            }
            _ => {
                let _ = read_exact(reader, len + (len & 1))?;
            }
        }
    }
}
