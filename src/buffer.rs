//! Reusable channel buffers for block processing.

use super::sample::Sample;
use rsor::Slice;

/// Backing storage for a block of channel buffers.
///
/// `get_mut` hands out a `&mut [&mut [Sample]]` view without allocating a
/// fresh vector of references per block.
pub struct Buffer {
    buffer: Vec<Vec<Sample>>,
    slice: Slice<[Sample]>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            buffer: Vec::new(),
            slice: Slice::new(),
        }
    }

    /// A mutable view of `channels` buffers of exactly `len` samples each.
    pub fn get_mut(&mut self, channels: usize, len: usize) -> &mut [&mut [Sample]] {
        self.buffer.truncate(channels);
        while self.buffer.len() < channels {
            self.buffer.push(Vec::with_capacity(len));
        }
        for channel in self.buffer.iter_mut() {
            channel.resize(len, Sample::ZERO);
        }
        self.slice.from_muts(&mut self.buffer)
    }
}
