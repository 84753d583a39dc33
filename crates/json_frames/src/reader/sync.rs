use std::io::{ErrorKind, Read};

use super::CHUNK_SIZE_BYTES;
use crate::config::FrameLimits;
use crate::error::FrameError;
use crate::frame::{Frame, FrameAssembler};

/// Blocking frame reader over any [`Read`] source.
///
/// Reads in chunks but feeds the scanner one byte at a time, so frame boundaries are found from
/// the JSON grammar alone.
pub struct SyncFrameReader<R: Read> {
    reader: R,
    assembler: FrameAssembler,
    buffer: Box<[u8; CHUNK_SIZE_BYTES]>,
    buffer_pos: usize,
    buffer_len: usize,
    done: bool,
}

impl<R: Read> SyncFrameReader<R> {
    pub fn new(reader: R, limits: FrameLimits) -> Self {
        Self {
            reader,
            assembler: FrameAssembler::new(limits),
            buffer: Box::new([0u8; CHUNK_SIZE_BYTES]),
            buffer_pos: 0,
            buffer_len: 0,
            done: false,
        }
    }

    /// Bytes ignored outside of any frame so far.
    pub fn skipped_bytes(&self) -> u64 {
        self.assembler.skipped_bytes()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fill_buffer(&mut self) -> std::io::Result<usize> {
        self.buffer_pos = 0;
        loop {
            match self.reader.read(&mut self.buffer[..]) {
                Ok(n) => {
                    self.buffer_len = n;
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buffer_len = 0;
                    return Err(err);
                }
            }
        }
    }
}

impl<R: Read> Iterator for SyncFrameReader<R> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.buffer_pos >= self.buffer_len {
                match self.fill_buffer() {
                    Ok(0) => {
                        self.done = true;
                        return self.assembler.finish().map(Err);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        self.done = true;
                        return Some(Err(FrameError::Io {
                            frame_number: self.assembler.next_frame_number(),
                            message: err.to_string(),
                        }));
                    }
                }
            }

            while self.buffer_pos < self.buffer_len {
                let byte = self.buffer[self.buffer_pos];
                self.buffer_pos += 1;
                if let Some(outcome) = self.assembler.push(byte) {
                    return Some(outcome);
                }
            }
        }
    }
}
