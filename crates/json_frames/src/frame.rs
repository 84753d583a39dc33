use crate::config::FrameLimits;
use crate::error::FrameError;
use crate::scanner::{FrameScanner, ScanStep};

/// One complete JSON object lifted out of the stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    /// 1-based position of the frame in the stream.
    pub frame_number: usize,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Accumulates scanned bytes into frames and enforces [`FrameLimits`].
///
/// Shared by the sync and tokio readers; neither reader touches the scanner directly.
#[derive(Debug)]
pub(crate) struct FrameAssembler {
    scanner: FrameScanner,
    limits: FrameLimits,
    current: Vec<u8>,
    observed_bytes: usize,
    discard_mode: bool,
    frame_number: usize,
    skipped_bytes: u64,
}

impl FrameAssembler {
    pub(crate) fn new(limits: FrameLimits) -> Self {
        Self {
            scanner: FrameScanner::new(),
            limits,
            current: Vec::new(),
            observed_bytes: 0,
            discard_mode: false,
            frame_number: 0,
            skipped_bytes: 0,
        }
    }

    pub(crate) fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    pub(crate) fn next_frame_number(&self) -> usize {
        self.frame_number + 1
    }

    pub(crate) fn push(&mut self, byte: u8) -> Option<Result<Frame, FrameError>> {
        match self.scanner.push(byte) {
            ScanStep::Skipped => {
                self.skipped_bytes += 1;
                None
            }
            ScanStep::Inside => {
                self.observe(byte);
                None
            }
            ScanStep::Complete => {
                self.observe(byte);
                Some(self.finish_frame())
            }
        }
    }

    /// Called once the source reports end-of-stream.
    pub(crate) fn finish(&mut self) -> Option<FrameError> {
        if !self.scanner.in_frame() {
            return None;
        }
        let err = FrameError::Truncated {
            frame_number: self.next_frame_number(),
            depth: self.scanner.depth(),
            buffered_bytes: self.observed_bytes,
        };
        self.reset_frame_state();
        self.scanner.reset();
        Some(err)
    }

    fn observe(&mut self, byte: u8) {
        self.observed_bytes = self.observed_bytes.saturating_add(1);
        if self.discard_mode {
            return;
        }
        if self.observed_bytes > self.limits.max_frame_bytes {
            self.discard_mode = true;
            self.current = Vec::new();
            return;
        }
        self.current.push(byte);
    }

    fn finish_frame(&mut self) -> Result<Frame, FrameError> {
        self.frame_number += 1;
        let frame_number = self.frame_number;

        if self.discard_mode {
            let observed_bytes = self.observed_bytes;
            self.reset_frame_state();
            return Err(FrameError::TooLarge {
                frame_number,
                observed_bytes,
                max_frame_bytes: self.limits.max_frame_bytes,
            });
        }

        let bytes = std::mem::take(&mut self.current);
        self.reset_frame_state();
        Ok(Frame {
            frame_number,
            bytes,
        })
    }

    fn reset_frame_state(&mut self) {
        self.current.clear();
        self.observed_bytes = 0;
        self.discard_mode = false;
    }
}
