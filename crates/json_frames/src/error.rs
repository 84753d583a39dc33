use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameError {
    #[error("I/O error while reading frame {frame_number}: {message}")]
    Io { frame_number: usize, message: String },
    #[error(
        "stream closed inside frame {frame_number} (depth={depth}, buffered_bytes={buffered_bytes})"
    )]
    Truncated {
        frame_number: usize,
        depth: usize,
        buffered_bytes: usize,
    },
    #[error(
        "frame {frame_number} too large (observed_bytes={observed_bytes}, max_frame_bytes={max_frame_bytes})"
    )]
    TooLarge {
        frame_number: usize,
        observed_bytes: usize,
        max_frame_bytes: usize,
    },
}

impl FrameError {
    /// Whether reading may continue after this error.
    ///
    /// Oversized frames are discarded up to their closing brace; I/O failures and truncation end
    /// the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::TooLarge { .. })
    }

    pub fn frame_number(&self) -> usize {
        match self {
            FrameError::Io { frame_number, .. }
            | FrameError::Truncated { frame_number, .. }
            | FrameError::TooLarge { frame_number, .. } => *frame_number,
        }
    }
}
