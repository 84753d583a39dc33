use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::{self, error::Elapsed},
};

use super::CHUNK_SIZE_BYTES;
use crate::config::FrameLimits;
use crate::error::FrameError;
use crate::frame::{Frame, FrameAssembler};

/// Async counterpart of [`crate::SyncFrameReader`] with identical end-of-stream semantics.
pub struct AsyncFrameReader<R: AsyncRead + Unpin> {
    reader: R,
    assembler: FrameAssembler,
    buffer: Box<[u8; CHUNK_SIZE_BYTES]>,
    buffer_pos: usize,
    buffer_len: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> AsyncFrameReader<R> {
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

    pub fn skipped_bytes(&self) -> u64 {
        self.assembler.skipped_bytes()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Returns the next frame, `None` on clean end-of-stream.
    ///
    /// Cancel-safe between reads: bytes already pulled from the source stay buffered in the
    /// reader, so dropping this future and calling again resumes where it left off.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        self.pull(None).await.unwrap_or_default()
    }

    /// Like [`next_frame`](Self::next_frame), but gives up once the source has been silent for
    /// `idle`. The limit applies to each read, so a long frame that keeps arriving is not cut
    /// off. After `Elapsed` the reader is still usable and keeps any partial frame.
    pub async fn next_frame_idle(
        &mut self,
        idle: Duration,
    ) -> Result<Option<Result<Frame, FrameError>>, Elapsed> {
        self.pull(Some(idle)).await
    }

    async fn pull(
        &mut self,
        idle: Option<Duration>,
    ) -> Result<Option<Result<Frame, FrameError>>, Elapsed> {
        if self.done {
            return Ok(None);
        }

        loop {
            while self.buffer_pos < self.buffer_len {
                let byte = self.buffer[self.buffer_pos];
                self.buffer_pos += 1;
                if let Some(outcome) = self.assembler.push(byte) {
                    return Ok(Some(outcome));
                }
            }

            self.buffer_pos = 0;
            self.buffer_len = 0;
            let read = self.reader.read(&mut self.buffer[..]);
            let read = match idle {
                Some(idle) => time::timeout(idle, read).await?,
                None => read.await,
            };
            match read {
                Ok(0) => {
                    self.done = true;
                    return Ok(self.assembler.finish().map(Err));
                }
                Ok(n) => self.buffer_len = n,
                Err(err) => {
                    self.done = true;
                    return Ok(Some(Err(FrameError::Io {
                        frame_number: self.assembler.next_frame_number(),
                        message: err.to_string(),
                    })));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn truncated_tail_is_distinct_from_clean_end() {
        let data: &[u8] = b"{\"a\":1}{\"b\":{\"c\":2}";
        let mut reader = AsyncFrameReader::new(data, FrameLimits::default());

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.bytes, b"{\"a\":1}");

        match reader.next_frame().await {
            Some(Err(FrameError::Truncated {
                frame_number,
                depth,
                ..
            })) => {
                assert_eq!(frame_number, 2);
                assert_eq!(depth, 1);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        assert!(reader.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn empty_source_ends_cleanly() {
        let data: &[u8] = b"  \n";
        let mut reader = AsyncFrameReader::new(data, FrameLimits::default());
        assert!(reader.next_frame().await.is_none());
        assert_eq!(reader.skipped_bytes(), 3);
    }

    #[tokio::test]
    async fn idle_limit_applies_per_read_not_per_frame() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            let pieces: [&[u8]; 5] = [b"{\"a\":", b"[1,", b"2,", b"3]", b"}"];
            for piece in pieces {
                tx.write_all(piece).await.unwrap();
                time::sleep(Duration::from_millis(150)).await;
            }
            tx
        });

        let mut reader = AsyncFrameReader::new(rx, FrameLimits::default());
        let frame = reader
            .next_frame_idle(Duration::from_millis(400))
            .await
            .expect("steady trickle is not idle")
            .unwrap()
            .unwrap();
        assert_eq!(frame.bytes, b"{\"a\":[1,2,3]}");

        let mut tx = writer.await.unwrap();
        let silent = reader.next_frame_idle(Duration::from_millis(50)).await;
        assert!(silent.is_err());

        tx.write_all(b"{\"b\":2}").await.unwrap();
        drop(tx);
        let next = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(next.bytes, b"{\"b\":2}");
        assert!(reader.next_frame().await.is_none());
    }
}
