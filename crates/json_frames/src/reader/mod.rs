mod sync;

#[cfg(feature = "tokio")]
mod tokio;

pub use sync::SyncFrameReader;

#[cfg(feature = "tokio")]
pub use self::tokio::AsyncFrameReader;

const CHUNK_SIZE_BYTES: usize = 8192;
