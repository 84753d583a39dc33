use std::{io, path::Path, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time,
};

use crate::ExtractError;

/// Reads a child's diagnostic stream to the end. With `echo`, each chunk is also copied to our
/// own stderr as it arrives.
pub(crate) async fn collect_stream<R>(mut reader: R, echo: bool) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut console = echo.then(tokio::io::stderr);
    let mut collected = Vec::new();
    let mut chunk = vec![0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if let Some(console) = console.as_mut() {
            console.write_all(&chunk[..n]).await?;
            console.flush().await?;
        }
        collected.extend_from_slice(&chunk[..n]);
    }
    Ok(collected)
}

const SPAWN_ATTEMPTS: u32 = 5;

/// Spawns `command`, retrying briefly while the executable is still held open for writing
/// (`ETXTBSY`), which happens when a script is spawned right after it was written.
pub(crate) async fn spawn_with_retry(
    command: &mut Command,
    binary: &Path,
) -> Result<Child, ExtractError> {
    let mut attempt = 1;
    loop {
        let source = match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => source,
        };
        let text_busy = source.kind() == io::ErrorKind::ExecutableFileBusy
            || source.raw_os_error() == Some(26);
        if !text_busy || attempt == SPAWN_ATTEMPTS {
            return Err(ExtractError::Spawn {
                binary: binary.to_path_buf(),
                source,
            });
        }
        time::sleep(Duration::from_millis(5 << attempt)).await;
        attempt += 1;
    }
}

pub(crate) fn diagnostics_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Fatal message for diagnostics containing `marker`: the text after the last `::`, or the whole
/// trimmed text when there is no separator.
pub(crate) fn marker_message(diagnostics: &str, marker: &str) -> Option<String> {
    if marker.is_empty() || !diagnostics.contains(marker) {
        return None;
    }
    let tail = diagnostics
        .rsplit_once("::")
        .map(|(_, tail)| tail)
        .unwrap_or(diagnostics)
        .trim();
    Some(if tail.is_empty() {
        diagnostics.trim().to_string()
    } else {
        tail.to_string()
    })
}
