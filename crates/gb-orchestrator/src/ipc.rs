//! Length-prefixed JSON framing over a child process's stdio.
//!
//! One frame is a `u32` big-endian byte count followed by that many bytes of
//! UTF-8 JSON. Framing (rather than newline-delimited JSON) means a payload
//! is never ambiguous with embedded newlines, and a reader never has to
//! buffer past a known boundary.

use std::io::{Read, Write};

use gb_types::{GbError, GbResult, OrchestratorError};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> GbResult<()> {
    let bytes = serde_json::to_vec(value)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| GbError::Orchestrator(OrchestratorError::IpcFraming { message: "frame too large".into() }))?;
    writer.write_all(&len.to_be_bytes()).map_err(GbError::Io)?;
    writer.write_all(&bytes).map_err(GbError::Io)?;
    writer.flush().map_err(GbError::Io)?;
    Ok(())
}

/// Reads one frame, or `Ok(None)` at a clean EOF between frames (the child
/// closed stdout after its last message).
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> GbResult<Option<T>> {
    let mut len_bytes = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_bytes)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| GbError::Orchestrator(OrchestratorError::IpcFraming { message: e.to_string() }))?;
    let value = serde_json::from_slice(&buf)?;
    Ok(Some(value))
}

/// Like `read_exact`, but a zero-byte read before anything is consumed is
/// reported as a clean stream end rather than an `UnexpectedEof` error.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> GbResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(GbError::Orchestrator(OrchestratorError::IpcFraming {
                    message: "stream ended mid-frame".into(),
                }))
            }
            Ok(n) => filled += n,
            Err(e) => return Err(GbError::Io(e)),
        }
    }
    Ok(true)
}

/// Async counterpart of [`write_frame`], used by the manager side writing to
/// a `tokio::process::Child`'s stdin.
pub async fn write_frame_async<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, value: &T) -> GbResult<()> {
    let bytes = serde_json::to_vec(value)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| GbError::Orchestrator(OrchestratorError::IpcFraming { message: "frame too large".into() }))?;
    writer.write_all(&len.to_be_bytes()).await.map_err(GbError::Io)?;
    writer.write_all(&bytes).await.map_err(GbError::Io)?;
    writer.flush().await.map_err(GbError::Io)?;
    Ok(())
}

/// Async counterpart of [`read_frame`], used by the manager side reading
/// from a `tokio::process::Child`'s stdout.
pub async fn read_frame_async<R: AsyncRead + Unpin, T: DeserializeOwned>(reader: &mut R) -> GbResult<Option<T>> {
    let mut len_bytes = [0u8; 4];
    if reader.read_exact(&mut len_bytes).await.is_err() {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| GbError::Orchestrator(OrchestratorError::IpcFraming { message: e.to_string() }))?;
    let value = serde_json::from_slice(&buf)?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Sample {
        n: u32,
        s: String,
    }

    #[test]
    fn round_trips_a_single_frame() {
        let mut buf = Vec::new();
        let value = Sample { n: 7, s: "hello\nworld".into() };
        write_frame(&mut buf, &value).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Sample = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trips_multiple_frames_back_to_back() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Sample { n: 1, s: "a".into() }).unwrap();
        write_frame(&mut buf, &Sample { n: 2, s: "b".into() }).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let first: Sample = read_frame(&mut cursor).unwrap().unwrap();
        let second: Sample = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first.n, 1);
        assert_eq!(second.n, 2);
        assert!(read_frame::<_, Sample>(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn empty_stream_is_a_clean_end() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame::<_, Sample>(&mut cursor).unwrap().is_none());
    }
}
