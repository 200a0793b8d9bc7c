//! Hub wire framing
//!
//! `[u32 big-endian length][JSON HubFrame]`, length in `1..=MAX_FRAME_SIZE`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::HubFrame;

/// Largest accepted payload, 1 MiB
const MAX_FRAME_SIZE: u32 = 1 << 20;

const HEADER_LEN: usize = 4;

fn map_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

fn check_len(len: u32) -> Result<()> {
    match len {
        0 => Err(Error::Protocol("empty hub frame".into())),
        n if n > MAX_FRAME_SIZE => Err(Error::Protocol(format!(
            "hub frame of {} bytes exceeds {}",
            n, MAX_FRAME_SIZE
        ))),
        _ => Ok(()),
    }
}

/// Read one frame. A stream that ends mid-frame is `ConnectionClosed`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<HubFrame> {
    let len = reader.read_u32().await.map_err(map_eof)?;
    check_len(len)?;

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(map_eof)?;

    HubFrame::from_bytes(&payload).map_err(|e| Error::Protocol(format!("bad hub frame: {}", e)))
}

/// Write one frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &HubFrame) -> Result<()> {
    let payload = frame
        .to_bytes()
        .map_err(|e| Error::Protocol(format!("encoding hub frame: {}", e)))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Protocol("hub frame length overflows u32".into()))?;
    check_len(len)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
