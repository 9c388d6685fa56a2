use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, TallyError};

/// Maximum frame size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Reads one frame. `Ok(None)` means the peer closed the connection cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(TallyError::Connection(format!("Failed to read length: {}", e)));
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(TallyError::InvalidResponse(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| TallyError::Connection(format!("Failed to read data: {}", e)))?;

    Ok(Some(buf))
}

pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(TallyError::Transport(format!(
            "Message too large: {} bytes (max {} bytes)",
            data.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = data.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| TallyError::Connection(format!("Failed to send length: {}", e)))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| TallyError::Connection(format!("Failed to send data: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TallyError::Connection(format!("Failed to flush: {}", e)))?;

    Ok(())
}
