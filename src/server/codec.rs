//! Framed transport: each message is a big-endian `u32` length prefix
//! followed by a zstd-compressed, self-describing binary payload.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; anything larger is a protocol error.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

const COMPRESSION_LEVEL: i32 = 1;

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = Vec::new();
    ciborium::ser::into_writer(value, &mut encoded).context("frame encode")?;
    let compressed = zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL)
        .context("frame compress")?;

    let len = u32::try_from(compressed.len()).context("frame too large")?;
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit");
    }

    writer.write_u32(len).await?;
    writer.write_all(&compressed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `None` on clean end of stream.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit");
    }

    let mut compressed = vec![0u8; len as usize];
    reader.read_exact(&mut compressed).await.context("frame body")?;

    let encoded = zstd::decode_all(compressed.as_slice()).context("frame decompress")?;
    let value = ciborium::de::from_reader(encoded.as_slice()).context("frame decode")?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::proto::{Call, Request};

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let request = Request { id: 1, token: None, call: Call::SignOn { version: 1 } };
        write_frame(&mut client, &request).await.unwrap();

        let received: Request = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);
        let result: Option<Request> = read_frame(&mut server).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_u32(MAX_FRAME_BYTES + 1).await.unwrap();
        let result: Result<Option<Request>> = read_frame(&mut server).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_payload_is_compressed() {
        let (mut client, mut server) = tokio::io::duplex(1024 * 1024);

        // Highly repetitive content should shrink on the wire.
        let commands = "H180 ".repeat(2000);
        let request = Request {
            id: 2,
            token: None,
            call: Call::RunAircraftCommands { callsign: "DAL123".into(), commands },
        };
        write_frame(&mut client, &request).await.unwrap();

        let len = server.read_u32().await.unwrap();
        assert!((len as usize) < 2000);
        let mut rest = vec![0u8; len as usize];
        server.read_exact(&mut rest).await.unwrap();
    }
}
