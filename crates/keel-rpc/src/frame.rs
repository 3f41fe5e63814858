//! Frame reading over a byte stream.

use crate::RpcError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads one complete frame: first the 8-byte length prefix, then the
/// remaining `header_len + body_len - 8` bytes. Both phases loop until
/// every byte has arrived, so short reads on the socket cannot truncate a
/// frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 8];
    reader.read_exact(&mut prefix).await?;
    let header_len = u32::from_be_bytes(prefix[0..4].try_into().unwrap()) as usize;
    let body_len = u32::from_be_bytes(prefix[4..8].try_into().unwrap()) as usize;
    let total = header_len + body_len;
    if total < prefix.len() {
        return Err(RpcError::Frame(format!(
            "frame length {total} smaller than its prefix"
        )));
    }
    let mut frame = vec![0u8; total];
    frame[..prefix.len()].copy_from_slice(&prefix);
    reader.read_exact(&mut frame[prefix.len()..]).await?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Request;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reassembles_a_frame_split_across_writes() {
        let mut req = Request::new("svc", "method", 1, vec![7; 64]);
        req.finalize();
        let encoded = req.encode();

        let (client, mut server) = tokio::io::duplex(16);
        let bytes = encoded.clone();
        let writer = tokio::spawn(async move {
            let mut client = client;
            // Dribble the frame out in small chunks.
            for chunk in bytes.chunks(5) {
                client.write_all(chunk).await.unwrap();
                client.flush().await.unwrap();
            }
        });

        let frame = read_frame(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(frame, encoded);
        assert_eq!(Request::decode(&frame).unwrap(), req);
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 20, 0, 0, 0, 0, 1]).await.unwrap();
        drop(client);
        assert!(read_frame(&mut server).await.is_err());
    }
}
