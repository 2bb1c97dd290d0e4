//! Streaming SHA-256 over decompressed report bytes.

use sha2::{Digest, Sha256};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Raised through `io::Error` when a stream grows past its byte limit.
#[derive(Debug, thiserror::Error)]
#[error("stream exceeds {limit} bytes")]
pub struct LimitExceeded {
    pub limit: u64,
}

/// Checksum and length of everything read through a [`HashingReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    /// Lowercase hex SHA-256
    pub checksum: String,
    pub length: u64,
}

/// Hashes bytes as they are read, optionally failing once `limit` is exceeded.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    length: u64,
    limit: Option<u64>,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R, limit: Option<u64>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            length: 0,
            limit,
        }
    }

    pub fn finish(self) -> ContentDigest {
        ContentDigest {
            checksum: hex::encode(self.hasher.finalize()),
            length: self.length,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let length = this.length + (buf.filled().len() - before) as u64;
        if let Some(limit) = this.limit {
            if length > limit {
                // An erroring read must leave the buffer as it found it.
                buf.set_filled(before);
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    LimitExceeded { limit },
                )));
            }
        }

        this.hasher.update(&buf.filled()[before..]);
        this.length = length;

        Poll::Ready(Ok(()))
    }
}

/// SHA-256 of an in-memory buffer, hex encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns the limit if `err` was raised by a [`HashingReader`] limit.
pub(crate) fn limit_exceeded(err: &io::Error) -> Option<u64> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<LimitExceeded>())
        .map(|e| e.limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn streaming_digest_matches_buffer_digest() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = HashingReader::new(std::io::Cursor::new(data.clone()), None);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();

        let digest = reader.finish();
        assert_eq!(sink, data);
        assert_eq!(digest.length, data.len() as u64);
        assert_eq!(digest.checksum, sha256_hex(&data));
    }

    #[test]
    fn checksum_is_deterministic() {
        let data = b"{\"issues\":[]}";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let mut reader = HashingReader::new(std::io::Cursor::new(vec![0u8; 1025]), Some(1024));
        let mut sink = Vec::new();
        let err = reader.read_to_end(&mut sink).await.unwrap_err();
        assert_eq!(limit_exceeded(&err), Some(1024));
    }

    #[tokio::test]
    async fn rejected_read_fills_nothing() {
        let mut reader = HashingReader::new(std::io::Cursor::new(vec![1u8; 64]), Some(16));
        let mut storage = [0u8; 128];
        let mut buf = ReadBuf::new(&mut storage);

        let result =
            std::future::poll_fn(|cx| Pin::new(&mut reader).poll_read(cx, &mut buf)).await;

        assert!(result.is_err());
        assert!(buf.filled().is_empty());
        assert_eq!(reader.finish().length, 0);
    }

    #[tokio::test]
    async fn limit_allows_exact_size() {
        let mut reader = HashingReader::new(std::io::Cursor::new(vec![7u8; 1024]), Some(1024));
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        assert_eq!(reader.finish().length, 1024);
    }
}
