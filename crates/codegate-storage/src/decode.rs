//! Wire decompression for uploaded report streams.

use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder};
use codegate_core::ContentEncoding;
use std::pin::Pin;
use tokio::io::{AsyncRead, BufReader};

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Wrap `reader` so that reading yields decompressed bytes.
pub fn decoder(encoding: ContentEncoding, reader: BoxedReader) -> BoxedReader {
    match encoding {
        ContentEncoding::Identity => reader,
        ContentEncoding::Brotli => Box::pin(BrotliDecoder::new(BufReader::new(reader))),
        ContentEncoding::Gzip => Box::pin(GzipDecoder::new(BufReader::new(reader))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::write::{BrotliEncoder, GzipEncoder};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn brotli(data: &[u8]) -> Vec<u8> {
        let mut encoder = BrotliEncoder::new(Vec::new());
        encoder.write_all(data).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    async fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(data).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    async fn decode_all(encoding: ContentEncoding, wire: Vec<u8>) -> std::io::Result<Vec<u8>> {
        let mut reader = decoder(encoding, Box::pin(std::io::Cursor::new(wire)));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn brotli_stream_is_decompressed() {
        let report = br#"{"tool":"clippy","warnings":3}"#.repeat(200);
        let wire = brotli(&report).await;
        assert!(wire.len() < report.len());
        assert_eq!(decode_all(ContentEncoding::Brotli, wire).await.unwrap(), report);
    }

    #[tokio::test]
    async fn gzip_stream_is_decompressed() {
        let report = b"file,line,rule\nsrc/lib.rs,10,unused\n".repeat(50);
        let wire = gzip(&report).await;
        assert_eq!(decode_all(ContentEncoding::Gzip, wire).await.unwrap(), report);
    }

    #[tokio::test]
    async fn identity_passes_bytes_through() {
        let report = b"plain text report".to_vec();
        assert_eq!(
            decode_all(ContentEncoding::Identity, report.clone()).await.unwrap(),
            report
        );
    }

    #[tokio::test]
    async fn truncated_brotli_fails() {
        let report: Vec<u8> = (0..20_000u32).map(|i| (i.wrapping_mul(7919) % 256) as u8).collect();
        let mut wire = brotli(&report).await;
        wire.truncate(wire.len() / 2);
        assert!(decode_all(ContentEncoding::Brotli, wire).await.is_err());
    }
}
