//! Content-Encoding decoding.

use std::io::Read;

use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_ENCODING};

use crate::error::{Error, Result};

/// Decode `body` according to its `Content-Encoding` header.
///
/// Absent, `identity`, or unrecognized encodings pass the body through.
pub fn decode_body(headers: &HeaderMap, body: Bytes) -> Result<Bytes> {
    if body.is_empty() {
        return Ok(body);
    }
    let encoding = match headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()) {
        Some(encoding) => encoding.trim().to_ascii_lowercase(),
        None => return Ok(body),
    };

    match encoding.as_str() {
        "gzip" | "x-gzip" => decode_gzip(&body),
        "deflate" => decode_deflate(&body),
        "br" => decode_brotli(&body),
        "zstd" => decode_zstd(&body),
        other => {
            if other != "identity" {
                tracing::trace!("Passing through body with unknown encoding {:?}", other);
            }
            Ok(body)
        }
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::decode(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

/// zlib-wrapped deflate, falling back to raw deflate.
fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut decoded)
        .is_ok()
    {
        return Ok(Bytes::from(decoded));
    }
    decoded.clear();
    flate2::read::DeflateDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::decode(format!("deflate: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoded = Vec::new();
    brotli::Decompressor::new(data, 4096)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::decode(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    zstd::stream::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| Error::decode(format!("zstd: {}", e)))
}
