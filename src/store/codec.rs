// src/store/codec.rs

//! Content compression for engines that store compressed blobs.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::errors::{Result, SnapwatchError};

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SnapwatchError::store_io("compressing snapshot", e))?;
    encoder
        .finish()
        .map_err(|e| SnapwatchError::store_io("compressing snapshot", e))
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| SnapwatchError::store_io("decompressing snapshot (corrupt entry?)", e))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_blob_is_a_store_error() {
        let err = decompress(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, SnapwatchError::StoreIo(_)));
    }

    #[test]
    fn repetitive_content_shrinks() {
        let data = "line of text\n".repeat(200).into_bytes();
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed).unwrap(), data);
    }
}
