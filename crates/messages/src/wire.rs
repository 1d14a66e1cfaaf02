//! Payload compression.
//!
//! LZ4 with the uncompressed size prepended, so the receiver can allocate
//! the output buffer up front.

pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>, lz4_flex::block::DecompressError> {
    lz4_flex::decompress_size_prepended(data)
}
