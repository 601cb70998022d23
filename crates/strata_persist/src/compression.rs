use std::io;

/// Level used for region payloads. Region writes are rare enough that a
/// mid-range level is worth the CPU.
pub const REGION_ZSTD_LEVEL: i32 = 3;

pub fn compress_zstd(data: &[u8], level: i32) -> io::Result<Vec<u8>> {
    zstd::stream::encode_all(data, level)
}

pub fn decompress_zstd(data: &[u8]) -> io::Result<Vec<u8>> {
    zstd::stream::decode_all(data)
}

/// Fast path for in-memory chunk snapshots.
pub fn compress_lz4(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to decompress lz4 snapshot: {err}"),
        )
    })
}
