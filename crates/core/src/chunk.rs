//! Chunk file naming and splitting helpers.

use crate::checksum::Checksum;

/// File name for a chunk at the given zero-based index.
pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{index}.part")
}

/// Parse the integer index out of a chunk file name.
///
/// Sorting must happen on this parsed index, never on the raw file name:
/// `chunk_10.part` sorts after `chunk_2.part`.
pub fn parse_chunk_index(name: &str) -> crate::Result<u32> {
    let rest = name
        .strip_prefix("chunk_")
        .and_then(|r| r.strip_suffix(".part"))
        .ok_or_else(|| crate::Error::InvalidChunkName(name.to_string()))?;
    rest.parse::<u32>()
        .map_err(|_| crate::Error::InvalidChunkName(name.to_string()))
}

/// Metadata about a chunk of a larger payload.
#[derive(Clone, Debug)]
pub struct ChunkInfo {
    /// Zero-based position within the file.
    pub index: u32,
    /// Size in bytes.
    pub size: u64,
    /// MD5 of the chunk bytes.
    pub checksum: Checksum,
}

/// Split data into chunks of the given size, computing per-chunk checksums.
///
/// Mirrors what the reference client does before submitting chunks.
pub fn chunk_data(data: &[u8], chunk_size: u64) -> Vec<ChunkInfo> {
    let chunk_size = chunk_size as usize;
    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| ChunkInfo {
            index: i as u32,
            size: chunk.len() as u64,
            checksum: Checksum::compute(chunk),
        })
        .collect()
}
