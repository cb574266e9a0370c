//! Cluster mode byte, compression dispatch, and blob offset table.
//!
//! The mode-byte and offset-table layout mirrors the teacher's
//! `zimba::Cluster::from_bytes` / `CompressedReader`. The read path is
//! generalized from indexing a slice of an mmap'd whole file to a
//! bounded read off [`crate::buffered::BufferedSource`] through the
//! chosen codec, materializing one cluster at a time instead of the
//! whole archive.

use std::io::{BufReader, Read, Seek};

use crate::buffered::BufferedSource;
use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Eq)]
enum Compression {
    Identity,
    Lzma2,
    Zstd,
}

#[derive(Debug, PartialEq, Eq)]
enum OffsetWidth {
    U32,
    U64,
}

impl OffsetWidth {
    fn bytes(&self) -> usize {
        match self {
            OffsetWidth::U32 => 4,
            OffsetWidth::U64 => 8,
        }
    }
}

/// Low nibble: compression code. Bit 4 (0x10): offset width.
fn parse_mode(byte: u8) -> Result<(Compression, OffsetWidth)> {
    let compression = match byte & 0x0f {
        0 | 1 => Compression::Identity,
        4 => Compression::Lzma2,
        5 => Compression::Zstd,
        other => return Err(Error::InvalidCompressionType(other)),
    };
    let width = if byte & 0x10 == 0 {
        OffsetWidth::U32
    } else {
        OffsetWidth::U64
    };
    Ok((compression, width))
}

fn read_offset(bytes: &[u8], width: &OffsetWidth) -> u64 {
    match width {
        OffsetWidth::U32 => u32::from_le_bytes(bytes.try_into().unwrap()) as u64,
        OffsetWidth::U64 => u64::from_le_bytes(bytes.try_into().unwrap()),
    }
}

fn parse_blob_offsets(data: &[u8], width: &OffsetWidth) -> Result<Vec<u64>> {
    let w = width.bytes();
    if data.len() < w {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated blob offset table",
        )));
    }

    let first = read_offset(&data[0..w], width);
    let num_offsets = (first as usize) / w;

    if data.len() < num_offsets * w {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated blob offset table",
        )));
    }

    let mut offsets = Vec::with_capacity(num_offsets);
    for i in 0..num_offsets {
        offsets.push(read_offset(&data[i * w..i * w + w], width));
    }
    Ok(offsets)
}

/// One cluster's decompressed bytes (offset table included, at the
/// front) plus the parsed offset table.
pub struct Cluster {
    blob_offsets: Vec<u64>,
    data: Vec<u8>,
}

impl Cluster {
    /// Reads and fully decompresses the cluster occupying
    /// `[start, end)` in `source`. `end` is the next cluster's absolute
    /// offset, or the checksum offset for the last cluster.
    pub fn read<S: Read + Seek>(
        source: &mut BufferedSource<S>,
        start: u64,
        end: u64,
    ) -> Result<Cluster> {
        use std::io::SeekFrom;

        if end <= start {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "cluster end offset does not follow its start offset",
            )));
        }

        source.seek(SeekFrom::Start(start))?;

        let mut mode = [0u8; 1];
        source.read_exact(&mut mode)?;
        let (compression, width) = parse_mode(mode[0])?;

        let payload_len = end - start - 1;

        tracing::trace!(start, end, ?compression, "decompressing cluster");

        let data = match compression {
            Compression::Identity => {
                let mut buf = vec![0u8; payload_len as usize];
                source.read_exact(&mut buf)?;
                buf
            }
            Compression::Lzma2 => {
                let bounded = source.by_ref().take(payload_len);
                let mut decoder = lzma::Reader::from(BufReader::new(bounded))?;
                let mut buf = Vec::new();
                decoder.read_to_end(&mut buf)?;
                buf
            }
            Compression::Zstd => {
                let bounded = source.by_ref().take(payload_len);
                let mut decoder = zstd::Decoder::new(bounded)?;
                let mut buf = Vec::new();
                decoder.read_to_end(&mut buf)?;
                buf
            }
        };

        let blob_offsets = parse_blob_offsets(&data, &width)?;

        Ok(Cluster { blob_offsets, data })
    }

    /// Number of blobs in this cluster. A cluster with only the
    /// sentinel first offset (table size) and no further entries has
    /// zero blobs.
    pub fn blob_count(&self) -> usize {
        self.blob_offsets.len().saturating_sub(1)
    }

    /// Byte range `[start, end)` of blob `index` within this cluster's
    /// decompressed buffer, including the offset table at the front --
    /// the offsets are already expressed relative to the same origin,
    /// so no further adjustment is needed.
    pub fn blob_range(&self, index: usize) -> Option<(usize, usize)> {
        if index + 1 >= self.blob_offsets.len() {
            return None;
        }
        Some((
            self.blob_offsets[index] as usize,
            self.blob_offsets[index + 1] as usize,
        ))
    }

    pub fn blob(&self, index: usize) -> Option<&[u8]> {
        let (start, end) = self.blob_range(index)?;
        self.data.get(start..end)
    }
}
