//! Directory entry parsing and the `(cluster, blob) -> metadata` index.
//!
//! Byte layout follows the teacher's `zimba::DirEntry::from_bytes`;
//! the index-construction order (offset-sort then scan) follows
//! `original_source/src/zimscan/reader.py`'s `Reader.__init__`.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;
use crate::header::{read_nul_terminated_string, read_offset_list, Header, MimeTypes};

const SENTINEL_REDIRECT: u16 = 0xffff;
const SENTINEL_LINK_TARGET: u16 = 0xfffe;
const SENTINEL_DELETED: u16 = 0xfffd;

fn is_sentinel(mime_index: u16) -> bool {
    matches!(
        mime_index,
        SENTINEL_REDIRECT | SENTINEL_LINK_TARGET | SENTINEL_DELETED
    )
}

/// Metadata attached to a yielded [`crate::Record`] when the directory
/// index was loaded at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMeta {
    pub namespace: char,
    pub mime_type: String,
    pub url: String,
    pub title: String,
    pub revision: u32,
}

/// Reads one content directory entry's tail, given its MIME-type index
/// has already been read and confirmed non-sentinel. Returns the
/// `(cluster_index, blob_index)` coordinate and the metadata to store
/// for it. The `parameter_length` tail is consumed and discarded.
fn read_content_entry<R: Read>(
    source: &mut R,
    mime_types: &MimeTypes,
    mime_index: u16,
) -> Result<(u32, u32, DirectoryMeta)> {
    let mut head = [0u8; 10]; // parameter_len, namespace, revision(4), cluster(4)
    source.read_exact(&mut head)?;
    let parameter_len = head[0];
    let namespace = head[1] as char;
    let revision = u32::from_le_bytes([head[2], head[3], head[4], head[5]]);
    let cluster_index = u32::from_le_bytes([head[6], head[7], head[8], head[9]]);

    let mut blob_buf = [0u8; 4];
    source.read_exact(&mut blob_buf)?;
    let blob_index = u32::from_le_bytes(blob_buf);

    let url = read_nul_terminated_string(source)?;
    let title = read_nul_terminated_string(source)?;

    if parameter_len > 0 {
        let mut discard = vec![0u8; parameter_len as usize];
        source.read_exact(&mut discard)?;
    }

    let mime_type = mime_types.get(mime_index)?.to_string();

    Ok((
        cluster_index,
        blob_index,
        DirectoryMeta {
            namespace,
            mime_type,
            url,
            title,
            revision,
        },
    ))
}

/// The `(cluster_index, blob_index) -> metadata` table, built once at
/// open time by walking directory entries in URL-pointer-offset order.
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    entries: HashMap<(u32, u32), DirectoryMeta>,
}

impl DirectoryIndex {
    pub fn build<R: Read + Seek>(
        source: &mut R,
        header: &Header,
        mime_types: &MimeTypes,
    ) -> Result<Self> {
        source.seek(SeekFrom::Start(header.url_ptr_pos))?;
        let mut offsets = read_offset_list(source, header.entry_count)?;
        offsets.sort_unstable();

        let mut entries = HashMap::with_capacity(offsets.len());

        for offset in offsets {
            source.seek(SeekFrom::Start(offset))?;

            let mut mime_buf = [0u8; 2];
            source.read_exact(&mut mime_buf)?;
            let mime_index = u16::from_le_bytes(mime_buf);

            if is_sentinel(mime_index) {
                continue;
            }

            let (cluster_index, blob_index, meta) =
                read_content_entry(source, mime_types, mime_index)?;

            let key = (cluster_index, blob_index);
            if entries.contains_key(&key) {
                tracing::debug!(
                    cluster_index,
                    blob_index,
                    "duplicate directory entry for (cluster, blob); keeping the later one"
                );
            }
            entries.insert(key, meta);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, cluster_index: u32, blob_index: u32) -> Option<&DirectoryMeta> {
        self.entries.get(&(cluster_index, blob_index))
    }
}
