//! The public streaming reader and its open/advance/close state machine.
//!
//! Grounded on `original_source/src/zimscan/reader.py`'s `Reader`
//! (`__init__` building the pointer lists and directory index,
//! `__next__` advancing cluster-by-cluster and blob-by-blob, `close`)
//! and on the teacher's `zimba::ZimFile::open`/`dir_entries` for the
//! Rust-side error and type conventions.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::buffered::{BufferedSource, DEFAULT_BUFFER_SIZE};
use crate::cluster::Cluster;
use crate::directory::DirectoryIndex;
use crate::error::Result;
use crate::header::{Header, MimeTypes};
use crate::record::Record;

/// Knobs controlling how a [`Reader`] opens an archive.
#[derive(Debug, Clone)]
pub struct Options {
    /// Skip building the `(cluster, blob) -> metadata` directory index
    /// at open time. Iteration still yields every blob, but
    /// [`Record::namespace`], [`Record::url`], etc. return `None`.
    /// Cuts open-time cost on archives whose caller only wants raw
    /// blob bytes.
    pub skip_metadata: bool,
    /// Window size for the internal buffered source.
    pub buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            skip_metadata: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// A streaming, forward-only reader over a ZIM archive.
///
/// Entries are yielded cluster-by-cluster, blob-by-blob, through
/// [`Reader::next`]. There is no random access to an arbitrary entry
/// by URL; that lookup belongs to a downstream index, not this reader.
pub struct Reader<S> {
    source: BufferedSource<S>,
    header: Header,
    mime_types: MimeTypes,
    directory_index: Option<DirectoryIndex>,
    cluster_pointers: Vec<u64>,

    next_cluster: u32,
    current_cluster_number: Option<u32>,
    current_cluster: Option<Cluster>,
    blob_index: u32,
}

impl Reader<File> {
    /// Opens a ZIM archive from a filesystem path, with default
    /// options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(File::open(path)?, Options::default())
    }
}

impl<S: Read + Seek> Reader<S> {
    pub fn new(source: S, options: Options) -> Result<Self> {
        let mut buffered = BufferedSource::new(source, options.buffer_size)?;

        buffered.seek(SeekFrom::Start(0))?;
        let header = Header::read_from(&mut buffered)?;

        buffered.seek(SeekFrom::Start(header.mime_list_pos))?;
        let mime_types = MimeTypes::read_from(&mut buffered)?;

        let directory_index = if options.skip_metadata {
            None
        } else {
            Some(DirectoryIndex::build(&mut buffered, &header, &mime_types)?)
        };

        buffered.seek(SeekFrom::Start(header.cluster_ptr_pos))?;
        let cluster_pointers = crate::header::read_offset_list(&mut buffered, header.cluster_count)?;

        tracing::debug!(
            entries = header.entry_count,
            clusters = header.cluster_count,
            metadata_loaded = !options.skip_metadata,
            "opened ZIM archive"
        );

        Ok(Self {
            source: buffered,
            header,
            mime_types,
            directory_index,
            cluster_pointers,
            next_cluster: 0,
            current_cluster_number: None,
            current_cluster: None,
            blob_index: 0,
        })
    }

    /// Number of entries this reader will report. When metadata was
    /// loaded this is the directory index's entry count; otherwise it
    /// falls back to the raw header entry count (an upper bound, since
    /// redirects and sentinels are never yielded as records).
    pub fn len(&self) -> usize {
        match &self.directory_index {
            Some(index) => index.len(),
            None => self.header.entry_count as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn mime_types(&self) -> &MimeTypes {
        &self.mime_types
    }

    /// Advances to the next blob in the archive, decompressing a new
    /// cluster whenever the current one is exhausted. Returns `None`
    /// once every cluster has been consumed.
    ///
    /// The returned [`Record`] borrows its data from this reader, so it
    /// must be dropped (or read to completion) before calling `next`
    /// again -- the borrow checker enforces this statically instead of
    /// the runtime invalidation the reference implementation does.
    pub fn next(&mut self) -> Result<Option<Record<'_>>> {
        loop {
            let exhausted = match &self.current_cluster {
                None => true,
                Some(cluster) => self.blob_index >= cluster.blob_count() as u32,
            };

            if exhausted {
                if self.next_cluster as usize >= self.cluster_pointers.len() {
                    self.current_cluster = None;
                    return Ok(None);
                }

                let index = self.next_cluster as usize;
                let start = self.cluster_pointers[index];
                let end = if index + 1 < self.cluster_pointers.len() {
                    self.cluster_pointers[index + 1]
                } else {
                    self.header.checksum_pos
                };

                self.current_cluster = Some(Cluster::read(&mut self.source, start, end)?);
                self.current_cluster_number = Some(self.next_cluster);
                self.next_cluster += 1;
                self.blob_index = 0;
                continue;
            }

            let cluster_number = self.current_cluster_number.unwrap();
            let blob_index = self.blob_index;
            self.blob_index += 1;

            let data = self
                .current_cluster
                .as_ref()
                .unwrap()
                .blob(blob_index as usize)
                .expect("blob_index bounded by blob_count above");

            let meta = self
                .directory_index
                .as_ref()
                .and_then(|index| index.get(cluster_number, blob_index));

            return Ok(Some(Record::new(data, meta)));
        }
    }

    /// Consumes the reader, returning the underlying source.
    pub fn close(self) -> S {
        self.source.into_inner()
    }
}
