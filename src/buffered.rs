//! A read-only seekable buffer that elides backing seeks when possible.
//!
//! Ported from the reference reader's `BufferedFile`: a thin window over
//! a backing `Read + Seek` source, sized to make small structured reads
//! (header fields, offsets, sentinels) and large sequential blob reads
//! both cheap, without thrashing the backing cursor on in-window seeks.

use std::io::{self, Read, Seek, SeekFrom};

/// Default window size, matching `io.DEFAULT_BUFFER_SIZE` in the
/// reference implementation.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

pub struct BufferedSource<S> {
    backing: S,
    buffer: Vec<u8>,
    /// Absolute offset in the backing source at which `buffer` starts.
    buffer_offset: u64,
    /// Cursor into `buffer`, always `<= length`.
    offset: usize,
    /// Number of valid bytes currently held in `buffer`.
    length: usize,
}

impl<S: Read + Seek> BufferedSource<S> {
    pub fn new(mut backing: S, buffer_size: usize) -> io::Result<Self> {
        let buffer_offset = backing.stream_position()?;
        Ok(Self {
            backing,
            buffer: vec![0u8; buffer_size.max(1)],
            buffer_offset,
            offset: 0,
            length: 0,
        })
    }

    pub fn position(&self) -> u64 {
        self.buffer_offset + self.offset as u64
    }

    pub fn into_inner(self) -> S {
        self.backing
    }
}

impl<S: Read + Seek> Read for BufferedSource<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        let requested = buf.len();

        while written < requested {
            let available = self.length - self.offset;
            let n = available.min(requested - written);
            buf[written..written + n]
                .copy_from_slice(&self.buffer[self.offset..self.offset + n]);
            written += n;
            self.offset += n;

            if written >= requested {
                break;
            }

            // Window exhausted: refill from the backing source.
            self.buffer_offset += self.length as u64;
            self.length = self.backing.read(&mut self.buffer)?;
            self.offset = 0;

            if self.length == 0 {
                // Backing source is at EOF.
                break;
            }
        }

        Ok(written)
    }
}

impl<S: Read + Seek> Seek for BufferedSource<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => {
                let cur = self.position() as i64;
                (cur + delta) as u64
            }
            SeekFrom::End(_) => {
                // Not needed by the archive reader; fall back to the
                // backing source and invalidate the window.
                let new_pos = self.backing.seek(pos)?;
                self.buffer_offset = new_pos;
                self.offset = 0;
                self.length = 0;
                return Ok(new_pos);
            }
        };

        let window_start = self.buffer_offset;
        let window_end = self.buffer_offset + self.length as u64;

        if window_start <= target && target <= window_end {
            self.offset = (target - window_start) as usize;
            return Ok(target);
        }

        let new_pos = self.backing.seek(SeekFrom::Start(target))?;
        self.buffer_offset = new_pos;
        self.offset = 0;
        self.length = 0;
        Ok(new_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Cursor;

    /// Wraps a `Cursor` and counts calls to `seek`, so tests can assert
    /// on the number of backing seeks a trace triggers.
    struct CountingCursor {
        inner: Cursor<Vec<u8>>,
        seeks: RefCell<usize>,
    }

    impl CountingCursor {
        fn new(data: Vec<u8>) -> Self {
            Self {
                inner: Cursor::new(data),
                seeks: RefCell::new(0),
            }
        }
    }

    impl Read for CountingCursor {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for CountingCursor {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            *self.seeks.borrow_mut() += 1;
            self.inner.seek(pos)
        }
    }

    #[test]
    fn sequential_reads_refill_without_seeking() {
        let data = b"abcdefghijklmnopqrstuvwxyz".to_vec();
        let counting = CountingCursor::new(data.clone());
        let mut source = BufferedSource::new(counting, 5).unwrap();

        // BufferedSource::new calls stream_position (seek), reset counter.
        source.backing.seeks.replace(0);

        let mut out = Vec::new();
        for n in [2, 3, 1, 9] {
            let mut chunk = vec![0u8; n];
            source.read_exact(&mut chunk).unwrap();
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, &data[0..15]);
        assert_eq!(*source.backing.seeks.borrow(), 0);

        // Absolute seek to 12, already within the window (window holds
        // [10, 15) after the refill that satisfied the 9-byte read).
        source.seek(SeekFrom::Start(12)).unwrap();
        let seeks_before = *source.backing.seeks.borrow();
        let mut chunk = [0u8; 3];
        source.read_exact(&mut chunk).unwrap();
        assert_eq!(&chunk, &data[12..15]);
        assert_eq!(*source.backing.seeks.borrow(), seeks_before);

        // Relative seek +1 from position 15 -> 16, outside the window.
        source.seek(SeekFrom::Current(1)).unwrap();
        let mut chunk = vec![0u8; 10];
        source.read_exact(&mut chunk).unwrap();
        assert_eq!(&chunk, &data[16..26]);
        assert_eq!(*source.backing.seeks.borrow(), seeks_before + 1);
    }

    #[test]
    fn in_window_seek_issues_zero_backing_seeks() {
        let data = b"0123456789".to_vec();
        let counting = CountingCursor::new(data);
        let mut source = BufferedSource::new(counting, 8).unwrap();
        source.backing.seeks.replace(0);

        let mut chunk = [0u8; 4];
        source.read_exact(&mut chunk).unwrap();

        let before = *source.backing.seeks.borrow();
        source.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(*source.backing.seeks.borrow(), before);
    }

    #[test]
    fn matches_unbuffered_reads_on_arbitrary_trace() {
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();

        let mut buffered = BufferedSource::new(Cursor::new(data.clone()), 16).unwrap();
        let mut direct = Cursor::new(data);

        let trace: &[(u64, usize)] = &[(0, 10), (10, 5), (100, 20), (50, 3), (900, 50), (0, 1)];

        for &(seek_to, read_len) in trace {
            buffered.seek(SeekFrom::Start(seek_to)).unwrap();
            direct.seek(SeekFrom::Start(seek_to)).unwrap();

            let mut a = vec![0u8; read_len];
            let mut b = vec![0u8; read_len];
            let na = buffered.read(&mut a).unwrap();
            let nb = direct.read(&mut b).unwrap();
            assert_eq!(na, nb);
            assert_eq!(a, b);
        }
    }

    proptest::proptest! {
        #[test]
        fn matches_direct_reads_for_arbitrary_traces(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512),
            window in 1usize..64,
            trace in proptest::collection::vec((0u64..600, 0usize..40), 0..30),
        ) {
            let mut buffered = BufferedSource::new(Cursor::new(data.clone()), window).unwrap();
            let mut direct = Cursor::new(data);

            for (seek_to, read_len) in trace {
                let a_ok = buffered.seek(SeekFrom::Start(seek_to)).is_ok();
                let b_ok = direct.seek(SeekFrom::Start(seek_to)).is_ok();
                proptest::prop_assert_eq!(a_ok, b_ok);

                let mut a = vec![0u8; read_len];
                let mut b = vec![0u8; read_len];
                let na = buffered.read(&mut a).unwrap_or(0);
                let nb = direct.read(&mut b).unwrap_or(0);
                proptest::prop_assert_eq!(na, nb);
                proptest::prop_assert_eq!(&a[..na], &b[..nb]);
            }
        }
    }
}
