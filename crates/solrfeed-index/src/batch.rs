//! Forward-only line source and fixed-size batching.

use std::io::{self, BufRead};
use std::iter::FusedIterator;
use std::num::NonZeroUsize;

use crate::record::RawLine;

/// Default number of documents per published batch.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(10_000).unwrap();

/// Upper bound on up-front batch allocation; larger batches grow on demand.
const MAX_PREALLOC: usize = 16 * 1024;

/// Initial capacity for the per-line read buffer
const LINE_BUF_CAPACITY: usize = 4096;

/// Iterator over the lines of a reader, trailing `\n` stripped.
///
/// Bytes are passed through undecoded so that invalid text surfaces as a
/// parse error with a line number rather than an I/O error.
pub struct RawLines<R> {
    reader: R,
    buf: Vec<u8>,
    failed: bool,
}

impl<R: BufRead> RawLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(LINE_BUF_CAPACITY),
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for RawLines<R> {
    type Item = io::Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let line = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
                Some(Ok(line.to_vec()))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> FusedIterator for RawLines<R> {}

/// Group a fallible stream into batches of `size`; see [`Batches`].
pub fn batches<I, T, E>(items: I, size: NonZeroUsize) -> Batches<I::IntoIter, E>
where
    I: IntoIterator<Item = Result<T, E>>,
{
    Batches {
        inner: items.into_iter(),
        size,
        deferred: None,
        done: false,
    }
}

/// Lazy batching adapter.
///
/// Yields `Vec`s of exactly `size` items except the last, which holds the
/// remainder. Never yields an empty batch. If the source fails mid-batch,
/// the items read so far come out first as a short batch and the error on
/// the following call; the adapter is exhausted afterwards.
pub struct Batches<I, E> {
    inner: I,
    size: NonZeroUsize,
    deferred: Option<E>,
    done: bool,
}

impl<I, T, E> Iterator for Batches<I, E>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }

        let size = self.size.get();
        let mut batch = Vec::with_capacity(size.min(MAX_PREALLOC));
        while batch.len() < size {
            match self.inner.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    if batch.is_empty() {
                        return Some(Err(e));
                    }
                    self.deferred = Some(e);
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

impl<I, T, E> FusedIterator for Batches<I, E> where I: Iterator<Item = Result<T, E>> {}
