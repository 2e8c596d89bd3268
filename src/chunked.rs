//! Chunked reading of input files.
//!
//! Checkers never see a whole file. [`drive`] reads a [`Blob`] one bounded
//! chunk at a time and hands each chunk to a [`ChunkConsumer`], which keeps
//! all of its state between calls. Cancellation is checked before every
//! chunk.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::CheckError;

/// Default chunk size for FASTA files.
pub const FASTA_CHUNK_SIZE: usize = 1 << 10;
/// Default chunk size for motif and background files.
pub const MOTIF_CHUNK_SIZE: usize = 1 << 12;

/// Random-access byte source.
pub trait Blob {
    fn size(&self) -> u64;

    fn name(&self) -> Option<&str> {
        None
    }

    /// Replaces the contents of `buf` with the bytes `[offset, offset + len)`,
    /// truncated at the end of the blob.
    fn read_range(&mut self, offset: u64, len: usize, buf: &mut Vec<u8>) -> io::Result<()>;
}

/// A blob over bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemoryBlob<'a> {
    data: &'a [u8],
    name: Option<String>,
}

impl<'a> MemoryBlob<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, name: None }
    }

    pub fn with_name(data: &'a [u8], name: impl Into<String>) -> Self {
        Self {
            data,
            name: Some(name.into()),
        }
    }
}

impl Blob for MemoryBlob<'_> {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn read_range(&mut self, offset: u64, len: usize, buf: &mut Vec<u8>) -> io::Result<()> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        buf.clear();
        buf.extend_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// A blob backed by a file on disk.
#[derive(Debug)]
pub struct FileBlob {
    file: File,
    size: u64,
    name: Option<String>,
}

impl FileBlob {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok(Self { file, size, name })
    }
}

impl Blob for FileBlob {
    fn size(&self) -> u64 {
        self.size
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn read_range(&mut self, offset: u64, len: usize, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.clear();
        self.file.seek(SeekFrom::Start(offset))?;
        (&mut self.file).take(len as u64).read_to_end(buf)?;
        Ok(())
    }
}

/// What the driver should do after a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Send the next chunk.
    Continue,
    /// The consumer has reached its verdict.
    Finished,
    /// The consumer was cancelled.
    Cancelled,
    /// Streaming could not decide; the consumer wants the whole file at once.
    NeedWholeFile,
}

/// A state machine fed one chunk at a time.
pub trait ChunkConsumer {
    /// Called once before the first chunk.
    fn begin(&mut self, size: u64, name: Option<&str>);

    /// Processes the chunk starting at byte `offset`.
    fn consume(&mut self, chunk: &[u8], offset: u64, is_last: bool) -> Result<Flow, CheckError>;

    fn is_cancelled(&self) -> bool;
}

/// Shared cancellation flag.
///
/// Clones share the flag, so a handler (or another thread) holding a clone
/// can stop the checker that owns the original.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Feeds `blob` to `consumer` in chunks of `chunk_size` bytes.
///
/// The chunk that reaches the end of the blob is flagged as the last one;
/// an empty blob produces a single empty last chunk.
pub fn drive<B, C>(blob: &mut B, consumer: &mut C, chunk_size: usize) -> Result<Flow, CheckError>
where
    B: Blob + ?Sized,
    C: ChunkConsumer + ?Sized,
{
    let chunk_size = chunk_size.max(1);
    let size = blob.size();
    consumer.begin(size, blob.name());
    let mut offset = 0u64;
    let mut buf = Vec::with_capacity(chunk_size);
    loop {
        if consumer.is_cancelled() {
            log::debug!("Cancelled before reading offset {}", offset);
            return Ok(Flow::Cancelled);
        }
        blob.read_range(offset, chunk_size, &mut buf)?;
        let is_last = offset + chunk_size as u64 >= size;
        log::trace!("Chunk at offset {} ({} bytes{})", offset, buf.len(), if is_last { ", last" } else { "" });
        match consumer.consume(&buf, offset, is_last)? {
            Flow::Continue if !is_last => offset += chunk_size as u64,
            Flow::Continue => return Ok(Flow::Finished),
            other => return Ok(other),
        }
    }
}

/// Reads the whole blob, for consumers that gave up on streaming.
pub fn read_whole<B: Blob + ?Sized>(blob: &mut B) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    blob.read_range(0, blob.size() as usize, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Default)]
    struct Recorder {
        size: u64,
        chunks: Vec<(u64, Vec<u8>, bool)>,
        stop_after: Option<usize>,
        cancel: CancelToken,
    }

    impl ChunkConsumer for Recorder {
        fn begin(&mut self, size: u64, _name: Option<&str>) {
            self.size = size;
        }

        fn consume(&mut self, chunk: &[u8], offset: u64, is_last: bool) -> Result<Flow, CheckError> {
            self.chunks.push((offset, chunk.to_vec(), is_last));
            if Some(self.chunks.len()) == self.stop_after {
                self.cancel.cancel();
            }
            Ok(Flow::Continue)
        }

        fn is_cancelled(&self) -> bool {
            self.cancel.is_cancelled()
        }
    }

    #[test]
    fn test_chunks_cover_blob() {
        let data = b"0123456789";
        let mut recorder = Recorder::default();
        let flow = drive(&mut MemoryBlob::new(data), &mut recorder, 4).unwrap();
        assert_eq!(flow, Flow::Finished);
        assert_eq!(recorder.size, 10);
        assert_eq!(
            recorder.chunks,
            vec![
                (0, b"0123".to_vec(), false),
                (4, b"4567".to_vec(), false),
                (8, b"89".to_vec(), true),
            ]
        );
    }

    #[test]
    fn test_exact_multiple_and_empty() {
        let mut recorder = Recorder::default();
        drive(&mut MemoryBlob::new(b"abcd"), &mut recorder, 4).unwrap();
        assert_eq!(recorder.chunks, vec![(0, b"abcd".to_vec(), true)]);

        let mut recorder = Recorder::default();
        drive(&mut MemoryBlob::new(b""), &mut recorder, 4).unwrap();
        assert_eq!(recorder.chunks, vec![(0, Vec::new(), true)]);
    }

    #[test]
    fn test_cancel_stops_reading() {
        let mut recorder = Recorder {
            stop_after: Some(2),
            ..Recorder::default()
        };
        let flow = drive(&mut MemoryBlob::new(&[b'x'; 100]), &mut recorder, 10).unwrap();
        assert_eq!(flow, Flow::Cancelled);
        assert_eq!(recorder.chunks.len(), 2);
    }

    #[test]
    fn test_file_blob() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b">seq\nACGT\n").unwrap();
        let mut blob = FileBlob::open(file.path()).unwrap();
        assert_eq!(blob.size(), 10);
        let mut recorder = Recorder::default();
        drive(&mut blob, &mut recorder, 3).unwrap();
        let joined: Vec<u8> = recorder.chunks.iter().flat_map(|(_, c, _)| c.clone()).collect();
        assert_eq!(joined, b">seq\nACGT\n");
        assert_eq!(read_whole(&mut blob).unwrap(), b">seq\nACGT\n");
    }
}
