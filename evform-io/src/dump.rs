//! Chunked binary hit dumps.
//!
//! A dump is a sequence of files `<stem>_00000.dump`, `<stem>_00001.dump`, ...
//! Each starts with a 16-byte header (magic, format version, record size)
//! followed by hit records in the [`readout`](crate::readout) layout. A new
//! chunk is started once the current one would exceed the configured size.

use crate::readout::{decode_hit, encode_hit, RECORD_SIZE};
use crate::{Error, Result};
use evform_core::trace::{targets, Trace};
use evform_core::Hit;
use log::Level;
use memmap2::Mmap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File magic.
pub const DUMP_MAGIC: [u8; 8] = *b"EVFMDUMP";

/// Current format version.
pub const DUMP_VERSION: u32 = 1;

/// Size of the chunk header.
pub const HEADER_SIZE: usize = 16;

/// Default chunk size limit (1 GiB).
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 1 << 30;

#[allow(clippy::cast_possible_truncation)]
fn header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..8].copy_from_slice(&DUMP_MAGIC);
    header[8..12].copy_from_slice(&DUMP_VERSION.to_le_bytes());
    header[12..16].copy_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
    header
}

/// Path of chunk `chunk` for `stem`.
#[must_use]
pub fn chunk_path(stem: &Path, chunk: u32) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(format!("_{chunk:05}.dump"));
    PathBuf::from(name)
}

/// Existing chunks of `stem`, in order, stopping at the first gap.
#[must_use]
pub fn chunk_paths(stem: &Path) -> Vec<PathBuf> {
    (0..)
        .map(|chunk| chunk_path(stem, chunk))
        .take_while(|path| path.is_file())
        .collect()
}

/// Append-only writer rotating over size-limited chunks.
pub struct DumpWriter {
    stem: PathBuf,
    max_chunk_bytes: u64,
    chunk: u32,
    written: u64,
    writer: BufWriter<File>,
    paths: Vec<PathBuf>,
    record: Vec<u8>,
    trace: Trace,
}

impl DumpWriter {
    /// Creates the first chunk of a dump.
    ///
    /// # Errors
    /// Returns an error if the chunk cannot be created.
    pub fn create<P: AsRef<Path>>(stem: P) -> Result<Self> {
        Self::with_max_chunk_bytes(stem, DEFAULT_MAX_CHUNK_BYTES)
    }

    /// Creates a dump whose chunks hold at most `max_chunk_bytes`, but always
    /// at least one record.
    ///
    /// # Errors
    /// Returns an error if the chunk cannot be created.
    pub fn with_max_chunk_bytes<P: AsRef<Path>>(stem: P, max_chunk_bytes: u64) -> Result<Self> {
        let stem = stem.as_ref().to_path_buf();
        let path = chunk_path(&stem, 0);
        let writer = Self::open_chunk(&path)?;
        Ok(Self {
            stem,
            max_chunk_bytes: max_chunk_bytes.max((HEADER_SIZE + RECORD_SIZE) as u64),
            chunk: 0,
            written: HEADER_SIZE as u64,
            writer,
            paths: vec![path],
            record: Vec::with_capacity(RECORD_SIZE),
            trace: Trace::new(targets::DUMP),
        })
    }

    /// Replaces the logging context.
    #[must_use]
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    fn open_chunk(path: &Path) -> Result<BufWriter<File>> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&header())?;
        Ok(writer)
    }

    fn rotate(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.chunk += 1;
        let path = chunk_path(&self.stem, self.chunk);
        self.writer = Self::open_chunk(&path)?;
        self.paths.push(path);
        self.written = HEADER_SIZE as u64;
        if self.trace.enabled(Level::Debug) {
            log::debug!(target: self.trace.target(), "dump rotated to chunk {}", self.chunk);
        }
        Ok(())
    }

    /// Appends hits, rotating chunks as needed.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_hits(&mut self, hits: &[Hit]) -> Result<()> {
        for hit in hits {
            if self.written + RECORD_SIZE as u64 > self.max_chunk_bytes {
                self.rotate()?;
            }
            self.record.clear();
            encode_hit(hit, &mut self.record);
            self.writer.write_all(&self.record)?;
            self.written += RECORD_SIZE as u64;
        }
        Ok(())
    }

    /// Chunks written so far.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the chunk paths.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.flush()?;
        Ok(self.paths)
    }
}

/// Memory-mapped reader of one dump chunk.
pub struct DumpReader {
    mmap: Mmap,
    path: PathBuf,
}

impl DumpReader {
    /// Maps a chunk and validates its header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, the header does not
    /// match, or the body is not a whole number of records.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let path = path.as_ref().to_path_buf();

        if mmap.len() < HEADER_SIZE || mmap[..HEADER_SIZE] != header() {
            return Err(Error::InvalidFormat(format!(
                "{} is not a version {DUMP_VERSION} hit dump",
                path.display()
            )));
        }
        if (mmap.len() - HEADER_SIZE) % RECORD_SIZE != 0 {
            return Err(Error::InvalidFormat(format!(
                "{} has a truncated record",
                path.display()
            )));
        }
        Ok(Self { mmap, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.mmap.len() - HEADER_SIZE) / RECORD_SIZE
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded hits, skipping records on the reserved plane.
    pub fn hits(&self) -> impl Iterator<Item = Hit> + '_ {
        self.mmap[HEADER_SIZE..]
            .chunks_exact(RECORD_SIZE)
            .filter_map(decode_hit)
    }
}

/// Reads every chunk of the dump at `stem`.
///
/// # Errors
/// Returns an error if no chunk exists or one is invalid.
pub fn read_dump<P: AsRef<Path>>(stem: P) -> Result<Vec<Hit>> {
    let paths = chunk_paths(stem.as_ref());
    if paths.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "no dump chunks for {}",
            stem.as_ref().display()
        )));
    }
    let mut hits = Vec::new();
    for path in paths {
        hits.extend(DumpReader::open(path)?.hits());
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(count: u64) -> Vec<Hit> {
        (0..count)
            .map(|i| Hit::new(i * 10, (i % 2) as u8, i as u16, 7))
            .collect()
    }

    #[test]
    fn test_chunk_path_format() {
        let path = chunk_path(Path::new("/tmp/run"), 3);
        assert_eq!(path, PathBuf::from("/tmp/run_00003.dump"));
    }

    #[test]
    fn test_write_and_read_single_chunk() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("run");
        let mut writer = DumpWriter::create(&stem).unwrap();
        writer.write_hits(&sample(5)).unwrap();
        let paths = writer.finish().unwrap();
        assert_eq!(paths.len(), 1);

        let reader = DumpReader::open(&paths[0]).unwrap();
        assert_eq!(reader.len(), 5);
        assert_eq!(reader.hits().collect::<Vec<_>>(), sample(5));
    }

    #[test]
    fn test_rotation() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("run");
        // Header plus two records per chunk.
        let mut writer =
            DumpWriter::with_max_chunk_bytes(&stem, (HEADER_SIZE + 2 * RECORD_SIZE) as u64)
                .unwrap();
        writer.write_hits(&sample(5)).unwrap();
        let paths = writer.finish().unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(chunk_paths(&stem), paths);
        assert_eq!(DumpReader::open(&paths[2]).unwrap().len(), 1);
        assert_eq!(read_dump(&stem).unwrap(), sample(5));
    }

    #[test]
    fn test_empty_dump_has_header_only() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("empty");
        let paths = DumpWriter::create(&stem).unwrap().finish().unwrap();
        let reader = DumpReader::open(&paths[0]).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_bad_header_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus_00000.dump");
        std::fs::write(&path, [0u8; 32]).unwrap();
        assert!(matches!(
            DumpReader::open(&path),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_missing_dump() {
        let dir = tempdir().unwrap();
        assert!(read_dump(dir.path().join("absent")).is_err());
    }
}
