//! Raw PCM input
//!
//! Headerless interleaved 16-bit signed little-endian samples.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::pipeline::SampleSource;

/// Open PCM file. Dropping it closes the file.
pub struct PcmReader {
    reader: BufReader<File>,
    path: PathBuf,
    bytes: Vec<u8>,
}

impl PcmReader {
    /// Open `path` for binary reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        tracing::debug!("Opened PCM input {:?}", path);
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            bytes: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fill `buf` with up to `buf.len()` samples and return how many were
    /// read. Short counts only happen at end of input; `0` means the input
    /// is exhausted. A dangling odd byte at the end is dropped.
    pub fn read_chunk(&mut self, buf: &mut [i16]) -> io::Result<usize> {
        let want = buf.len() * 2;
        self.bytes.resize(want, 0);

        let mut filled = 0;
        while filled < want {
            match self.reader.read(&mut self.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let samples = filled / 2;
        for (dst, src) in buf.iter_mut().zip(self.bytes[..samples * 2].chunks_exact(2)) {
            *dst = i16::from_le_bytes([src[0], src[1]]);
        }
        Ok(samples)
    }
}

impl SampleSource for PcmReader {
    fn path(&self) -> &Path {
        PcmReader::path(self)
    }

    fn read_chunk(&mut self, buf: &mut [i16]) -> io::Result<usize> {
        PcmReader::read_chunk(self, buf)
    }
}

/// Encode samples as raw little-endian PCM bytes.
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
