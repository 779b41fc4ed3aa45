//! Persisted index artifact.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic      8 bytes  "CMIDX\0\0\x01"
//! version    u32
//! card_ids   u64 count, then per id: u32 byte length + UTF-8
//! embeddings u32 ndim, ndim × u64 shape, then product(shape) × f32
//! metadata   u8 present flag; if 1: u64 count, then length-prefixed UTF-8
//! ```
//!
//! The loader only checks that the file decodes. Whether the three
//! sequences line up is checked when the artifact is opened for search,
//! so a misaligned file is reported as malformed rather than corrupt.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::IndexError;

/// File signature
pub const MAGIC: &[u8; 8] = b"CMIDX\0\0\x01";

/// Current format version
pub const FORMAT_VERSION: u32 = 1;

/// In-memory form of the index artifact.
///
/// `embeddings` is the row-major matrix described by `shape`; a
/// well-formed index has `shape == [N, D]` with `N == card_ids.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingIndex {
    pub card_ids: Vec<String>,
    pub shape: Vec<usize>,
    pub embeddings: Vec<f32>,
    /// Serialized catalog rows; None when no metadata channel was written
    pub metadata_json: Option<Vec<String>>,
}

impl Default for EmbeddingIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl EmbeddingIndex {
    /// An index with no rows (shape 0×0).
    pub fn empty() -> Self {
        Self {
            card_ids: Vec::new(),
            shape: vec![0, 0],
            embeddings: Vec::new(),
            metadata_json: Some(Vec::new()),
        }
    }

    /// Assemble an artifact from aligned rows.
    ///
    /// All vectors must share one dimension. No rows gives the empty index.
    pub fn from_rows(
        card_ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        metadata_json: Vec<String>,
    ) -> Result<Self, IndexError> {
        if card_ids.len() != vectors.len() || metadata_json.len() != vectors.len() {
            return Err(IndexError::Malformed(format!(
                "{} card ids, {} vectors, {} metadata rows",
                card_ids.len(),
                vectors.len(),
                metadata_json.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Ok(Self::empty());
        };

        let dim = first.len();
        let mut embeddings = Vec::with_capacity(vectors.len() * dim);
        for vector in &vectors {
            if vector.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
            embeddings.extend_from_slice(vector);
        }

        Ok(Self {
            card_ids,
            shape: vec![vectors.len(), dim],
            embeddings,
            metadata_json: Some(metadata_json),
        })
    }

    /// Number of matrix rows (0 if the matrix has no dimensions).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Vector dimension (0 unless the matrix is 2-dimensional).
    pub fn dimension(&self) -> usize {
        if self.shape.len() == 2 {
            self.shape[1]
        } else {
            0
        }
    }

    /// Write the artifact to `path`, replacing any existing file.
    ///
    /// Bytes go to a sibling temp file first and are renamed into place,
    /// so readers never observe a partially written index.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let bytes = self.encode();
        let tmp_path = temp_sibling(path);
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        info!(
            path = %path.display(),
            rows = self.rows(),
            dim = self.dimension(),
            bytes = bytes.len(),
            "Wrote index"
        );
        Ok(())
    }

    /// Read an artifact from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let index = Self::decode(&bytes)?;
        debug!(path = %path.display(), rows = index.rows(), "Loaded index");
        Ok(index)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.embeddings.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

        write_strings(&mut out, &self.card_ids);

        out.extend_from_slice(&(self.shape.len() as u32).to_le_bytes());
        for extent in &self.shape {
            out.extend_from_slice(&(*extent as u64).to_le_bytes());
        }
        for value in &self.embeddings {
            out.extend_from_slice(&value.to_le_bytes());
        }

        match &self.metadata_json {
            Some(rows) => {
                out.push(1);
                write_strings(&mut out, rows);
            }
            None => out.push(0),
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(MAGIC.len())? != MAGIC {
            return Err(IndexError::Corrupt("not a cardmatch index file".to_string()));
        }
        let version = reader.u32()?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }

        let card_ids = reader.strings()?;

        let ndim = reader.u32()? as usize;
        let mut shape = Vec::with_capacity(ndim.min(8));
        for _ in 0..ndim {
            shape.push(reader.len_u64()?);
        }
        // A zero-dimensional array still holds one scalar.
        let count = shape
            .iter()
            .try_fold(1usize, |acc, extent| acc.checked_mul(*extent))
            .filter(|count| count.checked_mul(4).is_some_and(|b| b <= reader.remaining()))
            .ok_or_else(|| IndexError::Corrupt("embedding matrix exceeds file size".to_string()))?;
        let embeddings = reader
            .take(count * 4)?
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let metadata_json = match reader.u8()? {
            0 => None,
            1 => Some(reader.strings()?),
            flag => {
                return Err(IndexError::Corrupt(format!(
                    "invalid metadata flag {}",
                    flag
                )))
            }
        };

        if reader.remaining() != 0 {
            return Err(IndexError::Corrupt(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }

        Ok(Self {
            card_ids,
            shape,
            embeddings,
            metadata_json,
        })
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_strings(out: &mut Vec<u8>, values: &[String]) {
    out.extend_from_slice(&(values.len() as u64).to_le_bytes());
    for value in values {
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }
}

/// Bounds-checked cursor over the artifact bytes.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IndexError> {
        if n > self.remaining() {
            return Err(IndexError::Corrupt(format!(
                "unexpected end of file at byte {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, IndexError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, IndexError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, IndexError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn len_u64(&mut self) -> Result<usize, IndexError> {
        usize::try_from(self.u64()?)
            .map_err(|_| IndexError::Corrupt("length does not fit in memory".to_string()))
    }

    fn strings(&mut self) -> Result<Vec<String>, IndexError> {
        let count = self.len_u64()?;
        // Every entry needs at least its 4-byte length prefix.
        if count.saturating_mul(4) > self.remaining() {
            return Err(IndexError::Corrupt(format!(
                "string count {} exceeds file size",
                count
            )));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.u32()? as usize;
            let raw = self.take(len)?;
            let value = std::str::from_utf8(raw)
                .map_err(|e| IndexError::Corrupt(format!("invalid UTF-8: {}", e)))?;
            values.push(value.to_string());
        }
        Ok(values)
    }
}
