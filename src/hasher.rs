//! Streaming BLAKE3 content hashing.
//!
//! Files are read in fixed-size chunks so peak memory stays bounded no matter
//! how large the file is. The digest depends only on the bytes read.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::DEFAULT_HASH_CHUNK_BYTES;
use crate::error::HashError;
use crate::{Error, Result};

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = blake3::OUT_LEN;

/// Content fingerprint of a file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex representation (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        blake3::Hash::from_hex(s)
            .map(Self::from)
            .map_err(|e| Error::internal(format!("invalid digest '{s}': {e}")))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash an in-memory buffer with the same algorithm used for files.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    blake3::hash(bytes).into()
}

/// File hasher with a configurable read buffer.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    chunk_bytes: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_CHUNK_BYTES)
    }
}

impl ContentHasher {
    /// Create a hasher that reads `chunk_bytes` at a time.
    ///
    /// A zero chunk size is bumped to one byte.
    #[must_use]
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Configured read buffer size.
    #[must_use]
    pub const fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Hash a file, blocking the current thread on I/O.
    ///
    /// Makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// - [`HashError::NotFound`] if the file vanished before or during the read
    /// - [`HashError::NotAFile`] if the path is a directory or special file
    /// - [`HashError::Io`] for any other open or read failure
    pub fn hash_file(&self, path: &Path) -> std::result::Result<Digest, HashError> {
        // Opening a FIFO blocks until a writer shows up, so check the type first
        let metadata = std::fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(HashError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.chunk_bytes];

        loop {
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize().into())
    }

    /// Hash a file on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns the hashing error, or [`Error::Internal`] if the blocking task
    /// was cancelled or panicked.
    pub async fn hash_file_async(&self, path: &Path) -> Result<Digest> {
        let hasher = *self;
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || hasher.hash_file(&path))
            .await
            .map_err(|e| Error::internal(format!("hash task failed: {e}")))?
            .map_err(Error::from)
    }
}
