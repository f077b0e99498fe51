//! Content hashing and on-disk verification

use crate::config::HashAlgorithm;
use crate::ledger::LedgerEntry;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Outcome of checking a ledger entry against the file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCheck {
    /// File exists and its hash matches the ledger
    Intact,

    /// File is gone
    Missing,

    /// File exists but its bytes no longer match the ledger
    Corrupt { expected: String, actual: String },
}

impl HashAlgorithm {
    /// Guesses the algorithm that produced a hex digest from its length
    pub fn from_digest(digest: &str) -> Option<Self> {
        match digest.len() {
            64 => Some(Self::Sha256),
            32 => Some(Self::Md5),
            _ => None,
        }
    }

    /// Hex digest of an in-memory buffer
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Md5 => hex::encode(Md5::digest(bytes)),
        }
    }

    /// Hex digest of a file, streamed in fixed-size chunks
    pub fn digest_file(&self, path: &Path) -> io::Result<String> {
        let reader = BufReader::new(File::open(path)?);
        match self {
            Self::Sha256 => digest_reader::<Sha256, _>(reader),
            Self::Md5 => digest_reader::<Md5, _>(reader),
        }
    }
}

fn digest_reader<D: Digest, R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Re-hashes the file a ledger entry points at
///
/// Entries written under a different `hash-algorithm` setting are checked
/// with the algorithm their digest length implies; `algorithm` is the
/// fallback when the length is unrecognised.
pub fn verify_entry(entry: &LedgerEntry, algorithm: HashAlgorithm) -> io::Result<FileCheck> {
    let algorithm = HashAlgorithm::from_digest(&entry.content_hash).unwrap_or(algorithm);
    let actual = match algorithm.digest_file(&entry.local_path) {
        Ok(hash) => hash,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileCheck::Missing),
        Err(e) => return Err(e),
    };

    if actual.eq_ignore_ascii_case(&entry.content_hash) {
        Ok(FileCheck::Intact)
    } else {
        Ok(FileCheck::Corrupt {
            expected: entry.content_hash.clone(),
            actual,
        })
    }
}
