// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    crate::{
        error::{InstallerError, Result},
        record::{encode_digest, HashAlgorithm, RecordEntry},
    },
    digest::DynDigest,
    std::io::Read,
};

/// A [Read] adapter that computes a content digest and size as data is read.
pub struct DigestingReader<R> {
    hasher: Box<dyn DynDigest>,
    source: R,
    bytes_read: u64,
}

impl<R> DigestingReader<R> {
    /// Construct a new instance computing the given digest flavor.
    pub fn new(source: R, algorithm: HashAlgorithm) -> Self {
        Self {
            hasher: algorithm.new_hasher(),
            source,
            bytes_read: 0,
        }
    }

    /// Finish the stream.
    ///
    /// Returns the source reader, the raw digest, and the number of bytes
    /// read.
    pub fn finish(self) -> (R, Vec<u8>, u64) {
        (self.source, self.hasher.finalize().to_vec(), self.bytes_read)
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.source.read(buf)?;

        if size > 0 {
            self.hasher.update(&buf[0..size]);
            self.bytes_read += size as u64;
        }

        Ok(size)
    }
}

/// A [Read] adapter that verifies a one-shot stream against a `RECORD` row.
///
/// The expected digest and size come from the row. Because a digest can only
/// be compared once all content is read, callers stream through this reader
/// and then call [Self::verify], which drains any remaining bytes and checks
/// the accumulated digest and size.
pub struct RecordValidatingReader<R> {
    source: R,
    hasher: Option<Box<dyn DynDigest>>,
    algorithm_name: String,
    expected_digest: Option<String>,
    expected_size: Option<u64>,
    path: String,
    bytes_read: u64,
}

impl<R: Read> RecordValidatingReader<R> {
    /// Create a new instance bound to a source stream and a `RECORD` row.
    ///
    /// Rows without a hash skip digest verification entirely. A row naming an
    /// algorithm outside `allowed` is refused up front.
    pub fn new(source: R, entry: &RecordEntry, allowed: &[HashAlgorithm]) -> Result<Self> {
        let (hasher, algorithm_name, expected_digest) = match &entry.hash {
            Some(hash) => {
                let algorithm = HashAlgorithm::from_name(&hash.name)
                    .filter(|a| allowed.contains(a))
                    .ok_or_else(|| InstallerError::DisallowedHashAlgorithm(hash.name.clone()))?;

                (
                    Some(algorithm.new_hasher()),
                    hash.name.clone(),
                    Some(hash.value.clone()),
                )
            }
            None => (None, String::new(), None),
        };

        Ok(Self {
            source,
            hasher,
            algorithm_name,
            expected_digest,
            expected_size: entry.size,
            path: entry.path.clone(),
            bytes_read: 0,
        })
    }

    /// Drain the stream and verify the digest and size seen against the
    /// `RECORD` row.
    pub fn verify(&mut self) -> Result<()> {
        let mut buf = [0u8; 65536];
        loop {
            if self.read(&mut buf)? == 0 {
                break;
            }
        }

        if let Some(expected) = self.expected_size {
            if self.bytes_read != expected {
                return Err(InstallerError::RecordMismatch {
                    path: self.path.clone(),
                    reason: format!(
                        "RECORD size is {}; archive streamed {} bytes",
                        expected, self.bytes_read
                    ),
                });
            }
        }

        if let Some(hasher) = self.hasher.take() {
            let digest = encode_digest(&hasher.finalize());
            let expected = self.expected_digest.as_deref().unwrap_or_default();

            if digest != expected {
                return Err(InstallerError::RecordMismatch {
                    path: self.path.clone(),
                    reason: format!(
                        "RECORD {} digest is {}; archive streamed {}",
                        self.algorithm_name, expected, digest
                    ),
                });
            }
        }

        Ok(())
    }
}

impl<R: Read> Read for RecordValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.source.read(buf)?;

        if size > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[0..size]);
            }
            self.bytes_read += size as u64;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::record::RecordHash};

    fn entry_for(data: &[u8]) -> RecordEntry {
        let mut hasher = HashAlgorithm::Sha256.new_hasher();
        hasher.update(data);

        RecordEntry {
            path: "pkg/module.py".to_string(),
            hash: Some(RecordHash::new("sha256", encode_digest(&hasher.finalize()))),
            size: Some(data.len() as u64),
        }
    }

    #[test]
    fn digesting_reader_counts_and_hashes() -> Result<()> {
        let data = b"some file content";
        let mut reader = DigestingReader::new(&data[..], HashAlgorithm::Sha256);

        let mut sink = Vec::new();
        std::io::copy(&mut reader, &mut sink)?;
        let (_, digest, size) = reader.finish();

        assert_eq!(sink, data);
        assert_eq!(size, data.len() as u64);

        let mut hasher = HashAlgorithm::Sha256.new_hasher();
        hasher.update(data);
        assert_eq!(digest, hasher.finalize().to_vec());

        Ok(())
    }

    #[test]
    fn validating_reader_accepts_matching_content() -> Result<()> {
        let data = b"matching bytes";
        let entry = entry_for(data);

        let mut reader =
            RecordValidatingReader::new(&data[..], &entry, &HashAlgorithm::default_allowed())?;
        let mut sink = Vec::new();
        std::io::copy(&mut reader, &mut sink)?;

        reader.verify()
    }

    #[test]
    fn validating_reader_verifies_unread_remainder() -> Result<()> {
        // verify() drains whatever the consumer did not read.
        let data = b"matching bytes";
        let entry = entry_for(data);

        let mut reader =
            RecordValidatingReader::new(&data[..], &entry, &HashAlgorithm::default_allowed())?;

        reader.verify()
    }

    #[test]
    fn validating_reader_rejects_digest_mismatch() -> Result<()> {
        let entry = entry_for(b"expected bytes");

        let mut reader = RecordValidatingReader::new(
            &b"different bytes"[..],
            &entry,
            &HashAlgorithm::default_allowed(),
        )?;

        match reader.verify() {
            Err(InstallerError::RecordMismatch { path, reason }) => {
                assert_eq!(path, "pkg/module.py");
                assert!(reason.contains("sha256"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn validating_reader_rejects_size_mismatch() -> Result<()> {
        let mut entry = entry_for(b"12345");
        entry.size = Some(3);

        let mut reader = RecordValidatingReader::new(
            &b"12345"[..],
            &entry,
            &HashAlgorithm::default_allowed(),
        )?;

        match reader.verify() {
            Err(InstallerError::RecordMismatch { reason, .. }) => {
                assert!(reason.contains("size"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn validating_reader_skips_rows_without_hash() -> Result<()> {
        let entry = RecordEntry {
            path: "pkg/module.py".to_string(),
            hash: None,
            size: None,
        };

        let mut reader = RecordValidatingReader::new(
            &b"anything at all"[..],
            &entry,
            &HashAlgorithm::default_allowed(),
        )?;

        reader.verify()
    }

    #[test]
    fn validating_reader_refuses_disallowed_algorithm() {
        let entry = RecordEntry {
            path: "pkg/module.py".to_string(),
            hash: Some(RecordHash::new("sha1", "zzzz")),
            size: Some(4),
        };

        let err = RecordValidatingReader::new(
            &b"data"[..],
            &entry,
            &HashAlgorithm::default_allowed(),
        )
        .err()
        .unwrap();

        match err {
            InstallerError::DisallowedHashAlgorithm(name) => assert_eq!(name, "sha1"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
