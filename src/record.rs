// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parsing and writing of PEP 376 `RECORD` manifests.

A `RECORD` file is CSV with 3 columns: an installed path, an optional content
digest of the form `<algorithm>=<urlsafe-base64-digest>`, and an optional file
size in bytes. The digest and size columns are empty for directory
placeholders and for the `RECORD` file's own row.
*/

use {
    crate::error::{InstallerError, Result},
    digest::DynDigest,
};

/// Digest algorithms the record codec knows how to compute.
///
/// Names correspond to the lowercase identifiers used in `RECORD` hash
/// fields.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Resolve an algorithm from its `RECORD` identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha224" => Some(Self::Sha224),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// The identifier used in `RECORD` hash fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Create a new hasher computing this digest flavor.
    pub fn new_hasher(&self) -> Box<dyn DynDigest> {
        match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha224 => Box::new(sha2::Sha224::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha384 => Box::new(sha2::Sha384::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }

    /// The algorithms accepted for validation unless a caller configures
    /// otherwise.
    ///
    /// `md5` and `sha1` are rejected as insecure.
    pub fn default_allowed() -> Vec<Self> {
        vec![Self::Sha224, Self::Sha256, Self::Sha384, Self::Sha512]
    }
}

fn base64_engine() -> impl base64::engine::Engine {
    base64::engine::fast_portable::FastPortable::from(
        &base64::alphabet::URL_SAFE,
        base64::engine::fast_portable::FastPortableConfig::new().with_encode_padding(false),
    )
}

/// Encode a raw digest the way `RECORD` hash fields expect: urlsafe base64
/// with trailing `=` padding stripped.
pub fn encode_digest(digest: &[u8]) -> String {
    base64::encode_engine(digest, &base64_engine())
}

/// The hash element of a `RECORD` row.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordHash {
    /// Lowercase algorithm identifier.
    pub name: String,
    /// Unpadded urlsafe-base64 digest value.
    pub value: String,
}

impl RecordHash {
    pub fn new(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Parse a `name=value` hash field.
    pub fn parse(s: &str) -> Option<Self> {
        let (name, value) = s.split_once('=')?;

        if name.is_empty() || value.is_empty() {
            None
        } else {
            Some(Self::new(name, value))
        }
    }
}

impl std::fmt::Display for RecordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A single row in a `RECORD` file.
///
/// `hash` and `size` are both present for regular installed files and both
/// absent for directory placeholders and the `RECORD` file's own row. An
/// empty textual field parses to `None`, preserving the distinction between
/// an empty column and a `0`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordEntry {
    /// Installed path, always with `/` separators.
    pub path: String,
    pub hash: Option<RecordHash>,
    pub size: Option<u64>,
}

impl RecordEntry {
    /// Build an entry from the textual elements of a `RECORD` row.
    ///
    /// `row` is the 0-based row index, used for error context. All element
    /// problems are collected into a single error rather than reporting only
    /// the first.
    pub fn from_elements(row: usize, path: &str, hash: &str, size: &str) -> Result<Self> {
        let mut issues = Vec::new();

        if path.is_empty() {
            issues.push("`path` cannot be empty");
        }

        let hash_value = if hash.is_empty() {
            None
        } else {
            match RecordHash::parse(hash) {
                Some(h) => Some(h),
                None => {
                    issues.push("`hash` does not follow the required format");
                    None
                }
            }
        };

        let size_value = if size.is_empty() {
            None
        } else {
            match size.parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    issues.push("`size` cannot be non-integer");
                    None
                }
            }
        };

        if hash_value.is_some() && size.is_empty() {
            issues.push("`size` must be present when `hash` is");
        }

        if issues.is_empty() {
            Ok(Self {
                path: path.to_string(),
                hash: hash_value,
                size: size_value,
            })
        } else {
            Err(InstallerError::InvalidRecordEntry {
                row,
                content: format!("{},{},{}", path, hash, size),
                issues: issues.join(", "),
            })
        }
    }

    /// Whether `data` matches this entry's hash and size.
    ///
    /// A mismatch returns `Ok(false)`. An error is only raised when the named
    /// algorithm is unknown or outside `allowed`.
    pub fn validate(&self, data: &[u8], allowed: &[HashAlgorithm]) -> Result<bool> {
        if let Some(size) = self.size {
            if data.len() as u64 != size {
                return Ok(false);
            }
        }

        if let Some(hash) = &self.hash {
            let algorithm = HashAlgorithm::from_name(&hash.name)
                .filter(|a| allowed.contains(a))
                .ok_or_else(|| InstallerError::DisallowedHashAlgorithm(hash.name.clone()))?;

            let mut hasher = algorithm.new_hasher();
            hasher.update(data);

            return Ok(encode_digest(&hasher.finalize()) == hash.value);
        }

        Ok(true)
    }
}

/// Lazily parse the rows of a `RECORD` file.
///
/// Yields entries in file order. Rows must have exactly 3 CSV fields;
/// anything else is an [InstallerError::InvalidRecordEntry] identifying the
/// row. Blank lines are skipped.
pub fn parse_record_file(data: &str) -> RecordFileParser<'_> {
    RecordFileParser { data, pos: 0, row: 0 }
}

/// Iterator state for [parse_record_file].
pub struct RecordFileParser<'a> {
    data: &'a str,
    pos: usize,
    row: usize,
}

impl<'a> Iterator for RecordFileParser<'a> {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.data.len() {
                return None;
            }

            let start = self.pos;
            let row = self.row;
            self.row += 1;

            let fields = match parse_csv_row(self.data, &mut self.pos) {
                Ok(fields) => fields,
                Err(issue) => {
                    return Some(Err(InstallerError::InvalidRecordEntry {
                        row,
                        content: row_content(self.data, start, self.pos),
                        issues: issue,
                    }));
                }
            };

            if fields.len() == 1 && fields[0].is_empty() {
                continue;
            }

            if fields.len() != 3 {
                return Some(Err(InstallerError::InvalidRecordEntry {
                    row,
                    content: row_content(self.data, start, self.pos),
                    issues: format!("expected 3 elements, got {}", fields.len()),
                }));
            }

            return Some(RecordEntry::from_elements(
                row, &fields[0], &fields[1], &fields[2],
            ));
        }
    }
}

fn row_content(data: &str, start: usize, end: usize) -> String {
    data[start..end]
        .trim_end_matches(|c| c == '\r' || c == '\n')
        .to_string()
}

/// Consume one CSV record starting at `*pos`, leaving `*pos` just past its
/// line terminator. Implements the RFC 4180 subset `RECORD` files use:
/// double-quoted fields with doubled-quote escapes.
fn parse_csv_row(data: &str, pos: &mut usize) -> std::result::Result<Vec<String>, String> {
    let s = &data[*pos..];
    let base = *pos;
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut iter = s.char_indices().peekable();

    loop {
        match iter.next() {
            None => {
                *pos = data.len();
                fields.push(field);
                return Ok(fields);
            }
            Some((_, '"')) if field.is_empty() => {
                loop {
                    match iter.next() {
                        None => {
                            *pos = data.len();
                            return Err("unterminated quoted field".to_string());
                        }
                        Some((_, '"')) => {
                            if let Some(&(_, '"')) = iter.peek() {
                                iter.next();
                                field.push('"');
                            } else {
                                break;
                            }
                        }
                        Some((_, c)) => field.push(c),
                    }
                }

                match iter.next() {
                    None => {
                        *pos = data.len();
                        fields.push(field);
                        return Ok(fields);
                    }
                    Some((_, ',')) => {
                        fields.push(std::mem::take(&mut field));
                    }
                    Some((i, '\n')) => {
                        *pos = base + i + 1;
                        fields.push(field);
                        return Ok(fields);
                    }
                    Some((i, '\r')) => {
                        *pos = consume_line_end(&mut iter, base, i);
                        fields.push(field);
                        return Ok(fields);
                    }
                    Some((i, c)) => {
                        // Skip ahead to the next row so iteration can resume.
                        *pos = match s[i..].find('\n') {
                            Some(n) => base + i + n + 1,
                            None => data.len(),
                        };
                        return Err(format!("unexpected character {:?} after quoted field", c));
                    }
                }
            }
            Some((_, ',')) => {
                fields.push(std::mem::take(&mut field));
            }
            Some((i, '\n')) => {
                *pos = base + i + 1;
                fields.push(field);
                return Ok(fields);
            }
            Some((i, '\r')) => {
                *pos = consume_line_end(&mut iter, base, i);
                fields.push(field);
                return Ok(fields);
            }
            Some((_, c)) => field.push(c),
        }
    }
}

fn consume_line_end(
    iter: &mut std::iter::Peekable<std::str::CharIndices>,
    base: usize,
    cr_index: usize,
) -> usize {
    if let Some(&(_, '\n')) = iter.peek() {
        iter.next();
        base + cr_index + 2
    } else {
        base + cr_index + 1
    }
}

fn needs_quoting(field: &str) -> bool {
    field.contains(|c| c == ',' || c == '"' || c == '\r' || c == '\n')
}

fn push_field(out: &mut String, field: &str) {
    if needs_quoting(field) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// Serialize entries back to `RECORD` file content.
///
/// Fields are quoted only when they contain a comma, quote, or line break.
/// Every row is terminated with `\n`, including the last.
pub fn serialize_record_file(entries: &[RecordEntry]) -> Vec<u8> {
    let mut out = String::new();

    for entry in entries {
        push_field(&mut out, &entry.path);
        out.push(',');
        if let Some(hash) = &entry.hash {
            push_field(&mut out, &hash.to_string());
        }
        out.push(',');
        if let Some(size) = entry.size {
            out.push_str(&size.to_string());
        }
        out.push('\n');
    }

    out.into_bytes()
}
