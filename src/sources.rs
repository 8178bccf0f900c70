// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Read wheel archives.

[WheelSource] abstracts where wheel content comes from. [WheelFile] is the
ZIP-backed implementation for `.whl` files on the filesystem. Content
enumeration is an explicit cursor yielding one-shot streams, so arbitrarily
large wheels install in bounded memory.
*/

use {
    crate::{
        error::{InstallerError, Result},
        layout::{canonicalize_name, escape_version, parse_wheel_filename, Scheme},
        metadata::WheelMetadata,
        record::{parse_record_file, RecordEntry},
    },
    log::warn,
    std::{
        collections::HashSet,
        fs::File,
        io::{BufReader, Read},
        path::Path,
    },
    zip::{result::ZipError, ZipArchive},
};

/// The unit of content delivered by a wheel source.
///
/// `record` is the authoritative row from the source's `RECORD`, with the
/// path as it appears in the archive. `path` is relative to the root of
/// `scheme`. The stream is one-shot: readable once, sequentially.
pub struct WheelContentElement<'a> {
    pub scheme: Scheme,
    pub path: String,
    pub record: RecordEntry,
    pub stream: Box<dyn Read + 'a>,
    pub is_executable: bool,
}

/// Cursor over the contents of a wheel.
///
/// Each element borrows the cursor, so it must be fully consumed (or
/// dropped) before requesting the next one.
pub trait WheelContentStream {
    fn next_element(&mut self) -> Result<Option<WheelContentElement<'_>>>;
}

/// Represents an installable wheel.
pub trait WheelSource {
    /// Distribution name, as parsed from the wheel's identity.
    fn distribution(&self) -> &str;

    /// Version associated with the wheel.
    fn version(&self) -> &str;

    /// Name of the `.dist-info` directory inside the wheel.
    fn dist_info_dir(&self) -> String;

    /// Name of the `.data` directory inside the wheel.
    fn data_dir(&self) -> String;

    /// Names of all files in the dist-info directory.
    fn dist_info_filenames(&mut self) -> Result<Vec<String>>;

    /// Contents of `filename` in the dist-info directory.
    fn read_dist_info(&mut self, filename: &str) -> Result<Vec<u8>>;

    /// The parsed `WHEEL` metadata.
    fn metadata(&mut self) -> Result<WheelMetadata> {
        WheelMetadata::from_bytes(&self.read_dist_info("WHEEL")?)
    }

    /// Sequential access to all contents of the wheel, in `RECORD` order.
    fn contents(&mut self) -> Result<Box<dyn WheelContentStream + '_>>;
}

/// Determine the scheme and scheme-relative path for an archive path.
///
/// Paths under `<name>-<version>.data/<scheme>/` route to that scheme with
/// the prefix stripped; everything else (the dist-info directory included)
/// lands in `root_scheme` under its full archive path.
fn classify_path(archive_path: &str, data_dir: &str, root_scheme: Scheme) -> Result<(Scheme, String)> {
    let data_prefix = format!("{}/", data_dir);

    if let Some(rest) = archive_path.strip_prefix(&data_prefix) {
        let (scheme_name, remainder) = rest.split_once('/').ok_or_else(|| {
            InstallerError::InvalidWheelSource(format!(
                "{} is not contained in a valid .data subdirectory",
                archive_path
            ))
        })?;

        let scheme = Scheme::from_name(scheme_name).ok_or_else(|| {
            InstallerError::InvalidWheelSource(format!(
                "{} is not contained in a valid .data subdirectory",
                archive_path
            ))
        })?;

        Ok((scheme, remainder.to_string()))
    } else {
        Ok((root_scheme, archive_path.to_string()))
    }
}

/// Implements [WheelSource] for an existing `.whl` file on the filesystem.
pub struct WheelFile {
    archive: ZipArchive<BufReader<File>>,
    distribution: String,
    version: String,
    dist_info_dir: String,
    root_is_purelib: bool,
    records: Vec<RecordEntry>,
}

impl WheelFile {
    /// Open a wheel file from a filesystem path.
    ///
    /// This validates the archive eagerly: the filename must conform to
    /// PEP 427, exactly one top-level `.dist-info` directory must exist and
    /// match the filename, `WHEEL` must parse to a supported version, and
    /// every `RECORD` row must have a backing archive member. Archive
    /// members missing from `RECORD` are only warned about; they will not be
    /// installed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| InstallerError::WheelFilename(path.display().to_string()))?;
        let parsed = parse_wheel_filename(&basename)?;

        let fh = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(fh))?;

        let names = archive
            .file_names()
            .map(String::from)
            .collect::<HashSet<_>>();

        let dist_info_dir = find_dist_info_dir(&names, &parsed.distribution, &parsed.version)?;

        let metadata =
            WheelMetadata::from_bytes(&read_archive_file(&mut archive, &format!("{}/WHEEL", dist_info_dir))?)?;
        metadata.check_supported()?;
        let root_is_purelib = metadata.root_is_purelib()?;

        let record_path = format!("{}/RECORD", dist_info_dir);
        let record_data = read_archive_file(&mut archive, &record_path)?;
        let record_text = String::from_utf8(record_data).map_err(|_| {
            InstallerError::InvalidWheelSource("RECORD is not valid UTF-8".to_string())
        })?;
        let records = parse_record_file(&record_text).collect::<Result<Vec<_>>>()?;

        let mut record_paths = HashSet::new();
        for record in &records {
            record_paths.insert(record.path.as_str());

            if record.path == record_path || record.path.ends_with('/') {
                continue;
            }

            if !names.contains(&record.path) {
                return Err(InstallerError::InvalidWheelSource(format!(
                    "{} is listed in RECORD but missing from the archive",
                    record.path
                )));
            }
        }

        for name in &names {
            if !name.ends_with('/') && !record_paths.contains(name.as_str()) {
                warn!("{}: {} is not mentioned in RECORD", basename, name);
            }
        }

        Ok(Self {
            archive,
            distribution: parsed.distribution,
            version: parsed.version,
            dist_info_dir,
            root_is_purelib,
            records,
        })
    }

    /// The rows of the source `RECORD`, in file order.
    pub fn records(&self) -> &[RecordEntry] {
        &self.records
    }
}

fn read_archive_file(
    archive: &mut ZipArchive<BufReader<File>>,
    path: &str,
) -> Result<Vec<u8>> {
    let mut file = archive.by_name(path).map_err(|e| match e {
        ZipError::FileNotFound => {
            InstallerError::InvalidWheelSource(format!("{} is missing from the archive", path))
        }
        e => e.into(),
    })?;

    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;

    Ok(data)
}

/// Locate the single top-level `.dist-info` directory and check it against
/// the parsed wheel filename.
fn find_dist_info_dir(names: &HashSet<String>, distribution: &str, version: &str) -> Result<String> {
    let mut dirs = names
        .iter()
        .filter_map(|name| name.split_once('/').map(|(first, _)| first))
        .filter(|first| first.ends_with(".dist-info"))
        .collect::<Vec<_>>();
    dirs.sort_unstable();
    dirs.dedup();

    let (dir, stem) = match dirs.as_slice() {
        [dir] => (dir.to_string(), dir.trim_end_matches(".dist-info")),
        [] => {
            return Err(InstallerError::InvalidWheelSource(
                "no .dist-info directory in archive".to_string(),
            ))
        }
        _ => {
            return Err(InstallerError::InvalidWheelSource(format!(
                "multiple .dist-info directories in archive: {}",
                dirs.join(", ")
            )))
        }
    };

    let (dir_name, dir_version) = stem.rsplit_once('-').ok_or_else(|| {
        InstallerError::InvalidWheelSource(format!("cannot parse dist-info name: {}", dir))
    })?;

    if canonicalize_name(dir_name) != canonicalize_name(distribution)
        || escape_version(dir_version) != escape_version(version)
    {
        return Err(InstallerError::InvalidWheelSource(format!(
            "dist-info directory {} does not match wheel {}-{}",
            dir, distribution, version
        )));
    }

    Ok(dir)
}

impl WheelSource for WheelFile {
    fn distribution(&self) -> &str {
        &self.distribution
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn dist_info_dir(&self) -> String {
        self.dist_info_dir.clone()
    }

    fn data_dir(&self) -> String {
        format!(
            "{}.data",
            self.dist_info_dir
                .strip_suffix(".dist-info")
                .unwrap_or(&self.dist_info_dir)
        )
    }

    fn dist_info_filenames(&mut self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.dist_info_dir);

        Ok(self
            .archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(String::from)
            .collect())
    }

    fn read_dist_info(&mut self, filename: &str) -> Result<Vec<u8>> {
        let path = format!("{}/{}", self.dist_info_dir, filename);

        read_archive_file(&mut self.archive, &path)
    }

    fn contents(&mut self) -> Result<Box<dyn WheelContentStream + '_>> {
        let record_path = format!("{}/RECORD", self.dist_info_dir);

        // RECORD is rewritten by the destination; directory placeholder
        // rows have nothing to stream.
        let rows = self
            .records
            .iter()
            .filter(|r| r.path != record_path && !r.path.ends_with('/'))
            .cloned()
            .collect::<Vec<_>>();

        Ok(Box::new(WheelFileContents {
            archive: &mut self.archive,
            rows,
            data_dir: format!(
                "{}.data",
                self.dist_info_dir
                    .strip_suffix(".dist-info")
                    .unwrap_or(&self.dist_info_dir)
            ),
            root_scheme: if self.root_is_purelib {
                Scheme::Purelib
            } else {
                Scheme::Platlib
            },
            index: 0,
        }))
    }
}

struct WheelFileContents<'a> {
    archive: &'a mut ZipArchive<BufReader<File>>,
    rows: Vec<RecordEntry>,
    data_dir: String,
    root_scheme: Scheme,
    index: usize,
}

impl<'a> WheelContentStream for WheelFileContents<'a> {
    fn next_element(&mut self) -> Result<Option<WheelContentElement<'_>>> {
        let record = match self.rows.get(self.index) {
            Some(record) => record.clone(),
            None => return Ok(None),
        };
        self.index += 1;

        let (scheme, path) = classify_path(&record.path, &self.data_dir, self.root_scheme)?;

        let file = self.archive.by_name(&record.path)?;

        // The executable bit lives in the upper 16 bits of the zip external
        // attributes, as a Unix mode.
        let is_executable = file.unix_mode().unwrap_or(0) & 0o111 != 0;

        Ok(Some(WheelContentElement {
            scheme,
            path,
            record,
            stream: Box::new(file),
            is_executable,
        }))
    }
}
