// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Write installed files, generate scripts, and emit `RECORD`.

[WheelDestination] abstracts where installed files go.
[SchemeDictionaryDestination] is the reference implementation backed by a
mapping of scheme names to filesystem directories. Writes are atomic: content
lands in a temporary sibling which is fsynced and renamed over the target.
Existing files are overwritten unconditionally, never silently skipped.
*/

use {
    crate::{
        error::{InstallerError, Result},
        io::DigestingReader,
        layout::Scheme,
        record::{encode_digest, HashAlgorithm, RecordEntry, RecordHash},
        scripts::{LauncherKind, Script, ScriptSection},
    },
    log::debug,
    std::{
        collections::{BTreeMap, HashMap},
        io::{Cursor, Read},
        path::{Path, PathBuf},
    },
};

/// Handles writing unpacked files, script generation, and `RECORD`
/// generation.
pub trait WheelDestination {
    /// Absolute path of the Python interpreter scripts should invoke.
    fn interpreter(&self) -> &str;

    /// The launcher flavor this destination produces.
    fn launcher_kind(&self) -> LauncherKind;

    /// Write a file to `path` within `scheme`, returning the hash and size
    /// actually written.
    fn write_file(
        &mut self,
        scheme: Scheme,
        path: &str,
        stream: &mut dyn Read,
        executable: bool,
    ) -> Result<RecordEntry>;

    /// Generate and write a launcher invoking the given entry point.
    fn write_script(
        &mut self,
        name: &str,
        module: &str,
        attr: &str,
        section: ScriptSection,
    ) -> Result<RecordEntry>;

    /// Finalize installation after all files are written.
    ///
    /// Writes `extra_metadata` files into the dist-info directory, appends
    /// their rows plus the terminal `RECORD` row to `records`, and writes
    /// the `RECORD` file into `scheme`.
    fn finalize(
        &mut self,
        scheme: Scheme,
        dist_info_dir: &str,
        records: &[RecordEntry],
        extra_metadata: &BTreeMap<String, Vec<u8>>,
    ) -> Result<()>;
}

#[cfg(unix)]
fn set_executable_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    // Grant execute wherever read is already granted.
    permissions.set_mode(mode | ((mode & 0o444) >> 2));

    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn set_executable_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Destination based on a mapping of scheme names to directories.
pub struct SchemeDictionaryDestination {
    scheme_dict: HashMap<Scheme, PathBuf>,
    interpreter: String,
    launcher_kind: LauncherKind,
    hash_algorithm: HashAlgorithm,
}

impl SchemeDictionaryDestination {
    /// Construct an instance from a scheme mapping, the interpreter scripts
    /// should invoke, and the launcher flavor to generate.
    pub fn new(
        scheme_dict: HashMap<Scheme, PathBuf>,
        interpreter: impl ToString,
        launcher_kind: LauncherKind,
    ) -> Self {
        Self {
            scheme_dict,
            interpreter: interpreter.to_string(),
            launcher_kind,
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }

    /// Set the digest algorithm recorded in the generated `RECORD`.
    pub fn set_hash_algorithm(&mut self, v: HashAlgorithm) {
        self.hash_algorithm = v;
    }

    fn io_error(target: &Path, error: std::io::Error) -> InstallerError {
        InstallerError::DestinationIoPath(target.display().to_string(), error)
    }

    /// Stream `stream` to `path` under the scheme's root, atomically,
    /// computing the written hash and size on the way through.
    fn write_to_fs(
        &self,
        scheme: Scheme,
        path: &str,
        stream: &mut dyn Read,
        executable: bool,
    ) -> Result<RecordEntry> {
        if path.contains('\\') {
            return Err(InstallerError::InvalidWheelSource(format!(
                "install path contains a backslash: {}",
                path
            )));
        }

        let root = self
            .scheme_dict
            .get(&scheme)
            .ok_or(InstallerError::UnknownScheme(scheme.as_str()))?;
        let target = root.join(path);
        let parent = target
            .parent()
            .ok_or_else(|| {
                Self::io_error(
                    &target,
                    std::io::Error::new(std::io::ErrorKind::Other, "no parent directory"),
                )
            })?;

        std::fs::create_dir_all(parent).map_err(|e| Self::io_error(&target, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Self::io_error(&target, e))?;

        let mut digesting = DigestingReader::new(stream, self.hash_algorithm);
        std::io::copy(&mut digesting, tmp.as_file_mut()).map_err(|e| Self::io_error(&target, e))?;
        let (_, digest, size) = digesting.finish();

        tmp.as_file().sync_all().map_err(|e| Self::io_error(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| Self::io_error(&target, e.error))?;

        if executable {
            set_executable_mode(&target).map_err(|e| Self::io_error(&target, e))?;
        }

        debug!("wrote {}", target.display());

        Ok(RecordEntry {
            path: path.to_string(),
            hash: Some(RecordHash::new(
                self.hash_algorithm.name(),
                encode_digest(&digest),
            )),
            size: Some(size),
        })
    }
}

impl WheelDestination for SchemeDictionaryDestination {
    fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn launcher_kind(&self) -> LauncherKind {
        self.launcher_kind
    }

    fn write_file(
        &mut self,
        scheme: Scheme,
        path: &str,
        stream: &mut dyn Read,
        executable: bool,
    ) -> Result<RecordEntry> {
        self.write_to_fs(scheme, path, stream, executable)
    }

    fn write_script(
        &mut self,
        name: &str,
        module: &str,
        attr: &str,
        section: ScriptSection,
    ) -> Result<RecordEntry> {
        let script = Script::new(name, module, attr, section);
        let generated = script.generate(&self.interpreter, self.launcher_kind)?;

        self.write_to_fs(
            Scheme::Scripts,
            &generated.name,
            &mut Cursor::new(generated.contents),
            generated.executable,
        )
    }

    fn finalize(
        &mut self,
        scheme: Scheme,
        dist_info_dir: &str,
        records: &[RecordEntry],
        extra_metadata: &BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let mut all = records.to_vec();

        for (filename, data) in extra_metadata {
            let path = format!("{}/{}", dist_info_dir, filename);
            let entry = self.write_to_fs(scheme, &path, &mut data.as_slice(), false)?;
            all.push(entry);
        }

        let record_path = format!("{}/RECORD", dist_info_dir);
        all.push(RecordEntry {
            path: record_path.clone(),
            hash: None,
            size: None,
        });

        let data = crate::record::serialize_record_file(&all);
        self.write_to_fs(scheme, &record_path, &mut data.as_slice(), false)?;

        Ok(())
    }
}
