// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Wheel installation engine.

[WheelInstaller] orchestrates the other pieces: it streams content elements
from a [WheelSource], rewrites Python shebangs on `scripts` entries, routes
everything to a [WheelDestination], verifies streamed bytes against the
source `RECORD`, generates entry point launchers, and finalizes with a fresh
`RECORD`.

The engine is synchronous and makes a single pass: it succeeds fully or
surfaces the first error and stops. Partially installed files are left on
disk for the caller to deal with.
*/

use {
    crate::{
        destinations::WheelDestination,
        entry_points::parse_entry_points,
        error::{InstallerError, Result},
        io::RecordValidatingReader,
        layout::Scheme,
        record::{HashAlgorithm, RecordEntry},
        scripts::{build_shebang, parse_python_shebang, LauncherKind},
        sources::WheelSource,
    },
    std::{
        collections::{BTreeMap, HashSet},
        io::{Cursor, Read},
    },
};

const ENTRY_POINTS_FILE: &str = "entry_points.txt";

/// Shebang lines are read through the first newline, up to this cap.
const SHEBANG_SCAN_LIMIT: usize = 512;

/// Installs wheels, as described by a [WheelSource], into a
/// [WheelDestination].
///
/// Supports wheel format version 1.x (PEP 427).
pub struct WheelInstaller {
    allowed_hashes: Vec<HashAlgorithm>,
    additional_metadata: BTreeMap<String, Vec<u8>>,
}

impl Default for WheelInstaller {
    fn default() -> Self {
        Self {
            allowed_hashes: HashAlgorithm::default_allowed(),
            additional_metadata: BTreeMap::new(),
        }
    }
}

impl WheelInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of digest algorithms accepted when verifying source
    /// `RECORD` rows.
    pub fn set_allowed_hash_algorithms(&mut self, v: impl IntoIterator<Item = HashAlgorithm>) {
        self.allowed_hashes = v.into_iter().collect();
    }

    /// Register an extra file to write into the dist-info directory during
    /// finalization.
    pub fn add_metadata_file(&mut self, filename: impl ToString, data: Vec<u8>) {
        self.additional_metadata.insert(filename.to_string(), data);
    }

    /// Record the installing tool's identity in the conventional
    /// `INSTALLER` metadata file.
    pub fn set_installer_name(&mut self, name: &str) {
        self.add_metadata_file("INSTALLER", format!("{}\n", name).into_bytes());
    }

    /// Install the wheel described by `source` into `destination`.
    pub fn install(
        &self,
        source: &mut dyn WheelSource,
        destination: &mut dyn WheelDestination,
    ) -> Result<()> {
        let metadata = source.metadata()?;
        metadata.check_supported()?;

        let root_scheme = if metadata.root_is_purelib()? {
            Scheme::Purelib
        } else {
            Scheme::Platlib
        };

        let dist_info_dir = source.dist_info_dir();
        let interpreter = destination.interpreter().to_string();
        let launcher_kind = destination.launcher_kind();

        let mut records: Vec<RecordEntry> = Vec::new();

        {
            let mut contents = source.contents()?;

            while let Some(element) = contents.next_element()? {
                let mut validating =
                    RecordValidatingReader::new(element.stream, &element.record, &self.allowed_hashes)?;

                let entry = if element.scheme == Scheme::Scripts {
                    write_script_scheme_file(
                        destination,
                        &element.path,
                        &mut validating,
                        element.is_executable,
                        &interpreter,
                        launcher_kind,
                    )?
                } else {
                    destination.write_file(
                        element.scheme,
                        &element.path,
                        &mut validating,
                        element.is_executable,
                    )?
                };

                validating.verify()?;

                if entry.path != element.path {
                    return Err(InstallerError::RecordMismatch {
                        path: element.path.clone(),
                        reason: format!("destination recorded path {}", entry.path),
                    });
                }

                records.push(entry);
            }
        }

        if source
            .dist_info_filenames()?
            .iter()
            .any(|f| f == ENTRY_POINTS_FILE)
        {
            let data = source.read_dist_info(ENTRY_POINTS_FILE)?;
            let text = String::from_utf8(data).map_err(|_| {
                InstallerError::InvalidScript(format!("{} is not valid UTF-8", ENTRY_POINTS_FILE))
            })?;

            let scripts = parse_entry_points(&text)?;

            // Without an .exe suffix there is nothing to distinguish a
            // console launcher from a GUI launcher of the same name.
            if !launcher_kind.is_windows() {
                let mut names = HashSet::new();
                for script in &scripts {
                    if !names.insert(script.name.as_str()) {
                        return Err(InstallerError::InvalidScript(format!(
                            "entry point {} appears in both console_scripts and gui_scripts",
                            script.name
                        )));
                    }
                }
            }

            for script in scripts {
                records.push(destination.write_script(
                    &script.name,
                    &script.module,
                    &script.attr,
                    script.section,
                )?);
            }
        }

        destination.finalize(
            root_scheme,
            &dist_info_dir,
            &records,
            &self.additional_metadata,
        )
    }
}

/// Read the first line of a stream, through the newline, bounded by
/// [SHEBANG_SCAN_LIMIT]. The consumed bytes are returned so they can be
/// re-chained in front of the remainder.
fn read_line_prefix(reader: &mut dyn Read) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    while head.len() < SHEBANG_SCAN_LIMIT {
        if reader.read(&mut byte)? == 0 {
            break;
        }

        head.push(byte[0]);

        if byte[0] == b'\n' {
            break;
        }
    }

    Ok(head)
}

/// Write one `scripts`-scheme element, rewriting its shebang when it starts
/// with a Python one.
fn write_script_scheme_file(
    destination: &mut dyn WheelDestination,
    path: &str,
    stream: &mut dyn Read,
    is_executable: bool,
    interpreter: &str,
    launcher_kind: LauncherKind,
) -> Result<RecordEntry> {
    let head = read_line_prefix(stream)?;

    match parse_python_shebang(&head, interpreter, launcher_kind) {
        Some(arguments) => {
            let mut line = build_shebang(interpreter, &arguments, launcher_kind);
            line.push(b'\n');

            let mut rewritten = Cursor::new(line).chain(stream);
            destination.write_file(Scheme::Scripts, path, &mut rewritten, true)
        }
        None => {
            let mut original = Cursor::new(head).chain(stream);
            destination.write_file(Scheme::Scripts, path, &mut original, is_executable)
        }
    }
}
