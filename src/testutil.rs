// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Helpers for constructing wheel fixtures in tests. */

use {
    crate::{
        error::Result,
        record::{encode_digest, HashAlgorithm},
    },
    std::{
        collections::{HashMap, HashSet},
        io::{Cursor, Write},
        path::{Path, PathBuf},
    },
    zip::{write::FileOptions, ZipWriter},
};

/// Assemble `.whl` fixtures with generated `WHEEL`, `METADATA`, and
/// `RECORD` files. Hash overrides allow manufacturing corrupt manifests.
pub struct TestWheelBuilder {
    distribution: String,
    version: String,
    wheel_version: String,
    root_is_purelib: bool,
    files: Vec<(String, Vec<u8>, bool)>,
    dist_info_files: Vec<(String, Vec<u8>)>,
    hash_overrides: HashMap<String, (String, String)>,
    cleared_hashes: HashSet<String>,
    extra_rows: Vec<String>,
}

impl TestWheelBuilder {
    pub fn new(distribution: impl ToString, version: impl ToString) -> Self {
        Self {
            distribution: distribution.to_string(),
            version: version.to_string(),
            wheel_version: "1.0".to_string(),
            root_is_purelib: true,
            files: Vec::new(),
            dist_info_files: Vec::new(),
            hash_overrides: HashMap::new(),
            cleared_hashes: HashSet::new(),
            extra_rows: Vec::new(),
        }
    }

    pub fn wheel_version(mut self, v: impl ToString) -> Self {
        self.wheel_version = v.to_string();
        self
    }

    pub fn root_is_purelib(mut self, v: bool) -> Self {
        self.root_is_purelib = v;
        self
    }

    pub fn file(mut self, path: impl ToString, data: &[u8]) -> Self {
        self.files.push((path.to_string(), data.to_vec(), false));
        self
    }

    pub fn executable_file(mut self, path: impl ToString, data: &[u8]) -> Self {
        self.files.push((path.to_string(), data.to_vec(), true));
        self
    }

    pub fn dist_info_file(mut self, name: impl ToString, data: &[u8]) -> Self {
        self.dist_info_files.push((name.to_string(), data.to_vec()));
        self
    }

    /// Make the `RECORD` row for `path` claim the given hash.
    pub fn override_hash(
        mut self,
        path: impl ToString,
        algorithm: impl ToString,
        value: impl ToString,
    ) -> Self {
        self.hash_overrides.insert(
            path.to_string(),
            (algorithm.to_string(), value.to_string()),
        );
        self
    }

    /// Make the `RECORD` row for `path` carry empty hash and size fields.
    pub fn clear_hash(mut self, path: impl ToString) -> Self {
        self.cleared_hashes.insert(path.to_string());
        self
    }

    /// Append a raw row to the generated `RECORD`.
    pub fn extra_record_row(mut self, row: impl ToString) -> Self {
        self.extra_rows.push(row.to_string());
        self
    }

    fn dist_info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.distribution, self.version)
    }

    fn record_row(&self, path: &str, data: &[u8]) -> String {
        if self.cleared_hashes.contains(path) {
            return format!("{},,", path);
        }

        if let Some((algorithm, value)) = self.hash_overrides.get(path) {
            return format!("{},{}={},{}", path, algorithm, value, data.len());
        }

        let mut hasher = HashAlgorithm::Sha256.new_hasher();
        hasher.update(data);

        format!(
            "{},sha256={},{}",
            path,
            encode_digest(&hasher.finalize()),
            data.len()
        )
    }

    /// Produce the wheel archive bytes.
    pub fn build(&self) -> Result<Vec<u8>> {
        let dist_info = self.dist_info_dir();

        let wheel_file = format!(
            "Wheel-Version: {}\nGenerator: test\nRoot-Is-Purelib: {}\nTag: py3-none-any\n",
            self.wheel_version, self.root_is_purelib
        );
        let metadata_file = format!(
            "Metadata-Version: 2.1\nName: {}\nVersion: {}\n",
            self.distribution, self.version
        );

        let mut members = self.files.clone();
        members.push((
            format!("{}/WHEEL", dist_info),
            wheel_file.into_bytes(),
            false,
        ));
        members.push((
            format!("{}/METADATA", dist_info),
            metadata_file.into_bytes(),
            false,
        ));
        for (name, data) in &self.dist_info_files {
            members.push((format!("{}/{}", dist_info, name), data.clone(), false));
        }

        let mut rows = members
            .iter()
            .map(|(path, data, _)| self.record_row(path, data))
            .collect::<Vec<_>>();
        rows.extend(self.extra_rows.iter().cloned());
        rows.push(format!("{}/RECORD,,", dist_info));

        let mut record = rows.join("\n");
        record.push('\n');

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (path, data, executable) in &members {
            let options = FileOptions::default()
                .unix_permissions(if *executable { 0o755 } else { 0o644 });
            writer.start_file(path.clone(), options)?;
            writer.write_all(data)?;
        }

        writer.start_file(
            format!("{}/RECORD", dist_info),
            FileOptions::default().unix_permissions(0o644),
        )?;
        writer.write_all(record.as_bytes())?;

        Ok(writer.finish()?.into_inner())
    }

    /// Write the wheel into `directory` with a PEP 427 filename and return
    /// its path.
    pub fn write_to(&self, directory: impl AsRef<Path>) -> Result<PathBuf> {
        let path = directory.as_ref().join(format!(
            "{}-{}-py3-none-any.whl",
            self.distribution, self.version
        ));

        std::fs::write(&path, self.build()?)?;

        Ok(path)
    }
}
