// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Install Python wheel archives into filesystem layouts.

This crate implements the consuming half of the Python wheel format: given a
`.whl` archive (PEP 427), it materializes the archive's contents into a set
of installation locations and produces a correct PEP 376 `RECORD` manifest
describing what was installed.

# A Tour of Functionality

A wheel is read through the [sources::WheelSource] trait.
[sources::WheelFile] is the ZIP-backed implementation for wheels on the
filesystem; opening one validates the archive layout, the `WHEEL` metadata
version, and the `RECORD` manifest up front. Content enumeration streams, so
installing a multi-gigabyte wheel does not buffer it in memory.

Installed files are written through the [destinations::WheelDestination]
trait. [destinations::SchemeDictionaryDestination] maps symbolic scheme
names ([layout::Scheme]) like `purelib` and `scripts` to directories and
writes files atomically. Mapping scheme names to concrete paths is the
caller's job, typically answered by interpreter introspection this crate
deliberately does not perform.

[installer::WheelInstaller] drives an installation: it streams every archive
entry to the destination, verifies streamed bytes against the source
`RECORD` ([record]), rewrites Python shebangs on `scripts` entries and
generates entry point launchers ([scripts], [entry_points]), and finishes by
writing a fresh `RECORD`.

```no_run
use {
    python_wheel_installer::{
        destinations::SchemeDictionaryDestination,
        installer::WheelInstaller,
        layout::Scheme,
        scripts::LauncherKind,
        sources::WheelFile,
    },
    std::collections::HashMap,
};

fn main() -> python_wheel_installer::error::Result<()> {
    let mut source = WheelFile::open("sampleproject-1.3.1-py2.py3-none-any.whl")?;

    let mut scheme_dict = HashMap::new();
    scheme_dict.insert(Scheme::Purelib, "/venv/lib/python3.11/site-packages".into());
    scheme_dict.insert(Scheme::Platlib, "/venv/lib/python3.11/site-packages".into());
    scheme_dict.insert(Scheme::Scripts, "/venv/bin".into());

    let mut destination = SchemeDictionaryDestination::new(
        scheme_dict,
        "/venv/bin/python3",
        LauncherKind::Posix,
    );

    let mut installer = WheelInstaller::new();
    installer.set_installer_name("python-wheel-installer");
    installer.install(&mut source, &mut destination)
}
```

# Scope

This crate resolves no dependencies, fetches nothing, manages no
environments, and does not uninstall. It trusts the caller's choice of
destination scheme paths. Byte-compiling installed modules to `.pyc` is a
downstream consumer's responsibility.
*/

pub mod destinations;
pub mod entry_points;
pub mod error;
pub mod installer;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod record;
pub mod scripts;
pub mod sources;

#[cfg(test)]
pub(crate) mod testutil;
