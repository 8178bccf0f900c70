// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Generate executable launchers for entry points.

On POSIX a launcher is a Python source file behind a shebang. On Windows it
is an EXE built by concatenating a precompiled `simple_launcher` stub, a
shebang line, and a zip archive holding a `__main__.py`. The stub reads its
own tail to find the shebang and archive, then invokes the named interpreter
on the archive.
*/

use {
    crate::error::{InstallerError, Result},
    std::io::{Cursor, Write},
    zip::{write::FileOptions, CompressionMethod, ZipWriter},
};

const LAUNCHER_T32: &[u8] = include_bytes!("launchers/t32.exe");
const LAUNCHER_T64: &[u8] = include_bytes!("launchers/t64.exe");
const LAUNCHER_T64_ARM: &[u8] = include_bytes!("launchers/t64-arm.exe");
const LAUNCHER_W32: &[u8] = include_bytes!("launchers/w32.exe");
const LAUNCHER_W64: &[u8] = include_bytes!("launchers/w64.exe");
const LAUNCHER_W64_ARM: &[u8] = include_bytes!("launchers/w64-arm.exe");

/// The `entry_points.txt` section a script was declared in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ScriptSection {
    Console,
    Gui,
}

impl ScriptSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Gui => "gui",
        }
    }
}

/// The flavor of launcher to produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LauncherKind {
    Posix,
    WinIa32,
    WinAmd64,
    WinArm,
    WinArm64,
}

impl LauncherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::WinIa32 => "win-ia32",
            Self::WinAmd64 => "win-amd64",
            Self::WinArm => "win-arm",
            Self::WinArm64 => "win-arm64",
        }
    }

    /// Whether this kind targets Windows.
    pub fn is_windows(&self) -> bool {
        !matches!(self, Self::Posix)
    }

    /// The launcher kind for the machine this code was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            if cfg!(target_arch = "aarch64") {
                Self::WinArm64
            } else if cfg!(target_arch = "arm") {
                Self::WinArm
            } else if cfg!(target_pointer_width = "64") {
                Self::WinAmd64
            } else {
                Self::WinIa32
            }
        } else {
            Self::Posix
        }
    }

    /// Resolve a launcher kind from a target interpreter's platform tag.
    ///
    /// Unknown or non-specific tags (like `any`) fall back to the compile
    /// target.
    pub fn from_platform_tag(tag: &str) -> Self {
        match tag {
            "win32" => Self::WinIa32,
            "win_amd64" => Self::WinAmd64,
            "win_arm" => Self::WinArm,
            "win_arm64" => Self::WinArm64,
            "any" | "" => Self::current(),
            t if t.starts_with("win") => Self::current(),
            _ => Self::Posix,
        }
    }
}

impl std::fmt::Display for LauncherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn launcher_stub(section: ScriptSection, kind: LauncherKind) -> Result<Option<&'static [u8]>> {
    match (section, kind) {
        (_, LauncherKind::Posix) => Ok(None),
        (ScriptSection::Console, LauncherKind::WinIa32) => Ok(Some(LAUNCHER_T32)),
        (ScriptSection::Console, LauncherKind::WinAmd64) => Ok(Some(LAUNCHER_T64)),
        (ScriptSection::Console, LauncherKind::WinArm64) => Ok(Some(LAUNCHER_T64_ARM)),
        (ScriptSection::Gui, LauncherKind::WinIa32) => Ok(Some(LAUNCHER_W32)),
        (ScriptSection::Gui, LauncherKind::WinAmd64) => Ok(Some(LAUNCHER_W64)),
        (ScriptSection::Gui, LauncherKind::WinArm64) => Ok(Some(LAUNCHER_W64_ARM)),
        (section, kind) => Err(InstallerError::InvalidScript(format!(
            "no launcher stub for {} scripts on {}",
            section.as_str(),
            kind
        ))),
    }
}

/// A launcher produced by [Script::generate].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedScript {
    /// Filename to install under the `scripts` scheme.
    pub name: String,
    pub contents: Vec<u8>,
    pub executable: bool,
}

/// Describes a script based on an entry point declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Script {
    /// Name of the script.
    pub name: String,
    /// Module path to load the entry point from.
    pub module: String,
    /// Attribute access on the module yielding the callable.
    pub attr: String,
    pub section: ScriptSection,
}

impl Script {
    pub fn new(
        name: impl ToString,
        module: impl ToString,
        attr: impl ToString,
        section: ScriptSection,
    ) -> Self {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            attr: attr.to_string(),
            section,
        }
    }

    fn main_source(&self, section: ScriptSection) -> String {
        match section {
            ScriptSection::Console => format!(
                "import sys\nimport {module}\nsys.exit({module}.{attr}())\n",
                module = self.module,
                attr = self.attr
            ),
            ScriptSection::Gui => format!(
                "import {module}\n{module}.{attr}()\n",
                module = self.module,
                attr = self.attr
            ),
        }
    }

    /// On Windows, GUI scripts should invoke `pythonw` so no console window
    /// appears.
    fn alternate_executable(&self, executable: &str, kind: LauncherKind) -> String {
        if self.section != ScriptSection::Gui || !kind.is_windows() {
            return executable.to_string();
        }

        match executable.rfind(['/', '\\']) {
            Some(i) => format!(
                "{}{}",
                &executable[..=i],
                executable[i + 1..].replacen("python", "pythonw", 1)
            ),
            None => executable.replacen("python", "pythonw", 1),
        }
    }

    /// Generate a launcher for this script.
    ///
    /// `executable` is the interpreter path to embed. Returns the filename
    /// and contents of the launcher file.
    pub fn generate(&self, executable: &str, kind: LauncherKind) -> Result<GeneratedScript> {
        // POSIX has no notion of a GUI script; both sections produce the
        // same console launcher.
        let section = if kind.is_windows() {
            self.section
        } else {
            ScriptSection::Console
        };

        let stub = launcher_stub(section, kind)?;
        let executable = self.alternate_executable(executable, kind);
        let code = self.main_source(section);

        match stub {
            None => {
                let mut contents = build_shebang(&executable, "", LauncherKind::Posix);
                contents.push(b'\n');
                contents.extend_from_slice(code.as_bytes());

                Ok(GeneratedScript {
                    name: self.name.clone(),
                    contents,
                    executable: true,
                })
            }
            Some(stub) => {
                let mut contents = Vec::with_capacity(stub.len() + 512);
                contents.extend_from_slice(stub);
                contents.extend_from_slice(&build_shebang(&executable, "", kind));
                contents.extend_from_slice(b"\r\n");
                contents.extend_from_slice(&launcher_archive(code.as_bytes())?);

                Ok(GeneratedScript {
                    name: format!("{}.exe", self.name),
                    contents,
                    executable: true,
                })
            }
        }
    }
}

/// Build the zip archive appended to a Windows launcher: a single
/// `__main__.py` holding the entry point invocation.
fn launcher_archive(source: &[u8]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("__main__.py", options)?;
    writer.write_all(source)?;

    Ok(writer.finish()?.into_inner())
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Build a shebang line (without trailing newline) for `executable` with
/// optional trailing `arguments`.
///
/// For Windows launchers the command is embedded as-is. On POSIX, a simple
/// command becomes a plain `#!` line; an executable path containing
/// whitespace (or an over-long line, which some kernels truncate) is wrapped
/// in a `/bin/sh` exec trampoline that re-execs with the quoted interpreter.
/// The trampoline is simultaneously valid shell and a valid Python string
/// statement, so the rest of the file runs untouched.
pub(crate) fn build_shebang(executable: &str, arguments: &str, kind: LauncherKind) -> Vec<u8> {
    let mut command = String::from(executable);
    if !arguments.is_empty() {
        command.push(' ');
        command.push_str(arguments);
    }

    // 3 accounts for the #! prefix and trailing newline.
    let simple = !executable.chars().any(char::is_whitespace) && command.len() + 3 <= 127;

    if kind.is_windows() || simple {
        return format!("#!{}", command).into_bytes();
    }

    let mut script = Vec::new();
    script.extend_from_slice(b"#!/bin/sh\n'''exec' ");
    script.extend_from_slice(sh_quote(executable).as_bytes());
    if !arguments.is_empty() {
        script.push(b' ');
        script.extend_from_slice(arguments.as_bytes());
    }
    script.extend_from_slice(b" \"$0\" \"$@\"\n' '''");

    script
}

fn command_basename(command: &str, kind: LauncherKind) -> String {
    let base = match command.rfind(['/', '\\']) {
        Some(i) => &command[i + 1..],
        None => command,
    };

    if kind.is_windows() {
        let base = base.to_lowercase();
        base.strip_suffix(".exe").unwrap_or(&base).to_string()
    } else {
        base.to_string()
    }
}

fn is_python_basename(name: &str) -> bool {
    let rest = match name.strip_prefix("python") {
        Some(rest) => rest,
        None => return false,
    };
    let rest = rest.strip_prefix('w').unwrap_or(rest);

    rest.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Decide whether the first line of a script is a Python shebang eligible
/// for rewriting.
///
/// `head` holds the raw bytes of the first line (through the newline, when
/// one was found). A qualifying line starts with `#!` and names a `python`
/// or `pythonw` command, possibly versioned, possibly behind `/usr/bin/env`,
/// or the installation interpreter itself (compared case-insensitively on
/// Windows). Returns the trailing interpreter arguments so the caller can
/// preserve them after the new interpreter path.
pub(crate) fn parse_python_shebang(
    head: &[u8],
    interpreter: &str,
    kind: LauncherKind,
) -> Option<String> {
    let rest = head.strip_prefix(b"#!")?;

    let line = std::str::from_utf8(rest).ok()?;
    let line = line.trim_end_matches(|c| c == '\n' || c == '\r');

    let mut tokens = line.split_whitespace();
    let mut command = tokens.next()?;

    if command_basename(command, kind) == "env" {
        command = tokens.next()?;
    }

    let arguments = tokens.collect::<Vec<_>>().join(" ");
    let name = command_basename(command, kind);

    if is_python_basename(&name) || name == command_basename(interpreter, kind) {
        Some(arguments)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Read};

    #[test]
    fn posix_console_script() -> Result<()> {
        let script = Script::new("sample", "sample", "main", ScriptSection::Console);
        let generated = script.generate("/usr/bin/python3", LauncherKind::Posix)?;

        assert_eq!(generated.name, "sample");
        assert!(generated.executable);
        assert_eq!(
            generated.contents,
            b"#!/usr/bin/python3\nimport sys\nimport sample\nsys.exit(sample.main())\n"
        );

        Ok(())
    }

    #[test]
    fn posix_gui_script_behaves_like_console() -> Result<()> {
        let script = Script::new("sample-gui", "sample.gui", "run", ScriptSection::Gui);
        let generated = script.generate("/usr/bin/python3", LauncherKind::Posix)?;

        assert_eq!(generated.name, "sample-gui");
        assert!(String::from_utf8_lossy(&generated.contents).contains("sys.exit(sample.gui.run())"));

        Ok(())
    }

    #[test]
    fn posix_script_with_spaced_interpreter_uses_trampoline() -> Result<()> {
        let script = Script::new("sample", "sample", "main", ScriptSection::Console);
        let generated = script.generate("/opt/my python/bin/python3", LauncherKind::Posix)?;

        let text = String::from_utf8(generated.contents).unwrap();
        assert!(text.starts_with("#!/bin/sh\n'''exec' '/opt/my python/bin/python3' \"$0\" \"$@\"\n' '''\n"));
        assert!(text.ends_with("sys.exit(sample.main())\n"));

        Ok(())
    }

    #[test]
    fn windows_console_launcher_layout() -> Result<()> {
        let script = Script::new("myapp", "myapp.cli", "main", ScriptSection::Console);
        let generated = script.generate("C:\\Python\\python.exe", LauncherKind::WinAmd64)?;

        assert_eq!(generated.name, "myapp.exe");
        assert!(generated.contents.starts_with(LAUNCHER_T64));

        let tail = &generated.contents[LAUNCHER_T64.len()..];
        let shebang = b"#!C:\\Python\\python.exe\r\n";
        assert!(tail.starts_with(shebang));

        let mut archive = zip::ZipArchive::new(Cursor::new(&tail[shebang.len()..]))?;
        assert_eq!(archive.len(), 1);

        let mut file = archive.by_name("__main__.py")?;
        let mut source = String::new();
        file.read_to_string(&mut source)?;
        assert_eq!(
            source,
            "import sys\nimport myapp.cli\nsys.exit(myapp.cli.main())\n"
        );

        Ok(())
    }

    #[test]
    fn windows_gui_launcher_uses_pythonw_and_gui_stub() -> Result<()> {
        let script = Script::new("myapp", "myapp.gui", "run", ScriptSection::Gui);
        let generated = script.generate("C:\\Python\\python.exe", LauncherKind::WinAmd64)?;

        assert!(generated.contents.starts_with(LAUNCHER_W64));

        let tail = &generated.contents[LAUNCHER_W64.len()..];
        assert!(tail.starts_with(b"#!C:\\Python\\pythonw.exe\r\n"));

        Ok(())
    }

    #[test]
    fn unsupported_architecture_is_rejected() {
        let script = Script::new("myapp", "myapp.cli", "main", ScriptSection::Console);

        assert!(matches!(
            script.generate("C:\\Python\\python.exe", LauncherKind::WinArm),
            Err(InstallerError::InvalidScript(_))
        ));
    }

    #[test]
    fn launcher_kind_from_platform_tags() {
        assert_eq!(LauncherKind::from_platform_tag("win32"), LauncherKind::WinIa32);
        assert_eq!(
            LauncherKind::from_platform_tag("win_amd64"),
            LauncherKind::WinAmd64
        );
        assert_eq!(
            LauncherKind::from_platform_tag("win_arm64"),
            LauncherKind::WinArm64
        );
        assert_eq!(
            LauncherKind::from_platform_tag("manylinux2014_x86_64"),
            LauncherKind::Posix
        );
        assert_eq!(
            LauncherKind::from_platform_tag("macosx_11_0_arm64"),
            LauncherKind::Posix
        );
        assert_eq!(LauncherKind::from_platform_tag("any"), LauncherKind::current());
    }

    #[test]
    fn shebang_detection() {
        let allowed = |head: &[u8]| parse_python_shebang(head, "/venv/bin/python3", LauncherKind::Posix);

        assert_eq!(allowed(b"#!python\n"), Some(String::new()));
        assert_eq!(allowed(b"#!pythonw\n"), Some(String::new()));
        assert_eq!(allowed(b"#!/usr/bin/python3.11\n"), Some(String::new()));
        assert_eq!(allowed(b"#!/usr/bin/env python3 -u\n"), Some("-u".to_string()));
        assert_eq!(allowed(b"#!/venv/bin/python3\n"), Some(String::new()));
        assert_eq!(allowed(b"#!/bin/sh\n"), None);
        assert_eq!(allowed(b"#!/usr/bin/env bash\n"), None);
        assert_eq!(allowed(b"import os\n"), None);
        assert_eq!(allowed(b"#!pythonista\n"), None);
    }

    #[test]
    fn shebang_detection_windows_case_insensitive() {
        assert_eq!(
            parse_python_shebang(
                b"#!C:\\Python\\PYTHON.EXE\r\n",
                "C:\\other\\python.exe",
                LauncherKind::WinAmd64
            ),
            Some(String::new())
        );
    }

    #[test]
    fn rewritten_shebang_preserves_arguments() {
        let line = build_shebang("/venv/bin/python3", "-u", LauncherKind::Posix);
        assert_eq!(line, b"#!/venv/bin/python3 -u");
    }

    #[test]
    fn overlong_shebang_uses_trampoline() {
        let long_path = format!("/{}/bin/python3", "x".repeat(140));
        let line = build_shebang(&long_path, "", LauncherKind::Posix);

        assert!(line.starts_with(b"#!/bin/sh\n"));
    }

    #[test]
    fn sh_quote_escapes_single_quotes() {
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }
}
