// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Installation layout primitives: schemes and wheel file naming. */

use {
    crate::error::{InstallerError, Result},
    once_cell::sync::Lazy,
};

/// Regex for parsing wheel filenames.
///
/// This is copied from the wheel.wheelfile Python module.
static RE_WHEEL_FILENAME: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^(?P<namever>(?P<name>.+?)-(?P<ver>.+?))(-(?P<build>\d[^-]*))?-(?P<pyver>.+?)-(?P<abi>.+?)-(?P<plat>.+?)\.whl$").unwrap()
});

/// Regex for canonicalizing distribution names per PEP 503.
static RE_NAME_SEPARATORS: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[-_.]+").unwrap());

/// Regex for filename-escaping version strings per PEP 376.
static RE_VERSION_ESCAPE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[^A-Za-z0-9.]+").unwrap());

/// A symbolic installation location category.
///
/// The caller maps each scheme to an absolute filesystem path; nothing in
/// this crate invents locations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Scheme {
    Purelib,
    Platlib,
    Headers,
    Scripts,
    Data,
}

impl Scheme {
    /// Resolve a scheme from the directory name used in `.data/` trees.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "purelib" => Some(Self::Purelib),
            "platlib" => Some(Self::Platlib),
            "headers" => Some(Self::Headers),
            "scripts" => Some(Self::Scripts),
            "data" => Some(Self::Data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purelib => "purelib",
            Self::Platlib => "platlib",
            Self::Headers => "headers",
            Self::Scripts => "scripts",
            Self::Data => "data",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Components of a PEP 427 wheel filename.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WheelFilename {
    pub distribution: String,
    pub version: String,
    pub build_tag: Option<String>,
    /// The `python-abi-platform` compatibility tag.
    pub tag: String,
}

/// Parse a wheel filename into its components.
pub fn parse_wheel_filename(filename: &str) -> Result<WheelFilename> {
    let captures = RE_WHEEL_FILENAME
        .captures(filename)
        .ok_or_else(|| InstallerError::WheelFilename(filename.to_string()))?;

    let group = |name: &str| captures.name(name).map(|m| m.as_str().to_string());

    Ok(WheelFilename {
        distribution: group("name")
            .ok_or_else(|| InstallerError::WheelFilename(filename.to_string()))?,
        version: group("ver").ok_or_else(|| InstallerError::WheelFilename(filename.to_string()))?,
        build_tag: group("build"),
        tag: format!(
            "{}-{}-{}",
            captures.name("pyver").map(|m| m.as_str()).unwrap_or_default(),
            captures.name("abi").map(|m| m.as_str()).unwrap_or_default(),
            captures.name("plat").map(|m| m.as_str()).unwrap_or_default(),
        ),
    })
}

/// Canonicalize a distribution name: lowercase with runs of `-`, `_`, and
/// `.` collapsed to a single `-`.
pub fn canonicalize_name(name: &str) -> String {
    RE_NAME_SEPARATORS.replace_all(name, "-").to_lowercase()
}

/// Filename-escape a version string: runs of characters outside
/// `[A-Za-z0-9.]` become a single `_`.
pub fn escape_version(version: &str) -> String {
    RE_VERSION_ESCAPE.replace_all(version, "_").to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_simple_filename() -> Result<()> {
        let parsed = parse_wheel_filename("sampleproject-1.3.1-py2.py3-none-any.whl")?;

        assert_eq!(parsed.distribution, "sampleproject");
        assert_eq!(parsed.version, "1.3.1");
        assert_eq!(parsed.build_tag, None);
        assert_eq!(parsed.tag, "py2.py3-none-any");

        Ok(())
    }

    #[test]
    fn parse_filename_with_build_tag() -> Result<()> {
        let parsed = parse_wheel_filename("pip-20.3.1-1build1-py2.py3-none-any.whl")?;

        assert_eq!(parsed.distribution, "pip");
        assert_eq!(parsed.version, "20.3.1");
        assert_eq!(parsed.build_tag.as_deref(), Some("1build1"));

        Ok(())
    }

    #[test]
    fn parse_platform_wheel_filename() -> Result<()> {
        let parsed = parse_wheel_filename("cryptography-3.3.1-cp36-abi3-win_amd64.whl")?;

        assert_eq!(parsed.distribution, "cryptography");
        assert_eq!(parsed.tag, "cp36-abi3-win_amd64");

        Ok(())
    }

    #[test]
    fn reject_non_wheel_filename() {
        assert!(matches!(
            parse_wheel_filename("sampleproject-1.3.1.tar.gz"),
            Err(InstallerError::WheelFilename(_))
        ));
        assert!(matches!(
            parse_wheel_filename("nodashes.whl"),
            Err(InstallerError::WheelFilename(_))
        ));
    }

    #[test]
    fn canonicalize_names() {
        assert_eq!(canonicalize_name("Sample.Project"), "sample-project");
        assert_eq!(canonicalize_name("my__pkg"), "my-pkg");
        assert_eq!(canonicalize_name("simple"), "simple");
    }

    #[test]
    fn escape_versions() {
        assert_eq!(escape_version("1.3.1"), "1.3.1");
        assert_eq!(escape_version("1.0-beta"), "1.0_beta");
    }

    #[test]
    fn scheme_names_round_trip() {
        for scheme in [
            Scheme::Purelib,
            Scheme::Platlib,
            Scheme::Headers,
            Scheme::Scripts,
            Scheme::Data,
        ] {
            assert_eq!(Scheme::from_name(scheme.as_str()), Some(scheme));
        }

        assert_eq!(Scheme::from_name("bindir"), None);
    }
}
