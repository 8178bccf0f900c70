// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Working with `.dist-info/WHEEL` metadata. */

use {
    crate::error::{InstallerError, Result},
    mailparse::parse_mail,
};

/// The major wheel format version this crate understands.
pub const SUPPORTED_WHEEL_MAJOR: u64 = 1;

/// Represents a parsed `WHEEL` metadata file.
///
/// `WHEEL` uses email header syntax. Unknown keys are preserved but ignored.
pub struct WheelMetadata {
    headers: Vec<(String, String)>,
}

impl WheelMetadata {
    /// Create an instance from the content of a `WHEEL` file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let message = parse_mail(data)?;

        let headers = message
            .headers
            .iter()
            .map(|header| (header.get_key(), header.get_value()))
            .collect::<Vec<_>>();

        Ok(Self { headers })
    }

    /// Find the first value of a specified header.
    pub fn find_first_header(&self, key: &str) -> Option<&str> {
        for (k, v) in &self.headers {
            if k == key {
                return Some(v);
            }
        }

        None
    }

    fn required_header(&self, key: &str) -> Result<&str> {
        self.find_first_header(key)
            .ok_or_else(|| InstallerError::InvalidWheelSource(format!("WHEEL is missing {}", key)))
    }

    /// The raw `Wheel-Version` value.
    pub fn wheel_version_string(&self) -> Result<&str> {
        self.required_header("Wheel-Version")
    }

    /// The `Wheel-Version` value as a `(major, minor)` pair.
    pub fn wheel_version(&self) -> Result<(u64, u64)> {
        let raw = self.wheel_version_string()?;

        let mut parts = raw.trim().splitn(2, '.');
        let major = parts.next().unwrap_or_default();
        let minor = parts.next().unwrap_or("0");

        match (major.parse::<u64>(), minor.parse::<u64>()) {
            (Ok(major), Ok(minor)) => Ok((major, minor)),
            _ => Err(InstallerError::InvalidWheelSource(format!(
                "cannot parse Wheel-Version: {}",
                raw
            ))),
        }
    }

    /// Whether `Root-Is-Purelib` is set.
    pub fn root_is_purelib(&self) -> Result<bool> {
        Ok(self.required_header("Root-Is-Purelib")?.trim().eq_ignore_ascii_case("true"))
    }

    /// Error unless the wheel format major version is one we support.
    ///
    /// Minor version bumps are compatible by definition and are ignored.
    pub fn check_supported(&self) -> Result<()> {
        let (major, _) = self.wheel_version()?;

        if major > SUPPORTED_WHEEL_MAJOR {
            Err(InstallerError::UnsupportedWheelVersion(
                self.wheel_version_string()?.to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const WHEEL: &str = concat!(
        "Wheel-Version: 1.0\n",
        "Generator: bdist_wheel (0.36.2)\n",
        "Root-Is-Purelib: true\n",
        "Tag: py2-none-any\n",
        "Tag: py3-none-any\n",
    );

    #[test]
    fn parse_wheel_file() -> Result<()> {
        let m = WheelMetadata::from_bytes(WHEEL.as_bytes())?;

        assert_eq!(m.wheel_version()?, (1, 0));
        assert!(m.root_is_purelib()?);
        assert_eq!(m.find_first_header("Generator"), Some("bdist_wheel (0.36.2)"));
        assert_eq!(m.find_first_header("Missing"), None);
        m.check_supported()?;

        Ok(())
    }

    #[test]
    fn future_minor_version_is_supported() -> Result<()> {
        let m = WheelMetadata::from_bytes(b"Wheel-Version: 1.999\nRoot-Is-Purelib: false\n")?;

        assert_eq!(m.wheel_version()?, (1, 999));
        m.check_supported()?;
        assert!(!m.root_is_purelib()?);

        Ok(())
    }

    #[test]
    fn future_major_version_is_rejected() -> Result<()> {
        let m = WheelMetadata::from_bytes(b"Wheel-Version: 2.0\nRoot-Is-Purelib: true\n")?;

        match m.check_supported() {
            Err(InstallerError::UnsupportedWheelVersion(v)) => assert_eq!(v, "2.0"),
            other => panic!("unexpected result: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn missing_required_keys_are_fatal() -> Result<()> {
        let m = WheelMetadata::from_bytes(b"Generator: something\n")?;

        assert!(matches!(
            m.wheel_version(),
            Err(InstallerError::InvalidWheelSource(_))
        ));
        assert!(matches!(
            m.root_is_purelib(),
            Err(InstallerError::InvalidWheelSource(_))
        ));

        Ok(())
    }
}
