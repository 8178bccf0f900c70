// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parse `entry_points.txt` script declarations.

The file is INI syntax. Only the `console_scripts` and `gui_scripts`
sections matter for installation; other sections are ignored. Entries are
`name = module[.sub]:attr[.sub]`, with whitespace around `=` tolerated and
an optional trailing extras marker (`[extra]`) discarded.
*/

use {
    crate::{
        error::{InstallerError, Result},
        scripts::{Script, ScriptSection},
    },
    once_cell::sync::Lazy,
    std::collections::HashSet,
};

/// Regex for the value of an entry point declaration.
static RE_ENTRY_POINT: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^(?P<module>[\w.]+)\s*:\s*(?P<attrs>[\w.]+)\s*(?P<extras>\[.*\])?\s*$")
        .unwrap()
});

fn section_for(name: &str) -> Option<ScriptSection> {
    match name {
        "console_scripts" => Some(ScriptSection::Console),
        "gui_scripts" => Some(ScriptSection::Gui),
        _ => None,
    }
}

/// Parse `entry_points.txt` content into scripts, in declaration order.
///
/// Duplicate script names within a section are a hard error.
pub fn parse_entry_points(text: &str) -> Result<Vec<Script>> {
    let mut scripts = Vec::new();
    let mut seen = HashSet::new();
    let mut section = None;

    for line in text.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = section_for(name.trim());
            continue;
        }

        let current = match section {
            Some(section) => section,
            None => continue,
        };

        let (name, value) = line.split_once('=').ok_or_else(|| {
            InstallerError::InvalidScript(format!("malformed entry point: {}", line))
        })?;
        let name = name.trim();
        let value = value.trim();

        let captures = RE_ENTRY_POINT.captures(value).ok_or_else(|| {
            InstallerError::InvalidScript(format!("malformed entry point value: {}", value))
        })?;

        if name.is_empty() {
            return Err(InstallerError::InvalidScript(format!(
                "entry point has no name: {}",
                line
            )));
        }

        if !seen.insert((current, name.to_string())) {
            return Err(InstallerError::InvalidScript(format!(
                "duplicate {} entry point: {}",
                current.as_str(),
                name
            )));
        }

        let (module, attrs) = match (captures.name("module"), captures.name("attrs")) {
            (Some(module), Some(attrs)) => (module.as_str(), attrs.as_str()),
            _ => {
                return Err(InstallerError::InvalidScript(format!(
                    "malformed entry point value: {}",
                    value
                )))
            }
        };

        scripts.push(Script::new(name, module, attrs, current));
    }

    Ok(scripts)
}
