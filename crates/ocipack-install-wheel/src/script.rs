use std::collections::HashSet;

use configparser::ini::Ini;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::WheelError;

/// An entry-point definition: the name of the runnable script and the
/// module/function it launches.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Script {
    pub script_name: String,
    pub module: String,
    pub function: String,
}

impl Script {
    /// Parses an `entry_points.txt` value like `foo.bar:main` or
    /// `foomod:main_bar [bar,baz]`.
    /// <https://packaging.python.org/en/latest/specifications/entry-points/>
    pub fn from_value(
        script_name: &str,
        value: &str,
        extras: Option<&[String]>,
    ) -> Result<Option<Self>, WheelError> {
        static SCRIPT_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(?P<module>[\w\d_\-.]+)\s*:\s*(?P<function>[\w\d_\-.]+)(?:\s*\[\s*(?P<extras>(?:[^,]+,?\s*)+)\])?\s*$").unwrap()
        });

        let captures = SCRIPT_REGEX
            .captures(value)
            .ok_or_else(|| WheelError::InvalidWheel(format!("invalid console script: '{value}'")))?;

        if let Some(script_extras) = captures.name("extras") {
            if let Some(extras) = extras {
                let script_extras: HashSet<String> = script_extras
                    .as_str()
                    .split(',')
                    .map(|extra| extra.trim().to_string())
                    .collect();
                let allowed: HashSet<String> = extras.iter().cloned().collect();
                if !script_extras.is_subset(&allowed) {
                    return Ok(None);
                }
            }
        }

        Ok(Some(Self {
            script_name: script_name.to_string(),
            module: captures.name("module").unwrap().as_str().to_string(),
            function: captures.name("function").unwrap().as_str().to_string(),
        }))
    }

    pub fn import_name(&self) -> &str {
        self.function.split_once('.').map_or(&self.function, |(name, _)| name)
    }
}

fn scripts_from_section(
    section: &std::collections::HashMap<String, Option<String>>,
    section_name: &str,
    extras: Option<&[String]>,
) -> Result<Vec<Script>, WheelError> {
    let mut scripts = Vec::new();
    for (script_name, value) in section {
        let Some(value) = value else {
            return Err(WheelError::InvalidWheel(format!(
                "[{section_name}] key {script_name} must have a value"
            )));
        };
        if let Some(script) = Script::from_value(script_name, value, extras)? {
            scripts.push(script);
        }
    }
    Ok(scripts)
}

/// Parses `entry_points.txt`, returning `(console_scripts, gui_scripts)`.
pub fn scripts_from_entry_points(
    ini_text: &str,
    extras: Option<&[String]>,
) -> Result<(Vec<Script>, Vec<Script>), WheelError> {
    let mapping = Ini::new_cs()
        .read(ini_text.to_string())
        .map_err(|err| WheelError::InvalidWheel(format!("entry_points.txt is invalid: {err}")))?;

    let console_scripts = match mapping.get("console_scripts") {
        Some(section) => scripts_from_section(section, "console_scripts", extras)?,
        None => Vec::new(),
    };
    let gui_scripts = match mapping.get("gui_scripts") {
        Some(section) => scripts_from_section(section, "gui_scripts", extras)?,
        None => Vec::new(),
    };
    Ok((console_scripts, gui_scripts))
}

/// Wrapper script body for a console/GUI entry point.
/// <https://github.com/pypa/pip/blob/main/src/pip/_vendor/distlib/scripts.py>
pub fn script_launcher(module: &str, import_name: &str, shebang: &str) -> String {
    format!(
        r##"{shebang}
# -*- coding: utf-8 -*-
import re
import sys
from {module} import {import_name}
if __name__ == "__main__":
    sys.argv[0] = re.sub(r"(-script\.pyw|\.exe)?$", "", sys.argv[0])
    sys.exit({import_name}())
"##
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_script_values() {
        for case in ["foomod:main", "foomod:main_bar [bar,baz]", "pylutron_caseta.cli:lap_pair[cli]"] {
            assert!(Script::from_value("script", case, None).is_ok(), "case: {case}");
        }
    }

    #[test]
    fn rejects_invalid_script_values() {
        for case in ["", ":weh", "foomod:main_bar [bar", "pylutron_caseta", "weh:"] {
            assert!(Script::from_value("script", case, None).is_err(), "case: {case}");
        }
    }

    #[test]
    fn import_name_splits_from_nested_function_path() {
        let script = Script::from_value("script", "foomod:mod_bar.sub_foo.func_baz", None).unwrap().unwrap();
        assert_eq!(script.import_name(), "mod_bar");
    }

    #[test]
    fn entry_points_ini_splits_console_and_gui_sections() {
        let ini = "[console_scripts]\nfoo = foomod:main\n\n[gui_scripts]\nbar = barmod:main\n";
        let (console, gui) = scripts_from_entry_points(ini, None).unwrap();
        assert_eq!(console.len(), 1);
        assert_eq!(console[0].script_name, "foo");
        assert_eq!(gui.len(), 1);
        assert_eq!(gui[0].script_name, "bar");
    }
}
