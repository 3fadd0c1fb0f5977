use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, thiserror::Error, Eq, PartialEq, Clone)]
#[error("not a valid package name: `{0}`")]
pub struct InvalidNameError(pub String);

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_.]+").expect("static regex is valid"));
static VALID_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$").expect("static regex is valid")
});

/// A PyPI distribution name, normalized per PEP 503: runs of `-_.` collapse
/// to a single `-` and the result is lowercased.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PackageName(String);

impl FromStr for PackageName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !VALID_NAME.is_match(s) {
            return Err(InvalidNameError(s.to_string()));
        }
        Ok(Self(SEPARATORS.replace_all(s, "-").to_lowercase()))
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PackageName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form used inside a `.dist-info` directory name / wheel filename:
    /// runs of `-_.` replaced with a single `_`.
    pub fn as_dist_info_name(&self) -> String {
        SEPARATORS.replace_all(&self.0, "_").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_case() {
        assert_eq!(
            "Friendly-Bard".parse::<PackageName>().unwrap().as_str(),
            "friendly-bard"
        );
        assert_eq!(
            "Friendly_Bard".parse::<PackageName>().unwrap().as_str(),
            "friendly-bard"
        );
        assert_eq!(
            "FRIENDLY--BARD".parse::<PackageName>().unwrap().as_str(),
            "friendly-bard"
        );
    }

    #[test]
    fn dist_info_form_uses_underscore() {
        let name: PackageName = "friendly-bard".parse().unwrap();
        assert_eq!(name.as_dist_info_name(), "friendly_bard");
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!("foo bar".parse::<PackageName>().is_err());
        assert!("foo@bar".parse::<PackageName>().is_err());
    }
}
