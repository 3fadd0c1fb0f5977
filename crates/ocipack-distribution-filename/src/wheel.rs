use std::fmt;
use std::str::FromStr;

use ocipack_pep440::{Version, VersionParseError, VersionSpecifiers};
use ocipack_platform_tags::{TagCompatibility, Tags};
use url::Url;

use crate::build_tag::{BuildTag, BuildTagError};
use crate::package_name::{InvalidNameError, PackageName};

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum WheelFilenameError {
    #[error("invalid wheel filename `{0}`: {1}")]
    InvalidWheelFileName(String, String),
    #[error("invalid package name in wheel filename `{0}`: {1}")]
    InvalidPackageName(String, InvalidNameError),
    #[error("invalid version in wheel filename `{0}`: {1}")]
    InvalidVersion(String, VersionParseError),
    #[error("invalid build tag in wheel filename `{0}`: {1}")]
    InvalidBuildTag(String, BuildTagError),
}

/// `distribution-version[-build]-python-abi-platform.whl`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    pub build_tag: Option<BuildTag>,
    pub python_tag: Vec<String>,
    pub abi_tag: Vec<String>,
    pub platform_tag: Vec<String>,
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let stem = filename.strip_suffix(".whl").ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "must end with .whl".to_string(),
            )
        })?;
        Self::parse(stem, filename)
    }
}

impl fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.whl",
            self.name.as_dist_info_name(),
            self.version,
            self.get_tag()
        )
    }
}

impl WheelFilename {
    pub fn is_compatible(&self, tags: &Tags) -> bool {
        tags.is_compatible(&self.python_tag, &self.abi_tag, &self.platform_tag)
    }

    pub fn compatibility(&self, tags: &Tags) -> TagCompatibility {
        tags.compatibility(&self.python_tag, &self.abi_tag, &self.platform_tag)
    }

    /// Conservative filter: only rejects filenames whose tags unambiguously
    /// declare incompatibility with `specifiers`; unknown tag shapes pass.
    pub fn matches_requires_python(&self, specifiers: &VersionSpecifiers) -> bool {
        self.abi_tag.iter().any(|abi_tag| {
            if abi_tag == "abi3" {
                true
            } else if abi_tag == "none" {
                self.python_tag.iter().any(|python_tag| {
                    if python_tag.starts_with("py2") {
                        return false;
                    }
                    let Some(minor) = python_tag
                        .strip_prefix("cp3")
                        .or_else(|| python_tag.strip_prefix("pp3"))
                        .or_else(|| python_tag.strip_prefix("py3"))
                    else {
                        return true;
                    };
                    let Ok(minor) = minor.parse::<u64>() else {
                        return true;
                    };
                    specifiers.contains(&minor_version(minor))
                })
            } else if abi_tag.starts_with("cp2") || abi_tag.starts_with("pypy2") {
                false
            } else if let Some(rest) = abi_tag.strip_prefix("cp3") {
                let digits = rest.trim_matches(char::is_alphabetic);
                let Ok(minor) = digits.parse::<u64>() else {
                    return true;
                };
                specifiers.contains(&minor_version(minor))
            } else if let Some(rest) = abi_tag.strip_prefix("pypy3") {
                let Some((digits, _)) = rest.split_once('_') else {
                    return true;
                };
                let Ok(minor) = digits.parse::<u64>() else {
                    return true;
                };
                specifiers.contains(&minor_version(minor))
            } else {
                true
            }
        })
    }

    pub fn stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.name.as_dist_info_name(),
            self.version,
            self.get_tag()
        )
    }

    pub fn from_stem(stem: &str) -> Result<Self, WheelFilenameError> {
        Self::parse(stem, stem)
    }

    fn get_tag(&self) -> String {
        format!(
            "{}-{}-{}",
            self.python_tag.join("."),
            self.abi_tag.join("."),
            self.platform_tag.join(".")
        )
    }

    fn parse(stem: &str, filename: &str) -> Result<Self, WheelFilenameError> {
        // Five or six dash-separated components; six means the third is a
        // build tag. https://peps.python.org/pep-0427/#file-name-convention
        let mut parts = stem.split('-');

        let name = parts.next().expect("split always yields 1+ elements");

        let version = parts.next().ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "must have a version".to_string(),
            )
        })?;

        let third = parts.next().ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "must have a python tag".to_string(),
            )
        })?;

        let fourth = parts.next().ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "must have an abi tag".to_string(),
            )
        })?;

        let fifth = parts.next().ok_or_else(|| {
            WheelFilenameError::InvalidWheelFileName(
                filename.to_string(),
                "must have a platform tag".to_string(),
            )
        })?;

        let (build_tag, python_tag, abi_tag, platform_tag) = if let Some(sixth) = parts.next() {
            if parts.next().is_some() {
                return Err(WheelFilenameError::InvalidWheelFileName(
                    filename.to_string(),
                    "must have 5 or 6 components".to_string(),
                ));
            }
            (Some(third), fourth, fifth, sixth)
        } else {
            (None, third, fourth, fifth)
        };

        let name = PackageName::from_str(name)
            .map_err(|err| WheelFilenameError::InvalidPackageName(filename.to_string(), err))?;
        let version = Version::from_str(version)
            .map_err(|err| WheelFilenameError::InvalidVersion(filename.to_string(), err))?;
        let build_tag = build_tag
            .map(|bt| {
                BuildTag::from_str(bt)
                    .map_err(|err| WheelFilenameError::InvalidBuildTag(filename.to_string(), err))
            })
            .transpose()?;

        Ok(Self {
            name,
            version,
            build_tag,
            python_tag: python_tag.split('.').map(String::from).collect(),
            abi_tag: abi_tag.split('.').map(String::from).collect(),
            platform_tag: platform_tag.split('.').map(String::from).collect(),
        })
    }
}

impl TryFrom<&Url> for WheelFilename {
    type Error = WheelFilenameError;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let filename = url
            .path_segments()
            .ok_or_else(|| {
                WheelFilenameError::InvalidWheelFileName(
                    url.to_string(),
                    "URL must have a path".to_string(),
                )
            })?
            .last()
            .ok_or_else(|| {
                WheelFilenameError::InvalidWheelFileName(
                    url.to_string(),
                    "URL must have a trailing path segment".to_string(),
                )
            })?;
        Self::from_str(filename)
    }
}

fn minor_version(minor: u64) -> Version {
    // Two-segment `3.{minor}` version used purely for specifier matching.
    format!("3.{minor}").parse().expect("well-formed version")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_five_component_filename() {
        let wf: WheelFilename = "foo-1.2.3-py3-none-any.whl".parse().unwrap();
        assert_eq!(wf.name.as_str(), "foo");
        assert_eq!(wf.version.to_string(), "1.2.3");
        assert_eq!(wf.build_tag, None);
        assert_eq!(wf.python_tag, vec!["py3"]);
    }

    #[test]
    fn parses_six_component_filename_with_build_tag() {
        let wf: WheelFilename = "foo-1.2.3-1-py3-none-any.whl".parse().unwrap();
        assert_eq!(wf.build_tag.unwrap().to_string(), "1");
    }

    #[test]
    fn rejects_missing_whl_suffix() {
        assert!("foo-1.2.3-py3-none-any".parse::<WheelFilename>().is_err());
    }

    #[test]
    fn rejects_too_many_components() {
        assert!("foo-1.2.3-1-py3-none-any-extra.whl"
            .parse::<WheelFilename>()
            .is_err());
    }

    #[test]
    fn stem_and_display_roundtrip() {
        let wf: WheelFilename = "foo-1.2.3-py3-none-any.whl".parse().unwrap();
        assert_eq!(wf.to_string(), "foo-1.2.3-py3-none-any.whl");
        assert_eq!(WheelFilename::from_stem(&wf.stem()).unwrap(), wf);
    }

    #[test]
    fn requires_python_drops_py2() {
        let wf: WheelFilename = "foo-1.0-py2-none-any.whl".parse().unwrap();
        let specifiers: VersionSpecifiers = ">=3.8".parse().unwrap();
        assert!(!wf.matches_requires_python(&specifiers));
    }

    #[test]
    fn requires_python_included() {
        let wf: WheelFilename = "foo-1.0-cp310-cp310-manylinux1_x86_64.whl".parse().unwrap();
        let specifiers: VersionSpecifiers = ">=3.8".parse().unwrap();
        assert!(wf.matches_requires_python(&specifiers));
    }

    #[test]
    fn requires_python_excluded() {
        let wf: WheelFilename = "foo-1.0-cp37-cp37m-manylinux1_x86_64.whl".parse().unwrap();
        let specifiers: VersionSpecifiers = ">=3.8".parse().unwrap();
        assert!(!wf.matches_requires_python(&specifiers));
    }
}
