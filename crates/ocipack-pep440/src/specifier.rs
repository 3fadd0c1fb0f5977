use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::version::{Version, VersionParseError};

#[derive(Debug, thiserror::Error, Eq, PartialEq, Clone)]
pub enum SpecifierParseError {
    #[error("invalid version specifier: `{0}`")]
    Invalid(String),
    #[error("version specifier `===` (arbitrary equality) is not supported")]
    ArbitraryEqualityUnsupported,
    #[error("prefix specifier `{0}` must not carry a dev or local segment")]
    PrefixWithDevOrLocal(String),
    #[error("compatible-release specifier `~={0}` requires at least two release segments")]
    CompatibleReleaseTooShort(String),
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

/// A specifier's relational operator. `===` is recognized only to be
/// rejected — it has no variant here.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operator {
    TildeEqual,
    Equal,
    EqualStar,
    NotEqual,
    NotEqualStar,
    LessThanEqual,
    GreaterThanEqual,
    LessThan,
    GreaterThan,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TildeEqual => "~=",
            Self::Equal | Self::EqualStar => "==",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::LessThanEqual => "<=",
            Self::GreaterThanEqual => ">=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
        })
    }
}

/// One `{operator, version}` clause.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

static SPECIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?x)^\s*(?P<op>~=|===|==|!=|<=|>=|<|>)\s*(?P<version>[^,\s]+)\s*$")
        .expect("static regex is valid")
});

impl FromStr for VersionSpecifier {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SPECIFIER_RE
            .captures(s)
            .ok_or_else(|| SpecifierParseError::Invalid(s.to_string()))?;
        let op_str = &caps["op"];
        let version_str = &caps["version"];

        if op_str == "===" {
            return Err(SpecifierParseError::ArbitraryEqualityUnsupported);
        }

        let (operator, version_text): (Operator, &str) = match op_str {
            "~=" => (Operator::TildeEqual, version_str),
            "==" => match version_str.strip_suffix(".*") {
                Some(prefix) => (Operator::EqualStar, prefix),
                None => (Operator::Equal, version_str),
            },
            "!=" => match version_str.strip_suffix(".*") {
                Some(prefix) => (Operator::NotEqualStar, prefix),
                None => (Operator::NotEqual, version_str),
            },
            "<=" => (Operator::LessThanEqual, version_str),
            ">=" => (Operator::GreaterThanEqual, version_str),
            "<" => (Operator::LessThan, version_str),
            ">" => (Operator::GreaterThan, version_str),
            other => return Err(SpecifierParseError::Invalid(other.to_string())),
        };

        let version: Version = version_text.parse()?;

        match operator {
            Operator::EqualStar | Operator::NotEqualStar => {
                if version.dev().is_some() || !version.local().is_empty() {
                    return Err(SpecifierParseError::PrefixWithDevOrLocal(s.to_string()));
                }
            }
            Operator::TildeEqual => {
                if version.release().len() < 2 {
                    return Err(SpecifierParseError::CompatibleReleaseTooShort(
                        version_text.to_string(),
                    ));
                }
            }
            _ => {}
        }

        Ok(Self { operator, version })
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.version)?;
        if matches!(self.operator, Operator::EqualStar | Operator::NotEqualStar) {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

fn same_base(a: &Version, b: &Version) -> bool {
    a.only_release() == b.only_release()
}

impl VersionSpecifier {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::TildeEqual => self.contains_tilde(version),
            Operator::Equal => self.contains_equal(version),
            Operator::EqualStar => self.contains_prefix(version),
            Operator::NotEqual => !self.contains_equal(version),
            Operator::NotEqualStar => !self.contains_prefix(version),
            Operator::LessThanEqual => version <= &self.version,
            Operator::GreaterThanEqual => version >= &self.version,
            Operator::LessThan => self.contains_less_than(version),
            Operator::GreaterThan => self.contains_greater_than(version),
        }
    }

    fn contains_equal(&self, version: &Version) -> bool {
        if self.version.local().is_empty() {
            version.without_local() == self.version
        } else {
            version == &self.version
        }
    }

    fn contains_prefix(&self, version: &Version) -> bool {
        if version.epoch() != self.version.epoch() {
            return false;
        }
        let spec_release = self.version.release();
        let mut candidate_release = version.release().to_vec();
        if candidate_release.len() < spec_release.len() {
            candidate_release.resize(spec_release.len(), 0);
        }
        if candidate_release[..spec_release.len()] != spec_release[..] {
            return false;
        }
        if let Some(spec_pre) = self.version.pre() {
            match version.pre() {
                Some(candidate_pre) if candidate_pre == spec_pre => {}
                _ => return false,
            }
        }
        if let Some(spec_post) = self.version.post() {
            if version.post() != Some(spec_post) {
                return false;
            }
        }
        true
    }

    fn contains_tilde(&self, version: &Version) -> bool {
        let release = self.version.release();
        let truncated = release[..release.len() - 1].to_vec();
        let prefix_version = self
            .version
            .with_release(truncated)
            .with_pre(None)
            .with_post(None)
            .with_dev(None)
            .without_local();
        let lower_bound = Self {
            operator: Operator::GreaterThanEqual,
            version: self.version.clone(),
        };
        let prefix = Self {
            operator: Operator::EqualStar,
            version: prefix_version,
        };
        lower_bound.contains(version) && prefix.contains(version)
    }

    fn contains_less_than(&self, version: &Version) -> bool {
        if version >= &self.version {
            return false;
        }
        if self.version.pre().is_none() && version.pre().is_some() && same_base(version, &self.version) {
            return false;
        }
        true
    }

    fn contains_greater_than(&self, version: &Version) -> bool {
        if version <= &self.version {
            return false;
        }
        if self.version.post().is_none()
            && version.post().is_some()
            && same_base(version, &self.version)
        {
            return false;
        }
        if !version.local().is_empty() && same_base(version, &self.version) {
            return false;
        }
        true
    }
}

/// A conjunction of specifier clauses (what dependency metadata actually
/// carries, e.g. `>=1.0,<2`).
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl FromStr for VersionSpecifiers {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let clauses = s
            .split(',')
            .map(|part| part.trim().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(clauses))
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}

impl VersionSpecifiers {
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|clause| clause.contains(version))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Governs whether pre-releases are eligible winners of a selection.
#[derive(Clone, Debug, Default)]
pub enum ExclusionBehavior {
    #[default]
    None,
    /// Exclude pre-releases from the preferred tier, except versions in
    /// `allow` (e.g. a user pinned an exact pre-release explicitly).
    ExcludePreReleases { allow: HashSet<Version> },
}

impl ExclusionBehavior {
    fn allows(&self, version: &Version) -> bool {
        match self {
            Self::None => true,
            Self::ExcludePreReleases { allow } => {
                !version.is_prerelease() || allow.contains(version)
            }
        }
    }
}

/// Returns the maximum version that matches `specifiers` and is allowed by
/// `exclusion` and `extra_allowed` (e.g. "not yanked"); if no allowed
/// candidate matches, falls back to the maximum matching-but-excluded
/// candidate; if none match at all, returns `None`.
pub fn select_best<'a>(
    candidates: impl IntoIterator<Item = &'a Version>,
    specifiers: &VersionSpecifiers,
    exclusion: &ExclusionBehavior,
    extra_allowed: impl Fn(&Version) -> bool,
) -> Option<Version> {
    let matching: Vec<&Version> = candidates
        .into_iter()
        .filter(|v| specifiers.contains(v))
        .collect();
    if let Some(best) = matching
        .iter()
        .copied()
        .filter(|v| exclusion.allows(v) && extra_allowed(v))
        .max()
    {
        return Some(best.clone());
    }
    matching.into_iter().max().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_arbitrary_equality() {
        assert_eq!(
            "===1.0".parse::<VersionSpecifier>(),
            Err(SpecifierParseError::ArbitraryEqualityUnsupported)
        );
    }

    #[test]
    fn tilde_requires_two_segments() {
        assert!("~=1".parse::<VersionSpecifier>().is_err());
        assert!("~=1.0".parse::<VersionSpecifier>().is_ok());
    }

    #[test]
    fn prefix_rejects_dev_and_local() {
        assert!("==1.0.dev1.*".parse::<VersionSpecifier>().is_err());
        assert!("==1.0+local.*".parse::<VersionSpecifier>().is_err());
    }

    #[test]
    fn tilde_equal_matches() {
        let spec: VersionSpecifier = "~=2.2".parse().unwrap();
        assert!(spec.contains(&v("2.2")));
        assert!(spec.contains(&v("2.3")));
        assert!(!spec.contains(&v("3.0")));
        assert!(!spec.contains(&v("2.1")));
    }

    #[test]
    fn prefix_match_release() {
        let spec: VersionSpecifier = "==1.2.*".parse().unwrap();
        assert!(spec.contains(&v("1.2")));
        assert!(spec.contains(&v("1.2.3")));
        assert!(!spec.contains(&v("1.3")));
    }

    #[test]
    fn prefix_match_post_requires_candidate_post() {
        let spec: VersionSpecifier = "==1.0.post1.*".parse().unwrap();
        assert!(spec.contains(&v("1.0.post1")));
        assert!(!spec.contains(&v("1.0")));
    }

    #[test]
    fn strict_equal_ignores_local_unless_specified() {
        let spec: VersionSpecifier = "==1.0".parse().unwrap();
        assert!(spec.contains(&v("1.0+local")));
        let spec_with_local: VersionSpecifier = "==1.0+local".parse().unwrap();
        assert!(!spec_with_local.contains(&v("1.0")));
        assert!(spec_with_local.contains(&v("1.0+local")));
    }

    #[test]
    fn less_than_excludes_prerelease_of_same_base() {
        let spec: VersionSpecifier = "<1.0".parse().unwrap();
        assert!(!spec.contains(&v("1.0a1")));
        assert!(spec.contains(&v("0.9")));
    }

    #[test]
    fn greater_than_excludes_postrelease_and_local_of_same_base() {
        let spec: VersionSpecifier = ">1.0".parse().unwrap();
        assert!(!spec.contains(&v("1.0.post1")));
        assert!(!spec.contains(&v("1.0+local")));
        assert!(spec.contains(&v("1.1")));
    }

    #[test]
    fn specifier_select_scenario() {
        let candidates = ["1.1", "1.2", "1.2rc1", "2.0"].map(v);
        let specifiers: VersionSpecifiers = ">=1.0,<2".parse().unwrap();
        let exclusion = ExclusionBehavior::ExcludePreReleases {
            allow: HashSet::new(),
        };
        let best = select_best(candidates.iter(), &specifiers, &exclusion, |_| true);
        assert_eq!(best, Some(v("1.2")));
    }

    #[test]
    fn select_falls_back_to_excluded_when_nothing_allowed() {
        let candidates = ["1.0rc1"].map(v);
        let specifiers: VersionSpecifiers = ">=1.0rc1".parse().unwrap();
        let exclusion = ExclusionBehavior::ExcludePreReleases {
            allow: HashSet::new(),
        };
        let best = select_best(candidates.iter(), &specifiers, &exclusion, |_| true);
        assert_eq!(best, Some(v("1.0rc1")));
    }

    #[test]
    fn select_returns_none_when_nothing_matches() {
        let candidates = ["1.0"].map(v);
        let specifiers: VersionSpecifiers = ">=2.0".parse().unwrap();
        let best = select_best(
            candidates.iter(),
            &specifiers,
            &ExclusionBehavior::None,
            |_| true,
        );
        assert_eq!(best, None);
    }
}
