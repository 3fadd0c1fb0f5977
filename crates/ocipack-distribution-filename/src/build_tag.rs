use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum BuildTagError {
    #[error("build tag must not be empty")]
    Empty,
    #[error("build tag must start with a digit")]
    NoLeadingDigit,
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
}

/// The optional build tag for a wheel: must start with a digit, used only as
/// a tie-breaker among otherwise-identical wheel filenames. Sorts as a
/// two-item `(number, remainder)` tuple; unspecified sorts before any
/// specified tag.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BuildTag(u64, Option<String>);

impl FromStr for BuildTag {
    type Err = BuildTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(BuildTagError::Empty);
        }
        let (prefix, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(0) => return Err(BuildTagError::NoLeadingDigit),
            Some(split) => {
                let (prefix, suffix) = s.split_at(split);
                (prefix, Some(suffix.to_string()))
            }
            None => (s, None),
        };
        Ok(Self(prefix.parse::<u64>()?, suffix))
    }
}

impl fmt::Display for BuildTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        if let Some(suffix) = &self.1 {
            f.write_str(suffix)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_only() {
        assert_eq!("123".parse::<BuildTag>().unwrap(), BuildTag(123, None));
    }

    #[test]
    fn numeric_then_string() {
        assert_eq!(
            "123abc".parse::<BuildTag>().unwrap(),
            BuildTag(123, Some("abc".to_string()))
        );
    }

    #[test]
    fn must_start_with_digit() {
        assert_eq!("abc".parse::<BuildTag>(), Err(BuildTagError::NoLeadingDigit));
    }

    #[test]
    fn tie_break_ordering() {
        let a: BuildTag = "1".parse().unwrap();
        let b: BuildTag = "2".parse().unwrap();
        assert!(a < b);
        let c: BuildTag = "1a".parse().unwrap();
        assert!(a < c);
    }
}
