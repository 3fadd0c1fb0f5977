use std::cmp;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// A single compatible tag for some wheel, paired with its preference rank.
///
/// Higher is more preferred; built by [`Tags::new`] from the order tags are
/// given in (earlier entries rank higher).
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TagPriority(NonZeroU32);

impl TryFrom<usize> for TagPriority {
    type Error = std::num::TryFromIntError;

    fn try_from(priority: usize) -> Result<Self, Self::Error> {
        let priority = u32::try_from(priority)?;
        Ok(Self(NonZeroU32::try_from(priority.saturating_add(1))?))
    }
}

/// The component of a `(python, abi, platform)` triple that first failed to
/// match, ordered worst-to-best so the closest-matching failure sorts
/// highest among incompatible candidates.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum IncompatibleTag {
    Invalid,
    Python,
    Abi,
    Platform,
}

#[derive(Debug, Eq, PartialEq)]
pub enum TagCompatibility {
    Incompatible(IncompatibleTag),
    Compatible(TagPriority),
}

impl TagCompatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible(_))
    }
}

impl Ord for TagCompatibility {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (self, other) {
            (Self::Compatible(a), Self::Compatible(b)) => a.cmp(b),
            (Self::Incompatible(_), Self::Compatible(_)) => cmp::Ordering::Less,
            (Self::Compatible(_), Self::Incompatible(_)) => cmp::Ordering::Greater,
            (Self::Incompatible(a), Self::Incompatible(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for TagCompatibility {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A wheel filename's `python-abi-platform` tag segment, each component a
/// dot-separated set of labels (e.g. `py2.py3`).
///
/// "Decompresses" into the Cartesian product of its components for matching
/// against a [`Tags`] compatibility set.
#[derive(Debug, Clone)]
pub struct CompatibilityTag {
    pub python: Vec<String>,
    pub abi: Vec<String>,
    pub platform: Vec<String>,
}

impl CompatibilityTag {
    pub fn parse(python: &str, abi: &str, platform: &str) -> Self {
        Self {
            python: python.split('.').map(String::from).collect(),
            abi: abi.split('.').map(String::from).collect(),
            platform: platform.split('.').map(String::from).collect(),
        }
    }

    /// The Cartesian product of the three label sets, one singleton triple
    /// per combination.
    pub fn decompress(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.python.iter().flat_map(move |py| {
            self.abi.iter().flat_map(move |abi| {
                self.platform
                    .iter()
                    .map(move |plat| (py.as_str(), abi.as_str(), plat.as_str()))
            })
        })
    }
}

/// An ordered, queryable set of `(python_tag, abi_tag, platform_tag)` triples
/// that a target interpreter/platform combination supports.
///
/// Tags passed earlier to [`Tags::new`] are preferred over tags passed
/// later; [`Tags::compatibility`] reports that preference as a
/// [`TagPriority`] so callers can rank multiple compatible wheels.
#[derive(Debug, Clone)]
pub struct Tags {
    #[allow(clippy::type_complexity)]
    map: Arc<FxHashMap<String, FxHashMap<String, FxHashMap<String, TagPriority>>>>,
}

impl Tags {
    pub fn new(tags: Vec<(String, String, String)>) -> Self {
        let mut map: FxHashMap<String, FxHashMap<String, FxHashMap<String, TagPriority>>> =
            FxHashMap::default();
        for (index, (py, abi, platform)) in tags.into_iter().rev().enumerate() {
            map.entry(py)
                .or_default()
                .entry(abi)
                .or_default()
                .entry(platform)
                .or_insert(TagPriority::try_from(index).expect("tag count fits in u32"));
        }
        Self { map: Arc::new(map) }
    }

    /// The standard CPython tag precedence for `python_version` against the
    /// given ordered list of platform tags (most specific first), e.g.
    /// `["manylinux_2_28_x86_64", "linux_x86_64"]`.
    ///
    /// Order of preference, most to least specific:
    /// 1. `cpXY-cpXY[m]-{platform}` (exact ABI)
    /// 2. `cpXY-abi3-{platform}` (stable ABI, this and earlier 3.x)
    /// 3. `cpXY-none-{platform}` / `pyXY-none-{platform}` (no extension module)
    /// 4. `py3-none-{platform}`
    /// 5. `pyXY-none-any` / `py3-none-any` (pure Python, any platform)
    pub fn from_env(python_version: (u8, u8), platform_tags: &[String]) -> Self {
        let (major, minor) = python_version;
        let mut tags = Vec::with_capacity(5 * platform_tags.len());

        for platform_tag in platform_tags {
            tags.push((
                format!("cp{major}{minor}"),
                format!("cp{major}{minor}{}", if minor <= 7 { "m" } else { "" }),
                platform_tag.clone(),
            ));
            tags.push((
                format!("cp{major}{minor}"),
                "none".to_string(),
                platform_tag.clone(),
            ));
        }
        for abi3_minor in (2..=minor).rev() {
            for platform_tag in platform_tags {
                tags.push((
                    format!("cp{major}{abi3_minor}"),
                    "abi3".to_string(),
                    platform_tag.clone(),
                ));
            }
        }
        for py_minor in (0..=minor).rev() {
            for platform_tag in platform_tags {
                tags.push((
                    format!("py{major}{py_minor}"),
                    "none".to_string(),
                    platform_tag.clone(),
                ));
            }
        }
        for platform_tag in platform_tags {
            tags.push((format!("py{major}"), "none".to_string(), platform_tag.clone()));
        }
        for py_minor in (0..=minor).rev() {
            tags.push((format!("py{major}{py_minor}"), "none".to_string(), "any".to_string()));
        }
        tags.push((format!("py{major}"), "none".to_string(), "any".to_string()));

        Self::new(tags)
    }

    /// True if any decompressed triple of `tag` appears in this set.
    pub fn is_compatible(&self, python: &[String], abi: &[String], platform: &[String]) -> bool {
        for py in python {
            let Some(abis) = self.map.get(py) else {
                continue;
            };
            for a in abi {
                let Some(platforms) = abis.get(a) else {
                    continue;
                };
                for p in platform {
                    if platforms.contains_key(p) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// The best (highest-priority) compatibility verdict across every
    /// decompressed triple, or the closest-matching incompatibility if none
    /// match.
    pub fn compatibility(
        &self,
        python: &[String],
        abi: &[String],
        platform: &[String],
    ) -> TagCompatibility {
        let mut best = TagCompatibility::Incompatible(IncompatibleTag::Invalid);
        for py in python {
            let Some(abis) = self.map.get(py) else {
                best = best.max(TagCompatibility::Incompatible(IncompatibleTag::Python));
                continue;
            };
            for a in abi {
                let Some(platforms) = abis.get(a) else {
                    best = best.max(TagCompatibility::Incompatible(IncompatibleTag::Abi));
                    continue;
                };
                for p in platform {
                    best = best.max(match platforms.get(p) {
                        Some(priority) => TagCompatibility::Compatible(*priority),
                        None => TagCompatibility::Incompatible(IncompatibleTag::Platform),
                    });
                }
            }
        }
        best
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut all = Vec::new();
        for (py, abis) in self.map.iter() {
            for (abi, platforms) in abis {
                for (platform, priority) in platforms {
                    all.push((*priority, format!("{py}-{abi}-{platform}")));
                }
            }
        }
        all.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, tag) in all {
            writeln!(f, "{tag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompress_cartesian_product() {
        let tag = CompatibilityTag::parse("py2.py3", "none", "any");
        let triples: Vec<_> = tag.decompress().collect();
        assert_eq!(triples, vec![("py2", "none", "any"), ("py3", "none", "any")]);
    }

    #[test]
    fn exact_abi_preferred_over_none() {
        let tags = Tags::from_env((3, 10), &["manylinux_2_17_x86_64".to_string()]);
        let exact =
            tags.compatibility(&["cp310".into()], &["cp310".into()], &["manylinux_2_17_x86_64".into()]);
        let none =
            tags.compatibility(&["cp310".into()], &["none".into()], &["manylinux_2_17_x86_64".into()]);
        assert!(exact.is_compatible());
        assert!(none.is_compatible());
        assert!(exact > none);
    }

    #[test]
    fn pure_python_any_is_compatible() {
        let tags = Tags::from_env((3, 10), &["manylinux_2_17_x86_64".to_string()]);
        assert!(tags.is_compatible(&["py3".into()], &["none".into()], &["any".into()]));
    }

    #[test]
    fn unknown_python_tag_is_incompatible() {
        let tags = Tags::from_env((3, 10), &["manylinux_2_17_x86_64".to_string()]);
        let verdict = tags.compatibility(&["cp27".into()], &["none".into()], &["any".into()]);
        assert_eq!(verdict, TagCompatibility::Incompatible(IncompatibleTag::Python));
    }

    #[test]
    fn is_compatible_short_circuits_on_any_matching_triple() {
        let tags = Tags::from_env((3, 9), &["linux_x86_64".to_string()]);
        assert!(!tags.is_compatible(&["cp27".into()], &["none".into()], &["any".into()]));
    }
}
