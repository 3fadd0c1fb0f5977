use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

/// Error returned when a string does not match the version grammar.
#[derive(Debug, thiserror::Error, Eq, PartialEq, Clone)]
#[error("invalid version: `{0}`")]
pub struct VersionParseError(pub String);

/// A pre-release label: `a`, `b`, or `rc`. Spelling aliases (`alpha`, `beta`,
/// `c`, `pre`, `preview`) are folded into one of these three at parse time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PrereleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl fmt::Display for PrereleaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        })
    }
}

impl PrereleaseKind {
    fn from_label(label: &str) -> Self {
        match label {
            "a" | "alpha" => Self::Alpha,
            "b" | "beta" => Self::Beta,
            "rc" | "c" | "pre" | "preview" => Self::Rc,
            other => unreachable!("regex only captures known pre labels, got {other}"),
        }
    }
}

/// A pre-release segment: label plus an (implicit-zero) number.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Prerelease {
    pub kind: PrereleaseKind,
    pub number: u64,
}

impl fmt::Display for Prerelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.number)
    }
}

/// One segment of a local version label: either a non-negative integer or a
/// lowercase alphanumeric string.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum LocalSegment {
    Number(u64),
    String(String),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            // Numeric segments always sort greater than string segments.
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct VersionInner {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<Prerelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

/// An immutable, ordered PEP 440-shaped version identifier.
///
/// Cheap to clone (backed by `Arc`); once parsed a `Version` never mutates in
/// place — the `with_*` methods return a new value.
#[derive(Clone, Eq)]
pub struct Version(Arc<VersionInner>);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Version").field(&self.to_string()).finish()
    }
}

/// The canonical (non-lowercased) PEP 440 pattern: optional leading `v`,
/// optional epoch, dotted release, optional pre/post/dev, optional local.
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:
                [-_.]?
                (?P<post_l>post|rev|r)
                [-_.]?
                (?P<post_n2>[0-9]+)?
            )
        )?
        (?P<dev>
            [-_.]?
            (?P<dev_l>dev)
            [-_.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$
        ",
    )
    .expect("static regex is valid")
});

fn parse_local(raw: &str) -> Vec<LocalSegment> {
    raw.split(['-', '_', '.'])
        .map(|segment| {
            let lower = segment.to_ascii_lowercase();
            if lower.chars().all(|c| c.is_ascii_digit()) && !lower.is_empty() {
                LocalSegment::Number(lower.parse().unwrap_or(0))
            } else {
                LocalSegment::String(lower)
            }
        })
        .collect()
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError(version.to_string()))?;

        let epoch = caps
            .name("epoch")
            .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
            .unwrap_or(0);

        let release: Vec<u64> = caps["release"]
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect();

        let pre = caps.name("pre_l").map(|label| {
            let number = caps
                .name("pre_n")
                .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
                .unwrap_or(0);
            Prerelease {
                kind: PrereleaseKind::from_label(&label.as_str().to_ascii_lowercase()),
                number,
            }
        });

        let post = if caps.name("post_n1").is_some() || caps.name("post_l").is_some() {
            let number = caps
                .name("post_n1")
                .or_else(|| caps.name("post_n2"))
                .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
                .unwrap_or(0);
            Some(number)
        } else {
            None
        };

        let dev = caps.name("dev_l").map(|_| {
            caps.name("dev_n")
                .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
                .unwrap_or(0)
        });

        let local = caps
            .name("local")
            .map(|m| parse_local(m.as_str()))
            .unwrap_or_default();

        Ok(Self(Arc::new(VersionInner {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })))
    }
}

impl Version {
    pub fn epoch(&self) -> u64 {
        self.0.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.0.release
    }

    pub fn pre(&self) -> Option<Prerelease> {
        self.0.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.0.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.0.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.0.local
    }

    pub fn is_prerelease(&self) -> bool {
        self.0.pre.is_some() || self.0.dev.is_some()
    }

    pub fn is_stable(&self) -> bool {
        !self.is_prerelease()
    }

    #[must_use]
    pub fn with_release(&self, release: Vec<u64>) -> Self {
        let mut inner = (*self.0).clone();
        inner.release = release;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn with_epoch(&self, epoch: u64) -> Self {
        let mut inner = (*self.0).clone();
        inner.epoch = epoch;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn with_pre(&self, pre: Option<Prerelease>) -> Self {
        let mut inner = (*self.0).clone();
        inner.pre = pre;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn with_post(&self, post: Option<u64>) -> Self {
        let mut inner = (*self.0).clone();
        inner.post = post;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn with_dev(&self, dev: Option<u64>) -> Self {
        let mut inner = (*self.0).clone();
        inner.dev = dev;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn with_local(&self, local: Vec<LocalSegment>) -> Self {
        let mut inner = (*self.0).clone();
        inner.local = local;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn without_local(&self) -> Self {
        self.with_local(Vec::new())
    }

    /// Just the epoch and release segments, dropping pre/post/dev/local.
    #[must_use]
    pub fn only_release(&self) -> Self {
        Self(Arc::new(VersionInner {
            epoch: self.0.epoch,
            release: self.0.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }))
    }

    /// Release with trailing zeros trimmed (but at least one segment kept).
    fn trimmed_release(&self) -> Vec<u64> {
        let mut release = self.0.release.clone();
        while release.len() > 1 && *release.last().unwrap() == 0 {
            release.pop();
        }
        release
    }

    #[allow(dead_code)]
    fn padded_release(&self, len: usize) -> Vec<u64> {
        let mut release = self.0.release.clone();
        release.resize(len.max(release.len()), 0);
        release
    }
}

/// The `_pre` slot of the comparison key: dev-only sorts below any
/// pre-release; a stable (no-pre) version sorts above any pre-release but
/// below a post-release of the same otherwise-equal prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum PreKey {
    NegInf,
    Pre(Prerelease),
    Inf,
}

fn pre_key(v: &Version) -> PreKey {
    match (v.pre(), v.post(), v.dev()) {
        (None, None, Some(_)) => PreKey::NegInf,
        (None, _, _) => PreKey::Inf,
        (Some(pre), _, _) => PreKey::Pre(pre),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum PostKey {
    NegInf,
    Post(u64),
}

fn post_key(v: &Version) -> PostKey {
    match v.post() {
        None => PostKey::NegInf,
        Some(n) => PostKey::Post(n),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum DevKey {
    Dev(u64),
    Inf,
}

fn dev_key(v: &Version) -> DevKey {
    match v.dev() {
        None => DevKey::Inf,
        Some(n) => DevKey::Dev(n),
    }
}

fn local_key(v: &Version) -> Option<&[LocalSegment]> {
    if v.local().is_empty() {
        None
    } else {
        Some(v.local())
    }
}

fn cmp_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn cmp_local(a: Option<&[LocalSegment]>, b: Option<&[LocalSegment]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        // Absence of a local part sorts strictly below any present local part.
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match x.cmp(y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            // Prefix equal: the longer local (extending the shorter) sorts greater.
            a.len().cmp(&b.len())
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch()
            .cmp(&other.epoch())
            .then_with(|| cmp_release(self.release(), other.release()))
            .then_with(|| pre_key(self).cmp(&pre_key(other)))
            .then_with(|| post_key(self).cmp(&post_key(other)))
            .then_with(|| dev_key(self).cmp(&dev_key(other)))
            .then_with(|| cmp_local(local_key(self), local_key(other)))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.epoch().hash(state);
        self.trimmed_release().hash(state);
        self.pre().hash(state);
        self.post().hash(state);
        self.dev().hash(state);
        self.local().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch() != 0 {
            write!(f, "{}!", self.epoch())?;
        }
        let release = self
            .release()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&release)?;
        if let Some(pre) = self.pre() {
            write!(f, "{pre}")?;
        }
        if let Some(post) = self.post() {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev() {
            write!(f, ".dev{dev}")?;
        }
        if !self.local().is_empty() {
            let local = self
                .local()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
