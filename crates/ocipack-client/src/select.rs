//! Wheel selection: turn an index page's anchors into a single winning
//! wheel, applying version matching, yank exclusion, tag compatibility, and
//! build-tag tie-breaking in that order.

use std::collections::HashSet;

use ocipack_distribution_filename::WheelFilename;
use ocipack_pep440::{select_best, ExclusionBehavior, Version, VersionSpecifiers};
use ocipack_platform_tags::{TagCompatibility, Tags};

use crate::html::Anchor;

/// A wheel filename parsed out of an anchor, paired back to its source
/// anchor for URL/yank/requires-python access.
pub struct Candidate<'a> {
    pub anchor: &'a Anchor,
    pub filename: WheelFilename,
}

/// Parses every anchor's filename as a wheel, silently dropping anything
/// that isn't a well-formed wheel filename (sdists, stray links, etc).
pub fn parse_candidates(anchors: &[Anchor]) -> Vec<Candidate<'_>> {
    anchors
        .iter()
        .filter_map(|anchor| {
            WheelFilename::try_from(&anchor.href)
                .ok()
                .map(|filename| Candidate { anchor, filename })
        })
        .collect()
}

/// Selects the winning wheel among `candidates`:
///
/// 1. restrict to wheels whose tags `tags` supports;
/// 2. select the best version via [`select_best`], with yank-exclusion: a
///    version is in the preferred tier only if at least one of its files is
///    not yanked;
/// 3. among the winning version's tag-compatible files, take the one with
///    the most preferred tag;
/// 4. tie-break by build tag.
pub fn select_wheel<'a>(
    candidates: &'a [Candidate<'a>],
    specifiers: &VersionSpecifiers,
    tags: &Tags,
    exclusion: &ExclusionBehavior,
) -> Option<&'a Candidate<'a>> {
    let compatible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.filename.is_compatible(tags))
        .collect();

    let versions: HashSet<Version> = compatible.iter().map(|c| c.filename.version.clone()).collect();

    let not_yanked = |v: &Version| {
        compatible
            .iter()
            .any(|c| &c.filename.version == v && c.anchor.yanked().is_none())
    };

    let best_version = select_best(versions.iter(), specifiers, exclusion, not_yanked)?;

    compatible
        .into_iter()
        .filter(|c| c.filename.version == best_version)
        .max_by(|a, b| {
            let pa = tags.compatibility(&a.filename.python_tag, &a.filename.abi_tag, &a.filename.platform_tag);
            let pb = tags.compatibility(&b.filename.python_tag, &b.filename.abi_tag, &b.filename.platform_tag);
            pa.cmp(&pb).then_with(|| a.filename.build_tag.cmp(&b.filename.build_tag))
        })
}

/// True if `compat` is the compatible variant; a helper so callers don't
/// need to import [`TagCompatibility`] just to check a bool.
pub fn is_compatible(compat: &TagCompatibility) -> bool {
    compat.is_compatible()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use url::Url;

    fn anchor(name: &str, yanked: bool) -> Anchor {
        let href = Url::parse(&format!("https://example.invalid/{name}#sha256=abc")).unwrap();
        let mut data = HashMap::new();
        if yanked {
            data.insert("data-yanked".to_string(), "reason".to_string());
        }
        Anchor { text: name.to_string(), href, data }
    }

    #[test]
    fn selects_highest_non_yanked_compatible_version() {
        let anchors = vec![
            anchor("pkg-1.1-py3-none-any.whl", false),
            anchor("pkg-1.2-py3-none-any.whl", false),
            anchor("pkg-1.2rc1-py3-none-any.whl", false),
            anchor("pkg-2.0-py3-none-any.whl", false),
        ];
        let candidates = parse_candidates(&anchors);
        let specifiers: VersionSpecifiers = ">=1.0,<2".parse().unwrap();
        let tags = Tags::from_env((3, 11), &["any".to_string()]);
        let exclusion = ExclusionBehavior::ExcludePreReleases { allow: HashSet::new() };
        let winner = select_wheel(&candidates, &specifiers, &tags, &exclusion).unwrap();
        assert_eq!(winner.filename.version.to_string(), "1.2");
    }

    #[test]
    fn falls_back_to_yanked_when_nothing_else_matches() {
        let anchors = vec![anchor("pkg-1.0-py3-none-any.whl", true)];
        let candidates = parse_candidates(&anchors);
        let specifiers: VersionSpecifiers = ">=1.0".parse().unwrap();
        let tags = Tags::from_env((3, 11), &["any".to_string()]);
        let winner =
            select_wheel(&candidates, &specifiers, &tags, &ExclusionBehavior::None).unwrap();
        assert_eq!(winner.filename.version.to_string(), "1.0");
    }
}
