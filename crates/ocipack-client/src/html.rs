//! Parsing of the HTML5 "simple" package index format: a page of `<a href>`
//! links, one per distribution file, decorated with `data-*` attributes.

use std::collections::HashMap;

use tl::{HTMLTag, ParserOptions};
use url::Url;

use crate::error::ClientError;

/// One `<a>` element on an index page.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub text: String,
    pub href: Url,
    pub data: HashMap<String, String>,
}

impl Anchor {
    pub fn yanked(&self) -> Option<&str> {
        self.data.get("data-yanked").map(String::as_str)
    }

    pub fn requires_python(&self) -> Option<&str> {
        self.data.get("data-requires-python").map(String::as_str)
    }
}

/// A parsed package index page: every anchor, resolved against the page's
/// effective base URL.
#[derive(Debug, Clone)]
pub struct IndexPage {
    pub base: Url,
    pub anchors: Vec<Anchor>,
}

/// Invoked with the parsed DOM before anchors are walked, so callers can
/// check a declared repository-version attribute on the root element.
pub type PreWalkHook<'a> = dyn Fn(&tl::VDom) -> Result<(), ClientError> + 'a;

impl IndexPage {
    pub fn parse(html: &str, url: &Url, pre_walk: Option<&PreWalkHook>) -> Result<Self, ClientError> {
        let dom = tl::parse(html, ParserOptions::default())
            .map_err(|err| ClientError::HtmlParse(err.to_string()))?;

        if let Some(hook) = pre_walk {
            hook(&dom)?;
        }

        let parser = dom.parser();
        let base = dom
            .nodes()
            .iter()
            .filter_map(|node| node.as_tag())
            .take_while(|tag| !matches!(tag.name().as_bytes(), b"a" | b"link"))
            .find(|tag| tag.name().as_bytes() == b"base")
            .and_then(|tag| attr(tag, "href"))
            .and_then(|href| Url::parse(&href).ok())
            .unwrap_or_else(|| url.clone());

        let anchors = dom
            .nodes()
            .iter()
            .filter_map(|node| node.as_tag())
            .filter(|tag| tag.name().as_bytes() == b"a")
            .map(|tag| parse_anchor(tag, &base, parser))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { base, anchors })
    }
}

fn attr(tag: &HTMLTag, name: &str) -> Option<String> {
    tag.attributes()
        .get(name)
        .flatten()
        .map(|bytes| html_escape::decode_html_entities(&String::from_utf8_lossy(bytes.as_bytes())).into_owned())
}

fn parse_anchor(tag: &HTMLTag, base: &Url, parser: &tl::Parser) -> Result<Anchor, ClientError> {
    let href = attr(tag, "href").filter(|s| !s.is_empty()).ok_or(ClientError::MissingHref)?;
    let resolved = base.join(&href)?;

    let mut data = HashMap::new();
    for (key, value) in tag.attributes().iter() {
        let name = key.as_utf8_str();
        if name.starts_with("data-") {
            let value = value.map(|v| v.as_utf8_str().into_owned()).unwrap_or_default();
            data.insert(name.into_owned(), html_escape::decode_html_entities(&value).into_owned());
        }
    }

    let text = tag.inner_text(parser).to_string();

    Ok(Anchor { text, href: resolved, data })
}

/// A pre-walk hook enforcing a `pypi:repository-version`-style `<meta>` tag:
/// the page's declared major version must match `supported_major`; a higher
/// minor only warns.
pub fn check_repository_version(
    dom: &tl::VDom,
    supported_major: u64,
    supported_minor: u64,
) -> Result<(), ClientError> {
    let Some(version) = dom
        .nodes()
        .iter()
        .filter_map(|node| node.as_tag())
        .find(|tag| {
            tag.name().as_bytes() == b"meta"
                && attr(tag, "name").as_deref() == Some("pypi:repository-version")
        })
        .and_then(|tag| attr(tag, "content"))
    else {
        return Ok(());
    };

    let Some((major, minor)) = version.split_once('.') else {
        return Ok(());
    };
    let (Ok(major), Ok(minor)) = (major.parse::<u64>(), minor.parse::<u64>()) else {
        return Ok(());
    };

    if major != supported_major {
        return Err(ClientError::UnsupportedRepositoryVersion(major, supported_major));
    }
    if minor > supported_minor {
        tracing::warn!(
            "package index declares repository-version {major}.{minor}, newer than the \
             supported {supported_major}.{supported_minor}; some fields may be ignored"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<!DOCTYPE html>
<html>
  <body>
    <h1>Links for jinja2</h1>
    <a href="/whl/Jinja2-3.1.2-py3-none-any.whl#sha256=6088930bfe239f0e6710546ab9c19c9ef35e29792895fed6e6e31a023a182a6" data-requires-python="&gt;=3.7">Jinja2-3.1.2-py3-none-any.whl</a><br/>
  </body>
</html>
"#;

    #[test]
    fn parses_anchor_with_hash_and_requires_python() {
        let base = Url::parse("https://pypi.org/simple/jinja2/").unwrap();
        let page = IndexPage::parse(PAGE, &base, None).unwrap();
        assert_eq!(page.anchors.len(), 1);
        let anchor = &page.anchors[0];
        assert_eq!(anchor.href.fragment(), Some("sha256=6088930bfe239f0e6710546ab9c19c9ef35e29792895fed6e6e31a023a182a6"));
        assert_eq!(anchor.requires_python(), Some(">=3.7"));
    }

    #[test]
    fn rejects_missing_href() {
        let base = Url::parse("https://pypi.org/simple/jinja2/").unwrap();
        let html = r#"<a>Jinja2-3.1.2-py3-none-any.whl</a>"#;
        assert!(matches!(
            IndexPage::parse(html, &base, None),
            Err(ClientError::MissingHref)
        ));
    }

    #[test]
    fn base_tag_overrides_resolution() {
        let base = Url::parse("https://pypi.org/simple/jinja2/").unwrap();
        let html = r#"<base href="https://mirror.example/simple/jinja2/"><a href="Jinja2-3.1.2-py3-none-any.whl#sha256=abc">x</a>"#;
        let page = IndexPage::parse(html, &base, None).unwrap();
        assert_eq!(page.base.as_str(), "https://mirror.example/simple/jinja2/");
        assert_eq!(
            page.anchors[0].href.as_str(),
            "https://mirror.example/simple/jinja2/Jinja2-3.1.2-py3-none-any.whl#sha256=abc"
        );
    }

    #[test]
    fn fails_on_major_version_mismatch() {
        let dom = tl::parse(
            r#"<meta name="pypi:repository-version" content="2.0">"#,
            ParserOptions::default(),
        )
        .unwrap();
        let err = check_repository_version(&dom, 1, 0).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedRepositoryVersion(2, 1)));
    }

    #[test]
    fn warns_on_minor_version_bump() {
        let dom = tl::parse(
            r#"<meta name="pypi:repository-version" content="1.5">"#,
            ParserOptions::default(),
        )
        .unwrap();
        assert!(check_repository_version(&dom, 1, 0).is_ok());
    }
}
