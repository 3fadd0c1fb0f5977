use std::io::Read;
use std::time::Duration;

use url::Url;

use crate::checksum;
use crate::error::ClientError;
use crate::html::{IndexPage, PreWalkHook};

/// A minimal synchronous HTTP client for fetching package-index pages and
/// distribution files, verifying any checksum embedded in the request URL's
/// fragment.
pub struct Client {
    agent: ureq::Agent,
    user_agent: String,
}

impl Client {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        Self { agent, user_agent: user_agent.into() }
    }

    /// GETs `url`. If `url` carries a `#algorithm=hexdigest` fragment, the
    /// body is hashed and compared before being returned.
    pub fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError> {
        let response = self
            .agent
            .request("GET", url.as_str())
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => ClientError::BadStatus(url.to_string(), code),
                other => ClientError::Transport(url.to_string(), Box::new(other)),
            })?;

        if response.status() != 200 {
            return Err(ClientError::BadStatus(url.to_string(), response.status()));
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| ClientError::Io(url.to_string(), err))?;

        if let Some(fragment) = url.fragment() {
            let (algorithm, expected_hex) = checksum::parse_fragment(fragment)?;
            checksum::verify(url.as_str(), algorithm, expected_hex, &body)?;
        }

        Ok(body)
    }

    /// Fetches and parses a package's HTML5 index page.
    pub fn fetch_index(&self, url: &Url, pre_walk: Option<&PreWalkHook>) -> Result<IndexPage, ClientError> {
        let body = self.fetch(url)?;
        let text = String::from_utf8_lossy(&body);
        IndexPage::parse(&text, url, pre_walk)
    }
}
