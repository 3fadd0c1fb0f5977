//! Fetches HTML5 package indices, verifies content-addressed checksums, and
//! selects the best-matching wheel for a target platform.

mod checksum;
mod client;
mod error;
mod html;
mod select;

pub use checksum::{parse_fragment, verify as verify_checksum};
pub use client::Client;
pub use error::ClientError;
pub use html::{check_repository_version, Anchor, IndexPage, PreWalkHook};
pub use select::{parse_candidates, select_wheel, Candidate};
