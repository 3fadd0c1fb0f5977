//! Verification of content-addressed checksums embedded in a URL fragment,
//! e.g. `...#sha256=6088930bfe239f...`.

use data_encoding::HEXLOWER_PERMISSIVE;
use md5::{Digest as Md5Digest, Md5};
use sha1::{Digest as Sha1Digest, Sha1};
use sha2::digest::DynDigest;
use sha2::{Digest as Sha2Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::ClientError;

/// Computes the digest named by `algorithm` over `body` and compares it
/// (case-insensitively, hex-encoded) against `expected_hex`.
///
/// Supported algorithms: `md5`, `sha1`, `sha224`, `sha256`, `sha384`,
/// `sha512`. Any other algorithm name is rejected before hashing.
pub fn verify(url: &str, algorithm: &str, expected_hex: &str, body: &[u8]) -> Result<(), ClientError> {
    let digest = hash(algorithm, body)
        .ok_or_else(|| ClientError::UnsupportedHashAlgorithm(algorithm.to_string()))?;
    let actual_hex = HEXLOWER_PERMISSIVE.encode(&digest);
    if !actual_hex.eq_ignore_ascii_case(expected_hex) {
        return Err(ClientError::ChecksumMismatch(
            url.to_string(),
            format!("{algorithm}={expected_hex}"),
            format!("{algorithm}={actual_hex}"),
        ));
    }
    Ok(())
}

fn hash(algorithm: &str, body: &[u8]) -> Option<Vec<u8>> {
    let mut hasher: Box<dyn DynDigest> = match algorithm {
        "md5" => Box::new(Md5::new()),
        "sha1" => Box::new(Sha1::new()),
        "sha224" => Box::new(Sha224::new()),
        "sha256" => Box::new(Sha256::new()),
        "sha384" => Box::new(Sha384::new()),
        "sha512" => Box::new(Sha512::new()),
        _ => return None,
    };
    hasher.update(body);
    Some(hasher.finalize().to_vec())
}

/// Splits a URL fragment of the form `algorithm=hexdigest` into its parts.
pub fn parse_fragment(fragment: &str) -> Result<(&str, &str), ClientError> {
    let (algorithm, value) = fragment
        .split_once('=')
        .ok_or_else(|| ClientError::MalformedFragment(fragment.to_string()))?;
    if value.is_empty() || value.contains('=') {
        return Err(ClientError::MalformedFragment(fragment.to_string()));
    }
    Ok((algorithm, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_sha256() {
        use sha2::Digest;
        let body = b"hello world";
        let mut hasher = Sha256::new();
        hasher.update(body);
        let expected = HEXLOWER_PERMISSIVE.encode(&hasher.finalize());
        assert!(verify("u", "sha256", &expected, body).is_ok());
    }

    #[test]
    fn detects_mismatch() {
        let err = verify("u", "sha256", "0000", b"hello world").unwrap_err();
        assert!(matches!(err, ClientError::ChecksumMismatch(..)));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err = verify("u", "sha3", "0000", b"x").unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedHashAlgorithm(_)));
    }

    #[test]
    fn parses_fragment() {
        assert_eq!(parse_fragment("sha256=abcd").unwrap(), ("sha256", "abcd"));
        assert!(parse_fragment("sha256").is_err());
        assert!(parse_fragment("sha256=").is_err());
    }
}
