use std::io::{Read, Write};

use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::WheelError;

/// One line of a `RECORD` file.
/// <https://www.python.org/dev/peps/pep-0376/#record>
#[derive(Debug, Clone, Deserialize, Serialize, PartialOrd, Ord, PartialEq, Eq)]
pub struct RecordEntry {
    pub path: String,
    pub hash: Option<String>,
    pub size: Option<u64>,
}

/// `sha256={base64url-nopad digest}`, the only hash encoding RECORD uses.
pub fn encoded_sha256(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("sha256={}", BASE64URL_NOPAD.encode(&digest))
}

pub fn read_record<R: Read>(reader: R) -> Result<Vec<RecordEntry>, WheelError> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .escape(Some(b'"'))
        .from_reader(reader)
        .deserialize()
        .map(|entry| {
            let entry: RecordEntry =
                entry.map_err(|err| WheelError::Record(err.to_string()))?;
            Ok(RecordEntry {
                // some wheels store absolute paths for their own RECORD entry
                path: entry.path.trim_start_matches('/').to_string(),
                ..entry
            })
        })
        .collect()
}

pub fn write_record<W: Write>(writer: W, entries: &[RecordEntry]) -> Result<(), WheelError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .escape(b'"')
        .from_writer(writer);
    for entry in entries {
        writer
            .serialize(entry)
            .map_err(|err| WheelError::Record(err.to_string()))?;
    }
    writer.flush().map_err(WheelError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_record_entries() {
        let entries = vec![
            RecordEntry { path: "a/b.py".to_string(), hash: Some("sha256=abc".to_string()), size: Some(5) },
            RecordEntry { path: "a.dist-info/RECORD".to_string(), hash: None, size: None },
        ];
        let mut buf = Vec::new();
        write_record(&mut buf, &entries).unwrap();
        let parsed = read_record(buf.as_slice()).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn strips_leading_slash_from_absolute_paths() {
        let mut buf = Vec::new();
        write_record(&mut buf, &[RecordEntry { path: "/a.py".to_string(), hash: None, size: None }]).unwrap();
        let parsed = read_record(buf.as_slice()).unwrap();
        assert_eq!(parsed[0].path, "a.py");
    }

    #[test]
    fn sha256_encoding_matches_known_digest() {
        // echo -n "" | sha256sum -> e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85
        let encoded = encoded_sha256(b"");
        assert_eq!(encoded, "sha256=47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU");
    }
}
