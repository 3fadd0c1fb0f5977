use serde::{Deserialize, Serialize};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";

/// A content-addressable reference to a blob: its media type, `sha256:`
/// digest, and size in bytes.
/// <https://github.com/opencontainers/image-spec/blob/main/descriptor.md>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// `application/vnd.oci.image.manifest.v1+json`: one config blob plus an
/// ordered list of layer blobs, bottom layer first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self { schema_version: 2, media_type: MANIFEST_MEDIA_TYPE.to_string(), config, layers }
    }
}

/// A single-platform target this tool always produces manifests for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub architecture: String,
    pub os: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(flatten)]
    pub descriptor: Descriptor,
    pub platform: Platform,
}

/// `application/vnd.oci.image.index.v1+json`: the top-level pointer the
/// `oci-layout` bundle's `index.json` carries. This tool always emits
/// exactly one manifest, for the single platform it was built for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    pub media_type: String,
    pub manifests: Vec<IndexEntry>,
}

impl ImageIndex {
    pub fn single(manifest: Descriptor, platform: Platform) -> Self {
        Self {
            schema_version: 2,
            media_type: INDEX_MEDIA_TYPE.to_string(),
            manifests: vec![IndexEntry { descriptor: manifest, platform }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_serializes_with_camel_case_keys() {
        let manifest = ImageManifest::new(
            Descriptor { media_type: CONFIG_MEDIA_TYPE.to_string(), digest: "sha256:a".to_string(), size: 1 },
            vec![Descriptor { media_type: LAYER_MEDIA_TYPE.to_string(), digest: "sha256:b".to_string(), size: 2 }],
        );
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"schemaVersion\":2"));
        assert!(json.contains("\"mediaType\":\"application/vnd.oci.image.manifest.v1+json\""));
    }

    #[test]
    fn index_flattens_descriptor_fields_alongside_platform() {
        let index = ImageIndex::single(
            Descriptor { media_type: MANIFEST_MEDIA_TYPE.to_string(), digest: "sha256:c".to_string(), size: 3 },
            Platform { architecture: "amd64".to_string(), os: "linux".to_string() },
        );
        let json = serde_json::to_string(&index).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entry = &parsed["manifests"][0];
        assert_eq!(entry["digest"], "sha256:c");
        assert_eq!(entry["platform"]["architecture"], "amd64");
    }
}
