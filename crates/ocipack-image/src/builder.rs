use std::collections::BTreeMap;
use std::io::{Read, Write};

use data_encoding::HEXLOWER;
use sha2::{Digest as _, Sha256};

use crate::config::ImageConfig;
use crate::error::ImageError;
use crate::manifest::{Descriptor, ImageIndex, ImageManifest, Platform, CONFIG_MEDIA_TYPE, LAYER_MEDIA_TYPE, MANIFEST_MEDIA_TYPE};

fn sha256_digest(body: &[u8]) -> String {
    format!("sha256:{}", HEXLOWER.encode(&Sha256::digest(body)))
}

struct Blob {
    digest: String,
    body: Vec<u8>,
}

/// Assembles an OCI image layout tarball: a base image's existing layers
/// (if any) plus newly appended layers, one config blob, one manifest, and
/// a single-entry index. A thin tar bundler over the layer engine — all
/// novelty lives in `ocipack-layer` and `ocipack-squash`; this crate
/// streams already-built layers and computes their digests.
pub struct ImageBuilder {
    config: ImageConfig,
    layers: Vec<Blob>,
    platform: Platform,
}

impl ImageBuilder {
    /// Starts a new image, optionally seeded from an existing OCI image
    /// layout tarball (`oci-layout` + `index.json` + `blobs/sha256/...`).
    pub fn new<R: Read>(base: Option<R>) -> Result<Self, ImageError> {
        match base {
            None => Ok(Self {
                config: ImageConfig::default(),
                layers: Vec::new(),
                platform: Platform { architecture: "amd64".to_string(), os: "linux".to_string() },
            }),
            Some(reader) => Self::from_base(reader),
        }
    }

    fn from_base<R: Read>(reader: R) -> Result<Self, ImageError> {
        let mut archive = tar::Archive::new(reader);
        let mut blobs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let mut body = Vec::new();
            entry.read_to_end(&mut body)?;
            blobs.insert(path, body);
        }

        let index_bytes =
            blobs.get("index.json").ok_or_else(|| ImageError::MissingEntry("index.json".to_string()))?;
        let index: ImageIndex = serde_json::from_slice(index_bytes)?;
        let entry = index.manifests.first().ok_or(ImageError::EmptyIndex)?;

        let manifest_bytes = blob_for_digest(&blobs, &entry.descriptor.digest)?;
        let manifest: ImageManifest = serde_json::from_slice(manifest_bytes)?;

        let config_bytes = blob_for_digest(&blobs, &manifest.config.digest)?;
        let config: ImageConfig = serde_json::from_slice(config_bytes)?;

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            if descriptor.media_type != LAYER_MEDIA_TYPE {
                return Err(ImageError::UnsupportedMediaType(descriptor.media_type.clone()));
            }
            let body = blob_for_digest(&blobs, &descriptor.digest)?.to_vec();
            layers.push(Blob { digest: descriptor.digest.clone(), body });
        }

        Ok(Self { config, layers, platform: entry.platform.clone() })
    }

    /// Serializes `layer` to a tar blob and appends it on top of the
    /// stack, recording its diff-id (here identical to the blob digest,
    /// since layers are written uncompressed).
    pub fn append_layer(&mut self, layer: &ocipack_layer::LayerFs) -> Result<&mut Self, ImageError> {
        let mut builder = tar::Builder::new(Vec::new());
        for file in &layer.files {
            ocipack_layer::append_entry(&mut builder, file)?;
        }
        for whiteout in &layer.whiteouts {
            let name = match &whiteout.target {
                ocipack_layer::WhiteoutTarget::Opaque => ocipack_layer::OPAQUE_WHITEOUT_NAME.to_string(),
                ocipack_layer::WhiteoutTarget::Named(name) => format!("{}{name}", ocipack_layer::WHITEOUT_PREFIX),
            };
            ocipack_layer::append_whiteout(&mut builder, whiteout.dir.as_deref(), &name, 0)?;
        }
        let body = builder.into_inner()?;
        let digest = sha256_digest(&body);

        self.config.rootfs.diff_ids.push(digest.clone());
        self.layers.push(Blob { digest, body });
        Ok(self)
    }

    pub fn apply_config_mutation(&mut self, f: impl FnOnce(&mut ImageConfig)) -> &mut Self {
        f(&mut self.config);
        self
    }

    /// Writes the complete `oci-layout` bundle: `oci-layout`, `index.json`,
    /// and every blob under `blobs/sha256/`.
    pub fn write<W: Write>(&self, writer: W) -> Result<(), ImageError> {
        let mut builder = tar::Builder::new(writer);

        append_file(&mut builder, "oci-layout", br#"{"imageLayoutVersion":"1.0.0"}"#)?;

        let config_body = serde_json::to_vec(&self.config)?;
        let config_digest = sha256_digest(&config_body);
        append_blob(&mut builder, &config_digest, &config_body)?;

        let mut layer_descriptors = Vec::with_capacity(self.layers.len());
        for blob in &self.layers {
            append_blob(&mut builder, &blob.digest, &blob.body)?;
            layer_descriptors.push(Descriptor {
                media_type: LAYER_MEDIA_TYPE.to_string(),
                digest: blob.digest.clone(),
                size: blob.body.len() as u64,
            });
        }

        let manifest = ImageManifest::new(
            Descriptor { media_type: CONFIG_MEDIA_TYPE.to_string(), digest: config_digest, size: config_body.len() as u64 },
            layer_descriptors,
        );
        let manifest_body = serde_json::to_vec(&manifest)?;
        let manifest_digest = sha256_digest(&manifest_body);
        append_blob(&mut builder, &manifest_digest, &manifest_body)?;

        let index = ImageIndex::single(
            Descriptor { media_type: MANIFEST_MEDIA_TYPE.to_string(), digest: manifest_digest, size: manifest_body.len() as u64 },
            self.platform.clone(),
        );
        let index_body = serde_json::to_vec(&index)?;
        append_file(&mut builder, "index.json", &index_body)?;

        builder.into_inner()?;
        Ok(())
    }
}

fn blob_for_digest<'a>(blobs: &'a BTreeMap<String, Vec<u8>>, digest: &str) -> Result<&'a [u8], ImageError> {
    let (algorithm, hex) = digest.split_once(':').ok_or_else(|| ImageError::MissingEntry(digest.to_string()))?;
    let path = format!("blobs/{algorithm}/{hex}");
    blobs.get(&path).map(Vec::as_slice).ok_or_else(|| ImageError::MissingEntry(path))
}

fn append_blob<W: Write>(builder: &mut tar::Builder<W>, digest: &str, body: &[u8]) -> Result<(), std::io::Error> {
    let (algorithm, hex) = digest.split_once(':').expect("digest is always algorithm:hex");
    append_file(builder, &format!("blobs/{algorithm}/{hex}"), body)
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, name: &str, body: &[u8]) -> Result<(), std::io::Error> {
    let mut header = tar::Header::new_ustar();
    header.set_size(body.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocipack_layer::{InMemoryFile, LayerFs, Owner};
    use ocipack_stat_mode::StatMode;
    use std::io::Cursor;
    use std::sync::Arc;

    fn sample_layer() -> LayerFs {
        LayerFs {
            files: vec![InMemoryFile {
                fullname: "a.txt".to_string(),
                size: 5,
                mode: StatMode::regular_file(0o644),
                modtime: 0,
                link_target: None,
                hardlink_target: None,
                owner: Owner::default(),
                body: Arc::from(b"hello".as_slice()),
            }],
            whiteouts: Vec::new(),
        }
    }

    #[test]
    fn fresh_builder_has_empty_layout() {
        let builder = ImageBuilder::new::<Cursor<Vec<u8>>>(None).unwrap();
        assert!(builder.layers.is_empty());
        assert_eq!(builder.config.architecture, "amd64");
    }

    #[test]
    fn append_layer_records_diff_id() {
        let mut builder = ImageBuilder::new::<Cursor<Vec<u8>>>(None).unwrap();
        builder.append_layer(&sample_layer()).unwrap();
        assert_eq!(builder.layers.len(), 1);
        assert_eq!(builder.config.rootfs.diff_ids.len(), 1);
        assert_eq!(builder.config.rootfs.diff_ids[0], builder.layers[0].digest);
    }

    #[test]
    fn write_then_reload_as_base_round_trips() {
        let mut builder = ImageBuilder::new::<Cursor<Vec<u8>>>(None).unwrap();
        builder.append_layer(&sample_layer()).unwrap();
        builder.apply_config_mutation(|config| config.config.cmd = vec!["/bin/sh".to_string()]);

        let mut bytes = Vec::new();
        builder.write(&mut bytes).unwrap();

        let reloaded = ImageBuilder::new(Some(Cursor::new(bytes))).unwrap();
        assert_eq!(reloaded.layers.len(), 1);
        assert_eq!(reloaded.config.config.cmd, vec!["/bin/sh".to_string()]);
        assert_eq!(reloaded.platform.architecture, "amd64");
    }

    #[test]
    fn apply_config_mutation_is_chainable_with_append_layer() {
        let mut builder = ImageBuilder::new::<Cursor<Vec<u8>>>(None).unwrap();
        builder.append_layer(&sample_layer()).unwrap().apply_config_mutation(|config| {
            config.config.working_dir = "/app".to_string();
        });
        assert_eq!(builder.config.config.working_dir, "/app");
    }
}
