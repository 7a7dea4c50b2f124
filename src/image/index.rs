//! Archive indexing: layer records, the `repositories` manifest, and the
//! layer chains they describe.

use crate::error::{Result, SquashError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use tar::Archive;

/// Name of the top-level record binding repositories and tags to layers.
pub const REPOSITORIES_RECORD: &str = "repositories";

/// Suffix of the per-layer metadata record.
pub const LAYER_METADATA_SUFFIX: &str = "/json";

/// repository name -> tag name -> image (leaf layer) identifier
pub type RepositoriesManifest = BTreeMap<String, BTreeMap<String, String>>;

/// Identity and parent link of one layer, as read from its `json` record.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LayerRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parent: String,
}

impl LayerRecord {
    pub fn is_root(&self) -> bool {
        self.parent.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One tagged image and its layer chain, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDefinition {
    pub repo: String,
    pub tag: String,
    pub layers: Vec<String>,
}

impl ImageDefinition {
    pub fn leaf(&self) -> Option<&str> {
        self.layers.last().map(String::as_str)
    }

    pub fn reference(&self) -> String {
        format!("{}:{}", self.repo, self.tag)
    }
}

/// Scan an image archive once, collecting every layer record and the
/// repositories manifest. The manifest record ends the scan.
pub fn scan_archive<R: Read>(reader: R) -> Result<(Vec<LayerRecord>, RepositoriesManifest)> {
    let mut archive = Archive::new(reader);
    let mut layers = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if name == REPOSITORIES_RECORD {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            let repositories: RepositoriesManifest = serde_json::from_slice(&data)
                .map_err(|e| SquashError::Format(format!("could not decode repositories: {}", e)))?;
            return Ok((layers, repositories));
        }

        if !name.ends_with(LAYER_METADATA_SUFFIX) {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            return Err(SquashError::Format(format!("expected record {} to be a file", name)));
        }

        let layer: LayerRecord = serde_json::from_reader(&mut entry)
            .map_err(|e| SquashError::Format(format!("failed to decode {}: {}", name, e)))?;
        if layer.id.is_empty() {
            return Err(SquashError::Format(format!("metadata file {} had no layer id", name)));
        }
        layers.push(layer);
    }

    Err(SquashError::Format("no repositories file in image archive".to_string()))
}

/// Derive one image per (repository, tag) pair by walking parent links
/// from the tagged leaf to the root.
pub fn build_images(layers: &[LayerRecord], repositories: &RepositoriesManifest) -> Result<Vec<ImageDefinition>> {
    let mut parents: HashMap<&str, &str> = HashMap::with_capacity(layers.len());
    for layer in layers {
        parents.entry(layer.id.as_str()).or_insert(layer.parent.as_str());
    }

    let mut images = Vec::new();
    for (repo, tags) in repositories {
        for (tag, leaf) in tags {
            let chain = walk_chain(&parents, leaf).map_err(|e| {
                e.with_context(&format!("image {}:{}", repo, tag))
            })?;
            images.push(ImageDefinition {
                repo: repo.clone(),
                tag: tag.clone(),
                layers: chain,
            });
        }
    }
    Ok(images)
}

fn walk_chain(parents: &HashMap<&str, &str>, leaf: &str) -> Result<Vec<String>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut id = leaf;

    loop {
        let parent = parents
            .get(id)
            .ok_or_else(|| SquashError::Graph(format!("could not find layer {}", id)))?;
        if !seen.insert(id) {
            return Err(SquashError::Graph(format!("layer {} is its own ancestor", id)));
        }
        chain.push(id.to_string());
        if parent.is_empty() {
            break;
        }
        id = *parent;
    }

    chain.reverse();
    Ok(chain)
}

/// Index an archive and return every image it tags.
pub fn list_images<R: Read>(reader: R) -> Result<Vec<ImageDefinition>> {
    let (layers, repositories) = scan_archive(reader)?;
    build_images(&layers, &repositories)
}
