//! Overlay resolution: replays a layer chain bottom to top, applying file
//! writes and whiteouts, and merges the layers' metadata on the way.

use crate::error::{Result, SquashError};
use crate::image::locator::LayerLocator;
use crate::image::metadata::{merge, parse_metadata};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Base-name prefix marking a path as deleted from lower layers.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Which layer supplies the visible copy of a path, and its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwner {
    pub layer_id: String,
    pub size: u64,
}

/// The visible file set at the top of a layer stack.
///
/// Paths are the raw bytes of the layer records and are never decoded, so
/// names that are not valid UTF-8 keep their identity.
#[derive(Debug, Clone, Default)]
pub struct FileOwnership {
    files: HashMap<Vec<u8>, FileOwner>,
}

impl FileOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    /// A layer wrote `path`; it now owns it regardless of earlier writers.
    pub fn record_write(&mut self, path: impl AsRef<[u8]>, layer_id: &str, size: u64) {
        self.files.insert(
            path.as_ref().to_vec(),
            FileOwner {
                layer_id: layer_id.to_string(),
                size,
            },
        );
    }

    /// Apply the whiteout record `path` from `layer_id`, removing the path
    /// it hides. Returns the removed path.
    pub fn apply_whiteout(&mut self, path: impl AsRef<[u8]>, layer_id: &str) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let target = whiteout_target(path).unwrap_or_default();

        if self.files.remove(&target).is_some() {
            return Ok(target);
        }

        let mut dir_target = target;
        dir_target.push(b'/');
        if self.files.remove(&dir_target).is_some() {
            return Ok(dir_target);
        }

        Err(SquashError::Overlay {
            layer: layer_id.to_string(),
            whiteout: String::from_utf8_lossy(path).into_owned(),
            target: String::from_utf8_lossy(&dir_target).into_owned(),
        })
    }

    pub fn owner(&self, path: impl AsRef<[u8]>) -> Option<&FileOwner> {
        self.files.get(path.as_ref())
    }

    /// Whether `layer_id` supplies the visible copy of `path`.
    pub fn is_owned_by(&self, path: impl AsRef<[u8]>, layer_id: &str) -> bool {
        self.owner(path).is_some_and(|owner| owner.layer_id == layer_id)
    }

    pub fn contains(&self, path: impl AsRef<[u8]>) -> bool {
        self.files.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|owner| owner.size).sum()
    }

    /// Visible paths in byte order, decoded for display.
    pub fn paths(&self) -> Vec<Cow<'_, str>> {
        let mut paths: Vec<&[u8]> = self.files.keys().map(Vec::as_slice).collect();
        paths.sort_unstable();
        paths.into_iter().map(String::from_utf8_lossy).collect()
    }
}

/// Split a path into its directory part (with trailing `/`, possibly
/// empty) and base name.
fn split_path(path: &[u8]) -> (&[u8], &[u8]) {
    match path.iter().rposition(|&b| b == b'/') {
        Some(index) => path.split_at(index + 1),
        None => (&path[..0], path),
    }
}

/// The path a whiteout record hides, or `None` if it is not a whiteout.
pub fn whiteout_target(path: &[u8]) -> Option<Vec<u8>> {
    let (dir, base) = split_path(path);
    let hidden = base.strip_prefix(WHITEOUT_PREFIX.as_bytes())?;
    if hidden.is_empty() {
        let dir = dir.strip_suffix(b"/").unwrap_or(dir);
        return Some(dir.to_vec());
    }
    Some([dir, hidden].concat())
}

pub fn is_whiteout(path: &[u8]) -> bool {
    split_path(path).1.starts_with(WHITEOUT_PREFIX.as_bytes())
}

/// Per-layer counters, reported in verbose output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub id: String,
    pub writes: usize,
    pub whiteouts: usize,
}

/// The outcome of replaying a full layer chain.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub files: FileOwnership,
    pub metadata: Value,
    /// The leaf layer's `VERSION` bytes, verbatim.
    pub version: Vec<u8>,
    pub layers: Vec<LayerStats>,
}

/// Replay `chain` (root first) and compute the visible file set, merged
/// metadata and leaf version.
pub fn resolve_chain<R: Read + Seek>(locator: &mut LayerLocator<R>, chain: &[String]) -> Result<ResolvedImage> {
    let mut files = FileOwnership::new();
    let mut metadata: Option<Value> = None;
    let mut version = Vec::new();
    let mut layers = Vec::with_capacity(chain.len());

    for layer_id in chain {
        let layer = crate::with_context!(locator.open_layer(layer_id), format!("read layer {}", layer_id))?;

        let layer_meta = parse_metadata(&layer.metadata, layer_id)?;
        metadata = Some(match metadata.take() {
            Some(accumulated) => {
                crate::with_context!(merge(accumulated, layer_meta), format!("merge layer {}", layer_id))?
            }
            None => layer_meta,
        });
        version = layer.version.clone();

        let mut stats = LayerStats {
            id: layer_id.clone(),
            ..LayerStats::default()
        };

        let mut body = locator.body(&layer)?;
        for entry_result in body.entries()? {
            let entry = entry_result?;
            let path = entry.path_bytes().into_owned();

            if is_whiteout(&path) {
                files.apply_whiteout(&path, layer_id)?;
                stats.whiteouts += 1;
            } else {
                files.record_write(&path, layer_id, entry.size());
                stats.writes += 1;
            }
        }
        layers.push(stats);
    }

    let metadata = metadata.ok_or_else(|| SquashError::Graph("empty layer chain".to_string()))?;
    Ok(ResolvedImage {
        files,
        metadata,
        version,
        layers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::test_support::ArchiveFixture;
    use serde_json::json;
    use std::io::Cursor;

    fn chain(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn locator(data: Vec<u8>) -> LayerLocator<Cursor<Vec<u8>>> {
        LayerLocator::new(Cursor::new(data)).unwrap()
    }

    #[test]
    fn test_whiteout_target() {
        assert_eq!(whiteout_target(b"etc/.wh.hosts"), Some(b"etc/hosts".to_vec()));
        assert_eq!(whiteout_target(b".wh.foo"), Some(b"foo".to_vec()));
        assert_eq!(whiteout_target(b"etc/hosts"), None);
        assert_eq!(whiteout_target(b"etc/.wh."), Some(b"etc".to_vec()));
        assert_eq!(whiteout_target(b"caf\xe9/.wh.x\xff"), Some(b"caf\xe9/x\xff".to_vec()));
        assert!(is_whiteout(b"a/b/.wh.c"));
        assert!(!is_whiteout(b"a/.wh.b/c"));
    }

    #[test]
    fn test_paths_are_raw_bytes() {
        let mut files = FileOwnership::new();
        files.record_write(b"caf\xe9", "base", 1);
        files.record_write(b"caf\xff", "base", 2);
        assert_eq!(files.len(), 2);
        assert!(files.contains(b"caf\xe9"));
        assert!(!files.contains("caf\u{FFFD}"));

        let removed = files.apply_whiteout(b".wh.caf\xe9", "top").unwrap();
        assert_eq!(removed, b"caf\xe9");
        assert!(files.is_owned_by(b"caf\xff", "base"));
        assert_eq!(files.total_size(), 2);
    }

    #[test]
    fn test_later_layer_takes_ownership() {
        let data = ArchiveFixture::new()
            .layer("base", "", &[("etc/", ""), ("etc/hosts", "old"), ("bin/sh", "sh")])
            .layer("top", "base", &[("etc/hosts", "newer")])
            .build();

        let resolved = resolve_chain(&mut locator(data), &chain(&["base", "top"])).unwrap();
        let files = &resolved.files;
        assert_eq!(files.len(), 3);
        assert_eq!(files.owner("etc/hosts"), Some(&FileOwner { layer_id: "top".to_string(), size: 5 }));
        assert!(files.is_owned_by("bin/sh", "base"));
        assert!(files.is_owned_by("etc/", "base"));
        assert_eq!(files.total_size(), 7);
    }

    #[test]
    fn test_whiteout_removes_file() {
        let data = ArchiveFixture::new()
            .layer("base", "", &[("hi", "hello"), ("foo", "bar"), ("keep", "k")])
            .layer("top", "base", &[(".wh.hi", ""), (".wh.foo", "")])
            .build();

        let resolved = resolve_chain(&mut locator(data), &chain(&["base", "top"])).unwrap();
        assert_eq!(resolved.files.paths(), vec!["keep"]);
        assert!(!resolved.files.contains(".wh.hi"));
        assert_eq!(resolved.layers[1], LayerStats { id: "top".to_string(), writes: 0, whiteouts: 2 });
    }

    #[test]
    fn test_whiteout_removes_directory_entry() {
        let data = ArchiveFixture::new()
            .layer("base", "", &[("opt/", ""), ("opt/app/", ""), ("opt/app/run", "x")])
            .layer("top", "base", &[("opt/.wh.app", "")])
            .build();

        let resolved = resolve_chain(&mut locator(data), &chain(&["base", "top"])).unwrap();
        // Only the directory record itself is hidden; children are left as
        // listed by their layers.
        assert_eq!(resolved.files.paths(), vec!["opt/", "opt/app/run"]);
    }

    #[test]
    fn test_path_can_return_after_whiteout() {
        let data = ArchiveFixture::new()
            .layer("a", "", &[("conf", "one")])
            .layer("b", "a", &[(".wh.conf", "")])
            .layer("c", "b", &[("conf", "three")])
            .build();

        let resolved = resolve_chain(&mut locator(data), &chain(&["a", "b", "c"])).unwrap();
        assert!(resolved.files.is_owned_by("conf", "c"));
    }

    #[test]
    fn test_whiteout_without_target() {
        let data = ArchiveFixture::new()
            .layer("base", "", &[("keep", "k")])
            .layer("top", "base", &[("etc/.wh.missing", "")])
            .build();

        let err = resolve_chain(&mut locator(data), &chain(&["base", "top"])).unwrap_err();
        match err {
            SquashError::Overlay { layer, whiteout, target } => {
                assert_eq!(layer, "top");
                assert_eq!(whiteout, "etc/.wh.missing");
                assert_eq!(target, "etc/missing/");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metadata_merged_across_chain() {
        let data = ArchiveFixture::new()
            .layer_with_config("base", "", json!({"Env": ["PATH=/bin"], "Labels": {"a": "1"}, "Cmd": null}), &[])
            .layer_with_config("top", "base", json!({"Labels": {"b": "2"}, "Cmd": ["/bin/sh"]}), &[])
            .build();

        let resolved = resolve_chain(&mut locator(data), &chain(&["base", "top"])).unwrap();
        assert_eq!(resolved.metadata["id"], json!("top"));
        assert_eq!(resolved.metadata["parent"], json!("base"));
        assert_eq!(resolved.metadata["config"]["Env"], json!(["PATH=/bin"]));
        assert_eq!(resolved.metadata["config"]["Labels"], json!({"a": "1", "b": "2"}));
        assert_eq!(resolved.metadata["config"]["Cmd"], json!(["/bin/sh"]));
        assert_eq!(resolved.version, b"1.0");
    }

    #[test]
    fn test_single_layer_metadata_is_untouched() {
        let data = ArchiveFixture::new().layer("only", "", &[("a", "1")]).build();
        let resolved = resolve_chain(&mut locator(data), &chain(&["only"])).unwrap();
        assert_eq!(resolved.metadata["layer_id"], json!("sha256:only"));
        assert_eq!(resolved.files.paths(), vec!["a"]);
    }

    #[test]
    fn test_merge_conflict_surfaces() {
        let data = ArchiveFixture::new()
            .layer_with_config("base", "", json!({"Volumes": {"/data": {}}}), &[])
            .layer_with_config("top", "base", json!({"Volumes": "/data"}), &[])
            .build();
        let err = resolve_chain(&mut locator(data), &chain(&["base", "top"])).unwrap_err();
        assert!(matches!(err, SquashError::MergeConflict { ref field } if field == "Volumes"));
    }
}
