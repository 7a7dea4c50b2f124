//! In-memory image archives for unit tests.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use tar::{Builder, EntryType, Header};

/// Build a layer body. Paths ending in `/` become directories, everything
/// else a regular file holding the given content.
pub fn layer_body(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, content) in files {
        if path.ends_with('/') {
            append(&mut builder, path, EntryType::Directory, 0o755, b"");
        } else {
            append(&mut builder, path, EntryType::Regular, 0o644, content.as_bytes());
        }
    }
    builder.into_inner().unwrap()
}

fn append(builder: &mut Builder<Vec<u8>>, path: &str, kind: EntryType, mode: u32, data: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_mode(mode);
    header.set_size(data.len() as u64);
    header.set_mtime(1_445_550_000);
    builder.append_data(&mut header, path, data).unwrap();
}

/// Build a layer body of regular files whose names are raw bytes, written
/// straight into the header name field (at most 100 bytes each).
pub fn raw_name_body(files: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(content.len() as u64);
        header.set_mtime(1_445_550_000);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Build a layer body holding one regular file preceded by PAX records.
pub fn pax_file_body(path: &str, pax: &[(&str, &[u8])], content: &[u8]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    builder.append_pax_extensions(pax.iter().copied()).unwrap();
    append(&mut builder, path, EntryType::Regular, 0o755, content);
    builder.into_inner().unwrap()
}

/// Layer metadata as `docker save` writes it.
pub fn layer_json(id: &str, parent: &str, config: Value) -> Vec<u8> {
    let mut meta = json!({
        "id": id,
        "created": "2015-10-22T21:57:04.359313793Z",
        "container_config": { "Cmd": ["/bin/sh", "-c", format!("#(nop) {}", id)] },
        "config": config,
        "architecture": "amd64",
        "os": "linux",
        "Size": 0,
        "layer_id": format!("sha256:{}", id),
    });
    if !parent.is_empty() {
        meta["parent"] = json!(parent);
        meta["parent_id"] = json!(format!("sha256:{}", parent));
    }
    serde_json::to_vec(&meta).unwrap()
}

pub struct ArchiveFixture {
    builder: Builder<Vec<u8>>,
    repositories: BTreeMap<String, BTreeMap<String, String>>,
    with_manifest: bool,
}

impl ArchiveFixture {
    pub fn new() -> Self {
        Self {
            builder: Builder::new(Vec::new()),
            repositories: BTreeMap::new(),
            with_manifest: true,
        }
    }

    pub fn layer(self, id: &str, parent: &str, files: &[(&str, &str)]) -> Self {
        let mut labels = serde_json::Map::new();
        labels.insert(id.to_string(), json!("true"));
        let config = json!({ "Cmd": null, "Env": ["PATH=/bin"], "Labels": labels });
        self.layer_with_config(id, parent, config, files)
    }

    pub fn layer_with_config(self, id: &str, parent: &str, config: Value, files: &[(&str, &str)]) -> Self {
        let json = layer_json(id, parent, config);
        self.raw_layer(id, &json, &layer_body(files))
    }

    pub fn raw_layer(mut self, id: &str, json: &[u8], body: &[u8]) -> Self {
        append(&mut self.builder, &format!("{}/", id), EntryType::Directory, 0o755, b"");
        append(&mut self.builder, &format!("{}/VERSION", id), EntryType::Regular, 0o644, b"1.0");
        append(&mut self.builder, &format!("{}/json", id), EntryType::Regular, 0o644, json);
        append(&mut self.builder, &format!("{}/layer.tar", id), EntryType::Regular, 0o644, body);
        self
    }

    pub fn raw_file(mut self, path: &str, data: &[u8]) -> Self {
        append(&mut self.builder, path, EntryType::Regular, 0o644, data);
        self
    }

    pub fn raw_dir(mut self, path: &str) -> Self {
        append(&mut self.builder, path, EntryType::Directory, 0o755, b"");
        self
    }

    pub fn raw_symlink(mut self, path: &str, target: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        self.builder.append_link(&mut header, path, target).unwrap();
        self
    }

    pub fn tag(mut self, repo: &str, tag: &str, id: &str) -> Self {
        self.repositories
            .entry(repo.to_string())
            .or_default()
            .insert(tag.to_string(), id.to_string());
        self
    }

    pub fn without_manifest(mut self) -> Self {
        self.with_manifest = false;
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        if self.with_manifest {
            let data = serde_json::to_vec(&self.repositories).unwrap();
            append(&mut self.builder, "repositories", EntryType::Regular, 0o644, &data);
        }
        self.builder.into_inner().unwrap()
    }
}

/// Every entry of a tar stream as (path, content).
pub fn read_entries(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut archive = tar::Archive::new(data);
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((path, content));
    }
    entries
}

/// One record of a tar stream with its raw path and PAX records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub path: Vec<u8>,
    pub pax: Vec<(String, Vec<u8>)>,
    pub content: Vec<u8>,
}

/// Every entry of a tar stream, paths left undecoded.
pub fn read_raw_entries(data: &[u8]) -> Vec<RawEntry> {
    use std::io::Read;

    let mut archive = tar::Archive::new(data);
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let mut pax = Vec::new();
        if let Some(extensions) = entry.pax_extensions().unwrap() {
            for extension in extensions {
                let extension = extension.unwrap();
                pax.push((extension.key().unwrap().to_string(), extension.value_bytes().to_vec()));
            }
        }
        let path = entry.path_bytes().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push(RawEntry { path, pax, content });
    }
    entries
}
