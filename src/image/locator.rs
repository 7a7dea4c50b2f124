//! Random access to the layer directories of an image archive.
//!
//! The archive is cataloged once up front (record name, type, data offset
//! and size) so each layer lookup is a hash probe and a seek instead of a
//! scan from the start of the archive.

use crate::error::{Result, SquashError};
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Take};
use tar::{Archive, EntryType};

pub const VERSION_RECORD: &str = "VERSION";
pub const METADATA_RECORD: &str = "json";
pub const BODY_RECORD: &str = "layer.tar";

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    kind: EntryType,
    offset: u64,
    size: u64,
}

/// The version and metadata of one layer, plus where its body lives.
#[derive(Debug, Clone)]
pub struct LayerHandle {
    pub id: String,
    pub version: Vec<u8>,
    pub metadata: Vec<u8>,
    pub body_size: u64,
    body_offset: u64,
}

pub struct LayerLocator<R> {
    source: R,
    catalog: Vec<CatalogEntry>,
    directories: HashMap<String, usize>,
}

impl<R: Read + Seek> LayerLocator<R> {
    /// Catalog every top-level record of the archive.
    pub fn new(mut source: R) -> Result<Self> {
        source.seek(SeekFrom::Start(0))?;

        let mut catalog = Vec::new();
        let mut directories = HashMap::new();
        {
            let mut archive = Archive::new(&mut source);
            for entry_result in archive.entries_with_seek()? {
                let entry = entry_result?;
                let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                let kind = entry.header().entry_type();

                if kind.is_dir() {
                    directories.entry(name.clone()).or_insert(catalog.len());
                }
                catalog.push(CatalogEntry {
                    name,
                    kind,
                    offset: entry.raw_file_position(),
                    size: entry.size(),
                });
            }
        }

        Ok(Self {
            source,
            catalog,
            directories,
        })
    }

    pub fn record_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn layer_count(&self) -> usize {
        self.directories.len()
    }

    /// Locate the `<id>/` directory and read the version and metadata
    /// records that must immediately follow it.
    pub fn open_layer(&mut self, id: &str) -> Result<LayerHandle> {
        let position = *self
            .directories
            .get(&format!("{}/", id))
            .ok_or_else(|| SquashError::Format(format!("layer {} not found", id)))?;

        let version = self.expect_record(position + 1, id, VERSION_RECORD)?;
        let metadata = self.expect_record(position + 2, id, METADATA_RECORD)?;
        let body = self.expect_record(position + 3, id, BODY_RECORD)?;

        Ok(LayerHandle {
            id: id.to_string(),
            version: self.read_record(&version)?,
            metadata: self.read_record(&metadata)?,
            body_size: body.size,
            body_offset: body.offset,
        })
    }

    /// The nested archive holding a layer's file changes.
    pub fn body(&mut self, layer: &LayerHandle) -> Result<Archive<Take<&mut R>>> {
        self.source.seek(SeekFrom::Start(layer.body_offset))?;
        Ok(Archive::new((&mut self.source).take(layer.body_size)))
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn expect_record(&self, position: usize, id: &str, record: &str) -> Result<CatalogEntry> {
        let name = format!("{}/{}", id, record);
        let entry = self.catalog.get(position).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("archive ended before file {}", name),
            )
        })?;

        if entry.name != name {
            return Err(SquashError::Format(format!("expected file {} got {}", name, entry.name)));
        }
        if !entry.kind.is_file() {
            return Err(SquashError::Format(format!("expected {} to be a regular file", name)));
        }
        Ok(entry.clone())
    }

    fn read_record(&mut self, entry: &CatalogEntry) -> Result<Vec<u8>> {
        self.source.seek(SeekFrom::Start(entry.offset))?;
        let mut data = Vec::with_capacity(entry.size as usize);
        (&mut self.source).take(entry.size).read_to_end(&mut data)?;
        if (data.len() as u64) < entry.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record {} is truncated", entry.name),
            )
            .into());
        }
        Ok(data)
    }
}
