//! Squashes every tagged image of an archive into a single-layer image
//! and writes the result as a new archive.

use crate::error::{Result, SquashError};
use crate::image::index::{ImageDefinition, REPOSITORIES_RECORD, RepositoriesManifest, list_images};
use crate::image::layer_writer::write_squashed_layer;
use crate::image::locator::{BODY_RECORD, LayerLocator, METADATA_RECORD, VERSION_RECORD};
use crate::image::metadata::{format_timestamp, rewrite_metadata};
use crate::image::overlay::resolve_chain;
use crate::output::OutputManager;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Instant;
use tar::{Builder, EntryType, Header};

/// Bytes of randomness in an image identifier.
const IMAGE_ID_BYTES: usize = 32;

/// Mint a new image identifier: 256 random bits as lowercase hex.
pub fn new_image_id() -> Result<String> {
    let mut bytes = [0u8; IMAGE_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(io::Error::other)?;
    Ok(hex::encode(bytes))
}

/// Reject a tag override when a repository carries more than one image,
/// since every image of that repository would collide on the same tag.
pub fn check_tag_override(images: &[ImageDefinition]) -> Result<()> {
    let mut repos = HashSet::new();
    for image in images {
        if !repos.insert(image.repo.as_str()) {
            return Err(SquashError::TagConflict {
                repo: image.repo.clone(),
            });
        }
    }
    Ok(())
}

pub struct Squasher {
    output: OutputManager,
    tag: Option<String>,
}

impl Squasher {
    pub fn new(output: OutputManager) -> Self {
        Self { output, tag: None }
    }

    /// Tag every squashed image with `tag` instead of its original tag.
    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    /// Squash every image tagged in `source` and write the new archive to
    /// `sink`. Returns the rebuilt repositories manifest.
    ///
    /// Output is streamed: on failure, records already written stay in
    /// `sink` and the caller must discard it.
    pub fn squash<R, W>(&self, mut source: R, sink: W) -> Result<RepositoriesManifest>
    where
        R: Read + Seek,
        W: Write,
    {
        let start_time = Instant::now();
        let created_at = Utc::now();

        self.output.section("Squashing Docker Image Archive");
        self.output.debug(&format!("Run timestamp {}", format_timestamp(created_at)));

        self.output.subsection("Indexing archive");
        source.seek(SeekFrom::Start(0))?;
        let images = crate::with_context!(list_images(&mut source), "failed to list layers")?;
        if self.tag.is_some() {
            check_tag_override(&images)?;
        }

        let mut locator = LayerLocator::new(source)?;
        self.output.info(&format!(
            "Found {} images over {} layers ({} records)",
            images.len(),
            locator.layer_count(),
            locator.record_count()
        ));

        let mut archive = Builder::new(sink);
        let mut repositories = RepositoriesManifest::new();

        for image in &images {
            let id = crate::with_context!(
                self.squash_image(&mut locator, &mut archive, image, created_at),
                format!("squash image {}", image.reference())
            )?;

            let tag = self.tag.clone().unwrap_or_else(|| image.tag.clone());
            self.output.success(&format!("{}:{} -> {}", image.repo, tag, id));
            repositories.entry(image.repo.clone()).or_default().insert(tag, id);
        }

        let data = serde_json::to_vec(&repositories)
            .map_err(|e| SquashError::Format(format!("failed to encode repositories: {}", e)))?;
        let mut header = record_header(EntryType::Regular, data.len() as u64, created_at);
        archive.append_data(&mut header, REPOSITORIES_RECORD, data.as_slice())?;
        archive.into_inner()?;

        self.output.summary(
            "Squash Summary",
            &[
                ("Images", images.len().to_string()),
                ("Created", format_timestamp(created_at)),
                ("Elapsed", self.output.format_duration(start_time.elapsed())),
            ],
        );
        Ok(repositories)
    }

    fn squash_image<R, W>(
        &self,
        locator: &mut LayerLocator<R>,
        archive: &mut Builder<W>,
        image: &ImageDefinition,
        created_at: DateTime<Utc>,
    ) -> Result<String>
    where
        R: Read + Seek,
        W: Write,
    {
        self.output.step(&format!(
            "Squashing {} ({} layers)",
            image.reference(),
            image.layers.len()
        ));

        let resolved = crate::with_context!(resolve_chain(locator, &image.layers), "preparing")?;
        for layer in &resolved.layers {
            self.output.detail(&format!(
                "Layer {}: {} files, {} whiteouts",
                layer.id, layer.writes, layer.whiteouts
            ));
        }

        let id = new_image_id()?;
        let size = resolved.files.total_size();
        let metadata = crate::with_context!(
            rewrite_metadata(resolved.metadata, &id, size, created_at),
            "prepare JSON"
        )?;

        // The body is staged so its size is known before its header is written.
        let staging = tempfile::tempfile()?;
        let (mut staging, stats) = crate::with_context!(
            write_squashed_layer(locator, &image.layers, &resolved.files, staging),
            "squashing layers"
        )?;
        staging.flush()?;
        let body_size = staging.seek(SeekFrom::End(0))?;
        staging.seek(SeekFrom::Start(0))?;

        self.output.detail(&format!(
            "{} files kept, {} records dropped, {} of content, layer body {}",
            stats.written,
            stats.skipped,
            self.output.format_size(size),
            self.output.format_size(body_size)
        ));

        self.write_image_records(archive, &id, &resolved.version, &metadata, staging, body_size, created_at)?;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_image_records<W: Write>(
        &self,
        archive: &mut Builder<W>,
        id: &str,
        version: &[u8],
        metadata: &[u8],
        body: File,
        body_size: u64,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut header = record_header(EntryType::Directory, 0, created_at);
        archive.append_data(&mut header, format!("{}/", id), io::empty())?;

        let mut header = record_header(EntryType::Regular, version.len() as u64, created_at);
        archive.append_data(&mut header, format!("{}/{}", id, VERSION_RECORD), version)?;

        let mut header = record_header(EntryType::Regular, metadata.len() as u64, created_at);
        archive.append_data(&mut header, format!("{}/{}", id, METADATA_RECORD), metadata)?;

        let mut header = record_header(EntryType::Regular, body_size, created_at);
        archive.append_data(&mut header, format!("{}/{}", id, BODY_RECORD), body)?;
        Ok(())
    }
}

fn record_header(kind: EntryType, size: u64, created_at: DateTime<Utc>) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_mode(if kind.is_dir() { 0o755 } else { 0o644 });
    header.set_uid(0);
    header.set_gid(0);
    header.set_size(size);
    header.set_mtime(created_at.timestamp().max(0) as u64);
    header
}
