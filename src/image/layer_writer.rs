//! Re-emits the records that survived overlay resolution as one layer.

use crate::error::{Result, SquashError};
use crate::image::locator::LayerLocator;
use crate::image::overlay::FileOwnership;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use tar::{Builder, Entry};

/// Counters for a written squashed layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub skipped: usize,
}

/// Write the consolidated layer body for `chain` into `writer`.
///
/// Layers are visited root first and each record is copied only from the
/// layer that owns its path in `files`, so every visible path appears once
/// and whiteout records are dropped. Records keep their layer's order.
pub fn write_squashed_layer<R, W>(
    locator: &mut LayerLocator<R>,
    chain: &[String],
    files: &FileOwnership,
    writer: W,
) -> Result<(W, WriteStats)>
where
    R: Read + Seek,
    W: Write,
{
    let mut builder = Builder::new(writer);
    let mut stats = WriteStats::default();

    for layer_id in chain {
        let layer = crate::with_context!(locator.open_layer(layer_id), format!("read layer {}", layer_id))?;
        let mut body = locator.body(&layer)?;

        for entry_result in body.entries()? {
            let entry = entry_result?;
            let path = entry.path_bytes().into_owned();

            if !files.is_owned_by(&path, layer_id) {
                stats.skipped += 1;
                continue;
            }
            copy_entry(&mut builder, entry, &path)?;
            stats.written += 1;
        }
    }

    let writer = builder.into_inner()?;
    Ok((writer, stats))
}

/// Copy one record, keeping its original header and PAX records. Long-name
/// extension records are regenerated when the path or link target fits
/// neither the header fields nor a PAX record.
fn copy_entry<W: Write, R: Read>(builder: &mut Builder<W>, mut entry: Entry<'_, R>, path: &[u8]) -> Result<()> {
    let mut header = entry.header().clone();
    let link_name = entry.link_name_bytes().map(|link| link.into_owned());
    let extensions = pax_records(&mut entry)?;
    let has_pax = |key: &str| extensions.iter().any(|(name, _)| name == key);

    let path_fits = has_pax(PAX_PATH) || header.path_bytes().as_ref() == path;
    let link_fits = match &link_name {
        Some(link) => has_pax(PAX_LINKPATH) || header.link_name_bytes().as_deref() == Some(link.as_slice()),
        None => true,
    };

    if !extensions.is_empty() {
        builder.append_pax_extensions(extensions.iter().map(|(key, value)| (key.as_str(), value.as_slice())))?;
    }

    if path_fits && link_fits {
        builder.append(&header, &mut entry)?;
        return Ok(());
    }

    match link_name {
        Some(link) if !link_fits => {
            builder.append_link(&mut header, bytes_to_path(path), bytes_to_path(&link))?;
        }
        _ => builder.append_data(&mut header, bytes_to_path(path), &mut entry)?,
    }
    Ok(())
}

const PAX_PATH: &str = "path";
const PAX_LINKPATH: &str = "linkpath";

/// The PAX extended-header records attached to `entry`, in order.
fn pax_records<R: Read>(entry: &mut Entry<'_, R>) -> Result<Vec<(String, Vec<u8>)>> {
    let mut records = Vec::new();
    if let Some(extensions) = entry.pax_extensions()? {
        for extension in extensions {
            let extension = extension?;
            let key = extension
                .key()
                .map_err(|e| SquashError::Format(format!("invalid PAX record key: {}", e)))?;
            records.push((key.to_string(), extension.value_bytes().to_vec()));
        }
    }
    Ok(records)
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}
