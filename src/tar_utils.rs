//! Input preparation for image archives
//!
//! This module provides [`TarUtils`] for turning whatever the caller hands
//! us (a file on disk, a pipe, a gzip stream) into a seekable, uncompressed
//! tar source the squashing engine can index and revisit.

use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Leading bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Tar input utilities for spooling and decompression
pub struct TarUtils;

impl TarUtils {
    /// Check whether data starts with the gzip magic bytes
    pub fn is_gzipped(data: &[u8]) -> bool {
        data.len() >= 2 && data[..2] == GZIP_MAGIC
    }

    /// Make an archive file ready for indexing.
    ///
    /// Uncompressed archives are used in place. Gzip archives are inflated
    /// into an anonymous temporary file first.
    pub fn prepare_file(mut file: File) -> Result<File> {
        file.seek(SeekFrom::Start(0))?;
        let magic = Self::read_magic(&mut file)?;
        file.seek(SeekFrom::Start(0))?;

        if Self::is_gzipped(&magic) {
            let mut spool = tempfile::tempfile()?;
            io::copy(&mut GzDecoder::new(file), &mut spool)?;
            Self::rewind(spool)
        } else {
            Ok(file)
        }
    }

    /// Copy a non-seekable stream into an anonymous temporary file,
    /// inflating it on the way if it is gzip-compressed. Returns the spool
    /// rewound to its start and the number of tar bytes it holds.
    pub fn spool<R: Read>(mut reader: R) -> Result<(File, u64)> {
        let magic = Self::read_magic(&mut reader)?;
        let gzipped = Self::is_gzipped(&magic);
        let mut stream = Cursor::new(magic).chain(reader);

        let mut spool = tempfile::tempfile()?;
        let size = if gzipped {
            io::copy(&mut GzDecoder::new(stream), &mut spool)?
        } else {
            io::copy(&mut stream, &mut spool)?
        };
        Ok((Self::rewind(spool)?, size))
    }

    fn read_magic<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
        let mut magic = Vec::with_capacity(GZIP_MAGIC.len());
        reader.take(GZIP_MAGIC.len() as u64).read_to_end(&mut magic)?;
        Ok(magic)
    }

    fn rewind(mut file: File) -> Result<File> {
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}
