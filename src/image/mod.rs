//! Docker image squashing module
//!
//! This module turns a `docker save` archive of layered images into an
//! archive where each tagged image is backed by a single layer.
//!
//! # Overview
//!
//! - [`index`] scans the archive for layer records and the `repositories`
//!   manifest, and rebuilds each image's layer chain.
//! - [`locator`] catalogs the archive so any layer's records can be read
//!   with a seek.
//! - [`overlay`] replays a chain, applying whiteouts, and merges the
//!   layers' metadata through [`metadata`].
//! - [`layer_writer`] emits the records that survived as one layer body.
//! - [`squasher`] drives the above and writes the new archive.
//!
//! # Examples
//!
//! ```no_run
//! use std::fs::File;
//! use docker_image_squasher::image::Squasher;
//! use docker_image_squasher::output::OutputManager;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let input = File::open("busybox.tar")?;
//! let output = File::create("busybox-squashed.tar")?;
//! let squasher = Squasher::new(OutputManager::new(true));
//! let repositories = squasher.squash(input, output)?;
//! println!("{:?}", repositories);
//! # Ok(())
//! # }
//! ```

pub mod index;
pub mod layer_writer;
pub mod locator;
pub mod metadata;
pub mod overlay;
pub mod squasher;

#[cfg(test)]
pub(crate) mod test_support;

pub use index::{ImageDefinition, LayerRecord, RepositoriesManifest, list_images};
pub use locator::{LayerHandle, LayerLocator};
pub use overlay::{FileOwner, FileOwnership, ResolvedImage, resolve_chain};
pub use squasher::{Squasher, new_image_id};
