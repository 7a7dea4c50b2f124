//! Command-line argument parsing

use crate::config::{InputSource, OutputTarget, SquashConfig};
use clap::Parser;
use std::path::PathBuf;

const EXAMPLES: &str = "\
Examples:
  # Squash a saved image, writing the result to a file
  docker save busybox > busybox.tar
  docker-image-squasher -o squashed.tar busybox.tar

  # Stream through a pipe and retag
  docker save busybox | docker-image-squasher -i -t squashed | docker load

  # Compressed archives are accepted too
  docker save busybox | gzip | docker-image-squasher -i -v > busybox.tar";

#[derive(Parser, Debug)]
#[command(name = "docker-image-squasher")]
#[command(about = "Squash the images of a `docker save` archive into single-layer images")]
#[command(version, author)]
#[command(after_help = EXAMPLES)]
pub struct Args {
    /// Path to the image archive
    #[arg(
        value_name = "IMAGE_ARCHIVE",
        required_unless_present = "stdin",
        help = "Path to the image archive produced by `docker save`"
    )]
    pub file: Option<PathBuf>,

    /// Read the archive from stdin
    #[arg(
        long = "stdin",
        short = 'i',
        conflicts_with = "file",
        help = "Read the image archive from standard input"
    )]
    pub stdin: bool,

    /// Output file
    #[arg(
        long = "outfile",
        short = 'o',
        value_name = "PATH",
        help = "Write the squashed archive to a file instead of standard output"
    )]
    pub outfile: Option<PathBuf>,

    /// Tag override
    #[arg(
        long = "tag",
        short = 't',
        help = "Tag every squashed image with this tag instead of its original one"
    )]
    pub tag: Option<String>,

    /// Verbose output
    #[arg(
        long = "verbose",
        short = 'v',
        help = "Print progress to standard error"
    )]
    pub verbose: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    pub fn to_config(&self) -> SquashConfig {
        let input = match (&self.file, self.stdin) {
            (Some(path), false) => InputSource::File(path.clone()),
            _ => InputSource::Stdin,
        };
        let output = match &self.outfile {
            Some(path) => OutputTarget::File(path.clone()),
            None => OutputTarget::Stdout,
        };
        SquashConfig::new(input, output, self.tag.clone(), self.verbose)
    }
}
