//! Docker Image Squasher
//!
//! Reads an image archive produced by `docker save` and writes an archive
//! in which every tagged image is a single layer.

use docker_image_squasher::cli::{Args, Runner};
use docker_image_squasher::output::OutputManager;
use std::process::ExitCode;

/// Exit status for any usage or runtime failure.
const FAILURE_STATUS: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse_args();
    let config = args.to_config().with_env_overrides();

    match Runner::new(config).and_then(|runner| runner.run()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            OutputManager::new_quiet().error(&e.to_string());
            ExitCode::from(FAILURE_STATUS)
        }
    }
}
