//! Docker Image Squasher Library
//!
//! This file serves as the library root for the docker-image-squasher crate,
//! organizing and exposing the various modules that make up the application.

pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod output;
pub mod tar_utils;

pub use config::SquashConfig;
pub use error::{Result, SquashError};
pub use image::Squasher;
pub use output::OutputManager;
