//! Configuration module for a squash run

use crate::error::{Result, SquashError};
use std::env;
use std::path::PathBuf;

/// Environment variable supplying a default `--tag`.
pub const TAG_ENV: &str = "DOCKER_SQUASH_TAG";
/// Environment variable enabling verbose output when set.
pub const VERBOSE_ENV: &str = "DOCKER_SQUASH_VERBOSE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Stdin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquashConfig {
    pub input: InputSource,
    pub output: OutputTarget,
    /// Replacement tag for every squashed image.
    pub tag: Option<String>,
    pub verbose: bool,
}

impl SquashConfig {
    pub fn new(input: InputSource, output: OutputTarget, tag: Option<String>, verbose: bool) -> Self {
        Self {
            input,
            output,
            tag,
            verbose,
        }
    }

    /// Fill unset options from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Fill unset options from `lookup`. Command-line values take
    /// precedence over looked-up ones.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.tag.is_none() {
            self.tag = lookup(TAG_ENV);
        }

        if lookup(VERBOSE_ENV).is_some() {
            self.verbose = true;
        }

        self
    }

    /// Check the options before any I/O happens.
    ///
    /// A tag override must be a bare tag: `:` and `/` would make the
    /// rebuilt `repositories` entry read as a different repository
    /// reference, so both are rejected along with an empty tag.
    pub fn validate(&self) -> Result<()> {
        if let Some(tag) = &self.tag {
            if tag.trim().is_empty() {
                return Err(SquashError::Config("tag must not be empty".to_string()));
            }
            if tag.contains(':') || tag.contains('/') {
                return Err(SquashError::Config(format!("invalid tag '{}'", tag)));
            }
        }

        if let InputSource::File(path) = &self.input {
            if !path.exists() {
                return Err(SquashError::Config(format!(
                    "file does not exist: {}",
                    path.display()
                )));
            }
            if let OutputTarget::File(out) = &self.output {
                if out == path {
                    return Err(SquashError::Config(
                        "output file must differ from the input archive".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
