//! Runner wiring the configured input and output to the squasher

use crate::config::{InputSource, OutputTarget, SquashConfig};
use crate::error::Result;
use crate::image::{RepositoriesManifest, Squasher};
use crate::output::OutputManager;
use crate::tar_utils::TarUtils;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct Runner {
    config: SquashConfig,
    output: OutputManager,
}

impl Runner {
    pub fn new(config: SquashConfig) -> Result<Self> {
        config.validate()?;

        let output = if config.verbose {
            OutputManager::new(true)
        } else {
            OutputManager::new_quiet()
        };

        Ok(Self { config, output })
    }

    pub fn output(&self) -> &OutputManager {
        &self.output
    }

    pub fn run(&self) -> Result<RepositoriesManifest> {
        self.output.section("Docker Image Squasher");
        let source = self.open_input()?;
        let squasher = Squasher::new(self.output.clone()).with_tag(self.config.tag.clone());

        let repositories = match &self.config.output {
            OutputTarget::Stdout => {
                let stdout = io::stdout();
                let mut sink = BufWriter::new(stdout.lock());
                let repositories = squasher.squash(source, &mut sink)?;
                sink.flush()?;
                repositories
            }
            OutputTarget::File(path) => self.squash_to_file(&squasher, source, path)?,
        };

        self.output.success(&format!(
            "Operation completed successfully in {}",
            self.output.elapsed_time()
        ));
        Ok(repositories)
    }

    fn open_input(&self) -> Result<File> {
        self.output.subsection("Preparing input");

        match &self.config.input {
            InputSource::File(path) => {
                let file = crate::with_context!(
                    File::open(path),
                    format!("failed to open {}", path.display())
                )?;
                let size = file.metadata()?.len();
                self.output.info(&format!(
                    "Image archive: {} ({})",
                    path.display(),
                    self.output.format_size(size)
                ));
                TarUtils::prepare_file(file)
            }
            InputSource::Stdin => {
                let (file, size) = crate::with_context!(
                    TarUtils::spool(io::stdin().lock()),
                    "failed to read standard input"
                )?;
                self.output
                    .info(&format!("Spooled {} from standard input", self.output.format_size(size)));
                Ok(file)
            }
        }
    }

    /// Squash into `path`, removing the partial file if anything fails.
    fn squash_to_file(&self, squasher: &Squasher, source: File, path: &Path) -> Result<RepositoriesManifest> {
        let file = crate::with_context!(
            File::create(path),
            format!("failed to create {}", path.display())
        )?;

        let mut sink = BufWriter::new(file);
        let result = squasher.squash(source, &mut sink).and_then(|repositories| {
            sink.flush()?;
            Ok(repositories)
        });
        drop(sink);

        if result.is_err() {
            if let Err(e) = fs::remove_file(path) {
                self.output.warning(&format!(
                    "Failed to remove partial output {}: {}",
                    path.display(),
                    e
                ));
            }
        }
        result
    }
}
