//! Converts an ELF core into a Mach-O core. This happens in four steps:
//! 1. Parse the ELF core (see the elf module).
//! 2. Reconcile the load segments with the memory mapped files to find the regions
//!    of memory to write (vma).
//! 3. Write the Mach-O header and load commands, fixing the offset of each segment's
//!    contents (writer).
//! 4. Write the contents of each segment at its offset (streamer).
pub mod resolver;
pub mod streamer;
pub mod vma;
pub mod writer;

pub use resolver::*;
pub use streamer::*;
pub use vma::*;
pub use writer::*;

use crate::elf::ElfFile;
use crate::error::CoreError;
use crate::macho::Arch;
use crate::utils;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

pub struct Config {
    /// Files recorded under this prefix may instead be found under alternate_root.
    pub prefix: String,
    pub alternate_root: PathBuf,
    pub arch: &'static dyn Arch,
}

impl Config {
    pub fn resolver(&self) -> FileResolver {
        FileResolver::new(self.prefix.clone(), self.alternate_root.clone())
    }
}

pub struct Summary {
    pub layout: Layout,
    pub threads: usize,
    pub contents: ContentSummary,
}

/// A parsed and reconciled core, ready to be written.
pub struct Conversion {
    pub core: ElfFile,
    pub vmas: Vec<Vma>,
    pub main_executable: Option<String>,
}

impl Conversion {
    pub fn new(input: PathBuf, config: &Config) -> Result<Self, Box<dyn Error>> {
        let core = ElfFile::new(input, config.arch)?;
        let vmas = find_vmas(&core);
        let main_executable = find_main_executable(&core, &vmas, &config.resolver());
        Ok(Conversion {
            core,
            vmas,
            main_executable,
        })
    }

    /// The Mach-O core borrows its header flags from the main executable's header.
    pub fn header_flags(&self, resolver: &FileResolver) -> u32 {
        match &self.main_executable {
            Some(path) => resolver.read_mach_header(path).map_or(0, |h| h.flags),
            None => {
                utils::warn("No main executable detected?");
                0
            }
        }
    }

    pub fn layout(&self, config: &Config) -> Result<Layout, CoreError> {
        let flags = self.header_flags(&config.resolver());
        Layout::new(&self.vmas, self.core.threads.len(), config.arch, flags)
    }

    /// out should be empty.
    pub fn write<W: Write + Seek>(
        &self,
        out: &mut W,
        config: &Config,
    ) -> Result<Summary, Box<dyn Error>> {
        let layout = self.layout(config)?;
        layout.write_commands(out, &self.core.threads, config.arch)?;
        let resolver = config.resolver();
        let contents =
            Streamer::new(&self.core, &resolver).write_contents(out, &layout, &self.vmas)?;
        out.flush()?;
        Ok(Summary {
            layout,
            threads: self.core.threads.len(),
            contents,
        })
    }
}

/// The output file isn't created until the input has been successfully parsed.
pub fn convert_file(
    input: PathBuf,
    output: &Path,
    config: &Config,
) -> Result<(Conversion, Summary), Box<dyn Error>> {
    let conversion = Conversion::new(input, config)?;
    let file = File::create(output)
        .map_err(|e| format!("couldn't create {}: {e}", output.display()))?;
    let mut out = BufWriter::new(file);
    let summary = conversion.write(&mut out, config)?;
    Ok((conversion, summary))
}

/// darlingcore-<name> next to the input.
pub fn default_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "core".to_string());
    input.with_file_name(format!("darlingcore-{name}"))
}
