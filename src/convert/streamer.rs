//! Writes the contents of each segment at the offset the layout gave it. Contents
//! that can't be found are written as zeros so that later offsets don't move.
use super::{Backing, FileResolver, Layout, Vma};
use crate::elf::ElfFile;
use crate::error::CoreError;
use crate::utils;
use memmap2::{Mmap, MmapOptions};
use std::error::Error;
use std::fs::File;
use std::io::{self, Read, Seek, Write};

#[derive(Debug, Default, Eq, PartialEq)]
pub struct ContentSummary {
    /// Bytes written after the load commands.
    pub bytes: u64,

    /// Segments whose contents couldn't be read and were zero-filled instead.
    pub degraded: usize,

    /// Device mappings, these are always zero-filled.
    pub devices: usize,
}

/// How a segment's contents were written.
#[derive(Debug, Eq, PartialEq)]
enum Written {
    Contents,
    Zeros,
    SkippedDevice,
    Degraded,
}

pub struct Streamer<'a> {
    core: &'a ElfFile,
    resolver: &'a FileResolver,
}

impl<'a> Streamer<'a> {
    pub fn new(core: &'a ElfFile, resolver: &'a FileResolver) -> Self {
        Streamer { core, resolver }
    }

    /// out must be positioned just after the load commands. vmas must be the ones
    /// layout was built from.
    pub fn write_contents<W: Write + Seek>(
        &self,
        out: &mut W,
        layout: &Layout,
        vmas: &[Vma],
    ) -> Result<ContentSummary, Box<dyn Error>> {
        let mut summary = ContentSummary::default();
        for segment in layout.segments.iter() {
            let actual = out.stream_position()?;
            let expected = segment.command.fileoff;
            if actual != expected {
                return Err(CoreError::OffsetMismatch { expected, actual }.into());
            }

            match self.write_segment(out, &vmas[segment.vma])? {
                Written::Degraded => summary.degraded += 1,
                Written::SkippedDevice => summary.devices += 1,
                Written::Contents | Written::Zeros => (),
            }
            summary.bytes += segment.command.filesize;
        }
        Ok(summary)
    }

    fn write_segment(&self, out: &mut impl Write, vma: &Vma) -> Result<Written, Box<dyn Error>> {
        if vma.file_size() == 0 {
            // Likely mmap'ed but never accessed so the kernel didn't bother to save it.
            write_zeros(out, vma.vbytes.size)?;
            return Ok(Written::Zeros);
        }

        match &vma.backing {
            Backing::Embedded(obytes) => {
                let bytes = self
                    .core
                    .reader
                    .slice(obytes.start.0 as usize, obytes.size as usize)?;
                out.write_all(bytes)?;
                Ok(Written::Contents)
            }
            Backing::File { path, .. } if vma.is_device() => {
                utils::warn(&format!("Warning: skipping device \"{path}\""));
                write_zeros(out, vma.file_size())?;
                Ok(Written::SkippedDevice)
            }
            Backing::File { path, offset, size } => match self.map_file(path, *offset, *size) {
                Ok(mapping) => {
                    out.write_all(&mapping)?;
                    Ok(Written::Contents)
                }
                Err(err) => {
                    utils::warn(&format!("Warning: zero filling {path}: {err}"));
                    write_zeros(out, *size)?;
                    Ok(Written::Degraded)
                }
            },
            Backing::ZeroFill => {
                write_zeros(out, vma.reserved_size())?;
                Ok(Written::Zeros)
            }
        }
    }

    /// Maps exactly size bytes of path starting at offset. memmap2 takes care of
    /// aligning the mapping to a page boundary.
    fn map_file(&self, path: &str, offset: u64, size: u64) -> Result<Mmap, Box<dyn Error>> {
        let file: File = self.resolver.open(path)?;
        let len = file.metadata()?.len();
        utils::require(
            offset.checked_add(size).is_some_and(|end| end <= len),
            &format!("file is {len:#x} bytes but contents go to {offset:#x} + {size:#x}"),
        )?;

        // This is unsafe because it has undefined behavior if the underlying file is
        // modified while the memory map is in use.
        let mapping = unsafe { MmapOptions::new().offset(offset).len(size as usize).map(&file) }?;
        Ok(mapping)
    }
}

/// Explicitly writes zeros rather than seeking: LLDB gets confused by holes.
fn write_zeros(out: &mut impl Write, size: u64) -> Result<(), Box<dyn Error>> {
    let written = io::copy(&mut io::repeat(0).take(size), out)?;
    utils::require(written == size, "short write while zero filling")?;
    Ok(())
}
