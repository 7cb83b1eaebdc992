//! Writes the Mach-O header and load commands. The file offset of every segment is
//! decided here, before any contents are written, so the streamer has to write the
//! contents in exactly the same order.
use super::Vma;
use crate::elf::PrStatus;
use crate::error::CoreError;
use crate::macho::{
    Arch, LC_THREAD, MACH_HEADER_SIZE, MH_CORE, MachHeader, SEGMENT_COMMAND_SIZE,
    SegmentCommand, THREAD_COMMAND_SIZE,
};
use std::error::Error;
use std::io::Write;

/// A segment command along with the index of the vma it was built from.
/// command.fileoff is where the region's contents must start.
pub struct PlannedSegment {
    pub vma: usize,
    pub command: SegmentCommand,
}

pub struct Layout {
    pub header: MachHeader,
    pub segments: Vec<PlannedSegment>,

    /// Offset of the first byte after the load commands.
    pub contents_offset: u64,

    /// Offset of the first byte after the last segment's contents.
    pub end_offset: u64,
}

impl Layout {
    /// Lays out the valid vmas, in order, directly after the load commands. Fails if
    /// the commands or contents can't be described by a Mach-O core.
    pub fn new(
        vmas: &[Vma],
        num_threads: usize,
        arch: &dyn Arch,
        flags: u32,
    ) -> Result<Self, CoreError> {
        let valid: Vec<(usize, &Vma)> = vmas
            .iter()
            .enumerate()
            .filter(|(_, v)| v.valid)
            .collect();
        let thread_size = THREAD_COMMAND_SIZE + arch.thread_state_size();
        let sizeofcmds = valid.len() * SEGMENT_COMMAND_SIZE + num_threads * thread_size;
        let header = MachHeader {
            cpu_type: arch.cpu_type(),
            cpu_subtype: arch.cpu_subtype(),
            filetype: MH_CORE,
            ncmds: u32::try_from(valid.len() + num_threads)
                .map_err(|_| CoreError::format("too many load commands"))?,
            sizeofcmds: u32::try_from(sizeofcmds)
                .map_err(|_| CoreError::format("load commands are too large"))?,
            flags,
        };

        let contents_offset = (MACH_HEADER_SIZE + sizeofcmds) as u64;
        let mut file_offset = contents_offset;
        let mut segments = Vec::with_capacity(valid.len());
        for (index, vma) in valid {
            let command = SegmentCommand {
                vmaddr: vma.vbytes.start.0,
                vmsize: vma.vbytes.size,
                fileoff: file_offset,
                filesize: vma.reserved_size(),
                prot: vma.prot,
            };
            file_offset = file_offset.checked_add(command.filesize).ok_or_else(|| {
                CoreError::format(format!(
                    "segment at {:#x} doesn't fit in the Mach-O core",
                    command.vmaddr
                ))
            })?;
            segments.push(PlannedSegment { vma: index, command });
        }

        Ok(Layout {
            header,
            segments,
            contents_offset,
            end_offset: file_offset,
        })
    }

    /// The planned segment for vmas[index], None for invalid vmas.
    pub fn find_segment(&self, index: usize) -> Option<&PlannedSegment> {
        self.segments.iter().find(|s| s.vma == index)
    }

    /// Writes the header, the segment commands, and then a thread command per thread.
    pub fn write_commands(
        &self,
        out: &mut impl Write,
        threads: &[PrStatus],
        arch: &dyn Arch,
    ) -> Result<(), Box<dyn Error>> {
        let mut bytes = Vec::with_capacity(self.contents_offset as usize);
        self.header.write_to(&mut bytes);
        for segment in self.segments.iter() {
            segment.command.write_to(&mut bytes);
        }

        let cmdsize = (THREAD_COMMAND_SIZE + arch.thread_state_size()) as u32;
        for thread in threads {
            bytes.extend_from_slice(&LC_THREAD.to_le_bytes());
            bytes.extend_from_slice(&cmdsize.to_le_bytes());
            arch.write_thread_state(thread, &mut bytes);
        }

        if bytes.len() as u64 != self.contents_offset {
            // Only possible if an Arch writes the wrong amount of thread state.
            return Err(format!(
                "wrote {:#x} bytes of load commands but planned for {:#x}",
                bytes.len(),
                self.contents_offset
            )
            .into());
        }
        out.write_all(&bytes)?;
        Ok(())
    }
}
