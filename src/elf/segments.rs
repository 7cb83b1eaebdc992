//! Program headers. For a core file these describe the memory of the process that
//! cored (load segments) plus one note segment with process and thread metadata.
use super::{Reader, Stream};
use crate::{
    elf::{Bytes, Offset, VirtualAddr},
    utils,
};
use std::error::Error;

pub const EXECUTE_FLAG: u32 = 0x1;
pub const WRITE_FLAG: u32 = 0x2;
pub const READ_FLAG: u32 = 0x4;

/// Size of an Elf64_Phdr.
pub const PROGRAM_HEADER_SIZE: usize = 56;

/// Describes a segment. Usually LoadSegment will be used instead of this.
pub struct ProgramHeader {
    // Elf64_Phdr, see https://llvm.org/doxygen/BinaryFormat_2ELF_8h_source.html
    pub stype: SegmentType,

    /// Offset to the first byte of the segment.
    pub offset: u64,

    /// Virtual address of the first byte in the segment.
    pub vaddr: u64,

    /// Number of bytes in the segment in the core file.
    pub file_size: u64,

    /// Number of bytes in the segment in memory.
    pub mem_size: u64,

    /// Read/Write/Execute flags.
    pub flags: u32,
}

#[derive(Debug, Eq, PartialEq)]
pub enum SegmentType {
    /// Not to be used: either it's a segment that is intended to be not used or one
    /// that is not recognized.
    Null,

    /// A loadable segment, described by p_filesz and p_memsz.
    Load,

    /// Specifies dynamic linking information.
    Dynamic,

    /// Location and size of a null-terminated path name to invoke as an interpreter.
    Interpreter,

    /// The location and size of auxiliary information.
    Note,

    /// Reserved but has unspecified semantics.
    Shlib,

    /// The location and size of the program header table itself.
    Phdr,

    // The Thread-Local Storage template.
    Tls,
}

impl SegmentType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interpreter,
            4 => SegmentType::Note,
            5 => SegmentType::Shlib,
            6 => SegmentType::Phdr,
            7 => SegmentType::Tls,
            0x60000000.. => SegmentType::Null, // OS, processor, and future use
            _ => {
                utils::warn(&format!("Unknown segment type: {value}"));
                SegmentType::Null
            }
        }
    }
}

pub struct LoadSegment {
    /// The bytes for the segment that were written into the core file. Empty when the
    /// kernel decided the contents could be found elsewhere (e.g. a mapped file) or
    /// were never touched.
    pub obytes: Bytes<Offset>,

    /// Addressing for the bytes in the segment using virtual addresses as in the cored process.
    pub vbytes: Bytes<VirtualAddr>,

    /// Readable, writeable, and/or executable, see READ_FLAG etc.
    pub flags: u32,
}

impl ProgramHeader {
    pub fn new(reader: &Reader, offset: usize) -> Result<Self, Box<dyn Error>> {
        let mut s = Stream::new(reader, offset);
        let p_type = SegmentType::from_u32(s.read_word()?);
        let p_flags = s.read_word()?;
        let p_offset = s.read_offset()?;
        let p_vaddr = s.read_addr()?;
        let _p_paddr = s.read_addr()?;
        let p_filesz = s.read_xword()?;
        let p_memsz = s.read_xword()?;
        let _p_align = s.read_xword()?;
        Ok(ProgramHeader {
            stype: p_type,
            flags: p_flags,
            offset: p_offset,
            vaddr: p_vaddr,
            file_size: p_filesz,
            mem_size: p_memsz,
        })
    }
}
