//! Mach-O core file support. A Mach-O core is much simpler than an ELF core: a
//! mach_header_64 followed by load commands and then the raw bytes the commands point
//! at. There are only two kinds of commands in a core:
//! * LC_SEGMENT_64 - one per region of memory, with the file offset of its contents.
//! * LC_THREAD - one per thread, holding register state as a list of "flavors".
//!
//! See https://github.com/apple-oss-distributions/xnu/blob/main/EXTERNAL_HEADERS/mach-o/loader.h
pub mod arch;

pub use arch::*;

use bitflags::bitflags;

pub const MH_MAGIC_64: u32 = 0xfeedfacf;
pub const MH_EXECUTE: u32 = 0x2;
pub const MH_CORE: u32 = 0x4;

pub const LC_THREAD: u32 = 0x4;
pub const LC_SEGMENT_64: u32 = 0x19;

pub const MACH_HEADER_SIZE: usize = 32;
pub const SEGMENT_COMMAND_SIZE: usize = 72;

/// cmd and cmdsize. The flavors follow.
pub const THREAD_COMMAND_SIZE: usize = 8;

/// flavor and count. The state follows.
pub const FLAVOR_HEADER_SIZE: usize = 8;

bitflags! {
    /// vm_prot_t
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct VmProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

impl VmProt {
    /// ELF uses the same three bits but in the opposite order.
    pub fn from_elf(flags: u32) -> Self {
        let mut prot = VmProt::empty();
        if flags & crate::elf::READ_FLAG != 0 {
            prot |= VmProt::READ;
        }
        if flags & crate::elf::WRITE_FLAG != 0 {
            prot |= VmProt::WRITE;
        }
        if flags & crate::elf::EXECUTE_FLAG != 0 {
            prot |= VmProt::EXECUTE;
        }
        prot
    }

    pub fn describe(&self) -> String {
        let mut result = String::with_capacity(3);
        result.push(if self.contains(VmProt::READ) { 'r' } else { '-' });
        result.push(if self.contains(VmProt::WRITE) { 'w' } else { '-' });
        result.push(if self.contains(VmProt::EXECUTE) { 'x' } else { '-' });
        result
    }
}

/// mach_header_64. The magic is implied and reserved is always zero.
#[derive(Debug, Eq, PartialEq)]
pub struct MachHeader {
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

impl MachHeader {
    /// Returns None if bytes don't start with a little endian 64-bit Mach-O header.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let word = |i: usize| -> Option<u32> {
            let slice = bytes.get(4 * i..4 * i + 4)?;
            Some(u32::from_le_bytes(slice.try_into().ok()?))
        };
        if word(0)? != MH_MAGIC_64 {
            return None;
        }
        Some(MachHeader {
            cpu_type: word(1)?,
            cpu_subtype: word(2)?,
            filetype: word(3)?,
            ncmds: word(4)?,
            sizeofcmds: word(5)?,
            flags: word(6)?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        for word in [
            MH_MAGIC_64,
            self.cpu_type,
            self.cpu_subtype,
            self.filetype,
            self.ncmds,
            self.sizeofcmds,
            self.flags,
            0, // reserved
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
}

/// segment_command_64 without sections. Segments in a core have no name.
#[derive(Debug, Eq, PartialEq)]
pub struct SegmentCommand {
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub prot: VmProt,
}

impl SegmentCommand {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&LC_SEGMENT_64.to_le_bytes());
        out.extend_from_slice(&(SEGMENT_COMMAND_SIZE as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 16]); // segname
        out.extend_from_slice(&self.vmaddr.to_le_bytes());
        out.extend_from_slice(&self.vmsize.to_le_bytes());
        out.extend_from_slice(&self.fileoff.to_le_bytes());
        out.extend_from_slice(&self.filesize.to_le_bytes());
        out.extend_from_slice(&self.prot.bits().to_le_bytes()); // maxprot
        out.extend_from_slice(&self.prot.bits().to_le_bytes()); // initprot
        out.extend_from_slice(&0u32.to_le_bytes()); // nsects
        out.extend_from_slice(&0u32.to_le_bytes()); // flags
    }

    #[cfg(test)]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let word = |o: usize| u32::from_le_bytes(bytes[o..o + 4].try_into().unwrap());
        let xword = |o: usize| u64::from_le_bytes(bytes[o..o + 8].try_into().unwrap());
        if bytes.len() < SEGMENT_COMMAND_SIZE || word(0) != LC_SEGMENT_64 {
            return None;
        }
        assert_eq!(word(4) as usize, SEGMENT_COMMAND_SIZE);
        assert_eq!(word(56), word(60), "maxprot and initprot should match");
        Some(SegmentCommand {
            vmaddr: xword(24),
            vmsize: xword(32),
            fileoff: xword(40),
            filesize: xword(48),
            prot: VmProt::from_bits_truncate(word(60)),
        })
    }
}

/// Appends a flavor header and its state to an LC_THREAD under construction.
pub fn write_flavor(out: &mut Vec<u8>, flavor: u32, state: &[u8]) {
    debug_assert!(state.len() % 4 == 0);
    out.extend_from_slice(&flavor.to_le_bytes());
    out.extend_from_slice(&((state.len() / 4) as u32).to_le_bytes()); // count is in ints
    out.extend_from_slice(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = MachHeader {
            cpu_type: 0x01000007,
            cpu_subtype: 3,
            filetype: MH_CORE,
            ncmds: 2,
            sizeofcmds: 0x300,
            flags: 0x200085,
        };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes);
        assert_eq!(bytes.len(), MACH_HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[0xcf, 0xfa, 0xed, 0xfe]);
        assert_eq!(MachHeader::parse(&bytes), Some(header));
    }

    #[test]
    fn header_needs_magic() {
        assert_eq!(MachHeader::parse(b"\x7fELF\x02\x01\x01\0"), None);
        assert_eq!(MachHeader::parse(&[0xcf, 0xfa, 0xed, 0xfe, 7, 0]), None);
    }

    #[test]
    fn segment_layout() {
        let segment = SegmentCommand {
            vmaddr: 0x7fff0000,
            vmsize: 0x4000,
            fileoff: 0x1000,
            filesize: 0x2000,
            prot: VmProt::READ | VmProt::WRITE,
        };
        let mut bytes = Vec::new();
        segment.write_to(&mut bytes);
        assert_eq!(bytes.len(), SEGMENT_COMMAND_SIZE);
        assert_eq!(SegmentCommand::parse(&bytes), Some(segment));
    }

    #[test]
    fn protection_from_elf() {
        assert_eq!(VmProt::from_elf(0x4), VmProt::READ);
        assert_eq!(VmProt::from_elf(0x1), VmProt::EXECUTE);
        assert_eq!(VmProt::from_elf(0x7).describe(), "rwx");
        assert_eq!(VmProt::from_elf(0x6).describe(), "rw-");
        assert!(VmProt::from_elf(0).is_empty());
    }
}
