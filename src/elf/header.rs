//! The ELF header at the start of the core file.
use super::{Reader, Stream};
use crate::error::CoreError;
use std::error::Error;

pub const ET_CORE: u16 = 4;
pub const EV_CURRENT: u32 = 1;

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

/// The parts of Elf64_Ehdr needed to find and check the program headers.
#[derive(Debug)]
pub struct ElfHeader {
    pub class: u8,
    pub data: u8,
    pub ident_version: u8,
    pub etype: u16,
    pub machine: u16,
    pub version: u32,
    pub ph_offset: u64,
    pub ph_entry_size: u16,
    pub num_ph_entries: u16,
}

impl ElfHeader {
    pub fn new(reader: &Reader) -> Result<Self, Box<dyn Error>> {
        let class = reader.read_byte(0x04)?;
        let data = reader.read_byte(0x05)?;
        let ident_version = reader.read_byte(0x06)?;

        let mut s = Stream::new(reader, 0x10);
        let etype = s.read_half()?;
        let machine = s.read_half()?;
        let version = s.read_word()?;
        let _entry = s.read_addr()?;
        let ph_offset = s.read_offset()?;
        let _section_offset = s.read_offset()?;
        let _flags = s.read_word()?;
        let _header_size = s.read_half()?;
        let ph_entry_size = s.read_half()?;
        let num_ph_entries = s.read_half()?;

        Ok(ElfHeader {
            class,
            data,
            ident_version,
            etype,
            machine,
            version,
            ph_offset,
            ph_entry_size,
            num_ph_entries,
        })
    }

    /// Only one combination is converted: a 64-bit little-endian core for the
    /// architecture that was selected.
    pub fn validate(&self, machine: u16) -> Result<(), CoreError> {
        if self.class != ELFCLASS64 {
            return Err(CoreError::format(format!(
                "expected a 64-bit core, class is {}",
                self.class
            )));
        }
        if self.data != ELFDATA2LSB {
            return Err(CoreError::format("expected a little endian core"));
        }
        if self.ident_version as u32 != EV_CURRENT || self.version != EV_CURRENT {
            return Err(CoreError::format(format!(
                "bad elf version: {}/{}",
                self.ident_version, self.version
            )));
        }
        if self.etype != ET_CORE {
            return Err(CoreError::format(format!("not a core file ({})", self.stype())));
        }
        if self.machine != machine {
            return Err(CoreError::format(format!(
                "core is for {} not {}",
                self.machine(),
                machine_name(machine)
            )));
        }
        Ok(())
    }

    pub fn stype(&self) -> &'static str {
        match self.etype {
            0 => "none",
            1 => "relocatable",
            2 => "executable",
            3 => "shared object",
            4 => "core",
            _ => "unknown",
        }
    }

    pub fn machine(&self) -> &'static str {
        machine_name(self.machine)
    }
}

fn machine_name(machine: u16) -> &'static str {
    // see https://llvm.org/doxygen/BinaryFormat_2ELF_8h_source.html
    match machine {
        0x03 => "x86",
        0x28 => "arm",
        0x3e => "x86-64",
        0xb7 => "aarch64",
        0xf3 => "riscv",
        _ => "unknown machine",
    }
}
