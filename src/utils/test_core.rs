//! Builds small synthetic ELF core files for unit tests.
use crate::elf::ElfFile;
use crate::macho::X86_64;
use std::error::Error;
use std::io::Write;
use tempfile::NamedTempFile;

/// pt_regs values where each register is distinct so mix ups are obvious:
/// r15 = 0x1500, r14 = 0x1400, ..., rip = 0x7000, cs = 0x33, etc.
pub const X86_64_REGISTERS: [u64; 27] = [
    0x1500, // r15
    0x1400, // r14
    0x1300, // r13
    0x1200, // r12
    0xb000, // rbp
    0xb100, // rbx
    0x1100, // r11
    0x1000, // r10
    0x0900, // r9
    0x0800, // r8
    0xa000, // rax
    0xc000, // rcx
    0xd000, // rdx
    0x5100, // rsi
    0xd100, // rdi
    0xffff, // orig_rax
    0x7000, // rip
    0x33,   // cs
    0x246,  // eflags
    0x5000, // rsp
    0x2b,   // ss
    0xf5000, // fs_base
    0x65000, // gs_base
    0x0,    // ds
    0x0,    // es
    0x63,   // fs
    0x6b,   // gs
];

struct TestLoad {
    vaddr: u64,
    mem_size: u64,
    flags: u32,
    contents: Vec<u8>,
}

pub struct CoreBuilder {
    class: u8,
    data: u8,
    etype: u16,
    machine: u16,
    note_segment: bool,
    loads: Vec<TestLoad>,
    notes: Vec<u8>,
    truncate: usize,
}

impl CoreBuilder {
    /// An x86-64 core with an empty note segment.
    pub fn new() -> Self {
        CoreBuilder {
            class: 2,
            data: 1,
            etype: 4,
            machine: 0x3e,
            note_segment: true,
            loads: Vec::new(),
            notes: Vec::new(),
            truncate: 0,
        }
    }

    pub fn class(mut self, class: u8) -> Self {
        self.class = class;
        self
    }

    pub fn data(mut self, data: u8) -> Self {
        self.data = data;
        self
    }

    pub fn etype(mut self, etype: u16) -> Self {
        self.etype = etype;
        self
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn without_note_segment(mut self) -> Self {
        self.note_segment = false;
        self
    }

    /// Chops bytes off the end of the finished core.
    pub fn truncate(mut self, bytes: usize) -> Self {
        self.truncate = bytes;
        self
    }

    /// contents are stored in the core, use an empty slice for p_filesz == 0.
    pub fn load(mut self, vaddr: u64, mem_size: u64, flags: u32, contents: &[u8]) -> Self {
        self.loads.push(TestLoad {
            vaddr,
            mem_size,
            flags,
            contents: contents.to_vec(),
        });
        self
    }

    pub fn note(mut self, name: &str, ntype: u32, desc: &[u8]) -> Self {
        let mut name = name.as_bytes().to_vec();
        name.push(0);
        self.notes.extend_from_slice(&(name.len() as u32).to_le_bytes());
        self.notes.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        self.notes.extend_from_slice(&ntype.to_le_bytes());
        self.notes.extend_from_slice(&name);
        pad4(&mut self.notes);
        self.notes.extend_from_slice(desc);
        pad4(&mut self.notes);
        self
    }

    /// Appended to the note segment as is.
    pub fn raw_note(mut self, bytes: &[u8]) -> Self {
        self.notes.extend_from_slice(bytes);
        self
    }

    /// entries are (start, end, page offset, path).
    pub fn file_table(self, page_size: u64, entries: &[(u64, u64, u64, &str)]) -> Self {
        let mut desc = Vec::new();
        desc.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        desc.extend_from_slice(&page_size.to_le_bytes());
        for (start, end, offset, _) in entries {
            desc.extend_from_slice(&start.to_le_bytes());
            desc.extend_from_slice(&end.to_le_bytes());
            desc.extend_from_slice(&offset.to_le_bytes());
        }
        for (_, _, _, path) in entries {
            desc.extend_from_slice(path.as_bytes());
            desc.push(0);
        }
        self.note("CORE", 0x46494c45, &desc)
    }

    /// An x86-64 elf_prstatus.
    pub fn thread(self, pid: i32, signal: i32, registers: &[u64]) -> Self {
        let mut desc = vec![0u8; 336];
        desc[0..4].copy_from_slice(&signal.to_le_bytes());
        desc[4..8].copy_from_slice(&1i32.to_le_bytes()); // si_code
        desc[12..14].copy_from_slice(&(signal as u16).to_le_bytes());
        desc[32..36].copy_from_slice(&pid.to_le_bytes());
        for (i, r) in registers.iter().enumerate() {
            let offset = 112 + 8 * i;
            desc[offset..offset + 8].copy_from_slice(&r.to_le_bytes());
        }
        self.note("CORE", 1, &desc)
    }

    pub fn build(&self) -> Vec<u8> {
        let num_headers = self.loads.len() + usize::from(self.note_segment);
        let notes_offset = 64 + 56 * num_headers;
        let mut contents_offset = notes_offset + self.notes.len();

        let mut bytes = vec![0u8; 64];
        bytes[0..4].copy_from_slice(b"\x7fELF");
        bytes[4] = self.class;
        bytes[5] = self.data;
        bytes[6] = 1;
        bytes[16..18].copy_from_slice(&self.etype.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.machine.to_le_bytes());
        bytes[20..24].copy_from_slice(&1u32.to_le_bytes());
        bytes[32..40].copy_from_slice(&64u64.to_le_bytes()); // e_phoff
        bytes[52..54].copy_from_slice(&64u16.to_le_bytes());
        bytes[54..56].copy_from_slice(&56u16.to_le_bytes());
        bytes[56..58].copy_from_slice(&(num_headers as u16).to_le_bytes());

        if self.note_segment {
            let size = self.notes.len() as u64;
            phdr(&mut bytes, 4, 0, notes_offset as u64, 0, size, 0);
        }
        for load in self.loads.iter() {
            let size = load.contents.len() as u64;
            phdr(
                &mut bytes,
                1,
                load.flags,
                contents_offset as u64,
                load.vaddr,
                size,
                load.mem_size,
            );
            contents_offset += load.contents.len();
        }

        bytes.extend_from_slice(&self.notes);
        for load in self.loads.iter() {
            bytes.extend_from_slice(&load.contents);
        }
        bytes.truncate(bytes.len() - self.truncate);
        bytes
    }

    pub fn write(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.build()).unwrap();
        file.flush().unwrap();
        file
    }

    /// The temp file is returned so that it outlives the core.
    pub fn open(&self) -> Result<(NamedTempFile, ElfFile), Box<dyn Error>> {
        let file = self.write();
        let core = ElfFile::new(file.path().to_path_buf(), &X86_64)?;
        Ok((file, core))
    }
}

impl CoreBuilder {
    /// Offset of the contents of the load with index i (in the order load was called).
    pub fn load_offset(&self, i: usize) -> usize {
        let num_headers = self.loads.len() + usize::from(self.note_segment);
        let start = 64 + 56 * num_headers + self.notes.len();
        start
            + self.loads[..i]
                .iter()
                .map(|l| l.contents.len())
                .sum::<usize>()
    }
}

fn phdr(
    bytes: &mut Vec<u8>,
    ptype: u32,
    flags: u32,
    offset: u64,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
) {
    bytes.extend_from_slice(&ptype.to_le_bytes());
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&offset.to_le_bytes());
    bytes.extend_from_slice(&vaddr.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes()); // paddr
    bytes.extend_from_slice(&filesz.to_le_bytes());
    bytes.extend_from_slice(&memsz.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes()); // align
}

fn pad4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}
