//! A parsed core file: the load segments, the file mapping table, and the status
//! of each thread.
use super::{
    ElfHeader, FileTable, LoadSegment, MemoryMappedFile, Note, NoteType, PROGRAM_HEADER_SIZE,
    PrStatus, ProgramHeader, Reader, SegmentType, Stream,
};
use crate::elf::{Bytes, Offset, VirtualAddr};
use crate::error::CoreError;
use crate::macho::Arch;
use crate::utils;
use memmap2::Mmap;
use std::error::Error;
use std::fs::File;

/// Offset of pr_reg within a 64-bit elf_prstatus.
const PRSTATUS_REGISTERS: usize = 112;

pub struct ElfFile {
    pub header: ElfHeader,
    pub path: std::path::PathBuf,
    pub reader: Reader,
    pub loads: Vec<LoadSegment>,
    pub notes: Vec<Note>,
    pub file_table: FileTable,
    pub threads: Vec<PrStatus>,
}

impl ElfFile {
    /// Fails if the file isn't a core for arch or if the notes needed for conversion
    /// are missing or corrupt.
    pub fn new(path: std::path::PathBuf, arch: &dyn Arch) -> Result<Self, Box<dyn Error>> {
        let file = File::open(&path)?;

        // This is unsafe because it has undefined behavior if the underlying file is
        // modified while the memory map is in use.
        let bytes = unsafe { Mmap::map(&file) }?;
        let reader = Reader::new(bytes)?;
        let header = ElfHeader::new(&reader)?;
        header.validate(arch.elf_machine())?;

        let headers = ElfFile::load_program_headers(&reader, &header)?;
        let loads = ElfFile::load_loads(&reader, &headers)?;
        let notes = ElfFile::load_notes(&reader, &headers)?;
        let file_table = ElfFile::load_file_table(&reader, &notes)?;
        let threads = ElfFile::load_threads(&reader, &notes, arch)?;
        Ok(ElfFile {
            header,
            path,
            reader,
            loads,
            notes,
            file_table,
            threads,
        })
    }

    /// True if some load segment starts exactly at the mapped file's start address.
    pub fn has_load_at(&self, file: &MemoryMappedFile) -> bool {
        self.loads.iter().any(|s| s.vbytes.start.0 == file.start_addr)
    }
}

impl ElfFile {
    fn load_program_headers(
        reader: &Reader,
        header: &ElfHeader,
    ) -> Result<Vec<ProgramHeader>, Box<dyn Error>> {
        utils::require(
            header.num_ph_entries == 0 || header.ph_entry_size as usize >= PROGRAM_HEADER_SIZE,
            &format!("program header entries are too small: {}", header.ph_entry_size),
        )
        .map_err(|e| CoreError::format(e.to_string()))?;

        let mut headers = Vec::new();
        let mut offset = header.ph_offset as usize;
        for _ in 0..header.num_ph_entries {
            let ph = ProgramHeader::new(reader, offset).map_err(|err| {
                CoreError::format(format!("failed to read program header at {offset:#x}: {err}"))
            })?;
            headers.push(ph);
            offset += header.ph_entry_size as usize;
        }
        Ok(headers)
    }

    fn load_loads(
        reader: &Reader,
        headers: &[ProgramHeader],
    ) -> Result<Vec<LoadSegment>, Box<dyn Error>> {
        let mut loads = Vec::new();
        for ph in headers.iter() {
            match ph.stype {
                SegmentType::Load => {
                    if ph.vaddr.checked_add(ph.mem_size).is_none() {
                        return Err(CoreError::format(format!(
                            "load segment at {:#x} with size {:#x} wraps the address space",
                            ph.vaddr, ph.mem_size
                        ))
                        .into());
                    }
                    let obytes = Bytes::<Offset>::from_raw(ph.offset, ph.file_size);
                    if ph.file_size > 0 && obytes.end().0 > reader.len() as u64 {
                        return Err(CoreError::format(format!(
                            "load segment at {:#x} has {:#x} bytes past the end of the core",
                            ph.vaddr,
                            obytes.end().0 - reader.len() as u64
                        ))
                        .into());
                    }
                    loads.push(LoadSegment {
                        obytes,
                        vbytes: Bytes::<VirtualAddr>::from_raw(ph.vaddr, ph.mem_size),
                        flags: ph.flags,
                    });
                }
                SegmentType::Note | SegmentType::Null | SegmentType::Phdr => (),
                _ => utils::warn(&format!("Ignoring segment type {:?}", ph.stype)),
            }
        }
        Ok(loads)
    }

    fn load_notes(reader: &Reader, headers: &[ProgramHeader]) -> Result<Vec<Note>, Box<dyn Error>> {
        let mut segments = headers.iter().filter(|ph| ph.stype == SegmentType::Note);
        let Some(ph) = segments.next() else {
            return Err(CoreError::MissingSegment.into());
        };
        if segments.next().is_some() {
            utils::warn("ignoring extra note segment");
        }

        let start = ph.offset as usize;
        let end = start.saturating_add(ph.file_size as usize);
        if end > reader.len() {
            return Err(CoreError::format("note segment runs past the end of the core").into());
        }

        // Unlike a debugger we can't limp along with a damaged note: everything that
        // follows would be misplaced.
        let mut notes = Vec::new();
        let mut s = Stream::new(reader, start);
        while s.offset < end {
            notes.push(super::read_note(&mut s, end)?);
        }
        Ok(notes)
    }

    fn load_file_table(reader: &Reader, notes: &[Note]) -> Result<FileTable, Box<dyn Error>> {
        fn get_file_table(s: &mut Stream, end: usize) -> Result<FileTable, Box<dyn Error>> {
            let count = s.read_xword()?;
            let page_size = s.read_xword()?;

            // Three xwords per entry and at least a null per name.
            utils::require(
                count.saturating_mul(25) <= end.saturating_sub(s.offset) as u64,
                &format!("{count} entries can't fit in the note"),
            )?;

            let mut elements = Vec::new();
            for _ in 0..count {
                let start_addr = s.read_xword()?;
                let end_addr = s.read_xword()?;
                let page_offset = s.read_xword()?;
                elements.push((start_addr, end_addr, page_offset));
            }

            let mut files = Vec::with_capacity(elements.len());
            for (start_addr, end_addr, page_offset) in elements {
                utils::require(
                    start_addr <= end_addr,
                    &format!("mapping {start_addr:#x}..{end_addr:#x} is backwards"),
                )?;
                let file_name = s.read_string(end)?;
                files.push(MemoryMappedFile {
                    start_addr,
                    end_addr,
                    page_offset,
                    file_name,
                });
            }
            Ok(FileTable { page_size, files })
        }

        let mut tables = notes.iter().filter(|n| n.is_core(NoteType::File));
        let Some(note) = tables.next() else {
            return Err(CoreError::MissingFileTable.into());
        };
        if tables.next().is_some() {
            utils::warn("ignoring extra memory mapped file note");
        }

        let offset = note.contents.offset;
        let mut s = Stream::new(reader, offset);
        get_file_table(&mut s, offset + note.contents.size as usize)
            .map_err(|e| CoreError::malformed(offset, format!("bad file table: {e}")).into())
    }

    fn load_threads(
        reader: &Reader,
        notes: &[Note],
        arch: &dyn Arch,
    ) -> Result<Vec<PrStatus>, Box<dyn Error>> {
        fn get_prstatus(s: &mut Stream, num_registers: usize) -> Result<PrStatus, Box<dyn Error>> {
            // See elf_prstatus in https://docs.huihoo.com/doxygen/linux/kernel/3.7/uapi_2linux_2elfcore_8h_source.html
            let base = s.offset;
            let signal_num = s.read_int()?;
            let signal_code = s.read_int()?;
            let _errno = s.read_int()?;
            let _current_signal = s.read_half()?; // This is the current signal, not the one that caused the core dump.
            let _padding = s.read_half()?;
            let _pending_signals = s.read_xword()?;
            let _held_signals = s.read_xword()?;
            let pid = s.read_int()?;
            let _ppid = s.read_int()?;
            let _pgrp = s.read_int()?;
            let _sid = s.read_int()?;

            // user, system, cumulative user, and cumulative system timevals
            s.offset = base + PRSTATUS_REGISTERS;

            let mut registers = Vec::with_capacity(num_registers);
            for _ in 0..num_registers {
                registers.push(s.read_xword()?);
            }

            Ok(PrStatus {
                signal_num,
                signal_code,
                pid,
                registers,
            })
        }

        let needed = PRSTATUS_REGISTERS + 8 * arch.num_registers();
        let mut threads = Vec::new();
        for note in notes.iter().filter(|n| n.is_core(NoteType::PrStatus)) {
            let offset = note.contents.offset;
            if (note.contents.size as usize) < needed {
                return Err(CoreError::malformed(
                    offset,
                    format!(
                        "thread status is {} bytes but {} registers need {needed}",
                        note.contents.size,
                        arch.num_registers()
                    ),
                )
                .into());
            }
            let mut s = Stream::new(reader, offset);
            threads.push(get_prstatus(&mut s, arch.num_registers())?);
        }
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::X86_64;
    use crate::utils::test_core::{CoreBuilder, X86_64_REGISTERS};

    fn core_error(err: Box<dyn Error>) -> CoreError {
        match err.downcast::<CoreError>() {
            Ok(e) => *e,
            Err(e) => panic!("expected a CoreError, got: {e}"),
        }
    }

    #[test]
    fn parses_loads_files_and_threads() {
        let builder = CoreBuilder::new()
            .load(0x400000, 0x1000, 0x5, &[0xaa; 0x1000])
            .load(0x600000, 0x2000, 0x6, &[])
            .file_table(
                4096,
                &[
                    (0x600000, 0x602000, 3, "/usr/lib/libfoo.dylib"),
                    (0x700000, 0x701000, 0, "/dev/zero"),
                ],
            )
            .thread(42, 11, &X86_64_REGISTERS);
        let (_tmp, core) = builder.open().unwrap();

        assert_eq!(core.header.stype(), "core");
        assert_eq!(core.header.machine(), "x86-64");
        assert_eq!(core.loads.len(), 2);
        assert_eq!(core.loads[0].obytes.size, 0x1000);
        assert_eq!(core.loads[0].flags, 0x5);
        assert_eq!(core.loads[1].obytes.size, 0);
        assert_eq!(core.loads[1].vbytes.size, 0x2000);

        let files = &core.file_table.files;
        assert_eq!(core.file_table.page_size, 4096);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "/usr/lib/libfoo.dylib");
        assert_eq!(files[0].page_offset, 3);
        assert!(files[1].is_device());
        assert!(core.has_load_at(&files[0]));
        assert!(!core.has_load_at(&files[1]));

        assert_eq!(core.threads.len(), 1);
        assert_eq!(core.threads[0].pid, 42);
        assert_eq!(core.threads[0].registers, X86_64_REGISTERS.to_vec());
    }

    #[test]
    fn signal_names() {
        let (_tmp, core) = CoreBuilder::new()
            .file_table(4096, &[])
            .thread(7, 11, &X86_64_REGISTERS)
            .open()
            .unwrap();
        insta::assert_snapshot!(core.threads[0].signal(), @"SIGSEGV: Address not mapped to object");
    }

    #[test]
    fn skips_unrelated_notes() {
        let (_tmp, core) = CoreBuilder::new()
            .note("CORE", 2, &[0u8; 512]) // floating point registers
            .file_table(4096, &[])
            .note("LINUX", 0x53494749, &[1, 2, 3]) // odd size to check alignment
            .note("LINUX", 1, &[0u8; 8]) // same type as a thread status but a different owner
            .thread(1, 6, &X86_64_REGISTERS)
            .thread(2, 0, &X86_64_REGISTERS)
            .open()
            .unwrap();
        assert_eq!(core.notes.len(), 6);
        assert_eq!(core.notes[0].name, "CORE");
        assert_eq!(core.notes[0].ntype, NoteType::Other(2));
        assert_eq!(core.threads.len(), 2);
        assert_eq!(core.threads[1].pid, 2);
    }

    #[test]
    fn missing_note_segment() {
        let err = CoreBuilder::new()
            .load(0x1000, 0x1000, 0x4, &[1; 0x1000])
            .without_note_segment()
            .open()
            .err()
            .unwrap();
        assert_eq!(core_error(err), CoreError::MissingSegment);
    }

    #[test]
    fn missing_file_table() {
        let err = CoreBuilder::new()
            .thread(1, 6, &X86_64_REGISTERS)
            .open()
            .err()
            .unwrap();
        assert_eq!(core_error(err), CoreError::MissingFileTable);
    }

    #[test]
    fn note_past_segment_end() {
        let mut builder = CoreBuilder::new().file_table(4096, &[]);
        // descsz claims far more than the segment holds
        builder = builder.raw_note(&[
            5, 0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, b'C', b'O', b'R', b'E', 0, 0, 0, 0,
        ]);
        let err = builder.open().err().unwrap();
        assert!(matches!(core_error(err), CoreError::MalformedNote { .. }));
    }

    #[test]
    fn huge_note_sizes() {
        // namesz would wrap if it was aligned as a u32
        let builder = CoreBuilder::new()
            .file_table(4096, &[])
            .raw_note(&[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0, 1, 0, 0, 0]);
        let err = builder.open().err().unwrap();
        assert!(matches!(core_error(err), CoreError::MalformedNote { .. }));

        let builder = CoreBuilder::new()
            .file_table(4096, &[])
            .raw_note(&[5, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff, 1, 0, 0, 0])
            .raw_note(b"CORE\0\0\0\0");
        let err = builder.open().err().unwrap();
        assert!(matches!(core_error(err), CoreError::MalformedNote { .. }));
    }

    #[test]
    fn short_thread_status() {
        let err = CoreBuilder::new()
            .file_table(4096, &[])
            .note("CORE", 1, &[0u8; 200])
            .open()
            .err()
            .unwrap();
        assert!(matches!(core_error(err), CoreError::MalformedNote { .. }));
    }

    #[test]
    fn truncated_file_table() {
        // count says two entries but there is only room for one
        let mut desc = Vec::new();
        for word in [2u64, 4096, 0x1000, 0x2000, 0] {
            desc.extend_from_slice(&word.to_le_bytes());
        }
        desc.extend_from_slice(b"/a\0");
        let err = CoreBuilder::new()
            .note("CORE", 0x46494c45, &desc)
            .open()
            .err()
            .unwrap();
        assert!(matches!(core_error(err), CoreError::MalformedNote { .. }));
    }

    #[test]
    fn rejects_other_formats() {
        let cases = [
            CoreBuilder::new().machine(0xb7),
            CoreBuilder::new().etype(2),
            CoreBuilder::new().class(1),
            CoreBuilder::new().data(2),
        ];
        for builder in cases {
            let err = builder.file_table(4096, &[]).open().err().unwrap();
            assert!(matches!(core_error(err), CoreError::Format(_)));
        }
    }

    #[test]
    fn rejects_non_elf() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![0u8; 128]).unwrap();
        let err = ElfFile::new(tmp.path().to_path_buf(), &X86_64).err().unwrap();
        assert!(matches!(core_error(err), CoreError::Format(_)));
    }

    #[test]
    fn load_wraps_address_space() {
        let err = CoreBuilder::new()
            .load(0x1000, u64::MAX - 0x10, 0x6, &[])
            .file_table(4096, &[])
            .open()
            .err()
            .unwrap();
        assert!(matches!(core_error(err), CoreError::Format(_)));
    }

    #[test]
    fn load_past_end_of_core() {
        let mut builder = CoreBuilder::new().file_table(4096, &[]);
        builder = builder.load(0x1000, 0x1000, 0x4, &[1; 0x1000]).truncate(0x800);
        let err = builder.open().err().unwrap();
        assert!(matches!(core_error(err), CoreError::Format(_)));
    }
}
