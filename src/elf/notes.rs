//! The notes in the core file's note segment. Only two matter for conversion: the
//! memory-mapped file table and one status note per thread.
use super::Stream;
use crate::error::CoreError;
use crate::utils;
use std::error::Error;

/// Size of Elf64_Nhdr: namesz, descsz, and type.
pub const NOTE_HEADER_SIZE: usize = 12;

#[derive(Debug, Eq, Hash, PartialEq)]
pub enum NoteType {
    /// Memory-mapped files, see fill_files_note in https://android.googlesource.com/kernel/common/+/6e7bfa046de8/fs/binfmt_elf.c
    File,

    /// Signal info, pid, general purpose registers, etc. One per thread. See elf_prstatus in
    /// https://docs.huihoo.com/doxygen/linux/kernel/3.7/uapi_2linux_2elfcore_8h_source.html.
    PrStatus,

    /// Notes that aren't needed for conversion, e.g. floating point registers and auxv.
    Other(u32),
}

impl NoteType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => NoteType::PrStatus, // see https://docs.huihoo.com/doxygen/linux/kernel/3.7/include_2uapi_2linux_2elf_8h_source.html
            0x46494c45 => NoteType::File,
            _ => NoteType::Other(value),
        }
    }
}

#[derive(Debug)]
pub struct NoteContents {
    pub offset: usize,
    pub size: u32,
}

#[derive(Debug)]
pub struct Note {
    pub name: String,
    pub ntype: NoteType,
    pub contents: NoteContents,
}

impl Note {
    /// Note types are only unique within an owner so check that too.
    pub fn is_core(&self, ntype: NoteType) -> bool {
        self.name == "CORE" && self.ntype == ntype
    }
}

pub struct PrStatus {
    /// The signal that terminated the process.
    pub signal_num: i32,

    /// Further details about the signal. For example, code can be SEGV_MAPERR (bad
    /// address) or SEGV_ACCERR (bad permessions) for the SIGSEGV signal.
    pub signal_code: i32,

    /// The id of the thread.
    pub pid: i32,

    /// General purpose registers in the order the kernel's pt_regs uses for the core's
    /// architecture, see https://elixir.bootlin.com/linux/v4.9/source/arch/x86/include/uapi/asm/ptrace.h#L60
    pub registers: Vec<u64>,
}

impl PrStatus {
    pub fn signal(&self) -> &'static str {
        match self.signal_num {
            0 => "none",
            1 => "SIGHUP", // see https://man7.org/linux/man-pages/man7/signal.7.html
            2 => "SIGINT",
            3 => "SIGQUIT",
            4 => "SIGILL",
            5 => "SIGTRAP",
            6 => "SIGABRT",
            7 => "SIGBUS",
            8 => "SIGFPE",
            9 => "SIGKILL",
            10 => "SIGUSR1",
            11 => match self.signal_code {
                1 => "SIGSEGV: Address not mapped to object", // SEGV_MAPERR
                2 => "SIGSEGV: Invalid permissions for mapped object", // SEGV_ACCERR
                _ => "SIGSEGV",
            },
            12 => "SIGUSR2",
            13 => "SIGPIPE",
            14 => "SIGALRM",
            15 => "SIGTERM",
            31 => "SIGSYS",
            _ => "unknown signal",
        }
    }
}

/// One entry in the NT_FILE note.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryMappedFile {
    /// Address of the start of the file in memory.
    pub start_addr: u64,

    /// Address just past the end of the file in memory.
    pub end_addr: u64,

    /// Offset into the file used when memory mapping, in pages.
    pub page_offset: u64,

    /// The name of the file.
    pub file_name: String,
}

impl MemoryMappedFile {
    /// Devices can't be read back in a meaningful way (and reading some would block).
    pub fn is_device(&self) -> bool {
        is_device_path(&self.file_name)
    }
}

pub fn is_device_path(path: &str) -> bool {
    path.starts_with("/dev/")
}

/// The NT_FILE note. Note that, unlike a debugger, we don't merge adjacent entries for
/// the same file: each entry may be needed to back a distinct load segment.
#[derive(Debug)]
pub struct FileTable {
    pub page_size: u64,
    pub files: Vec<MemoryMappedFile>,
}

/// Reads the note at s.offset and leaves s pointing at the next note. The whole note
/// must lie before end.
pub fn read_note(s: &mut Stream, end: usize) -> Result<Note, Box<dyn Error>> {
    let start = s.offset;
    if start + NOTE_HEADER_SIZE > end {
        return Err(CoreError::malformed(start, "note header runs past the note segment").into());
    }
    let n_namesz = s.read_word()?;
    let n_descsz = s.read_word()?;
    let n_type = s.read_word()?;

    // name and desc are each padded to a 4-byte boundary.
    let name_offset = s.offset;
    let desc_offset = name_offset.checked_add(utils::align_to_word(n_namesz));
    let next = desc_offset.and_then(|o| o.checked_add(utils::align_to_word(n_descsz)));
    let (Some(desc_offset), Some(next)) = (desc_offset, next) else {
        return Err(CoreError::malformed(start, "note sizes overflow").into());
    };
    if next > end {
        return Err(CoreError::malformed(
            start,
            format!(
                "name ({n_namesz} bytes) and desc ({n_descsz} bytes) run past the note segment"
            ),
        )
        .into());
    }

    // namesz includes the null terminator.
    let name_len = (n_namesz as usize).saturating_sub(1);
    let name_bytes = s.reader.slice(name_offset, name_len)?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();
    s.offset = next;

    Ok(Note {
        name,
        ntype: NoteType::from_u32(n_type),
        contents: NoteContents {
            offset: desc_offset,
            size: n_descsz,
        },
    })
}
