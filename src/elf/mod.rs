//! ELF core file support. Only the parts of the format needed to convert a core are
//! read: the header, the program headers, and a couple of notes.
//! Quick ELF reference: https://gist.github.com/x0nu11byt3/bcb35c3de461e5fb66173071a2379779
//!
//! ELF files start with an ELF header which includes:
//! * A magic number to identify the file as an ELF file.
//! * The architecture, e.g. Linux AMD x86-64.
//! * The offset to and number of program headers.
//!
//! Program headers identify segments. For a core file the interesting types are:
//! * Load - the memory of the process. Contents are either in the core file or, for
//!   unmodified pages of memory mapped files, left out and found via the file note.
//! * Note - variety of metadata, e.g. memory mapped files and per-thread registers.
pub mod elf_file;
pub mod header;
pub mod io;
pub mod notes;
pub mod primitives;
pub mod segments;

pub use elf_file::*;
pub use header::*;
pub use io::*;
pub use notes::*;
pub use primitives::*;
pub use segments::*;
