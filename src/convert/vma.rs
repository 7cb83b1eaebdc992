//! Works out the regions of memory to write into the Mach-O core. The load segments
//! are the primary source but the kernel omits the contents of unmodified file
//! mappings so those have to be matched up with the file table. gcore also records
//! mappings in the file table that have no load segment at all.
use super::FileResolver;
use crate::elf::{Bytes, ElfFile, LoadSegment, Offset, VirtualAddr, is_device_path};
use crate::macho::{MH_EXECUTE, VmProt};
use crate::utils;
use std::collections::HashSet;

/// Where the contents of a Vma come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Backing {
    /// The bytes are in the ELF core.
    Embedded(Bytes<Offset>),

    /// The bytes have to be read from a mapped file.
    File { path: String, offset: u64, size: u64 },

    /// The pages were never touched so they are all zero.
    ZeroFill,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Vma {
    pub vbytes: Bytes<VirtualAddr>,
    pub prot: VmProt,
    pub backing: Backing,

    /// Invalid regions (e.g. __PAGEZERO) are left out of the Mach-O core entirely.
    pub valid: bool,
}

impl Vma {
    /// Number of bytes the backing provides, zero for ZeroFill.
    pub fn file_size(&self) -> u64 {
        match &self.backing {
            Backing::Embedded(obytes) => obytes.size,
            Backing::File { size, .. } => *size,
            Backing::ZeroFill => 0,
        }
    }

    /// Number of bytes the region takes up in the Mach-O core. Regions without
    /// contents still get their full size (as zeros) so debuggers see the whole region.
    pub fn reserved_size(&self) -> u64 {
        match self.file_size() {
            0 => self.vbytes.size,
            n => n,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.backing {
            Backing::File { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_device(&self) -> bool {
        self.path().is_some_and(is_device_path)
    }

    pub fn describe_backing(&self) -> &'static str {
        match self.backing {
            Backing::Embedded(_) => "core",
            Backing::File { .. } if self.is_device() => "device",
            Backing::File { .. } => "file",
            Backing::ZeroFill => "zeros",
        }
    }
}

/// Returns the regions in the order they should appear in the Mach-O core: one per
/// load segment (some of which may be invalid) followed by any mapping missing from
/// the load segments.
pub fn find_vmas(core: &ElfFile) -> Vec<Vma> {
    let mut vmas: Vec<Vma> = core.loads.iter().map(|l| from_load(core, l)).collect();

    // TODO: only the first mapping without a load segment is added. Check against a
    // gcore'd process with several such mappings before adding all of them.
    let page_size = core.file_table.page_size;
    if let Some(file) = core.file_table.files.iter().find(|f| !core.has_load_at(f)) {
        let size = file.end_addr - file.start_addr;
        vmas.push(Vma {
            vbytes: Bytes::<VirtualAddr>::from_raw(file.start_addr, size),
            prot: VmProt::READ,
            backing: Backing::File {
                path: file.file_name.clone(),
                offset: file.page_offset.saturating_mul(page_size),
                size,
            },
            valid: true,
        });
    }
    vmas
}

fn from_load(core: &ElfFile, load: &LoadSegment) -> Vma {
    let prot = VmProt::from_elf(load.flags);
    if load.obytes.size > 0 {
        return Vma {
            vbytes: load.vbytes,
            prot,
            backing: Backing::Embedded(load.obytes),
            valid: true,
        };
    }

    // The kernel didn't write the contents which normally means they can be found in
    // a mapped file.
    let page_size = core.file_table.page_size;
    let mapping = core.file_table.files.iter().find(|f| {
        let fbytes = Bytes::<VirtualAddr>::from_raw(f.start_addr, f.end_addr - f.start_addr);
        fbytes.covers(&load.vbytes)
    });
    match mapping {
        Some(file) => Vma {
            vbytes: load.vbytes,
            prot,
            backing: Backing::File {
                path: file.file_name.clone(),
                offset: file
                    .page_offset
                    .saturating_mul(page_size)
                    .saturating_add(load.vbytes.start.0 - file.start_addr),
                size: file.end_addr - file.start_addr,
            },
            valid: true,
        },
        // Allocated but never touched. Without any protection it's a guard region
        // (like __PAGEZERO) and isn't worth including.
        None => Vma {
            vbytes: load.vbytes,
            prot,
            backing: Backing::ZeroFill,
            valid: !prot.is_empty(),
        },
    }
}

/// Best guess at which mapped file is the process's executable. The first mapped
/// Mach-O executable wins. If there isn't one the file mapped at address zero is used.
pub fn find_main_executable(
    core: &ElfFile,
    vmas: &[Vma],
    resolver: &FileResolver,
) -> Option<String> {
    let mut found: Option<String> = None;
    let mut checked = HashSet::new();
    for file in core.file_table.files.iter().filter(|f| !f.is_device()) {
        // Files are typically mapped in several pieces.
        if !checked.insert(file.file_name.as_str()) {
            continue;
        }
        let executable = resolver
            .read_mach_header(&file.file_name)
            .is_some_and(|h| h.filetype == MH_EXECUTE);
        if !executable {
            continue;
        }
        match &found {
            Some(path) => utils::warn(&format!(
                "Already had main executable ({path}) but found another ({}). Continuing anyways...",
                file.file_name
            )),
            None => {
                utils::note(&format!("Found main executable: {}", file.file_name));
                found = Some(file.file_name.clone());
            }
        }
    }

    if found.is_none() {
        let pagezero = vmas.iter().find(|v| v.vbytes.start.0 == 0)?;
        let path = pagezero.path()?;
        utils::note(&format!("Found main executable (maybe): {path}"));
        found = Some(path.to_string());
    }
    found
}
