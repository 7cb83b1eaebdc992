//! Tables printed by --list after a conversion.
use super::tables::{SimpleTableBuilder, TableBuilder, add_field, add_simple};
use crate::convert::{Conversion, Summary};
use crate::macho::Arch;
use crate::utils::Styling;
use std::io::Write;

pub fn list_header(mut out: impl Write, conversion: &Conversion, summary: &Summary, explain: bool) {
    let mut b = SimpleTableBuilder::new();
    let header = &summary.layout.header;

    add_simple!(b, "core", conversion.core.path.display(), "path to the ELF core");
    add_simple!(
        b,
        "main executable",
        conversion.main_executable.as_deref().unwrap_or("?"),
        "the Mach-O executable the header flags were copied from"
    );
    add_simple!(b, "commands", header.ncmds, "number of load commands");
    add_simple!(
        b,
        "commands size",
        "{:x}",
        header.sizeofcmds,
        "size of all the load commands in bytes (hex)"
    );
    add_simple!(b, "flags", "{:x}", header.flags, "Mach-O header flags");
    add_simple!(
        b,
        "contents",
        "{:x}",
        summary.layout.contents_offset,
        "offset of the first segment's contents"
    );
    add_simple!(
        b,
        "written",
        "{:x}",
        summary.contents.bytes,
        "number of segment content bytes written (hex)"
    );
    add_simple!(
        b,
        "zero filled",
        summary.contents.degraded,
        "segments whose backing file couldn't be read and were written as zeros"
    );
    add_simple!(
        b,
        "devices",
        summary.contents.devices,
        "device mappings, these are always written as zeros"
    );

    b.writeln(&mut out, explain);
}

pub fn list_vmas(mut out: impl Write, conversion: &Conversion, summary: &Summary, explain: bool) {
    let mut builder = TableBuilder::new();
    builder.add_col_l("address", "the virtual address of the first byte in the region");
    builder.add_col_r("memory size", "size of the region in memory (hex)");
    builder.add_col_r("offset", "where the contents start in the Mach-O core (hex)");
    builder.add_col_r("file size", "bytes of contents in the Mach-O core (hex)");
    builder.add_col_l("prot", "readable, writeable, and/or executable");
    builder.add_col_l(
        "backing",
        "where the contents came from: core, file, device, or zeros",
    );
    builder.add_col_l("path", "the file mapped into the region");

    for (i, vma) in conversion.vmas.iter().enumerate() {
        let offset = match summary.layout.find_segment(i) {
            Some(segment) => format!("{:x}", segment.command.fileoff),
            None => "-".to_string(),
        };
        let backing = if vma.valid {
            vma.describe_backing()
        } else {
            "skipped"
        };

        add_field!(builder, "address", "{:x}", vma.vbytes.start.0);
        add_field!(builder, "memory size", "{:x}", vma.vbytes.size);
        add_field!(builder, "offset", offset);
        add_field!(builder, "file size", "{:x}", vma.file_size());
        add_field!(builder, "prot", vma.prot.describe());
        add_field!(builder, "backing", backing);
        add_field!(builder, "path", vma.path().unwrap_or(""));
    }

    builder.writeln(&mut out, explain);
}

pub fn list_threads(mut out: impl Write, conversion: &Conversion, arch: &dyn Arch, explain: bool) {
    let mut builder = TableBuilder::new();
    builder.add_col_r("pid", "id of the thread");
    builder.add_col_r("ip", "the instruction pointer when the core was taken");
    builder.add_col_l("signal", "the signal the thread received");

    for status in conversion.core.threads.iter() {
        add_field!(builder, "pid", status.pid);
        add_field!(builder, "ip", "{:x}", arch.ip(status));
        add_field!(builder, "signal", status.signal());
    }

    builder.writeln(&mut out, explain);
}
