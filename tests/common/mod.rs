//! Dynamically linked ELF64 fixtures built on the crate's test ELF writer.
use goblin::elf::dynamic::{
    DF_BIND_NOW, DT_FLAGS, DT_NEEDED, DT_RPATH, DT_RUNPATH, DT_STRSZ,
    DT_STRTAB, DT_SYMENT, DT_SYMTAB,
};
use goblin::elf::header::ET_DYN;
use goblin::elf::program_header::{
    PF_R, PF_W, PF_X, PT_DYNAMIC, PT_GNU_RELRO, PT_GNU_STACK,
};
use goblin::elf::section_header::{SHT_DYNAMIC, SHT_DYNSYM, SHT_STRTAB};

use std::fs;
use std::path::Path;

use elfsec::elf::testutil::{ElfBuilder, Sym};

/// What goes into a synthetic dynamically linked binary.
#[derive(Default)]
pub struct Layout<'a> {
    /// `ET_DYN` when left at 0
    pub e_type: u16,
    pub needed: &'a [&'a str],
    pub imports: &'a [&'a str],
    pub exports: &'a [&'a str],
    pub runpath: Option<&'a str>,
    pub rpath: Option<&'a str>,
    pub bind_now: bool,
    pub relro: bool,
    pub exec_stack: bool,
    /// keep the section table; without it only the dynamic segment remains
    pub sections: bool,
}

fn string_table(strings: &[&str]) -> (Vec<u8>, Vec<u64>) {
    let mut table = vec![0u8];
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(table.len() as u64);
        table.extend_from_slice(s.as_bytes());
        table.push(0);
    }
    (table, offsets)
}

pub fn build(layout: &Layout) -> Vec<u8> {
    let e_type = if layout.e_type == 0 { ET_DYN } else { layout.e_type };
    let mut b = ElfBuilder::new64().with_type(e_type);

    let mut strings: Vec<&str> = Vec::new();
    strings.extend(layout.needed);
    strings.extend(layout.imports);
    strings.extend(layout.exports);
    strings.extend(layout.runpath);
    strings.extend(layout.rpath);
    let (dynstr, offsets) = string_table(&strings);
    let mut offsets = offsets.into_iter();

    let needed: Vec<u64> = offsets.by_ref().take(layout.needed.len()).collect();
    let symbols: Vec<Sym> = offsets
        .by_ref()
        .take(layout.imports.len() + layout.exports.len())
        .enumerate()
        .map(|(idx, name)| {
            let sym = Sym::function(name as u32);
            if idx >= layout.imports.len() {
                sym.defined(9)
            } else {
                sym
            }
        })
        .collect();
    let dynsym = b.symbols(&symbols);
    let dynstr_off = b.blob(&dynstr);

    let mut tags: Vec<(u64, u64)> =
        needed.iter().map(|off| (DT_NEEDED, *off)).collect();
    if layout.runpath.is_some() {
        tags.extend(offsets.next().map(|off| (DT_RUNPATH, off)));
    }
    if layout.rpath.is_some() {
        tags.extend(offsets.next().map(|off| (DT_RPATH, off)));
    }
    tags.extend([
        (DT_STRTAB, dynstr_off),
        (DT_STRSZ, dynstr.len() as u64),
        (DT_SYMTAB, dynsym.0),
        (DT_SYMENT, 24),
    ]);
    if layout.bind_now {
        tags.push((DT_FLAGS, DF_BIND_NOW));
    }
    let dynamic = b.dynamic(&tags);

    b.segment(PT_DYNAMIC, PF_R | PF_W, dynamic);
    let stack_flags = if layout.exec_stack { PF_R | PF_W | PF_X } else { PF_R | PF_W };
    b.segment(PT_GNU_STACK, stack_flags, (0, 0));
    if layout.relro {
        b.segment(PT_GNU_RELRO, PF_R, dynamic);
    }

    if layout.sections {
        let dynstr_index =
            b.section(".dynstr", SHT_STRTAB, dynstr_off, dynstr.len() as u64, 0);
        b.section(".dynsym", SHT_DYNSYM, dynsym.0, dynsym.1, dynstr_index);
        b.section(".dynamic", SHT_DYNAMIC, dynamic.0, dynamic.1, dynstr_index);
    }
    b.build()
}

pub fn write(path: &Path, layout: &Layout) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, build(layout)).unwrap();
}
