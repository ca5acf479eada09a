//! Recover function symbols of stripped binaries from the dynamic segment
use goblin::elf::dynamic::{DT_STRSZ, DT_STRTAB, DT_SYMENT, DT_SYMTAB};
use goblin::elf::sym::STT_FUNC;
use log::debug;
use scroll::Pread;
use thiserror::Error;

use crate::elf::dynamic;
use crate::elf::image::{c_string, Class, ElfImage, Symbol};

#[derive(Debug, Error)]
pub enum SymtabError {
    #[error("empty file")]
    EmptyFile,
    #[error(
        "dynamic symbol table at {symtab:#x} or string table at {strtab:#x} \
         lies outside the file ({file_size} bytes)"
    )]
    OutOfBounds { symtab: u64, strtab: u64, file_size: u64 },
}

struct RawSym {
    name: u32,
    info: u8,
    other: u8,
    shndx: u16,
    value: u64,
}

impl RawSym {
    fn decode(entry: &[u8], class: Class, endian: scroll::Endian) -> Option<Self> {
        Some(match class {
            Class::Elf64 => Self {
                name: entry.pread_with(0, endian).ok()?,
                info: entry.pread_with(4, endian).ok()?,
                other: entry.pread_with(5, endian).ok()?,
                shndx: entry.pread_with(6, endian).ok()?,
                value: entry.pread_with(8, endian).ok()?,
            },
            Class::Elf32 => Self {
                name: entry.pread_with(0, endian).ok()?,
                value: u64::from(entry.pread_with::<u32>(4, endian).ok()?),
                info: entry.pread_with(12, endian).ok()?,
                other: entry.pread_with(13, endian).ok()?,
                shndx: entry.pread_with(14, endian).ok()?,
            },
        })
    }
}

/// Function symbols described by `DT_SYMTAB`/`DT_STRTAB`/`DT_STRSZ`.
///
/// The table extent is the gap up to the string table when that follows
/// the symbol table, otherwise `DT_STRSZ` rounded down to whole entries.
/// Both are clamped to the file. Missing tags yield an empty list.
///
/// # Errors
/// `EmptyFile` for a zero-length image, `OutOfBounds` when either table
/// starts at or past the end of the file.
pub fn reconstruct_functions(image: &ElfImage) -> Result<Vec<Symbol>, SymtabError> {
    let bytes = image.bytes();
    let file_size = bytes.len() as u64;
    if file_size == 0 {
        return Err(SymtabError::EmptyFile);
    }
    let first = |tag| dynamic::scan(image, tag).first().copied();
    let (Some(symtab), Some(strtab), Some(strsz)) =
        (first(DT_SYMTAB), first(DT_STRTAB), first(DT_STRSZ))
    else {
        return Ok(Vec::new());
    };
    let (Some(symtab), Some(strtab)) =
        (image.file_offset(symtab), image.file_offset(strtab))
    else {
        debug!(
            "{}: dynamic symbol or string table address is not mapped",
            image.path().display()
        );
        return Ok(Vec::new());
    };
    if symtab >= file_size || strtab >= file_size {
        return Err(SymtabError::OutOfBounds { symtab, strtab, file_size });
    }

    let native = image.class().sym_size() as u64;
    let entsize = first(DT_SYMENT).filter(|&size| size > 0).unwrap_or(native);
    if entsize < native {
        debug!(
            "{}: DT_SYMENT {} smaller than a symbol record",
            image.path().display(),
            entsize
        );
        return Ok(Vec::new());
    }

    let extent = if strtab > symtab {
        strtab - symtab
    } else {
        strsz / entsize * entsize
    }
    .min(file_size - symtab);
    let strsz = strsz.min(file_size - strtab);

    // both ranges were clamped to the file above
    let symdata = &bytes[symtab as usize..(symtab + extent) as usize];
    let strdata = &bytes[strtab as usize..(strtab + strsz) as usize];

    Ok(symdata
        .chunks_exact(entsize as usize)
        .filter_map(|entry| RawSym::decode(entry, image.class(), image.endian()))
        .filter(|raw| raw.info & 0xf == STT_FUNC)
        .filter_map(|raw| {
            let name = c_string(strdata, raw.name as usize)?;
            Some(Symbol::from_raw(
                name,
                raw.info,
                raw.other,
                usize::from(raw.shndx),
                raw.value,
            ))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::testutil::{ElfBuilder, Sym};
    use goblin::elf::dynamic::DT_NEEDED;
    use goblin::elf::program_header::{PF_R, PF_X, PT_DYNAMIC};
    use proptest::prelude::*;

    fn names(symbols: &[Symbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    fn stripped(mut b: ElfBuilder, entsize: Option<u64>) -> ElfImage {
        let (symtab, _) = b.symbols(&[
            Sym::function(1),
            Sym::object(8),
            Sym::function(15).defined(11),
        ]);
        let strings = b"\0strcpy\0stdout\0__strcpy_chk\0";
        let strtab = b.blob(strings);
        let mut tags = vec![
            (DT_SYMTAB, symtab),
            (DT_STRTAB, strtab),
            (DT_STRSZ, strings.len() as u64),
        ];
        if let Some(size) = entsize {
            tags.push((DT_SYMENT, size));
        }
        let dynamic = b.dynamic(&tags);
        b.segment(PT_DYNAMIC, PF_R, dynamic);
        b.image()
    }

    #[test]
    fn recovers_functions_only() {
        let image = stripped(ElfBuilder::new64(), None);
        let functions = reconstruct_functions(&image).unwrap();
        assert_eq!(names(&functions), ["strcpy", "__strcpy_chk"]);
        assert!(functions[0].is_import());
        assert!(functions[1].is_defined());
    }

    #[test]
    fn recovers_32bit_layout() {
        let image = stripped(ElfBuilder::new32(), Some(16));
        let functions = reconstruct_functions(&image).unwrap();
        assert_eq!(names(&functions), ["strcpy", "__strcpy_chk"]);
    }

    #[test]
    fn undersized_entries_yield_nothing() {
        let image = stripped(ElfBuilder::new64(), Some(8));
        assert!(reconstruct_functions(&image).unwrap().is_empty());
    }

    #[test]
    fn translates_virtual_addresses() {
        let mut b = ElfBuilder::new64();
        let (symtab, size) = b.symbols(&[Sym::function(1)]);
        let strtab = b.blob(b"\0gets\0");
        let base = 0x40_0000;
        let dynamic = b.dynamic(&[
            (DT_SYMTAB, base + symtab),
            (DT_STRTAB, base + strtab),
            (DT_STRSZ, 6),
        ]);
        b.load(PF_R | PF_X, (symtab, strtab + 6 - symtab), base + symtab);
        b.segment(PT_DYNAMIC, PF_R, dynamic);
        let image = b.image();
        assert!(size > 0);
        assert_eq!(names(&reconstruct_functions(&image).unwrap()), ["gets"]);
    }

    #[test]
    fn overflowing_mappings_yield_nothing() {
        let mut b = ElfBuilder::new64();
        let (symtab, _) = b.symbols(&[Sym::function(1)]);
        let strtab = b.blob(b"\0gets\0");
        let dynamic = b.dynamic(&[
            (DT_SYMTAB, symtab),
            (DT_STRTAB, strtab),
            (DT_STRSZ, 6),
        ]);
        b.load(PF_R, (u64::MAX - 4, 0x10000), 0);
        b.segment(PT_DYNAMIC, PF_R, dynamic);
        assert!(reconstruct_functions(&b.image()).unwrap().is_empty());
    }

    #[test]
    fn out_of_bounds_tables_are_errors() {
        let mut b = ElfBuilder::new64();
        let dynamic = b.dynamic(&[
            (DT_SYMTAB, 0xdead_0000),
            (DT_STRTAB, 0xdead_1000),
            (DT_STRSZ, 16),
        ]);
        b.segment(PT_DYNAMIC, PF_R, dynamic);
        let image = b.image();
        assert!(matches!(
            reconstruct_functions(&image),
            Err(SymtabError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn missing_tags_yield_nothing() {
        let mut b = ElfBuilder::new64();
        let dynamic = b.dynamic(&[(DT_NEEDED, 1)]);
        b.segment(PT_DYNAMIC, PF_R, dynamic);
        assert!(reconstruct_functions(&b.image()).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn never_reads_past_the_file(
            symtab in 0u64..4096,
            strtab in 0u64..4096,
            strsz in 0u64..1 << 20,
            entsize in 0u64..64,
        ) {
            let mut b = ElfBuilder::new64();
            b.blob(&[0x41; 512]);
            let dynamic = b.dynamic(&[
                (DT_SYMTAB, symtab),
                (DT_STRTAB, strtab),
                (DT_STRSZ, strsz),
                (DT_SYMENT, entsize),
            ]);
            b.segment(PT_DYNAMIC, PF_R, dynamic);
            let image = b.image();
            let _ = reconstruct_functions(&image);
        }
    }
}
