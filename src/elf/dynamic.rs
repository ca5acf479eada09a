//! Raw walk over `PT_DYNAMIC` segments, independent of the section table
use goblin::elf::program_header::PT_DYNAMIC;
use log::debug;
use scroll::{Endian, Pread};

use crate::elf::image::{Class, ElfImage};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DynamicEntry {
    pub tag: u64,
    pub value: u64,
}

/// Decode the complete entries of one dynamic segment. A trailing partial
/// entry is ignored.
pub fn entries(
    data: &[u8],
    class: Class,
    endian: Endian,
) -> impl Iterator<Item = DynamicEntry> + '_ {
    data.chunks_exact(class.dyn_size())
        .filter_map(move |chunk| match class {
            Class::Elf64 => Some(DynamicEntry {
                tag: chunk.pread_with::<u64>(0, endian).ok()?,
                value: chunk.pread_with::<u64>(8, endian).ok()?,
            }),
            Class::Elf32 => Some(DynamicEntry {
                tag: u64::from(chunk.pread_with::<u32>(0, endian).ok()?),
                value: u64::from(chunk.pread_with::<u32>(4, endian).ok()?),
            }),
        })
}

fn segments(image: &ElfImage) -> impl Iterator<Item = &[u8]> {
    image
        .program_headers()
        .iter()
        .filter(|ph| ph.p_type == PT_DYNAMIC)
        .filter_map(move |ph| {
            let data = image.segment_data(ph);
            if data.is_none() {
                debug!(
                    "{}: PT_DYNAMIC at {:#x}+{:#x} exceeds file size",
                    image.path().display(),
                    ph.p_offset,
                    ph.p_filesz
                );
            }
            data
        })
}

/// Value of the first `tag` entry found in any `PT_DYNAMIC` segment;
/// empty when there is none.
#[must_use]
pub fn scan(image: &ElfImage, tag: u64) -> Vec<u64> {
    segments(image)
        .find_map(|data| {
            entries(data, image.class(), image.endian())
                .find(|entry| entry.tag == tag)
        })
        .map(|entry| vec![entry.value])
        .unwrap_or_default()
}

/// Every entry of every `PT_DYNAMIC` segment in file order.
#[must_use]
pub fn raw_entries(image: &ElfImage) -> Vec<DynamicEntry> {
    segments(image)
        .flat_map(|data| entries(data, image.class(), image.endian()))
        .collect()
}
