use std::path::Path;

use elfsec::elf::{fortify, CheckSecResults, ElfError, ElfImage, LibcSource};

use crate::binary::{BinType, Binary, FortifyReport};

pub fn parse(file: &Path, libc: &LibcSource) -> Result<Binary, ElfError> {
    let image = ElfImage::open(file)?;
    let results = CheckSecResults::parse(&image, libc);
    let bin_type = if image.is_64() { BinType::Elf64 } else { BinType::Elf32 };
    Ok(Binary::new(bin_type, image.path().to_path_buf(), results))
}

pub fn parse_fortify(
    file: &Path,
    libc: &LibcSource,
) -> Result<FortifyReport, ElfError> {
    let image = ElfImage::open(file)?;
    let fortify = fortify::analyze(&image, libc);
    Ok(FortifyReport::new(image.path().to_path_buf(), fortify))
}
