#[cfg(feature = "color")]
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use elfsec::elf::{CheckSecResults, Fortify};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BinType {
    Elf32,
    Elf64,
}
#[cfg(not(feature = "color"))]
impl fmt::Display for BinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Elf32 => write!(f, "ELF32"),
            Self::Elf64 => write!(f, "ELF64"),
        }
    }
}
#[cfg(feature = "color")]
impl fmt::Display for BinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Elf32 => write!(f, "{}", "ELF32".bold().underline()),
            Self::Elf64 => write!(f, "{}", "ELF64".bold().underline()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Binary {
    pub binarytype: BinType,
    pub file: PathBuf,
    pub results: CheckSecResults,
}
#[cfg(not(feature = "color"))]
impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: | {} | File: {}",
            self.binarytype,
            self.results,
            self.file.display()
        )
    }
}
#[cfg(feature = "color")]
impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: | {} | {} {}",
            self.binarytype,
            self.results,
            "File:".bold().underline(),
            self.file.display().to_string().bright_blue()
        )
    }
}
impl Binary {
    pub fn new(
        binarytype: BinType,
        file: PathBuf,
        results: CheckSecResults,
    ) -> Self {
        Self { binarytype, file, results }
    }

    pub fn name(&self) -> String {
        self.file.display().to_string()
    }
}

/// Fortify-only view of one binary.
#[derive(Debug, Deserialize, Serialize)]
pub struct FortifyReport {
    pub file: PathBuf,
    pub fortify: Fortify,
}
impl FortifyReport {
    pub fn new(file: PathBuf, fortify: Fortify) -> Self {
        Self { file, fortify }
    }

    pub fn name(&self) -> String {
        self.file.display().to_string()
    }
}
