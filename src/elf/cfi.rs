//! Control-flow integrity: GNU property notes (x86 CET, AArch64 PAC/BTI)
//! and Clang CFI runtime symbols.
use goblin::elf::header::{EM_AARCH64, EM_X86_64};
use log::debug;
use scroll::{Endian, Pread};
use serde::{Deserialize, Serialize};

use std::borrow::Cow;

use crate::color::Color;
use crate::elf::image::{Class, ElfImage, Symbol};
use crate::shared::Verdict;

pub const GNU_PROPERTY_AARCH64_FEATURE_1_AND: u32 = 0xc000_0000;
pub const GNU_PROPERTY_X86_FEATURE_1_AND: u32 = 0xc000_0002;

pub const GNU_PROPERTY_X86_FEATURE_1_IBT: u32 = 1 << 0;
pub const GNU_PROPERTY_X86_FEATURE_1_SHSTK: u32 = 1 << 1;

pub const GNU_PROPERTY_AARCH64_FEATURE_1_BTI: u32 = 1 << 0;
pub const GNU_PROPERTY_AARCH64_FEATURE_1_PAC: u32 = 1 << 1;

const CLANG_CFI_HELPERS: [&str; 5] = [
    "__cfi_check",
    "__cfi_slowpath",
    "__cfi_slowpath_diag",
    "__cfi_fail",
    "__cfi_check_fail",
];

/// One property from `.note.gnu.property` carrying a 4-byte payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GnuPropertyNote {
    pub pr_type: u32,
    pub bitmask: u32,
}

/// Walk `(pr_type, pr_datasz)` headers. Entries whose payload is not 4
/// bytes are stepped over header-first; a 4-byte payload is followed by
/// 4 bytes of padding.
#[must_use]
pub fn parse_property_notes(data: &[u8], endian: Endian) -> Vec<GnuPropertyNote> {
    let mut notes = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (Ok(pr_type), Ok(datasz)) = (
            data.pread_with::<u32>(offset, endian),
            data.pread_with::<u32>(offset + 4, endian),
        ) else {
            break;
        };
        offset += 8;
        if datasz != 4 {
            continue;
        }
        let Ok(bitmask) = data.pread_with::<u32>(offset, endian) else {
            break;
        };
        notes.push(GnuPropertyNote { pr_type, bitmask });
        offset += 8;
    }
    notes
}

/// x86 Control-flow Enforcement Technology
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct X86Cet {
    pub shstk: bool,
    pub ibt: bool,
}
impl X86Cet {
    #[must_use]
    pub fn from_bitmask(bitmask: u32) -> Self {
        Self {
            shstk: bitmask & GNU_PROPERTY_X86_FEATURE_1_SHSTK != 0,
            ibt: bitmask & GNU_PROPERTY_X86_FEATURE_1_IBT != 0,
        }
    }
}

/// AArch64 pointer authentication and branch target identification
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArmPacBti {
    pub pac: bool,
    pub bti: bool,
}
impl ArmPacBti {
    #[must_use]
    pub fn from_bitmask(bitmask: u32) -> Self {
        Self {
            pac: bitmask & GNU_PROPERTY_AARCH64_FEATURE_1_PAC != 0,
            bti: bitmask & GNU_PROPERTY_AARCH64_FEATURE_1_BTI != 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum HardwareCfi {
    X86(X86Cet),
    Aarch64(ArmPacBti),
}
impl HardwareCfi {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::X86(X86Cet { shstk: true, ibt: true }) => "SHSTK & IBT",
            Self::X86(X86Cet { shstk: true, ibt: false }) => "SHSTK & NO IBT",
            Self::X86(X86Cet { shstk: false, ibt: true }) => "NO SHSTK & IBT",
            Self::X86(X86Cet { shstk: false, ibt: false }) => {
                "NO SHSTK & NO IBT"
            }
            Self::Aarch64(ArmPacBti { pac: true, bti: true }) => "PAC & BTI",
            Self::Aarch64(ArmPacBti { pac: true, bti: false }) => "PAC & NO BTI",
            Self::Aarch64(ArmPacBti { pac: false, bti: true }) => "NO PAC & BTI",
            Self::Aarch64(ArmPacBti { pac: false, bti: false }) => {
                "NO PAC & NO BTI"
            }
        }
    }
    #[must_use]
    pub fn color(&self) -> Color {
        let (a, b) = match *self {
            Self::X86(cet) => (cet.shstk, cet.ibt),
            Self::Aarch64(arm) => (arm.pac, arm.bti),
        };
        match (a, b) {
            (true, true) => Color::Green,
            (false, false) => Color::Red,
            _ => Color::Yellow,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ClangCfi {
    None,
    /// CFI checks confined to one module
    SingleModule,
    /// cross-DSO CFI, `__cfi_check` exported
    MultiModule,
}
impl ClangCfi {
    fn label(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::SingleModule => Some("Clang CFI: Single-Module"),
            Self::MultiModule => Some("Clang CFI: Multi-Module"),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Cfi {
    pub hardware: Option<HardwareCfi>,
    pub clang: ClangCfi,
}
impl Verdict for Cfi {
    fn output(&self) -> Cow<'static, str> {
        match (&self.hardware, self.clang.label()) {
            (None, None) => Cow::Borrowed("Unknown"),
            (None, Some(clang)) => Cow::Borrowed(clang),
            (Some(hw), None) => Cow::Borrowed(hw.label()),
            (Some(hw), Some(clang)) => {
                Cow::Owned(format!("{} | {}", hw.label(), clang))
            }
        }
    }
    fn color(&self) -> Color {
        match (&self.hardware, self.clang) {
            (None, ClangCfi::None) => Color::Yellow,
            (None, _) => Color::Green,
            (Some(hw), _) => hw.color(),
        }
    }
}

/// Hardware CFI advertised by `.note.gnu.property` on 64-bit x86 and
/// AArch64. The last matching property wins; properties present but none
/// matching count as no features.
#[must_use]
pub fn hardware_cfi(image: &ElfImage) -> Option<HardwareCfi> {
    if image.class() != Class::Elf64 {
        return None;
    }
    let feature = match image.machine() {
        EM_X86_64 => GNU_PROPERTY_X86_FEATURE_1_AND,
        EM_AARCH64 => GNU_PROPERTY_AARCH64_FEATURE_1_AND,
        _ => return None,
    };
    let data = image.section_data(".note.gnu.property")?;
    let notes = parse_property_notes(data, image.endian());
    if notes.is_empty() {
        debug!(
            "{}: .note.gnu.property holds no complete property",
            image.path().display()
        );
        return None;
    }
    let bitmask = notes
        .iter()
        .rev()
        .find(|note| note.pr_type == feature)
        .map_or(0, |note| note.bitmask);
    Some(match image.machine() {
        EM_X86_64 => HardwareCfi::X86(X86Cet::from_bitmask(bitmask)),
        _ => HardwareCfi::Aarch64(ArmPacBti::from_bitmask(bitmask)),
    })
}

/// Classify Clang CFI from the runtime symbols it leaves behind.
#[must_use]
pub fn clang_cfi<'a, A>(all: A, dynamic: &[Symbol]) -> ClangCfi
where
    A: IntoIterator<Item = &'a Symbol>,
{
    if dynamic
        .iter()
        .any(|sym| sym.name == "__cfi_check" && sym.is_export())
    {
        return ClangCfi::MultiModule;
    }
    if all.into_iter().any(|sym| {
        sym.is_defined() && CLANG_CFI_HELPERS.contains(&sym.name.as_str())
    }) {
        ClangCfi::SingleModule
    } else {
        ClangCfi::None
    }
}
