//! Implements checksec for ELF binaries
#[cfg(feature = "color")]
use colored::Colorize;
use goblin::elf::dynamic::{
    DF_1_NOW, DF_BIND_NOW, DT_BIND_NOW, DT_FLAGS, DT_FLAGS_1, DT_RPATH,
    DT_RUNPATH,
};
use goblin::elf::header::{ET_DYN, ET_REL};
use goblin::elf::program_header::{PF_X, PT_GNU_RELRO, PT_GNU_STACK};
use log::debug;
use serde::{Deserialize, Serialize};

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use crate::bold;
use crate::color::Color;
use crate::shared::{Check, Verdict};

pub mod cfi;
pub mod dynamic;
pub mod fortify;
pub mod image;
pub mod symtab;
#[doc(hidden)]
pub mod testutil;

pub use cfi::Cfi;
pub use fortify::{Fortify, LibcSource};
pub use image::{ElfError, ElfImage, Symbol};

const STACK_CHK_PREFIX: &str = "__stack_chk_fail";

/// Stack canary
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Canary {
    Found,
    Missing,
}
impl Verdict for Canary {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::Found => "Canary Found".into(),
            Self::Missing => "No Canary Found".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::Found => Color::Green,
            Self::Missing => Color::Red,
        }
    }
}

/// Non-executable stack
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Nx {
    Enabled,
    Disabled,
    NotApplicable,
}
impl Verdict for Nx {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::Enabled => "NX enabled".into(),
            Self::Disabled => "NX disabled".into(),
            Self::NotApplicable => "N/A".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::Enabled => Color::Green,
            Self::Disabled => Color::Red,
            Self::NotApplicable => Color::Italic,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Pie {
    Enabled,
    /// relocatable object
    Rel,
    Disabled,
}
impl Verdict for Pie {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::Enabled => "PIE Enabled".into(),
            Self::Rel => "REL".into(),
            Self::Disabled => "PIE Disabled".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::Enabled => Color::Green,
            Self::Rel => Color::Yellow,
            Self::Disabled => Color::Red,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Relro {
    None,
    Partial,
    Full,
    NotApplicable,
}
impl Verdict for Relro {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::None => "No RELRO".into(),
            Self::Partial => "Partial RELRO".into(),
            Self::Full => "Full RELRO".into(),
            Self::NotApplicable => "N/A".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::None => Color::Red,
            Self::Partial => Color::Yellow,
            Self::Full => Color::Green,
            Self::NotApplicable => Color::Italic,
        }
    }
}

/// `DT_RPATH` presence, with its search path when set
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Rpath {
    None,
    Yes(Vec<String>),
}
impl Verdict for Rpath {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::None => "No RPATH".into(),
            Self::Yes(_) => "RPATH".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::None => Color::Green,
            Self::Yes(_) => Color::Red,
        }
    }
}

/// `DT_RUNPATH` presence, with its search path when set
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Runpath {
    None,
    Yes(Vec<String>),
}
impl Verdict for Runpath {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::None => "No RUNPATH".into(),
            Self::Yes(_) => "RUNPATH".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::None => Color::Green,
            Self::Yes(_) => Color::Red,
        }
    }
}

/// `.symtab` entry count
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Symbols(pub usize);
impl Verdict for Symbols {
    fn output(&self) -> Cow<'static, str> {
        match self.0 {
            0 => "No Symbols".into(),
            n => format!("{n} symbols").into(),
        }
    }
    fn color(&self) -> Color {
        match self.0 {
            0 => Color::Green,
            _ => Color::Red,
        }
    }
}

/// Checksec result struct for ELF32/64 binaries
///
/// **Example**
///
/// ```rust,no_run
/// use elfsec::elf::{CheckSecResults, ElfImage, LibcSource};
///
/// pub fn print_results(path: &str) {
///     if let Ok(image) = ElfImage::open(path) {
///         println!("{:#?}", CheckSecResults::parse(&image, &LibcSource::default()));
///     }
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CheckSecResults {
    /// Stack Canary (*CFLAGS=*`-fstack-protector*`)
    pub canary: Canary,
    /// Control-flow integrity, hardware (CET, PAC/BTI) and Clang
    pub cfi: Cfi,
    /// Fortify source coverage against the linked libc
    pub fortify: Fortify,
    /// No Execute
    pub nx: Nx,
    /// Position Independent Executable (*CFLAGS=*`-pie -fPIE`)
    pub pie: Pie,
    /// Relocation Read-Only
    pub relro: Relro,
    /// Run-time search path (`DT_RPATH`)
    pub rpath: Rpath,
    /// Run-time search path (`DT_RUNPATH`)
    pub runpath: Runpath,
    /// Symbol table entries
    pub symbols: Symbols,
}
impl CheckSecResults {
    #[must_use]
    pub fn parse(image: &ElfImage, libc: &LibcSource) -> Self {
        Self {
            canary: image.has_canary(),
            cfi: image.has_cfi(),
            fortify: image.has_fortify(libc),
            nx: image.has_nx(),
            pie: image.has_pie(),
            relro: image.has_relro(),
            rpath: image.has_rpath(),
            runpath: image.has_runpath(),
            symbols: image.has_symbols(),
        }
    }

    /// Open `path` and run every check on it.
    ///
    /// # Errors
    /// File-level failures from [`ElfImage::open`].
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        libc: &LibcSource,
    ) -> Result<Self, ElfError> {
        let image = ElfImage::open(path)?;
        Ok(Self::parse(&image, libc))
    }

    /// The finished checks in report column order.
    #[must_use]
    pub fn checks(&self) -> [(&'static str, Check); 9] {
        [
            ("RELRO", self.relro.check()),
            ("Canary", self.canary.check()),
            ("CFI", self.cfi.check()),
            ("NX", self.nx.check()),
            ("PIE", self.pie.check()),
            ("RPATH", self.rpath.check()),
            ("RUNPATH", self.runpath.check()),
            ("Symbols", self.symbols.check()),
            ("FORTIFY", self.fortify.check()),
        ]
    }
}

impl fmt::Display for CheckSecResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (label, check)) in self.checks().iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "{} {}", bold!(format!("{label}:")), check)?;
        }
        write!(
            f,
            " {} {} {} {}",
            bold!("Fortified:"),
            self.fortify.fortified,
            bold!("Fortifiable:"),
            self.fortify.fortifiable
        )
    }
}

/// checks for mitigations on an ELF image
///
/// **Example**
///
/// ```rust,no_run
/// use elfsec::elf::{ElfImage, Properties};
/// use elfsec::shared::Verdict;
///
/// pub fn print_canary(path: &str) {
///     if let Ok(image) = ElfImage::open(path) {
///         println!("{}", image.has_canary().check());
///     }
/// }
/// ```
pub trait Properties {
    /// `__stack_chk_fail*` in any symbol source, reconstructed functions
    /// included
    fn has_canary(&self) -> Canary;
    fn has_cfi(&self) -> Cfi;
    fn has_fortify(&self, libc: &LibcSource) -> Fortify;
    /// `PT_GNU_STACK` without `PF_X`
    fn has_nx(&self) -> Nx;
    fn has_pie(&self) -> Pie;
    fn has_relro(&self) -> Relro;
    fn has_rpath(&self) -> Rpath;
    fn has_runpath(&self) -> Runpath;
    fn has_symbols(&self) -> Symbols;
    /// bind-now requested through `DT_BIND_NOW`, `DT_FLAGS` or `DT_FLAGS_1`
    fn has_bind_now(&self) -> bool;
    fn get_dynstr_by_tag(&self, tag: u64) -> Option<String>;
}

fn is_canary_symbol(sym: &Symbol) -> bool {
    sym.name.starts_with(STACK_CHK_PREFIX)
}

impl Properties for ElfImage {
    fn has_canary(&self) -> Canary {
        if self.symbols().iter().any(is_canary_symbol)
            || self.imported_symbols().any(is_canary_symbol)
        {
            return Canary::Found;
        }
        match symtab::reconstruct_functions(self) {
            Ok(functions) if functions.iter().any(is_canary_symbol) => {
                Canary::Found
            }
            Ok(_) => Canary::Missing,
            Err(err) => {
                debug!("{}: {}", self.path().display(), err);
                Canary::Missing
            }
        }
    }
    fn has_cfi(&self) -> Cfi {
        let dynamic = self.dynamic_symbols_or_reconstructed().unwrap_or_else(|err| {
            debug!("{}: {}", self.path().display(), err);
            Cow::Owned(Vec::new())
        });
        Cfi {
            hardware: cfi::hardware_cfi(self),
            clang: cfi::clang_cfi(
                self.symbols().iter().chain(dynamic.iter()),
                &dynamic,
            ),
        }
    }
    fn has_fortify(&self, libc: &LibcSource) -> Fortify {
        fortify::analyze(self, libc)
    }
    fn has_nx(&self) -> Nx {
        let headers = self.program_headers();
        if headers.is_empty() {
            return Nx::NotApplicable;
        }
        if headers
            .iter()
            .any(|ph| ph.p_type == PT_GNU_STACK && ph.p_flags & PF_X == 0)
        {
            Nx::Enabled
        } else {
            Nx::Disabled
        }
    }
    fn has_pie(&self) -> Pie {
        match self.kind() {
            ET_DYN => Pie::Enabled,
            ET_REL => Pie::Rel,
            _ => Pie::Disabled,
        }
    }
    fn has_relro(&self) -> Relro {
        let headers = self.program_headers();
        if headers.is_empty() {
            return Relro::NotApplicable;
        }
        if self.has_bind_now() {
            return Relro::Full;
        }
        if headers.iter().any(|ph| ph.p_type == PT_GNU_RELRO) {
            Relro::Partial
        } else {
            Relro::None
        }
    }
    fn has_rpath(&self) -> Rpath {
        if self.dynamic_value(DT_RPATH).is_empty() {
            return Rpath::None;
        }
        Rpath::Yes(split_search_path(self.get_dynstr_by_tag(DT_RPATH)))
    }
    fn has_runpath(&self) -> Runpath {
        if self.dynamic_value(DT_RUNPATH).is_empty() {
            return Runpath::None;
        }
        Runpath::Yes(split_search_path(self.get_dynstr_by_tag(DT_RUNPATH)))
    }
    fn has_symbols(&self) -> Symbols {
        Symbols(self.symbols().len())
    }
    fn has_bind_now(&self) -> bool {
        self.dynamic_value(DT_BIND_NOW).first() == Some(&0)
            || self
                .dynamic_value(DT_FLAGS)
                .first()
                .map_or(false, |flags| flags & DF_BIND_NOW != 0)
            || self
                .dynamic_value(DT_FLAGS_1)
                .first()
                .map_or(false, |flags| flags & DF_1_NOW != 0)
    }
    fn get_dynstr_by_tag(&self, tag: u64) -> Option<String> {
        self.dynamic_str(tag)
    }
}

fn split_search_path(paths: Option<String>) -> Vec<String> {
    paths
        .map(|paths| paths.split(':').map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::testutil::{ElfBuilder, Sym};
    use goblin::elf::dynamic::{DT_STRSZ, DT_STRTAB, DT_SYMTAB};
    use goblin::elf::header::{ET_EXEC, ET_REL};
    use goblin::elf::program_header::{PF_R, PF_W, PT_DYNAMIC, PT_LOAD};
    use goblin::elf::section_header::{SHT_DYNSYM, SHT_NOTE, SHT_STRTAB, SHT_SYMTAB};

    fn with_dynamic(tags: &[(u64, u64)]) -> ElfImage {
        let mut b = ElfBuilder::new64();
        let dynamic = b.dynamic(tags);
        b.segment(PT_DYNAMIC, PF_R | PF_W, dynamic);
        b.segment(PT_GNU_RELRO, PF_R, (0, 0));
        b.image()
    }

    #[test]
    fn nx_from_gnu_stack() {
        assert_eq!(ElfBuilder::new64().image().has_nx(), Nx::NotApplicable);

        let mut b = ElfBuilder::new64();
        b.segment(PT_GNU_STACK, PF_R | PF_W, (0, 0));
        assert_eq!(b.image().has_nx(), Nx::Enabled);

        let mut b = ElfBuilder::new64();
        b.segment(PT_GNU_STACK, PF_R | PF_W | PF_X, (0, 0));
        assert_eq!(b.image().has_nx(), Nx::Disabled);

        let mut b = ElfBuilder::new64();
        b.segment(PT_LOAD, PF_R, (0, 64));
        let image = b.image();
        assert_eq!(image.has_nx(), Nx::Disabled);
        assert_eq!(image.has_nx().check(), Check::new("NX disabled", Color::Red));
    }

    #[test]
    fn pie_from_object_type() {
        assert_eq!(ElfBuilder::new64().image().has_pie(), Pie::Enabled);
        assert_eq!(ElfBuilder::new64().with_type(ET_EXEC).image().has_pie(), Pie::Disabled);
        let rel = ElfBuilder::new64().with_type(ET_REL).image().has_pie();
        assert_eq!(rel.check(), Check::new("REL", Color::Yellow));
    }

    #[test]
    fn relro_levels() {
        assert_eq!(ElfBuilder::new64().image().has_relro(), Relro::NotApplicable);

        let mut b = ElfBuilder::new64();
        b.segment(PT_LOAD, PF_R, (0, 64));
        assert_eq!(b.image().has_relro(), Relro::None);

        assert_eq!(with_dynamic(&[]).has_relro(), Relro::Partial);
        assert_eq!(with_dynamic(&[(DT_BIND_NOW, 0)]).has_relro(), Relro::Full);
        assert_eq!(with_dynamic(&[(DT_FLAGS, DF_BIND_NOW)]).has_relro(), Relro::Full);
        assert_eq!(with_dynamic(&[(DT_FLAGS_1, DF_1_NOW)]).has_relro(), Relro::Full);
        assert_eq!(with_dynamic(&[(DT_FLAGS, 0x1)]).has_relro(), Relro::Partial);

        // bind-now without PT_GNU_RELRO still counts as full
        let mut b = ElfBuilder::new64();
        let dynamic = b.dynamic(&[(DT_FLAGS_1, DF_1_NOW)]);
        b.segment(PT_DYNAMIC, PF_R | PF_W, dynamic);
        assert_eq!(b.image().has_relro(), Relro::Full);
    }

    #[test]
    fn rpath_and_runpath() {
        let mut b = ElfBuilder::new64();
        let strtab = b.blob(b"\0/opt/a:/opt/b\0");
        let dynamic = b.dynamic(&[(DT_RPATH, 1), (DT_STRTAB, strtab), (DT_STRSZ, 15)]);
        b.segment(PT_DYNAMIC, PF_R | PF_W, dynamic);
        let image = b.image();
        assert_eq!(
            image.has_rpath(),
            Rpath::Yes(vec!["/opt/a".to_string(), "/opt/b".to_string()])
        );
        assert_eq!(image.has_rpath().check(), Check::new("RPATH", Color::Red));
        assert_eq!(image.has_runpath(), Runpath::None);
        assert_eq!(image.has_runpath().check(), Check::new("No RUNPATH", Color::Green));
    }

    #[test]
    fn rpath_behind_overflowing_mapping() {
        let mut b = ElfBuilder::new64();
        let strtab = b.blob(b"\0/opt/a\0");
        let dynamic = b.dynamic(&[(DT_RPATH, 1), (DT_STRTAB, strtab), (DT_STRSZ, 8)]);
        b.segment(PT_DYNAMIC, PF_R | PF_W, dynamic);
        b.load(PF_R, (u64::MAX - 4, 0x10000), 0);
        let image = b.image();
        assert_eq!(image.has_rpath(), Rpath::Yes(Vec::new()));
        assert_eq!(image.has_canary(), Canary::Missing);
    }

    #[test]
    fn canary_from_imports() {
        let mut b = ElfBuilder::new64();
        let strtab = b.blob(b"\0__stack_chk_fail\0");
        let dynsym = b.symbols(&[Sym::function(1)]);
        let str_index = b.section(".dynstr", SHT_STRTAB, strtab, 18, 0);
        b.section(".dynsym", SHT_DYNSYM, dynsym.0, dynsym.1, str_index);
        let image = b.image();
        assert_eq!(image.has_canary(), Canary::Found);
        assert_eq!(ElfBuilder::new64().image().has_canary(), Canary::Missing);
    }

    #[test]
    fn other_cookies_are_not_canaries() {
        let mut b = ElfBuilder::new64();
        let strtab = b.blob(b"\0__intel_security_cookie\0");
        let dynsym = b.symbols(&[Sym::object(1)]);
        let str_index = b.section(".dynstr", SHT_STRTAB, strtab, 25, 0);
        b.section(".dynsym", SHT_DYNSYM, dynsym.0, dynsym.1, str_index);
        let canary = b.image().has_canary();
        assert_eq!(canary, Canary::Missing);
        assert_eq!(canary.check(), Check::new("No Canary Found", Color::Red));
    }

    #[test]
    fn canary_from_reconstructed_functions() {
        let mut b = ElfBuilder::new64();
        let (symtab, _) = b.symbols(&[Sym::function(1)]);
        let strtab = b.blob(b"\0__stack_chk_fail_local\0");
        let dynamic = b.dynamic(&[
            (DT_SYMTAB, symtab),
            (DT_STRTAB, strtab),
            (DT_STRSZ, 24),
        ]);
        b.segment(PT_DYNAMIC, PF_R, dynamic);
        let image = b.image();
        assert!(image.dynamic_symbols().is_none());
        assert_eq!(image.has_canary().check().output, "Canary Found");
    }

    #[test]
    fn truncated_property_note_is_unknown() {
        let mut b = ElfBuilder::new64();
        let note = b.blob(&[0x02, 0x00, 0x00, 0xc0]);
        b.section(".note.gnu.property", SHT_NOTE, note, 4, 0);
        let image = b.image();
        assert_eq!(image.has_cfi().hardware, None);
        assert_eq!(image.has_cfi().check(), Check::new("Unknown", Color::Yellow));
    }

    #[test]
    fn counts_symbols() {
        assert_eq!(ElfBuilder::new64().image().has_symbols().check().output, "No Symbols");

        let mut b = ElfBuilder::new64();
        let strtab = b.blob(b"\0a\0b\0");
        let symtab = b.symbols(&[Sym::object(1).local(), Sym::object(3).local()]);
        let str_index = b.section(".strtab", SHT_STRTAB, strtab, 5, 0);
        b.section(".symtab", SHT_SYMTAB, symtab.0, symtab.1, str_index);
        let symbols = b.image().has_symbols();
        assert_eq!(symbols.check(), Check::new("2 symbols", Color::Red));
    }

    #[test]
    fn static_binary_results() {
        let mut b = ElfBuilder::new64().with_type(ET_EXEC);
        b.segment(PT_LOAD, PF_R | PF_X, (0, 64));
        b.segment(PT_GNU_STACK, PF_R | PF_W, (0, 0));
        let image = b.image();
        let results = CheckSecResults::parse(&image, &LibcSource::default());
        assert_eq!(results.fortify, Fortify::not_applicable());
        assert_eq!(results.nx, Nx::Enabled);
        assert_eq!(results.pie, Pie::Disabled);
        assert_eq!(results.relro, Relro::None);
        assert_eq!(results.cfi.check(), Check::new("Unknown", Color::Yellow));
        let labels: Vec<&str> = results.checks().iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            ["RELRO", "Canary", "CFI", "NX", "PIE", "RPATH", "RUNPATH", "Symbols", "FORTIFY"]
        );
    }
}
