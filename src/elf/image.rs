//! Owned view of one ELF file: header facts, program headers, optional
//! section table and symbol tables, plus the raw bytes they came from.
use goblin::container::{Container, Ctx};
use goblin::elf::dynamic::{Dynamic, DT_NEEDED, DT_STRSZ, DT_STRTAB};
use goblin::elf::header::Header;
use goblin::elf::program_header::{ProgramHeader, PT_DYNAMIC, PT_LOAD};
use goblin::elf::section_header::{
    SectionHeader, SHN_UNDEF, SHT_DYNSYM, SHT_NOBITS, SHT_SYMTAB,
};
use goblin::elf::sym::{
    Symtab, STB_GLOBAL, STB_LOCAL, STB_WEAK, STT_FUNC, STT_OBJECT,
    STV_DEFAULT, STV_HIDDEN, STV_INTERNAL,
};
use goblin::elf::Elf;
use goblin::strtab::Strtab;
use log::debug;
use scroll::Endian;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use std::{fs, io, thread};

use crate::elf::dynamic::{self, DynamicEntry};
use crate::elf::symtab::{self, SymtabError};

/// Upper bound on the time spent reading a single file.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// File-level failures. Anything below this level degrades the affected
/// check instead of surfacing here.
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Not an ELF file: {}: {reason}", .path.display())]
    NotElf { path: PathBuf, reason: String },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "Timed out after {}s reading {}",
        .timeout.as_secs(),
        .path.display()
    )]
    Timeout { path: PathBuf, timeout: Duration },
    #[error("Path {} escapes root {}", .path.display(), .root.display())]
    PathTraversal { path: PathBuf, root: PathBuf },
}

impl ElfError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io { path: path.to_path_buf(), source }
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Class {
    Elf32,
    Elf64,
}
impl Class {
    /// Size of one `Elf{32,64}_Sym` record.
    #[must_use]
    pub fn sym_size(self) -> usize {
        match self {
            Self::Elf32 => 16,
            Self::Elf64 => 24,
        }
    }
    /// Size of one `Elf{32,64}_Dyn` record.
    #[must_use]
    pub fn dyn_size(self) -> usize {
        match self {
            Self::Elf32 => 8,
            Self::Elf64 => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Binding {
    Local,
    Global,
    Weak,
    Other(u8),
}
impl From<u8> for Binding {
    fn from(bind: u8) -> Self {
        match bind {
            STB_LOCAL => Self::Local,
            STB_GLOBAL => Self::Global,
            STB_WEAK => Self::Weak,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolType {
    Function,
    Object,
    Other(u8),
}
impl From<u8> for SymbolType {
    fn from(kind: u8) -> Self {
        match kind {
            STT_FUNC => Self::Function,
            STT_OBJECT => Self::Object,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    Default,
    Internal,
    Hidden,
    Protected,
}
impl From<u8> for Visibility {
    fn from(other: u8) -> Self {
        match other & 0x3 {
            STV_DEFAULT => Self::Default,
            STV_INTERNAL => Self::Internal,
            STV_HIDDEN => Self::Hidden,
            _ => Self::Protected,
        }
    }
}

/// A named symbol, either read from a symbol table section or recovered
/// from the dynamic segment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub binding: Binding,
    pub kind: SymbolType,
    pub visibility: Visibility,
    /// owning section index, `None` when undefined
    pub section: Option<usize>,
    pub value: u64,
}
impl Symbol {
    #[must_use]
    pub fn from_raw(
        name: String,
        info: u8,
        other: u8,
        shndx: usize,
        value: u64,
    ) -> Self {
        Self {
            name,
            binding: Binding::from(info >> 4),
            kind: SymbolType::from(info & 0xf),
            visibility: Visibility::from(other),
            section: if shndx == SHN_UNDEF as usize { None } else { Some(shndx) },
            value,
        }
    }
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.section.is_some()
    }
    #[must_use]
    pub fn is_function(&self) -> bool {
        self.kind == SymbolType::Function
    }
    /// Undefined global or weak reference resolved by the dynamic linker.
    #[must_use]
    pub fn is_import(&self) -> bool {
        !self.is_defined()
            && matches!(self.binding, Binding::Global | Binding::Weak)
    }
    /// Defined, global or weak, default visibility.
    #[must_use]
    pub fn is_export(&self) -> bool {
        self.is_defined()
            && matches!(self.binding, Binding::Global | Binding::Weak)
            && self.visibility == Visibility::Default
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Section {
    pub name: String,
    pub sh_type: u32,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub entsize: u64,
}

pub struct ElfImage {
    path: PathBuf,
    bytes: Vec<u8>,
    class: Class,
    endian: Endian,
    machine: u16,
    kind: u16,
    program_headers: Vec<ProgramHeader>,
    sections: Option<Vec<Section>>,
    dynamic: Option<Vec<DynamicEntry>>,
    symbols: Vec<Symbol>,
    dynamic_symbols: Option<Vec<Symbol>>,
}

impl ElfImage {
    /// Open and parse `path`, reading for at most [`OPEN_TIMEOUT`].
    ///
    /// # Errors
    /// `NotFound`, `Io`/`Timeout` on read failure, `NotElf` when the ELF
    /// identification or header is invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElfError> {
        Self::open_with_timeout(path, OPEN_TIMEOUT)
    }

    /// # Errors
    /// See [`ElfImage::open`].
    pub fn open_with_timeout<P: AsRef<Path>>(
        path: P,
        timeout: Duration,
    ) -> Result<Self, ElfError> {
        let path = clean_path(path.as_ref());
        fs::metadata(&path).map_err(|err| ElfError::from_io(&path, err))?;
        let bytes = read_bounded(&path, timeout)?;
        Self::parse(path, bytes)
    }

    /// Open `path` as seen from inside `root` (an offline filesystem image),
    /// refusing anything that resolves outside of it.
    ///
    /// # Errors
    /// `PathTraversal` when `path` escapes `root`, otherwise as
    /// [`ElfImage::open`].
    pub fn open_confined(root: &Path, path: &Path) -> Result<Self, ElfError> {
        Self::open(confine(root, path)?)
    }

    /// Parse an in-memory image. Only the ELF header is mandatory; every
    /// other table degrades to empty/absent when it is malformed.
    ///
    /// # Errors
    /// `NotElf` when the identification bytes or header are invalid.
    pub fn parse(path: PathBuf, bytes: Vec<u8>) -> Result<Self, ElfError> {
        let not_elf = |reason: String| ElfError::NotElf {
            path: path.clone(),
            reason,
        };
        let header =
            Elf::parse_header(&bytes).map_err(|e| not_elf(e.to_string()))?;
        let container =
            header.container().map_err(|e| not_elf(e.to_string()))?;
        let endian =
            header.endianness().map_err(|e| not_elf(e.to_string()))?;
        let ctx = Ctx::new(container, endian);
        let class = match container {
            Container::Big => Class::Elf64,
            Container::Little => Class::Elf32,
        };

        let program_headers = parse_program_headers(&bytes, &header, ctx);
        let sections = parse_sections(&bytes, &header, ctx);
        let dynamic = match Dynamic::parse(&bytes, &program_headers, ctx) {
            Ok(dynamic) => dynamic.map(|dynamic| {
                dynamic
                    .dyns
                    .iter()
                    .map(|d| DynamicEntry { tag: d.d_tag, value: d.d_val })
                    .collect()
            }),
            Err(err) => {
                debug!("{}: unreadable dynamic table: {}", path.display(), err);
                None
            }
        };
        let (symbols, dynamic_symbols) = match &sections {
            Some(sections) => (
                parse_symbols(&bytes, sections, SHT_SYMTAB, class, ctx)
                    .unwrap_or_default(),
                parse_symbols(&bytes, sections, SHT_DYNSYM, class, ctx),
            ),
            None => (Vec::new(), None),
        };

        Ok(Self {
            path,
            bytes,
            class,
            endian,
            machine: header.e_machine,
            kind: header.e_type,
            program_headers,
            sections,
            dynamic,
            symbols,
            dynamic_symbols,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
    #[must_use]
    pub fn class(&self) -> Class {
        self.class
    }
    #[must_use]
    pub fn is_64(&self) -> bool {
        self.class == Class::Elf64
    }
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }
    #[must_use]
    pub fn machine(&self) -> u16 {
        self.machine
    }
    /// `e_type`
    #[must_use]
    pub fn kind(&self) -> u16 {
        self.kind
    }
    #[must_use]
    pub fn program_headers(&self) -> &[ProgramHeader] {
        &self.program_headers
    }
    /// `None` when the section header table is absent or unreadable.
    #[must_use]
    pub fn sections(&self) -> Option<&[Section]> {
        self.sections.as_deref()
    }
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections()?.iter().find(|s| s.name == name)
    }
    /// File contents of section `name`, `None` for `SHT_NOBITS` or when
    /// the section lies outside the file.
    #[must_use]
    pub fn section_data(&self, name: &str) -> Option<&[u8]> {
        let section = self.section(name)?;
        if section.sh_type == SHT_NOBITS {
            return None;
        }
        self.slice(section.offset, section.size)
    }
    /// File contents of a segment, `None` when it does not fit in the file.
    #[must_use]
    pub fn segment_data(&self, header: &ProgramHeader) -> Option<&[u8]> {
        self.slice(header.p_offset, header.p_filesz)
    }
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.program_headers.iter().any(|ph| ph.p_type == PT_DYNAMIC)
    }
    /// `.symtab` entries, without the leading null symbol.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
    /// `.dynsym` entries; `None` when there is no such section.
    #[must_use]
    pub fn dynamic_symbols(&self) -> Option<&[Symbol]> {
        self.dynamic_symbols.as_deref()
    }
    pub fn imported_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.dynamic_symbols
            .iter()
            .flatten()
            .filter(|sym| sym.is_import())
    }
    /// `.dynsym` when present, otherwise the function symbols recovered
    /// from the dynamic segment.
    ///
    /// # Errors
    /// Propagates reconstruction failures; an image with neither source
    /// yields an empty list.
    pub fn dynamic_symbols_or_reconstructed(
        &self,
    ) -> Result<Cow<'_, [Symbol]>, SymtabError> {
        match &self.dynamic_symbols {
            Some(symbols) => Ok(Cow::Borrowed(symbols)),
            None => symtab::reconstruct_functions(self).map(Cow::Owned),
        }
    }
    /// Entries of the parsed dynamic table, `None` when it could not be
    /// parsed.
    #[must_use]
    pub fn dynamic_entries(&self) -> Option<&[DynamicEntry]> {
        self.dynamic.as_deref()
    }
    /// Values recorded for `tag`: the parsed dynamic table first, the raw
    /// `PT_DYNAMIC` walk when that yields nothing.
    #[must_use]
    pub fn dynamic_value(&self, tag: u64) -> Vec<u64> {
        let values: Vec<u64> = self
            .dynamic
            .iter()
            .flatten()
            .filter(|entry| entry.tag == tag)
            .map(|entry| entry.value)
            .collect();
        if values.is_empty() {
            dynamic::scan(self, tag)
        } else {
            values
        }
    }
    /// String at `offset` in the dynamic string table.
    #[must_use]
    pub fn dynamic_string(&self, offset: u64) -> Option<String> {
        let strtab = self.file_offset(*self.dynamic_value(DT_STRTAB).first()?)?;
        let strsz = *self.dynamic_value(DT_STRSZ).first()?;
        if offset >= strsz {
            return None;
        }
        let table = self.slice(strtab, strsz).or_else(|| {
            let available = (self.bytes.len() as u64).checked_sub(strtab)?;
            self.slice(strtab, available)
        })?;
        c_string(table, usize::try_from(offset).ok()?)
    }
    /// String value of the first `tag` entry (`DT_RPATH`, `DT_RUNPATH`, ...).
    #[must_use]
    pub fn dynamic_str(&self, tag: u64) -> Option<String> {
        self.dynamic_value(tag)
            .first()
            .and_then(|offset| self.dynamic_string(*offset))
    }
    /// `DT_NEEDED` names in declaration order.
    #[must_use]
    pub fn needed_libraries(&self) -> Vec<String> {
        let entries = match &self.dynamic {
            Some(entries) if !entries.is_empty() => Cow::Borrowed(entries),
            _ => Cow::Owned(dynamic::raw_entries(self)),
        };
        entries
            .iter()
            .filter(|entry| entry.tag == DT_NEEDED)
            .filter_map(|entry| self.dynamic_string(entry.value))
            .collect()
    }
    /// Translate a virtual address through the `PT_LOAD` mappings; values
    /// no segment covers are taken as file offsets already. `None` when the
    /// covering segment maps past the end of the address space.
    #[must_use]
    pub fn file_offset(&self, addr: u64) -> Option<u64> {
        match self.program_headers.iter().find(|ph| {
            ph.p_type == PT_LOAD
                && addr >= ph.p_vaddr
                && addr - ph.p_vaddr < ph.p_filesz
        }) {
            Some(ph) => ph.p_offset.checked_add(addr - ph.p_vaddr),
            None => Some(addr),
        }
    }

    fn slice(&self, offset: u64, size: u64) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        self.bytes.get(start..end)
    }
}

/// NUL-terminated string starting at `index`; `None` when `index` is
/// outside `table`.
pub(crate) fn c_string(table: &[u8], index: usize) -> Option<String> {
    if index >= table.len() {
        return None;
    }
    let tail = &table[index..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

fn read_bounded(path: &Path, timeout: Duration) -> Result<Vec<u8>, ElfError> {
    let (tx, rx) = mpsc::channel();
    let worker_path = path.to_path_buf();
    thread::Builder::new()
        .name("elf-read".to_string())
        .spawn(move || {
            // the receiver is gone once the caller timed out
            let _ = tx.send(fs::read(worker_path));
        })
        .map_err(|source| ElfError::Io { path: path.to_path_buf(), source })?;
    match rx.recv_timeout(timeout) {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(err)) => Err(ElfError::from_io(path, err)),
        Err(RecvTimeoutError::Timeout) => {
            Err(ElfError::Timeout { path: path.to_path_buf(), timeout })
        }
        Err(RecvTimeoutError::Disconnected) => Err(ElfError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::Other,
                "reader thread exited without a result",
            ),
        }),
    }
}

fn parse_program_headers(
    bytes: &[u8],
    header: &Header,
    ctx: Ctx,
) -> Vec<ProgramHeader> {
    if header.e_phnum == 0 {
        return Vec::new();
    }
    let Ok(offset) = usize::try_from(header.e_phoff) else {
        return Vec::new();
    };
    ProgramHeader::parse(bytes, offset, usize::from(header.e_phnum), ctx)
        .unwrap_or_else(|err| {
            debug!("unreadable program header table: {}", err);
            Vec::new()
        })
}

fn parse_sections(
    bytes: &[u8],
    header: &Header,
    ctx: Ctx,
) -> Option<Vec<Section>> {
    if header.e_shnum == 0 || header.e_shoff == 0 {
        return None;
    }
    let offset = usize::try_from(header.e_shoff).ok()?;
    let headers =
        SectionHeader::parse(bytes, offset, usize::from(header.e_shnum), ctx)
            .map_err(|err| debug!("unreadable section header table: {}", err))
            .ok()?;
    let names = headers.get(usize::from(header.e_shstrndx)).and_then(|sh| {
        Strtab::parse(bytes, sh.sh_offset as usize, sh.sh_size as usize, 0x0)
            .ok()
    });
    Some(
        headers
            .iter()
            .map(|sh| Section {
                name: names
                    .as_ref()
                    .and_then(|names| names.get_at(sh.sh_name))
                    .unwrap_or_default()
                    .to_string(),
                sh_type: sh.sh_type,
                offset: sh.sh_offset,
                size: sh.sh_size,
                link: sh.sh_link,
                entsize: sh.sh_entsize,
            })
            .collect(),
    )
}

fn parse_symbols(
    bytes: &[u8],
    sections: &[Section],
    sh_type: u32,
    class: Class,
    ctx: Ctx,
) -> Option<Vec<Symbol>> {
    let table = sections.iter().find(|s| s.sh_type == sh_type)?;
    let strings = sections.get(table.link as usize)?;
    let strtab = Strtab::parse(
        bytes,
        usize::try_from(strings.offset).ok()?,
        usize::try_from(strings.size).ok()?,
        0x0,
    )
    .map_err(|err| debug!("unreadable symbol string table: {}", err))
    .ok()?;
    let count = usize::try_from(table.size).ok()? / class.sym_size();
    let symtab =
        Symtab::parse(bytes, usize::try_from(table.offset).ok()?, count, ctx)
            .map_err(|err| debug!("unreadable symbol table: {}", err))
            .ok()?;
    Some(
        symtab
            .iter()
            .skip(1)
            .map(|sym| {
                Symbol::from_raw(
                    strtab.get_at(sym.st_name).unwrap_or_default().to_string(),
                    sym.st_info,
                    sym.st_other,
                    sym.st_shndx,
                    sym.st_value,
                )
            })
            .collect(),
    )
}

/// Lexically normalize `path`: drop `.`, fold `..` into its parent, never
/// climb above the root of an absolute path.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                cleaned.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            Component::Normal(part) => cleaned.push(part),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Resolve `path` inside `root`. Absolute paths are taken relative to
/// `root` unless they already point into it.
///
/// # Errors
/// `PathTraversal` when the cleaned result leaves `root`.
pub fn confine(root: &Path, path: &Path) -> Result<PathBuf, ElfError> {
    let root = clean_path(root);
    let direct = clean_path(path);
    if path.is_absolute() && direct.starts_with(&root) {
        return Ok(direct);
    }
    let relative = path.strip_prefix("/").unwrap_or(path);
    let joined = clean_path(&root.join(relative));
    if joined.starts_with(&root) {
        Ok(joined)
    } else {
        Err(ElfError::PathTraversal { path: path.to_path_buf(), root })
    }
}
