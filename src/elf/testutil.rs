//! Minimal in-memory ELF writer shared by the unit and integration tests.
use goblin::elf::dynamic::DT_NULL;
use goblin::elf::header::{EM_X86_64, ET_DYN};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::section_header::SHT_STRTAB;
use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STT_FUNC, STT_OBJECT};
use scroll::Endian;

/// One symbol table record, encoded for whatever class the builder uses.
#[derive(Clone, Copy, Debug)]
pub struct Sym {
    name: u32,
    bind: u8,
    kind: u8,
    other: u8,
    shndx: u16,
    value: u64,
}
impl Sym {
    /// Undefined global function whose name sits at `name` in the strtab.
    pub fn function(name: u32) -> Self {
        Self { name, bind: STB_GLOBAL, kind: STT_FUNC, other: 0, shndx: 0, value: 0 }
    }
    pub fn object(name: u32) -> Self {
        Self { kind: STT_OBJECT, ..Self::function(name) }
    }
    pub fn defined(self, shndx: u16) -> Self {
        Self { shndx, value: 0x1000, ..self }
    }
    pub fn global(self) -> Self {
        Self { bind: STB_GLOBAL, ..self }
    }
    pub fn local(self) -> Self {
        Self { bind: STB_LOCAL, ..self }
    }
}

struct Segment {
    p_type: u32,
    flags: u32,
    offset: u64,
    size: u64,
    vaddr: u64,
}

struct PendingSection {
    name: String,
    sh_type: u32,
    offset: u64,
    size: u64,
    link: u32,
}

pub struct ElfBuilder {
    is_64: bool,
    endian: Endian,
    e_type: u16,
    machine: u16,
    data: Vec<u8>,
    segments: Vec<Segment>,
    sections: Vec<PendingSection>,
}

impl ElfBuilder {
    pub fn new64() -> Self {
        Self::new(true)
    }
    pub fn new32() -> Self {
        Self::new(false)
    }
    fn new(is_64: bool) -> Self {
        let header_size = if is_64 { 64 } else { 52 };
        Self {
            is_64,
            endian: Endian::Little,
            e_type: ET_DYN,
            machine: EM_X86_64,
            data: vec![0; header_size],
            segments: Vec::new(),
            sections: Vec::new(),
        }
    }
    pub fn big_endian(mut self) -> Self {
        self.endian = Endian::Big;
        self
    }
    pub fn with_type(mut self, e_type: u16) -> Self {
        self.e_type = e_type;
        self
    }
    pub fn with_machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Append raw bytes at the next 8-byte boundary, returning their offset.
    pub fn blob(&mut self, bytes: &[u8]) -> u64 {
        self.align();
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Append a symbol table (null entry first), returning `(offset, size)`.
    pub fn symbols(&mut self, symbols: &[Sym]) -> (u64, u64) {
        let mut table = self.encode_sym(&Sym {
            name: 0,
            bind: STB_LOCAL,
            kind: 0,
            other: 0,
            shndx: 0,
            value: 0,
        });
        for sym in symbols {
            table.extend(self.encode_sym(sym));
        }
        let size = table.len() as u64;
        (self.blob(&table), size)
    }

    /// Append a dynamic table terminated by `DT_NULL`, returning
    /// `(offset, size)`.
    pub fn dynamic(&mut self, entries: &[(u64, u64)]) -> (u64, u64) {
        let mut table = Vec::new();
        for &(tag, value) in entries.iter().chain(&[(DT_NULL, 0)]) {
            self.put_word(&mut table, tag);
            self.put_word(&mut table, value);
        }
        let size = table.len() as u64;
        (self.blob(&table), size)
    }

    /// Append a `.note.gnu.property` payload made of `(type, datasz, data)`
    /// property entries, each padded to 8 bytes.
    pub fn properties(&mut self, entries: &[(u32, u32, &[u8])]) -> (u64, u64) {
        let mut payload = Vec::new();
        for &(pr_type, datasz, data) in entries {
            self.put_u32(&mut payload, pr_type);
            self.put_u32(&mut payload, datasz);
            payload.extend_from_slice(data);
            while payload.len() % 8 != 0 {
                payload.push(0);
            }
        }
        let size = payload.len() as u64;
        (self.blob(&payload), size)
    }

    /// Identity-mapped segment over `(offset, size)`.
    pub fn segment(&mut self, p_type: u32, flags: u32, (offset, size): (u64, u64)) {
        self.segments.push(Segment { p_type, flags, offset, size, vaddr: offset });
    }
    /// `PT_LOAD` mapping `(offset, size)` at `vaddr`.
    pub fn load(&mut self, flags: u32, (offset, size): (u64, u64), vaddr: u64) {
        self.segments.push(Segment { p_type: PT_LOAD, flags, offset, size, vaddr });
    }

    /// Register a section, returning its index in the section header table.
    pub fn section(
        &mut self,
        name: &str,
        sh_type: u32,
        offset: u64,
        size: u64,
        link: u32,
    ) -> u32 {
        self.sections.push(PendingSection {
            name: name.to_string(),
            sh_type,
            offset,
            size,
            link,
        });
        self.sections.len() as u32
    }

    pub fn build(mut self) -> Vec<u8> {
        let (mut phoff, mut shoff, mut shnum, mut shstrndx) = (0, 0, 0, 0);

        if !self.segments.is_empty() {
            let mut table = Vec::new();
            for seg in &self.segments {
                self.encode_phdr(&mut table, seg);
            }
            phoff = self.blob(&table);
        }

        if !self.sections.is_empty() {
            let mut names = vec![0u8];
            let mut name_offsets = Vec::new();
            for section in &self.sections {
                name_offsets.push(names.len() as u32);
                names.extend_from_slice(section.name.as_bytes());
                names.push(0);
            }
            let shstrtab_name = names.len() as u32;
            names.extend_from_slice(b".shstrtab\0");
            let names_offset = self.blob(&names);

            let mut table = Vec::new();
            self.encode_shdr(&mut table, 0, 0, 0, 0, 0);
            for (section, name) in self.sections.iter().zip(&name_offsets) {
                self.encode_shdr(
                    &mut table,
                    *name,
                    section.sh_type,
                    section.offset,
                    section.size,
                    section.link,
                );
            }
            self.encode_shdr(
                &mut table,
                shstrtab_name,
                SHT_STRTAB,
                names_offset,
                names.len() as u64,
                0,
            );
            shnum = self.sections.len() as u16 + 2;
            shstrndx = shnum - 1;
            shoff = self.blob(&table);
        }

        let header = self.encode_header(phoff, shoff, shnum, shstrndx);
        self.data[..header.len()].copy_from_slice(&header);
        self.data
    }

    #[cfg(test)]
    pub fn image(self) -> crate::elf::ElfImage {
        crate::elf::ElfImage::parse("test.elf".into(), self.build()).unwrap()
    }

    fn align(&mut self) {
        while self.data.len() % 8 != 0 {
            self.data.push(0);
        }
    }

    fn encode_header(&self, phoff: u64, shoff: u64, shnum: u16, shstrndx: u16) -> Vec<u8> {
        let mut out = vec![0x7f, b'E', b'L', b'F'];
        out.push(if self.is_64 { 2 } else { 1 });
        out.push(if self.endian.is_little() { 1 } else { 2 });
        out.push(1);
        out.resize(16, 0);
        self.put_u16(&mut out, self.e_type);
        self.put_u16(&mut out, self.machine);
        self.put_u32(&mut out, 1);
        self.put_word(&mut out, 0);
        self.put_word(&mut out, phoff);
        self.put_word(&mut out, shoff);
        self.put_u32(&mut out, 0);
        let (ehsize, phentsize, shentsize) =
            if self.is_64 { (64, 56, 64) } else { (52, 32, 40) };
        self.put_u16(&mut out, ehsize);
        self.put_u16(&mut out, phentsize);
        self.put_u16(&mut out, self.segments.len() as u16);
        self.put_u16(&mut out, shentsize);
        self.put_u16(&mut out, shnum);
        self.put_u16(&mut out, shstrndx);
        out
    }

    fn encode_phdr(&self, out: &mut Vec<u8>, seg: &Segment) {
        self.put_u32(out, seg.p_type);
        if self.is_64 {
            self.put_u32(out, seg.flags);
        }
        self.put_word(out, seg.offset);
        self.put_word(out, seg.vaddr);
        self.put_word(out, seg.vaddr);
        self.put_word(out, seg.size);
        self.put_word(out, seg.size);
        if !self.is_64 {
            self.put_u32(out, seg.flags);
        }
        self.put_word(out, 8);
    }

    fn encode_shdr(
        &self,
        out: &mut Vec<u8>,
        name: u32,
        sh_type: u32,
        offset: u64,
        size: u64,
        link: u32,
    ) {
        self.put_u32(out, name);
        self.put_u32(out, sh_type);
        self.put_word(out, 0);
        self.put_word(out, offset);
        self.put_word(out, offset);
        self.put_word(out, size);
        self.put_u32(out, link);
        self.put_u32(out, 0);
        self.put_word(out, 1);
        self.put_word(out, 0);
    }

    /// Encode a single `Elf{32,64}_Sym`.
    pub fn encode_sym(&self, sym: &Sym) -> Vec<u8> {
        let mut out = Vec::new();
        let info = (sym.bind << 4) | sym.kind;
        self.put_u32(&mut out, sym.name);
        if self.is_64 {
            out.push(info);
            out.push(sym.other);
            self.put_u16(&mut out, sym.shndx);
            self.put_word(&mut out, sym.value);
            self.put_word(&mut out, 0);
        } else {
            self.put_word(&mut out, sym.value);
            self.put_word(&mut out, 0);
            out.push(info);
            out.push(sym.other);
            self.put_u16(&mut out, sym.shndx);
        }
        out
    }

    fn put_u16(&self, out: &mut Vec<u8>, value: u16) {
        if self.endian.is_little() {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    fn put_u32(&self, out: &mut Vec<u8>, value: u32) {
        if self.endian.is_little() {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    fn put_word(&self, out: &mut Vec<u8>, value: u64) {
        match (self.is_64, self.endian.is_little()) {
            (true, true) => out.extend_from_slice(&value.to_le_bytes()),
            (true, false) => out.extend_from_slice(&value.to_be_bytes()),
            (false, true) => out.extend_from_slice(&(value as u32).to_le_bytes()),
            (false, false) => out.extend_from_slice(&(value as u32).to_be_bytes()),
        }
    }
}
