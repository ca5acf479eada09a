#![warn(clippy::pedantic)]
//! Elfsec is a standalone command line utility and library that reports
//! the exploit mitigations an `ELF` binary was built with: stack canaries,
//! control-flow integrity, FORTIFY_SOURCE, NX, PIE, RELRO, RPATH/RUNPATH
//! and symbol stripping.
//!
//! Stripped binaries are handled without their section table: the dynamic
//! segment is walked by hand and the dynamic symbol table reconstructed
//! from it. All parsing is bounds checked and honors the byte order and
//! word size of the image.
//!
//! **Structures**
//!
//! The full results for a binary are gathered by
//! [`elfsec::elf::CheckSecResults`](crate::elf::CheckSecResults) from an
//! opened [`ElfImage`](crate::elf::ElfImage), and flattened into the
//! string records of [`report`](crate::report) for output.
//!
//! ```rust
//! use elfsec::elf::{CheckSecResults, ElfImage, LibcSource};
//! use elfsec::report::FileRecord;
//! ```
//!
//! **Traits**
//!
//! Add the `Properties` trait to the imports to call the individual
//! checks on an image directly; every verdict implements `Verdict`.
//!
//! * [`elfsec::elf::Properties`](crate::elf::Properties)
//! * [`elfsec::shared::Verdict`](crate::shared::Verdict)
//!
//! ```rust
//! use elfsec::elf::Properties;
//! use elfsec::shared::Verdict;
//! ```
//!
//! Refer to the generated docs or the `demos/` directory for examples of
//! working with both.
//!

pub mod color;
pub mod elf;
pub mod ldso;
#[macro_use]
pub mod macros;
pub mod output;
pub mod report;
pub mod shared;
