extern crate elfsec;

use elfsec::elf::{ElfImage, Properties};
use elfsec::shared::Verdict;
use std::env;
use std::ffi::OsString;

fn main() {
    let argv: Vec<OsString> = env::args_os().collect();
    match argv.len() {
        2 => match ElfImage::open(&argv[1]) {
            Ok(image) => println!("Canary: {}", image.has_canary().check()),
            Err(err) => eprintln!("{err}"),
        },
        _ => println!("Usage: elf_has_canary <binary>"),
    }
}
