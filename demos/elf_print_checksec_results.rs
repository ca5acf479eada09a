extern crate elfsec;

use elfsec::elf::{CheckSecResults, LibcSource};
use std::env;

fn main() {
    let argv: Vec<String> = env::args().collect();
    if argv.len() == 2 {
        match CheckSecResults::from_path(&argv[1], &LibcSource::default()) {
            Ok(results) => println!("{results:#?}"),
            Err(err) => eprintln!("{err}"),
        }
    } else {
        eprintln!("Usage: elf_print_checksec_results <binary>");
    }
}
