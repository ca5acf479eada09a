mod common;

use std::fs;
use std::path::PathBuf;

use common::Layout;
use goblin::elf::header::ET_EXEC;
use elfsec::color::Color;
use elfsec::elf::{
    Canary, CheckSecResults, ElfError, LibcSource, Nx, Pie, Relro, Rpath,
    Runpath, Symbols,
};
use elfsec::report::{ColorFileRecord, FileRecord, FortifyRecord};
use elfsec::shared::Verdict;

const LIBC_EXPORTS: &[&str] = &["__strcpy_chk", "__memcpy_chk", "__printf_chk", "puts"];
const IMPORTS: &[&str] = &["__stack_chk_fail", "__strcpy_chk", "memcpy", "puts"];

fn libc(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("lib").join("libc.so.6");
    common::write(
        &path,
        &Layout { exports: LIBC_EXPORTS, sections: true, ..Layout::default() },
    );
    path
}

fn hardened() -> Layout<'static> {
    Layout {
        needed: &["libc.so.6"],
        imports: IMPORTS,
        bind_now: true,
        relro: true,
        sections: true,
        ..Layout::default()
    }
}

#[test]
fn hardened_binary() {
    let dir = tempfile::tempdir().unwrap();
    let libc = libc(dir.path());
    let target = dir.path().join("app");
    common::write(&target, &hardened());

    let results =
        CheckSecResults::from_path(&target, &LibcSource::new(Some(libc), None))
            .unwrap();
    assert_eq!(results.canary, Canary::Found);
    assert_eq!(results.nx, Nx::Enabled);
    assert_eq!(results.pie, Pie::Enabled);
    assert_eq!(results.relro, Relro::Full);
    assert_eq!(results.rpath, Rpath::None);
    assert_eq!(results.runpath, Runpath::None);
    assert_eq!(results.symbols, Symbols(0));
    assert_eq!(results.cfi.check().output, "Unknown");
    assert_eq!(results.cfi.color(), Color::Yellow);

    let fortify = &results.fortify;
    assert_eq!(fortify.fortified, 1);
    assert_eq!(fortify.fortifiable, 2);
    assert_eq!(fortify.libc_functions, 3);
    assert_eq!(fortify.file_functions, 4);

    let record = FileRecord::new("app", &results);
    assert_eq!(record.checks.relro, "Full RELRO");
    assert_eq!(record.checks.canary, "Canary Found");
    assert_eq!(record.checks.nx, "NX enabled");
    assert_eq!(record.checks.pie, "PIE Enabled");
    assert_eq!(record.checks.fortify_source, "Yes");
    assert_eq!(record.checks.fortified, "1");
    assert_eq!(record.checks.fortifiable, "2");

    let colored = ColorFileRecord::new("app", &results);
    assert_eq!(colored.checks.relro_color, Color::Green);
    assert_eq!(colored.checks.canary_color, Color::Green);
    assert_eq!(colored.checks.rpath_color, Color::Green);
    assert_eq!(colored.checks.fortify_source_color, Color::Green);

    let fortify = FortifyRecord::new("app", fortify);
    assert_eq!(fortify.checks.libc_support, "Yes");
    assert_eq!(fortify.checks.no_fortify, "1");
    assert_eq!(fortify.checks.num_libc_func, "3");
    assert_eq!(fortify.checks.num_file_func, "4");
}

#[test]
fn stripped_legacy_binary() {
    let dir = tempfile::tempdir().unwrap();
    let libc = libc(dir.path());
    let target = dir.path().join("legacy");
    common::write(
        &target,
        &Layout {
            e_type: ET_EXEC,
            needed: &["libc.so.6"],
            imports: &["__stack_chk_fail", "strcpy"],
            rpath: Some("/opt/lib:/usr/local/lib"),
            exec_stack: true,
            ..Layout::default()
        },
    );

    let results =
        CheckSecResults::from_path(&target, &LibcSource::new(Some(libc), None))
            .unwrap();
    assert_eq!(results.canary, Canary::Found);
    assert_eq!(results.nx, Nx::Disabled);
    assert_eq!(results.pie, Pie::Disabled);
    assert_eq!(results.relro, Relro::None);
    assert_eq!(
        results.rpath,
        Rpath::Yes(vec!["/opt/lib".to_string(), "/usr/local/lib".to_string()])
    );
    assert_eq!(results.rpath.color(), Color::Red);
    assert_eq!(results.fortify.fortified, 0);
    assert_eq!(results.fortify.fortifiable, 1);
    assert_eq!(results.fortify.check().output, "No");
    assert_eq!(results.fortify.color(), Color::Red);
}

#[test]
fn libc_found_through_origin_runpath() {
    let dir = tempfile::tempdir().unwrap();
    libc(dir.path());
    let target = dir.path().join("bin").join("app");
    common::write(
        &target,
        &Layout { runpath: Some("$ORIGIN/../lib"), ..hardened() },
    );

    let results =
        CheckSecResults::from_path(&target, &LibcSource::default()).unwrap();
    assert_eq!(results.fortify.libc_functions, 3);
    assert_eq!(results.fortify.fortified, 1);
    assert_eq!(results.runpath, Runpath::Yes(vec!["$ORIGIN/../lib".to_string()]));
}

#[test]
fn unresolvable_libc_is_not_applicable() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("app");
    common::write(&target, &hardened());
    let sysroot = tempfile::tempdir().unwrap();

    let results = CheckSecResults::from_path(
        &target,
        &LibcSource::new(None, Some(sysroot.path().to_path_buf())),
    )
    .unwrap();
    assert_eq!(results.fortify.check().output, "N/A");
    assert_eq!(results.fortify.fortified, 0);
    assert_eq!(results.fortify.fortifiable, 0);
    assert_eq!(results.fortify.libc_support.check().output, "N/A");
}

#[test]
fn libc_override_is_confined_to_the_sysroot() {
    let sysroot = tempfile::tempdir().unwrap();
    libc(sysroot.path());
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("app");
    common::write(&target, &hardened());

    let inside = LibcSource::new(
        Some(PathBuf::from("/lib/libc.so.6")),
        Some(sysroot.path().to_path_buf()),
    );
    let results = CheckSecResults::from_path(&target, &inside).unwrap();
    assert_eq!(results.fortify.libc_functions, 3);

    let escaping = LibcSource::new(
        Some(PathBuf::from("../../../lib/libc.so.6")),
        Some(sysroot.path().to_path_buf()),
    );
    let results = CheckSecResults::from_path(&target, &escaping).unwrap();
    assert_eq!(results.fortify.check().output, "N/A");
}

#[test]
fn file_level_errors() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("run.sh");
    fs::write(&script, b"#!/bin/sh\nexit 0\n").unwrap();

    let libc = LibcSource::default();
    assert!(matches!(
        CheckSecResults::from_path(&script, &libc),
        Err(ElfError::NotElf { .. })
    ));
    assert!(matches!(
        CheckSecResults::from_path(dir.path().join("missing"), &libc),
        Err(ElfError::NotFound(_))
    ));
}
