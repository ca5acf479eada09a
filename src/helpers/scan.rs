#[cfg(feature = "color")]
use colored::Colorize;
use ignore::WalkBuilder;
use log::debug;
use rayon::prelude::*;
use sysinfo::{
    get_current_pid, Pid, PidExt, ProcessExt, ProcessRefreshKind,
    RefreshKind, System, SystemExt,
};

use std::fmt;
use std::path::{Path, PathBuf};

use elfsec::elf::{ElfError, LibcSource};
use elfsec::underline;

use crate::binary::{Binary, FortifyReport};
use crate::helpers::parse::{parse, parse_fortify};

/// Why a process could not be analyzed.
#[derive(Debug)]
pub enum ProcessError {
    NotFound(Pid),
    NoExecutable { pid: Pid, name: String },
    Elf(ElfError),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(pid) => write!(f, "No process found with ID {pid}"),
            Self::NoExecutable { pid, name } => write!(
                f,
                "No valid executable found for process {name} with ID {pid}"
            ),
            Self::Elf(err) => write!(f, "{err}"),
        }
    }
}

impl From<ElfError> for ProcessError {
    fn from(err: ElfError) -> Self {
        Self::Elf(err)
    }
}

fn report_failure(path: &Path, err: &ElfError) {
    eprintln!(
        "Cannot parse binary file {}: {}",
        underline!(path.display().to_string()),
        err
    );
}

/// Files below `directory`, top level only unless `recursive`, in walk
/// order.
#[must_use]
pub fn files(directory: &Path, recursive: bool) -> Vec<PathBuf> {
    WalkBuilder::new(directory)
        .standard_filters(false)
        .max_depth(if recursive { None } else { Some(1) })
        .sort_by_file_path(Path::cmp)
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(ignore::DirEntry::into_path)
        .collect()
}

/// Analyze every ELF file in `directory` in parallel, keeping walk order.
/// Non-ELF files are skipped quietly, other failures reported and skipped.
#[must_use]
pub fn directory(
    directory: &Path,
    recursive: bool,
    libc: &LibcSource,
) -> Vec<Binary> {
    files(directory, recursive)
        .par_iter()
        .filter_map(|path| match parse(path, libc) {
            Ok(binary) => Some(binary),
            Err(ElfError::NotElf { path, reason }) => {
                debug!("skipping {}: {}", path.display(), reason);
                None
            }
            Err(err) => {
                report_failure(path, &err);
                None
            }
        })
        .collect()
}

fn system() -> System {
    System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    )
}

fn executable(system: &System, pid: Pid) -> Result<PathBuf, ProcessError> {
    let process = system.process(pid).ok_or(ProcessError::NotFound(pid))?;
    let exe = process.exe();
    if exe.as_os_str().is_empty() {
        return Err(ProcessError::NoExecutable {
            pid,
            name: process.name().to_string(),
        });
    }
    Ok(exe.to_path_buf())
}

/// # Errors
/// The process does not exist, has no readable executable, or that
/// executable cannot be analyzed.
pub fn pid(pid: Pid, libc: &LibcSource) -> Result<Binary, ProcessError> {
    let exe = executable(&system(), pid)?;
    Ok(parse(&exe, libc)?)
}

/// # Errors
/// See [`pid`].
pub fn fortify_pid(
    pid: Pid,
    libc: &LibcSource,
) -> Result<FortifyReport, ProcessError> {
    let exe = executable(&system(), pid)?;
    Ok(parse_fortify(&exe, libc)?)
}

/// Every running process but this one whose executable can be analyzed,
/// in PID order.
#[must_use]
pub fn all_processes(libc: &LibcSource) -> Vec<Binary> {
    let system = system();
    let current = get_current_pid().ok();

    let mut pids: Vec<Pid> = system
        .processes()
        .keys()
        .copied()
        .filter(|pid| Some(*pid) != current)
        .collect();
    pids.sort_by_key(|pid| pid.as_u32());

    let executables: Vec<(Pid, PathBuf)> = pids
        .into_iter()
        .filter_map(|pid| Some((pid, executable(&system, pid).ok()?)))
        .collect();

    executables
        .par_iter()
        .filter_map(|(pid, exe)| match parse(exe, libc) {
            Ok(binary) => Some(binary),
            Err(err) => {
                debug!("skipping process {}: {}", pid, err);
                None
            }
        })
        .collect()
}
