use clap::{Parser, Subcommand};
#[cfg(feature = "color")]
use colored::Colorize;
use sysinfo::{Pid, PidExt};

use std::path::{Path, PathBuf};
use std::process;

mod binary;
mod helpers;

use elfsec::elf::{ElfError, LibcSource};
use elfsec::output::{Format, Settings};
use elfsec::underline;
use helpers::output::{print_binary_results, print_fortify_results};
use helpers::parse::{parse, parse_fortify};
use helpers::scan;

/// Report the exploit mitigations ELF binaries were built with.
#[derive(Parser, Debug)]
#[command(name = "elfsec", version, about, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    output: Format,

    /// Use this C library for the FORTIFY checks instead of resolving it
    #[arg(short, long, value_name = "PATH", global = true)]
    libc: Option<PathBuf>,

    /// Root of an offline filesystem image; library lookups stay inside it
    #[arg(long, value_name = "DIR", global = true)]
    sysroot: Option<PathBuf>,

    /// Disables color output
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Do not print the table header
    #[arg(long = "no-header", global = true)]
    no_header: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a single binary
    File { file: PathBuf },
    /// Check every binary in a directory
    Dir {
        directory: PathBuf,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Check the executable of a running process
    Proc { pid: u32 },
    /// Check every running process
    #[command(visible_alias = "procAll")]
    ProcAll,
    /// FORTIFY_SOURCE report for a single binary
    #[command(visible_alias = "fortifyFile")]
    FortifyFile { file: PathBuf },
    /// FORTIFY_SOURCE report for a running process
    #[command(visible_alias = "fortifyProc")]
    FortifyProc { pid: u32 },
}

fn fail(file: &Path, err: &ElfError) -> ! {
    eprintln!(
        "Cannot parse binary file {}: {}",
        underline!(file.display().to_string()),
        err
    );
    process::exit(1);
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .init();

    let cli = Cli::parse();
    let settings = Settings::set(!cli.no_color, cli.output, !cli.no_header);
    let libc = LibcSource::new(cli.libc, cli.sysroot);

    match cli.command {
        Command::File { file } => match parse(&file, &libc) {
            Ok(binary) => print_binary_results(&[binary], &settings),
            Err(err) => fail(&file, &err),
        },
        Command::Dir { directory, recursive } => {
            if !directory.is_dir() {
                eprintln!(
                    "Directory {} not found",
                    underline!(directory.display().to_string())
                );
                process::exit(1);
            }
            let binaries = scan::directory(&directory, recursive, &libc);
            if binaries.is_empty() {
                eprintln!(
                    "No ELF binaries found in {}",
                    underline!(directory.display().to_string())
                );
                process::exit(1);
            }
            print_binary_results(&binaries, &settings);
        }
        Command::Proc { pid } => {
            match scan::pid(Pid::from_u32(pid), &libc) {
                Ok(binary) => print_binary_results(&[binary], &settings),
                Err(err) => {
                    eprintln!("{err}");
                    process::exit(1);
                }
            }
        }
        Command::ProcAll => {
            print_binary_results(&scan::all_processes(&libc), &settings);
        }
        Command::FortifyFile { file } => match parse_fortify(&file, &libc) {
            Ok(report) => print_fortify_results(&[report], &settings),
            Err(err) => fail(&file, &err),
        },
        Command::FortifyProc { pid } => {
            match scan::fortify_pid(Pid::from_u32(pid), &libc) {
                Ok(report) => print_fortify_results(&[report], &settings),
                Err(err) => {
                    eprintln!("{err}");
                    process::exit(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "elfsec", "dir", "/usr/bin", "-r", "-o", "json-pretty",
            "--no-header",
        ])
        .unwrap();
        assert_eq!(cli.output, Format::JsonPretty);
        assert!(cli.no_header);
        assert!(matches!(
            cli.command,
            Command::Dir { recursive: true, .. }
        ));
    }

    #[test]
    fn yaml_and_xml_formats() {
        let cli = Cli::try_parse_from(["elfsec", "file", "/bin/ls", "-o", "yaml"]).unwrap();
        assert_eq!(cli.output, Format::Yaml);
        let cli = Cli::try_parse_from(["elfsec", "-o", "xml", "fortify-file", "/bin/ls"]).unwrap();
        assert_eq!(cli.output, Format::Xml);
    }

    #[test]
    fn camel_case_aliases() {
        let cli = Cli::try_parse_from(["elfsec", "fortifyProc", "1"]).unwrap();
        assert!(matches!(cli.command, Command::FortifyProc { pid: 1 }));
        let cli = Cli::try_parse_from(["elfsec", "procAll"]).unwrap();
        assert!(matches!(cli.command, Command::ProcAll));
    }
}
