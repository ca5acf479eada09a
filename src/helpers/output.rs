#[cfg(feature = "color")]
use colored_json::to_colored_json_auto;
use serde::Serialize;
use serde_json::{json, to_string_pretty};

use elfsec::color::Color;
use elfsec::elf::fortify::FortifiableCall;
use elfsec::output::{self, Format, RenderError, Settings};
use elfsec::report::{ColorFileRecord, ColorFortifyRecord, FileRecord, FortifyRecord};

use crate::binary::{Binary, FortifyReport};

const COLUMNS: [(&str, usize); 12] = [
    ("RELRO", 24),
    ("Stack Canary", 26),
    ("CFI", 26),
    ("NX", 22),
    ("PIE", 24),
    ("RPATH", 19),
    ("RUNPATH", 21),
    ("Symbols", 24),
    ("FORTIFY", 19),
    ("Fortified", 20),
    ("Fortifiable", 25),
    ("Name", 0),
];

const FUNCTION_COLUMN: usize = 30;

#[cfg(feature = "color")]
fn painted(settings: &Settings) -> bool {
    settings.color
}
#[cfg(not(feature = "color"))]
fn painted(_settings: &Settings) -> bool {
    false
}

/// Pad to `width` visible characters before coloring so escape codes do
/// not shift the columns.
fn cell(text: &str, color: Color, width: usize, paint: bool) -> String {
    let padded = format!("{text:<width$}");
    if paint {
        color.paint(&padded)
    } else {
        padded
    }
}

fn table_header() -> String {
    COLUMNS
        .iter()
        .map(|(title, width)| format!("{title:<width$}"))
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn table_row(record: &ColorFileRecord, paint: bool) -> String {
    let c = &record.checks;
    let cells = [
        (c.relro.as_str(), c.relro_color),
        (c.canary.as_str(), c.canary_color),
        (c.cfi.as_str(), c.cfi_color),
        (c.nx.as_str(), c.nx_color),
        (c.pie.as_str(), c.pie_color),
        (c.rpath.as_str(), c.rpath_color),
        (c.runpath.as_str(), c.runpath_color),
        (c.symbols.as_str(), c.symbols_color),
        (c.fortify_source.as_str(), c.fortify_source_color),
        (c.fortified.as_str(), c.fortified_color),
        (c.fortifiable.as_str(), c.fortifiable_color),
        (record.name.as_str(), Color::Unset),
    ];
    cells
        .iter()
        .zip(COLUMNS.iter())
        .map(|((text, color), (_, width))| cell(text, *color, *width, paint))
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn function_row(call: &FortifiableCall, paint: bool) -> String {
    let color = if call.checked { Color::Green } else { Color::Red };
    let name = cell(&format!(" {}", call.name), color, FUNCTION_COLUMN, paint);
    let libc = if call.checked { call.libc.as_str() } else { "" };
    format!("{name} | {libc}").trim_end().to_string()
}

fn fortify_table(record: &ColorFortifyRecord, calls: &[FortifiableCall], paint: bool) -> Vec<String> {
    let c = &record.checks;
    let value = |text: &str, color: Color| {
        if paint {
            color.paint(text)
        } else {
            text.to_string()
        }
    };
    let mut lines = vec![
        format!(
            "* FORTIFY_SOURCE support available (libc): {}",
            value(&c.libc_support, c.libc_support_color)
        ),
        format!(
            "* Binary compiled with FORTIFY_SOURCE support: {}",
            value(&c.fortify_source, c.fortify_source_color)
        ),
        String::new(),
        "------ EXECUTABLE-FILE ------- | -------- LIBC --------".to_string(),
        "Fortifiable library functions  | Checked function names".to_string(),
        "-------------------------------------------------------".to_string(),
    ];
    lines.extend(calls.iter().map(|call| function_row(call, paint)));
    lines.extend([
        String::new(),
        value("SUMMARY", Color::Green),
        format!(
            "* Number of checked functions in libc                : {}",
            c.num_libc_func
        ),
        format!(
            "* Total number of library functions in the executable: {}",
            c.num_file_func
        ),
        format!(
            "* Number of Fortifiable functions in the executable  : {}",
            c.fortifiable
        ),
        format!(
            "* Number of checked functions in the executable      : {}",
            value(&c.fortified, Color::Green)
        ),
        format!(
            "* Number of unchecked functions in the executable    : {}",
            value(&c.no_fortify, Color::Red)
        ),
    ]);
    lines
}

fn print_rendered(rendered: Result<String, RenderError>) {
    match rendered {
        Ok(text) => println!("{}", text.trim_end()),
        Err(err) => eprintln!("{err}"),
    }
}

fn print_records<T: Serialize>(records: &[T], settings: &Settings) {
    match settings.format {
        Format::Json => {
            println!("{}", &json!(records));
        }
        Format::JsonPretty => {
            #[cfg(feature = "color")]
            if settings.color {
                if let Ok(colored_json) = to_colored_json_auto(&json!(records))
                {
                    println!("{colored_json}");
                }
            } else if let Ok(json_str) = to_string_pretty(&json!(records)) {
                println!("{json_str}");
            }
            #[cfg(not(feature = "color"))]
            if let Ok(json_str) = to_string_pretty(&json!(records)) {
                println!("{json_str}");
            }
        }
        Format::Yaml => print_rendered(output::to_yaml(records)),
        Format::Xml => print_rendered(output::to_xml(records)),
        Format::Table => {}
    }
}

pub fn print_binary_results(binaries: &[Binary], settings: &Settings) {
    match settings.format {
        Format::Json | Format::JsonPretty | Format::Yaml | Format::Xml => {
            let records: Vec<FileRecord> = binaries
                .iter()
                .map(|binary| FileRecord::new(&binary.name(), &binary.results))
                .collect();
            print_records(&records, settings);
        }
        Format::Table => {
            if settings.header {
                println!("{}", table_header());
            }
            let paint = painted(settings);
            for binary in binaries {
                let record =
                    ColorFileRecord::new(&binary.name(), &binary.results);
                println!("{}", table_row(&record, paint));
            }
        }
    }
}

pub fn print_fortify_results(reports: &[FortifyReport], settings: &Settings) {
    match settings.format {
        Format::Json | Format::JsonPretty | Format::Yaml | Format::Xml => {
            let records: Vec<FortifyRecord> = reports
                .iter()
                .map(|report| FortifyRecord::new(&report.name(), &report.fortify))
                .collect();
            print_records(&records, settings);
        }
        Format::Table => {
            let paint = painted(settings);
            for report in reports {
                let record =
                    ColorFortifyRecord::new(&report.name(), &report.fortify);
                for line in
                    fortify_table(&record, &report.fortify.functions, paint)
                {
                    println!("{line}");
                }
            }
        }
    }
}
