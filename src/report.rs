//! Flat string records handed to formatters, with and without colors.
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::elf::{CheckSecResults, Fortify};
use crate::shared::Verdict;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileChecks {
    pub relro: String,
    pub canary: String,
    pub cfi: String,
    pub nx: String,
    pub pie: String,
    pub rpath: String,
    pub runpath: String,
    pub symbols: String,
    pub fortify_source: String,
    pub fortified: String,
    pub fortifiable: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileRecord {
    pub name: String,
    pub checks: FileChecks,
}

impl FileRecord {
    #[must_use]
    pub fn new(name: &str, results: &CheckSecResults) -> Self {
        Self {
            name: name.to_string(),
            checks: FileChecks {
                relro: results.relro.output().into_owned(),
                canary: results.canary.output().into_owned(),
                cfi: results.cfi.output().into_owned(),
                nx: results.nx.output().into_owned(),
                pie: results.pie.output().into_owned(),
                rpath: results.rpath.output().into_owned(),
                runpath: results.runpath.output().into_owned(),
                symbols: results.symbols.output().into_owned(),
                fortify_source: results.fortify.output().into_owned(),
                fortified: results.fortify.fortified.to_string(),
                fortifiable: results.fortify.fortifiable.to_string(),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ColorFileChecks {
    pub relro: String,
    #[serde(rename = "relroColor")]
    pub relro_color: Color,
    pub canary: String,
    #[serde(rename = "canaryColor")]
    pub canary_color: Color,
    pub cfi: String,
    #[serde(rename = "cfiColor")]
    pub cfi_color: Color,
    pub nx: String,
    #[serde(rename = "nxColor")]
    pub nx_color: Color,
    pub pie: String,
    #[serde(rename = "pieColor")]
    pub pie_color: Color,
    pub rpath: String,
    #[serde(rename = "rpathColor")]
    pub rpath_color: Color,
    pub runpath: String,
    #[serde(rename = "runpathColor")]
    pub runpath_color: Color,
    pub symbols: String,
    #[serde(rename = "symbolsColor")]
    pub symbols_color: Color,
    pub fortify_source: String,
    #[serde(rename = "fortify_sourceColor")]
    pub fortify_source_color: Color,
    pub fortified: String,
    #[serde(rename = "fortifiedColor")]
    pub fortified_color: Color,
    pub fortifiable: String,
    #[serde(rename = "fortifiableColor")]
    pub fortifiable_color: Color,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ColorFileRecord {
    pub name: String,
    pub checks: ColorFileChecks,
}

impl ColorFileRecord {
    #[must_use]
    pub fn new(name: &str, results: &CheckSecResults) -> Self {
        let plain = FileRecord::new(name, results).checks;
        Self {
            name: name.to_string(),
            checks: ColorFileChecks {
                relro: plain.relro,
                relro_color: results.relro.color(),
                canary: plain.canary,
                canary_color: results.canary.color(),
                cfi: plain.cfi,
                cfi_color: results.cfi.color(),
                nx: plain.nx,
                nx_color: results.nx.color(),
                pie: plain.pie,
                pie_color: results.pie.color(),
                rpath: plain.rpath,
                rpath_color: results.rpath.color(),
                runpath: plain.runpath,
                runpath_color: results.runpath.color(),
                symbols: plain.symbols,
                symbols_color: results.symbols.color(),
                fortify_source: plain.fortify_source,
                fortify_source_color: results.fortify.color(),
                fortified: plain.fortified,
                fortified_color: Color::Unset,
                fortifiable: plain.fortifiable,
                fortifiable_color: Color::Unset,
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FortifyChecks {
    pub fortify_source: String,
    pub fortified: String,
    pub fortifiable: String,
    #[serde(rename = "noFortify")]
    pub no_fortify: String,
    #[serde(rename = "libcSupport")]
    pub libc_support: String,
    #[serde(rename = "numLibcFunc")]
    pub num_libc_func: String,
    #[serde(rename = "numFileFunc")]
    pub num_file_func: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FortifyRecord {
    pub name: String,
    pub checks: FortifyChecks,
}

impl FortifyRecord {
    #[must_use]
    pub fn new(name: &str, fortify: &Fortify) -> Self {
        Self {
            name: name.to_string(),
            checks: FortifyChecks {
                fortify_source: fortify.output().into_owned(),
                fortified: fortify.fortified.to_string(),
                fortifiable: fortify.fortifiable.to_string(),
                no_fortify: fortify.unfortified().to_string(),
                libc_support: fortify.libc_support.output().into_owned(),
                num_libc_func: fortify.libc_functions.to_string(),
                num_file_func: fortify.file_functions.to_string(),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ColorFortifyChecks {
    pub fortify_source: String,
    #[serde(rename = "fortify_sourceColor")]
    pub fortify_source_color: Color,
    pub fortified: String,
    #[serde(rename = "fortifiedColor")]
    pub fortified_color: Color,
    pub fortifiable: String,
    #[serde(rename = "fortifiableColor")]
    pub fortifiable_color: Color,
    #[serde(rename = "noFortify")]
    pub no_fortify: String,
    #[serde(rename = "libcSupport")]
    pub libc_support: String,
    #[serde(rename = "libcSupportColor")]
    pub libc_support_color: Color,
    #[serde(rename = "numLibcFunc")]
    pub num_libc_func: String,
    #[serde(rename = "numFileFunc")]
    pub num_file_func: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ColorFortifyRecord {
    pub name: String,
    pub checks: ColorFortifyChecks,
}

impl ColorFortifyRecord {
    #[must_use]
    pub fn new(name: &str, fortify: &Fortify) -> Self {
        let plain = FortifyRecord::new(name, fortify).checks;
        Self {
            name: name.to_string(),
            checks: ColorFortifyChecks {
                fortify_source: plain.fortify_source,
                fortify_source_color: fortify.color(),
                fortified: plain.fortified,
                fortified_color: Color::Unset,
                fortifiable: plain.fortifiable,
                fortifiable_color: Color::Unset,
                no_fortify: plain.no_fortify,
                libc_support: plain.libc_support,
                libc_support_color: fortify.libc_support.color(),
                num_libc_func: plain.num_libc_func,
                num_file_func: plain.num_file_func,
            },
        }
    }
}
