//! FORTIFY_SOURCE coverage: which of the binary's imports have a `_chk`
//! variant exported by the C library it links against.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::color::Color;
use crate::elf::image::{clean_path, confine, ElfImage};
use crate::ldso::LdSoLookup;
use crate::shared::Verdict;

/// `_chk` entry points the compiler can substitute for their plain
/// counterparts.
pub const FORTIFIABLE_FUNCTIONS: [&str; 18] = [
    "__fprintf_chk",
    "__memcpy_chk",
    "__memmove_chk",
    "__mempcpy_chk",
    "__memset_chk",
    "__printf_chk",
    "__snprintf_chk",
    "__sprintf_chk",
    "__stpcpy_chk",
    "__stpncpy_chk",
    "__strcat_chk",
    "__strcpy_chk",
    "__strncat_chk",
    "__strncpy_chk",
    "__vfprintf_chk",
    "__vprintf_chk",
    "__vsnprintf_chk",
    "__vsprintf_chk",
];

/// Where the C library for a fortify analysis comes from.
#[derive(Clone, Debug, Default)]
pub struct LibcSource {
    /// explicit libc, bypassing dependency resolution
    pub libc: Option<PathBuf>,
    /// root of an offline filesystem image
    pub sysroot: Option<PathBuf>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LibcLocation {
    /// target has no dynamic segment
    Static,
    /// dynamic target whose libc could not be found
    Missing,
    Found(PathBuf),
}

impl LibcSource {
    #[must_use]
    pub fn new(libc: Option<PathBuf>, sysroot: Option<PathBuf>) -> Self {
        Self { libc, sysroot }
    }

    /// Pick the libc for `image`: the explicit override (inside the sysroot
    /// when one is set), else the first `libc.` found in its dependencies.
    #[must_use]
    pub fn locate(&self, image: &ElfImage) -> LibcLocation {
        if let Some(libc) = &self.libc {
            return match &self.sysroot {
                Some(root) => match confine(root, libc) {
                    Ok(path) => LibcLocation::Found(path),
                    Err(err) => {
                        warn!("{}", err);
                        LibcLocation::Missing
                    }
                },
                None => LibcLocation::Found(clean_path(libc)),
            };
        }
        if !image.is_dynamic() {
            return LibcLocation::Static;
        }
        LdSoLookup::with_root(self.sysroot.as_deref())
            .find_libc(image)
            .map_or(LibcLocation::Missing, LibcLocation::Found)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FortifyStatus {
    Fortified,
    Unfortified,
    NotApplicable,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LibcSupport {
    Yes,
    No,
    NotApplicable,
}
impl Verdict for LibcSupport {
    fn output(&self) -> Cow<'static, str> {
        match self {
            Self::Yes => "Yes".into(),
            Self::No => "No".into(),
            Self::NotApplicable => "N/A".into(),
        }
    }
    fn color(&self) -> Color {
        match self {
            Self::Yes => Color::Green,
            Self::No => Color::Red,
            Self::NotApplicable => Color::Unset,
        }
    }
}

/// A fortifiable function the binary calls, and the libc `_chk` export
/// that covers it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FortifiableCall {
    /// name as referenced by the binary, leading underscores trimmed
    pub name: String,
    pub libc: String,
    /// the binary calls the `_chk` variant
    pub checked: bool,
}

/// Raw intersection counts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FortifyCounts {
    pub fortified: usize,
    pub fortifiable: usize,
    pub libc_functions: usize,
    pub file_functions: usize,
    pub functions: Vec<FortifiableCall>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Fortify {
    pub status: FortifyStatus,
    pub libc_support: LibcSupport,
    pub fortified: usize,
    pub fortifiable: usize,
    pub libc_functions: usize,
    pub file_functions: usize,
    pub functions: Vec<FortifiableCall>,
}

impl Fortify {
    #[must_use]
    pub fn not_applicable() -> Self {
        Self {
            status: FortifyStatus::NotApplicable,
            libc_support: LibcSupport::NotApplicable,
            fortified: 0,
            fortifiable: 0,
            libc_functions: 0,
            file_functions: 0,
            functions: Vec::new(),
        }
    }
    #[must_use]
    pub fn from_counts(counts: FortifyCounts) -> Self {
        Self {
            status: if counts.fortified > 0 {
                FortifyStatus::Fortified
            } else {
                FortifyStatus::Unfortified
            },
            libc_support: if counts.libc_functions > 0 {
                LibcSupport::Yes
            } else {
                LibcSupport::No
            },
            fortified: counts.fortified,
            fortifiable: counts.fortifiable,
            libc_functions: counts.libc_functions,
            file_functions: counts.file_functions,
            functions: counts.functions,
        }
    }
    /// Fortifiable calls left on the unchecked variant.
    #[must_use]
    pub fn unfortified(&self) -> usize {
        self.fortifiable.saturating_sub(self.fortified)
    }
}

impl Verdict for Fortify {
    fn output(&self) -> Cow<'static, str> {
        match self.status {
            FortifyStatus::Fortified => "Yes".into(),
            FortifyStatus::Unfortified => "No".into(),
            FortifyStatus::NotApplicable => "N/A".into(),
        }
    }
    fn color(&self) -> Color {
        match self.status {
            FortifyStatus::Fortified => Color::Green,
            FortifyStatus::Unfortified => Color::Red,
            FortifyStatus::NotApplicable => Color::Unset,
        }
    }
}

fn trim_underscores(name: &str) -> &str {
    name.trim_matches('_')
}

/// Strip any of `_`, `c`, `h`, `k` from both ends.
fn trim_chk(name: &str) -> &str {
    name.trim_matches(|c| matches!(c, '_' | 'c' | 'h' | 'k'))
}

/// Intersect libc `_chk` exports with the target's symbol names.
///
/// `fortified` counts checked forms (`strcpy_chk`) the target references,
/// `fortifiable` adds the plain forms (`strcpy`) it references.
pub fn count<'a, L, T>(libc: L, target: T) -> FortifyCounts
where
    L: IntoIterator<Item = &'a str>,
    T: IntoIterator<Item = &'a str>,
{
    let exports: Vec<&str> = libc
        .into_iter()
        .filter(|name| {
            name.starts_with("__")
                && name.ends_with("_chk")
                && FORTIFIABLE_FUNCTIONS.contains(name)
        })
        .collect();

    let mut file_functions = 0;
    let mut names = HashSet::new();
    for name in target {
        file_functions += 1;
        names.insert(trim_underscores(name));
    }

    let call = |name: &str, libc: &str, checked| FortifiableCall {
        name: name.to_string(),
        libc: libc.to_string(),
        checked,
    };
    let mut functions: Vec<FortifiableCall> = exports
        .iter()
        .map(|libc| (*libc, trim_underscores(libc)))
        .filter(|(_, checked)| names.contains(checked))
        .map(|(libc, checked)| call(checked, libc, true))
        .collect();
    let fortified = functions.len();
    functions.extend(
        exports
            .iter()
            .map(|libc| (*libc, trim_chk(trim_underscores(libc))))
            .filter(|(_, base)| names.contains(base))
            .map(|(libc, base)| call(base, libc, false)),
    );
    FortifyCounts {
        fortified,
        fortifiable: functions.len(),
        libc_functions: exports.len(),
        file_functions,
        functions,
    }
}

fn open_libc(path: &Path) -> Option<ElfImage> {
    ElfImage::open(path)
        .map_err(|err| warn!("Failed to open libc {}: {}", path.display(), err))
        .ok()
}

/// Fortify coverage of `image` against the libc chosen by `source`.
/// Anything that prevents reading the libc yields `N/A`.
#[must_use]
pub fn analyze(image: &ElfImage, source: &LibcSource) -> Fortify {
    let libc_path = match source.locate(image) {
        LibcLocation::Found(path) => path,
        LibcLocation::Static => return Fortify::not_applicable(),
        LibcLocation::Missing => {
            warn!(
                "Dynamic binary {} found but libc is missing, fortify results will be skipped",
                image.path().display()
            );
            return Fortify::not_applicable();
        }
    };
    let Some(libc) = open_libc(&libc_path) else {
        return Fortify::not_applicable();
    };
    let libc_symbols = match libc.dynamic_symbols_or_reconstructed() {
        Ok(symbols) => symbols,
        Err(err) => {
            warn!("No symbols in libc {}: {}", libc_path.display(), err);
            return Fortify::not_applicable();
        }
    };
    let target_symbols = image.dynamic_symbols_or_reconstructed().unwrap_or_else(|err| {
        debug!("{}: no dynamic symbols: {}", image.path().display(), err);
        Cow::Owned(Vec::new())
    });

    Fortify::from_counts(count(
        libc_symbols.iter().map(|sym| sym.name.as_str()),
        target_symbols.iter().map(|sym| sym.name.as_str()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_like_a_cut_set() {
        assert_eq!(trim_underscores("__strcpy_chk"), "strcpy_chk");
        assert_eq!(trim_chk("strcpy_chk"), "strcpy");
        assert_eq!(trim_chk("printf_chk"), "printf");
        assert_eq!(trim_chk("stpcpy_chk"), "stpcpy");
    }

    #[test]
    fn counts_checked_and_plain_calls() {
        let libc = ["__strcpy_chk", "__memcpy_chk", "__printf_chk", "__foo_chk", "strcpy"];
        let target = ["__strcpy_chk", "memcpy", "puts", "__cxa_finalize"];
        let counts = count(libc, target);
        assert_eq!(
            (counts.fortified, counts.fortifiable, counts.libc_functions, counts.file_functions),
            (1, 2, 3, 4)
        );
        assert_eq!(
            counts.functions,
            [
                FortifiableCall {
                    name: "strcpy_chk".to_string(),
                    libc: "__strcpy_chk".to_string(),
                    checked: true,
                },
                FortifiableCall {
                    name: "memcpy".to_string(),
                    libc: "__memcpy_chk".to_string(),
                    checked: false,
                },
            ]
        );
        let fortify = Fortify::from_counts(counts);
        assert_eq!(fortify.output(), "Yes");
        assert_eq!(fortify.color(), Color::Green);
        assert_eq!(fortify.unfortified(), 1);
        assert_eq!(fortify.libc_support.check().output, "Yes");
    }

    #[test]
    fn no_chk_in_libc() {
        let fortify = Fortify::from_counts(count(["strcpy"], ["strcpy"]));
        assert_eq!(fortify.status, FortifyStatus::Unfortified);
        assert_eq!(fortify.libc_support, LibcSupport::No);
        assert_eq!(fortify.libc_support.color(), Color::Red);
    }

    #[test]
    fn not_applicable_has_zero_counts() {
        let fortify = Fortify::not_applicable();
        assert_eq!(fortify.check().output, "N/A");
        assert_eq!(fortify.color(), Color::Unset);
        assert_eq!((fortify.fortified, fortify.fortifiable), (0, 0));
        assert_eq!(fortify.libc_support.output(), "N/A");
    }

    fn function_name() -> impl Strategy<Value = String> {
        prop_oneof![
            proptest::sample::select(FORTIFIABLE_FUNCTIONS.to_vec()).prop_map(|name| name.to_string()),
            proptest::sample::select(FORTIFIABLE_FUNCTIONS.to_vec())
                .prop_map(|name| trim_chk(trim_underscores(name)).to_string()),
            "_{0,2}[a-z]{1,8}(_chk)?",
        ]
    }

    proptest! {
        #[test]
        fn fortified_never_exceeds_fortifiable(
            libc in proptest::collection::vec(function_name(), 0..40),
            target in proptest::collection::vec(function_name(), 0..40),
        ) {
            let counts = count(
                libc.iter().map(String::as_str),
                target.iter().map(String::as_str),
            );
            prop_assert!(counts.fortified <= counts.fortifiable);
            prop_assert_eq!(counts.file_functions, target.len());
        }
    }
}
