//! Severity vocabulary shared by every check result
#[cfg(feature = "color")]
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display classification of a single check verdict.
///
/// The serialized names (`green`, `red`, `yellow`, `italic`, `unset`) are
/// part of the record contract consumed by downstream formatters.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// mitigation enabled / best state
    Green,
    /// partial, or unknown but not known to be bad
    Yellow,
    /// mitigation disabled / worst state
    Red,
    /// check does not apply to this binary
    Italic,
    /// neutral
    Unset,
}

impl Color {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
            Self::Italic => "italic",
            Self::Unset => "unset",
        }
    }

    /// Render `text` in this color.
    #[must_use]
    #[cfg(feature = "color")]
    pub fn paint(self, text: &str) -> String {
        match self {
            Self::Green => text.green().to_string(),
            Self::Yellow => text.yellow().to_string(),
            Self::Red => text.red().to_string(),
            Self::Italic => text.italic().to_string(),
            Self::Unset => text.normal().to_string(),
        }
    }
    #[must_use]
    #[cfg(not(feature = "color"))]
    pub fn paint(self, text: &str) -> String {
        text.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
