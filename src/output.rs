use clap::ValueEnum;
#[cfg(feature = "color")]
use colored::control;
use serde::Serialize;
#[cfg(feature = "color")]
use std::env;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    JsonPretty,
    Yaml,
    Xml,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json (pretty)"),
            Self::Yaml => write!(f, "yaml"),
            Self::Xml => write!(f, "xml"),
        }
    }
}

pub struct Settings {
    #[cfg(feature = "color")]
    pub color: bool,
    pub format: Format,
    /// print the column header in table output
    pub header: bool,
}

impl Settings {
    #[must_use]
    #[cfg(feature = "color")]
    pub fn set(color: bool, format: Format, header: bool) -> Self {
        if color {
            // honor NO_COLOR if it is set within the environment
            if env::var("NO_COLOR").is_ok() {
                control::set_override(false);
                return Self { color: false, format, header };
            }
        } else {
            control::set_override(false);
        }
        Self { color, format, header }
    }
    #[must_use]
    #[cfg(not(feature = "color"))]
    pub fn set(_color: bool, format: Format, header: bool) -> Self {
        Self { format, header }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to render XML: {0}")]
    Xml(#[from] quick_xml::DeError),
}

/// `<records>` root holding one `<record>` element per entry.
#[derive(Serialize)]
#[serde(rename = "records")]
struct Records<'a, T> {
    record: &'a [T],
}

/// Render `records` as a YAML sequence.
///
/// # Errors
/// A record that YAML cannot represent.
pub fn to_yaml<T: Serialize>(records: &[T]) -> Result<String, RenderError> {
    Ok(serde_yaml::to_string(records)?)
}

/// Render `records` as an indented XML document.
///
/// # Errors
/// A record that XML cannot represent.
pub fn to_xml<T: Serialize>(records: &[T]) -> Result<String, RenderError> {
    let mut xml = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut xml);
    serializer.indent(' ', 2);
    Records { record: records }.serialize(serializer)?;
    Ok(xml)
}
