//! Implements the verdict type shared between all detectors
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::color::Color;

/// A finished check: exactly one verdict string and one color.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Check {
    pub output: String,
    pub color: Color,
}
impl Check {
    #[must_use]
    pub fn new<S: Into<String>>(output: S, color: Color) -> Self {
        Self { output: output.into(), color }
    }
}
impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.color.paint(&self.output))
    }
}

/// Typed detector outcome with a total mapping onto the record vocabulary.
pub trait Verdict {
    fn output(&self) -> Cow<'static, str>;
    fn color(&self) -> Color;

    fn check(&self) -> Check {
        Check::new(self.output(), self.color())
    }
}
