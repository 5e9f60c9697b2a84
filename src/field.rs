use std::fmt;

use crate::error::{Error, Result};

/// A measured field (`hs`, `tp`, `dp`, `wind`, ...) that a source publishes.
///
/// Only obtainable through validation against a source's quantity set, see
/// [`SourceDescriptor::quantity`](crate::SourceDescriptor::quantity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quantity(&'static str);

impl Quantity {
    pub fn new(value: &str, allowed: &'static [&'static str]) -> Result<Self> {
        choose(value, allowed).map(Quantity)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A spatial grid or named region (`glo_30m`, `ak_4m`, `nww3`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grid(&'static str);

impl Grid {
    pub fn new(value: &str, allowed: &'static [&'static str]) -> Result<Self> {
        choose(value, allowed).map(Grid)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

fn choose(value: &str, allowed: &'static [&'static str]) -> Result<&'static str> {
    allowed
        .iter()
        .copied()
        .find(|c| *c == value)
        .ok_or_else(|| Error::choice(value, allowed.iter().copied()))
}
