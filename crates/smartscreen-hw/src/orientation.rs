//! Display orientation support.
//!
//! Every revision accepts the four logical orientations. Revisions without
//! native reverse modes get the base orientation code on the wire and the
//! session rotates pixel data 180° in software.

use crate::{Error, Result};
use std::str::FromStr;

/// Display orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Portrait mode, the panels' power-on orientation.
    #[default]
    Portrait,
    /// Landscape mode.
    Landscape,
    /// Portrait rotated 180°.
    ReversePortrait,
    /// Landscape rotated 180°.
    ReverseLandscape,
}

impl Orientation {
    /// All orientations, in profile code-table order.
    pub const ALL: [Orientation; 4] = [
        Orientation::Portrait,
        Orientation::Landscape,
        Orientation::ReversePortrait,
        Orientation::ReverseLandscape,
    ];

    /// Index into a profile's orientation code table.
    pub fn index(&self) -> usize {
        match self {
            Orientation::Portrait => 0,
            Orientation::Landscape => 1,
            Orientation::ReversePortrait => 2,
            Orientation::ReverseLandscape => 3,
        }
    }

    /// Returns true if this is a portrait orientation.
    pub fn is_portrait(&self) -> bool {
        matches!(
            self,
            Orientation::Portrait | Orientation::ReversePortrait
        )
    }

    /// Returns true for the 180° variants.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Orientation::ReversePortrait | Orientation::ReverseLandscape
        )
    }

    /// Panel dimensions in this orientation, given the native portrait size.
    pub fn dimensions(&self, width: u16, height: u16) -> (u16, u16) {
        if self.is_portrait() {
            (width, height)
        } else {
            (height, width)
        }
    }
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            "reverse-portrait" | "reverse_portrait" => Ok(Orientation::ReversePortrait),
            "reverse-landscape" | "reverse_landscape" => Ok(Orientation::ReverseLandscape),
            _ => Err(Error::InvalidOrientation(s.to_string())),
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::ReversePortrait => write!(f, "reverse-portrait"),
            Orientation::ReverseLandscape => write!(f, "reverse-landscape"),
        }
    }
}
