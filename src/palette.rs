//! Display identities: a fixed palette of colours and the pool handing them
//! out to tracked objects.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An opaque RGB display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn parse_hex(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(Error::InvalidConfig(format!("invalid colour '{}'", s)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::InvalidConfig(format!("invalid colour '{}'", s)))
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Packed `0xAARRGGBB` with full alpha.
    pub fn to_argb(&self) -> u32 {
        0xFF00_0000 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Color::parse_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// The default 15-colour palette.
pub const DEFAULT_PALETTE: [Color; 15] = [
    Color::rgb(0x00, 0x00, 0xFF),
    Color::rgb(0xFF, 0x00, 0x00),
    Color::rgb(0x00, 0xFF, 0x00),
    Color::rgb(0xFF, 0xFF, 0x00),
    Color::rgb(0x00, 0xFF, 0xFF),
    Color::rgb(0xFF, 0x00, 0xFF),
    Color::rgb(0xFF, 0xFF, 0xFF),
    Color::rgb(0x55, 0xFF, 0x55),
    Color::rgb(0xFF, 0xA5, 0x00),
    Color::rgb(0xFF, 0x88, 0x88),
    Color::rgb(0xAA, 0xAA, 0xFF),
    Color::rgb(0xFF, 0xFF, 0xAA),
    Color::rgb(0x55, 0xAA, 0xAA),
    Color::rgb(0xAA, 0x33, 0xAA),
    Color::rgb(0x0D, 0x00, 0x68),
];

/// Bounded pool of reusable colours.
///
/// Colours are handed out from the front and returned to the back, so a
/// colour that was just released is the last one to be reused.
#[derive(Debug, Clone)]
pub struct ColorPool {
    palette: Vec<Color>,
    free: VecDeque<Color>,
}

impl ColorPool {
    /// Create a pool with every palette colour free.
    ///
    /// The palette must be non-empty and free of duplicates; tracker
    /// configuration validation guarantees both.
    pub fn new(palette: &[Color]) -> Self {
        Self {
            palette: palette.to_vec(),
            free: palette.iter().copied().collect(),
        }
    }

    /// Take one free colour, `None` when the pool is exhausted.
    pub fn acquire(&mut self) -> Option<Color> {
        self.free.pop_front()
    }

    /// Return a colour to the pool.
    ///
    /// # Panics
    /// Releasing a colour that is already free, or one that is not part of
    /// the palette, is a lifecycle bug in the caller.
    pub fn release(&mut self, color: Color) {
        assert!(
            self.palette.contains(&color),
            "released colour {} is not part of the palette",
            color
        );
        assert!(
            !self.free.contains(&color),
            "colour {} released twice",
            color
        );
        self.free.push_back(color);
    }

    /// Total number of colours, free or in use.
    pub fn capacity(&self) -> usize {
        self.palette.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    pub fn is_free(&self, color: &Color) -> bool {
        self.free.contains(color)
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }
}

impl Default for ColorPool {
    fn default() -> Self {
        Self::new(&DEFAULT_PALETTE)
    }
}
