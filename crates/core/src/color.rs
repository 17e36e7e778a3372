use serde::{Deserialize, Serialize};

use crate::error::{Result, TextBufferError};

/// 8-bit RGBA color as stored in the cell textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const LIGHT_GRAY: Rgba = Rgba::rgb(192, 192, 192);
    pub const TRANSPARENT: Rgba = Rgba::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with the alpha forced to opaque.
    pub const fn opaque(self) -> Self {
        Self { a: 255, ..self }
    }

    /// Normalized `[r, g, b, a]` in `0.0..=1.0`.
    pub fn to_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Parses `#rrggbb` or `#rrggbbaa` (the leading `#` is optional).
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let bad = || TextBufferError::Configuration(format!("invalid hex color '{}'", s));

        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(bad());
        }

        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Self::rgba(byte(0)?, byte(2)?, byte(4)?, a))
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::BLACK
    }
}

impl From<[u8; 4]> for Rgba {
    fn from(c: [u8; 4]) -> Self {
        Rgba::rgba(c[0], c[1], c[2], c[3])
    }
}

impl From<[u8; 3]> for Rgba {
    fn from(c: [u8; 3]) -> Self {
        Rgba::rgb(c[0], c[1], c[2])
    }
}

impl From<Rgba> for [u8; 4] {
    fn from(c: Rgba) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_and_eight_digit_hex() {
        assert_eq!(Rgba::from_hex("#0f0f10").unwrap(), Rgba::rgb(0x0f, 0x0f, 0x10));
        assert_eq!(
            Rgba::from_hex("3366cc44").unwrap(),
            Rgba::rgba(0x33, 0x66, 0xcc, 0x44)
        );
    }

    #[test]
    fn rejects_malformed_hex() {
        for bad in ["", "#fff", "#gg0000", "#12345", "#1234567", "#ééé"] {
            assert!(
                matches!(Rgba::from_hex(bad), Err(TextBufferError::Configuration(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn hex_output_omits_opaque_alpha() {
        assert_eq!(Rgba::LIGHT_GRAY.to_hex(), "#c0c0c0");
        assert_eq!(Rgba::TRANSPARENT.to_hex(), "#00000000");
    }
}
