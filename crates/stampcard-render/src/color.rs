//! Opaque RGB colors as configured for offers.
//!
//! Accepts `#RRGGBB`, `#RGB` and the `rgb(r, g, b)` form wallet pass JSON
//! uses. Unparsable input is an input error and falls back to a caller
//! supplied default instead of failing the render.

use std::fmt;
use std::str::FromStr;

/// 8-bit per channel opaque color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `input`, or return `default` when it is not a color.
    pub fn parse_or(input: &str, default: Self) -> Self {
        input.parse().unwrap_or_else(|_| {
            tracing::debug!(input, "Unparsable color, using default");
            default
        })
    }

    /// `rgb(r, g, b)` form used in pass JSON.
    pub fn to_pass_string(self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }

    pub fn to_skia(self, alpha: u8) -> resvg::tiny_skia::Color {
        resvg::tiny_skia::Color::from_rgba8(self.r, self.g, self.b, alpha)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Error returned for strings that are not a supported color notation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color: {0}")]
pub struct ParseColorError(String);

impl FromStr for Rgb {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseColorError(trimmed.to_string());

        if let Some(hex) = trimmed.strip_prefix('#') {
            return match hex.len() {
                6 => {
                    let value = u32::from_str_radix(hex, 16).map_err(|_| err())?;
                    let [_, r, g, b] = value.to_be_bytes();
                    Ok(Self::new(r, g, b))
                }
                3 => {
                    let mut channels = [0u8; 3];
                    for (slot, c) in channels.iter_mut().zip(hex.chars()) {
                        let nibble = c.to_digit(16).ok_or_else(err)?;
                        #[allow(clippy::cast_possible_truncation)]
                        {
                            *slot = (nibble * 17) as u8;
                        }
                    }
                    Ok(Self::new(channels[0], channels[1], channels[2]))
                }
                _ => Err(err()),
            };
        }

        let inner = trimmed
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;
        let parts: Vec<u8> = inner
            .split(',')
            .map(|p| p.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| err())?;
        match parts.as_slice() {
            [r, g, b] => Ok(Self::new(*r, *g, *b)),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_notations() {
        assert_eq!("#F59E0B".parse::<Rgb>().unwrap(), Rgb::new(0xF5, 0x9E, 0x0B));
        assert_eq!("#fff".parse::<Rgb>().unwrap(), Rgb::WHITE);
        assert_eq!("rgb(12, 34, 56)".parse::<Rgb>().unwrap(), Rgb::new(12, 34, 56));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "#12345", "#GGGGGG", "rgb(1,2)", "rgb(1,2,300)", "blue"] {
            assert!(bad.parse::<Rgb>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn parse_or_falls_back() {
        assert_eq!(Rgb::parse_or("nope", Rgb::BLACK), Rgb::BLACK);
    }

    #[test]
    fn formats_both_ways() {
        let c = Rgb::new(1, 171, 255);
        assert_eq!(c.to_string(), "#01ABFF");
        assert_eq!(c.to_pass_string(), "rgb(1, 171, 255)");
    }
}
