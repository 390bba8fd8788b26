use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ColorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn index(self) -> usize {
        self as usize
    }

    fn from_label(label: char) -> Option<Self> {
        match label.to_ascii_uppercase() {
            'R' => Some(Channel::Red),
            'G' => Some(Channel::Green),
            'B' => Some(Channel::Blue),
            _ => None,
        }
    }

    fn label(self) -> char {
        match self {
            Channel::Red => 'R',
            Channel::Green => 'G',
            Channel::Blue => 'B',
        }
    }
}

/// 2×2 Bayer tile, repeated across the mosaic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CfaPattern {
    tile: [[Channel; 2]; 2],
}

impl CfaPattern {
    pub const RGGB: CfaPattern = CfaPattern {
        tile: [[Channel::Red, Channel::Green], [Channel::Green, Channel::Blue]],
    };

    pub fn new(tile: [[Channel; 2]; 2]) -> Result<Self, ColorError> {
        let count = |c: Channel| tile.iter().flatten().filter(|t| **t == c).count();
        if count(Channel::Green) != 2 || count(Channel::Red) != 1 || count(Channel::Blue) != 1 {
            let label: String = tile.iter().flatten().map(|c| c.label()).collect();
            return Err(ColorError::InvalidCfaPattern(label));
        }
        Ok(CfaPattern { tile })
    }

    #[inline]
    pub fn color_at(&self, row: usize, col: usize) -> Channel {
        self.tile[row % 2][col % 2]
    }

    /// Pattern seen by a crop starting at (`x`, `y`) of the original mosaic.
    pub fn shift(&self, x: usize, y: usize) -> CfaPattern {
        let mut tile = self.tile;
        for (r, row) in tile.iter_mut().enumerate() {
            for (c, channel) in row.iter_mut().enumerate() {
                *channel = self.color_at(r + y, c + x);
            }
        }
        CfaPattern { tile }
    }
}

impl FromStr for CfaPattern {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let labels: Vec<char> = s.trim().chars().collect();
        if labels.len() != 4 {
            return Err(ColorError::InvalidCfaPattern(s.to_string()));
        }
        let mut tile = [[Channel::Green; 2]; 2];
        for (idx, label) in labels.iter().enumerate() {
            tile[idx / 2][idx % 2] =
                Channel::from_label(*label)
                    .ok_or_else(|| ColorError::InvalidCfaPattern(s.to_string()))?;
        }
        CfaPattern::new(tile)
    }
}

impl TryFrom<String> for CfaPattern {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CfaPattern> for String {
    fn from(pattern: CfaPattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for CfaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for channel in self.tile.iter().flatten() {
            write!(f, "{}", channel.label())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_bayer_layouts() {
        for s in ["RGGB", "BGGR", "GRBG", "GBRG", "rggb"] {
            let pattern: CfaPattern = s.parse().unwrap();
            assert_eq!(pattern.to_string(), s.to_uppercase());
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for s in ["RGB", "RGGBX", "RGXB", "RRGB", "RGGG", "GGGG", ""] {
            assert!(
                matches!(s.parse::<CfaPattern>(), Err(ColorError::InvalidCfaPattern(_))),
                "{s} should be rejected"
            );
        }
    }

    #[test]
    fn test_color_at_tiles_periodically() {
        let p = CfaPattern::RGGB;
        assert_eq!(p.color_at(0, 0), Channel::Red);
        assert_eq!(p.color_at(0, 1), Channel::Green);
        assert_eq!(p.color_at(1, 0), Channel::Green);
        assert_eq!(p.color_at(1, 1), Channel::Blue);
        assert_eq!(p.color_at(6, 4), Channel::Red);
        assert_eq!(p.color_at(3, 5), Channel::Blue);
    }

    #[test]
    fn test_shift() {
        let p = CfaPattern::RGGB;
        assert_eq!(p.shift(1, 0).to_string(), "GRBG");
        assert_eq!(p.shift(0, 1).to_string(), "GBRG");
        assert_eq!(p.shift(1, 1).to_string(), "BGGR");
        assert_eq!(p.shift(2, 4), p);
    }
}
