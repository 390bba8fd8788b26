use serde::{Deserialize, Serialize};

use crate::error::{ColorError, Result};
use crate::pixels::{RgbImage, SubPixel};

const NEUTRAL_FLOOR: f64 = 1e-6;

/// Per-channel white balance multipliers.
///
/// The two Bayer greens are kept apart as reported by the camera and only
/// averaged when the gains are applied to demosaiced RGB.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteBalanceGains {
    pub r: SubPixel,
    pub g_even: SubPixel,
    pub g_odd: SubPixel,
    pub b: SubPixel,
}

impl Default for WhiteBalanceGains {
    fn default() -> Self {
        WhiteBalanceGains::UNITY
    }
}

impl WhiteBalanceGains {
    pub const UNITY: WhiteBalanceGains = WhiteBalanceGains {
        r: 1.0,
        g_even: 1.0,
        g_odd: 1.0,
        b: 1.0,
    };

    pub fn from_rgb([r, g, b]: [SubPixel; 3]) -> Self {
        WhiteBalanceGains {
            r,
            g_even: g,
            g_odd: g,
            b,
        }
    }

    /// Per-plane gains in CFA order `[r, gEven, gOdd, b]`.
    pub fn from_color_correction_gains(gains: &[f64]) -> Result<Self> {
        let [r, g_even, g_odd, b] = gains
            .get(..4)
            .and_then(|g| <[f64; 4]>::try_from(g).ok())
            .ok_or_else(|| {
                ColorError::dimensions("4 color correction gains", format!("{}", gains.len()))
            })?;
        Ok(WhiteBalanceGains {
            r: r as SubPixel,
            g_even: g_even as SubPixel,
            g_odd: g_odd as SubPixel,
            b: b as SubPixel,
        })
    }

    /// Reciprocal of the camera neutral, scaled so green is 1.
    ///
    /// Only the first three entries are used; entries are floored at 1e-6.
    pub fn from_as_shot_neutral(neutral: &[f64]) -> Result<Self> {
        if neutral.len() < 3 {
            return Err(ColorError::InvalidNeutral(neutral.to_vec()));
        }
        let inv = [0, 1, 2].map(|i| 1.0 / neutral[i].max(NEUTRAL_FLOOR));
        let g = inv[1];
        Ok(WhiteBalanceGains::from_rgb(inv.map(|v| (v / g) as SubPixel)))
    }

    pub fn green(&self) -> SubPixel {
        0.5 * (self.g_even + self.g_odd)
    }

    pub fn rgb(&self) -> [SubPixel; 3] {
        [self.r, self.green(), self.b]
    }

    /// Scales each channel and clamps to [0, 1].
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let gains = self.rgb();
        image.map_pixels(|px| [0, 1, 2].map(|c| (px[c] * gains[c]).clamp(0.0, 1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_green_is_mean_of_pair() {
        let gains = WhiteBalanceGains::from_color_correction_gains(&[2.0, 1.0, 1.2, 1.5]).unwrap();
        assert_eq!(gains.g_even, 1.0);
        assert_eq!(gains.g_odd, 1.2);
        assert!((gains.green() - 1.1).abs() < 1e-6);
        assert!(WhiteBalanceGains::from_color_correction_gains(&[2.0, 1.0, 1.5]).is_err());
    }

    #[test]
    fn test_from_as_shot_neutral_normalizes_green() {
        let gains = WhiteBalanceGains::from_as_shot_neutral(&[0.5, 1.0, 0.8]).unwrap();
        assert!((gains.r - 2.0).abs() < 1e-6);
        assert_eq!(gains.green(), 1.0);
        assert!((gains.b - 1.25).abs() < 1e-6);

        let scaled = WhiteBalanceGains::from_as_shot_neutral(&[0.25, 0.5, 0.4, 0.5]).unwrap();
        assert!((scaled.r - 2.0).abs() < 1e-6);
        assert!((scaled.green() - 1.0).abs() < 1e-6);

        assert!(WhiteBalanceGains::from_as_shot_neutral(&[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_zero_neutral_is_floored() {
        let gains = WhiteBalanceGains::from_as_shot_neutral(&[0.0, 1.0, 1.0]).unwrap();
        assert!(gains.r.is_finite());
        assert!((gains.r - 1e6).abs() < 1.0);
    }

    #[test]
    fn test_apply_scales_and_clamps() {
        let image = RgbImage::from_array(Array3::from_elem((2, 2, 3), 0.4)).unwrap();
        let gains = WhiteBalanceGains::from_rgb([2.0, 1.0, 3.0]);
        let out = gains.apply(&image);
        let [r, g, b] = out.pixel(1, 1);
        assert!((r - 0.8).abs() < 1e-6);
        assert!((g - 0.4).abs() < 1e-6);
        assert_eq!(b, 1.0);
    }
}
