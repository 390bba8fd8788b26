//! Chromaticity ↔ correlated color temperature conversions.

use nalgebra::Vector3;

use crate::matrix::{PlaneMatrix, PlaneVector};

/// CIE 1931 (x, y) chromaticity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chromaticity {
    pub x: f64,
    pub y: f64,
}

/// CIE standard illuminant D65.
pub const D65_WHITE: Chromaticity = Chromaticity { x: 0.3127, y: 0.3290 };

impl Chromaticity {
    pub fn new(x: f64, y: f64) -> Self {
        Chromaticity { x, y }
    }

    pub fn distance(&self, other: &Chromaticity) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Normalizes an XYZ triple by its component sum.
    pub fn from_xyz(xyz: [f64; 3]) -> Option<Self> {
        let sum: f64 = xyz.iter().sum();
        if sum.abs() < 1e-9 || !sum.is_finite() {
            return None;
        }
        Some(Chromaticity::new(xyz[0] / sum, xyz[1] / sum))
    }
}

/// McCamy's cubic approximation of CCT from chromaticity.
pub fn xy_to_cct(x: f64, y: f64) -> Option<f64> {
    let denom = 0.1858 - y;
    if denom.abs() < 1e-9 {
        return None;
    }
    let n = (x - 0.3320) / denom;
    let cct = 449.0 * n.powi(3) + 3525.0 * n.powi(2) + 6823.3 * n + 5520.33;
    if cct <= 0.0 || !cct.is_finite() {
        return None;
    }
    Some(cct)
}

/// Planckian locus chromaticity for a temperature (Kang et al. 2002).
///
/// Valid from 1667K to 25000K.
pub fn cct_to_xy(cct: f64) -> Option<Chromaticity> {
    if !(1667.0..=25000.0).contains(&cct) {
        return None;
    }
    let t = cct;
    let x = if t <= 4000.0 {
        -0.2661239e9 / t.powi(3) - 0.2343589e6 / t.powi(2) + 0.8776956e3 / t + 0.179910
    } else {
        -3.0258469e9 / t.powi(3) + 2.1070379e6 / t.powi(2) + 0.2226347e3 / t + 0.240390
    };
    let y = if t <= 2222.0 {
        -1.1063814 * x.powi(3) - 1.34811020 * x.powi(2) + 2.18555832 * x - 0.20219683
    } else if t <= 4000.0 {
        -0.9549476 * x.powi(3) - 1.37418593 * x.powi(2) + 2.09137015 * x - 0.16748867
    } else {
        3.0817580 * x.powi(3) - 5.87338670 * x.powi(2) + 3.75112997 * x - 0.37001483
    };
    Some(Chromaticity::new(x, y))
}

/// Chromaticity of the XYZ color a camera records as `neutral`.
///
/// Solves `color_matrix · xyz = neutral` directly; only square 3×3 color
/// matrices are solvable.
pub fn neutral_to_chromaticity(
    neutral: &PlaneVector,
    color_matrix: &PlaneMatrix,
) -> Option<Chromaticity> {
    if neutral.len() < 3 {
        return None;
    }
    let m = color_matrix.to_matrix3()?;
    let cam = neutral.as_slice();
    let xyz = m.lu().solve(&Vector3::new(cam[0], cam[1], cam[2]))?;
    if !xyz.iter().all(|v| v.is_finite()) {
        return None;
    }
    let xy = Chromaticity::from_xyz([xyz[0], xyz[1], xyz[2]])?;
    if xy.x <= 0.0 || xy.y <= 0.0 {
        return None;
    }
    Some(xy)
}
