//! Dual-illuminant calibration interpolation.
//!
//! The scene illuminant is not known up front: the CCT depends on which
//! color matrix converts the as-shot neutral to XYZ, and the matrix depends
//! on the CCT. The interpolator alternates between the two until the white
//! point chromaticity stops moving, following the DNG interpolation law
//! (linear blending in reciprocal temperature).

use tracing::{debug, warn};

use crate::calibration::{blend, CalibrationPair, CalibrationSet};
use crate::error::{ColorError, Result};
use crate::matrix::{Ccm, PlaneMatrix, PlaneVector};
use crate::temperature::{neutral_to_chromaticity, xy_to_cct, Chromaticity, D65_WHITE};

pub const MAX_ITERATIONS: usize = 10;
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Per-unit diagonal channel scaling applied ahead of calibration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalogBalance(PlaneMatrix);

impl AnalogBalance {
    pub fn identity(planes: usize) -> Result<Self> {
        Ok(AnalogBalance(PlaneMatrix::identity(planes)?))
    }

    pub fn from_diagonal(values: &[f64]) -> Result<Self> {
        Ok(AnalogBalance(PlaneMatrix::diagonal(values)?))
    }

    pub fn matrix(&self) -> &PlaneMatrix {
        &self.0
    }

    pub fn planes(&self) -> usize {
        self.0.rows()
    }
}

/// Camera-space white point recorded for the exposure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AsShotNeutral(PlaneVector);

impl AsShotNeutral {
    pub fn new(values: &[f64]) -> Result<Self> {
        if values.iter().any(|v| *v <= 0.0 || !v.is_finite()) {
            return Err(ColorError::InvalidNeutral(values.to_vec()));
        }
        Ok(AsShotNeutral(PlaneVector::from_slice(values)?))
    }

    pub fn vector(&self) -> &PlaneVector {
        &self.0
    }

    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    pub fn planes(&self) -> usize {
        self.0.len()
    }
}

/// Calibration illuminant taking part in a blend.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendEndpoint {
    pub name: String,
    pub cct: f64,
}

/// Snapshot of one interpolation round.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendState {
    pub low: BlendEndpoint,
    pub high: BlendEndpoint,
    /// Weight toward `high`, in [0, 1].
    pub weight: f64,
    /// White point estimate produced by this round.
    pub chromaticity: Chromaticity,
    /// CCT the round blended for; `None` when the estimate had no valid CCT.
    pub cct: Option<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl BlendState {
    fn new(
        pair: &CalibrationPair<'_>,
        chromaticity: Chromaticity,
        cct: Option<f64>,
        iterations: usize,
        converged: bool,
    ) -> Self {
        BlendState {
            low: BlendEndpoint {
                name: pair.low.name.clone(),
                cct: pair.low.cct,
            },
            high: BlendEndpoint {
                name: pair.high.name.clone(),
                cct: pair.high.cct,
            },
            weight: pair.weight,
            chromaticity,
            cct,
            iterations,
            converged,
        }
    }
}

/// Result of an interpolation run.
#[derive(Clone, Debug)]
pub struct Interpolation {
    /// Blended XYZ to camera color matrix, one row per camera plane.
    pub color_matrix: PlaneMatrix,
    /// Analog balance · camera calibration · color matrix.
    pub xyz_to_camera: PlaneMatrix,
    pub state: BlendState,
}

impl Interpolation {
    /// Blended color matrix as a pixel CCM; only defined for three planes.
    pub fn ccm(&self) -> Result<Ccm> {
        self.color_matrix.to_ccm()
    }
}

struct Round {
    color_matrix: PlaneMatrix,
    xyz_to_camera: PlaneMatrix,
    next: Chromaticity,
}

pub struct CalibrationInterpolator<'a> {
    calibration: &'a CalibrationSet,
    analog_balance: &'a AnalogBalance,
    neutral: &'a AsShotNeutral,
    max_iterations: usize,
}

impl<'a> CalibrationInterpolator<'a> {
    pub fn new(
        calibration: &'a CalibrationSet,
        analog_balance: &'a AnalogBalance,
        neutral: &'a AsShotNeutral,
    ) -> Result<Self> {
        let planes = calibration.planes();
        if analog_balance.planes() != planes {
            return Err(ColorError::dimensions(
                format!("{planes}x{planes} analog balance"),
                analog_balance.matrix().shape(),
            ));
        }
        if neutral.planes() != planes {
            return Err(ColorError::dimensions(
                format!("{planes} neutral entries"),
                format!("{} neutral entries", neutral.planes()),
            ));
        }
        Ok(CalibrationInterpolator {
            calibration,
            analog_balance,
            neutral,
            max_iterations: MAX_ITERATIONS,
        })
    }

    /// Lowers the round cap; values are clamped to `1..=MAX_ITERATIONS`.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.clamp(1, MAX_ITERATIONS);
        self
    }

    /// Initial white point: the first calibration (coolest first) whose
    /// color matrix maps the neutral to a valid chromaticity, else D65.
    pub fn seed(&self) -> Chromaticity {
        self.calibration
            .entries()
            .iter()
            .find_map(|entry| neutral_to_chromaticity(self.neutral.vector(), &entry.color_matrix))
            .unwrap_or(D65_WHITE)
    }

    pub fn run(&self) -> Result<Interpolation> {
        self.run_from(self.seed())
    }

    /// Iterates from `seed` until the chromaticity moves less than
    /// `CONVERGENCE_TOLERANCE` or the round cap is reached.
    ///
    /// Hitting the cap is not an error: the last round is returned with
    /// `converged == false`.
    pub fn run_from(&self, seed: Chromaticity) -> Result<Interpolation> {
        let mut xy = seed;
        let mut last: Option<Interpolation> = None;

        for iteration in 1..=self.max_iterations {
            let cct = xy_to_cct(xy.x, xy.y);
            if cct.is_none() && last.is_some() {
                debug!(
                    iteration,
                    x = xy.x,
                    y = xy.y,
                    "no CCT for white point estimate, keeping last blend"
                );
                break;
            }

            let pair = self.calibration.select_pair(cct);
            let round = self.round(&pair)?;
            let converged = round.next.distance(&xy) < CONVERGENCE_TOLERANCE;
            xy = round.next;

            debug!(
                iteration,
                cct = cct.unwrap_or(f64::NAN),
                weight = pair.weight,
                low = %pair.low.name,
                high = %pair.high.name,
                x = xy.x,
                y = xy.y,
                "interpolation round"
            );

            last = Some(Interpolation {
                color_matrix: round.color_matrix,
                xyz_to_camera: round.xyz_to_camera,
                state: BlendState::new(&pair, xy, cct, iteration, converged),
            });
            if converged {
                break;
            }
        }

        let result = last.ok_or(ColorError::Degenerate("interpolated color matrix"))?;
        if !result.state.converged {
            warn!(
                iterations = result.state.iterations,
                weight = result.state.weight,
                "calibration interpolation did not converge, using last blend"
            );
        }
        Ok(result)
    }

    fn round(&self, pair: &CalibrationPair<'_>) -> Result<Round> {
        let color_matrix = blend(&pair.low.color_matrix, &pair.high.color_matrix, pair.weight)?;
        let camera_calibration = blend(
            &pair.low.camera_calibration,
            &pair.high.camera_calibration,
            pair.weight,
        )?;
        let xyz_to_camera = self
            .analog_balance
            .matrix()
            .mul(&camera_calibration)?
            .mul(&color_matrix)?;

        let camera_to_xyz = xyz_to_camera
            .pseudo_inverse()
            .filter(PlaneMatrix::is_finite)
            .ok_or(ColorError::Degenerate("pseudo-inverse of the XYZ to camera transform"))?;
        let xyz = camera_to_xyz.mul_vector(self.neutral.vector())?;
        let xyz = xyz.as_slice();
        let next = Chromaticity::from_xyz([xyz[0], xyz[1], xyz[2]])
            .ok_or(ColorError::Degenerate("white point chromaticity"))?;

        Ok(Round {
            color_matrix,
            xyz_to_camera,
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationEntry;

    fn diag_entry(name: &str, cct: f64, diag: [f64; 3]) -> CalibrationEntry {
        CalibrationEntry::new(name, cct, PlaneMatrix::diagonal(&diag).unwrap()).unwrap()
    }

    /// Neutral whose fixed point sits at the mired midpoint of 3000K and 7500K.
    fn midpoint_scenario() -> (CalibrationSet, AsShotNeutral) {
        let target = 2.0 / (1.0 / 3000.0 + 1.0 / 7500.0);
        let y0 = 0.40;
        let (mut lo, mut hi) = (0.30, 0.45);
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if xy_to_cct(mid, y0).unwrap() > target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let x0 = 0.5 * (lo + hi);
        let set = CalibrationSet::new(vec![
            diag_entry("Warm", 3000.0, [0.98, 1.0, 1.02]),
            diag_entry("Shade", 7500.0, [1.02, 1.0, 0.98]),
        ])
        .unwrap();
        // the two diagonals average to identity, so XYZ equals the neutral at w = 0.5
        let neutral = AsShotNeutral::new(&[x0, y0, 1.0 - x0 - y0]).unwrap();
        (set, neutral)
    }

    #[test]
    fn test_single_identity_entry() {
        let set = CalibrationSet::new(vec![diag_entry("D55", 5500.0, [1.0, 1.0, 1.0])]).unwrap();
        let ab = AnalogBalance::identity(3).unwrap();
        let neutral = AsShotNeutral::new(&[1.0, 1.0, 1.0]).unwrap();
        let result = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap().run().unwrap();

        assert_eq!(result.color_matrix, PlaneMatrix::identity(3).unwrap());
        assert_eq!(result.state.weight, 0.0);
        assert!(result.state.converged);
        assert_eq!(result.state.iterations, 1);
        assert_eq!(result.state.low.name, "D55");
    }

    #[test]
    fn test_midpoint_blend() {
        let (set, neutral) = midpoint_scenario();
        let ab = AnalogBalance::identity(3).unwrap();
        let result = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap().run().unwrap();

        assert!(result.state.converged);
        assert!((result.state.weight - 0.5).abs() < 1e-3, "weight {}", result.state.weight);
        let average = PlaneMatrix::identity(3).unwrap();
        for r in 0..3 {
            for c in 0..3 {
                assert!((result.color_matrix.get(r, c) - average.get(r, c)).abs() < 1e-6);
            }
        }
        assert_eq!(result.state.low.name, "Warm");
        assert_eq!(result.state.high.name, "Shade");
    }

    #[test]
    fn test_fixed_point_converges_in_one_round() {
        let (set, neutral) = midpoint_scenario();
        let ab = AnalogBalance::identity(3).unwrap();
        let interpolator = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap();
        let first = interpolator.run().unwrap();
        let again = interpolator.run_from(first.state.chromaticity).unwrap();
        assert!(again.state.converged);
        assert_eq!(again.state.iterations, 1);
    }

    #[test]
    fn test_round_cap_is_soft() {
        let (set, neutral) = midpoint_scenario();
        let ab = AnalogBalance::identity(3).unwrap();
        let result = CalibrationInterpolator::new(&set, &ab, &neutral)
            .unwrap()
            .with_max_iterations(2)
            .run()
            .unwrap();
        assert!(!result.state.converged);
        assert_eq!(result.state.iterations, 2);
        assert!(result.state.weight > 0.0 && result.state.weight < 1.0);
    }

    #[test]
    fn test_invalid_cct_mid_solve_keeps_last_blend() {
        let set = CalibrationSet::new(vec![diag_entry("D55", 5500.0, [1.0, 1.0, 1.0])]).unwrap();
        let ab = AnalogBalance::from_diagonal(&[2.0, 1.0 / 0.19, 1.0 / 0.31]).unwrap();
        let neutral = AsShotNeutral::new(&[1.0, 1.0, 1.0]).unwrap();
        let interpolator = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap();
        assert!((interpolator.seed().x - 1.0 / 3.0).abs() < 1e-12);

        // round 1 lands on (0.5, 0.19), which has no valid CCT
        let result = interpolator.run().unwrap();
        assert!(xy_to_cct(0.5, 0.19).is_none());
        assert_eq!(result.state.iterations, 1);
        assert!(!result.state.converged);
        assert_eq!(result.state.weight, 0.0);
        assert!(result.state.cct.is_some());
        assert!((result.state.chromaticity.x - 0.5).abs() < 1e-9);
        assert!((result.state.chromaticity.y - 0.19).abs() < 1e-9);
        assert_eq!(result.xyz_to_camera, *ab.matrix());
    }

    #[test]
    fn test_seed_falls_back_to_d65() {
        let singular =
            PlaneMatrix::from_rows([[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let entry = CalibrationEntry::new("bad", 5000.0, singular).unwrap();
        let set = CalibrationSet::new(vec![entry]).unwrap();
        let ab = AnalogBalance::identity(3).unwrap();
        let neutral = AsShotNeutral::new(&[1.0, 1.0, 1.0]).unwrap();
        let interpolator = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap();
        assert_eq!(interpolator.seed(), D65_WHITE);
        // the blended transform itself is singular too
        assert!(matches!(interpolator.run(), Err(ColorError::Degenerate(_))));
    }

    #[test]
    fn test_degenerate_analog_balance() {
        let set = CalibrationSet::new(vec![diag_entry("D55", 5500.0, [1.0, 1.0, 1.0])]).unwrap();
        let ab = AnalogBalance::from_diagonal(&[1.0, 0.0, 1.0]).unwrap();
        let neutral = AsShotNeutral::new(&[1.0, 1.0, 1.0]).unwrap();
        let result = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap().run();
        assert!(matches!(result, Err(ColorError::Degenerate(_))));
    }

    #[test]
    fn test_dimension_checks() {
        let set = CalibrationSet::new(vec![diag_entry("D55", 5500.0, [1.0, 1.0, 1.0])]).unwrap();
        let ab = AnalogBalance::identity(3).unwrap();
        let neutral4 = AsShotNeutral::new(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(CalibrationInterpolator::new(&set, &ab, &neutral4).is_err());
        let ab4 = AnalogBalance::identity(4).unwrap();
        let neutral = AsShotNeutral::new(&[1.0, 1.0, 1.0]).unwrap();
        assert!(CalibrationInterpolator::new(&set, &ab4, &neutral).is_err());
    }

    #[test]
    fn test_rejects_non_positive_neutral() {
        assert!(matches!(AsShotNeutral::new(&[1.0, 0.0, 1.0]), Err(ColorError::InvalidNeutral(_))));
        assert!(AsShotNeutral::new(&[1.0, -0.5, 1.0]).is_err());
    }

    #[test]
    fn test_four_plane_calibration() {
        let cm = PlaneMatrix::from_rows([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
        .unwrap();
        let entry = CalibrationEntry::new("D65", 6504.0, cm).unwrap();
        let set = CalibrationSet::new(vec![entry]).unwrap();
        let ab = AnalogBalance::identity(4).unwrap();
        let neutral = AsShotNeutral::new(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        let interpolator = CalibrationInterpolator::new(&set, &ab, &neutral).unwrap();
        assert_eq!(interpolator.seed(), D65_WHITE);

        let result = interpolator.run().unwrap();
        assert_eq!(result.color_matrix.shape(), "4x3");
        assert!((result.state.chromaticity.x - 1.0 / 3.0).abs() < 1e-9);
        assert!(result.ccm().is_err());
    }
}
